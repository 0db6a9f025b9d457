use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::schemas::DownloadLink;

const SUCCESS_CODE: i64 = 200;

#[async_trait]
pub(crate) trait ReportExporter: Send + Sync {
    /// Renders the given evaluation payloads into one watermarked report for `username`.
    async fn export(&self, username: &str, evaluations: Vec<Value>) -> Result<DownloadLink>;
}

#[derive(Debug, Clone)]
pub(crate) struct HttpReportExporter {
    client: Client,
    base_url: String,
}

impl HttpReportExporter {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let remote = settings.remote();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(remote.connect_timeout_seconds))
            .timeout(Duration::from_secs(remote.request_timeout_seconds))
            .build()
            .context("Failed to build report export HTTP client")?;

        Ok(Self { client, base_url: remote.export_base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl ReportExporter for HttpReportExporter {
    async fn export(&self, username: &str, evaluations: Vec<Value>) -> Result<DownloadLink> {
        let essay_list: Vec<Value> = evaluations.into_iter().map(|data| json!({ "data": data })).collect();
        let body = json!({
            "essay_list": essay_list,
            "user_id": username,
            "watermark": true,
        });

        let response = self
            .client
            .post(format!("{}/essay_polish", self.base_url))
            .json(&body)
            .send()
            .await
            .context("Failed to call report export service")?;
        let body: Value =
            response.json().await.context("Report export service returned non-JSON body")?;

        parse_export_response(&body)
    }
}

fn parse_export_response(body: &Value) -> Result<DownloadLink> {
    let code = body.get("code").and_then(Value::as_i64);
    if code != Some(SUCCESS_CODE) {
        let message = body.get("msg").and_then(Value::as_str).unwrap_or("unknown error");
        anyhow::bail!("Report export failed with code {code:?}: {message}");
    }

    let url = body.get("signedUrl").and_then(Value::as_str);
    let session_token = body.get("sessionToken").and_then(Value::as_str);
    match (url, session_token) {
        (Some(url), Some(session_token)) => {
            Ok(DownloadLink { url: url.to_string(), session_token: session_token.to_string() })
        }
        _ => anyhow::bail!("Report export response is missing signedUrl or sessionToken"),
    }
}
