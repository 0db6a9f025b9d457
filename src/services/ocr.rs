use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OcrText {
    pub(crate) title: String,
    pub(crate) content: String,
}

#[async_trait]
pub(crate) trait OcrClient: Send + Sync {
    /// Recognizes the essay title and body from handwritten page images.
    async fn recognize(&self, images: &[String]) -> Result<OcrText>;
}

#[derive(Debug, Clone)]
pub(crate) struct HttpOcrClient {
    client: Client,
    base_url: String,
    env_header: Option<String>,
}

impl HttpOcrClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let remote = settings.remote();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(remote.connect_timeout_seconds))
            .timeout(Duration::from_secs(remote.request_timeout_seconds))
            .build()
            .context("Failed to build OCR HTTP client")?;

        Ok(Self {
            client,
            base_url: remote.ocr_base_url.trim_end_matches('/').to_string(),
            env_header: remote.env_header.clone(),
        })
    }
}

#[async_trait]
impl OcrClient for HttpOcrClient {
    async fn recognize(&self, images: &[String]) -> Result<OcrText> {
        let endpoint = format!("{}/sts/ocr/title/ark/url", self.base_url);
        let mut request = self.client.post(&endpoint).json(&json!({ "images": images }));
        if let Some(env) = &self.env_header {
            request = request.header("X-Xh-Env", env);
        }

        let response = request.send().await.context("Failed to call OCR service")?;
        let status = response.status();
        let body: Value = response.json().await.context("OCR service returned non-JSON body")?;
        if !status.is_success() {
            anyhow::bail!("OCR service failed (status {status}): {}", message_of(&body));
        }

        parse_ocr_response(&body)
    }
}

fn message_of(body: &Value) -> &str {
    body.get("msg").or_else(|| body.get("message")).and_then(Value::as_str).unwrap_or("unknown error")
}

fn parse_ocr_response(body: &Value) -> Result<OcrText> {
    let code = body.get("code").and_then(Value::as_i64);
    if code != Some(0) {
        anyhow::bail!("OCR service returned code {:?}: {}", code, message_of(body));
    }

    let data = body.get("data").context("OCR response is missing data")?;
    let title = data.get("title").and_then(Value::as_str).unwrap_or_default().trim();
    let content = data
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .context("OCR response has no recognized content")?;

    Ok(OcrText { title: title.to_string(), content: content.to_string() })
}
