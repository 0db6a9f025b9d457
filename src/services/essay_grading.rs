//! Client for the remote grading service's server-sent-event endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::config::Settings;
use crate::db::models::Homework;

const TERMINAL_TYPES: [&str; 4] = ["complete", "final", "end", "error"];

/// Highest grade still graded on structure; later grades are graded on development.
const LAST_STRUCTURE_GRADE: i32 = 9;

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GradingRequest {
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) grade: Option<i32>,
    pub(crate) essay_type: Option<String>,
    pub(crate) prompt: Option<String>,
    pub(crate) total_score: Option<i32>,
}

impl GradingRequest {
    pub(crate) fn for_homework(homework: &Homework, title: String, content: String) -> Self {
        Self {
            title,
            content,
            grade: Some(homework.grade),
            essay_type: Some(homework.essay_type.clone()),
            prompt: Some(homework.prompt.clone()).filter(|prompt| !prompt.is_empty()),
            total_score: Some(homework.total_score),
        }
    }

    fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("title".into(), json!(self.title));
        body.insert("content".into(), json!(self.content));
        if let Some(grade) = self.grade {
            body.insert("grade".into(), json!(grade));
        }
        if let Some(essay_type) = &self.essay_type {
            body.insert("essayType".into(), json!(essay_type));
        }
        if let Some(prompt) = &self.prompt {
            body.insert("prompt".into(), json!(prompt));
        }
        if let Some(total) = self.total_score {
            body.insert("totalScore".into(), json!(total));
            let ratio = ScoreRatio::split(self.grade.unwrap_or(LAST_STRUCTURE_GRADE), total);
            body.insert("contentScore".into(), json!(ratio.content));
            body.insert("expressionScore".into(), json!(ratio.expression));
            if ratio.structure > 0 {
                body.insert("structureScore".into(), json!(ratio.structure));
            }
            body.insert("developmentScore".into(), json!(ratio.development));
        }
        Value::Object(body)
    }
}

/// Per-dimension share of a total score. The remainder of the three-way split goes to
/// content; the third dimension is structure up to grade 9 and development after.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScoreRatio {
    pub(crate) content: i32,
    pub(crate) expression: i32,
    pub(crate) structure: i32,
    pub(crate) development: i32,
}

impl ScoreRatio {
    pub(crate) fn split(grade: i32, total: i32) -> Self {
        let base = total / 3;
        let mut ratio =
            Self { content: base + total % 3, expression: base, ..Self::default() };
        if grade <= LAST_STRUCTURE_GRADE {
            ratio.structure = base;
        } else {
            ratio.development = base;
        }
        ratio
    }
}

#[async_trait]
pub(crate) trait GradingClient: Send + Sync {
    /// Streams raw event records into `records` until a terminal record, the end of the
    /// response, a dropped receiver, or `cancel`.
    async fn evaluate_stream(
        &self,
        request: GradingRequest,
        records: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub(crate) struct HttpGradingClient {
    client: Client,
    base_url: String,
}

impl HttpGradingClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let remote = settings.remote();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(remote.connect_timeout_seconds))
            .build()
            .context("Failed to build grading HTTP client")?;

        Ok(Self { client, base_url: remote.grading_base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl GradingClient for HttpGradingClient {
    async fn evaluate_stream(
        &self,
        request: GradingRequest,
        records: mpsc::Sender<String>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let endpoint = format!("{}/evaluate/stream", self.base_url);
        let send = self
            .client
            .post(&endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .json(&request.body())
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            response = send => response.context("Failed to call grading service")?,
        };

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Grading service returned status {status}");
        }

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                chunk = body.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk.context("Grading stream interrupted")?;

            for record in decoder.push(&chunk) {
                let terminal = is_terminal(&record);
                if records.send(record).await.is_err() || terminal {
                    return Ok(());
                }
            }
        }

        if let Some(record) = decoder.finish() {
            let _ = records.send(record).await;
        }
        Ok(())
    }
}

/// Incremental decoder for `data:` lines; a blank line ends a record.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut records = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(record) = self.take_record() {
                    records.push(record);
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }

        records
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            if let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        self.take_record()
    }

    fn take_record(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let record = self.data.join("\n");
        self.data.clear();
        Some(record)
    }
}

fn is_terminal(record: &str) -> bool {
    serde_json::from_str::<Value>(record)
        .ok()
        .and_then(|value| value.get("type").and_then(Value::as_str).map(str::to_string))
        .is_some_and(|kind| TERMINAL_TYPES.contains(&kind.as_str()))
}
