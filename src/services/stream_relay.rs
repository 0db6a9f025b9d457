//! Bridges the grading service's event stream to an internal sink.
//!
//! The remote call runs as its own task and pushes raw JSON records into a bounded channel.
//! The relay reads them in arrival order, forwards normalized messages, and stops at the
//! first terminal record.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::schemas::evaluation::{GradingPayload, PayloadError};

const DEFAULT_ERROR_MESSAGE: &str = "grading service reported an error";

/// One record of the grading service's stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    Progress { message: String, data: Value },
    Complete { data: Value },
    Error { message: String, data: Value },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

impl StreamEvent {
    /// `Ok(None)` for well-formed records of a type the relay does not act on.
    pub(crate) fn parse(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let raw: RawEvent = serde_json::from_str(line)?;
        let message = raw.message.unwrap_or_default();
        Ok(match raw.kind.as_str() {
            "progress" => Some(Self::Progress { message, data: raw.data }),
            "complete" => Some(Self::Complete { data: raw.data }),
            "error" => Some(Self::Error { message, data: raw.data }),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RelayKind {
    Init,
    Part,
    Complete,
    Error,
}

/// Normalized message handed to callers, and written verbatim to SSE clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct RelayMessage {
    #[serde(rename = "type")]
    pub(crate) kind: RelayKind,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub(crate) data: Value,
}

impl RelayMessage {
    pub(crate) fn new(kind: RelayKind, message: impl Into<String>, data: Value) -> Self {
        Self { kind, message: message.into(), data }
    }

    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self::new(RelayKind::Error, message, Value::Null)
    }
}

#[derive(Debug, Error)]
pub(crate) enum RelayError {
    #[error("grading service error: {message}")]
    Remote { message: String, data: Value },
    #[error("grading stream ended without a result")]
    EmptyResult,
    #[error("grading result is invalid: {0}")]
    InvalidPayload(PayloadError),
    #[error("grading was cancelled")]
    Cancelled,
    #[error("grading stream failed: {0}")]
    Producer(String),
}

impl From<PayloadError> for RelayError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Empty => Self::EmptyResult,
            other => Self::InvalidPayload(other),
        }
    }
}

/// Aborts the producer when the relay returns before the stream has drained.
struct ProducerTask(Option<JoinHandle<anyhow::Result<()>>>);

impl ProducerTask {
    async fn outcome(mut self) -> Result<(), RelayError> {
        let Some(handle) = self.0.take() else {
            return Ok(());
        };
        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(RelayError::Producer(format!("{err:#}"))),
            Err(err) if err.is_panic() => Err(RelayError::Producer("stream task panicked".into())),
            Err(err) => Err(RelayError::Producer(err.to_string())),
        }
    }
}

impl Drop for ProducerTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Runs `produce` against a fresh channel of `capacity` records and relays what it emits.
///
/// Progress becomes `part` and errors become `error` on `sink`; a `complete` record is
/// forwarded with its payload and ends the relay. A sink whose receiver is gone is ignored.
pub(crate) async fn relay<F, Fut>(
    produce: F,
    sink: Option<&mpsc::Sender<RelayMessage>>,
    cancel: &CancellationToken,
    capacity: usize,
) -> Result<GradingPayload, RelayError>
where
    F: FnOnce(mpsc::Sender<String>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));
    let producer = ProducerTask(Some(tokio::spawn(produce(tx))));

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            line = rx.recv() => line,
        };
        let Some(line) = line else {
            break;
        };

        match StreamEvent::parse(&line) {
            Ok(Some(StreamEvent::Progress { message, data })) => {
                forward(sink, RelayMessage::new(RelayKind::Part, message, data), cancel).await?;
            }
            Ok(Some(StreamEvent::Complete { data })) => {
                let payload = GradingPayload::new(data)?;
                let done = RelayMessage::new(RelayKind::Complete, "", payload.as_value().clone());
                forward(sink, done, cancel).await?;
                return Ok(payload);
            }
            Ok(Some(StreamEvent::Error { message, data })) => {
                let message =
                    if message.is_empty() { DEFAULT_ERROR_MESSAGE.to_string() } else { message };
                let normalized = RelayMessage::new(RelayKind::Error, message.clone(), data.clone());
                forward(sink, normalized, cancel).await?;
                return Err(RelayError::Remote { message, data });
            }
            Ok(None) => {
                tracing::debug!("Ignoring grading stream record of unknown type");
            }
            Err(err) => {
                metrics::counter!("relay_malformed_events_total").increment(1);
                tracing::warn!(error = %err, "Skipping undecodable grading stream record");
            }
        }
    }

    producer.outcome().await?;
    Err(RelayError::EmptyResult)
}

async fn forward(
    sink: Option<&mpsc::Sender<RelayMessage>>,
    message: RelayMessage,
    cancel: &CancellationToken,
) -> Result<(), RelayError> {
    let Some(sink) = sink else {
        return Ok(());
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        sent = sink.send(message) => {
            if sent.is_err() {
                tracing::debug!("Relay sink closed; continuing without it");
            }
            Ok(())
        }
    }
}
