//! Synchronous essay grading for a single user, serialized per user by a lease.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sqlx::types::Json;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::core::coordination::{CoordinationError, CoordinationStore};
use crate::core::lease::{LeaseError, LeaseLock};
use crate::core::time::{primitive_now_utc, strictly_after};
use crate::db::models::EvaluationLog;
use crate::repositories::{RepositoryError, Repositories};
use crate::schemas::essay::{EssayEvaluateRequest, EvaluateCompleted};
use crate::schemas::evaluation::{EvaluationEdit, GradingPayload, PayloadError};
use crate::schemas::DownloadLink;
use crate::services::download_cache::{fingerprint_single, DownloadCache};
use crate::services::essay_grading::{GradingClient, GradingRequest};
use crate::services::report_export::ReportExporter;
use crate::services::stream_relay::{relay, RelayError, RelayKind, RelayMessage};
use crate::services::Backends;

#[derive(Debug, Error)]
pub(crate) enum EvaluationError {
    #[error("user not found")]
    UserNotFound,
    #[error("no gradings left")]
    QuotaExhausted,
    #[error("a grading is already in progress")]
    InProgress,
    #[error("grading lease was lost before the result could be recorded")]
    OwnershipLost,
    #[error("evaluation not found")]
    NotFound,
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("stored evaluation is unreadable: {0}")]
    Payload(#[from] PayloadError),
    #[error("coordination store unavailable: {0}")]
    Coordination(#[from] CoordinationError),
    #[error("report export failed: {0:#}")]
    Export(anyhow::Error),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for EvaluationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::QuotaExhausted(_) => Self::QuotaExhausted,
            other => Self::Repository(other),
        }
    }
}

#[derive(Clone)]
pub(crate) struct EssayEvaluationService {
    repositories: Repositories,
    coordination: Arc<dyn CoordinationStore>,
    grading: Arc<dyn GradingClient>,
    exporter: Arc<dyn ReportExporter>,
    cache: DownloadCache,
    lock_ttl: Duration,
    lock_max_ttl: Duration,
    relay_capacity: usize,
}

impl EssayEvaluationService {
    pub(crate) fn new(settings: &Settings, backends: &Backends, cache: DownloadCache) -> Self {
        let grading = settings.grading();
        Self {
            repositories: backends.repositories.clone(),
            coordination: backends.coordination.clone(),
            grading: backends.grading.clone(),
            exporter: backends.exporter.clone(),
            cache,
            lock_ttl: grading.lock_ttl(),
            lock_max_ttl: grading.lock_max_ttl(),
            relay_capacity: grading.relay_channel_capacity,
        }
    }

    /// Grades one essay while holding `evaluate:{user_id}`. Progress is streamed to `sink`;
    /// every failure is also reported there before it is returned.
    pub(crate) async fn evaluate_under_lock(
        &self,
        user_id: &str,
        request: EssayEvaluateRequest,
        sink: mpsc::Sender<RelayMessage>,
        cancel: CancellationToken,
    ) -> Result<EvaluationLog, EvaluationError> {
        let result = self.evaluate_inner(user_id, request, &sink, cancel).await;
        if let Err(err) = &result {
            let already_forwarded = matches!(err, EvaluationError::Relay(RelayError::Remote { .. }));
            if !already_forwarded {
                let _ = sink.send(RelayMessage::error(err.to_string())).await;
            }
        }
        result
    }

    async fn evaluate_inner(
        &self,
        user_id: &str,
        request: EssayEvaluateRequest,
        sink: &mpsc::Sender<RelayMessage>,
        cancel: CancellationToken,
    ) -> Result<EvaluationLog, EvaluationError> {
        let user =
            self.repositories.users.find_by_id(user_id).await?.ok_or(EvaluationError::UserNotFound)?;
        if user.grading_quota <= 0 {
            return Err(EvaluationError::QuotaExhausted);
        }

        let mut lease = LeaseLock::new(
            self.coordination.clone(),
            format!("evaluate:{user_id}"),
            self.lock_ttl,
            self.lock_max_ttl,
        );
        match lease.lock().await {
            Ok(()) => {}
            Err(LeaseError::AlreadyHeld(_)) => {
                metrics::counter!("evaluate_lock_rejections_total").increment(1);
                tracing::info!(user_id, "Rejected concurrent evaluation");
                return Err(EvaluationError::InProgress);
            }
            Err(LeaseError::Store(err)) => return Err(err.into()),
            Err(other) => {
                tracing::error!(user_id, error = %other, "Unexpected lease state on acquire");
                return Err(EvaluationError::InProgress);
            }
        }

        let result = self.grade_and_record(user_id, &lease, request, sink, cancel).await;

        match lease.unlock().await {
            Ok(()) if !lease.expired() => {}
            Ok(()) => {
                metrics::counter!("lease_ownership_lost_total").increment(1);
                tracing::warn!(user_id, key = lease.key(), "Evaluation outlived its lease ceiling");
            }
            Err(err) => {
                metrics::counter!("lease_ownership_lost_total").increment(1);
                tracing::warn!(
                    user_id,
                    error = %err,
                    expired = lease.expired(),
                    "Evaluation lease was not released cleanly; exclusivity not guaranteed"
                );
            }
        }

        result
    }

    async fn grade_and_record(
        &self,
        user_id: &str,
        lease: &LeaseLock,
        request: EssayEvaluateRequest,
        sink: &mpsc::Sender<RelayMessage>,
        cancel: CancellationToken,
    ) -> Result<EvaluationLog, EvaluationError> {
        let _ = sink.send(RelayMessage::new(RelayKind::Init, "grading started", json!(null))).await;

        let payload = self.relay_to_user(&request, sink, cancel).await?;

        // Nothing is recorded or charged unless the lease is still ours at commit time.
        match lease.confirm_held().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(user_id, key = lease.key(), "Discarding evaluation after lease loss");
                return Err(EvaluationError::OwnershipLost);
            }
            Err(LeaseError::Store(err)) => return Err(err.into()),
            Err(_) => return Err(EvaluationError::OwnershipLost),
        }

        let now = primitive_now_utc();
        let log = EvaluationLog {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: request.title,
            content: request.content,
            grade: request.grade.unwrap_or_default(),
            essay_type: request.essay_type.unwrap_or_default(),
            prompt: request.prompt.unwrap_or_default(),
            total_score: request.total_score.unwrap_or_default(),
            response: Json(payload.into_value()),
            created_at: now,
            updated_at: now,
        };
        self.repositories.evaluation_logs.insert(&log).await?;
        self.repositories.users.decrement_quota(user_id, 1).await?;

        let completed = EvaluateCompleted {
            id: log.id.clone(),
            code: 0,
            msg: "grading completed".to_string(),
            response: log.response.0.clone(),
        };
        let data = serde_json::to_value(completed).unwrap_or_default();
        let _ = sink.send(RelayMessage::new(RelayKind::Complete, "grading completed", data)).await;

        tracing::info!(user_id, log_id = %log.id, "Essay evaluation recorded");
        Ok(log)
    }

    /// Relays progress and errors to the user, holding back the bare completion so the
    /// final message can carry the stored record id.
    async fn relay_to_user(
        &self,
        request: &EssayEvaluateRequest,
        sink: &mpsc::Sender<RelayMessage>,
        cancel: CancellationToken,
    ) -> Result<GradingPayload, EvaluationError> {
        let grading = self.grading.clone();
        let grading_request = GradingRequest {
            title: request.title.clone(),
            content: request.content.clone(),
            grade: request.grade,
            essay_type: request.essay_type.clone(),
            prompt: request.prompt.clone(),
            total_score: request.total_score,
        };
        let producer_cancel = cancel.clone();
        let (relay_tx, mut relay_rx) = mpsc::channel::<RelayMessage>(self.relay_capacity.max(1));

        let relayed = async move {
            let produce = move |records: mpsc::Sender<String>| async move {
                grading.evaluate_stream(grading_request, records, producer_cancel).await
            };
            relay(produce, Some(&relay_tx), &cancel, self.relay_capacity).await
        };
        let passthrough = async {
            while let Some(message) = relay_rx.recv().await {
                if message.kind != RelayKind::Complete {
                    let _ = sink.send(message).await;
                }
            }
        };

        let (payload, ()) = tokio::join!(relayed, passthrough);
        Ok(payload?)
    }

    pub(crate) async fn download_evaluation(
        &self,
        user_id: &str,
        log_id: &str,
    ) -> Result<DownloadLink, EvaluationError> {
        let log = self.owned_log(user_id, log_id).await?;

        let key = fingerprint_single(log_id);
        if let Some(link) = self.cache.get(&key).await {
            return Ok(link);
        }

        let user =
            self.repositories.users.find_by_id(user_id).await?.ok_or(EvaluationError::UserNotFound)?;
        let payload = GradingPayload::new(log.response.0)?;
        payload.decode()?;

        let link = self
            .exporter
            .export(&user.username, vec![payload.into_value()])
            .await
            .map_err(EvaluationError::Export)?;
        self.cache.set(&key, &link).await;
        Ok(link)
    }

    pub(crate) async fn modify_evaluation(
        &self,
        user_id: &str,
        log_id: &str,
        edit: &EvaluationEdit,
    ) -> Result<EvaluationLog, EvaluationError> {
        let mut log = self.owned_log(user_id, log_id).await?;

        let mut payload = GradingPayload::new(log.response.0.clone())?;
        payload.apply(edit);
        log.response = Json(payload.into_value());
        log.updated_at = strictly_after(log.updated_at, primitive_now_utc());

        if !self.repositories.evaluation_logs.update(&log).await? {
            return Err(EvaluationError::NotFound);
        }
        self.cache.invalidate(&fingerprint_single(log_id)).await;

        tracing::info!(user_id, log_id, "Evaluation modified");
        Ok(log)
    }

    async fn owned_log(&self, user_id: &str, log_id: &str) -> Result<EvaluationLog, EvaluationError> {
        self.repositories
            .evaluation_logs
            .find_by_id(log_id)
            .await?
            .filter(|log| log.user_id == user_id)
            .ok_or(EvaluationError::NotFound)
    }
}
