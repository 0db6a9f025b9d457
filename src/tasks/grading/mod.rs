//! Asynchronous grading of homework submissions.

mod maintenance;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::Settings;
use crate::core::coordination::CoordinationStore;
use crate::repositories::Repositories;
use crate::services::essay_grading::GradingClient;
use crate::services::ocr::OcrClient;
use crate::services::Backends;

pub(crate) use maintenance::process_timeout_submissions;
pub(crate) use worker::process_pending_submissions;
#[cfg(test)]
pub(crate) use worker::{process_one_submission, SubmissionOutcome};

/// Collaborators and limits shared by every poller tick.
#[derive(Clone)]
pub(crate) struct GradingPipeline {
    repositories: Repositories,
    coordination: Arc<dyn CoordinationStore>,
    ocr: Arc<dyn OcrClient>,
    grading: Arc<dyn GradingClient>,
    claim_ttl: Duration,
    stale_timeout: Duration,
    relay_capacity: usize,
}

impl GradingPipeline {
    pub(crate) fn new(settings: &Settings, backends: &Backends) -> Self {
        let grading = settings.grading();
        Self {
            repositories: backends.repositories.clone(),
            coordination: backends.coordination.clone(),
            ocr: backends.ocr.clone(),
            grading: backends.grading.clone(),
            claim_ttl: grading.lock_ttl(),
            stale_timeout: grading.stale_timeout(),
            relay_capacity: grading.relay_channel_capacity,
        }
    }
}

#[cfg(test)]
mod tests;
