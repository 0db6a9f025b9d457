pub(crate) mod download_cache;
pub(crate) mod essay_evaluation;
pub(crate) mod essay_grading;
pub(crate) mod homework;
pub(crate) mod ocr;
pub(crate) mod report_export;
pub(crate) mod stream_relay;

use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::core::coordination::{CacheStore, CoordinationStore};
use crate::core::redis::RedisHandle;
use crate::repositories::Repositories;
use crate::services::download_cache::DownloadCache;
use crate::services::essay_evaluation::EssayEvaluationService;
use crate::services::essay_grading::{GradingClient, HttpGradingClient};
use crate::services::homework::HomeworkService;
use crate::services::ocr::{HttpOcrClient, OcrClient};
use crate::services::report_export::{HttpReportExporter, ReportExporter};

/// Every external collaborator the grading core talks to, constructed once per process.
#[derive(Clone)]
pub(crate) struct Backends {
    pub(crate) repositories: Repositories,
    pub(crate) coordination: Arc<dyn CoordinationStore>,
    pub(crate) cache_store: Arc<dyn CacheStore>,
    pub(crate) ocr: Arc<dyn OcrClient>,
    pub(crate) grading: Arc<dyn GradingClient>,
    pub(crate) exporter: Arc<dyn ReportExporter>,
}

impl Backends {
    pub(crate) fn connect(settings: &Settings, db: PgPool, redis: RedisHandle) -> anyhow::Result<Self> {
        let redis = Arc::new(redis);
        Ok(Self {
            repositories: Repositories::postgres(db),
            coordination: redis.clone(),
            cache_store: redis,
            ocr: Arc::new(HttpOcrClient::from_settings(settings)?),
            grading: Arc::new(HttpGradingClient::from_settings(settings)?),
            exporter: Arc::new(HttpReportExporter::from_settings(settings)?),
        })
    }
}

#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) essays: EssayEvaluationService,
    pub(crate) homeworks: HomeworkService,
}

impl Services {
    pub(crate) fn new(settings: &Settings, backends: &Backends) -> Self {
        let cache = DownloadCache::new(backends.cache_store.clone(), settings.cache().download_ttl());
        Self {
            essays: EssayEvaluationService::new(settings, backends, cache.clone()),
            homeworks: HomeworkService::new(backends, cache),
        }
    }
}
