use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::EvaluationLog;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EssayEvaluateRequest {
    #[validate(length(min = 1, max = 255))]
    pub(crate) title: String,
    #[validate(length(min = 1, max = 20000))]
    #[serde(alias = "text")]
    pub(crate) content: String,
    #[validate(range(min = 1, max = 12))]
    pub(crate) grade: Option<i32>,
    #[serde(default)]
    pub(crate) essay_type: Option<String>,
    #[serde(default)]
    pub(crate) prompt: Option<String>,
    #[validate(range(min = 1, max = 1000))]
    pub(crate) total_score: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EvaluateCompleted {
    pub(crate) id: String,
    pub(crate) code: i32,
    pub(crate) msg: String,
    pub(crate) response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EvaluationLogResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) grade: i32,
    pub(crate) essay_type: String,
    pub(crate) total_score: i32,
    pub(crate) response: serde_json::Value,
    pub(crate) updated_at: String,
}

impl From<EvaluationLog> for EvaluationLogResponse {
    fn from(log: EvaluationLog) -> Self {
        Self {
            id: log.id,
            title: log.title,
            grade: log.grade,
            essay_type: log.essay_type,
            total_score: log.total_score,
            response: log.response.0,
            updated_at: format_primitive(log.updated_at),
        }
    }
}
