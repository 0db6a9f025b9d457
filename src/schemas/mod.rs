use std::collections::HashMap;

use serde::Serialize;

pub(crate) mod essay;
pub(crate) mod evaluation;
pub(crate) mod homework;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

/// Signed link to an exported evaluation report; also the value stored in the download cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DownloadLink {
    pub(crate) url: String,
    pub(crate) session_token: String,
}
