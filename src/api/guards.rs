use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::errors::ApiError;

/// Header the gateway sets after authenticating the caller.
pub(crate) const USER_ID_HEADER: &str = "x-user-id";

const MAX_USER_ID_LEN: usize = 64;

/// Caller identity as forwarded by the gateway. Only the id is trusted here; roles and quota
/// are loaded by the services that need them.
pub(crate) struct CurrentUser(pub(crate) String);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= MAX_USER_ID_LEN)
            .ok_or(ApiError::Unauthorized("Missing caller identity"))?;

        Ok(CurrentUser(user_id.to_string()))
    }
}
