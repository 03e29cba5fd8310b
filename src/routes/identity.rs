use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::AppError;

/// Header carrying the caller's profile id, set by the fronting identity provider.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the caller, absent for anonymous players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub Option<Uuid>);

impl Caller {
    /// Profile id, or 401 when the request is anonymous.
    pub fn require(self) -> Result<Uuid, AppError> {
        self.0.ok_or_else(|| {
            AppError::Unauthorized(format!("missing caller identity header `{USER_ID_HEADER}`"))
        })
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(Caller(None));
        };
        let raw = value
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("`{USER_ID_HEADER}` is not valid text")))?;
        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| AppError::BadRequest(format!("`{USER_ID_HEADER}` is not a UUID")))?;
        Ok(Caller(Some(id)))
    }
}
