use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

/// Issuing-account id for the authenticated caller.
///
/// Token verification happens upstream (standard bearer-token auth in front
/// of this service); the verified account id arrives in `X-Owner-Id`.
/// Requests without it are rejected, and every invoice operation is scoped
/// to this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner_id = parts
            .headers
            .get("X-Owner-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing or invalid X-Owner-Id header"))
            })?;

        tracing::Span::current().record("owner_id", owner_id);

        Ok(OwnerId(owner_id))
    }
}
