//! Tenant extraction and throttling middleware.
//!
//! Authentication itself lives upstream (bot gateway / reverse proxy); by
//! the time a request reaches this service, the authenticated end-user id is
//! carried in the `x-tenant-id` header. Every tenant-scoped route runs
//! behind this middleware, so handlers can rely on a validated tenant being
//! present in request extensions.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use crate::{
    error::{Error, Result},
    state::AppState,
};

pub const TENANT_HEADER: &str = "x-tenant-id";

const MAX_TENANT_ID_LENGTH: usize = 128;

/// Authenticated tenant extracted from the gateway header.
#[derive(Debug, Clone)]
pub struct AuthenticatedTenant {
    pub id: String,
}

/// Validates the raw header value: non-empty, bounded, visible ASCII.
fn parse_tenant_id(headers: &HeaderMap) -> Result<String> {
    let value = headers
        .get(TENANT_HEADER)
        .ok_or_else(|| Error::Unauthorized("Missing tenant identity".to_string()))?;

    let tenant_id = value
        .to_str()
        .map_err(|_| Error::Unauthorized("Malformed tenant identity".to_string()))?
        .trim();

    if tenant_id.is_empty() || tenant_id.len() > MAX_TENANT_ID_LENGTH {
        return Err(Error::Unauthorized("Malformed tenant identity".to_string()));
    }

    if !tenant_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
    {
        return Err(Error::Unauthorized("Malformed tenant identity".to_string()));
    }

    Ok(tenant_id.to_string())
}

/// Resolves the tenant and enforces the per-tenant request budget, then
/// exposes `AuthenticatedTenant` to handlers via request extensions.
pub async fn tenant_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let tenant_id = parse_tenant_id(&headers)?;

    state.rate_limiter.check(&tenant_id, Utc::now())?;

    request
        .extensions_mut()
        .insert(AuthenticatedTenant { id: tenant_id });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TENANT_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_valid_tenant_ids() {
        for id in ["123456789", "tg:93772205", "user_7.a-b"] {
            assert_eq!(parse_tenant_id(&headers_with(id)).unwrap(), id);
        }
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        let err = parse_tenant_id(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert!(parse_tenant_id(&headers_with("   ")).is_err());
        assert!(parse_tenant_id(&headers_with(&"x".repeat(129))).is_err());
    }

    #[test]
    fn test_rejects_unexpected_characters() {
        assert!(parse_tenant_id(&headers_with("abc def")).is_err());
        assert!(parse_tenant_id(&headers_with("abc;drop")).is_err());
    }
}
