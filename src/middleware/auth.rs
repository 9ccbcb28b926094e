//! Session middleware: composes verify → resolve → context injection for
//! every protected request.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::ApiError;

use super::GatewayState;

/// Raw bearer token for the current request, kept around so logout can
/// revoke it.
#[derive(Clone)]
pub struct SessionToken(pub String);

/// Validates the bearer token, resolves the tenant context, and injects
/// both into the request. Multi-tenant users select a tenant with the
/// `x-tenant-id` header.
pub async fn session_middleware(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers).map_err(ApiError::unauthorized)?;
    let selection = extract_tenant_selection(&headers)?;

    let identity = state.authenticator.verify(&token).await?;
    let context = state.resolver.resolve(&identity, selection).await?;

    request.extensions_mut().insert(identity);
    request.extensions_mut().insert(context);
    request.extensions_mut().insert(SessionToken(token));

    Ok(next.run(request).await)
}

/// Extract the session token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty bearer token".to_string());
        }
        Ok(token.to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

fn extract_tenant_selection(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
    match headers.get("x-tenant-id") {
        None => Ok(None),
        Some(value) => {
            let s = value
                .to_str()
                .map_err(|_| ApiError::bad_request("Invalid x-tenant-id header"))?;
            let id = Uuid::parse_str(s)
                .map_err(|_| ApiError::bad_request("x-tenant-id must be a UUID"))?;
            Ok(Some(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc123");
    }

    #[test]
    fn missing_header_is_rejected() {
        let headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert!(extract_bearer_token(&headers).is_err());
    }

    #[test]
    fn tenant_selection_requires_uuid() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", HeaderValue::from_static("not-a-uuid"));
        assert!(extract_tenant_selection(&headers).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-tenant-id",
            HeaderValue::from_static("4f2c9e1a-71b8-4a39-9d5c-0b6a7c8d9e0f"),
        );
        assert!(extract_tenant_selection(&headers).unwrap().is_some());
    }
}
