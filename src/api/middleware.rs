//! API Middleware
//!
//! API key authentication, actor resolution and request logging.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::audit::sha256_hex;
use crate::domain::OperationContext;
use crate::error::AppError;

use super::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const REQUEST_USER_HEADER: &str = "X-Request-User-Id";
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

// =========================================================================
// Authentication
// =========================================================================

/// Validate `X-API-Key`, resolve `X-Request-User-Id` to an actor and
/// attach the resulting [`OperationContext`] to the request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::MissingHeader(API_KEY_HEADER.to_string()).into_response())?;

    let key_hash = sha256_hex(api_key);
    if !state.api_key_hashes.iter().any(|accepted| *accepted == key_hash) {
        tracing::warn!("Rejected request with unknown API key");
        return Err(AppError::InvalidApiKey.into_response());
    }

    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new()
        .with_api_key(api_key_id(&key_hash))
        .with_correlation_id(correlation_id);

    // Reads work without an actor; mutating routes require one
    if let Some(raw) = headers.get(REQUEST_USER_HEADER) {
        let user_id = raw
            .to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .ok_or_else(|| {
                AppError::InvalidRequest(format!("Invalid {} header format", REQUEST_USER_HEADER))
                    .into_response()
            })?;

        let actor = state
            .users()
            .resolve_actor(user_id)
            .await
            .map_err(IntoResponse::into_response)?;
        context = context.with_actor(actor);
    }

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

/// Stable id for an API key, derived from its hash
fn api_key_id(key_hash: &str) -> Uuid {
    key_hash
        .get(..32)
        .and_then(|prefix| u128::from_str_radix(prefix, 16).ok())
        .map(Uuid::from_u128)
        .unwrap_or_else(Uuid::nil)
}

// =========================================================================
// Logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
