use std::sync::Arc;

use {
    axum::{
        extract::{Query, Request, State},
        http::{HeaderMap, header::AUTHORIZATION},
        middleware::Next,
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    tracing::warn,
};

use crate::{error::GatewayError, state::GatewayState};

// ── Types ────────────────────────────────────────────────────────────────────

/// Resolved gateway auth configuration.
#[derive(Debug, Clone, Default)]
pub struct ResolvedAuth {
    pub token: Option<String>,
}

impl ResolvedAuth {
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

/// Result of an authentication attempt.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub ok: bool,
    pub reason: Option<&'static str>,
}

impl AuthResult {
    fn allowed() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    fn denied(reason: &'static str) -> Self {
        Self {
            ok: false,
            reason: Some(reason),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    // XOR each byte and accumulate; any difference makes result non-zero.
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

// ── Auth logic ───────────────────────────────────────────────────────────────

/// Resolve auth config. An empty token disables auth.
pub fn resolve_auth(token: Option<String>) -> ResolvedAuth {
    ResolvedAuth {
        token: token.filter(|t| !t.is_empty()),
    }
}

/// Check a request's credentials. The bearer header wins over `?token=`.
pub fn authorize_request(
    auth: &ResolvedAuth,
    bearer: Option<&str>,
    query_token: Option<&str>,
) -> AuthResult {
    let Some(expected) = auth.token.as_deref() else {
        return AuthResult::allowed();
    };
    let Some(given) = bearer.or(query_token) else {
        return AuthResult::denied("token_missing");
    };
    if !safe_equal(given, expected) {
        return AuthResult::denied("token_mismatch");
    }
    AuthResult::allowed()
}

/// Middleware guarding the API routes.
pub async fn require_token(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.is_enabled() {
        return next.run(request).await;
    }
    let query = Query::<TokenQuery>::try_from_uri(request.uri())
        .map(|Query(q)| q)
        .unwrap_or_default();
    let result = authorize_request(
        &state.auth,
        bearer_token(request.headers()),
        query.token.as_deref(),
    );
    if result.ok {
        return next.run(request).await;
    }
    warn!(
        path = %request.uri().path(),
        reason = result.reason.unwrap_or("unknown"),
        "rejected unauthenticated request"
    );
    GatewayError::Unauthorized.into_response()
}
