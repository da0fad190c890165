//! `GET /code`: link a device and hand back its pairing code.

use std::sync::Arc;

use {
    axum::{
        extract::{Query, State},
        response::{Html, IntoResponse, Response},
    },
    pairline_sessions::{Session, SessionId},
    pairline_whatsapp::{LinkOutcome, LinkRequest, sanitize_phone},
    serde::Deserialize,
    tracing::{info, warn},
};

use crate::{error::GatewayError, state::GatewayState};

pub const ALREADY_PAIRED: &str = "Already paired";

#[derive(Debug, Default, Deserialize)]
pub struct CodeQuery {
    pub number: Option<String>,
    /// Reuse this session's workspace instead of minting a new one.
    pub session: Option<String>,
}

pub async fn code_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<CodeQuery>,
) -> Result<Response, GatewayError> {
    let phone = sanitize_phone(query.number.as_deref().unwrap_or_default());
    if phone.is_empty() {
        return Err(GatewayError::InvalidNumber);
    }

    let session_id = match query.session.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            SessionId::parse(raw).ok_or(GatewayError::InvalidSessionId)?
        },
        _ => state.sessions.mint_id(),
    };

    if let Some(existing) = state.sessions.get(&session_id).await {
        if existing.client.is_paired() {
            info!(session = %session_id, "session already paired");
            return Ok(ALREADY_PAIRED.into_response());
        }
        // Stale link attempt; drop it before asking for a fresh code.
        state.sessions.remove(&session_id).await;
    }

    pair_session(&state, session_id, phone).await
}

async fn pair_session(
    state: &GatewayState,
    session_id: SessionId,
    phone: String,
) -> Result<Response, GatewayError> {
    let request = LinkRequest {
        store_dir: state.sessions.workspace_dir(&session_id),
        phone: phone.clone(),
        timeout: state.pairing_timeout(),
    };
    info!(session = %session_id, phone = %phone, "requesting pairing code");

    let outcome = state.connector.link(request).await.map_err(|e| {
        warn!(session = %session_id, error = %e, "pairing failed");
        GatewayError::from(e)
    })?;

    let response = match &outcome {
        LinkOutcome::PairingCode { code, .. } => Html(render_code_page(code, &session_id)).into_response(),
        LinkOutcome::AlreadyPaired { .. } => ALREADY_PAIRED.into_response(),
    };
    let client = Arc::clone(outcome.client());
    if let Some(replaced) = state
        .sessions
        .insert(Session::new(session_id, phone, client))
        .await
    {
        replaced.client.disconnect().await;
    }
    Ok(response)
}

fn render_code_page(code: &str, session_id: &SessionId) -> String {
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Pairing Code</title></head>
<body>
  <h2>Pairing Code:</h2>
  <h1>{code}</h1>
  <p>WhatsApp → Linked Devices → Link with phone number → Enter Code</p>
  <p>Session: <code>{session_id}</code></p>
  <a href="/">Back</a>
</body>
</html>
"#,
        code = escape_html(code),
    )
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
