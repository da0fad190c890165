use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use {
    axum::{
        Router,
        extract::{DefaultBodyLimit, Path, State},
        http::StatusCode,
        middleware,
        response::{Html, IntoResponse, Json},
        routing::{delete, get, post},
    },
    pairline_config::PairlineConfig,
    pairline_sessions::SessionId,
    pairline_whatsapp::WhatsAppConnector,
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use crate::{auth, error::GatewayError, pairing, send, state::GatewayState, tasks::TaskSnapshot};

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let api = Router::new()
        .route("/code", get(pairing::code_handler))
        .route("/send-message", post(send::send_message_handler))
        .route("/sessions", get(sessions_handler))
        .route("/sessions/{id}", delete(remove_session_handler))
        .route("/tasks", get(tasks_handler))
        .route("/tasks/{id}", get(task_handler))
        .route("/tasks/{id}/cancel", post(cancel_task_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_token,
        ));

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .merge(api)
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C / SIGTERM.
///
/// On shutdown the listener stops accepting, running bulk sends are
/// cancelled and awaited, and every client is disconnected.
pub async fn start_gateway(
    config: PairlineConfig,
    connector: Arc<dyn WhatsAppConnector>,
) -> anyhow::Result<()> {
    let ip: IpAddr = config
        .server
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address '{}': {e}", config.server.bind))?;
    let addr = SocketAddr::new(ip, config.server.port);

    tokio::fs::create_dir_all(&config.storage.sessions_dir).await?;
    tokio::fs::create_dir_all(&config.storage.uploads_dir).await?;

    let state = GatewayState::new(config, connector);
    let app = build_gateway_app(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let lines = [
        format!("pairline gateway v{}", state.version),
        format!("listening on http://{addr}"),
        format!(
            "sessions: {}",
            state.config.storage.sessions_dir.display()
        ),
        format!("uploads: {}", state.config.storage.uploads_dir.display()),
        format!(
            "auth: {}",
            if state.auth.is_enabled() {
                "token"
            } else {
                "none"
            }
        ),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("draining bulk-send tasks");
    state.tasks.shutdown().await;
    state.sessions.disconnect_all().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn root_handler() -> impl IntoResponse {
    Html(include_str!("assets/index.html"))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "sessions": state.sessions.len().await,
        "running_tasks": state.tasks.running_count().await,
    }))
}

async fn sessions_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(state.sessions.list().await)
}

async fn remove_session_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    let id = SessionId::parse(&id).ok_or(GatewayError::InvalidSessionId)?;
    state
        .sessions
        .remove(&id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(GatewayError::UnknownSession)
}

async fn tasks_handler(State(state): State<Arc<GatewayState>>) -> Json<Vec<TaskSnapshot>> {
    Json(state.tasks.list().await)
}

async fn task_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskSnapshot>, GatewayError> {
    state
        .tasks
        .get(&id)
        .await
        .map(Json)
        .ok_or(GatewayError::UnknownTask)
}

async fn cancel_task_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskSnapshot>, GatewayError> {
    state.tasks.cancel(&id).await.map(Json)
}
