use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Query, State},
        http::{StatusCode, header},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    serde::Deserialize,
    teamsync_bridge::{
        BridgeService, CommandContext, LocalPlatform, NotificationBatch, RemoteClient,
    },
    teamsync_common::LocalPost,
    teamsync_config::{Severity, TeamsyncConfig, validate},
    tokio_util::sync::CancellationToken,
    tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer},
    tracing::{debug, error, info, warn},
};

use crate::{events::TracingEventSink, state::GatewayState, storage::open_store};

const MAX_BODY_BYTES: usize = 1024 * 1024;

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(notification_handler).post(notification_handler))
        .route("/api/posts", post(post_created_handler))
        .route("/api/commands", post(command_handler))
        .route("/health", get(health_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Validate the configuration, open the store and serve the bridge until
/// `shutdown` fires.
pub async fn run_bridge(
    config: TeamsyncConfig,
    remote: Arc<dyn RemoteClient>,
    local: Arc<dyn LocalPlatform>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let report = validate(&config);
    for diagnostic in &report.diagnostics {
        match diagnostic.severity {
            Severity::Error => error!(%diagnostic, "invalid configuration"),
            Severity::Warning => warn!(%diagnostic, "configuration warning"),
        }
    }
    if report.has_errors() {
        anyhow::bail!("configuration has errors, refusing to start");
    }

    let store = open_store(&config.storage).await?;
    let bridge = Arc::new(BridgeService::new(
        config.bridge,
        store,
        remote,
        local,
        Some(Arc::new(TracingEventSink)),
    ));
    start_gateway(&config.server.bind, config.server.port, bridge, shutdown).await
}

/// Listen on `bind:port`, then start the bridge and serve until `shutdown`
/// fires.
///
/// The listener is up before any subscription is created so the remote
/// platform's validation request can be answered.
pub async fn start_gateway(
    bind: &str,
    port: u16,
    bridge: Arc<BridgeService>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_gateway_app(GatewayState::new(Arc::clone(&bridge)));
    info!(%addr, "gateway listening");

    let serve_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await
    });

    if let Err(e) = bridge.start().await {
        error!(error = %e, "bridge failed to start");
        shutdown.cancel();
        match server.await {
            Ok(Ok(())) => {},
            Ok(Err(serve_error)) => warn!(error = %serve_error, "gateway server failed while shutting down"),
            Err(join_error) => warn!(error = %join_error, "gateway server task failed"),
        }
        return Err(e.into());
    }

    let served = server.await;
    bridge.stop().await;
    served??;
    info!("gateway stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    #[serde(rename = "validationToken")]
    validation_token: Option<String>,
}

/// Remote notification webhook.
///
/// A `validationToken` query parameter is the subscription handshake and is
/// echoed back verbatim. Anything else is a notification batch, acknowledged
/// before processing.
async fn notification_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<NotificationQuery>,
    body: Bytes,
) -> Response {
    if let Some(token) = query.validation_token {
        debug!("answering subscription validation");
        return (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], token).into_response();
    }

    let batch: NotificationBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            warn!(error = %e, "malformed notification body");
            return (StatusCode::BAD_REQUEST, "malformed notification body").into_response();
        },
    };

    debug!(count = batch.value.len(), "received notifications");
    for notification in batch.value {
        let engine = Arc::clone(state.bridge.engine());
        tokio::spawn(async move {
            if let Err(e) = engine.on_remote_notification(&notification).await {
                warn!(
                    subscription_id = %notification.subscription_id,
                    resource = %notification.resource,
                    error = %e,
                    "failed to mirror remote message"
                );
            }
        });
    }
    StatusCode::ACCEPTED.into_response()
}

/// Local post-created hook.
async fn post_created_handler(
    State(state): State<Arc<GatewayState>>,
    Json(post): Json<LocalPost>,
) -> StatusCode {
    let engine = Arc::clone(state.bridge.engine());
    tokio::spawn(async move {
        if let Err(e) = engine.on_local_post_created(&post).await {
            warn!(post_id = %post.id, channel_id = %post.channel_id, error = %e, "failed to forward post");
        }
    });
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    #[serde(flatten)]
    context: CommandContext,
    command: String,
}

async fn command_handler(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<CommandRequest>,
) -> impl IntoResponse {
    let response = state
        .bridge
        .execute_command(&request.context, &request.command)
        .await;
    Json(response)
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let health = state.bridge.health();
    let degraded = health.subscriptions.iter().filter(|s| s.degraded).count();
    Json(serde_json::json!({
        "status": if degraded == 0 { "ok" } else { "degraded" },
        "version": state.version,
        "bridge": health,
    }))
}
