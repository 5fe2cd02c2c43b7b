//! Relay HTTP surface
//!
//! Axum server carrying the provider webhooks and the operator API.
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning plain values, so the behaviour is testable without a socket.
//!
//! Endpoints:
//! - GET  /health              store health
//! - GET  /version             server version info
//! - POST /webhooks/sms        inbound SMS (form)
//! - GET  /webhooks/meta       Meta verification handshake
//! - POST /webhooks/meta       inbound Messenger, Instagram and WhatsApp
//! - POST /webhooks/voice      call start (form)
//! - POST /webhooks/voice/turn speech turn (form)
//! - POST /send                outbound send gateway
//! - POST /generate            AI reply for a conversation
//! - POST /train               knowledge base from a website
//! - POST /learn               knowledge base from an operator reply
//! - GET  /events              new-message stream (SSE)

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::Stream;
use relay_core::api::{
    GenerateReplyRequest, LearnRequest, RelayRequest, RelayResponse, SendMessageRequest,
    TrainRequest, PROTOCOL_VERSION,
};
use relay_core::channels::meta::decode_meta;
use relay_core::channels::sms::parse_sms_form;
use relay_core::channels::voice::parse_voice_form;
use relay_core::channels::{Decoded, VoiceMarkup, WebhookVerifyQuery, META_ACK, SMS_ACK};
use relay_core::models::InboundEvent;
use relay_core::RelayError;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::auth;
use crate::state::RelayState;
use crate::subsystems::events::RelayEvent;
use crate::subsystems::{inbound, voice};

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/webhooks/sms", post(sms_handler))
        .route("/webhooks/meta", get(meta_verify_handler).post(meta_event_handler))
        .route("/webhooks/voice", post(voice_start_handler))
        .route("/webhooks/voice/turn", post(voice_turn_handler))
        .route("/send", post(send_handler))
        .route("/generate", post(generate_handler))
        .route("/train", post(train_handler))
        .route("/learn", post(learn_handler))
        .route("/events", get(events_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<RelayState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Relay HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Response types
// ============================================================================

/// What a webhook sends back to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookReply {
    /// 200 with `text/xml`.
    Xml(String),
    Text(StatusCode, String),
    Json(StatusCode, serde_json::Value),
}

impl WebhookReply {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookReply::Xml(_) => StatusCode::OK,
            WebhookReply::Text(status, _) | WebhookReply::Json(status, _) => *status,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        WebhookReply::Json(StatusCode::OK, serde_json::json!({ "error": message.into() }))
    }
}

impl IntoResponse for WebhookReply {
    fn into_response(self) -> Response {
        match self {
            WebhookReply::Xml(body) => {
                (StatusCode::OK, [(header::CONTENT_TYPE, "text/xml")], body).into_response()
            }
            WebhookReply::Text(status, body) => (status, body).into_response(),
            WebhookReply::Json(status, body) => (status, Json(body)).into_response(),
        }
    }
}

impl From<VoiceMarkup> for WebhookReply {
    fn from(markup: VoiceMarkup) -> Self {
        WebhookReply::Xml(markup.render())
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct EventsQuery {
    pub tenant_id: Option<Uuid>,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(state: &RelayState) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(RelayRequest::Health, None, state).await;
    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
            }
            (StatusCode::OK, data)
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e,
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
    })
}

pub async fn sms_inner(state: &RelayState, form: HashMap<String, String>) -> WebhookReply {
    let event = match parse_sms_form(&form) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected SMS webhook");
            return WebhookReply::Json(
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Missing fields" }),
            );
        }
    };

    let Some(message) = InboundEvent::Sms(event).into_message() else {
        return WebhookReply::Xml(SMS_ACK.to_string());
    };

    match inbound::ingest_message(state, message).await {
        Ok(_) => WebhookReply::Xml(SMS_ACK.to_string()),
        Err(RelayError::TenantNotFound { address, .. }) => {
            tracing::warn!(to = %address, "No tenant for SMS number");
            WebhookReply::Xml(SMS_ACK.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "SMS webhook failed");
            WebhookReply::error(e.to_string())
        }
    }
}

pub fn meta_verify_inner(state: &RelayState, query: &WebhookVerifyQuery) -> WebhookReply {
    match query.accept(&state.config.meta.verify_token) {
        Some(challenge) => WebhookReply::Text(StatusCode::OK, challenge.to_string()),
        None => {
            tracing::warn!("Meta verification rejected");
            WebhookReply::Text(StatusCode::FORBIDDEN, "Forbidden".to_string())
        }
    }
}

pub async fn meta_event_inner(state: &RelayState, body: &[u8]) -> WebhookReply {
    let ack = WebhookReply::Text(StatusCode::OK, META_ACK.to_string());

    let event = match decode_meta(body) {
        Ok(Decoded::Event(event)) => event,
        Ok(Decoded::Ignorable(reason)) => {
            tracing::debug!(reason = %reason, "Ignoring Meta event");
            return ack;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable Meta payload");
            return ack;
        }
    };

    let Some(message) = event.into_message() else {
        return ack;
    };

    match inbound::ingest_message(state, message).await {
        Ok(_) => ack,
        Err(RelayError::TenantNotFound { channel, address }) => {
            tracing::warn!(channel = %channel, id = %address, "No tenant for Meta id");
            WebhookReply::Text(StatusCode::OK, format!("No tenant found for ID {}", address))
        }
        Err(e) => {
            tracing::error!(error = %e, "Meta webhook failed");
            WebhookReply::error(e.to_string())
        }
    }
}

pub async fn voice_inner(
    state: &RelayState,
    form: HashMap<String, String>,
    is_turn_callback: bool,
) -> WebhookReply {
    match parse_voice_form(&form) {
        Ok(event) => voice::handle_callback(state, event, is_turn_callback).await.into(),
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable voice webhook");
            VoiceMarkup::terminal(None, voice::VOICE_ERROR).into()
        }
    }
}

/// Authenticate, then route. Auth failures are 401; everything else is a
/// 200 carrying either the result or `{"error": ...}`.
pub async fn operator_inner(
    state: &RelayState,
    headers: &HeaderMap,
    request: RelayRequest,
) -> (StatusCode, serde_json::Value) {
    let caller = match auth::authenticate(state, headers).await {
        Ok(c) => c,
        Err(e) => return unauthorized(e),
    };

    let response = crate::router::handle_request(request, Some(&caller), state).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::OK, serde_json::json!({ "error": e })),
    }
}

pub async fn train_inner(
    state: &RelayState,
    headers: &HeaderMap,
    request: TrainRequest,
) -> (StatusCode, serde_json::Value) {
    if request.url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Missing URL" }),
        );
    }
    operator_inner(state, headers, RelayRequest::Train(request)).await
}

fn unauthorized(e: RelayError) -> (StatusCode, serde_json::Value) {
    tracing::warn!(error = %e, "Rejected operator call");
    (StatusCode::UNAUTHORIZED, serde_json::json!({ "error": e.to_string() }))
}

/// Event stream for one tenant. Lagging subscribers skip what they missed.
pub fn tenant_events(
    rx: broadcast::Receiver<RelayEvent>,
    tenant_id: Uuid,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(rx, move |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.tenant_id() == tenant_id => {
                    match Event::default().event("message_stored").json_data(&event) {
                        Ok(sse) => return Some((Ok(sse), rx)),
                        Err(e) => tracing::warn!(error = %e, "Unserializable relay event"),
                    }
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(tenant_id = %tenant_id, skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn sms_handler(
    State(state): State<Arc<RelayState>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    sms_inner(&state, form).await
}

pub async fn meta_verify_handler(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<WebhookVerifyQuery>,
) -> impl IntoResponse {
    meta_verify_inner(&state, &query)
}

pub async fn meta_event_handler(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> impl IntoResponse {
    meta_event_inner(&state, &body).await
}

pub async fn voice_start_handler(
    State(state): State<Arc<RelayState>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    voice_inner(&state, form, false).await
}

pub async fn voice_turn_handler(
    State(state): State<Arc<RelayState>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    voice_inner(&state, form, true).await
}

pub async fn send_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    let (status, body) = operator_inner(&state, &headers, RelayRequest::Send(req)).await;
    (status, Json(body))
}

pub async fn generate_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(req): Json<GenerateReplyRequest>,
) -> impl IntoResponse {
    let (status, body) = operator_inner(&state, &headers, RelayRequest::Generate(req)).await;
    (status, Json(body))
}

pub async fn train_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(req): Json<TrainRequest>,
) -> impl IntoResponse {
    let (status, body) = train_inner(&state, &headers, req).await;
    (status, Json(body))
}

pub async fn learn_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(req): Json<LearnRequest>,
) -> impl IntoResponse {
    let (status, body) = operator_inner(&state, &headers, RelayRequest::Learn(req)).await;
    (status, Json(body))
}

pub async fn events_handler(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Query(query): Query<EventsQuery>,
) -> Response {
    let tenant = match auth::authenticate(&state, &headers).await {
        Ok(caller) => caller.tenant(&state, query.tenant_id).await,
        Err(e) => Err(e),
    };
    let tenant = match tenant {
        Ok(t) => t,
        Err(e) => {
            let (status, body) = unauthorized(e);
            return (status, Json(body)).into_response();
        }
    };

    tracing::info!(tenant_id = %tenant.tenant_id, "Event stream subscribed");
    Sse::new(tenant_events(state.events.subscribe(), tenant.tenant_id))
        .keep_alive(KeepAlive::default())
        .into_response()
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert a router `RelayResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: RelayResponse) -> std::result::Result<serde_json::Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
