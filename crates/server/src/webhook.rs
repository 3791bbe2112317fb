use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use showings_core::dispatch::FunctionCallHandler;
use tracing::warn;
use uuid::Uuid;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct WebhookState {
    handler: Arc<FunctionCallHandler>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookReply {
    pub result: String,
}

pub fn router(handler: Arc<FunctionCallHandler>) -> Router {
    Router::new().route("/webhook", post(webhook)).with_state(WebhookState { handler })
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Always answers 200 with a speakable `result`; the voice platform reads it
/// aloud whatever happened.
pub async fn webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> ([(&'static str, String); 1], Json<WebhookReply>) {
    let correlation_id = correlation_id(&headers);

    let payload = serde_json::from_slice::<Value>(&body).unwrap_or_else(|error| {
        warn!(
            event_name = "webhook.body_not_json",
            correlation_id = %correlation_id,
            body_len = body.len(),
            error = %error,
            "request body is not valid JSON"
        );
        Value::Null
    });

    let reply = state.handler.handle(payload, &correlation_id).await;

    ([(CORRELATION_HEADER, correlation_id)], Json(WebhookReply { result: reply.text }))
}
