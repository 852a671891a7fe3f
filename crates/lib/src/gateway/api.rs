//! HTTP routes. The router only needs the client (to send) and the supervisor (to know whether
//! sending can work right now).

use crate::client::MessagingClient;
use crate::supervisor::Supervisor;
use axum::{
    extract::{FromRequest, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared state for the HTTP routes.
#[derive(Clone)]
pub struct ApiState {
    pub client: Arc<dyn MessagingClient>,
    pub supervisor: Arc<Supervisor>,
    /// Reported by the health route.
    pub port: u16,
    /// When Some, POST routes require `Authorization: Bearer <token>`.
    pub token: Option<String>,
}

/// Body of POST /send (JSON or form).
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SendQuery {
    pub to: Option<String>,
}

type ApiResponse = (StatusCode, Json<Value>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    (status, Json(json!({ "ok": false, "error": message.into() })))
}

/// Extractor rejection: an oversized body keeps its 413, anything else is a bad request.
fn rejection(status: StatusCode, message: String) -> ApiResponse {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        error(status, message)
    } else {
        error(StatusCode::BAD_REQUEST, message)
    }
}

pub fn routes(state: ApiState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/send", post(send))
        .with_state(state)
}

/// GET / returns a simple health JSON (for probes).
async fn health(State(state): State<ApiState>) -> Json<Value> {
    let connection = state.supervisor.state();
    Json(json!({
        "runtime": "running",
        "client": connection.label(),
        "connection": connection,
        "port": state.port,
    }))
}

fn authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim() == expected)
        .unwrap_or(false)
}

/// Decode the body by content type: JSON, form, or plain text with `?to=`.
async fn parse_send_request(
    query: SendQuery,
    request: Request,
) -> Result<SendRequest, ApiResponse> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    if content_type.starts_with("application/json") {
        let Json(body) = Json::<SendRequest>::from_request(request, &())
            .await
            .map_err(|e| rejection(e.status(), e.body_text()))?;
        Ok(body)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(body) = Form::<SendRequest>::from_request(request, &())
            .await
            .map_err(|e| rejection(e.status(), e.body_text()))?;
        Ok(body)
    } else if content_type.starts_with("text/plain") {
        let to = query
            .to
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| error(StatusCode::BAD_REQUEST, "missing ?to= for text body"))?;
        let message = String::from_request(request, &())
            .await
            .map_err(|e| rejection(e.status(), e.body_text()))?;
        Ok(SendRequest { to, message })
    } else {
        Err(error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "expected application/json, application/x-www-form-urlencoded or text/plain",
        ))
    }
}

/// POST /send: send a text message through the connected client.
async fn send(
    State(state): State<ApiState>,
    Query(query): Query<SendQuery>,
    request: Request,
) -> ApiResponse {
    if !authorized(state.token.as_deref(), request.headers()) {
        return error(StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
    }
    let body = match parse_send_request(query, request).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    if body.to.trim().is_empty() || body.message.is_empty() {
        return error(StatusCode::BAD_REQUEST, "`to` and `message` are required");
    }
    if !state.supervisor.is_ready() {
        return error(StatusCode::SERVICE_UNAVAILABLE, "client not ready");
    }
    match state.client.send_message(body.to.trim(), &body.message).await {
        Ok(()) => {
            log::info!("http: sent message to {}", body.to.trim());
            (StatusCode::OK, Json(json!({ "ok": true })))
        }
        Err(e) => {
            log::warn!("http: send to {} failed: {}", body.to.trim(), e);
            error(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
