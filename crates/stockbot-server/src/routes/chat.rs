use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stockbot::errors::AgentError;

use super::ErrorResponse;
use crate::state::AppState;

const DEFAULT_THREAD_ID: &str = "default";

#[derive(Debug, Deserialize, Serialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    /// Clients may send a number as well as a string
    #[serde(default)]
    thread_id: Option<Value>,
}

impl ChatRequest {
    fn thread_id(&self) -> String {
        let id = match &self.thread_id {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
        };
        if id.is_empty() {
            DEFAULT_THREAD_ID.to_string()
        } else {
            id
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ChatResponse {
    response: String,
}

/// Upstream failures are the model's or a tool's fault, everything else is ours
fn status_for(error: &AgentError) -> StatusCode {
    match error {
        AgentError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
        AgentError::ModelInvocation(_) | AgentError::ToolExecution { .. } => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return (
                rejection.status(),
                Json(ErrorResponse::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    if request.message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("No message provided")),
        )
            .into_response();
    }

    let thread_id = request.thread_id();

    match state.agent.run_turn(&thread_id, &request.message).await {
        Ok(response) => (StatusCode::OK, Json(ChatResponse { response })).into_response(),
        Err(e) => {
            tracing::error!(thread_id = %thread_id, error = %e, "chat request failed");
            (status_for(&e), Json(ErrorResponse::new(e.to_string()))).into_response()
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .with_state(state)
}
