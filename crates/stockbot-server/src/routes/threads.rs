use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stockbot::models::message::Message;

use super::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
struct ListThreadsResponse {
    threads: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ThreadResponse {
    thread_id: String,
    messages: Vec<Message>,
}

async fn list_threads(State(state): State<AppState>) -> Json<ListThreadsResponse> {
    Json(ListThreadsResponse {
        threads: state.agent.thread_ids().await,
    })
}

async fn get_thread(State(state): State<AppState>, Path(thread_id): Path<String>) -> Response {
    match state.agent.history(&thread_id).await {
        Some(messages) => (
            StatusCode::OK,
            Json(ThreadResponse {
                thread_id,
                messages,
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "Thread '{}' not found",
                thread_id
            ))),
        )
            .into_response(),
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/threads", get(list_threads))
        .route("/api/threads/:thread_id", get(get_thread))
        .with_state(state)
}
