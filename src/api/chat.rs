use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use std::net::SocketAddr;

use super::{session_id_from_headers, AppState};
use crate::error::{AppError, Result};
use crate::models::{ApiResponse, ChatHistory, ChatReply, ChatRequest};

/// POST /api/gpt
pub async fn post_message(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatReply>> {
    // Session ids are client-chosen, so the peer address carries its own bucket.
    state.client_rate_limiter.check(&peer.ip().to_string())?;
    let session_id = session_id_from_headers(&headers)?;
    state.rate_limiter.check(&session_id)?;

    let Json(body) = body.map_err(|rejection| {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    })?;
    let request = ChatRequest::from_value(&body)?;

    let session = state.sessions.get_or_create(&session_id).await?;
    let chat = state.chat.clone();

    // Runs detached from the connection: once the session lock is taken the
    // message is processed to the end even if the client goes away.
    let handle = tokio::spawn(async move {
        let mut session = session.lock().await;
        chat.handle_message(&mut session, request).await
    });
    let reply = handle.await.map_err(|err| {
        tracing::error!("Chat task for session {} failed: {}", session_id, err);
        AppError::Internal(format!("chat task failed: {}", err))
    })??;

    Ok(Json(reply))
}

/// GET /api/v1/chat/history
pub async fn get_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<ChatHistory>>> {
    let session_id = session_id_from_headers(&headers)?;

    let (awaiting_confirmation, transactions) = match state.sessions.get(&session_id).await {
        Some(session) => {
            let session = session.lock().await;
            (session.is_awaiting_confirmation(), session.history())
        }
        None => (false, Vec::new()),
    };

    Ok(Json(ApiResponse::success(ChatHistory {
        session_id,
        awaiting_confirmation,
        transactions,
    })))
}
