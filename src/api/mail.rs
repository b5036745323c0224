use crate::api::AppState;
use crate::api::schemas::mail::{MailTaskResponse, ResendResponse, SendMailRequest, SendMailResponse};
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Accepts a mail for delivery.
///
/// The response only confirms the task was recorded; its delivery status is
/// read back through [`get_mail`].
///
/// # Errors
/// Returns `AppError::Validation` if the request is malformed.
/// Returns `AppError::RelayNotFound` if `relayId` names an unknown relay.
pub async fn send_mail(State(state): State<AppState>, Json(request): Json<SendMailRequest>) -> Result<impl IntoResponse> {
    let (parts, options) = request.into_parts().map_err(AppError::Validation)?;

    let id = match parts.relay_id {
        Some(relay_id) => {
            state.dispatch_service.send_with_relay(relay_id, &parts.to, &parts.subject, &parts.body, options).await?
        }
        None => state.dispatch_service.send(&parts.to, &parts.subject, &parts.body, options).await?,
    };

    Ok((StatusCode::ACCEPTED, Json(SendMailResponse { id })))
}

/// # Errors
/// Returns `AppError::MailTaskNotFound` if the id is unknown.
pub async fn get_mail(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<MailTaskResponse>> {
    let task = state.dispatch_service.find_task(id).await?;
    Ok(Json(task.into()))
}

/// # Errors
/// Returns `AppError::Database` if the store cannot be queried.
pub async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<MailTaskResponse>>> {
    let tasks = state.dispatch_service.pending_tasks().await?;
    Ok(Json(tasks.into_iter().map(MailTaskResponse::from).collect()))
}

/// Resets a task and attempts it again.
///
/// `dispatched` is true when the attempt succeeded inline or was handed to the
/// dispatch queue.
///
/// # Errors
/// Returns `AppError::MailTaskNotFound` if the id is unknown.
pub async fn resend_mail(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let dispatched = state.dispatch_service.resend_failed_mail(id).await?;
    Ok((StatusCode::ACCEPTED, Json(ResendResponse { id, dispatched })))
}
