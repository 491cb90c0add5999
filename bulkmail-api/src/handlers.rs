//! Route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use bulkmail_common::{BatchId, CsvRecipients, incoming, parse_csv_emails};
use bulkmail_delivery::{BatchStatus, DispatchError, TransportOutcome, transport::TEST_SENDER};
use bulkmail_ledger::{EmailStats, LogQuery, Page};
use bulkmail_vault::{Credentials, SettingsSummary, SettingsUpdate};
use serde_json::{Value, json};

use crate::{
    error::ApiError,
    payload::{
        AcceptedResponse, LogRow, ParseRecipientsRequest, SendRequest, SendResponse,
        TestConnectionRequest, TestConnectionResponse,
    },
    state::{AppState, Caller},
};

fn batch_id(raw: &str) -> Result<BatchId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid batch id: {raw}")))
}

/// Liveness check; answering at all is the signal.
pub async fn live() -> &'static str {
    "OK"
}

/// Send a batch and wait for every recipient.
pub async fn send(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    incoming!(
        level = INFO,
        "Batch from {user} for {} recipients",
        request.recipients.len()
    );

    let composition = request.into_composition()?;
    let result = state.dispatcher.submit(user, composition).await?;

    Ok(Json(result.into()))
}

/// Start a batch in the background.
pub async fn submit(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(request): Json<SendRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    incoming!(
        level = INFO,
        "Background batch from {user} for {} recipients",
        request.recipients.len()
    );

    let composition = request.into_composition()?;
    let batch_id = state.dispatcher.submit_background(user, composition).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            success: true,
            batch_id,
        }),
    ))
}

pub async fn batch_status(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> Result<Json<BatchStatus>, ApiError> {
    let batch_id = batch_id(&id)?;
    Ok(Json(state.dispatcher.batch_status(&user, batch_id).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    Caller(user): Caller,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let batch_id = batch_id(&id)?;

    if !state.dispatcher.cancel(&user, batch_id) {
        return Err(DispatchError::NotFound(batch_id).into());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "message": "Cancellation requested" })),
    ))
}

pub async fn logs(
    State(state): State<AppState>,
    Caller(user): Caller,
    Query(query): Query<LogQuery>,
) -> Result<Json<Page<LogRow>>, ApiError> {
    let page = state.dispatcher.recorder().history(&user, &query).await?;

    Ok(Json(Page {
        data: page.data.into_iter().map(LogRow::from).collect(),
        total: page.total,
        page: page.page,
        page_size: page.page_size,
        total_pages: page.total_pages,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    Caller(user): Caller,
) -> Result<Json<EmailStats>, ApiError> {
    Ok(Json(state.dispatcher.recorder().stats(&user).await?))
}

pub async fn settings(State(state): State<AppState>, Caller(user): Caller) -> Json<SettingsSummary> {
    Json(state.settings.summary(&user))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsSummary>, ApiError> {
    Ok(Json(state.settings.update(&user, update).await?))
}

/// Try a candidate key, or the stored one, against the provider.
pub async fn test_connection(
    State(state): State<AppState>,
    Caller(user): Caller,
    Json(request): Json<TestConnectionRequest>,
) -> Result<Json<TestConnectionResponse>, ApiError> {
    let candidate = request
        .api_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());

    let api_key = match candidate {
        Some(key) => key,
        None => state
            .settings
            .api_key(&user)
            .await?
            .ok_or_else(|| ApiError::BadRequest("API key is required".to_string()))?,
    };

    let summary = state.settings.summary(&user);
    let credentials = Credentials::new(
        api_key,
        summary
            .sender_email
            .unwrap_or_else(|| TEST_SENDER.to_string()),
        summary.sender_name,
    );

    let response = match state.dispatcher.test_connection(&credentials).await {
        TransportOutcome::Sent { .. } => TestConnectionResponse {
            success: true,
            message: "API key is valid".to_string(),
        },
        TransportOutcome::Failed { error } => TestConnectionResponse {
            success: false,
            message: error,
        },
    };

    Ok(Json(response))
}

pub async fn parse_recipients(
    Caller(_): Caller,
    Json(request): Json<ParseRecipientsRequest>,
) -> Json<CsvRecipients> {
    Json(parse_csv_emails(&request.content))
}
