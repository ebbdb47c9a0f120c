//! Handlers for the campaign composer.
//!
//! One composer session lives in [`AppState::campaign`]. Every handler takes
//! the session lock, performs one controller operation, and answers with the
//! operation's result or a fresh [`CampaignView`]. The dispatch handler is the
//! exception: it releases the lock while the gateway call is in flight.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use broadcast_core::campaign::{CampaignView, RecipientPreview};
use broadcast_core::contacts::parse_contacts_csv;
use broadcast_core::dispatch::{
    Credential, DispatchRequest, DispatchSummary, SmsResult, CREDENTIAL_HEADER,
};
use broadcast_core::error::CoreError;
use broadcast_core::ledger::LedgerCounts;
use broadcast_core::segmenter::{estimate, SmsEstimate};
use broadcast_core::types::RowId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const MIB: usize = 1024 * 1024;

// ── Request / response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub message: String,
}

/// Body for the stateless estimate endpoint.
#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    pub message: String,
    #[serde(default = "default_recipient_count")]
    pub recipient_count: u32,
}

fn default_recipient_count() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct VerifyPinRequest {
    pub pin: String,
}

/// Outcome of a contact file import.
#[derive(Debug, Serialize)]
pub struct ImportResult {
    /// Data rows found in the file.
    pub total_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    /// Ledger counts after classification.
    pub counts: LedgerCounts,
}

#[derive(Debug, Serialize)]
pub struct ToggleResult {
    pub id: RowId,
    pub included: bool,
    /// `false` when the id was unknown or the row is excluded.
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct DispatchResult {
    pub summary: DispatchSummary,
    /// Reconciled results whose rows still exist.
    pub results: Vec<SmsResult>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPinResult {
    pub valid: bool,
}

// ── Session view ─────────────────────────────────────────────────────

/// GET /api/v1/campaign
pub async fn get_campaign(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CampaignView>>> {
    let view = state.campaign.lock().await.view();
    Ok(Json(DataResponse { data: view }))
}

// ── Import ───────────────────────────────────────────────────────────

/// POST /api/v1/campaign/import
///
/// Accept a multipart upload holding one `.csv` contact file, parse and
/// classify it, and start a fresh session with every ready row included.
/// Upload and parse failures are also surfaced as the session error.
pub async fn import_contacts(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<ImportResult>>> {
    let (filename, data) = next_file(&mut multipart).await?;

    let mut campaign = state.campaign.lock().await;
    let parsed = check_upload(&filename, data.len(), state.config.max_import_bytes)
        .and_then(|()| parse_contacts_csv(&data))
        .map_err(|e| {
            campaign.record_error(&e);
            e
        })?;

    let counts = campaign.import(&parsed)?;
    // The import dismissed any removal notice along with its undo.
    state.notice_timer.cancel().await;
    drop(campaign);

    tracing::info!(
        filename = %filename,
        total = parsed.total_count,
        valid = parsed.valid_count,
        invalid = parsed.invalid_count,
        "Contact list imported"
    );

    Ok(Json(DataResponse {
        data: ImportResult {
            total_count: parsed.total_count,
            valid_count: parsed.valid_count,
            invalid_count: parsed.invalid_count,
            counts,
        },
    }))
}

/// First multipart field that carries a file.
async fn next_file(multipart: &mut Multipart) -> AppResult<(String, Bytes)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        return Ok((filename, data));
    }

    Err(AppError::BadRequest(
        "No file received in multipart upload".to_string(),
    ))
}

fn check_upload(filename: &str, len: usize, max_bytes: usize) -> Result<(), CoreError> {
    if !filename.to_ascii_lowercase().ends_with(".csv") {
        return Err(CoreError::Validation(
            "Please upload a CSV file".to_string(),
        ));
    }
    if len > max_bytes {
        let limit = if max_bytes % MIB == 0 {
            format!("{}MB", max_bytes / MIB)
        } else {
            format!("{max_bytes} bytes")
        };
        return Err(CoreError::Validation(format!(
            "File size exceeds {limit} limit"
        )));
    }
    Ok(())
}

// ── Draft & estimate ─────────────────────────────────────────────────

/// PUT /api/v1/campaign/draft
pub async fn set_draft(
    State(state): State<AppState>,
    Json(input): Json<DraftRequest>,
) -> AppResult<Json<DataResponse<SmsEstimate>>> {
    let estimate = state.campaign.lock().await.set_draft(input.message)?;
    Ok(Json(DataResponse { data: estimate }))
}

/// POST /api/v1/campaign/estimate
///
/// Segment and cost estimate for an arbitrary message, independent of the
/// session.
pub async fn estimate_message(
    State(state): State<AppState>,
    Json(input): Json<EstimateRequest>,
) -> AppResult<Json<DataResponse<SmsEstimate>>> {
    let pricing = state.config.pricing();
    Ok(Json(DataResponse {
        data: estimate(&input.message, input.recipient_count, &pricing),
    }))
}

// ── Selection ────────────────────────────────────────────────────────

/// POST /api/v1/campaign/selection/all
pub async fn include_all(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CampaignView>>> {
    let mut campaign = state.campaign.lock().await;
    campaign.include_all();
    Ok(Json(DataResponse {
        data: campaign.view(),
    }))
}

/// POST /api/v1/campaign/selection/none
pub async fn include_none(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CampaignView>>> {
    let mut campaign = state.campaign.lock().await;
    campaign.include_none();
    Ok(Json(DataResponse {
        data: campaign.view(),
    }))
}

/// POST /api/v1/campaign/rows/{id}/toggle
pub async fn toggle_row(
    State(state): State<AppState>,
    Path(id): Path<RowId>,
) -> AppResult<Json<DataResponse<ToggleResult>>> {
    let mut campaign = state.campaign.lock().await;
    let changed = campaign.toggle(id);
    Ok(Json(DataResponse {
        data: ToggleResult {
            id,
            included: campaign.ledger().is_included(id),
            changed,
        },
    }))
}

/// GET /api/v1/campaign/rows/{id}/preview
pub async fn preview_row(
    State(state): State<AppState>,
    Path(id): Path<RowId>,
) -> AppResult<Json<DataResponse<RecipientPreview>>> {
    let preview = state.campaign.lock().await.preview_for(id)?;
    Ok(Json(DataResponse { data: preview }))
}

// ── Removal & undo ───────────────────────────────────────────────────

/// DELETE /api/v1/campaign/rows/{id}
///
/// Unknown ids are ignored and the unchanged view is returned.
pub async fn remove_row(
    State(state): State<AppState>,
    Path(id): Path<RowId>,
) -> AppResult<Json<DataResponse<CampaignView>>> {
    let mut campaign = state.campaign.lock().await;
    if let Some(handle) = campaign.remove(id) {
        tracing::info!(row_id = id, "Recipient removed");
        state
            .notice_timer
            .schedule(Arc::clone(&state.campaign), handle)
            .await;
    }
    Ok(Json(DataResponse {
        data: campaign.view(),
    }))
}

/// POST /api/v1/campaign/selection/remove
pub async fn remove_included(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CampaignView>>> {
    let mut campaign = state.campaign.lock().await;
    if let Some(handle) = campaign.remove_included() {
        tracing::info!(
            remaining = campaign.ledger().rows().len(),
            "Included recipients removed"
        );
        state
            .notice_timer
            .schedule(Arc::clone(&state.campaign), handle)
            .await;
    }
    Ok(Json(DataResponse {
        data: campaign.view(),
    }))
}

/// POST /api/v1/campaign/undo
pub async fn undo(State(state): State<AppState>) -> AppResult<Json<DataResponse<CampaignView>>> {
    let mut campaign = state.campaign.lock().await;
    let restored = campaign.undo();
    state.notice_timer.cancel().await;
    if restored > 0 {
        tracing::info!(restored, "Removal undone");
    }
    Ok(Json(DataResponse {
        data: campaign.view(),
    }))
}

/// POST /api/v1/campaign/notice/dismiss
pub async fn dismiss_notice(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CampaignView>>> {
    let mut campaign = state.campaign.lock().await;
    campaign.dismiss_notice();
    state.notice_timer.cancel().await;
    Ok(Json(DataResponse {
        data: campaign.view(),
    }))
}

// ── Dispatch ─────────────────────────────────────────────────────────

/// POST /api/v1/campaign/dispatch
///
/// Requires the dispatch credential in the `X-Marketing-Pin` header. The
/// gateway call and reconciliation run on a spawned task, so a client
/// disconnect or request timeout cannot leave the session in `Sending`.
pub async fn dispatch(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<DataResponse<DispatchResult>>> {
    let Some(credential) = credential_from(&headers) else {
        let err = CoreError::Unauthorized(format!("Missing {CREDENTIAL_HEADER} header"));
        state.campaign.lock().await.record_error(&err);
        return Err(err.into());
    };

    let request = state.campaign.lock().await.begin_dispatch()?;
    tracing::info!(recipients = request.recipients.len(), "Dispatch started");

    let task = tokio::spawn(run_dispatch(state.clone(), request, credential));

    match task.await {
        Ok(outcome) => Ok(Json(DataResponse { data: outcome? })),
        Err(join_err) => {
            let msg = format!("Dispatch task failed: {join_err}");
            state
                .campaign
                .lock()
                .await
                .fail_dispatch(&CoreError::Internal(msg.clone()));
            Err(AppError::InternalError(msg))
        }
    }
}

/// Await the gateway and settle the session with its reply.
async fn run_dispatch(
    state: AppState,
    request: DispatchRequest,
    credential: Credential,
) -> Result<DispatchResult, CoreError> {
    let outcome = state.gateway.send(&request, &credential).await;

    let mut campaign = state.campaign.lock().await;
    match outcome {
        Ok(response) => {
            let summary = campaign.complete_dispatch(response)?;
            tracing::info!(
                sent = summary.sent,
                failed = summary.failed,
                pending = summary.pending,
                unmatched = summary.unmatched,
                "Dispatch reconciled"
            );
            let results = campaign.rendered_results().into_iter().cloned().collect();
            Ok(DispatchResult { summary, results })
        }
        Err(err) => {
            campaign.fail_dispatch(&err);
            tracing::warn!(error = %err, "Dispatch failed, campaign back in preview");
            Err(err)
        }
    }
}

fn credential_from(headers: &HeaderMap) -> Option<Credential> {
    headers
        .get(CREDENTIAL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(Credential::new)
}

/// POST /api/v1/campaign/verify-pin
pub async fn verify_pin(
    State(state): State<AppState>,
    Json(input): Json<VerifyPinRequest>,
) -> AppResult<Json<DataResponse<VerifyPinResult>>> {
    let valid = state
        .gateway
        .verify_credential(&Credential::new(input.pin))
        .await?;
    Ok(Json(DataResponse {
        data: VerifyPinResult { valid },
    }))
}

// ── Reset ────────────────────────────────────────────────────────────

/// POST /api/v1/campaign/new
pub async fn new_broadcast(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CampaignView>>> {
    let mut campaign = state.campaign.lock().await;
    campaign.new_broadcast()?;
    state.notice_timer.cancel().await;
    tracing::info!("New broadcast started");
    Ok(Json(DataResponse {
        data: campaign.view(),
    }))
}
