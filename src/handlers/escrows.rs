use crate::{entities::EscrowLedgerModel, ApiResponse, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_escrow))
        .route("/:id/release", post(release))
        .route("/:id/refund", post(refund))
        .route("/:id/dispute", post(dispute))
}

#[derive(Debug, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DisputeBody {
    pub dispute_id: Uuid,
}

async fn get_escrow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<EscrowLedgerModel> {
    Ok(Json(ApiResponse::success(state.escrow_service.get(id).await?)))
}

async fn release(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<EscrowLedgerModel> {
    let reason = body.reason.as_deref().unwrap_or("delivery confirmed");
    let ledger = state.escrow_service.release(id, reason).await?;
    Ok(Json(ApiResponse::success(ledger)))
}

async fn refund(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<EscrowLedgerModel> {
    let reason = body.reason.as_deref().unwrap_or("order cancelled");
    let ledger = state.escrow_service.refund(id, reason).await?;
    Ok(Json(ApiResponse::success(ledger)))
}

async fn dispute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<DisputeBody>,
) -> ApiResult<EscrowLedgerModel> {
    let ledger = state
        .escrow_service
        .attach_dispute(id, body.dispute_id)
        .await?;
    Ok(Json(ApiResponse::success(ledger)))
}
