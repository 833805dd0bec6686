use crate::{
    entities::OrderModel,
    services::checkout::{CheckoutOutcome, CheckoutRequest},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:user_id", post(checkout))
        .route("/confirm/:reference", post(confirm_payment))
}

async fn checkout(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutOutcome>>), crate::errors::ServiceError> {
    let outcome = state.checkout_service.checkout(user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

async fn confirm_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> crate::ApiResult<Vec<OrderModel>> {
    let orders = state
        .settlement_service
        .confirm_payment(&reference)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}
