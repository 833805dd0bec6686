use crate::{
    entities::CommissionRuleModel,
    services::commission::{CommissionBreakdown, CreateRuleInput},
    ApiResponse, AppState,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rules", post(create_rule))
        .route("/quote", get(quote))
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub store_id: Option<Uuid>,
    pub category: Option<String>,
    pub amount: i64,
}

async fn create_rule(
    State(state): State<AppState>,
    Json(input): Json<CreateRuleInput>,
) -> Result<(StatusCode, Json<ApiResponse<CommissionRuleModel>>), crate::errors::ServiceError> {
    let rule = state.commission_service.create_rule(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(rule))))
}

async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> crate::ApiResult<CommissionBreakdown> {
    let breakdown = state
        .commission_service
        .resolve(query.store_id, query.category.as_deref(), query.amount)
        .await?;
    Ok(Json(ApiResponse::success(breakdown)))
}
