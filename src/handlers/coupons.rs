use crate::{
    entities::CouponModel,
    services::coupons::{CouponService, CreateCouponInput},
    ApiResponse, AppState,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_coupon))
        .route("/validate", get(validate_coupon))
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub code: String,
    pub amount: i64,
    pub store_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ValidatedCoupon {
    pub coupon: CouponModel,
    pub discount_amount: i64,
}

async fn create_coupon(
    State(state): State<AppState>,
    Json(input): Json<CreateCouponInput>,
) -> Result<(StatusCode, Json<ApiResponse<CouponModel>>), crate::errors::ServiceError> {
    let coupon = state.coupon_service.create_coupon(input).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(coupon))))
}

async fn validate_coupon(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> crate::ApiResult<ValidatedCoupon> {
    let coupon = state
        .coupon_service
        .validate(&query.code, query.amount, query.store_id)
        .await?;
    let discount_amount = CouponService::discount_for(&coupon, query.amount);
    Ok(Json(ApiResponse::success(ValidatedCoupon {
        coupon,
        discount_amount,
    })))
}
