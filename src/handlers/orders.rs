use crate::{
    entities::{order, Order, OrderItem, OrderItemModel, OrderModel},
    errors::ServiceError,
    ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(get_order))
        .route("/user/:user_id", get(list_orders_for_user))
        .route("/:id/deliver", post(confirm_delivery))
        .route("/:id/cancel", post(cancel_order))
}

#[derive(Debug, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderWithItems> {
    let order = Order::find_by_id(id)
        .one(&*state.db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;
    let items = order.find_related(OrderItem).all(&*state.db).await?;
    Ok(Json(ApiResponse::success(OrderWithItems { order, items })))
}

async fn list_orders_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<OrderModel>> {
    let paginator = Order::find()
        .filter(order::Column::UserId.eq(user_id))
        .order_by_desc(order::Column::CreatedAt)
        .paginate(&*state.db, query.limit.max(1));

    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(query.page.saturating_sub(1)).await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items,
        total,
        page: query.page,
        limit: query.limit,
    })))
}

async fn confirm_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<OrderModel> {
    let reason = body.reason.as_deref().unwrap_or("delivery confirmed");
    let order = state.settlement_service.confirm_delivery(id, reason).await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<OrderModel> {
    let reason = body.reason.as_deref().unwrap_or("cancelled by user");
    let order = state.settlement_service.cancel_order(id, reason).await?;
    Ok(Json(ApiResponse::success(order)))
}
