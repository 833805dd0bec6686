use crate::{
    services::cart::{AddItemInput, Cart},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:user_id", get(get_cart).delete(clear_cart))
        .route("/:user_id/items", post(add_item))
        .route(
            "/:user_id/items/:item_id",
            put(update_item).delete(remove_item),
        )
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityBody {
    pub quantity: i32,
}

async fn get_cart(State(state): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<Cart> {
    Ok(Json(ApiResponse::success(
        state.cart_service.get_cart(user_id),
    )))
}

async fn add_item(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<AddItemInput>,
) -> ApiResult<Cart> {
    let cart = state.cart_service.add_item(user_id, input).await?;
    Ok(Json(ApiResponse::success(cart)))
}

async fn update_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateQuantityBody>,
) -> ApiResult<Cart> {
    let cart = state
        .cart_service
        .update_item(user_id, item_id, body.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

async fn remove_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Cart> {
    let cart = state.cart_service.remove_item(user_id, item_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

async fn clear_cart(State(state): State<AppState>, Path(user_id): Path<Uuid>) -> ApiResult<()> {
    state.cart_service.clear(user_id);
    Ok(Json(ApiResponse::success(())))
}
