use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser, entities::order, errors::ServiceError, handlers::party_of, ApiResponse,
    AppState,
};

pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<order::Model>>>, ServiceError> {
    let list = state
        .services
        .orders
        .list_orders(party_of(&user), user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(list)))
}

pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let o = state
        .services
        .orders
        .get_order(party_of(&user), user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(o)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<order::Model>>, ServiceError> {
    let o = state
        .services
        .orders
        .cancel_order(party_of(&user), user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(o)))
}
