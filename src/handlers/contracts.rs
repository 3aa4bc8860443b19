use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{contract, order},
    errors::ServiceError,
    handlers::party_of,
    ApiResponse, AppState,
};

/// Contract together with its paid order, as the dashboards render them.
#[derive(Serialize)]
pub struct ContractWithOrder {
    #[serde(flatten)]
    pub contract: contract::Model,
    pub order: order::Model,
}

pub async fn list_contracts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<ContractWithOrder>>>, ServiceError> {
    let rows = state
        .services
        .orders
        .list_contracts(party_of(&user), user.user_id)
        .await?;
    let list = rows
        .into_iter()
        .map(|(contract, order)| ContractWithOrder { contract, order })
        .collect();
    Ok(Json(ApiResponse::success(list)))
}

pub async fn cancel_contract(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<contract::Model>>, ServiceError> {
    let c = state
        .services
        .orders
        .cancel_contract(party_of(&user), user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(c)))
}
