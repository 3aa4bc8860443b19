use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use crate::{
    auth::AuthUser,
    entities::quotation,
    errors::ServiceError,
    handlers::party_of,
    services::quotations::{
        CreateQuotationRequest, Party, ProposeRequest, SubmitExtraDocsRequest,
    },
    ApiResponse, AppState,
};

#[derive(Serialize)]
pub struct QuotationCreated {
    #[serde(rename = "quotationId")]
    pub quotation_id: i64,
}

pub async fn create_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateQuotationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_client()?;
    let created = state.services.quotations.create(user.user_id, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(QuotationCreated {
            quotation_id: created.id,
        })),
    ))
}

pub async fn list_quotations(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<quotation::Model>>>, ServiceError> {
    let list = match party_of(&user) {
        Party::Client => {
            state
                .services
                .quotations
                .list_for_client(user.user_id)
                .await?
        }
        Party::Provider => {
            state
                .services
                .quotations
                .list_for_provider(user.user_id)
                .await?
        }
    };
    Ok(Json(ApiResponse::success(list)))
}

pub async fn get_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<quotation::Model>>, ServiceError> {
    let q = state
        .services
        .quotations
        .get_visible(party_of(&user), user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(q)))
}

pub async fn propose(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<ProposeRequest>,
) -> Result<Json<ApiResponse<quotation::Model>>, ServiceError> {
    user.require_provider()?;
    let updated = state
        .services
        .quotations
        .propose(user.user_id, user.email.clone(), id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn accept(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<quotation::Model>>, ServiceError> {
    user.require_client()?;
    let updated = state
        .services
        .quotations
        .client_accept(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn reject(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<quotation::Model>>, ServiceError> {
    let updated = state
        .services
        .quotations
        .reject(party_of(&user), user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn submit_extra_docs(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitExtraDocsRequest>,
) -> Result<Json<ApiResponse<quotation::Model>>, ServiceError> {
    user.require_client()?;
    let updated = state
        .services
        .quotations
        .submit_extra_docs(user.user_id, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn enable_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<quotation::Model>>, ServiceError> {
    user.require_provider()?;
    let updated = state
        .services
        .quotations
        .enable_payment(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn mark_viewed(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<quotation::Model>>, ServiceError> {
    user.require_provider()?;
    let updated = state
        .services
        .quotations
        .mark_viewed(user.user_id, id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn delete_quotation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .quotations
        .delete(party_of(&user), user.user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
