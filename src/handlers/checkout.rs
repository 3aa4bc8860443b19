use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};

use crate::{
    auth::AuthUser, errors::ServiceError, services::checkout::InitiateCheckoutRequest,
    ApiResponse, AppState,
};

pub async fn initiate_one_time(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<InitiateCheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_client()?;
    let session = state
        .services
        .checkout
        .initiate_one_time(user.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(session))))
}
