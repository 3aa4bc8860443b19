//! Mercado Pago account-linking endpoints.
//!
//! The start/callback pair is a browser redirect flow: failures land back on
//! the provider dashboard as `?error=<code>` instead of JSON errors, and an
//! unauthenticated visit bounces to the login page.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect},
};
use serde::Deserialize;

use crate::{
    auth::{AuthUser, Role},
    errors::ServiceError,
    services::mp_oauth::{OauthErrorCode, SetCredentialsRequest},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

fn login_redirect(state: &AppState) -> Redirect {
    Redirect::to(&format!(
        "{}/auth?error={}",
        state.config.site_url_trimmed(),
        OauthErrorCode::NotAuthenticated
    ))
}

fn dashboard_error(state: &AppState, code: OauthErrorCode) -> Redirect {
    Redirect::to(&format!(
        "{}/provider/dashboard?error={code}",
        state.config.site_url_trimmed()
    ))
}

pub async fn oauth_start(
    State(state): State<AppState>,
    user: Option<AuthUser>,
) -> Redirect {
    let Some(user) = user.filter(|u| u.role == Role::Provider) else {
        return login_redirect(&state);
    };

    match state.services.mp_oauth.start(user.user_id).await {
        Ok(url) => Redirect::to(url.as_str()),
        Err(code) => dashboard_error(&state, code),
    }
}

pub async fn oauth_callback(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let Some(user) = user.filter(|u| u.role == Role::Provider) else {
        return login_redirect(&state);
    };

    let (Some(code), Some(oauth_state)) = (query.code, query.state) else {
        return dashboard_error(&state, OauthErrorCode::MissingCodeOrState);
    };

    match state
        .services
        .mp_oauth
        .finish(user.user_id, &code, &oauth_state)
        .await
    {
        Ok(()) => Redirect::to(&format!(
            "{}/provider/dashboard?success=MercadoPagoConnected",
            state.config.site_url_trimmed()
        )),
        Err(code) => dashboard_error(&state, code),
    }
}

pub async fn put_credentials(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SetCredentialsRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    user.require_provider()?;
    state
        .services
        .mp_oauth
        .set_client_credentials(user.user_id, payload)
        .await?;
    Ok((
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({ "saved": true }))),
    ))
}
