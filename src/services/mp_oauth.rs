use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::provider_mp_credentials,
    errors::ServiceError,
    events::{Event, EventSender},
    mercadopago::{MercadoPagoApi, OauthTokenRequest},
};

/// Closed set of failure codes surfaced to the browser as
/// `?error=<code>` query parameters on the settings redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum OauthErrorCode {
    NotAuthenticated,
    MissingCodeOrState,
    MpCredentialsReadFailed,
    MpClientIdSecretMissing,
    InvalidState,
    MissingSiteUrl,
    MpTokenExchangeFailed,
    MpInvalidTokenResponse,
    MpTokenSaveFailed,
    MpStateSaveFailed,
}

#[derive(Debug, Deserialize)]
pub struct SetCredentialsRequest {
    pub mp_client_id: String,
    pub mp_client_secret: String,
}

/// Connects provider Mercado Pago accounts through the OAuth
/// authorization-code flow, storing per-provider application credentials and
/// the resulting tokens.
#[derive(Clone)]
pub struct MpOauthService {
    db: Arc<DatabaseConnection>,
    mp: Arc<dyn MercadoPagoApi>,
    event_sender: EventSender,
    config: Arc<AppConfig>,
}

impl MpOauthService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        mp: Arc<dyn MercadoPagoApi>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            mp,
            event_sender,
            config,
        }
    }

    fn redirect_uri(&self) -> String {
        format!(
            "{}/api/v1/mercadopago/oauth/callback",
            self.config.site_url_trimmed()
        )
    }

    /// Stores (or replaces) the provider's MP application credentials.
    /// Changing them invalidates any previously obtained tokens.
    pub async fn set_client_credentials(
        &self,
        provider_id: Uuid,
        request: SetCredentialsRequest,
    ) -> Result<(), ServiceError> {
        if request.mp_client_id.trim().is_empty() || request.mp_client_secret.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "client id and secret are required".to_string(),
            ));
        }

        let existing = provider_mp_credentials::Entity::find_by_id(provider_id)
            .one(&*self.db)
            .await?;

        let now = Utc::now();
        let am = provider_mp_credentials::ActiveModel {
            provider_id: Set(provider_id),
            mp_client_id: Set(Some(request.mp_client_id)),
            mp_client_secret: Set(Some(request.mp_client_secret)),
            mp_access_token: Set(None),
            mp_refresh_token: Set(None),
            mp_user_id: Set(None),
            mp_token_expires_at: Set(None),
            mp_connected_at: Set(None),
            mp_oauth_state: Set(None),
            updated_at: Set(now),
        };

        if existing.is_some() {
            am.update(&*self.db).await?;
        } else {
            am.insert(&*self.db).await?;
        }

        info!(%provider_id, "MP application credentials stored, tokens reset");
        Ok(())
    }

    /// Begins the authorization flow: mints a random state, persists it, and
    /// builds the processor's authorization URL.
    #[instrument(skip(self))]
    pub async fn start(&self, provider_id: Uuid) -> Result<Url, OauthErrorCode> {
        let creds = match provider_mp_credentials::Entity::find_by_id(provider_id)
            .one(&*self.db)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(%provider_id, error = %e, "credentials read failed");
                return Err(OauthErrorCode::MpCredentialsReadFailed);
            }
        };
        let Some(creds) = creds else {
            return Err(OauthErrorCode::MpClientIdSecretMissing);
        };
        let Some(client_id) = creds.mp_client_id.clone().filter(|s| !s.is_empty()) else {
            return Err(OauthErrorCode::MpClientIdSecretMissing);
        };
        if creds.mp_client_secret.as_deref().map_or(true, str::is_empty) {
            return Err(OauthErrorCode::MpClientIdSecretMissing);
        }
        if self.config.site_url_trimmed().is_empty() {
            return Err(OauthErrorCode::MissingSiteUrl);
        }

        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        let mut am: provider_mp_credentials::ActiveModel = creds.into();
        am.mp_oauth_state = Set(Some(state.clone()));
        am.updated_at = Set(Utc::now());
        if let Err(e) = am.update(&*self.db).await {
            warn!(%provider_id, error = %e, "failed to persist oauth state");
            return Err(OauthErrorCode::MpStateSaveFailed);
        }

        let mut url = match Url::parse(&format!(
            "{}/authorization",
            self.config.mp_auth_base_url.trim_end_matches('/')
        )) {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "invalid auth base url");
                return Err(OauthErrorCode::MissingSiteUrl);
            }
        };
        url.query_pairs_mut()
            .append_pair("client_id", &client_id)
            .append_pair("response_type", "code")
            .append_pair("platform_id", "mp")
            .append_pair("state", &state)
            .append_pair("redirect_uri", &self.redirect_uri());

        Ok(url)
    }

    /// Completes the flow: validates the state, exchanges the code for tokens
    /// and marks the account connected. The stored state is single-use.
    #[instrument(skip(self, code, state))]
    pub async fn finish(
        &self,
        provider_id: Uuid,
        code: &str,
        state: &str,
    ) -> Result<(), OauthErrorCode> {
        if code.is_empty() || state.is_empty() {
            return Err(OauthErrorCode::MissingCodeOrState);
        }

        let creds = match provider_mp_credentials::Entity::find_by_id(provider_id)
            .one(&*self.db)
            .await
        {
            Ok(Some(c)) => c,
            Ok(None) => return Err(OauthErrorCode::MpClientIdSecretMissing),
            Err(e) => {
                warn!(%provider_id, error = %e, "credentials read failed");
                return Err(OauthErrorCode::MpCredentialsReadFailed);
            }
        };

        let (Some(client_id), Some(client_secret)) =
            (creds.mp_client_id.clone(), creds.mp_client_secret.clone())
        else {
            return Err(OauthErrorCode::MpClientIdSecretMissing);
        };

        match creds.mp_oauth_state.as_deref() {
            Some(expected) if expected == state => {}
            _ => {
                warn!(%provider_id, "oauth state mismatch");
                return Err(OauthErrorCode::InvalidState);
            }
        }

        let token_request = OauthTokenRequest::authorization_code(
            client_id,
            client_secret,
            code.to_string(),
            self.redirect_uri(),
        );
        let token = match self.mp.exchange_oauth_code(&token_request).await {
            Ok(t) => t,
            Err(e) => {
                warn!(%provider_id, error = %e, "token exchange failed");
                return Err(OauthErrorCode::MpTokenExchangeFailed);
            }
        };
        let Some(access_token) = token.access_token.filter(|t| !t.is_empty()) else {
            warn!(%provider_id, "token response missing access_token");
            return Err(OauthErrorCode::MpInvalidTokenResponse);
        };

        let now = Utc::now();
        let expires_at = token.expires_in.map(|s| now + Duration::seconds(s));

        let mut am: provider_mp_credentials::ActiveModel = creds.into();
        am.mp_access_token = Set(Some(access_token));
        am.mp_refresh_token = Set(token.refresh_token);
        am.mp_user_id = Set(token.user_id);
        am.mp_token_expires_at = Set(expires_at);
        am.mp_connected_at = Set(Some(now));
        am.mp_oauth_state = Set(None);
        am.updated_at = Set(now);
        if let Err(e) = am.update(&*self.db).await {
            warn!(%provider_id, error = %e, "failed to persist tokens");
            return Err(OauthErrorCode::MpTokenSaveFailed);
        }

        info!(%provider_id, "MP account connected");
        self.event_sender
            .send(Event::MpAccountConnected { provider_id })
            .await;

        Ok(())
    }
}
