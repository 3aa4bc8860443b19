use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-provider Mercado Pago credentials: the provider-supplied application
/// client id/secret plus the tokens obtained through the OAuth flow.
///
/// Changing `mp_client_id`/`mp_client_secret` must null out every token field
/// and any in-flight `mp_oauth_state`, forcing re-authorization.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "provider_mp_credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub provider_id: Uuid,
    #[sea_orm(nullable)]
    pub mp_client_id: Option<String>,
    #[sea_orm(nullable)]
    pub mp_client_secret: Option<String>,
    #[sea_orm(nullable)]
    pub mp_access_token: Option<String>,
    #[sea_orm(nullable)]
    pub mp_refresh_token: Option<String>,
    /// Connected-account user id at the processor.
    #[sea_orm(nullable)]
    pub mp_user_id: Option<i64>,
    #[sea_orm(nullable)]
    pub mp_token_expires_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub mp_connected_at: Option<DateTime<Utc>>,
    /// Single-use CSRF state for the in-flight OAuth authorization, if any.
    #[sea_orm(nullable)]
    pub mp_oauth_state: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A provider counts as connected once both the access token and the
    /// connected-account id are present.
    pub fn is_connected(&self) -> bool {
        self.mp_access_token.is_some() && self.mp_user_id.is_some()
    }
}
