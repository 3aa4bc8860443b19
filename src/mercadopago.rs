//! Mercado Pago API surface: the wire types the marketplace exchanges with
//! the processor and a reqwest-backed client behind a mockable trait.
//!
//! Three endpoints are used: hosted checkout-preference creation, payment
//! detail retrieval (the authoritative record the webhook reconciler trusts),
//! and the OAuth token exchange for connecting provider accounts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub currency_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

/// Hosted-checkout preference request. `marketplace_fee` is the commission
/// the processor withholds for the platform; funds settle into the
/// provider's connected account.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub marketplace_fee: Decimal,
    pub external_reference: String,
    pub notification_url: String,
    pub metadata: serde_json::Value,
    pub auto_return: String,
    pub back_urls: BackUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceResponse {
    pub id: Option<String>,
    pub init_point: Option<String>,
}

/// Authoritative payment record fetched by id. The webhook reconciler never
/// trusts the notification payload's status; only this.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDetail {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub date_approved: Option<DateTime<Utc>>,
}

pub const PAYMENT_STATUS_APPROVED: &str = "approved";

#[derive(Debug, Clone, Serialize)]
pub struct OauthTokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
    pub code: String,
    pub redirect_uri: String,
}

impl OauthTokenRequest {
    pub fn authorization_code(
        client_id: String,
        client_secret: String,
        code: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            grant_type: "authorization_code".to_string(),
            code,
            redirect_uri,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OauthTokenResponse {
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Outbound calls to the payment processor. Implemented by
/// [`MercadoPagoClient`] in production and mocked in tests.
#[async_trait]
pub trait MercadoPagoApi: Send + Sync {
    async fn create_preference(
        &self,
        access_token: &str,
        request: &CheckoutPreferenceRequest,
    ) -> Result<PreferenceResponse, ServiceError>;

    async fn get_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<PaymentDetail, ServiceError>;

    async fn exchange_oauth_code(
        &self,
        request: &OauthTokenRequest,
    ) -> Result<OauthTokenResponse, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    http: reqwest::Client,
    api_base: String,
}

impl MercadoPagoClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MercadoPagoApi for MercadoPagoClient {
    async fn create_preference(
        &self,
        access_token: &str,
        request: &CheckoutPreferenceRequest,
    ) -> Result<PreferenceResponse, ServiceError> {
        let url = format!("{}/checkout/preferences", self.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("MP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "MP preference creation failed");
            return Err(ServiceError::ExternalServiceError(format!(
                "preference creation returned {status}"
            )));
        }

        response.json::<PreferenceResponse>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid preference response: {e}"))
        })
    }

    async fn get_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<PaymentDetail, ServiceError> {
        let url = format!("{}/v1/payments/{}", self.api_base, payment_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("MP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, payment_id, "MP payment fetch failed");
            return Err(ServiceError::ExternalServiceError(format!(
                "payment fetch returned {status}"
            )));
        }

        response.json::<PaymentDetail>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid payment response: {e}"))
        })
    }

    async fn exchange_oauth_code(
        &self,
        request: &OauthTokenRequest,
    ) -> Result<OauthTokenResponse, ServiceError> {
        let url = format!("{}/oauth/token", self.api_base);
        let response = self
            .http
            .post(&url)
            .form(request)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("MP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "MP token exchange failed");
            return Err(ServiceError::ExternalServiceError(format!(
                "token exchange returned {status}"
            )));
        }

        response.json::<OauthTokenResponse>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("invalid token response: {e}"))
        })
    }
}
