use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    entities::order::{self, OrderStatus},
    entities::provider_mp_credentials,
    entities::quotation::{self, QuotationStatus},
    entities::service,
    errors::ServiceError,
    events::{Event, EventSender},
    mercadopago::{BackUrls, CheckoutPreferenceRequest, MercadoPagoApi, PreferenceItem},
};

/// Platform commission rate withheld from every one-time payment.
pub const PLATFORM_FEE_RATE: Decimal = dec!(0.10);

/// Commission on a payment amount, rounded half-up to cents.
pub fn platform_fee(amount: Decimal) -> Decimal {
    (amount * PLATFORM_FEE_RATE).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCheckoutRequest {
    pub quotation_id: i64,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutSession {
    pub order_id: Uuid,
    pub preference_id: String,
    pub init_point: String,
    pub amount: Decimal,
    pub platform_fee: Decimal,
}

/// Turns an accepted, payment-enabled quotation into a pending order plus a
/// hosted checkout session on the provider's connected account.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    mp: Arc<dyn MercadoPagoApi>,
    event_sender: EventSender,
    config: Arc<AppConfig>,
}

impl CheckoutService {
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

    /// Creates the pending order, then asks the processor for a checkout
    /// preference. If the processor call fails the pending order is kept:
    /// it records the attempt and a retry will create a fresh one.
    #[instrument(skip(self, request), fields(quotation_id = request.quotation_id))]
    pub async fn initiate_one_time(
        &self,
        client_id: Uuid,
        request: InitiateCheckoutRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let q = quotation::Entity::find_by_id(request.quotation_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Quotation {} not found", request.quotation_id))
            })?;

        if q.client_id != client_id {
            return Err(ServiceError::Forbidden(
                "quotation does not belong to this client".to_string(),
            ));
        }
        if q.status != QuotationStatus::Accepted {
            return Err(ServiceError::InvalidStatus(
                "quotation must be accepted before checkout".to_string(),
            ));
        }
        if !q.payment_enabled {
            return Err(ServiceError::InvalidOperation(
                "payment is not enabled for this quotation yet".to_string(),
            ));
        }
        let amount = match q.proposed_price {
            Some(price) if price > Decimal::ZERO => price,
            _ => {
                return Err(ServiceError::InvalidOperation(
                    "quotation has no proposed price".to_string(),
                ))
            }
        };

        let existing_paid = order::Entity::find()
            .filter(order::Column::QuotationId.eq(q.id))
            .filter(order::Column::Status.eq(OrderStatus::Paid))
            .one(&*self.db)
            .await?;
        if existing_paid.is_some() {
            return Err(ServiceError::Conflict(
                "quotation has already been paid".to_string(),
            ));
        }

        let creds = provider_mp_credentials::Entity::find_by_id(q.provider_id)
            .one(&*self.db)
            .await?
            .filter(provider_mp_credentials::Model::is_connected)
            .ok_or_else(|| {
                ServiceError::PaymentFailed(
                    "provider has not connected a Mercado Pago account".to_string(),
                )
            })?;
        // is_connected() guarantees the token is present.
        let access_token = creds.mp_access_token.clone().ok_or_else(|| {
            ServiceError::PaymentFailed("provider credentials are incomplete".to_string())
        })?;

        let fee = platform_fee(amount);
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let pending = order::ActiveModel {
            id: Set(order_id),
            client_id: Set(client_id),
            provider_id: Set(q.provider_id),
            service_id: Set(q.service_id),
            quotation_id: Set(Some(q.id)),
            status: Set(OrderStatus::Pending),
            amount: Set(amount),
            platform_fee: Set(fee),
            scheduled_for: Set(request.scheduled_for),
            paid_at: Set(None),
            payment_reference: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let pending = pending.insert(&*self.db).await?;

        self.event_sender
            .send(Event::OrderCreated {
                order_id: pending.id,
                quotation_id: q.id,
            })
            .await;

        let item_title = match q.service_id {
            Some(service_id) => service::Entity::find_by_id(service_id)
                .one(&*self.db)
                .await?
                .map(|s| s.name)
                .unwrap_or_else(|| "Servicio".to_string()),
            None => "Servicio".to_string(),
        };

        let site_url = self.config.site_url_trimmed();
        let preference = CheckoutPreferenceRequest {
            items: vec![PreferenceItem {
                title: item_title,
                quantity: 1,
                unit_price: amount,
                currency_id: "ARS".to_string(),
            }],
            marketplace_fee: fee,
            external_reference: pending.id.to_string(),
            notification_url: format!(
                "{site_url}/api/v1/payments/mp/webhook?provider_id={}&order_id={}",
                q.provider_id, pending.id
            ),
            metadata: json!({
                "order_id": pending.id,
                "quotation_id": q.id,
                "provider_id": q.provider_id,
            }),
            auto_return: "approved".to_string(),
            back_urls: BackUrls {
                success: format!("{site_url}/client/dashboard?payment=success"),
                pending: format!("{site_url}/client/dashboard?payment=pending"),
                failure: format!("{site_url}/client/dashboard?payment=failure"),
            },
        };

        let created = match self.mp.create_preference(&access_token, &preference).await {
            Ok(resp) => resp,
            Err(e) => {
                // Order stays pending as a record of the attempt.
                warn!(order_id = %pending.id, error = %e, "preference creation failed, order left pending");
                return Err(e);
            }
        };

        let (preference_id, init_point) = match (created.id, created.init_point) {
            (Some(id), Some(init_point)) => (id, init_point),
            _ => {
                warn!(order_id = %pending.id, "processor returned preference without id or init_point");
                return Err(ServiceError::ExternalServiceError(
                    "incomplete preference response from processor".to_string(),
                ));
            }
        };

        let mut am: order::ActiveModel = pending.clone().into();
        am.payment_reference = Set(Some(preference_id.clone()));
        am.updated_at = Set(Utc::now());
        am.update(&*self.db).await?;

        info!(order_id = %pending.id, preference_id = %preference_id, "checkout session created");

        Ok(CheckoutSession {
            order_id: pending.id,
            preference_id,
            init_point,
            amount,
            platform_fee: fee,
        })
    }
}
