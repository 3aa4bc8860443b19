use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::contract::{self, contract_number_for, ContractStatus},
    entities::order::{self, OrderStatus},
    entities::provider_mp_credentials,
    entities::quotation::{self, QuotationStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    mercadopago::{MercadoPagoApi, PAYMENT_STATUS_APPROVED},
};

/// A parsed payment notification. Fields are optional because the processor's
/// delivery formats vary and the webhook must accept all of them.
#[derive(Debug, Default, Clone)]
pub struct PaymentNotification {
    /// `topic` (GET) or `type` (POST body). A present value other than
    /// "payment" is ignored; some deliveries omit it entirely and still
    /// reference a payment.
    pub topic: Option<String>,
    pub payment_id: Option<String>,
    pub provider_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

/// What the reconciler decided about one notification. Every variant maps to
/// an acknowledged webhook; none of them bubble up as an HTTP error.
#[derive(Debug)]
pub enum ReconciliationOutcome {
    /// Not a payment topic, or required parameters missing.
    Ignored,
    MissingCredentials,
    FetchFailed,
    /// Payment carries an external_reference for a different order.
    ReferenceMismatch,
    NotApproved { status: String },
    OrderNotFound,
    /// Order was not pending; a concurrent delivery already finalized it.
    AlreadyFinalized,
    Finalized { order_id: Uuid, contract_id: Uuid },
}

/// Processes payment webhooks: fetches the authoritative payment record,
/// flips the pending order to paid exactly once, and materializes the
/// contract.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    mp: Arc<dyn MercadoPagoApi>,
    event_sender: EventSender,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        mp: Arc<dyn MercadoPagoApi>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            mp,
            event_sender,
        }
    }

    /// Handles one notification delivery. Infallible by contract: the webhook
    /// endpoint acknowledges every delivery, so all aborts are logged and
    /// folded into the outcome instead of returned as errors.
    #[instrument(skip(self), fields(payment_id = ?notification.payment_id, order_id = ?notification.order_id))]
    pub async fn handle_notification(
        &self,
        notification: PaymentNotification,
    ) -> ReconciliationOutcome {
        if let Some(topic) = notification.topic.as_deref() {
            if topic != "payment" {
                info!(topic, "ignoring non-payment notification");
                return ReconciliationOutcome::Ignored;
            }
        }

        let (payment_id, provider_id, order_id) = match (
            notification.payment_id,
            notification.provider_id,
            notification.order_id,
        ) {
            (Some(p), Some(prov), Some(ord)) => (p, prov, ord),
            _ => {
                warn!("payment notification missing id, provider_id or order_id");
                return ReconciliationOutcome::Ignored;
            }
        };

        let access_token = match self.load_access_token(provider_id).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!(%provider_id, %order_id, "no connected credentials for provider, cannot verify payment");
                return ReconciliationOutcome::MissingCredentials;
            }
            Err(e) => {
                warn!(%provider_id, %order_id, error = %e, "credentials lookup failed");
                return ReconciliationOutcome::FetchFailed;
            }
        };

        // The notification payload is untrusted; only the fetched record counts.
        let payment = match self.mp.get_payment(&access_token, &payment_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(%order_id, payment_id, error = %e, "payment fetch failed, abandoning reconciliation");
                return ReconciliationOutcome::FetchFailed;
            }
        };

        // Only a reference that is present and points elsewhere disqualifies
        // the payment; older deliveries arrive without one.
        if let Some(reference) = payment.external_reference.as_deref() {
            if reference != order_id.to_string() {
                warn!(%order_id, payment_id, reference, "external_reference mismatch");
                return ReconciliationOutcome::ReferenceMismatch;
            }
        }

        if payment.status != PAYMENT_STATUS_APPROVED {
            info!(%order_id, payment_id, status = %payment.status, "payment not approved, nothing to do");
            return ReconciliationOutcome::NotApproved {
                status: payment.status,
            };
        }

        let paid_at = payment.date_approved.unwrap_or_else(Utc::now);

        // Conditional update: only a pending order flips to paid. A concurrent
        // delivery that lost the race sees zero rows affected and stops.
        let claim = order::ActiveModel {
            status: Set(OrderStatus::Paid),
            paid_at: Set(Some(paid_at)),
            payment_reference: Set(Some(payment_id.clone())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        let claimed = match order::Entity::update_many()
            .set(claim)
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .exec(&*self.db)
            .await
        {
            Ok(res) => res,
            Err(e) => {
                warn!(%order_id, payment_id, error = %e, "order claim update failed");
                return ReconciliationOutcome::FetchFailed;
            }
        };

        if claimed.rows_affected == 0 {
            return match order::Entity::find_by_id(order_id).one(&*self.db).await {
                Ok(Some(existing)) => {
                    info!(%order_id, payment_id, status = ?existing.status, "order already finalized or not pending, duplicate delivery");
                    ReconciliationOutcome::AlreadyFinalized
                }
                Ok(None) => {
                    warn!(%order_id, payment_id, "order not found for approved payment");
                    ReconciliationOutcome::OrderNotFound
                }
                Err(e) => {
                    warn!(%order_id, payment_id, error = %e, "order lookup failed");
                    ReconciliationOutcome::FetchFailed
                }
            };
        }

        self.event_sender
            .send(Event::OrderPaid {
                order_id,
                payment_id: payment_id.clone(),
            })
            .await;

        let contract_id = match self.materialize_contract(order_id).await {
            Ok(id) => id,
            Err(e) => {
                warn!(%order_id, payment_id, error = %e, "contract creation failed after payment");
                return ReconciliationOutcome::FetchFailed;
            }
        };

        if let Err(e) = self.finalize_quotation(order_id).await {
            warn!(%order_id, payment_id, error = %e, "quotation finalization failed");
        }

        info!(%order_id, %contract_id, payment_id, "payment reconciled");
        ReconciliationOutcome::Finalized {
            order_id,
            contract_id,
        }
    }

    async fn load_access_token(
        &self,
        provider_id: Uuid,
    ) -> Result<Option<String>, ServiceError> {
        let creds = provider_mp_credentials::Entity::find_by_id(provider_id)
            .one(&*self.db)
            .await?;
        Ok(creds
            .filter(provider_mp_credentials::Model::is_connected)
            .and_then(|c| c.mp_access_token))
    }

    /// Inserts the contract row. The unique key on `order_id` makes the insert
    /// the second line of defense against duplicate deliveries: a constraint
    /// violation means the contract already exists and is treated as success.
    async fn materialize_contract(&self, order_id: Uuid) -> Result<Uuid, ServiceError> {
        let now = Utc::now();
        let contract_id = Uuid::new_v4();
        let model = contract::ActiveModel {
            id: Set(contract_id),
            order_id: Set(order_id),
            contract_number: Set(contract_number_for(order_id, now)),
            status: Set(ContractStatus::Active),
            contract_text: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match model.insert(&*self.db).await {
            Ok(created) => {
                self.event_sender
                    .send(Event::ContractCreated {
                        contract_id: created.id,
                        order_id,
                    })
                    .await;
                Ok(created.id)
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                let existing = contract::Entity::find()
                    .filter(contract::Column::OrderId.eq(order_id))
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "contract unique violation but no row found".to_string(),
                        )
                    })?;
                Ok(existing.id)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Marks the source quotation accepted and hides it from the client's
    /// request list now that it has become a contract.
    async fn finalize_quotation(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let Some(paid_order) = order::Entity::find_by_id(order_id).one(&*self.db).await? else {
            return Ok(());
        };
        let Some(quotation_id) = paid_order.quotation_id else {
            return Ok(());
        };
        let Some(q) = quotation::Entity::find_by_id(quotation_id)
            .one(&*self.db)
            .await?
        else {
            return Ok(());
        };

        let mut am: quotation::ActiveModel = q.into();
        am.status = Set(QuotationStatus::Accepted);
        am.client_deleted_at = Set(Some(Utc::now()));
        am.updated_at = Set(Utc::now());
        am.update(&*self.db).await?;
        Ok(())
    }
}
