use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::quotation::{
        self, BillingMode, DeletionState, QuotationStatus, RejectedBy, ViewStatus,
    },
    entities::service::{self, ServiceBillingMode},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Which side of the marketplace is performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Client,
    Provider,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FamilyMember {
    pub full_name: String,
    pub dni: String,
    pub age: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuotationRequest {
    pub provider_id: Uuid,
    pub service_id: Option<i64>,
    #[serde(default)]
    pub requested_billing_mode: Option<BillingMode>,
    #[validate(length(min = 1, message = "full name is required"))]
    pub client_full_name: String,
    #[validate(length(min = 1, message = "phone is required"))]
    pub client_phone: String,
    #[validate(email(message = "a valid email is required"))]
    pub client_email: String,
    #[validate(length(min = 1, message = "dni is required"))]
    pub client_dni: String,
    #[validate(length(min = 1, message = "address is required"))]
    pub client_address: String,
    #[validate(range(min = 1, max = 130, message = "age must be between 1 and 130"))]
    pub client_age: i32,
    #[validate(length(min = 1, message = "front DNI image is required"))]
    pub dni_front_url: String,
    #[validate(length(min = 1, message = "back DNI image is required"))]
    pub dni_back_url: String,
    #[serde(default)]
    pub family_members: Vec<FamilyMember>,
    pub notes: Option<String>,
}

/// Which service the proposal is made against. `Requested` keeps the plan the
/// client asked about; the other two repoint the quotation, preserving the
/// original service row as the audit trail of what was first requested.
#[derive(Debug, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposedService {
    #[default]
    Requested,
    Existing {
        service_id: i64,
    },
    Custom {
        name: String,
        description: Option<String>,
        max_members: Option<i32>,
    },
}

#[derive(Debug, Deserialize)]
pub struct ProposeRequest {
    pub price: Decimal,
    pub notes: Option<String>,
    #[serde(default)]
    pub extra_docs_requested: bool,
    pub extra_docs_message: Option<String>,
    #[serde(default)]
    pub service: ProposedService,
}

#[derive(Debug, Deserialize)]
pub struct SubmitExtraDocsRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    pub text: Option<String>,
}

/// Governs creation, proposal, acceptance/rejection, extra-document exchange
/// and the dual-flag soft/hard deletion of quotation requests.
#[derive(Clone)]
pub struct QuotationService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl QuotationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    async fn load(&self, id: i64) -> Result<quotation::Model, ServiceError> {
        quotation::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Quotation {id} not found")))
    }

    fn owned_by_client(q: &quotation::Model, client_id: Uuid) -> Result<(), ServiceError> {
        if q.client_id != client_id {
            return Err(ServiceError::Forbidden(
                "quotation does not belong to this client".to_string(),
            ));
        }
        Ok(())
    }

    fn owned_by_provider(q: &quotation::Model, provider_id: Uuid) -> Result<(), ServiceError> {
        if q.provider_id != provider_id {
            return Err(ServiceError::Forbidden(
                "quotation does not belong to this provider".to_string(),
            ));
        }
        Ok(())
    }

    /// Creates a quotation request in `pending` / `sin_observar`.
    #[instrument(skip(self, request), fields(provider_id = %request.provider_id))]
    pub async fn create(
        &self,
        client_id: Uuid,
        request: CreateQuotationRequest,
    ) -> Result<quotation::Model, ServiceError> {
        request.validate()?;

        // Member-cap check only applies when the referenced service defines one.
        if let Some(service_id) = request.service_id {
            let svc = service::Entity::find_by_id(service_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Service {service_id} not found"))
                })?;
            if svc.provider_id != request.provider_id {
                return Err(ServiceError::ValidationError(
                    "service does not belong to the selected provider".to_string(),
                ));
            }
            if let Some(cap) = svc.max_members {
                let headcount = 1 + request.family_members.len() as i64;
                if headcount > cap as i64 {
                    return Err(ServiceError::ValidationError(format!(
                        "plan covers up to {cap} members, request includes {headcount}"
                    )));
                }
            }
        }

        let family_members = if request.family_members.is_empty() {
            None
        } else {
            Some(json!(request
                .family_members
                .iter()
                .map(|m| json!({ "full_name": m.full_name, "dni": m.dni, "age": m.age }))
                .collect::<Vec<_>>()))
        };

        let now = Utc::now();
        let model = quotation::ActiveModel {
            client_id: Set(client_id),
            provider_id: Set(request.provider_id),
            service_id: Set(request.service_id),
            status: Set(QuotationStatus::Pending),
            view_status: Set(ViewStatus::SinObservar),
            requested_billing_mode: Set(request
                .requested_billing_mode
                .unwrap_or(BillingMode::OneTime)),
            proposed_price: Set(None),
            provider_notes: Set(None),
            extra_docs_requested: Set(false),
            extra_docs_message: Set(None),
            extra_docs_urls: Set(json!([])),
            extra_docs_client_text: Set(None),
            payment_enabled: Set(false),
            rejected_by: Set(None),
            handled_by_email: Set(None),
            client_deleted_at: Set(None),
            provider_deleted_at: Set(None),
            client_full_name: Set(request.client_full_name),
            client_phone: Set(request.client_phone),
            client_email: Set(request.client_email),
            client_dni: Set(request.client_dni),
            client_address: Set(request.client_address),
            client_age: Set(request.client_age),
            dni_front_url: Set(request.dni_front_url),
            dni_back_url: Set(request.dni_back_url),
            family_members: Set(family_members),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let created = model.insert(&*self.db).await?;
        info!(quotation_id = created.id, "quotation created");

        self.event_sender
            .send(Event::QuotationCreated {
                quotation_id: created.id,
                provider_id: created.provider_id,
            })
            .await;

        Ok(created)
    }

    /// Provider proposes price and terms, accepting the quotation. Payment is
    /// enabled unless extra documentation was requested; in that case it stays
    /// blocked until [`enable_payment`](Self::enable_payment).
    #[instrument(skip(self, request))]
    pub async fn propose(
        &self,
        provider_id: Uuid,
        handled_by_email: Option<String>,
        quotation_id: i64,
        request: ProposeRequest,
    ) -> Result<quotation::Model, ServiceError> {
        let q = self.load(quotation_id).await?;
        Self::owned_by_provider(&q, provider_id)?;

        if q.status != QuotationStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "only pending quotations can receive a proposal".to_string(),
            ));
        }
        if request.price <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "proposed price must be greater than zero".to_string(),
            ));
        }

        let service_id = match request.service {
            ProposedService::Requested => q.service_id,
            ProposedService::Existing { service_id } => {
                let svc = service::Entity::find_by_id(service_id)
                    .one(&*self.db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Service {service_id} not found"))
                    })?;
                if svc.provider_id != provider_id {
                    return Err(ServiceError::Forbidden(
                        "alternate service belongs to another provider".to_string(),
                    ));
                }
                Some(svc.id)
            }
            ProposedService::Custom {
                name,
                description,
                max_members,
            } => {
                if name.trim().is_empty() {
                    return Err(ServiceError::ValidationError(
                        "custom plan name is required".to_string(),
                    ));
                }
                let now = Utc::now();
                let custom = service::ActiveModel {
                    provider_id: Set(provider_id),
                    name: Set(name),
                    description: Set(description),
                    base_price: Set(request.price),
                    is_active: Set(true),
                    is_public: Set(false),
                    max_members: Set(max_members),
                    billing_mode: Set(match q.requested_billing_mode {
                        BillingMode::OneTime => ServiceBillingMode::OneTime,
                        BillingMode::Monthly => ServiceBillingMode::Monthly,
                    }),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                let created = custom.insert(&*self.db).await?;
                Some(created.id)
            }
        };

        let extra_docs_requested = request.extra_docs_requested;
        let mut am: quotation::ActiveModel = q.into();
        am.service_id = Set(service_id);
        am.proposed_price = Set(Some(request.price));
        am.provider_notes = Set(request.notes);
        am.extra_docs_requested = Set(extra_docs_requested);
        am.extra_docs_message = Set(if extra_docs_requested {
            request.extra_docs_message
        } else {
            None
        });
        am.payment_enabled = Set(!extra_docs_requested);
        am.handled_by_email = Set(handled_by_email);
        am.status = Set(QuotationStatus::Accepted);
        am.updated_at = Set(Utc::now());
        let updated = am.update(&*self.db).await?;

        self.event_sender
            .send(Event::QuotationProposed {
                quotation_id: updated.id,
                service_id: updated.service_id,
            })
            .await;

        Ok(updated)
    }

    /// Client confirms the provider's proposal.
    pub async fn client_accept(
        &self,
        client_id: Uuid,
        quotation_id: i64,
    ) -> Result<quotation::Model, ServiceError> {
        let q = self.load(quotation_id).await?;
        Self::owned_by_client(&q, client_id)?;

        match q.status {
            QuotationStatus::Pending | QuotationStatus::Accepted => {}
            QuotationStatus::Rejected | QuotationStatus::Expired => {
                return Err(ServiceError::InvalidOperation(
                    "quotation is no longer open for acceptance".to_string(),
                ))
            }
        }
        match q.proposed_price {
            Some(price) if price > Decimal::ZERO => {}
            _ => {
                return Err(ServiceError::InvalidOperation(
                    "quotation has no proposed price yet".to_string(),
                ))
            }
        }

        let mut am: quotation::ActiveModel = q.into();
        am.status = Set(QuotationStatus::Accepted);
        am.updated_at = Set(Utc::now());
        Ok(am.update(&*self.db).await?)
    }

    /// Either party rejects the quotation; allowed even after acceptance so a
    /// client can back out before paying. `rejected_by` is always recorded.
    pub async fn reject(
        &self,
        party: Party,
        party_id: Uuid,
        quotation_id: i64,
    ) -> Result<quotation::Model, ServiceError> {
        let q = self.load(quotation_id).await?;
        let rejected_by = match party {
            Party::Client => {
                Self::owned_by_client(&q, party_id)?;
                RejectedBy::Client
            }
            Party::Provider => {
                Self::owned_by_provider(&q, party_id)?;
                RejectedBy::Provider
            }
        };

        if q.status == QuotationStatus::Expired {
            return Err(ServiceError::InvalidOperation(
                "expired quotations cannot be rejected".to_string(),
            ));
        }

        let already_rejected = q.status == QuotationStatus::Rejected;
        let mut am: quotation::ActiveModel = q.into();
        am.status = Set(QuotationStatus::Rejected);
        am.rejected_by = Set(Some(rejected_by));
        am.updated_at = Set(Utc::now());
        let updated = am.update(&*self.db).await?;

        if !already_rejected {
            self.event_sender
                .send(Event::QuotationRejected {
                    quotation_id: updated.id,
                })
                .await;
        }

        Ok(updated)
    }

    /// Client submits requested documentation. URLs are appended, never
    /// overwritten; the free-text note is replaced (latest submission wins).
    /// Payment stays blocked until the provider explicitly re-enables it.
    pub async fn submit_extra_docs(
        &self,
        client_id: Uuid,
        quotation_id: i64,
        request: SubmitExtraDocsRequest,
    ) -> Result<quotation::Model, ServiceError> {
        let q = self.load(quotation_id).await?;
        Self::owned_by_client(&q, client_id)?;

        if request.urls.is_empty() && request.text.is_none() {
            return Err(ServiceError::ValidationError(
                "nothing to submit: provide documents or text".to_string(),
            ));
        }

        let mut urls: Vec<serde_json::Value> = q
            .extra_docs_urls
            .as_array()
            .cloned()
            .unwrap_or_default();
        urls.extend(request.urls.iter().map(|u| json!(u)));

        let mut am: quotation::ActiveModel = q.into();
        am.extra_docs_urls = Set(json!(urls));
        if request.text.is_some() {
            am.extra_docs_client_text = Set(request.text);
        }
        am.updated_at = Set(Utc::now());
        Ok(am.update(&*self.db).await?)
    }

    /// Explicit provider action; the only path that unblocks payment while
    /// extra documentation is pending.
    pub async fn enable_payment(
        &self,
        provider_id: Uuid,
        quotation_id: i64,
    ) -> Result<quotation::Model, ServiceError> {
        let q = self.load(quotation_id).await?;
        Self::owned_by_provider(&q, provider_id)?;

        if q.status != QuotationStatus::Accepted {
            return Err(ServiceError::InvalidOperation(
                "payment can only be enabled on an accepted quotation".to_string(),
            ));
        }

        let mut am: quotation::ActiveModel = q.into();
        am.payment_enabled = Set(true);
        am.updated_at = Set(Utc::now());
        let updated = am.update(&*self.db).await?;

        self.event_sender
            .send(Event::PaymentEnabled {
                quotation_id: updated.id,
            })
            .await;

        Ok(updated)
    }

    /// One-way `sin_observar` → `vista` transition; idempotent.
    pub async fn mark_viewed(
        &self,
        provider_id: Uuid,
        quotation_id: i64,
    ) -> Result<quotation::Model, ServiceError> {
        let q = self.load(quotation_id).await?;
        Self::owned_by_provider(&q, provider_id)?;

        if q.view_status == ViewStatus::Vista {
            return Ok(q);
        }

        let mut am: quotation::ActiveModel = q.into();
        am.view_status = Set(ViewStatus::Vista);
        am.updated_at = Set(Utc::now());
        Ok(am.update(&*self.db).await?)
    }

    /// Soft-deletes for the requesting party; hard-deletes once both parties
    /// have deleted. The client path also forces `rejected / rejected_by=client`
    /// so the provider sees the request was cancelled, not abandoned.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        party: Party,
        party_id: Uuid,
        quotation_id: i64,
    ) -> Result<(), ServiceError> {
        let q = self.load(quotation_id).await?;

        match party {
            Party::Client => Self::owned_by_client(&q, party_id)?,
            Party::Provider => Self::owned_by_provider(&q, party_id)?,
        }

        if party == Party::Client {
            let mut am: quotation::ActiveModel = q.clone().into();
            am.status = Set(QuotationStatus::Rejected);
            am.rejected_by = Set(Some(RejectedBy::Client));
            am.updated_at = Set(Utc::now());
            am.update(&*self.db).await?;
        }

        let hard = match (party, q.deletion_state()) {
            // Other party already deleted: remove the row entirely.
            (Party::Client, DeletionState::DeletedByProvider)
            | (Party::Provider, DeletionState::DeletedByClient)
            | (_, DeletionState::FullyDeleted) => {
                q.delete(&*self.db).await?;
                true
            }
            // Repeated delete by the same party is a no-op.
            (Party::Client, DeletionState::DeletedByClient)
            | (Party::Provider, DeletionState::DeletedByProvider) => return Ok(()),
            (Party::Client, _) => {
                let am = quotation::ActiveModel {
                    client_deleted_at: Set(Some(Utc::now())),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                };
                quotation::Entity::update_many()
                    .set(am)
                    .filter(quotation::Column::Id.eq(quotation_id))
                    .exec(&*self.db)
                    .await?;
                false
            }
            (Party::Provider, _) => {
                let am = quotation::ActiveModel {
                    provider_deleted_at: Set(Some(Utc::now())),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                };
                quotation::Entity::update_many()
                    .set(am)
                    .filter(quotation::Column::Id.eq(quotation_id))
                    .exec(&*self.db)
                    .await?;
                false
            }
        };

        self.event_sender
            .send(Event::QuotationDeleted { quotation_id, hard })
            .await;

        Ok(())
    }

    /// Quotations still visible to the client (not soft-deleted on their side).
    pub async fn list_for_client(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<quotation::Model>, ServiceError> {
        Ok(quotation::Entity::find()
            .filter(quotation::Column::ClientId.eq(client_id))
            .filter(quotation::Column::ClientDeletedAt.is_null())
            .order_by_desc(quotation::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Quotations still visible to the provider.
    pub async fn list_for_provider(
        &self,
        provider_id: Uuid,
    ) -> Result<Vec<quotation::Model>, ServiceError> {
        Ok(quotation::Entity::find()
            .filter(quotation::Column::ProviderId.eq(provider_id))
            .filter(quotation::Column::ProviderDeletedAt.is_null())
            .order_by_desc(quotation::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Loads a quotation applying per-party visibility rules.
    pub async fn get_visible(
        &self,
        party: Party,
        party_id: Uuid,
        quotation_id: i64,
    ) -> Result<quotation::Model, ServiceError> {
        let q = self.load(quotation_id).await?;
        let visible = match party {
            Party::Client => q.client_id == party_id && q.client_deleted_at.is_none(),
            Party::Provider => q.provider_id == party_id && q.provider_deleted_at.is_none(),
        };
        if !visible {
            return Err(ServiceError::NotFound(format!(
                "Quotation {quotation_id} not found"
            )));
        }
        Ok(q)
    }
}
