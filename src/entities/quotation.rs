use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A client's request for pricing on a provider's service, progressing through
/// a small approval workflow before becoming payable.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quotations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub client_id: Uuid,
    pub provider_id: Uuid,
    #[sea_orm(nullable)]
    pub service_id: Option<i64>,
    pub status: QuotationStatus,
    pub view_status: ViewStatus,
    pub requested_billing_mode: BillingMode,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub proposed_price: Option<Decimal>,
    #[sea_orm(nullable)]
    pub provider_notes: Option<String>,
    pub extra_docs_requested: bool,
    #[sea_orm(nullable)]
    pub extra_docs_message: Option<String>,
    /// Ordered list of document URLs uploaded by the client. Append-only.
    #[sea_orm(column_type = "Json")]
    pub extra_docs_urls: Json,
    #[sea_orm(nullable)]
    pub extra_docs_client_text: Option<String>,
    pub payment_enabled: bool,
    #[sea_orm(nullable)]
    pub rejected_by: Option<RejectedBy>,
    #[sea_orm(nullable)]
    pub handled_by_email: Option<String>,
    #[sea_orm(nullable)]
    pub client_deleted_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub provider_deleted_at: Option<DateTime<Utc>>,

    // Client-declared data captured with the request.
    pub client_full_name: String,
    pub client_phone: String,
    pub client_email: String,
    pub client_dni: String,
    pub client_address: String,
    pub client_age: i32,
    pub dni_front_url: String,
    pub dni_back_url: String,
    /// List of `{full_name, dni, age}` objects covered by the requested plan.
    #[sea_orm(column_type = "Json", nullable)]
    pub family_members: Option<Json>,
    #[sea_orm(nullable)]
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::service::Entity",
        from = "Column::ServiceId",
        to = "super::service::Column::Id"
    )]
    Service,
}

impl Related<super::service::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Service.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum QuotationStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "expired")]
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ViewStatus {
    #[sea_orm(string_value = "sin_observar")]
    SinObservar,
    #[sea_orm(string_value = "vista")]
    Vista,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum BillingMode {
    #[sea_orm(string_value = "one_time")]
    OneTime,
    #[sea_orm(string_value = "monthly")]
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum RejectedBy {
    #[sea_orm(string_value = "client")]
    Client,
    #[sea_orm(string_value = "provider")]
    Provider,
}

/// Tagged view over the two soft-deletion timestamps. The hard-delete trigger
/// condition becomes a single pattern match instead of a conjunction check
/// scattered across call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionState {
    Active,
    DeletedByClient,
    DeletedByProvider,
    FullyDeleted,
}

impl Model {
    pub fn deletion_state(&self) -> DeletionState {
        match (self.client_deleted_at, self.provider_deleted_at) {
            (None, None) => DeletionState::Active,
            (Some(_), None) => DeletionState::DeletedByClient,
            (None, Some(_)) => DeletionState::DeletedByProvider,
            (Some(_), Some(_)) => DeletionState::FullyDeleted,
        }
    }

    /// Number of people covered: the requesting client plus family members.
    pub fn headcount(&self) -> i64 {
        let family = self
            .family_members
            .as_ref()
            .and_then(|v| v.as_array().map(|a| a.len() as i64))
            .unwrap_or(0);
        1 + family
    }
}
