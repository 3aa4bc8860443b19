use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provider's service/plan offering. Catalog browsing is out of scope; the
/// entity exists because quotations reference a service, creation enforces its
/// member cap, and a proposal may mint a private custom plan.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "services")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub provider_id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub base_price: Decimal,
    pub is_active: bool,
    /// Custom plans minted during a proposal are private to that quotation.
    pub is_public: bool,
    #[sea_orm(nullable)]
    pub max_members: Option<i32>,
    pub billing_mode: ServiceBillingMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::quotation::Entity")]
    Quotations,
}

impl Related<super::quotation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Quotations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ServiceBillingMode {
    #[sea_orm(string_value = "one_time")]
    OneTime,
    #[sea_orm(string_value = "monthly")]
    Monthly,
    #[sea_orm(string_value = "both")]
    Both,
}
