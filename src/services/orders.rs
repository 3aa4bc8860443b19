use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::contract::{self, ContractStatus},
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::quotations::Party,
};

/// Read and cancellation paths for orders and the contracts they produce.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    async fn load_order(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {id} not found")))
    }

    fn check_party(o: &order::Model, party: Party, party_id: Uuid) -> Result<(), ServiceError> {
        let ok = match party {
            Party::Client => o.client_id == party_id,
            Party::Provider => o.provider_id == party_id,
        };
        if !ok {
            return Err(ServiceError::Forbidden(
                "order does not belong to this user".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn get_order(
        &self,
        party: Party,
        party_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let o = self.load_order(order_id).await?;
        Self::check_party(&o, party, party_id)?;
        Ok(o)
    }

    pub async fn list_orders(
        &self,
        party: Party,
        party_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let column = match party {
            Party::Client => order::Column::ClientId,
            Party::Provider => order::Column::ProviderId,
        };
        Ok(order::Entity::find()
            .filter(column.eq(party_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Only pending orders can be cancelled; paid orders are cancelled via
    /// their contract.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        party: Party,
        party_id: Uuid,
        order_id: Uuid,
    ) -> Result<order::Model, ServiceError> {
        let o = self.load_order(order_id).await?;
        Self::check_party(&o, party, party_id)?;

        match o.status {
            OrderStatus::Pending => {}
            OrderStatus::Cancelled => return Ok(o),
            OrderStatus::Paid => {
                return Err(ServiceError::InvalidStatus(
                    "paid orders are cancelled through their contract".to_string(),
                ))
            }
        }

        let mut am: order::ActiveModel = o.into();
        am.status = Set(OrderStatus::Cancelled);
        am.updated_at = Set(Utc::now());
        let updated = am.update(&*self.db).await?;

        self.event_sender
            .send(Event::OrderCancelled {
                order_id: updated.id,
            })
            .await;

        Ok(updated)
    }

    /// Contracts where the caller is a party, resolved through the owning order.
    pub async fn list_contracts(
        &self,
        party: Party,
        party_id: Uuid,
    ) -> Result<Vec<(contract::Model, order::Model)>, ServiceError> {
        let column = match party {
            Party::Client => order::Column::ClientId,
            Party::Provider => order::Column::ProviderId,
        };
        let rows = contract::Entity::find()
            .find_also_related(order::Entity)
            .filter(column.eq(party_id))
            .order_by_desc(contract::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(c, o)| o.map(|o| (c, o)))
            .collect())
    }

    /// Cancels a contract and its paid order together so the two never
    /// disagree about whether the engagement is live.
    #[instrument(skip(self))]
    pub async fn cancel_contract(
        &self,
        party: Party,
        party_id: Uuid,
        contract_id: Uuid,
    ) -> Result<contract::Model, ServiceError> {
        let c = contract::Entity::find_by_id(contract_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Contract {contract_id} not found")))?;
        let o = self.load_order(c.order_id).await?;
        Self::check_party(&o, party, party_id)?;

        if c.status == ContractStatus::Cancelled {
            return Ok(c);
        }

        let mut order_am: order::ActiveModel = o.into();
        order_am.status = Set(OrderStatus::Cancelled);
        order_am.updated_at = Set(Utc::now());
        order_am.update(&*self.db).await?;

        let mut am: contract::ActiveModel = c.into();
        am.status = Set(ContractStatus::Cancelled);
        am.updated_at = Set(Utc::now());
        let updated = am.update(&*self.db).await?;

        info!(contract_id = %updated.id, "contract cancelled");
        self.event_sender
            .send(Event::ContractCancelled {
                contract_id: updated.id,
            })
            .await;

        Ok(updated)
    }
}
