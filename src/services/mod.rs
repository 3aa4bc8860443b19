pub mod checkout;
pub mod mp_oauth;
pub mod orders;
pub mod quotations;
pub mod reconciliation;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, events::EventSender, mercadopago::MercadoPagoApi};

/// All domain services, wired once at startup and cloned into handlers via
/// application state.
#[derive(Clone)]
pub struct AppServices {
    pub quotations: Arc<quotations::QuotationService>,
    pub checkout: Arc<checkout::CheckoutService>,
    pub reconciliation: Arc<reconciliation::ReconciliationService>,
    pub orders: Arc<orders::OrderService>,
    pub mp_oauth: Arc<mp_oauth::MpOauthService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DatabaseConnection>,
        mp: Arc<dyn MercadoPagoApi>,
        event_sender: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            quotations: Arc::new(quotations::QuotationService::new(
                db.clone(),
                event_sender.clone(),
            )),
            checkout: Arc::new(checkout::CheckoutService::new(
                db.clone(),
                mp.clone(),
                event_sender.clone(),
                config.clone(),
            )),
            reconciliation: Arc::new(reconciliation::ReconciliationService::new(
                db.clone(),
                mp.clone(),
                event_sender.clone(),
            )),
            orders: Arc::new(orders::OrderService::new(db.clone(), event_sender.clone())),
            mp_oauth: Arc::new(mp_oauth::MpOauthService::new(db, mp, event_sender, config)),
        }
    }
}
