//! Marketplace API for preventive-health service providers: quotation
//! lifecycle, one-time checkout against Mercado Pago connected accounts,
//! payment webhook reconciliation and provider account linking.

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod mercadopago;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, events::EventSender, services::AppServices};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        services: AppServices,
    ) -> Self {
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

/// Standard response envelope.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::health::status))
        .route("/health", get(handlers::health::health))
        .route(
            "/quotations",
            post(handlers::quotations::create_quotation).get(handlers::quotations::list_quotations),
        )
        .route(
            "/quotations/:id",
            get(handlers::quotations::get_quotation)
                .delete(handlers::quotations::delete_quotation),
        )
        .route("/quotations/:id/propose", post(handlers::quotations::propose))
        .route("/quotations/:id/accept", post(handlers::quotations::accept))
        .route("/quotations/:id/reject", post(handlers::quotations::reject))
        .route(
            "/quotations/:id/extra-docs",
            post(handlers::quotations::submit_extra_docs),
        )
        .route(
            "/quotations/:id/enable-payment",
            post(handlers::quotations::enable_payment),
        )
        .route("/quotations/:id/view", post(handlers::quotations::mark_viewed))
        .route("/checkout/one-time", post(handlers::checkout::initiate_one_time))
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route("/contracts", get(handlers::contracts::list_contracts))
        .route(
            "/contracts/:id/cancel",
            post(handlers::contracts::cancel_contract),
        )
        .route(
            "/payments/mp/webhook",
            get(handlers::payment_webhooks::webhook_get)
                .post(handlers::payment_webhooks::webhook_post),
        )
        .route("/mercadopago/oauth/start", get(handlers::mp_oauth::oauth_start))
        .route(
            "/mercadopago/oauth/callback",
            get(handlers::mp_oauth::oauth_callback),
        )
        .route(
            "/mercadopago/credentials",
            put(handlers::mp_oauth::put_credentials),
        )
}

/// Builds the full application router with middleware applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
