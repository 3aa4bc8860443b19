// Not every test binary exercises every helper.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, Set};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use serviprev_api::{
    auth::{issue_token, Role},
    config::AppConfig,
    db,
    entities::{provider_mp_credentials, service},
    errors::ServiceError,
    events,
    mercadopago::{
        CheckoutPreferenceRequest, MercadoPagoApi, OauthTokenRequest, OauthTokenResponse,
        PaymentDetail, PreferenceResponse,
    },
    services::AppServices,
    AppState,
};

mockall::mock! {
    pub MercadoPago {}

    #[async_trait::async_trait]
    impl MercadoPagoApi for MercadoPago {
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
}

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only";
pub const TEST_SITE_URL: &str = "http://localhost:8080";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        host: "127.0.0.1".to_string(),
        port: 18_080,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        site_url: TEST_SITE_URL.to_string(),
        mp_api_base_url: "https://api.mercadopago.test".to_string(),
        mp_auth_base_url: "https://auth.mercadopago.test".to_string(),
        auto_migrate: true,
        db_max_connections: 1,
    }
}

/// Test harness: in-memory SQLite, real services, a mock payment processor.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// App with a processor mock that panics on any call; fine for flows
    /// that never reach Mercado Pago.
    pub async fn new() -> Self {
        Self::with_mp(MockMercadoPago::new()).await
    }

    pub async fn with_mp(mp: MockMercadoPago) -> Self {
        let cfg = test_config();

        // One connection so every query sees the same in-memory database.
        let mut opts = ConnectOptions::new(cfg.database_url.clone());
        opts.max_connections(1).sqlx_logging(false);
        let pool = Database::connect(opts)
            .await
            .expect("failed to create test database");
        db::create_schema(&pool)
            .await
            .expect("failed to create schema");

        let db_arc = Arc::new(pool);
        let (event_sender, event_rx) = events::channel();
        let event_task = tokio::spawn(events::process_events(event_rx));

        let config = Arc::new(cfg);
        let services = AppServices::build(
            db_arc.clone(),
            Arc::new(mp),
            event_sender.clone(),
            config.clone(),
        );
        let state = AppState::new(db_arc, config, event_sender, services);
        let router = serviprev_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn token_for(&self, user_id: Uuid, role: Role) -> String {
        issue_token(
            TEST_JWT_SECRET,
            user_id,
            Some("user@example.com".to_string()),
            role,
            3600,
        )
        .expect("encode test token")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_as(
        &self,
        user_id: Uuid,
        role: Role,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let token = self.token_for(user_id, role);
        self.request(method, uri, body, Some(&token)).await
    }

    /// Seed a service plan offered by `provider_id`.
    pub async fn seed_service(
        &self,
        provider_id: Uuid,
        name: &str,
        base_price: Decimal,
        max_members: Option<i32>,
    ) -> service::Model {
        let now = Utc::now();
        service::ActiveModel {
            provider_id: Set(provider_id),
            name: Set(name.to_string()),
            description: Set(None),
            base_price: Set(base_price),
            is_active: Set(true),
            is_public: Set(true),
            max_members: Set(max_members),
            billing_mode: Set(service::ServiceBillingMode::OneTime),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("seed service")
    }

    /// Seed fully connected Mercado Pago credentials for a provider.
    pub async fn seed_connected_provider(&self, provider_id: Uuid, access_token: &str) {
        let now = Utc::now();
        provider_mp_credentials::ActiveModel {
            provider_id: Set(provider_id),
            mp_client_id: Set(Some("app-client-id".to_string())),
            mp_client_secret: Set(Some("app-client-secret".to_string())),
            mp_access_token: Set(Some(access_token.to_string())),
            mp_refresh_token: Set(Some("refresh".to_string())),
            mp_user_id: Set(Some(987_654_321)),
            mp_token_expires_at: Set(Some(now + chrono::Duration::days(180))),
            mp_connected_at: Set(Some(now)),
            mp_oauth_state: Set(None),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed provider credentials");
    }
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is not json")
    }
}

pub fn assert_status(response: &axum::response::Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "unexpected status for response"
    );
}

/// Minimal valid quotation payload for a client request.
pub fn quotation_payload(provider_id: Uuid, service_id: Option<i64>) -> Value {
    serde_json::json!({
        "provider_id": provider_id,
        "service_id": service_id,
        "client_full_name": "Juana Perez",
        "client_phone": "+54 11 5555-0000",
        "client_email": "juana@example.com",
        "client_dni": "30123456",
        "client_address": "Av. Siempre Viva 123",
        "client_age": 34,
        "dni_front_url": "https://cdn.example.com/dni-front.jpg",
        "dni_back_url": "https://cdn.example.com/dni-back.jpg",
        "family_members": [],
        "notes": "Busco cobertura para mi familia"
    })
}
