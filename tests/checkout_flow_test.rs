mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

use common::{assert_status, body_json, quotation_payload, MockMercadoPago, TestApp};
use serviprev_api::{
    auth::Role,
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    mercadopago::PreferenceResponse,
};

/// Drives a quotation to the accepted, payment-enabled state and returns its id.
async fn accepted_quotation(
    app: &TestApp,
    client_id: Uuid,
    provider_id: Uuid,
    service_id: Option<i64>,
    price: &str,
) -> i64 {
    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/quotations",
            Some(quotation_payload(provider_id, service_id)),
        )
        .await;
    let id = body_json(response).await["data"]["quotationId"].as_i64().unwrap();

    let response = app
        .request_as(
            provider_id,
            Role::Provider,
            Method::POST,
            &format!("/api/v1/quotations/{id}/propose"),
            Some(json!({ "price": price })),
        )
        .await;
    assert_status(&response, StatusCode::OK);

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            &format!("/api/v1/quotations/{id}/accept"),
            None,
        )
        .await;
    assert_status(&response, StatusCode::OK);
    id
}

#[tokio::test]
async fn checkout_creates_pending_order_and_hosted_session() {
    let mut mp = MockMercadoPago::new();
    mp.expect_create_preference()
        .times(1)
        .returning(|token, req| {
            assert_eq!(token, "prov-token");
            // The preference carries the marketplace commission and points the
            // processor back at the webhook.
            assert_eq!(req.items.len(), 1);
            assert_eq!(req.items[0].quantity, 1);
            assert_eq!(req.items[0].currency_id, "ARS");
            assert_eq!(req.marketplace_fee, dec!(1250.05));
            assert!(req.notification_url.contains("/api/v1/payments/mp/webhook"));
            assert!(req.notification_url.contains("provider_id="));
            assert!(req.notification_url.contains("order_id="));
            assert_eq!(req.auto_return, "approved");
            Ok(PreferenceResponse {
                id: Some("pref-123".to_string()),
                init_point: Some("https://mp.example.com/init/pref-123".to_string()),
            })
        });

    let app = TestApp::with_mp(mp).await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    app.seed_connected_provider(provider_id, "prov-token").await;
    let plan = app.seed_service(provider_id, "Plan Familiar", dec!(12500.50), None).await;

    let quotation_id =
        accepted_quotation(&app, client_id, provider_id, Some(plan.id), "12500.50").await;

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/checkout/one-time",
            Some(json!({ "quotationId": quotation_id })),
        )
        .await;
    assert_status(&response, StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["init_point"], "https://mp.example.com/init/pref-123");
    assert_eq!(body["data"]["preference_id"], "pref-123");
    assert_eq!(body["data"]["platform_fee"], "1250.05");

    let order_id = Uuid::parse_str(body["data"]["order_id"].as_str().unwrap()).unwrap();
    let order = order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_reference.as_deref(), Some("pref-123"));
    assert_eq!(order.amount, dec!(12500.50));
}

#[tokio::test]
async fn checkout_rejected_while_payment_is_blocked() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    app.seed_connected_provider(provider_id, "prov-token").await;

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/quotations",
            Some(quotation_payload(provider_id, None)),
        )
        .await;
    let id = body_json(response).await["data"]["quotationId"].as_i64().unwrap();

    // Proposal with pending extra docs leaves payment disabled.
    app.request_as(
        provider_id,
        Role::Provider,
        Method::POST,
        &format!("/api/v1/quotations/{id}/propose"),
        Some(json!({ "price": "9000", "extra_docs_requested": true })),
    )
    .await;

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/checkout/one-time",
            Some(json!({ "quotationId": id })),
        )
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    let orders = order::Entity::find()
        .filter(order::Column::QuotationId.eq(id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(orders.is_empty(), "no order may exist before preconditions pass");
}

#[tokio::test]
async fn checkout_rejected_before_a_proposal_is_accepted() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    app.seed_connected_provider(provider_id, "prov-token").await;

    // Freshly created, no proposal yet: still pending.
    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/quotations",
            Some(quotation_payload(provider_id, None)),
        )
        .await;
    let id = body_json(response).await["data"]["quotationId"].as_i64().unwrap();

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/checkout/one-time",
            Some(json!({ "quotationId": id })),
        )
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);

    let orders = order::Entity::find()
        .filter(order::Column::QuotationId.eq(id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert!(orders.is_empty(), "no order may exist for a pending quotation");
}

#[tokio::test]
async fn checkout_requires_connected_provider_account() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

    let quotation_id = accepted_quotation(&app, client_id, provider_id, None, "5000").await;

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/checkout/one-time",
            Some(json!({ "quotationId": quotation_id })),
        )
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn processor_failure_leaves_pending_order_behind() {
    let mut mp = MockMercadoPago::new();
    mp.expect_create_preference().times(1).returning(|_, _| {
        Err(ServiceError::ExternalServiceError(
            "preference creation returned 500".to_string(),
        ))
    });

    let app = TestApp::with_mp(mp).await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    app.seed_connected_provider(provider_id, "prov-token").await;

    let quotation_id = accepted_quotation(&app, client_id, provider_id, None, "7000").await;

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/checkout/one-time",
            Some(json!({ "quotationId": quotation_id })),
        )
        .await;
    assert_status(&response, StatusCode::BAD_GATEWAY);

    // The pending order records the attempt.
    let orders = order::Entity::find()
        .filter(order::Column::QuotationId.eq(quotation_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Pending);
    assert!(orders[0].payment_reference.is_none());
}

#[tokio::test]
async fn paid_quotation_cannot_be_checked_out_again() {
    let mut mp = MockMercadoPago::new();
    mp.expect_create_preference().times(1).returning(|_, _| {
        Ok(PreferenceResponse {
            id: Some("pref-once".to_string()),
            init_point: Some("https://mp.example.com/init/pref-once".to_string()),
        })
    });

    let app = TestApp::with_mp(mp).await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    app.seed_connected_provider(provider_id, "prov-token").await;

    let quotation_id = accepted_quotation(&app, client_id, provider_id, None, "3000").await;

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/checkout/one-time",
            Some(json!({ "quotationId": quotation_id })),
        )
        .await;
    assert_status(&response, StatusCode::CREATED);
    let body = body_json(response).await;
    let order_id = Uuid::parse_str(body["data"]["order_id"].as_str().unwrap()).unwrap();

    // Mark the order paid out of band.
    let paid = order::ActiveModel {
        status: sea_orm::Set(OrderStatus::Paid),
        ..Default::default()
    };
    order::Entity::update_many()
        .set(paid)
        .filter(order::Column::Id.eq(order_id))
        .exec(&*app.state.db)
        .await
        .unwrap();

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/checkout/one-time",
            Some(json!({ "quotationId": quotation_id })),
        )
        .await;
    assert_status(&response, StatusCode::CONFLICT);
}
