mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use serde_json::json;
use uuid::Uuid;

use common::{assert_status, body_json, quotation_payload, TestApp};
use serviprev_api::{
    auth::Role,
    entities::{quotation, service},
};

#[tokio::test]
async fn client_creates_quotation_and_provider_sees_it_pending() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    let plan = app.seed_service(provider_id, "Plan Familiar", dec!(15000), Some(5)).await;

    let response = app
        .request_as(
            client_id,
            Role::Client,
            Method::POST,
            "/api/v1/quotations",
            Some(quotation_payload(provider_id, Some(plan.id))),
        )
        .await;
    assert_status(&response, StatusCode::CREATED);
    let body = body_json(response).await;
    let quotation_id = body["data"]["quotationId"]
        .as_i64()
        .expect("quotationId is a number");

    let response = app
        .request_as(
            provider_id,
            Role::Provider,
            Method::GET,
            &format!("/api/v1/quotations/{quotation_id}"),
            None,
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["view_status"], "sin_observar");
    assert_eq!(body["data"]["payment_enabled"], false);
}

#[tokio::test]
async fn creation_requires_dni_images() {
    let app = TestApp::new().await;
    let provider_id = Uuid::new_v4();

    let mut payload = quotation_payload(provider_id, None);
    payload["dni_front_url"] = json!("");

    let response = app
        .request_as(
            Uuid::new_v4(),
            Role::Client,
            Method::POST,
            "/api/v1/quotations",
            Some(payload),
        )
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn member_cap_is_enforced_against_headcount() {
    let app = TestApp::new().await;
    let provider_id = Uuid::new_v4();
    // Cap of 2: the requester plus one family member.
    let plan = app.seed_service(provider_id, "Plan Dúo", dec!(9000), Some(2)).await;

    let mut payload = quotation_payload(provider_id, Some(plan.id));
    payload["family_members"] = json!([
        { "full_name": "Pedro Perez", "dni": "40123456", "age": 10 },
        { "full_name": "Maria Perez", "dni": "41123456", "age": 8 }
    ]);

    let response = app
        .request_as(
            Uuid::new_v4(),
            Role::Client,
            Method::POST,
            "/api/v1/quotations",
            Some(payload),
        )
        .await;
    assert_status(&response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proposal_without_extra_docs_enables_payment() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

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
            provider_id,
            Role::Provider,
            Method::POST,
            &format!("/api/v1/quotations/{id}/propose"),
            Some(json!({ "price": "12500.50", "notes": "Incluye urgencias" })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "accepted");
    assert_eq!(body["data"]["payment_enabled"], true);
    let price: rust_decimal::Decimal = body["data"]["proposed_price"]
        .as_str()
        .expect("price serialized as string")
        .parse()
        .unwrap();
    assert_eq!(price, dec!(12500.50));
}

#[tokio::test]
async fn extra_docs_block_payment_until_provider_enables_it() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

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
            provider_id,
            Role::Provider,
            Method::POST,
            &format!("/api/v1/quotations/{id}/propose"),
            Some(json!({
                "price": "20000",
                "extra_docs_requested": true,
                "extra_docs_message": "Necesitamos historia clínica"
            })),
        )
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"]["payment_enabled"], false);

    // Client uploads documents twice; URLs accumulate.
    for url in ["https://cdn.example.com/doc1.pdf", "https://cdn.example.com/doc2.pdf"] {
        let response = app
            .request_as(
                client_id,
                Role::Client,
                Method::POST,
                &format!("/api/v1/quotations/{id}/extra-docs"),
                Some(json!({ "urls": [url], "text": "Adjunto documentación" })),
            )
            .await;
        assert_status(&response, StatusCode::OK);
    }

    let q = quotation::Entity::find_by_id(id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(q.extra_docs_urls.as_array().unwrap().len(), 2);
    assert!(!q.payment_enabled, "docs upload must not unblock payment");

    let response = app
        .request_as(
            provider_id,
            Role::Provider,
            Method::POST,
            &format!("/api/v1/quotations/{id}/enable-payment"),
            None,
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["payment_enabled"], true);
}

#[tokio::test]
async fn proposal_with_custom_plan_creates_private_service() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

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
            provider_id,
            Role::Provider,
            Method::POST,
            &format!("/api/v1/quotations/{id}/propose"),
            Some(json!({
                "price": "18000",
                "service": { "kind": "custom", "name": "Plan a medida", "max_members": 6 }
            })),
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = body_json(response).await;
    let service_id = body["data"]["service_id"].as_i64().expect("repointed service id");

    let created = service::Entity::find_by_id(service_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .expect("custom service row");
    assert_eq!(created.name, "Plan a medida");
    assert!(!created.is_public);
    assert_eq!(created.provider_id, provider_id);
}

#[tokio::test]
async fn rejection_records_which_side_rejected() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

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
            provider_id,
            Role::Provider,
            Method::POST,
            &format!("/api/v1/quotations/{id}/reject"),
            None,
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["rejected_by"], "provider");
}

#[tokio::test]
async fn mark_viewed_is_one_way_and_idempotent() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

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

    for _ in 0..2 {
        let response = app
            .request_as(
                provider_id,
                Role::Provider,
                Method::POST,
                &format!("/api/v1/quotations/{id}/view"),
                None,
            )
            .await;
        assert_status(&response, StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["view_status"], "vista");
    }
}

#[tokio::test]
async fn client_delete_soft_deletes_and_forces_rejection() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

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
            Method::DELETE,
            &format!("/api/v1/quotations/{id}"),
            None,
        )
        .await;
    assert_status(&response, StatusCode::NO_CONTENT);

    // Gone from the client's list.
    let response = app
        .request_as(client_id, Role::Client, Method::GET, "/api/v1/quotations", None)
        .await;
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    // Still visible to the provider, now rejected by the client.
    let response = app
        .request_as(
            provider_id,
            Role::Provider,
            Method::GET,
            &format!("/api/v1/quotations/{id}"),
            None,
        )
        .await;
    assert_status(&response, StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["rejected_by"], "client");
}

#[tokio::test]
async fn second_party_delete_removes_the_row() {
    let app = TestApp::new().await;
    let client_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();

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

    for (user_id, role) in [(client_id, Role::Client), (provider_id, Role::Provider)] {
        let response = app
            .request_as(
                user_id,
                role,
                Method::DELETE,
                &format!("/api/v1/quotations/{id}"),
                None,
            )
            .await;
        assert_status(&response, StatusCode::NO_CONTENT);
    }

    let remaining = quotation::Entity::find_by_id(id)
        .one(&*app.state.db)
        .await
        .unwrap();
    assert!(remaining.is_none(), "row should be hard-deleted");
}

#[tokio::test]
async fn role_gates_and_authentication() {
    let app = TestApp::new().await;
    let provider_id = Uuid::new_v4();

    // No token at all.
    let response = app
        .request(Method::GET, "/api/v1/quotations", None, None)
        .await;
    assert_status(&response, StatusCode::UNAUTHORIZED);

    // A client cannot propose.
    let response = app
        .request_as(
            Uuid::new_v4(),
            Role::Client,
            Method::POST,
            "/api/v1/quotations/1/propose",
            Some(json!({ "price": "100" })),
        )
        .await;
    assert_status(&response, StatusCode::FORBIDDEN);

    // A provider cannot create quotation requests.
    let response = app
        .request_as(
            provider_id,
            Role::Provider,
            Method::POST,
            "/api/v1/quotations",
            Some(quotation_payload(provider_id, None)),
        )
        .await;
    assert_status(&response, StatusCode::FORBIDDEN);
}
