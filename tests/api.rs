use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::{Extension, Router};
use billingd::billing::pricing::{BillingCalculator, PricingCatalog};
use billingd::billing::processors::ProcessorKind;
use billingd::billing::service::{InvoiceManager, TransactionManager};
use billingd::routes::api_routes;
use billingd::storage::{
    InvoiceRepository, MemoryStore, SubscriptionRepository, TransactionRepository, UsageRepository,
};
use billingd::subscriptions::analytics::SubscriptionAnalytics;
use billingd::subscriptions::service::SubscriptionManager;
use billingd::usage::tracker::UsageTracker;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

fn build_app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let usage_repo: Arc<dyn UsageRepository> = store.clone();
    let transaction_repo: Arc<dyn TransactionRepository> = store.clone();
    let invoice_repo: Arc<dyn InvoiceRepository> = store.clone();
    let subscription_repo: Arc<dyn SubscriptionRepository> = store.clone();

    let tracker = Arc::new(UsageTracker::new(usage_repo));
    let catalog = Arc::new(PricingCatalog::new());
    let calculator = Arc::new(BillingCalculator::new(catalog.clone()));
    let transactions = Arc::new(TransactionManager::new(
        transaction_repo,
        ProcessorKind::Mock.build(),
    ));
    let invoices = Arc::new(InvoiceManager::new(invoice_repo, transactions.clone()));
    let subscriptions = Arc::new(SubscriptionManager::new(subscription_repo.clone()));
    let analytics = Arc::new(SubscriptionAnalytics::new(subscription_repo));

    api_routes()
        .layer(Extension(tracker))
        .layer(Extension(catalog))
        .layer(Extension(calculator))
        .layer(Extension(transactions))
        .layer(Extension(invoices))
        .layer(Extension(subscriptions))
        .layer(Extension(analytics))
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// key: api-tests -> end-to-end routing through the extensions
#[tokio::test]
async fn usage_events_report_overage_through_the_api() {
    let app = build_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/usage/cust-1/limits",
            json!({"metric": "api_call", "max_quantity": 1000, "period": "monthly"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/usage/cust-1/events",
            json!({"metric": "api_call", "quantity": 950}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["exceeded"], json!(false));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/usage/cust-1/events",
            json!({"metric": "api_call", "quantity": 100}),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["exceeded"], json!(true));
    assert_eq!(body["quota"]["used_quantity"], json!(1050));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/usage/cust-1/summary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["total_quantity"], json!(1050));
}

#[tokio::test]
async fn pricing_rules_drive_the_cost_endpoint() {
    let app = build_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/pricing/rules",
            json!({"kind": "per_unit", "metric": "api_call", "price_per_unit": "0.01"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/billing/cost",
            json!({"metric": "api_call", "quantity": 100}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["amount"], json!("1.00"));

    // no rule for tokens
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/billing/cost",
            json!({"metric": "token", "quantity": 100}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_tier_rules_are_rejected_with_bad_request() {
    let app = build_app();
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/pricing/rules",
            json!({
                "kind": "tiered",
                "metric": "token",
                "mode": "graduated",
                "tiers": [
                    {"min_quantity": 0, "max_quantity": 100, "price_per_unit": "0.01"},
                    {"min_quantity": 200, "max_quantity": null, "price_per_unit": "0.005"}
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proration_endpoint_computes_the_plan_change() {
    let app = build_app();
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/billing/proration",
            json!({
                "old_plan_amount": "10",
                "new_plan_amount": "20",
                "current_date": "2025-04-15",
                "period_start_date": "2025-04-01",
                "period": "monthly"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["days_in_period"], json!(30));
    assert_eq!(body["days_remaining"], json!(16));
}

#[tokio::test]
async fn subscription_flow_over_http() {
    let app = build_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/plans",
            json!({"code": "basic", "name": "Basic", "amount": "10", "period": "monthly"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/subscriptions/cust-1",
            json!({"plan_code": "basic"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["subscription"]["status"], json!("active"));
    assert_eq!(body["plan"]["code"], json!("basic"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/analytics/mrr")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["mrr"], json!("10"));

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/subscriptions/cust-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], json!("canceled"));
}

#[tokio::test]
async fn charges_and_refunds_over_http() {
    let app = build_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/billing/charges",
            json!({
                "customer_id": "cust-1",
                "amount": "19.90",
                "payment_method_id": "pm_card_ok",
                "description": "april invoice"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], json!("succeeded"));
    let transaction_id = body["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/billing/charges/{transaction_id}/refund"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], json!("refunded"));
}
