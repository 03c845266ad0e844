use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use tracing_subscriber::{fmt, EnvFilter};

use billingd::billing::pricing::{BillingCalculator, PricingCatalog};
use billingd::billing::service::{InvoiceManager, TransactionManager};
use billingd::config;
use billingd::routes::api_routes;
use billingd::storage::{
    InvoiceRepository, JsonStore, SubscriptionRepository, TransactionRepository, UsageRepository,
};
use billingd::subscriptions::analytics::SubscriptionAnalytics;
use billingd::subscriptions::scheduler;
use billingd::subscriptions::service::SubscriptionManager;
use billingd::usage::tracker::UsageTracker;

async fn root() -> &'static str {
    "Billing API"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();

    let store = Arc::new(JsonStore::new(config::STORAGE_ROOT.as_str()));
    store.ensure_layout().await?;

    let usage_repo: Arc<dyn UsageRepository> = store.clone();
    let transaction_repo: Arc<dyn TransactionRepository> = store.clone();
    let invoice_repo: Arc<dyn InvoiceRepository> = store.clone();
    let subscription_repo: Arc<dyn SubscriptionRepository> = store.clone();

    let tracker = Arc::new(UsageTracker::new(usage_repo));
    let catalog = Arc::new(PricingCatalog::new());
    let calculator = Arc::new(BillingCalculator::new(catalog.clone()));
    let processor = config::PAYMENT_PROCESSOR.build();
    tracing::info!(processor = config::PAYMENT_PROCESSOR.as_str(), "payment processor resolved");
    let transactions = Arc::new(TransactionManager::new(transaction_repo, processor));
    let invoices = Arc::new(InvoiceManager::new(invoice_repo, transactions.clone()));
    let subscriptions = Arc::new(SubscriptionManager::new(subscription_repo.clone()));
    let analytics = Arc::new(SubscriptionAnalytics::new(subscription_repo));

    scheduler::spawn(subscriptions.clone());

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route("/", get(root))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(prometheus_layer)
        .layer(Extension(tracker))
        .layer(Extension(catalog))
        .layer(Extension(calculator))
        .layer(Extension(transactions))
        .layer(Extension(invoices))
        .layer(Extension(subscriptions))
        .layer(Extension(analytics));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
