use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{billing, subscriptions, usage};

pub fn api_routes() -> Router {
    Router::new()
        .route("/api/usage/:customer_id/events", post(usage::api::track_event))
        .route("/api/usage/:customer_id/check", post(usage::api::check_usage))
        .route("/api/usage/:customer_id/summary", get(usage::api::usage_summary))
        .route("/api/usage/:customer_id/trends", get(usage::api::usage_trends))
        .route(
            "/api/usage/:customer_id/limits",
            put(usage::api::put_usage_limit).get(usage::api::list_usage_limits),
        )
        .route(
            "/api/pricing/rules",
            post(billing::api::put_pricing_rule).get(billing::api::list_pricing_rules),
        )
        .route("/api/billing/cost", post(billing::api::calculate_cost))
        .route("/api/billing/proration", post(billing::api::plan_change_preview))
        .route("/api/billing/charges", post(billing::api::create_charge))
        .route("/api/billing/charges/:id", get(billing::api::get_charge))
        .route(
            "/api/billing/charges/:id/refund",
            post(billing::api::refund_charge),
        )
        .route(
            "/api/customers/:customer_id/charges",
            get(billing::api::list_charges),
        )
        .route("/api/invoices", post(billing::api::create_invoice))
        .route("/api/invoices/:id", get(billing::api::get_invoice))
        .route("/api/invoices/:id/send", post(billing::api::send_invoice))
        .route("/api/invoices/:id/void", post(billing::api::void_invoice))
        .route("/api/invoices/:id/pay", post(billing::api::pay_invoice))
        .route(
            "/api/customers/:customer_id/invoices",
            get(billing::api::list_invoices),
        )
        .route(
            "/api/plans",
            get(subscriptions::api::list_plans).post(subscriptions::api::create_plan),
        )
        .route(
            "/api/subscriptions/:customer_id",
            post(subscriptions::api::subscribe)
                .get(subscriptions::api::get_subscription)
                .delete(subscriptions::api::cancel_subscription),
        )
        .route(
            "/api/subscriptions/:customer_id/plan-change",
            post(subscriptions::api::change_plan),
        )
        .route("/api/analytics/mrr", get(subscriptions::api::mrr))
        .route("/api/analytics/churn", get(subscriptions::api::churn))
        .route("/api/analytics/ltv", get(subscriptions::api::lifetime_value))
        .route(
            "/api/analytics/revenue-forecast",
            post(subscriptions::api::revenue_forecast),
        )
}
