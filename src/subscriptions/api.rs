use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::models::PlanChange;
use crate::config;
use crate::error::AppResult;
use crate::usage::models::UsagePeriod;

use super::analytics::SubscriptionAnalytics;
use super::models::{RevenuePoint, Subscription, SubscriptionPlan};
use super::service::{PlanInput, SubscriptionManager};

/// key: subscription-api -> rest endpoints
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub period: UsagePeriod,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

pub async fn create_plan(
    Extension(manager): Extension<Arc<SubscriptionManager>>,
    Json(payload): Json<CreatePlanRequest>,
) -> AppResult<Json<SubscriptionPlan>> {
    let plan = manager
        .create_plan(PlanInput {
            code: payload.code,
            name: payload.name,
            description: payload.description,
            amount: payload.amount,
            currency: payload
                .currency
                .unwrap_or_else(|| config::DEFAULT_CURRENCY.clone()),
            period: payload.period,
            active: payload.active,
        })
        .await?;
    Ok(Json(plan))
}

pub async fn list_plans(
    Extension(manager): Extension<Arc<SubscriptionManager>>,
) -> AppResult<Json<Vec<SubscriptionPlan>>> {
    Ok(Json(manager.list_plans().await?))
}

#[derive(Debug, Serialize)]
pub struct SubscriptionEnvelope {
    pub subscription: Subscription,
    pub plan: SubscriptionPlan,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan_code: String,
}

pub async fn subscribe(
    Extension(manager): Extension<Arc<SubscriptionManager>>,
    Path(customer_id): Path<String>,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<Json<SubscriptionEnvelope>> {
    let subscription = manager
        .subscribe(&customer_id, &payload.plan_code, Utc::now())
        .await?;
    let plan = manager.plan_for(&subscription).await?;
    Ok(Json(SubscriptionEnvelope { subscription, plan }))
}

pub async fn get_subscription(
    Extension(manager): Extension<Arc<SubscriptionManager>>,
    Path(customer_id): Path<String>,
) -> AppResult<Json<Option<SubscriptionEnvelope>>> {
    let Some(subscription) = manager.current_subscription(&customer_id).await? else {
        return Ok(Json(None));
    };
    let plan = manager.plan_for(&subscription).await?;
    Ok(Json(Some(SubscriptionEnvelope { subscription, plan })))
}

pub async fn cancel_subscription(
    Extension(manager): Extension<Arc<SubscriptionManager>>,
    Path(customer_id): Path<String>,
) -> AppResult<Json<Subscription>> {
    Ok(Json(manager.cancel(&customer_id, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan_code: String,
}

#[derive(Debug, Serialize)]
pub struct PlanChangeResponse {
    pub subscription: Subscription,
    pub change: PlanChange,
}

pub async fn change_plan(
    Extension(manager): Extension<Arc<SubscriptionManager>>,
    Path(customer_id): Path<String>,
    Json(payload): Json<ChangePlanRequest>,
) -> AppResult<Json<PlanChangeResponse>> {
    let (subscription, change) = manager
        .change_plan(&customer_id, &payload.plan_code, Utc::now())
        .await?;
    Ok(Json(PlanChangeResponse { subscription, change }))
}

#[derive(Debug, Deserialize)]
pub struct AsOfQuery {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct RecurringRevenueResponse {
    pub mrr: Decimal,
    pub arr: Decimal,
    pub as_of: DateTime<Utc>,
}

pub async fn mrr(
    Extension(analytics): Extension<Arc<SubscriptionAnalytics>>,
    Query(params): Query<AsOfQuery>,
) -> AppResult<Json<RecurringRevenueResponse>> {
    let as_of = params.at.unwrap_or_else(Utc::now);
    let mrr = analytics.monthly_recurring_revenue(as_of).await?;
    Ok(Json(RecurringRevenueResponse {
        mrr,
        arr: mrr * Decimal::from(12),
        as_of,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    #[serde(default)]
    pub period_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period_end: Option<DateTime<Utc>>,
}

impl PeriodQuery {
    fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.period_end.unwrap_or_else(Utc::now);
        let start = self.period_start.unwrap_or(end - Duration::days(30));
        (start, end)
    }
}

#[derive(Debug, Serialize)]
pub struct ChurnResponse {
    pub churn_rate: f64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

pub async fn churn(
    Extension(analytics): Extension<Arc<SubscriptionAnalytics>>,
    Query(params): Query<PeriodQuery>,
) -> AppResult<Json<ChurnResponse>> {
    let (period_start, period_end) = params.bounds();
    let churn_rate = analytics.churn_rate(period_start, period_end).await?;
    Ok(Json(ChurnResponse {
        churn_rate,
        period_start,
        period_end,
    }))
}

#[derive(Debug, Serialize)]
pub struct LifetimeValueResponse {
    pub lifetime_value: Option<Decimal>,
}

pub async fn lifetime_value(
    Extension(analytics): Extension<Arc<SubscriptionAnalytics>>,
    Query(params): Query<PeriodQuery>,
) -> AppResult<Json<LifetimeValueResponse>> {
    let (period_start, period_end) = params.bounds();
    let lifetime_value = analytics
        .lifetime_value(Utc::now(), period_start, period_end)
        .await?;
    Ok(Json(LifetimeValueResponse { lifetime_value }))
}

#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub periods: u32,
    #[serde(default)]
    pub growth_rate: Option<Decimal>,
}

pub async fn revenue_forecast(
    Extension(analytics): Extension<Arc<SubscriptionAnalytics>>,
    Json(payload): Json<ForecastRequest>,
) -> AppResult<Json<Vec<RevenuePoint>>> {
    let growth_rate = payload
        .growth_rate
        .unwrap_or(*config::REVENUE_FORECAST_GROWTH_RATE);
    let points = analytics
        .forecast_revenue(Utc::now(), payload.periods, growth_rate)
        .await?;
    Ok(Json(points))
}
