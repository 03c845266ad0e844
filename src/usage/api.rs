use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::AppResult;

use super::models::{TrackedUsage, UsageCheck, UsageLimit, UsageMetric, UsagePeriod, UsageSummary, UsageTrend};
use super::tracker::UsageTracker;

/// key: usage-api -> rest endpoints
#[derive(Debug, Deserialize)]
pub struct TrackUsageRequest {
    pub metric: UsageMetric,
    pub quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

pub async fn track_event(
    Extension(tracker): Extension<Arc<UsageTracker>>,
    Path(customer_id): Path<String>,
    Json(payload): Json<TrackUsageRequest>,
) -> AppResult<Json<TrackedUsage>> {
    let tracked = tracker
        .track_usage(
            &customer_id,
            payload.metric,
            payload.quantity,
            payload.category,
            payload.resource_id,
            payload.resource_type,
            payload.metadata,
        )
        .await?;
    Ok(Json(tracked))
}

#[derive(Debug, Deserialize)]
pub struct CheckUsageRequest {
    pub metric: UsageMetric,
    pub quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
}

pub async fn check_usage(
    Extension(tracker): Extension<Arc<UsageTracker>>,
    Path(customer_id): Path<String>,
    Json(payload): Json<CheckUsageRequest>,
) -> AppResult<Json<UsageCheck>> {
    let check = tracker
        .check_usage_allowed(
            &customer_id,
            payload.metric,
            payload.quantity,
            payload.category.as_deref(),
            payload.resource_type.as_deref(),
        )
        .await?;
    Ok(Json(check))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub metric: Option<UsageMetric>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_end: Option<DateTime<Utc>>,
}

pub async fn usage_summary(
    Extension(tracker): Extension<Arc<UsageTracker>>,
    Path(customer_id): Path<String>,
    Query(params): Query<SummaryQuery>,
) -> AppResult<Json<UsageSummary>> {
    let window = match (params.window_start, params.window_end) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    };
    let summary = tracker
        .get_usage_summary(
            &customer_id,
            params.metric,
            params.category.as_deref(),
            window,
        )
        .await?;
    Ok(Json(summary))
}

fn default_num_intervals() -> usize {
    6
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    pub metric: UsageMetric,
    pub interval: UsagePeriod,
    #[serde(default = "default_num_intervals")]
    pub num_intervals: usize,
}

pub async fn usage_trends(
    Extension(tracker): Extension<Arc<UsageTracker>>,
    Path(customer_id): Path<String>,
    Query(params): Query<TrendsQuery>,
) -> AppResult<Json<UsageTrend>> {
    let trend = tracker
        .get_usage_trends(&customer_id, params.metric, params.interval, params.num_intervals)
        .await?;
    Ok(Json(trend))
}

#[derive(Debug, Deserialize)]
pub struct PutLimitRequest {
    pub metric: UsageMetric,
    pub max_quantity: i64,
    pub period: UsagePeriod,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
}

pub async fn put_usage_limit(
    Extension(tracker): Extension<Arc<UsageTracker>>,
    Path(customer_id): Path<String>,
    Json(payload): Json<PutLimitRequest>,
) -> AppResult<Json<UsageLimit>> {
    let limit = tracker
        .set_usage_limit(
            &customer_id,
            payload.metric,
            payload.max_quantity,
            payload.period,
            payload.category,
            payload.resource_type,
        )
        .await?;
    Ok(Json(limit))
}

pub async fn list_usage_limits(
    Extension(tracker): Extension<Arc<UsageTracker>>,
    Path(customer_id): Path<String>,
) -> AppResult<Json<Vec<UsageLimit>>> {
    Ok(Json(tracker.list_usage_limits(&customer_id).await?))
}
