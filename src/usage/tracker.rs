use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::storage::UsageRepository;

use super::models::{
    TrackedUsage, TrendDirection, UsageBucket, UsageCheck, UsageLimit, UsageMetric, UsagePeriod,
    UsageQuota, UsageRecord, UsageSummary, UsageTrend,
};

/// key: usage-tracker -> quota accounting
///
/// Quota increments for the same (customer, metric, window) key serialize
/// through a per-key async mutex so concurrent tracking cannot drift the
/// running total.
pub struct UsageTracker {
    repo: Arc<dyn UsageRepository>,
    quota_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UsageTracker {
    pub fn new(repo: Arc<dyn UsageRepository>) -> Self {
        Self {
            repo,
            quota_locks: DashMap::new(),
        }
    }

    pub async fn set_usage_limit(
        &self,
        customer_id: &str,
        metric: UsageMetric,
        max_quantity: i64,
        period: UsagePeriod,
        category: Option<String>,
        resource_type: Option<String>,
    ) -> AppResult<UsageLimit> {
        if max_quantity < 0 {
            return Err(AppError::Validation(
                "max_quantity must be non-negative".to_string(),
            ));
        }
        let existing = self.repo.list_limits(customer_id).await?;
        let previous = existing
            .iter()
            .find(|limit| {
                limit.metric == metric && limit.period == period && limit.category == category
            });
        let now = Utc::now();
        let limit = UsageLimit {
            id: previous.map(|limit| limit.id).unwrap_or_else(Uuid::new_v4),
            customer_id: customer_id.to_string(),
            metric,
            max_quantity,
            period,
            category,
            resource_type,
            created_at: previous.map(|limit| limit.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.repo.upsert_limit(&limit).await?;
        Ok(limit)
    }

    pub async fn list_usage_limits(&self, customer_id: &str) -> AppResult<Vec<UsageLimit>> {
        self.repo.list_limits(customer_id).await
    }

    /// Read-only and idempotent. A customer with no configured limit is
    /// unmetered: the check allows and reports no quota.
    pub async fn check_usage_allowed(
        &self,
        customer_id: &str,
        metric: UsageMetric,
        quantity: i64,
        category: Option<&str>,
        _resource_type: Option<&str>,
    ) -> AppResult<UsageCheck> {
        ensure_quantity(quantity)?;
        let Some(limit) = self.find_limit(customer_id, metric, category).await? else {
            return Ok(UsageCheck {
                allowed: true,
                reason: None,
                quota: None,
            });
        };

        let (window_start, window_end) = limit.period.window_bounds(Utc::now());
        let quota = self
            .repo
            .load_quota(customer_id, metric, window_start)
            .await?
            .unwrap_or_else(|| {
                UsageQuota::open(
                    customer_id,
                    metric,
                    limit.period,
                    window_start,
                    window_end,
                    limit.max_quantity,
                )
            });

        let allowed = quota.used_quantity + quantity <= limit.max_quantity;
        let reason = (!allowed).then(|| "limit exceeded".to_string());
        Ok(UsageCheck {
            allowed,
            reason,
            quota: Some(quota),
        })
    }

    /// Always appends the audit record, then updates the window quota under
    /// the per-key lock. Over-quota usage is recorded and flagged, never
    /// rejected.
    #[allow(clippy::too_many_arguments)]
    pub async fn track_usage(
        &self,
        customer_id: &str,
        metric: UsageMetric,
        quantity: i64,
        category: Option<String>,
        resource_id: Option<String>,
        resource_type: Option<String>,
        metadata: Value,
    ) -> AppResult<TrackedUsage> {
        ensure_quantity(quantity)?;
        let record = UsageRecord {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            metric,
            quantity,
            category: category.clone(),
            resource_id,
            resource_type,
            timestamp: Utc::now(),
            metadata,
        };
        self.repo.append_record(&record).await?;

        let Some(limit) = self.find_limit(customer_id, metric, category.as_deref()).await? else {
            return Ok(TrackedUsage {
                record,
                quota: None,
                exceeded: false,
            });
        };

        let (window_start, window_end) = limit.period.window_bounds(record.timestamp);
        let key = quota_key(customer_id, metric, window_start);
        let lock = self
            .quota_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut quota = self
            .repo
            .load_quota(customer_id, metric, window_start)
            .await?
            .unwrap_or_else(|| {
                UsageQuota::open(
                    customer_id,
                    metric,
                    limit.period,
                    window_start,
                    window_end,
                    limit.max_quantity,
                )
            });
        quota.allocated_quantity = limit.max_quantity;
        quota.used_quantity += quantity;
        quota.updated_at = record.timestamp;
        self.repo.save_quota(&quota).await?;

        let exceeded = quota.used_quantity > quota.allocated_quantity;
        if exceeded {
            warn!(
                customer = customer_id,
                metric = metric.as_str(),
                used = quota.used_quantity,
                allocated = quota.allocated_quantity,
                "usage recorded over quota"
            );
        }
        Ok(TrackedUsage {
            record,
            quota: Some(quota),
            exceeded,
        })
    }

    /// Unknown customers yield an empty summary, not an error.
    pub async fn get_usage_summary(
        &self,
        customer_id: &str,
        metric: Option<UsageMetric>,
        category: Option<&str>,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> AppResult<UsageSummary> {
        let records = self.repo.records_for_customer(customer_id).await?;
        let mut summary = UsageSummary::empty(customer_id);
        for record in records {
            if let Some(metric) = metric {
                if record.metric != metric {
                    continue;
                }
            }
            if let Some(category) = category {
                if record.category.as_deref() != Some(category) {
                    continue;
                }
            }
            if let Some((start, end)) = window {
                if record.timestamp < start || record.timestamp >= end {
                    continue;
                }
            }
            summary.total_quantity += record.quantity;
            summary.record_count += 1;
            *summary.by_metric.entry(record.metric).or_insert(0) += record.quantity;
        }
        Ok(summary)
    }

    pub async fn get_usage_trends(
        &self,
        customer_id: &str,
        metric: UsageMetric,
        interval: UsagePeriod,
        num_intervals: usize,
    ) -> AppResult<UsageTrend> {
        if num_intervals == 0 {
            return Err(AppError::Validation(
                "num_intervals must be positive".to_string(),
            ));
        }
        let records = self.repo.records_for_customer(customer_id).await?;

        let mut windows = Vec::with_capacity(num_intervals);
        let (mut start, mut end) = interval.window_bounds(Utc::now());
        for _ in 0..num_intervals {
            windows.push((start, end));
            let earlier = start - Duration::seconds(1);
            let bounds = interval.window_bounds(earlier);
            start = bounds.0;
            end = bounds.1;
        }
        windows.reverse();

        let buckets: Vec<UsageBucket> = windows
            .into_iter()
            .map(|(window_start, window_end)| UsageBucket {
                window_start,
                window_end,
                quantity: records
                    .iter()
                    .filter(|record| {
                        record.metric == metric
                            && record.timestamp >= window_start
                            && record.timestamp < window_end
                    })
                    .map(|record| record.quantity)
                    .sum(),
            })
            .collect();

        let direction = trend_direction(&buckets);
        Ok(UsageTrend {
            customer_id: customer_id.to_string(),
            metric,
            interval,
            buckets,
            direction,
        })
    }

    /// Exact category match wins over the uncategorized limit.
    async fn find_limit(
        &self,
        customer_id: &str,
        metric: UsageMetric,
        category: Option<&str>,
    ) -> AppResult<Option<UsageLimit>> {
        let limits = self.repo.list_limits(customer_id).await?;
        let mut fallback = None;
        for limit in limits {
            if limit.metric != metric {
                continue;
            }
            if limit.category.as_deref() == category {
                return Ok(Some(limit));
            }
            if limit.category.is_none() {
                fallback = Some(limit);
            }
        }
        Ok(fallback)
    }
}

fn ensure_quantity(quantity: i64) -> AppResult<()> {
    if quantity < 0 {
        return Err(AppError::Validation(
            "quantity must be non-negative".to_string(),
        ));
    }
    Ok(())
}

fn quota_key(customer_id: &str, metric: UsageMetric, window_start: DateTime<Utc>) -> String {
    format!(
        "{customer_id}:{}:{}",
        metric.as_str(),
        window_start.timestamp()
    )
}

/// First-half vs second-half bucket sums; the middle bucket of an odd run is
/// left out of both halves.
fn trend_direction(buckets: &[UsageBucket]) -> TrendDirection {
    let half = buckets.len() / 2;
    if half == 0 {
        return TrendDirection::Flat;
    }
    let first: i64 = buckets[..half].iter().map(|bucket| bucket.quantity).sum();
    let second: i64 = buckets[buckets.len() - half..]
        .iter()
        .map(|bucket| bucket.quantity)
        .sum();
    match second.cmp(&first) {
        std::cmp::Ordering::Greater => TrendDirection::Increasing,
        std::cmp::Ordering::Less => TrendDirection::Decreasing,
        std::cmp::Ordering::Equal => TrendDirection::Flat,
    }
}
