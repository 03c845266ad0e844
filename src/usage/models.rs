use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// key: usage-models -> records,limits,quotas
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMetric {
    ApiCall,
    Token,
    StorageByte,
    ComputeSecond,
    Bandwidth,
}

impl UsageMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageMetric::ApiCall => "api_call",
            UsageMetric::Token => "token",
            UsageMetric::StorageByte => "storage_byte",
            UsageMetric::ComputeSecond => "compute_second",
            UsageMetric::Bandwidth => "bandwidth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePeriod {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl UsagePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsagePeriod::Daily => "daily",
            UsagePeriod::Weekly => "weekly",
            UsagePeriod::Monthly => "monthly",
            UsagePeriod::Quarterly => "quarterly",
            UsagePeriod::Annual => "annual",
        }
    }

    /// Calendar-aligned window containing `now`.
    pub fn window_bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self {
            UsagePeriod::Daily => {
                let start = Utc
                    .with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
                    .single()
                    .unwrap();
                (start, start + Duration::days(1))
            }
            UsagePeriod::Weekly => {
                let weekday = now.weekday().num_days_from_monday() as i64;
                let start = now
                    - Duration::days(weekday)
                    - Duration::seconds(now.num_seconds_from_midnight() as i64);
                let start = Utc
                    .with_ymd_and_hms(start.year(), start.month(), start.day(), 0, 0, 0)
                    .single()
                    .unwrap();
                (start, start + Duration::days(7))
            }
            UsagePeriod::Monthly => {
                let start_date = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                let start = Utc.from_utc_datetime(&start_date);
                (start, start + Months::new(1))
            }
            UsagePeriod::Quarterly => {
                let quarter_month = (now.month0() / 3) * 3 + 1;
                let start_date = NaiveDate::from_ymd_opt(now.year(), quarter_month, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                let start = Utc.from_utc_datetime(&start_date);
                (start, start + Months::new(3))
            }
            UsagePeriod::Annual => {
                let start_date = NaiveDate::from_ymd_opt(now.year(), 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                let start = Utc.from_utc_datetime(&start_date);
                (start, start + Months::new(12))
            }
        }
    }

    /// Number of billable days in the period anchored at `anchor`. Monthly
    /// follows the calendar month of the anchor; annual is fixed at 365.
    pub fn days_in_period(&self, anchor: NaiveDate) -> i64 {
        match self {
            UsagePeriod::Daily => 1,
            UsagePeriod::Weekly => 7,
            UsagePeriod::Monthly => days_in_month(anchor.year(), anchor.month()),
            UsagePeriod::Quarterly => {
                let end = anchor.checked_add_months(Months::new(3)).unwrap_or(anchor);
                (end - anchor).num_days()
            }
            UsagePeriod::Annual => 365,
        }
    }

    /// Next period boundary after `start`.
    pub fn advance(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            UsagePeriod::Daily => start
                .checked_add_signed(Duration::days(1))
                .unwrap_or(start),
            UsagePeriod::Weekly => start
                .checked_add_signed(Duration::days(7))
                .unwrap_or(start),
            UsagePeriod::Monthly => start
                .checked_add_months(Months::new(1))
                .unwrap_or(start),
            UsagePeriod::Quarterly => start
                .checked_add_months(Months::new(3))
                .unwrap_or(start),
            UsagePeriod::Annual => start
                .checked_add_months(Months::new(12))
                .unwrap_or(start),
        }
    }
}

fn days_in_month(year: i32, month: u32) -> i64 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let next = first.checked_add_months(Months::new(1)).unwrap_or(first);
    (next - first).num_days()
}

/// Immutable audit entry. Appended for every tracked event, over quota or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub customer_id: String,
    pub metric: UsageMetric,
    pub quantity: i64,
    pub category: Option<String>,
    pub resource_id: Option<String>,
    pub resource_type: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

/// key: usage-limit-model -> admin-managed ceiling per customer/metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLimit {
    pub id: Uuid,
    pub customer_id: String,
    pub metric: UsageMetric,
    pub max_quantity: i64,
    pub period: UsagePeriod,
    pub category: Option<String>,
    pub resource_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// key: usage-quota-model -> running total per customer/metric/window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageQuota {
    pub customer_id: String,
    pub metric: UsageMetric,
    pub period: UsagePeriod,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub allocated_quantity: i64,
    pub used_quantity: i64,
    pub updated_at: DateTime<Utc>,
}

impl UsageQuota {
    pub fn open(
        customer_id: &str,
        metric: UsageMetric,
        period: UsagePeriod,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        allocated_quantity: i64,
    ) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            metric,
            period,
            window_start,
            window_end,
            allocated_quantity,
            used_quantity: 0,
            updated_at: window_start,
        }
    }

    pub fn remaining(&self) -> i64 {
        self.allocated_quantity.saturating_sub(self.used_quantity)
    }
}

/// Outcome of a read-only quota check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageCheck {
    pub allowed: bool,
    pub reason: Option<String>,
    pub quota: Option<UsageQuota>,
}

/// Outcome of a tracked event. The record always exists; `exceeded` flags a
/// post-update quota overrun instead of rejecting the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedUsage {
    pub record: UsageRecord,
    pub quota: Option<UsageQuota>,
    pub exceeded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub customer_id: String,
    pub total_quantity: i64,
    pub record_count: u64,
    pub by_metric: BTreeMap<UsageMetric, i64>,
}

impl UsageSummary {
    pub fn empty(customer_id: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            total_quantity: 0,
            record_count: 0,
            by_metric: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Flat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageBucket {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageTrend {
    pub customer_id: String,
    pub metric: UsageMetric,
    pub interval: UsagePeriod,
    pub buckets: Vec<UsageBucket>,
    pub direction: TrendDirection,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_window_is_calendar_aligned() {
        let now = Utc.with_ymd_and_hms(2025, 4, 17, 13, 45, 0).single().unwrap();
        let (start, end) = UsagePeriod::Monthly.window_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).single().unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).single().unwrap());
    }

    #[test]
    fn quarterly_window_starts_at_quarter() {
        let now = Utc.with_ymd_and_hms(2025, 8, 2, 9, 0, 0).single().unwrap();
        let (start, end) = UsagePeriod::Quarterly.window_bounds(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).single().unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).single().unwrap());
    }

    #[test]
    fn days_in_period_tracks_the_calendar_month() {
        let feb = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
        assert_eq!(UsagePeriod::Monthly.days_in_period(feb), 28);
        let apr = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        assert_eq!(UsagePeriod::Monthly.days_in_period(apr), 30);
        assert_eq!(UsagePeriod::Annual.days_in_period(apr), 365);
    }
}
