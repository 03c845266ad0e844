use std::sync::Arc;

use billingd::storage::{MemoryStore, UsageRepository};
use billingd::usage::models::{TrendDirection, UsageMetric, UsagePeriod, UsageRecord};
use billingd::usage::tracker::UsageTracker;
use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

fn setup() -> (Arc<MemoryStore>, UsageTracker) {
    let store = Arc::new(MemoryStore::new());
    let repo: Arc<dyn UsageRepository> = store.clone();
    (store, UsageTracker::new(repo))
}

// key: usage-tests -> quota accounting flows
#[tokio::test]
async fn track_usage_records_and_flags_overage() {
    let (store, tracker) = setup();
    tracker
        .set_usage_limit("cust-1", UsageMetric::ApiCall, 1000, UsagePeriod::Monthly, None, None)
        .await
        .unwrap();

    let first = tracker
        .track_usage("cust-1", UsageMetric::ApiCall, 950, None, None, None, Value::Null)
        .await
        .unwrap();
    assert!(!first.exceeded);
    assert_eq!(first.quota.as_ref().unwrap().used_quantity, 950);

    let second = tracker
        .track_usage("cust-1", UsageMetric::ApiCall, 100, None, None, None, Value::Null)
        .await
        .unwrap();
    assert!(second.exceeded, "usage past the limit must be flagged");
    let quota = second.quota.unwrap();
    assert_eq!(quota.used_quantity, 1050);
    assert_eq!(quota.allocated_quantity, 1000);

    // both events are on the audit log, the overage included
    let records = store.records_for_customer("cust-1").await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn check_usage_allowed_is_idempotent() {
    let (store, tracker) = setup();
    tracker
        .set_usage_limit("cust-1", UsageMetric::Token, 500, UsagePeriod::Monthly, None, None)
        .await
        .unwrap();

    let first = tracker
        .check_usage_allowed("cust-1", UsageMetric::Token, 100, None, None)
        .await
        .unwrap();
    let second = tracker
        .check_usage_allowed("cust-1", UsageMetric::Token, 100, None, None)
        .await
        .unwrap();
    assert!(first.allowed);
    assert!(second.allowed);

    // no quota was materialized by the checks
    let window_start = UsagePeriod::Monthly.window_bounds(Utc::now()).0;
    let stored = store
        .load_quota("cust-1", UsageMetric::Token, window_start)
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn check_usage_blocks_over_limit_without_side_effects() {
    let (store, tracker) = setup();
    tracker
        .set_usage_limit("cust-1", UsageMetric::ApiCall, 100, UsagePeriod::Monthly, None, None)
        .await
        .unwrap();
    tracker
        .track_usage("cust-1", UsageMetric::ApiCall, 80, None, None, None, Value::Null)
        .await
        .unwrap();

    let check = tracker
        .check_usage_allowed("cust-1", UsageMetric::ApiCall, 30, None, None)
        .await
        .unwrap();
    assert!(!check.allowed);
    assert_eq!(check.reason.as_deref(), Some("limit exceeded"));
    assert_eq!(check.quota.unwrap().used_quantity, 80);

    // the check itself did not add a record
    let records = store.records_for_customer("cust-1").await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn customers_without_limits_are_unmetered() {
    let (_store, tracker) = setup();

    let check = tracker
        .check_usage_allowed("cust-free", UsageMetric::ApiCall, 1_000_000, None, None)
        .await
        .unwrap();
    assert!(check.allowed);
    assert!(check.quota.is_none());

    let tracked = tracker
        .track_usage("cust-free", UsageMetric::ApiCall, 1_000_000, None, None, None, Value::Null)
        .await
        .unwrap();
    assert!(!tracked.exceeded);
    assert!(tracked.quota.is_none());
}

#[tokio::test]
async fn negative_quantities_are_rejected_before_any_mutation() {
    let (store, tracker) = setup();
    assert!(tracker
        .check_usage_allowed("cust-1", UsageMetric::ApiCall, -1, None, None)
        .await
        .is_err());
    assert!(tracker
        .track_usage("cust-1", UsageMetric::ApiCall, -1, None, None, None, Value::Null)
        .await
        .is_err());
    let records = store.records_for_customer("cust-1").await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn summary_for_unknown_customer_is_empty() {
    let (_store, tracker) = setup();
    let summary = tracker
        .get_usage_summary("nobody", None, None, None)
        .await
        .unwrap();
    assert_eq!(summary.total_quantity, 0);
    assert_eq!(summary.record_count, 0);
    assert!(summary.by_metric.is_empty());
}

#[tokio::test]
async fn summary_aggregates_and_filters_by_metric() {
    let (_store, tracker) = setup();
    tracker
        .track_usage("cust-1", UsageMetric::ApiCall, 10, None, None, None, Value::Null)
        .await
        .unwrap();
    tracker
        .track_usage("cust-1", UsageMetric::Token, 5, None, None, None, Value::Null)
        .await
        .unwrap();

    let all = tracker
        .get_usage_summary("cust-1", None, None, None)
        .await
        .unwrap();
    assert_eq!(all.total_quantity, 15);
    assert_eq!(all.record_count, 2);
    assert_eq!(all.by_metric.get(&UsageMetric::ApiCall), Some(&10));
    assert_eq!(all.by_metric.get(&UsageMetric::Token), Some(&5));

    let tokens = tracker
        .get_usage_summary("cust-1", Some(UsageMetric::Token), None, None)
        .await
        .unwrap();
    assert_eq!(tokens.total_quantity, 5);
    assert_eq!(tokens.record_count, 1);
}

fn record_at(customer_id: &str, quantity: i64, days_ago: i64) -> UsageRecord {
    UsageRecord {
        id: Uuid::new_v4(),
        customer_id: customer_id.to_string(),
        metric: UsageMetric::ApiCall,
        quantity,
        category: None,
        resource_id: None,
        resource_type: None,
        timestamp: Utc::now() - Duration::days(days_ago),
        metadata: Value::Null,
    }
}

#[tokio::test]
async fn trends_report_an_increasing_direction() {
    let (store, tracker) = setup();
    for (quantity, days_ago) in [(1, 3), (1, 2), (5, 1), (5, 0)] {
        store
            .append_record(&record_at("cust-1", quantity, days_ago))
            .await
            .unwrap();
    }

    let trend = tracker
        .get_usage_trends("cust-1", UsageMetric::ApiCall, UsagePeriod::Daily, 4)
        .await
        .unwrap();
    assert_eq!(trend.buckets.len(), 4);
    assert_eq!(trend.direction, TrendDirection::Increasing);
    assert_eq!(trend.buckets.last().unwrap().quantity, 5);
}

#[tokio::test]
async fn trends_report_a_decreasing_direction() {
    let (store, tracker) = setup();
    for (quantity, days_ago) in [(9, 3), (7, 2), (2, 1), (1, 0)] {
        store
            .append_record(&record_at("cust-1", quantity, days_ago))
            .await
            .unwrap();
    }

    let trend = tracker
        .get_usage_trends("cust-1", UsageMetric::ApiCall, UsagePeriod::Daily, 4)
        .await
        .unwrap();
    assert_eq!(trend.direction, TrendDirection::Decreasing);
}

#[tokio::test]
async fn trends_with_no_usage_are_flat() {
    let (_store, tracker) = setup();
    let trend = tracker
        .get_usage_trends("cust-1", UsageMetric::ApiCall, UsagePeriod::Daily, 6)
        .await
        .unwrap();
    assert_eq!(trend.direction, TrendDirection::Flat);
}
