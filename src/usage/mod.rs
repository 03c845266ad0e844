pub mod api;
pub mod models;
pub mod tracker;

pub use models::{
    TrackedUsage, TrendDirection, UsageBucket, UsageCheck, UsageLimit, UsageMetric, UsagePeriod,
    UsageQuota, UsageRecord, UsageSummary, UsageTrend,
};
pub use tracker::UsageTracker;
