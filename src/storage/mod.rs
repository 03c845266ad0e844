mod json;
mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::billing::models::{Invoice, Transaction};
use crate::error::AppResult;
use crate::subscriptions::models::{Subscription, SubscriptionPlan};
use crate::usage::models::{UsageLimit, UsageMetric, UsageQuota, UsageRecord};

/// key: storage-repositories -> persistence seam
///
/// The core is storage-agnostic; adapters implement these traits. `JsonStore`
/// persists one document per entity, `MemoryStore` backs tests and default
/// wiring.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn append_record(&self, record: &UsageRecord) -> AppResult<()>;
    async fn records_for_customer(&self, customer_id: &str) -> AppResult<Vec<UsageRecord>>;
    async fn upsert_limit(&self, limit: &UsageLimit) -> AppResult<()>;
    async fn list_limits(&self, customer_id: &str) -> AppResult<Vec<UsageLimit>>;
    async fn load_quota(
        &self,
        customer_id: &str,
        metric: UsageMetric,
        window_start: DateTime<Utc>,
    ) -> AppResult<Option<UsageQuota>>;
    async fn save_quota(&self, quota: &UsageQuota) -> AppResult<()>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn save(&self, transaction: &Transaction) -> AppResult<()>;
    async fn load(&self, id: Uuid) -> AppResult<Option<Transaction>>;
    async fn list_for_customer(&self, customer_id: &str) -> AppResult<Vec<Transaction>>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn save(&self, invoice: &Invoice) -> AppResult<()>;
    async fn load(&self, id: Uuid) -> AppResult<Option<Invoice>>;
    async fn list_for_customer(&self, customer_id: &str) -> AppResult<Vec<Invoice>>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn save_subscription(&self, subscription: &Subscription) -> AppResult<()>;
    /// Latest subscription for the customer by `updated_at`.
    async fn find_for_customer(&self, customer_id: &str) -> AppResult<Option<Subscription>>;
    async fn list_subscriptions(&self) -> AppResult<Vec<Subscription>>;
    async fn upsert_plan(&self, plan: &SubscriptionPlan) -> AppResult<()>;
    async fn get_plan(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>>;
    async fn find_plan_by_code(&self, code: &str) -> AppResult<Option<SubscriptionPlan>>;
    async fn list_plans(&self) -> AppResult<Vec<SubscriptionPlan>>;
}
