use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::billing::models::{Invoice, Transaction};
use crate::error::AppResult;
use crate::subscriptions::models::{Subscription, SubscriptionPlan};
use crate::usage::models::{UsageLimit, UsageMetric, UsageQuota, UsageRecord};

use super::{InvoiceRepository, SubscriptionRepository, TransactionRepository, UsageRepository};

/// key: storage-memory -> dashmap adapter for tests and default wiring
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, Vec<UsageRecord>>,
    limits: DashMap<String, Vec<UsageLimit>>,
    quotas: DashMap<String, UsageQuota>,
    transactions: DashMap<Uuid, Transaction>,
    invoices: DashMap<Uuid, Invoice>,
    subscriptions: DashMap<Uuid, Subscription>,
    plans: DashMap<Uuid, SubscriptionPlan>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn quota_key(customer_id: &str, metric: UsageMetric, window_start: DateTime<Utc>) -> String {
        format!(
            "{customer_id}:{}:{}",
            metric.as_str(),
            window_start.timestamp()
        )
    }
}

#[async_trait]
impl UsageRepository for MemoryStore {
    async fn append_record(&self, record: &UsageRecord) -> AppResult<()> {
        self.records
            .entry(record.customer_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn records_for_customer(&self, customer_id: &str) -> AppResult<Vec<UsageRecord>> {
        Ok(self
            .records
            .get(customer_id)
            .map(|records| records.clone())
            .unwrap_or_default())
    }

    async fn upsert_limit(&self, limit: &UsageLimit) -> AppResult<()> {
        let mut limits = self.limits.entry(limit.customer_id.clone()).or_default();
        limits.retain(|existing| {
            !(existing.metric == limit.metric
                && existing.period == limit.period
                && existing.category == limit.category)
        });
        limits.push(limit.clone());
        Ok(())
    }

    async fn list_limits(&self, customer_id: &str) -> AppResult<Vec<UsageLimit>> {
        Ok(self
            .limits
            .get(customer_id)
            .map(|limits| limits.clone())
            .unwrap_or_default())
    }

    async fn load_quota(
        &self,
        customer_id: &str,
        metric: UsageMetric,
        window_start: DateTime<Utc>,
    ) -> AppResult<Option<UsageQuota>> {
        Ok(self
            .quotas
            .get(&Self::quota_key(customer_id, metric, window_start))
            .map(|quota| quota.clone()))
    }

    async fn save_quota(&self, quota: &UsageQuota) -> AppResult<()> {
        self.quotas.insert(
            Self::quota_key(&quota.customer_id, quota.metric, quota.window_start),
            quota.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn save(&self, transaction: &Transaction) -> AppResult<()> {
        self.transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> AppResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|transaction| transaction.clone()))
    }

    async fn list_for_customer(&self, customer_id: &str) -> AppResult<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| entry.value().customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .collect();
        transactions.sort_by_key(|transaction| transaction.created_at);
        Ok(transactions)
    }
}

#[async_trait]
impl InvoiceRepository for MemoryStore {
    async fn save(&self, invoice: &Invoice) -> AppResult<()> {
        self.invoices.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        Ok(self.invoices.get(&id).map(|invoice| invoice.clone()))
    }

    async fn list_for_customer(&self, customer_id: &str) -> AppResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .invoices
            .iter()
            .filter(|entry| entry.value().customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .collect();
        invoices.sort_by_key(|invoice| invoice.created_at);
        Ok(invoices)
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn save_subscription(&self, subscription: &Subscription) -> AppResult<()> {
        self.subscriptions.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_for_customer(&self, customer_id: &str) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().customer_id == customer_id)
            .map(|entry| entry.value().clone())
            .max_by_key(|subscription| subscription.updated_at))
    }

    async fn list_subscriptions(&self) -> AppResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn upsert_plan(&self, plan: &SubscriptionPlan) -> AppResult<()> {
        self.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn get_plan(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>> {
        Ok(self.plans.get(&id).map(|plan| plan.clone()))
    }

    async fn find_plan_by_code(&self, code: &str) -> AppResult<Option<SubscriptionPlan>> {
        Ok(self
            .plans
            .iter()
            .find(|entry| entry.value().code == code)
            .map(|entry| entry.value().clone()))
    }

    async fn list_plans(&self) -> AppResult<Vec<SubscriptionPlan>> {
        let mut plans: Vec<SubscriptionPlan> = self
            .plans
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        plans.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(plans)
    }
}
