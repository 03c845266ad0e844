use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use crate::billing::models::{Invoice, Transaction};
use crate::error::AppResult;
use crate::subscriptions::models::{Subscription, SubscriptionPlan};
use crate::usage::models::{UsageLimit, UsageMetric, UsageQuota, UsageRecord};

use super::{InvoiceRepository, SubscriptionRepository, TransactionRepository, UsageRepository};

const USAGE_RECORDS: &str = "usage_records";
const USAGE_LIMITS: &str = "usage_limits";
const USAGE_QUOTAS: &str = "usage_quotas";
const TRANSACTIONS: &str = "transactions";
const INVOICES: &str = "invoices";
const SUBSCRIPTIONS: &str = "subscriptions";
const PLANS: &str = "plans";

/// key: storage-json -> one document per entity under the storage root
///
/// Directory layout is internal to this adapter; the core only sees the
/// repository traits.
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_layout(&self) -> AppResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    fn dir(&self, kind: &str) -> PathBuf {
        self.root.join(kind)
    }

    fn quota_file(customer_id: &str, metric: UsageMetric, window_start: DateTime<Utc>) -> String {
        format!(
            "{customer_id}--{}--{}.json",
            metric.as_str(),
            window_start.timestamp()
        )
    }

    async fn read_doc<T: DeserializeOwned>(&self, path: &Path) -> AppResult<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_doc<T: Serialize>(&self, kind: &str, file: &str, value: &T) -> AppResult<()> {
        let dir = self.dir(kind);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(file), serde_json::to_vec_pretty(value)?).await?;
        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(&self, kind: &str) -> AppResult<Vec<T>> {
        let dir = self.dir(kind);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut values = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            if let Some(value) = self.read_doc(&path).await? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

#[async_trait]
impl UsageRepository for JsonStore {
    async fn append_record(&self, record: &UsageRecord) -> AppResult<()> {
        let file = format!("{}.json", record.customer_id);
        let path = self.dir(USAGE_RECORDS).join(&file);
        let mut records: Vec<UsageRecord> = self.read_doc(&path).await?.unwrap_or_default();
        records.push(record.clone());
        self.write_doc(USAGE_RECORDS, &file, &records).await
    }

    async fn records_for_customer(&self, customer_id: &str) -> AppResult<Vec<UsageRecord>> {
        let path = self.dir(USAGE_RECORDS).join(format!("{customer_id}.json"));
        Ok(self.read_doc(&path).await?.unwrap_or_default())
    }

    async fn upsert_limit(&self, limit: &UsageLimit) -> AppResult<()> {
        let file = format!("{}.json", limit.customer_id);
        let path = self.dir(USAGE_LIMITS).join(&file);
        let mut limits: Vec<UsageLimit> = self.read_doc(&path).await?.unwrap_or_default();
        limits.retain(|existing| {
            !(existing.metric == limit.metric
                && existing.period == limit.period
                && existing.category == limit.category)
        });
        limits.push(limit.clone());
        self.write_doc(USAGE_LIMITS, &file, &limits).await
    }

    async fn list_limits(&self, customer_id: &str) -> AppResult<Vec<UsageLimit>> {
        let path = self.dir(USAGE_LIMITS).join(format!("{customer_id}.json"));
        Ok(self.read_doc(&path).await?.unwrap_or_default())
    }

    async fn load_quota(
        &self,
        customer_id: &str,
        metric: UsageMetric,
        window_start: DateTime<Utc>,
    ) -> AppResult<Option<UsageQuota>> {
        let path = self
            .dir(USAGE_QUOTAS)
            .join(Self::quota_file(customer_id, metric, window_start));
        self.read_doc(&path).await
    }

    async fn save_quota(&self, quota: &UsageQuota) -> AppResult<()> {
        let file = Self::quota_file(&quota.customer_id, quota.metric, quota.window_start);
        self.write_doc(USAGE_QUOTAS, &file, quota).await
    }
}

#[async_trait]
impl TransactionRepository for JsonStore {
    async fn save(&self, transaction: &Transaction) -> AppResult<()> {
        self.write_doc(TRANSACTIONS, &format!("{}.json", transaction.id), transaction)
            .await
    }

    async fn load(&self, id: Uuid) -> AppResult<Option<Transaction>> {
        let path = self.dir(TRANSACTIONS).join(format!("{id}.json"));
        self.read_doc(&path).await
    }

    async fn list_for_customer(&self, customer_id: &str) -> AppResult<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .read_all::<Transaction>(TRANSACTIONS)
            .await?
            .into_iter()
            .filter(|transaction| transaction.customer_id == customer_id)
            .collect();
        transactions.sort_by_key(|transaction| transaction.created_at);
        Ok(transactions)
    }
}

#[async_trait]
impl InvoiceRepository for JsonStore {
    async fn save(&self, invoice: &Invoice) -> AppResult<()> {
        self.write_doc(INVOICES, &format!("{}.json", invoice.id), invoice)
            .await
    }

    async fn load(&self, id: Uuid) -> AppResult<Option<Invoice>> {
        let path = self.dir(INVOICES).join(format!("{id}.json"));
        self.read_doc(&path).await
    }

    async fn list_for_customer(&self, customer_id: &str) -> AppResult<Vec<Invoice>> {
        let mut invoices: Vec<Invoice> = self
            .read_all::<Invoice>(INVOICES)
            .await?
            .into_iter()
            .filter(|invoice| invoice.customer_id == customer_id)
            .collect();
        invoices.sort_by_key(|invoice| invoice.created_at);
        Ok(invoices)
    }
}

#[async_trait]
impl SubscriptionRepository for JsonStore {
    async fn save_subscription(&self, subscription: &Subscription) -> AppResult<()> {
        self.write_doc(
            SUBSCRIPTIONS,
            &format!("{}.json", subscription.id),
            subscription,
        )
        .await
    }

    async fn find_for_customer(&self, customer_id: &str) -> AppResult<Option<Subscription>> {
        Ok(self
            .read_all::<Subscription>(SUBSCRIPTIONS)
            .await?
            .into_iter()
            .filter(|subscription| subscription.customer_id == customer_id)
            .max_by_key(|subscription| subscription.updated_at))
    }

    async fn list_subscriptions(&self) -> AppResult<Vec<Subscription>> {
        self.read_all(SUBSCRIPTIONS).await
    }

    async fn upsert_plan(&self, plan: &SubscriptionPlan) -> AppResult<()> {
        self.write_doc(PLANS, &format!("{}.json", plan.id), plan).await
    }

    async fn get_plan(&self, id: Uuid) -> AppResult<Option<SubscriptionPlan>> {
        let path = self.dir(PLANS).join(format!("{id}.json"));
        self.read_doc(&path).await
    }

    async fn find_plan_by_code(&self, code: &str) -> AppResult<Option<SubscriptionPlan>> {
        Ok(self
            .read_all::<SubscriptionPlan>(PLANS)
            .await?
            .into_iter()
            .find(|plan| plan.code == code))
    }

    async fn list_plans(&self) -> AppResult<Vec<SubscriptionPlan>> {
        let mut plans = self.read_all::<SubscriptionPlan>(PLANS).await?;
        plans.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(plans)
    }
}
