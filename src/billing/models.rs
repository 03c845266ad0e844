use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::usage::models::UsageMetric;

/// key: pricing-models -> per-unit and tiered rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierMode {
    Graduated,
    Volume,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTier {
    pub min_quantity: i64,
    pub max_quantity: Option<i64>,
    pub price_per_unit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingModel {
    PerUnit { price_per_unit: Decimal },
    Tiered { tiers: Vec<PricingTier>, mode: TierMode },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRule {
    pub metric: UsageMetric,
    pub category: Option<String>,
    pub model: PricingModel,
    pub updated_at: DateTime<Utc>,
}

/// key: transaction-model -> immutable audit trail, status transitions only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Succeeded => "succeeded",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    pub fn can_transition(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Succeeded)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
                | (TransactionStatus::Succeeded, TransactionStatus::Refunded)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub customer_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method_id: String,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub processor_charge_id: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn transition(&mut self, next: TransactionStatus, at: DateTime<Utc>) -> AppResult<()> {
        if !self.status.can_transition(next) {
            return Err(AppError::Validation(format!(
                "illegal transaction transition {} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn can_transition(self, next: InvoiceStatus) -> bool {
        matches!(
            (self, next),
            (InvoiceStatus::Draft, InvoiceStatus::Sent)
                | (InvoiceStatus::Draft, InvoiceStatus::Void)
                | (InvoiceStatus::Sent, InvoiceStatus::Paid)
                | (InvoiceStatus::Sent, InvoiceStatus::Void)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    pub metric: Option<UsageMetric>,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

/// key: invoice-model -> owns its items, settled through transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub customer_id: String,
    pub currency: String,
    pub items: Vec<InvoiceItem>,
    pub status: InvoiceStatus,
    pub payments: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn total(&self) -> Decimal {
        self.items.iter().map(|item| item.amount).sum()
    }

    pub fn transition(&mut self, next: InvoiceStatus, at: DateTime<Utc>) -> AppResult<()> {
        if !self.status.can_transition(next) {
            return Err(AppError::Validation(format!(
                "illegal invoice transition {} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = at;
        Ok(())
    }
}

/// Derived from a paid invoice plus its settling transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub customer_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_id: Uuid,
    pub issued_at: DateTime<Utc>,
}

/// Result of a mid-period plan change. Positive `amount` means the customer
/// owes the difference; negative means a credit is due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanChange {
    pub amount: Decimal,
    pub credit: Decimal,
    pub charge: Decimal,
    pub days_remaining: i64,
    pub days_in_period: i64,
}
