use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// key: billing-processor -> provider integration seam
///
/// The billing core hands a previously computed amount to the processor and
/// never retries; retry policy belongs to the concrete adapter.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_customer(&self, customer_id: &str, metadata: Value) -> AppResult<Value>;
    async fn create_payment_method(&self, customer_id: &str, details: Value) -> AppResult<Value>;
    async fn process_payment(
        &self,
        amount: Decimal,
        currency: &str,
        payment_method_id: &str,
        description: &str,
    ) -> AppResult<ProcessorCharge>;
    async fn refund_payment(&self, charge_id: &str, amount: Decimal) -> AppResult<ProcessorCharge>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Succeeded,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorCharge {
    pub id: String,
    pub status: ChargeStatus,
}

/// Processor variants are resolved at construction time, not by runtime
/// string dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    Mock,
    StripeLike,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::Mock => "mock",
            ProcessorKind::StripeLike => "stripe",
        }
    }

    pub fn build(&self) -> Arc<dyn PaymentProcessor> {
        match self {
            ProcessorKind::Mock => Arc::new(MockProcessor),
            ProcessorKind::StripeLike => Arc::new(StripeLikeAdapter),
        }
    }
}

/// key: billing-processor-mock -> deterministic test double
///
/// Payment methods prefixed `pm_decline` produce a declined charge; methods
/// prefixed `pm_error` simulate a provider outage.
pub struct MockProcessor;

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_customer(&self, customer_id: &str, metadata: Value) -> AppResult<Value> {
        Ok(json_stub("customer", customer_id, metadata))
    }

    async fn create_payment_method(&self, customer_id: &str, details: Value) -> AppResult<Value> {
        Ok(json_stub("payment_method", customer_id, details))
    }

    async fn process_payment(
        &self,
        amount: Decimal,
        currency: &str,
        payment_method_id: &str,
        _description: &str,
    ) -> AppResult<ProcessorCharge> {
        if payment_method_id.starts_with("pm_error") {
            return Err(AppError::PaymentProcessing(format!(
                "provider unavailable for {amount} {currency}"
            )));
        }
        let status = if payment_method_id.starts_with("pm_decline") {
            ChargeStatus::Declined
        } else {
            ChargeStatus::Succeeded
        };
        Ok(ProcessorCharge {
            id: format!("mock_ch_{}", Uuid::new_v4().simple()),
            status,
        })
    }

    async fn refund_payment(&self, charge_id: &str, _amount: Decimal) -> AppResult<ProcessorCharge> {
        Ok(ProcessorCharge {
            id: format!("mock_re_{charge_id}"),
            status: ChargeStatus::Succeeded,
        })
    }
}

/// key: billing-processor-stripe -> stub implementation
pub struct StripeLikeAdapter;

#[async_trait]
impl PaymentProcessor for StripeLikeAdapter {
    async fn create_customer(&self, customer_id: &str, metadata: Value) -> AppResult<Value> {
        Ok(json_stub("customer", customer_id, metadata))
    }

    async fn create_payment_method(&self, customer_id: &str, details: Value) -> AppResult<Value> {
        Ok(json_stub("payment_method", customer_id, details))
    }

    async fn process_payment(
        &self,
        _amount: Decimal,
        _currency: &str,
        _payment_method_id: &str,
        _description: &str,
    ) -> AppResult<ProcessorCharge> {
        Err(AppError::PaymentProcessing(
            "stripe integration is not configured".to_string(),
        ))
    }

    async fn refund_payment(&self, _charge_id: &str, _amount: Decimal) -> AppResult<ProcessorCharge> {
        Err(AppError::PaymentProcessing(
            "stripe integration is not configured".to_string(),
        ))
    }
}

fn json_stub(kind: &str, customer_id: &str, metadata: Value) -> Value {
    serde_json::json!({
        "kind": kind,
        "customer_id": customer_id,
        "metadata": metadata,
        "integration": "stubbed",
    })
}
