use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config;
use crate::error::AppResult;
use crate::usage::models::{UsageMetric, UsagePeriod};

use super::models::{Invoice, PlanChange, PricingRule, PricingTier, Receipt, TierMode, Transaction};
use super::pricing::{BillingCalculator, PricingCatalog};
use super::proration::calculate_plan_change;
use super::service::{InvoiceItemInput, InvoiceManager, TransactionManager};

/// key: billing-api -> rest endpoints
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PricingRuleRequest {
    PerUnit {
        metric: UsageMetric,
        price_per_unit: Decimal,
        #[serde(default)]
        category: Option<String>,
    },
    Tiered {
        metric: UsageMetric,
        tiers: Vec<PricingTier>,
        mode: TierMode,
        #[serde(default)]
        category: Option<String>,
    },
}

pub async fn put_pricing_rule(
    Extension(catalog): Extension<Arc<PricingCatalog>>,
    Json(payload): Json<PricingRuleRequest>,
) -> AppResult<Json<PricingRule>> {
    let rule = match payload {
        PricingRuleRequest::PerUnit {
            metric,
            price_per_unit,
            category,
        } => catalog.put_per_unit_rule(metric, price_per_unit, category)?,
        PricingRuleRequest::Tiered {
            metric,
            tiers,
            mode,
            category,
        } => catalog.put_tiered_rule(metric, tiers, mode, category)?,
    };
    Ok(Json(rule))
}

pub async fn list_pricing_rules(
    Extension(catalog): Extension<Arc<PricingCatalog>>,
) -> AppResult<Json<Vec<PricingRule>>> {
    Ok(Json(catalog.list_rules()))
}

#[derive(Debug, Deserialize)]
pub struct CostRequest {
    pub metric: UsageMetric,
    pub quantity: i64,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CostResponse {
    pub metric: UsageMetric,
    pub quantity: i64,
    pub amount: Decimal,
}

pub async fn calculate_cost(
    Extension(calculator): Extension<Arc<BillingCalculator>>,
    Json(payload): Json<CostRequest>,
) -> AppResult<Json<CostResponse>> {
    let amount =
        calculator.calculate_cost(payload.metric, payload.quantity, payload.category.as_deref())?;
    Ok(Json(CostResponse {
        metric: payload.metric,
        quantity: payload.quantity,
        amount,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PlanChangeRequest {
    pub old_plan_amount: Decimal,
    pub new_plan_amount: Decimal,
    pub current_date: NaiveDate,
    pub period_start_date: NaiveDate,
    pub period: UsagePeriod,
}

pub async fn plan_change_preview(
    Json(payload): Json<PlanChangeRequest>,
) -> AppResult<Json<PlanChange>> {
    let change = calculate_plan_change(
        payload.old_plan_amount,
        payload.new_plan_amount,
        payload.current_date,
        payload.period_start_date,
        payload.period,
    )?;
    Ok(Json(change))
}

#[derive(Debug, Deserialize)]
pub struct ChargeRequest {
    pub customer_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub payment_method_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

pub async fn create_charge(
    Extension(transactions): Extension<Arc<TransactionManager>>,
    Json(payload): Json<ChargeRequest>,
) -> AppResult<Json<Transaction>> {
    let currency = payload
        .currency
        .unwrap_or_else(|| config::DEFAULT_CURRENCY.clone());
    let transaction = transactions
        .charge(
            &payload.customer_id,
            payload.amount,
            &currency,
            &payload.payment_method_id,
            payload.description,
            payload.metadata,
        )
        .await?;
    Ok(Json(transaction))
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub amount: Option<Decimal>,
}

pub async fn refund_charge(
    Extension(transactions): Extension<Arc<TransactionManager>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> AppResult<Json<Transaction>> {
    let transaction = transactions.refund(id, payload.amount).await?;
    Ok(Json(transaction))
}

pub async fn get_charge(
    Extension(transactions): Extension<Arc<TransactionManager>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Transaction>> {
    Ok(Json(transactions.get(id).await?))
}

pub async fn list_charges(
    Extension(transactions): Extension<Arc<TransactionManager>>,
    Path(customer_id): Path<String>,
) -> AppResult<Json<Vec<Transaction>>> {
    Ok(Json(transactions.list_for_customer(&customer_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct InvoiceItemRequest {
    pub description: String,
    #[serde(default)]
    pub metric: Option<UsageMetric>,
    pub quantity: i64,
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: String,
    #[serde(default)]
    pub currency: Option<String>,
    pub items: Vec<InvoiceItemRequest>,
}

pub async fn create_invoice(
    Extension(invoices): Extension<Arc<InvoiceManager>>,
    Json(payload): Json<CreateInvoiceRequest>,
) -> AppResult<Json<Invoice>> {
    let currency = payload
        .currency
        .unwrap_or_else(|| config::DEFAULT_CURRENCY.clone());
    let items = payload
        .items
        .into_iter()
        .map(|item| InvoiceItemInput {
            description: item.description,
            metric: item.metric,
            quantity: item.quantity,
            unit_price: item.unit_price,
        })
        .collect();
    let invoice = invoices
        .create_invoice(&payload.customer_id, &currency, items)
        .await?;
    Ok(Json(invoice))
}

pub async fn get_invoice(
    Extension(invoices): Extension<Arc<InvoiceManager>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Invoice>> {
    Ok(Json(invoices.get(id).await?))
}

pub async fn send_invoice(
    Extension(invoices): Extension<Arc<InvoiceManager>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Invoice>> {
    Ok(Json(invoices.send_invoice(id).await?))
}

pub async fn void_invoice(
    Extension(invoices): Extension<Arc<InvoiceManager>>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Invoice>> {
    Ok(Json(invoices.void_invoice(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct PayInvoiceRequest {
    pub payment_method_id: String,
}

#[derive(Debug, Serialize)]
pub struct PaidInvoiceResponse {
    pub invoice: Invoice,
    pub receipt: Receipt,
}

pub async fn pay_invoice(
    Extension(invoices): Extension<Arc<InvoiceManager>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PayInvoiceRequest>,
) -> AppResult<Json<PaidInvoiceResponse>> {
    let (invoice, receipt) = invoices.pay_invoice(id, &payload.payment_method_id).await?;
    Ok(Json(PaidInvoiceResponse { invoice, receipt }))
}

pub async fn list_invoices(
    Extension(invoices): Extension<Arc<InvoiceManager>>,
    Path(customer_id): Path<String>,
) -> AppResult<Json<Vec<Invoice>>> {
    Ok(Json(invoices.list_for_customer(&customer_id).await?))
}
