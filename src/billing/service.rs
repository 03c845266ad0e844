use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::storage::{InvoiceRepository, TransactionRepository};

use super::models::{
    Invoice, InvoiceItem, InvoiceStatus, Receipt, Transaction, TransactionStatus,
};
use super::processors::{ChargeStatus, PaymentProcessor};

/// key: billing-transactions -> charge and refund lifecycle
pub struct TransactionManager {
    repo: Arc<dyn TransactionRepository>,
    processor: Arc<dyn PaymentProcessor>,
}

impl TransactionManager {
    pub fn new(repo: Arc<dyn TransactionRepository>, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { repo, processor }
    }

    /// Creates a pending transaction, executes the charge through the
    /// processor, and records the outcome. A decline is data (status
    /// `failed`); a provider failure additionally surfaces as an error.
    pub async fn charge(
        &self,
        customer_id: &str,
        amount: Decimal,
        currency: &str,
        payment_method_id: &str,
        description: Option<String>,
        metadata: Value,
    ) -> AppResult<Transaction> {
        if amount <= Decimal::ZERO {
            return Err(AppError::Validation("amount must be positive".to_string()));
        }
        if currency.trim().is_empty() {
            return Err(AppError::Validation("currency must not be empty".to_string()));
        }
        if payment_method_id.trim().is_empty() {
            return Err(AppError::Validation(
                "payment_method_id must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let mut transaction = Transaction {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            amount,
            currency: currency.to_string(),
            payment_method_id: payment_method_id.to_string(),
            status: TransactionStatus::Pending,
            description: description.clone(),
            processor_charge_id: None,
            metadata,
            created_at: now,
            updated_at: now,
        };
        self.repo.save(&transaction).await?;

        let outcome = self
            .processor
            .process_payment(
                amount,
                currency,
                payment_method_id,
                description.as_deref().unwrap_or(""),
            )
            .await;

        match outcome {
            Ok(charge) => {
                transaction.processor_charge_id = Some(charge.id);
                let next = match charge.status {
                    ChargeStatus::Succeeded => TransactionStatus::Succeeded,
                    ChargeStatus::Declined => TransactionStatus::Failed,
                };
                transaction.transition(next, Utc::now())?;
                self.repo.save(&transaction).await?;
                info!(
                    customer = customer_id,
                    transaction = %transaction.id,
                    status = transaction.status.as_str(),
                    "processed charge"
                );
                Ok(transaction)
            }
            Err(err) => {
                transaction.transition(TransactionStatus::Failed, Utc::now())?;
                self.repo.save(&transaction).await?;
                warn!(
                    customer = customer_id,
                    transaction = %transaction.id,
                    "charge failed at the payment processor"
                );
                Err(err)
            }
        }
    }

    /// Refunds a succeeded transaction, fully or partially. `Succeeded` is the
    /// only state a refund may leave.
    pub async fn refund(&self, transaction_id: Uuid, amount: Option<Decimal>) -> AppResult<Transaction> {
        let mut transaction = self
            .repo
            .load(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))?;

        if transaction.status != TransactionStatus::Succeeded {
            return Err(AppError::Validation(format!(
                "only succeeded transactions can be refunded, found {}",
                transaction.status.as_str()
            )));
        }

        let refund_amount = amount.unwrap_or(transaction.amount);
        if refund_amount <= Decimal::ZERO || refund_amount > transaction.amount {
            return Err(AppError::Validation(
                "refund amount must be positive and at most the charged amount".to_string(),
            ));
        }

        let charge_id = transaction
            .processor_charge_id
            .clone()
            .ok_or_else(|| {
                AppError::ArithmeticInvariant(format!(
                    "succeeded transaction {transaction_id} has no processor charge id"
                ))
            })?;
        self.processor.refund_payment(&charge_id, refund_amount).await?;

        transaction.transition(TransactionStatus::Refunded, Utc::now())?;
        self.repo.save(&transaction).await?;
        info!(transaction = %transaction.id, "refunded transaction");
        Ok(transaction)
    }

    pub async fn get(&self, transaction_id: Uuid) -> AppResult<Transaction> {
        self.repo
            .load(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {transaction_id}")))
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> AppResult<Vec<Transaction>> {
        self.repo.list_for_customer(customer_id).await
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceItemInput {
    pub description: String,
    pub metric: Option<crate::usage::models::UsageMetric>,
    pub quantity: i64,
    pub unit_price: Decimal,
}

/// key: billing-invoices -> draft/send/pay lifecycle with receipts
pub struct InvoiceManager {
    repo: Arc<dyn InvoiceRepository>,
    transactions: Arc<TransactionManager>,
}

impl InvoiceManager {
    pub fn new(repo: Arc<dyn InvoiceRepository>, transactions: Arc<TransactionManager>) -> Self {
        Self { repo, transactions }
    }

    pub async fn create_invoice(
        &self,
        customer_id: &str,
        currency: &str,
        items: Vec<InvoiceItemInput>,
    ) -> AppResult<Invoice> {
        if items.is_empty() {
            return Err(AppError::Validation("invoice needs at least one item".to_string()));
        }
        let mut invoice_items = Vec::with_capacity(items.len());
        for item in items {
            if item.quantity < 0 {
                return Err(AppError::Validation(
                    "item quantity must be non-negative".to_string(),
                ));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(AppError::Validation(
                    "item unit_price must be non-negative".to_string(),
                ));
            }
            let amount = item.unit_price * Decimal::from(item.quantity);
            invoice_items.push(InvoiceItem {
                description: item.description,
                metric: item.metric,
                quantity: item.quantity,
                unit_price: item.unit_price,
                amount,
            });
        }

        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            currency: currency.to_string(),
            items: invoice_items,
            status: InvoiceStatus::Draft,
            payments: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.repo.save(&invoice).await?;
        Ok(invoice)
    }

    pub async fn send_invoice(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let mut invoice = self.load(invoice_id).await?;
        invoice.transition(InvoiceStatus::Sent, Utc::now())?;
        self.repo.save(&invoice).await?;
        Ok(invoice)
    }

    pub async fn void_invoice(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        let mut invoice = self.load(invoice_id).await?;
        invoice.transition(InvoiceStatus::Void, Utc::now())?;
        self.repo.save(&invoice).await?;
        Ok(invoice)
    }

    /// Settles a sent invoice through the transaction manager and issues a
    /// receipt. The invoice is left untouched when the charge does not
    /// succeed.
    pub async fn pay_invoice(
        &self,
        invoice_id: Uuid,
        payment_method_id: &str,
    ) -> AppResult<(Invoice, Receipt)> {
        let mut invoice = self.load(invoice_id).await?;
        if invoice.status != InvoiceStatus::Sent {
            return Err(AppError::Validation(format!(
                "only sent invoices can be paid, found {}",
                invoice.status.as_str()
            )));
        }
        let total = invoice.total();
        if total <= Decimal::ZERO {
            return Err(AppError::Validation("invoice has no payable amount".to_string()));
        }

        let transaction = self
            .transactions
            .charge(
                &invoice.customer_id,
                total,
                &invoice.currency,
                payment_method_id,
                Some(format!("invoice {invoice_id}")),
                Value::Null,
            )
            .await?;
        if transaction.status != TransactionStatus::Succeeded {
            return Err(AppError::PaymentProcessing(format!(
                "payment for invoice {invoice_id} was declined"
            )));
        }

        invoice.payments.push(transaction.id);
        invoice.transition(InvoiceStatus::Paid, Utc::now())?;
        self.repo.save(&invoice).await?;

        let receipt = Receipt {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            customer_id: invoice.customer_id.clone(),
            amount: total,
            currency: invoice.currency.clone(),
            transaction_id: transaction.id,
            issued_at: Utc::now(),
        };
        info!(invoice = %invoice.id, transaction = %transaction.id, "invoice paid");
        Ok((invoice, receipt))
    }

    pub async fn get(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        self.load(invoice_id).await
    }

    pub async fn list_for_customer(&self, customer_id: &str) -> AppResult<Vec<Invoice>> {
        self.repo.list_for_customer(customer_id).await
    }

    async fn load(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        self.repo
            .load(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("invoice {invoice_id}")))
    }
}
