use std::sync::Arc;

use billingd::billing::models::{InvoiceStatus, TransactionStatus};
use billingd::billing::processors::ProcessorKind;
use billingd::billing::service::{InvoiceItemInput, InvoiceManager, TransactionManager};
use billingd::error::AppError;
use billingd::storage::{InvoiceRepository, MemoryStore, TransactionRepository};
use billingd::usage::models::UsageMetric;
use rust_decimal::Decimal;
use serde_json::Value;

fn setup() -> (Arc<MemoryStore>, Arc<TransactionManager>, InvoiceManager) {
    let store = Arc::new(MemoryStore::new());
    let transaction_repo: Arc<dyn TransactionRepository> = store.clone();
    let invoice_repo: Arc<dyn InvoiceRepository> = store.clone();
    let transactions = Arc::new(TransactionManager::new(
        transaction_repo,
        ProcessorKind::Mock.build(),
    ));
    let invoices = InvoiceManager::new(invoice_repo, transactions.clone());
    (store, transactions, invoices)
}

fn line_item(description: &str, quantity: i64, unit_price: &str) -> InvoiceItemInput {
    InvoiceItemInput {
        description: description.to_string(),
        metric: Some(UsageMetric::ApiCall),
        quantity,
        unit_price: unit_price.parse().unwrap(),
    }
}

// key: billing-tests -> charge, refund, invoice lifecycle
#[tokio::test]
async fn charge_succeeds_through_the_mock_processor() {
    let (_store, transactions, _invoices) = setup();
    let transaction = transactions
        .charge(
            "cust-1",
            Decimal::from(25),
            "usd",
            "pm_card_ok",
            Some("april invoice".to_string()),
            Value::Null,
        )
        .await
        .unwrap();

    assert_eq!(transaction.status, TransactionStatus::Succeeded);
    assert!(transaction.processor_charge_id.is_some());
    assert_eq!(transaction.amount, Decimal::from(25));
}

#[tokio::test]
async fn declined_charges_are_recorded_as_failed() {
    let (_store, transactions, _invoices) = setup();
    let transaction = transactions
        .charge(
            "cust-1",
            Decimal::from(25),
            "usd",
            "pm_decline_insufficient",
            None,
            Value::Null,
        )
        .await
        .unwrap();

    assert_eq!(transaction.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn processor_outage_surfaces_but_still_leaves_an_audit_record() {
    let (_store, transactions, _invoices) = setup();
    let result = transactions
        .charge("cust-1", Decimal::from(25), "usd", "pm_error_down", None, Value::Null)
        .await;
    assert!(matches!(result, Err(AppError::PaymentProcessing(_))));

    let recorded = transactions.list_for_customer("cust-1").await.unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, TransactionStatus::Failed);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected_before_any_record() {
    let (_store, transactions, _invoices) = setup();
    assert!(transactions
        .charge("cust-1", Decimal::ZERO, "usd", "pm_card_ok", None, Value::Null)
        .await
        .is_err());
    assert!(transactions
        .list_for_customer("cust-1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn refund_transitions_a_succeeded_transaction() {
    let (_store, transactions, _invoices) = setup();
    let transaction = transactions
        .charge("cust-1", Decimal::from(40), "usd", "pm_card_ok", None, Value::Null)
        .await
        .unwrap();

    let refunded = transactions.refund(transaction.id, None).await.unwrap();
    assert_eq!(refunded.status, TransactionStatus::Refunded);
}

#[tokio::test]
async fn refund_rejects_failed_transactions_and_excess_amounts() {
    let (_store, transactions, _invoices) = setup();
    let failed = transactions
        .charge("cust-1", Decimal::from(40), "usd", "pm_decline_x", None, Value::Null)
        .await
        .unwrap();
    assert!(transactions.refund(failed.id, None).await.is_err());

    let succeeded = transactions
        .charge("cust-1", Decimal::from(40), "usd", "pm_card_ok", None, Value::Null)
        .await
        .unwrap();
    assert!(transactions
        .refund(succeeded.id, Some(Decimal::from(41)))
        .await
        .is_err());
}

#[tokio::test]
async fn transactions_survive_as_an_audit_trail() {
    let (_store, transactions, _invoices) = setup();
    for method in ["pm_card_ok", "pm_decline_x", "pm_card_ok"] {
        let _ = transactions
            .charge("cust-1", Decimal::from(5), "usd", method, None, Value::Null)
            .await;
    }
    let recorded = transactions.list_for_customer("cust-1").await.unwrap();
    assert_eq!(recorded.len(), 3);
}

#[tokio::test]
async fn invoice_lifecycle_pays_and_issues_a_receipt() {
    let (_store, _transactions, invoices) = setup();
    let invoice = invoices
        .create_invoice(
            "cust-1",
            "usd",
            vec![line_item("api usage", 100, "0.01"), line_item("overage", 50, "0.02")],
        )
        .await
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.total(), Decimal::from(2));

    let sent = invoices.send_invoice(invoice.id).await.unwrap();
    assert_eq!(sent.status, InvoiceStatus::Sent);

    let (paid, receipt) = invoices.pay_invoice(invoice.id, "pm_card_ok").await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.payments.len(), 1);
    assert_eq!(receipt.invoice_id, invoice.id);
    assert_eq!(receipt.amount, Decimal::from(2));
    assert_eq!(receipt.transaction_id, paid.payments[0]);
}

#[tokio::test]
async fn draft_invoices_cannot_be_paid() {
    let (_store, _transactions, invoices) = setup();
    let invoice = invoices
        .create_invoice("cust-1", "usd", vec![line_item("api usage", 10, "0.10")])
        .await
        .unwrap();
    assert!(invoices.pay_invoice(invoice.id, "pm_card_ok").await.is_err());
}

#[tokio::test]
async fn paid_invoices_cannot_be_voided() {
    let (_store, _transactions, invoices) = setup();
    let invoice = invoices
        .create_invoice("cust-1", "usd", vec![line_item("api usage", 10, "0.10")])
        .await
        .unwrap();
    invoices.send_invoice(invoice.id).await.unwrap();
    invoices.pay_invoice(invoice.id, "pm_card_ok").await.unwrap();

    let result = invoices.void_invoice(invoice.id).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn declined_payment_leaves_the_invoice_sent() {
    let (_store, _transactions, invoices) = setup();
    let invoice = invoices
        .create_invoice("cust-1", "usd", vec![line_item("api usage", 10, "0.10")])
        .await
        .unwrap();
    invoices.send_invoice(invoice.id).await.unwrap();

    let result = invoices.pay_invoice(invoice.id, "pm_decline_x").await;
    assert!(result.is_err());

    let reloaded = invoices.get(invoice.id).await.unwrap();
    assert_eq!(reloaded.status, InvoiceStatus::Sent);
    assert!(reloaded.payments.is_empty());
}

#[tokio::test]
async fn sent_invoices_can_be_voided() {
    let (_store, _transactions, invoices) = setup();
    let invoice = invoices
        .create_invoice("cust-1", "usd", vec![line_item("api usage", 10, "0.10")])
        .await
        .unwrap();
    invoices.send_invoice(invoice.id).await.unwrap();
    let voided = invoices.void_invoice(invoice.id).await.unwrap();
    assert_eq!(voided.status, InvoiceStatus::Void);
}
