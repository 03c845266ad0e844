pub mod api;
pub mod models;
pub mod pricing;
pub mod processors;
pub mod proration;
pub mod service;

pub use models::{
    Invoice, InvoiceItem, InvoiceStatus, PlanChange, PricingModel, PricingRule, PricingTier,
    Receipt, TierMode, Transaction, TransactionStatus,
};
pub use pricing::{BillingCalculator, PricingCatalog};
pub use processors::{
    ChargeStatus, MockProcessor, PaymentProcessor, ProcessorCharge, ProcessorKind,
    StripeLikeAdapter,
};
pub use proration::calculate_plan_change;
pub use service::{InvoiceItemInput, InvoiceManager, TransactionManager};
