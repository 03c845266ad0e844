pub mod analytics;
pub mod api;
pub mod models;
pub mod scheduler;
pub mod service;

pub use analytics::SubscriptionAnalytics;
pub use models::{RevenuePoint, Subscription, SubscriptionPlan, SubscriptionStatus};
pub use scheduler::{process_tick as run_renewal_tick, spawn as spawn_renewal_scheduler};
pub use service::{PlanInput, SubscriptionManager};
