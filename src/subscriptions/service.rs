use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::billing::models::PlanChange;
use crate::billing::proration::calculate_plan_change;
use crate::error::{AppError, AppResult};
use crate::storage::SubscriptionRepository;
use crate::usage::models::UsagePeriod;

use super::models::{Subscription, SubscriptionPlan, SubscriptionStatus};

#[derive(Debug, Clone)]
pub struct PlanInput {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub period: UsagePeriod,
    pub active: bool,
}

/// key: subscription-service -> plan catalog and lifecycle
pub struct SubscriptionManager {
    repo: Arc<dyn SubscriptionRepository>,
}

impl SubscriptionManager {
    pub fn new(repo: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repo }
    }

    /// Last-write-wins per plan code; the plan id is stable across updates.
    pub async fn create_plan(&self, input: PlanInput) -> AppResult<SubscriptionPlan> {
        if input.code.trim().is_empty() {
            return Err(AppError::Validation("plan code must not be empty".to_string()));
        }
        if input.amount < Decimal::ZERO {
            return Err(AppError::Validation(
                "plan amount must be non-negative".to_string(),
            ));
        }
        let now = Utc::now();
        let previous = self.repo.find_plan_by_code(&input.code).await?;
        let plan = SubscriptionPlan {
            id: previous.as_ref().map(|plan| plan.id).unwrap_or_else(Uuid::new_v4),
            code: input.code,
            name: input.name,
            description: input.description,
            amount: input.amount,
            currency: input.currency,
            period: input.period,
            active: input.active,
            created_at: previous.map(|plan| plan.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.repo.upsert_plan(&plan).await?;
        Ok(plan)
    }

    pub async fn get_plan(&self, code: &str) -> AppResult<SubscriptionPlan> {
        self.repo
            .find_plan_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("plan {code}")))
    }

    pub async fn list_plans(&self) -> AppResult<Vec<SubscriptionPlan>> {
        self.repo.list_plans().await
    }

    pub async fn current_subscription(&self, customer_id: &str) -> AppResult<Option<Subscription>> {
        self.repo.find_for_customer(customer_id).await
    }

    pub async fn plan_for(&self, subscription: &Subscription) -> AppResult<SubscriptionPlan> {
        self.repo.get_plan(subscription.plan_id).await?.ok_or_else(|| {
            AppError::NotFound(format!(
                "plan {} for subscription {}",
                subscription.plan_id, subscription.id
            ))
        })
    }

    pub async fn subscribe(
        &self,
        customer_id: &str,
        plan_code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Subscription> {
        let plan = self.get_plan(plan_code).await?;
        if !plan.active {
            return Err(AppError::Validation(format!("plan {plan_code} is not active")));
        }
        if let Some(existing) = self.repo.find_for_customer(customer_id).await? {
            if matches!(
                existing.status,
                SubscriptionStatus::Active | SubscriptionStatus::PastDue
            ) {
                return Err(AppError::Validation(
                    "customer already has an active subscription; use a plan change".to_string(),
                ));
            }
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            plan_id: plan.id,
            status: SubscriptionStatus::Active,
            current_period_start: now,
            current_period_end: Some(plan.period.advance(now)),
            canceled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.repo.save_subscription(&subscription).await?;
        info!(
            customer = customer_id,
            subscription = %subscription.id,
            plan = plan_code,
            "created subscription"
        );
        Ok(subscription)
    }

    /// Soft cancellation: the record stays for the audit trail and analytics.
    pub async fn cancel(&self, customer_id: &str, now: DateTime<Utc>) -> AppResult<Subscription> {
        let mut subscription = self.require_subscription(customer_id).await?;
        if subscription.status == SubscriptionStatus::Canceled {
            return Err(AppError::Validation(
                "subscription is already canceled".to_string(),
            ));
        }
        subscription.status = SubscriptionStatus::Canceled;
        subscription.canceled_at = Some(now);
        subscription.updated_at = now;
        self.repo.save_subscription(&subscription).await?;
        info!(customer = customer_id, subscription = %subscription.id, "canceled subscription");
        Ok(subscription)
    }

    /// Moves the subscription onto the new plan without moving the period
    /// anchor and returns the prorated delta for the remainder of the period.
    pub async fn change_plan(
        &self,
        customer_id: &str,
        new_plan_code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<(Subscription, PlanChange)> {
        let mut subscription = self.require_subscription(customer_id).await?;
        if !matches!(
            subscription.status,
            SubscriptionStatus::Active | SubscriptionStatus::PastDue
        ) {
            return Err(AppError::Validation(format!(
                "subscriptions in state {} cannot change plans",
                subscription.status.as_str()
            )));
        }
        let old_plan = self.plan_for(&subscription).await?;
        let new_plan = self.get_plan(new_plan_code).await?;
        if !new_plan.active {
            return Err(AppError::Validation(format!(
                "plan {new_plan_code} is not active"
            )));
        }
        if new_plan.id == old_plan.id {
            return Err(AppError::Validation(format!(
                "subscription is already on plan {new_plan_code}"
            )));
        }

        let change = calculate_plan_change(
            old_plan.amount,
            new_plan.amount,
            now.date_naive(),
            subscription.current_period_start.date_naive(),
            old_plan.period,
        )?;

        subscription.plan_id = new_plan.id;
        subscription.status = SubscriptionStatus::Active;
        subscription.updated_at = now;
        self.repo.save_subscription(&subscription).await?;
        info!(
            customer = customer_id,
            subscription = %subscription.id,
            plan = new_plan_code,
            amount = %change.amount,
            "changed subscription plan"
        );
        Ok((subscription, change))
    }

    /// Advances the period window by the plan period, starting where the
    /// previous window ended.
    pub async fn renew(&self, customer_id: &str, now: DateTime<Utc>) -> AppResult<Subscription> {
        let mut subscription = self.require_subscription(customer_id).await?;
        let plan = self.plan_for(&subscription).await?;
        let start = subscription.current_period_end.unwrap_or(now);
        subscription.current_period_start = start;
        subscription.current_period_end = Some(plan.period.advance(start));
        subscription.status = SubscriptionStatus::Active;
        subscription.updated_at = now;
        self.repo.save_subscription(&subscription).await?;
        Ok(subscription)
    }

    /// Renewal-automation hooks. Each returns `None` when the subscription is
    /// not in the state the transition expects, so the scheduler can skip
    /// quietly.
    pub async fn mark_past_due(
        &self,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Subscription>> {
        let Some(mut subscription) = self.repo.find_for_customer(customer_id).await? else {
            return Ok(None);
        };
        if subscription.status != SubscriptionStatus::Active {
            return Ok(None);
        }
        subscription.status = SubscriptionStatus::PastDue;
        subscription.updated_at = now;
        self.repo.save_subscription(&subscription).await?;
        Ok(Some(subscription))
    }

    pub async fn downgrade(
        &self,
        customer_id: &str,
        plan_code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Subscription>> {
        let Some(mut subscription) = self.repo.find_for_customer(customer_id).await? else {
            return Ok(None);
        };
        if subscription.status != SubscriptionStatus::PastDue {
            return Ok(None);
        }
        let plan = self.get_plan(plan_code).await?;
        subscription.plan_id = plan.id;
        subscription.status = SubscriptionStatus::Active;
        subscription.current_period_start = now;
        subscription.current_period_end = Some(plan.period.advance(now));
        subscription.updated_at = now;
        self.repo.save_subscription(&subscription).await?;
        Ok(Some(subscription))
    }

    pub async fn suspend(
        &self,
        customer_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Subscription>> {
        let Some(mut subscription) = self.repo.find_for_customer(customer_id).await? else {
            return Ok(None);
        };
        if subscription.status != SubscriptionStatus::PastDue {
            return Ok(None);
        }
        subscription.status = SubscriptionStatus::Suspended;
        subscription.current_period_end = Some(now);
        subscription.updated_at = now;
        self.repo.save_subscription(&subscription).await?;
        Ok(Some(subscription))
    }

    pub async fn list_subscriptions(&self) -> AppResult<Vec<Subscription>> {
        self.repo.list_subscriptions().await
    }

    async fn require_subscription(&self, customer_id: &str) -> AppResult<Subscription> {
        self.repo
            .find_for_customer(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("subscription for customer {customer_id}")))
    }
}
