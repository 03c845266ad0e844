use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AppResult;
use crate::storage::SubscriptionRepository;
use crate::usage::models::UsagePeriod;

use super::models::{RevenuePoint, SubscriptionPlan};

/// key: subscription-analytics -> mrr,churn,ltv,forecast
///
/// Reporting functions favor availability over strictness: guarded divisions
/// return 0.0 or an undefined sentinel instead of failing.
pub struct SubscriptionAnalytics {
    repo: Arc<dyn SubscriptionRepository>,
}

impl SubscriptionAnalytics {
    pub fn new(repo: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repo }
    }

    /// Sum of active subscription amounts normalized to a monthly rate.
    pub async fn monthly_recurring_revenue(&self, now: DateTime<Utc>) -> AppResult<Decimal> {
        let subscriptions = self.repo.list_subscriptions().await?;
        let mut mrr = Decimal::ZERO;
        for subscription in subscriptions {
            if !subscription.is_active(now) {
                continue;
            }
            let Some(plan) = self.repo.get_plan(subscription.plan_id).await? else {
                continue;
            };
            mrr += monthly_amount(&plan);
        }
        Ok(mrr)
    }

    pub async fn annual_recurring_revenue(&self, now: DateTime<Utc>) -> AppResult<Decimal> {
        Ok(self.monthly_recurring_revenue(now).await? * Decimal::from(12))
    }

    /// Canceled-in-period over active-at-period-start. Returns 0.0 when no
    /// subscriptions were active at the start of the period.
    pub async fn churn_rate(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> AppResult<f64> {
        let (active_at_start, canceled_in_period) =
            self.churn_counts(period_start, period_end).await?;
        if active_at_start == 0 {
            return Ok(0.0);
        }
        Ok(canceled_in_period as f64 / active_at_start as f64)
    }

    /// ARPU divided by churn. `None` means churn is zero and the value is
    /// undefined, not infinite.
    pub async fn lifetime_value(
        &self,
        now: DateTime<Utc>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> AppResult<Option<Decimal>> {
        let (active_at_start, canceled_in_period) =
            self.churn_counts(period_start, period_end).await?;
        if active_at_start == 0 || canceled_in_period == 0 {
            return Ok(None);
        }

        let subscriptions = self.repo.list_subscriptions().await?;
        let active_now = subscriptions
            .iter()
            .filter(|subscription| subscription.is_active(now))
            .count() as i64;
        let arpu = if active_now == 0 {
            Decimal::ZERO
        } else {
            self.monthly_recurring_revenue(now).await? / Decimal::from(active_now)
        };

        // arpu / churn, kept in decimal arithmetic
        let ltv = arpu * Decimal::from(active_at_start) / Decimal::from(canceled_in_period);
        Ok(Some(ltv))
    }

    /// Compounds current MRR forward by a constant growth rate. Deterministic
    /// for a given repository state and rate.
    pub async fn forecast_revenue(
        &self,
        now: DateTime<Utc>,
        periods: u32,
        growth_rate: Decimal,
    ) -> AppResult<Vec<RevenuePoint>> {
        let mut running = self.monthly_recurring_revenue(now).await?;
        let factor = Decimal::ONE + growth_rate;
        let mut points = Vec::with_capacity(periods as usize);
        for period in 1..=periods {
            running *= factor;
            points.push(RevenuePoint {
                period,
                revenue: running.round_dp(2),
            });
        }
        Ok(points)
    }

    async fn churn_counts(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> AppResult<(i64, i64)> {
        let subscriptions = self.repo.list_subscriptions().await?;
        let mut active_at_start = 0_i64;
        let mut canceled_in_period = 0_i64;
        for subscription in subscriptions {
            let existed = subscription.created_at <= period_start;
            let canceled_before = subscription
                .canceled_at
                .map_or(false, |at| at <= period_start);
            if existed && !canceled_before {
                active_at_start += 1;
            }
            if let Some(at) = subscription.canceled_at {
                if at > period_start && at <= period_end {
                    canceled_in_period += 1;
                }
            }
        }
        Ok((active_at_start, canceled_in_period))
    }
}

fn monthly_amount(plan: &SubscriptionPlan) -> Decimal {
    match plan.period {
        UsagePeriod::Daily => plan.amount * Decimal::from(30),
        UsagePeriod::Weekly => plan.amount * Decimal::from(4),
        UsagePeriod::Monthly => plan.amount,
        UsagePeriod::Quarterly => plan.amount / Decimal::from(3),
        UsagePeriod::Annual => plan.amount / Decimal::from(12),
    }
}
