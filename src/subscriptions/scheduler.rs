use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::time::{self, Duration as TokioDuration};
use tracing::{debug, info, warn};

use crate::config;

use super::models::{Subscription, SubscriptionStatus};
use super::service::SubscriptionManager;

/// key: billing-renewal-scheduler -> automate overdue handling
pub fn spawn(manager: Arc<SubscriptionManager>) {
    let interval = TokioDuration::from_secs(*config::RENEWAL_SCAN_INTERVAL_SECS);
    let grace_days = *config::PAST_DUE_GRACE_DAYS;
    let fallback_plan_code = config::FALLBACK_PLAN_CODE.clone();

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            if let Err(err) =
                process_tick(&manager, now, grace_days, fallback_plan_code.as_deref()).await
            {
                warn!(?err, "billing renewal automation tick failed");
            }
        }
    });
}

/// key: billing-renewal-scheduler -> tick handler
pub async fn process_tick(
    manager: &SubscriptionManager,
    now: DateTime<Utc>,
    grace_days: i64,
    fallback_plan_code: Option<&str>,
) -> Result<()> {
    let latest = latest_per_customer(manager.list_subscriptions().await?);

    for subscription in latest.values() {
        match subscription.status {
            SubscriptionStatus::Active => {
                let expected_end = match subscription.current_period_end {
                    Some(end) => end,
                    None => {
                        let plan = manager.plan_for(subscription).await?;
                        plan.period.advance(subscription.current_period_start)
                    }
                };
                if expected_end < now {
                    match manager.mark_past_due(&subscription.customer_id, now).await {
                        Ok(Some(updated)) => info!(
                            customer = %updated.customer_id,
                            subscription = %updated.id,
                            "marked subscription past_due via renewal automation"
                        ),
                        Ok(None) => {}
                        Err(err) => warn!(
                            ?err,
                            customer = %subscription.customer_id,
                            "failed to mark subscription past_due"
                        ),
                    }
                } else {
                    debug!(
                        customer = %subscription.customer_id,
                        status = subscription.status.as_str(),
                        "subscription within renewal window"
                    );
                }
            }
            SubscriptionStatus::PastDue => {
                if subscription.updated_at + Duration::days(grace_days) > now {
                    continue;
                }

                if let Some(plan_code) = fallback_plan_code {
                    let current_plan = manager.plan_for(subscription).await?;
                    if current_plan.code != plan_code {
                        match manager
                            .downgrade(&subscription.customer_id, plan_code, now)
                            .await
                        {
                            Ok(Some(updated)) => {
                                info!(
                                    customer = %updated.customer_id,
                                    subscription = %updated.id,
                                    plan = plan_code,
                                    "downgraded subscription after grace period"
                                );
                                continue;
                            }
                            Ok(None) => {}
                            Err(err) => warn!(
                                ?err,
                                customer = %subscription.customer_id,
                                plan = plan_code,
                                "failed to downgrade subscription"
                            ),
                        }
                    }
                }

                match manager.suspend(&subscription.customer_id, now).await {
                    Ok(Some(updated)) => info!(
                        customer = %updated.customer_id,
                        subscription = %updated.id,
                        "suspended subscription after grace period"
                    ),
                    Ok(None) => {}
                    Err(err) => warn!(
                        ?err,
                        customer = %subscription.customer_id,
                        "failed to suspend subscription"
                    ),
                }
            }
            SubscriptionStatus::Canceled | SubscriptionStatus::Suspended => {}
        }
    }

    Ok(())
}

fn latest_per_customer(subscriptions: Vec<Subscription>) -> HashMap<String, Subscription> {
    let mut latest: HashMap<String, Subscription> = HashMap::new();
    for subscription in subscriptions {
        match latest.get(&subscription.customer_id) {
            Some(existing) if existing.updated_at >= subscription.updated_at => {}
            _ => {
                latest.insert(subscription.customer_id.clone(), subscription);
            }
        }
    }
    latest
}
