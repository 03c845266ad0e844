use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::usage::models::{UsageMetric, UsageSummary};

use super::models::{Invoice, InvoiceItem, InvoiceStatus, PricingModel, PricingRule, PricingTier, TierMode};

/// key: pricing-catalog -> explicit rule registry, last-write-wins per key
pub struct PricingCatalog {
    rules: DashMap<(UsageMetric, Option<String>), PricingRule>,
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingCatalog {
    pub fn new() -> Self {
        Self { rules: DashMap::new() }
    }

    pub fn put_per_unit_rule(
        &self,
        metric: UsageMetric,
        price_per_unit: Decimal,
        category: Option<String>,
    ) -> AppResult<PricingRule> {
        if price_per_unit < Decimal::ZERO {
            return Err(AppError::Validation(
                "price_per_unit must be non-negative".to_string(),
            ));
        }
        let rule = PricingRule {
            metric,
            category: category.clone(),
            model: PricingModel::PerUnit { price_per_unit },
            updated_at: Utc::now(),
        };
        self.rules.insert((metric, category), rule.clone());
        Ok(rule)
    }

    pub fn put_tiered_rule(
        &self,
        metric: UsageMetric,
        tiers: Vec<PricingTier>,
        mode: TierMode,
        category: Option<String>,
    ) -> AppResult<PricingRule> {
        validate_tiers(&tiers)?;
        let rule = PricingRule {
            metric,
            category: category.clone(),
            model: PricingModel::Tiered { tiers, mode },
            updated_at: Utc::now(),
        };
        self.rules.insert((metric, category), rule.clone());
        Ok(rule)
    }

    /// Exact (metric, category) match, falling back to the uncategorized rule.
    pub fn find_rule(&self, metric: UsageMetric, category: Option<&str>) -> Option<PricingRule> {
        if let Some(category) = category {
            if let Some(rule) = self.rules.get(&(metric, Some(category.to_string()))) {
                return Some(rule.clone());
            }
        }
        self.rules.get(&(metric, None)).map(|rule| rule.clone())
    }

    pub fn list_rules(&self) -> Vec<PricingRule> {
        let mut rules: Vec<PricingRule> =
            self.rules.iter().map(|entry| entry.value().clone()).collect();
        rules.sort_by(|a, b| {
            a.metric
                .as_str()
                .cmp(b.metric.as_str())
                .then_with(|| a.category.cmp(&b.category))
        });
        rules
    }
}

/// Tiers must cover `[0, ..)` without gaps or overlap; only the final tier may
/// be unbounded. Nothing is inserted when validation fails.
fn validate_tiers(tiers: &[PricingTier]) -> AppResult<()> {
    if tiers.is_empty() {
        return Err(AppError::Validation("tier list must not be empty".to_string()));
    }
    if tiers[0].min_quantity != 0 {
        return Err(AppError::Validation(
            "first tier must start at quantity 0".to_string(),
        ));
    }
    for (index, tier) in tiers.iter().enumerate() {
        if tier.price_per_unit < Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "tier {index} has a negative price_per_unit"
            )));
        }
        match tier.max_quantity {
            Some(max) if max <= tier.min_quantity => {
                return Err(AppError::Validation(format!(
                    "tier {index} has max_quantity <= min_quantity"
                )));
            }
            None if index != tiers.len() - 1 => {
                return Err(AppError::Validation(format!(
                    "tier {index} is unbounded but not last"
                )));
            }
            _ => {}
        }
        if index > 0 {
            let previous_max = tiers[index - 1].max_quantity.ok_or_else(|| {
                AppError::Validation(format!("tier {} is unbounded but not last", index - 1))
            })?;
            if tier.min_quantity != previous_max {
                return Err(AppError::Validation(format!(
                    "tier {index} min_quantity {} does not continue previous max {previous_max}",
                    tier.min_quantity
                )));
            }
        }
    }
    Ok(())
}

/// key: billing-calculator -> usage quantity to money
pub struct BillingCalculator {
    catalog: Arc<PricingCatalog>,
}

impl BillingCalculator {
    pub fn new(catalog: Arc<PricingCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PricingCatalog {
        &self.catalog
    }

    pub fn calculate_cost(
        &self,
        metric: UsageMetric,
        quantity: i64,
        category: Option<&str>,
    ) -> AppResult<Decimal> {
        if quantity < 0 {
            return Err(AppError::Validation("quantity must be non-negative".to_string()));
        }
        let rule = self.catalog.find_rule(metric, category).ok_or_else(|| {
            AppError::NotFound(format!("no pricing rule for metric {}", metric.as_str()))
        })?;

        match rule.model {
            PricingModel::PerUnit { price_per_unit } => {
                Ok(Decimal::from(quantity) * price_per_unit)
            }
            PricingModel::Tiered { ref tiers, mode } => match mode {
                TierMode::Graduated => graduated_cost(tiers, quantity, metric),
                TierMode::Volume => volume_cost(tiers, quantity, metric),
            },
        }
    }

    /// Draft invoice for a usage summary, one line item per metric that has a
    /// priced rule. Unpriced metrics are skipped.
    pub fn invoice_for_usage(
        &self,
        customer_id: &str,
        summary: &UsageSummary,
        currency: &str,
    ) -> AppResult<Invoice> {
        let now = Utc::now();
        let mut items = Vec::new();
        for (metric, quantity) in &summary.by_metric {
            if self.catalog.find_rule(*metric, None).is_none() {
                continue;
            }
            let amount = self.calculate_cost(*metric, *quantity, None)?;
            let unit_price = if *quantity > 0 {
                amount / Decimal::from(*quantity)
            } else {
                Decimal::ZERO
            };
            items.push(InvoiceItem {
                description: format!("{} usage", metric.as_str()),
                metric: Some(*metric),
                quantity: *quantity,
                unit_price,
                amount,
            });
        }
        Ok(Invoice {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            currency: currency.to_string(),
            items,
            status: InvoiceStatus::Draft,
            payments: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Each tier prices only the portion of quantity that falls inside it.
fn graduated_cost(tiers: &[PricingTier], quantity: i64, metric: UsageMetric) -> AppResult<Decimal> {
    if let Some(last) = tiers.last() {
        if let Some(last_max) = last.max_quantity {
            if quantity > last_max {
                return Err(AppError::ArithmeticInvariant(format!(
                    "quantity {quantity} exceeds the bounded tiers for metric {}",
                    metric.as_str()
                )));
            }
        }
    }
    let mut cost = Decimal::ZERO;
    for tier in tiers {
        if quantity <= tier.min_quantity {
            break;
        }
        let upper = tier.max_quantity.map_or(quantity, |max| quantity.min(max));
        let portion = upper - tier.min_quantity;
        cost += Decimal::from(portion) * tier.price_per_unit;
    }
    Ok(cost)
}

/// The whole quantity is priced at the rate of the tier it lands in.
fn volume_cost(tiers: &[PricingTier], quantity: i64, metric: UsageMetric) -> AppResult<Decimal> {
    let tier = tiers
        .iter()
        .find(|tier| {
            quantity >= tier.min_quantity
                && tier.max_quantity.map_or(true, |max| quantity < max)
        })
        .ok_or_else(|| {
            AppError::ArithmeticInvariant(format!(
                "quantity {quantity} falls outside every tier for metric {}",
                metric.as_str()
            ))
        })?;
    Ok(Decimal::from(quantity) * tier.price_per_unit)
}
