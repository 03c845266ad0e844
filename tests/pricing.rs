use std::collections::BTreeMap;
use std::sync::Arc;

use billingd::billing::models::{InvoiceStatus, PricingTier, TierMode};
use billingd::billing::pricing::{BillingCalculator, PricingCatalog};
use billingd::error::AppError;
use billingd::usage::models::{UsageMetric, UsageSummary};
use rust_decimal::Decimal;

fn calculator() -> (Arc<PricingCatalog>, BillingCalculator) {
    let catalog = Arc::new(PricingCatalog::new());
    (catalog.clone(), BillingCalculator::new(catalog))
}

fn token_tiers() -> Vec<PricingTier> {
    vec![
        PricingTier {
            min_quantity: 0,
            max_quantity: Some(1000),
            price_per_unit: "0.001".parse().unwrap(),
        },
        PricingTier {
            min_quantity: 1000,
            max_quantity: Some(10_000),
            price_per_unit: "0.0008".parse().unwrap(),
        },
        PricingTier {
            min_quantity: 10_000,
            max_quantity: None,
            price_per_unit: "0.0005".parse().unwrap(),
        },
    ]
}

// key: pricing-tests -> rule registry and cost scenarios
#[test]
fn per_unit_rule_prices_api_calls() {
    let (catalog, calculator) = calculator();
    catalog
        .put_per_unit_rule(UsageMetric::ApiCall, "0.01".parse().unwrap(), None)
        .unwrap();

    let cost = calculator
        .calculate_cost(UsageMetric::ApiCall, 100, None)
        .unwrap();
    assert_eq!(cost, "1.00".parse::<Decimal>().unwrap());
}

#[test]
fn graduated_tiers_price_each_bracket_separately() {
    let (catalog, calculator) = calculator();
    catalog
        .put_tiered_rule(UsageMetric::Token, token_tiers(), TierMode::Graduated, None)
        .unwrap();

    // 1000 * 0.001 + 4000 * 0.0008 = 1.00 + 3.20
    let cost = calculator
        .calculate_cost(UsageMetric::Token, 5000, None)
        .unwrap();
    assert_eq!(cost, "4.20".parse::<Decimal>().unwrap());
}

#[test]
fn volume_pricing_applies_one_rate_to_the_whole_quantity() {
    let (catalog, calculator) = calculator();
    catalog
        .put_tiered_rule(UsageMetric::Token, token_tiers(), TierMode::Volume, None)
        .unwrap();

    let cost = calculator
        .calculate_cost(UsageMetric::Token, 5000, None)
        .unwrap();
    assert_eq!(cost, "4.00".parse::<Decimal>().unwrap());
}

#[test]
fn graduated_cost_is_monotonic_in_quantity() {
    let (catalog, calculator) = calculator();
    catalog
        .put_tiered_rule(UsageMetric::Token, token_tiers(), TierMode::Graduated, None)
        .unwrap();

    let mut previous = Decimal::ZERO;
    for quantity in (0..=20_000i64).step_by(500) {
        let cost = calculator
            .calculate_cost(UsageMetric::Token, quantity, None)
            .unwrap();
        assert!(
            cost >= previous,
            "cost regressed between {} and {quantity}",
            quantity - 500
        );
        previous = cost;
    }
}

#[test]
fn tier_rules_with_gaps_are_rejected() {
    let (catalog, _calculator) = calculator();
    let tiers = vec![
        PricingTier {
            min_quantity: 0,
            max_quantity: Some(100),
            price_per_unit: Decimal::ONE,
        },
        PricingTier {
            min_quantity: 150,
            max_quantity: None,
            price_per_unit: Decimal::ONE,
        },
    ];
    let result = catalog.put_tiered_rule(UsageMetric::Token, tiers, TierMode::Graduated, None);
    assert!(matches!(result, Err(AppError::Validation(_))));
    // the failed insert left the catalog untouched
    assert!(catalog.find_rule(UsageMetric::Token, None).is_none());
}

#[test]
fn tier_rules_with_overlap_are_rejected() {
    let (catalog, _calculator) = calculator();
    let tiers = vec![
        PricingTier {
            min_quantity: 0,
            max_quantity: Some(100),
            price_per_unit: Decimal::ONE,
        },
        PricingTier {
            min_quantity: 50,
            max_quantity: None,
            price_per_unit: Decimal::ONE,
        },
    ];
    let result = catalog.put_tiered_rule(UsageMetric::Token, tiers, TierMode::Graduated, None);
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[test]
fn missing_rule_is_a_configuration_error_not_a_zero_charge() {
    let (_catalog, calculator) = calculator();
    let result = calculator.calculate_cost(UsageMetric::Bandwidth, 10, None);
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
fn rule_replacement_is_last_write_wins() {
    let (catalog, calculator) = calculator();
    catalog
        .put_per_unit_rule(UsageMetric::ApiCall, "0.01".parse().unwrap(), None)
        .unwrap();
    catalog
        .put_per_unit_rule(UsageMetric::ApiCall, "0.02".parse().unwrap(), None)
        .unwrap();

    let cost = calculator
        .calculate_cost(UsageMetric::ApiCall, 100, None)
        .unwrap();
    assert_eq!(cost, "2.00".parse::<Decimal>().unwrap());
    assert_eq!(catalog.list_rules().len(), 1);
}

#[test]
fn categorized_rules_win_over_the_uncategorized_fallback() {
    let (catalog, calculator) = calculator();
    catalog
        .put_per_unit_rule(UsageMetric::ApiCall, "0.01".parse().unwrap(), None)
        .unwrap();
    catalog
        .put_per_unit_rule(
            UsageMetric::ApiCall,
            "0.05".parse().unwrap(),
            Some("premium".to_string()),
        )
        .unwrap();

    let premium = calculator
        .calculate_cost(UsageMetric::ApiCall, 10, Some("premium"))
        .unwrap();
    assert_eq!(premium, "0.50".parse::<Decimal>().unwrap());

    // unknown categories fall back to the uncategorized rule
    let other = calculator
        .calculate_cost(UsageMetric::ApiCall, 10, Some("basic"))
        .unwrap();
    assert_eq!(other, "0.10".parse::<Decimal>().unwrap());
}

#[test]
fn invoice_for_usage_builds_a_draft_with_priced_metrics_only() {
    let (catalog, calculator) = calculator();
    catalog
        .put_per_unit_rule(UsageMetric::ApiCall, "0.01".parse().unwrap(), None)
        .unwrap();

    let mut by_metric = BTreeMap::new();
    by_metric.insert(UsageMetric::ApiCall, 100);
    by_metric.insert(UsageMetric::Token, 50);
    let summary = UsageSummary {
        customer_id: "cust-1".to_string(),
        total_quantity: 150,
        record_count: 2,
        by_metric,
    };

    let invoice = calculator
        .invoice_for_usage("cust-1", &summary, "usd")
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.items.len(), 1, "the unpriced token metric is skipped");
    assert_eq!(invoice.total(), "1.00".parse::<Decimal>().unwrap());
}
