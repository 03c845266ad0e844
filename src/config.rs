use once_cell::sync::Lazy;
use rust_decimal::Decimal;

use crate::billing::processors::ProcessorKind;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// key: storage-config -> root directory for JSON documents
pub static STORAGE_ROOT: Lazy<String> =
    Lazy::new(|| std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "storage".to_string()));

/// key: billing-config -> renewal scan cadence
pub static RENEWAL_SCAN_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("RENEWAL_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(300)
});

/// key: billing-config -> grace window before suspension/downgrade
pub static PAST_DUE_GRACE_DAYS: Lazy<i64> = Lazy::new(|| {
    std::env::var("PAST_DUE_GRACE_DAYS")
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value >= 0)
        .unwrap_or(3)
});

/// key: billing-config -> optional fallback plan code for automatic downgrades
pub static FALLBACK_PLAN_CODE: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("FALLBACK_PLAN_CODE"));

/// Currency applied when a request does not name one. Defaults to `usd`.
pub static DEFAULT_CURRENCY: Lazy<String> = Lazy::new(|| {
    std::env::var("DEFAULT_CURRENCY")
        .ok()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "usd".to_string())
});

/// Per-period growth rate applied by the revenue forecast. Defaults to `0.02`.
pub static REVENUE_FORECAST_GROWTH_RATE: Lazy<Decimal> = Lazy::new(|| {
    std::env::var("REVENUE_FORECAST_GROWTH_RATE")
        .ok()
        .and_then(|value| value.trim().parse::<Decimal>().ok())
        .filter(|value| *value >= Decimal::ZERO)
        .unwrap_or_else(|| Decimal::new(2, 2))
});

fn parse_payment_processor() -> ProcessorKind {
    match std::env::var("PAYMENT_PROCESSOR") {
        Ok(raw) => {
            let normalized = raw.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "" | "mock" => ProcessorKind::Mock,
                "stripe" | "stripe-like" => ProcessorKind::StripeLike,
                other => panic!(
                    "unsupported PAYMENT_PROCESSOR value '{other}'; expected 'mock' or 'stripe'"
                ),
            }
        }
        Err(_) => ProcessorKind::Mock,
    }
}

/// key: billing-config -> payment processor variant resolved at startup
pub static PAYMENT_PROCESSOR: Lazy<ProcessorKind> = Lazy::new(parse_payment_processor);

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
