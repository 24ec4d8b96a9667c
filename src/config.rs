use once_cell::sync::Lazy;
use rust_decimal::Decimal;

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

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> =
    Lazy::new(|| read_bool_env("ALLOW_MIGRATION_FAILURE", false));

/// key: billing-config -> plan-gate enforcement toggle
///
/// When disabled, every plan gate passes and cost-limit checks never trip.
/// Intended for staging environments; production leaves this on.
pub static BILLING_ENFORCEMENT: Lazy<bool> = Lazy::new(|| read_bool_env("BILLING_ENFORCEMENT", true));

fn read_bool_env(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| truthy(&value))
        .unwrap_or(default)
}

fn truthy(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes")
}

pub(crate) fn read_decimal_env(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<Decimal>().ok())
        .unwrap_or(default)
}
