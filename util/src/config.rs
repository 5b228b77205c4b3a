//! App-wide configuration, loaded once from the process environment.
//!
//! Unlike the bare per-field getters this supersedes, the core reads policy
//! knobs repeatedly from the analyzer and janitor background loops, so this
//! is a `OnceCell`-backed snapshot rather than an env lookup on every call.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

static CONFIG: OnceCell<AppConfig> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,

    /// How long a provisional attendance has to be confirmed.
    pub confirmation_window: Duration,
    /// How long a confirmed/cancelled record is retained before it is pruned.
    pub class_duration: Duration,
    /// How long after confirmation a repeat check-in is suppressed.
    pub cooldown_window: Duration,
    /// Tick period for the correlation analyzer background job.
    pub analyzer_interval: Duration,
    /// Tick period for the expiry/pruning janitor background job.
    pub janitor_interval: Duration,
    /// How long a stored idempotency key is kept before pruning.
    pub idempotency_retention: Duration,

    /// Device-signature HMAC salts, keyed by salt version.
    pub device_salts: HashMap<u16, String>,
    pub current_device_salt_version: u16,
}

fn require(key: &'static str) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => panic!("{key} is required"),
    }
}

fn require_parse<T: FromStr>(key: &'static str) -> T
where
    T::Err: std::fmt::Display,
{
    require(key)
        .parse()
        .unwrap_or_else(|e| panic!("invalid {key}: {e}"))
}

fn parse_bool(key: &'static str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => panic!("invalid {key}: expected boolean, got {other:?}"),
        },
        Err(_) => default,
    }
}

/// Parses `DEVICE_SALTS` as `version:salt,version:salt,...`.
fn parse_device_salts(raw: &str) -> HashMap<u16, String> {
    let mut salts = HashMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (version, salt) = entry
            .split_once(':')
            .unwrap_or_else(|| panic!("invalid DEVICE_SALTS entry: {entry:?}"));
        let version: u16 = version
            .parse()
            .unwrap_or_else(|e| panic!("invalid DEVICE_SALTS version {version:?}: {e}"));
        salts.insert(version, salt.to_owned());
    }
    salts
}

impl AppConfig {
    pub fn init() -> &'static Self {
        let _ = dotenvy::dotenv();

        CONFIG.get_or_init(|| {
            let device_salts = parse_device_salts(&require("DEVICE_SALTS"));
            let current_device_salt_version: u16 = require_parse("CURRENT_DEVICE_SALT_VERSION");
            assert!(
                device_salts.contains_key(&current_device_salt_version),
                "CURRENT_DEVICE_SALT_VERSION has no matching entry in DEVICE_SALTS"
            );

            AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
                port: require_parse("PORT"),
                database_url: require("DATABASE_URL"),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
                log_file: env::var("LOG_FILE").unwrap_or_else(|_| "logs/api.log".into()),
                log_to_stdout: parse_bool("LOG_TO_STDOUT", true),

                confirmation_window: Duration::from_secs(require_parse::<u64>(
                    "CONFIRMATION_WINDOW_SECONDS",
                )),
                class_duration: Duration::from_secs(require_parse::<u64>(
                    "CLASS_DURATION_SECONDS",
                )),
                cooldown_window: Duration::from_secs(require_parse::<u64>(
                    "COOLDOWN_WINDOW_SECONDS",
                )),
                analyzer_interval: Duration::from_secs(require_parse::<u64>(
                    "ANALYZER_INTERVAL_SECONDS",
                )),
                janitor_interval: Duration::from_secs(require_parse::<u64>(
                    "JANITOR_INTERVAL_SECONDS",
                )),
                idempotency_retention: Duration::from_secs(require_parse::<u64>(
                    "IDEMPOTENCY_RETENTION_SECONDS",
                )),

                device_salts,
                current_device_salt_version,
            }
        })
    }

    pub fn get() -> &'static Self {
        CONFIG.get().expect("AppConfig not initialized; call AppConfig::init() first")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_salt_versions() {
        let salts = parse_device_salts("1:abc,2:def");
        assert_eq!(salts.get(&1).map(String::as_str), Some("abc"));
        assert_eq!(salts.get(&2).map(String::as_str), Some("def"));
    }

    #[test]
    fn ignores_blank_entries() {
        let salts = parse_device_salts("1:abc,,2:def,");
        assert_eq!(salts.len(), 2);
    }

    #[test]
    #[should_panic(expected = "invalid DEVICE_SALTS entry")]
    fn panics_on_malformed_entry() {
        parse_device_salts("not-a-pair");
    }
}
