//! Environment configuration for the sync service.
//!
//! Every setting is read from its environment variable and may be
//! overridden by the matching long flag. Configuration errors are the only
//! fatal startup condition: everything else is recovered at the layer that
//! produces it.

use crate::sync::{DEFAULT_SYNC_CONCURRENCY, SyncSettings};
use crate::telemetry::LogFormat;
use camino::Utf8PathBuf;
use clap::builder::{BoolishValueParser, RangedU64ValueParser};
use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for every millisecond setting (one day).
pub const MAX_DURATION_MS: u64 = 86_400_000;

/// Upper bound for `SYNC_CONCURRENCY`.
pub const MAX_SYNC_CONCURRENCY: u64 = 1_024;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable or flag is missing or holds an unusable value.
    #[error(transparent)]
    Arguments(#[from] clap::Error),

    /// Signature verification is required but no key was supplied.
    #[error("SIGNATURE_KEY (or CONNECTORS_SIGNATURE_KEY) is required when SIGNATURE_REQUIRED=true")]
    MissingSignatureKey,
}

#[derive(Parser)]
#[command(
    name = "switchyard",
    version,
    about = "Synchronises connector manifests into a shared tool registry"
)]
struct SyncArgs {
    /// Manifest URL (http or https).
    #[arg(long, env = "SERVICE_MAP_URL", value_parser = parse_service_map_url)]
    service_map_url: String,

    /// HMAC key used to verify the manifest signature.
    #[arg(long, env = "SIGNATURE_KEY", hide_env_values = true)]
    signature_key: Option<String>,

    #[arg(long, env = "CONNECTORS_SIGNATURE_KEY", hide = true, hide_env_values = true)]
    connectors_signature_key: Option<String>,

    /// Refuse to start without a signature key.
    #[arg(
        long,
        env = "SIGNATURE_REQUIRED",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        value_name = "BOOL"
    )]
    signature_required: bool,

    /// Run one pass before starting the scheduler.
    #[arg(
        long,
        env = "REFRESH_SYNC",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        value_name = "BOOL"
    )]
    refresh_sync: bool,

    /// Base scheduler interval in milliseconds.
    #[arg(
        long,
        env = "REFRESH_INTERVAL_MS",
        default_value_t = 300_000,
        value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_MS)
    )]
    refresh_interval_ms: u64,

    /// Scheduler jitter factor in `[0, 1)`.
    #[arg(long, env = "REFRESH_JITTER", default_value_t = 0.1, value_parser = parse_jitter)]
    refresh_jitter: f64,

    /// Maximum connectors reconciled at once.
    #[arg(
        long,
        env = "SYNC_CONCURRENCY",
        default_value_t = DEFAULT_SYNC_CONCURRENCY,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=MAX_SYNC_CONCURRENCY)
    )]
    sync_concurrency: usize,

    /// Manifest fetch and connector connect timeout in milliseconds.
    #[arg(
        long,
        env = "FETCH_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_MS)
    )]
    fetch_timeout_ms: u64,

    /// Keep-alive connections per host in the shared pool.
    #[arg(long, env = "HTTP_POOL_SIZE", default_value_t = 10)]
    http_pool_size: usize,

    /// Persisted registry file.
    #[arg(long, env = "REGISTRY_PATH", default_value = "servers.json")]
    registry_path: Utf8PathBuf,

    /// Debounced registry flush period in milliseconds.
    #[arg(
        long,
        env = "FLUSH_INTERVAL_MS",
        default_value_t = 5_000,
        value_parser = clap::value_parser!(u64).range(1..=MAX_DURATION_MS)
    )]
    flush_interval_ms: u64,

    /// Consecutive failures before escalated logging.
    #[arg(long, env = "FAILURE_THRESHOLD", default_value_t = 3)]
    failure_threshold: u32,

    /// Milliseconds a degraded connector keeps its tools.
    #[arg(
        long,
        env = "DEGRADED_GRACE_MS",
        default_value_t = 60_000,
        value_parser = clap::value_parser!(u64).range(..=MAX_DURATION_MS)
    )]
    degraded_grace_ms: u64,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, ignore_case = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn parse_service_map_url(raw: &str) -> Result<String, String> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Ok(raw.to_owned())
    } else {
        Err("must be an http or https URL".to_owned())
    }
}

fn parse_jitter(raw: &str) -> Result<f64, String> {
    let jitter: f64 = raw.parse().map_err(|err| format!("'{raw}': {err}"))?;
    if (0.0..1.0).contains(&jitter) {
        Ok(jitter)
    } else {
        Err(format!("{jitter} is outside [0, 1)"))
    }
}

/// Fully resolved service configuration.
#[derive(Clone, PartialEq)]
pub struct SyncConfig {
    /// Manifest URL.
    pub service_map_url: String,
    /// HMAC key for manifest verification, if configured.
    pub signature_key: Option<Vec<u8>>,
    /// Whether a missing key is fatal.
    pub signature_required: bool,
    /// Run the first pass before starting the scheduler.
    pub refresh_sync: bool,
    /// Base scheduler interval.
    pub refresh_interval: Duration,
    /// Scheduler jitter factor in `[0, 1)`.
    pub refresh_jitter: f64,
    /// Bounded fan-out limit.
    pub sync_concurrency: usize,
    /// Shared manifest fetch and connector connect timeout.
    pub fetch_timeout: Duration,
    /// Keep-alive connections per host in the shared pool.
    pub http_pool_size: usize,
    /// Persisted registry file.
    pub registry_path: Utf8PathBuf,
    /// Debounced flush period.
    pub flush_interval: Duration,
    /// Consecutive failures before escalated logging.
    pub failure_threshold: u32,
    /// Time a degraded connector keeps its tools.
    pub degraded_grace: Duration,
    /// Log output format.
    pub log_format: LogFormat,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("service_map_url", &self.service_map_url)
            .field("signature_key", &self.signature_key.as_ref().map(|_| "<redacted>"))
            .field("signature_required", &self.signature_required)
            .field("refresh_sync", &self.refresh_sync)
            .field("refresh_interval", &self.refresh_interval)
            .field("refresh_jitter", &self.refresh_jitter)
            .field("sync_concurrency", &self.sync_concurrency)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("http_pool_size", &self.http_pool_size)
            .field("registry_path", &self.registry_path)
            .field("flush_interval", &self.flush_interval)
            .field("failure_threshold", &self.failure_threshold)
            .field("degraded_grace", &self.degraded_grace)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl SyncConfig {
    /// Reads configuration from the process environment alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing or invalid variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_args(["switchyard"])
    }

    /// Reads configuration from command-line `args`, falling back to the
    /// environment for anything not given as a flag.
    ///
    /// The first item is the program name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing or invalid values. Help and
    /// version requests also surface as [`ConfigError::Arguments`].
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::resolve(SyncArgs::try_parse_from(args)?)
    }

    fn resolve(args: SyncArgs) -> Result<Self, ConfigError> {
        let signature_key = args
            .signature_key
            .or(args.connectors_signature_key)
            .filter(|key| !key.trim().is_empty())
            .map(String::into_bytes);
        if args.signature_required && signature_key.is_none() {
            return Err(ConfigError::MissingSignatureKey);
        }

        Ok(Self {
            service_map_url: args.service_map_url,
            signature_key,
            signature_required: args.signature_required,
            refresh_sync: args.refresh_sync,
            refresh_interval: Duration::from_millis(args.refresh_interval_ms),
            refresh_jitter: args.refresh_jitter,
            sync_concurrency: args.sync_concurrency,
            fetch_timeout: Duration::from_millis(args.fetch_timeout_ms),
            http_pool_size: args.http_pool_size,
            registry_path: args.registry_path,
            flush_interval: Duration::from_millis(args.flush_interval_ms),
            failure_threshold: args.failure_threshold,
            degraded_grace: Duration::from_millis(args.degraded_grace_ms),
            log_format: args.log_format,
        })
    }

    /// Returns the coordinator settings derived from this configuration.
    #[must_use]
    pub const fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            concurrency: self.sync_concurrency,
            connect_timeout: self.fetch_timeout,
            failure_threshold: self.failure_threshold,
            degraded_grace: self.degraded_grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use rstest::rstest;

    const BASE: [&str; 5] = [
        "switchyard",
        "--service-map-url",
        "https://maps.example/service-map.json",
        "--signature-key",
        "secret",
    ];

    fn config(extra: &[&str]) -> Result<SyncConfig, ConfigError> {
        SyncConfig::from_args(BASE.iter().chain(extra))
    }

    #[test]
    fn defaults_apply_when_unset() {
        let resolved = config(&[]).expect("config should resolve");

        assert!(!resolved.refresh_sync);
        assert_eq!(resolved.refresh_interval, Duration::from_millis(300_000));
        assert_eq!(resolved.sync_concurrency, 4);
        assert_eq!(resolved.fetch_timeout, Duration::from_secs(10));
        assert_eq!(resolved.http_pool_size, 10);
        assert_eq!(resolved.registry_path, Utf8PathBuf::from("servers.json"));
        assert_eq!(resolved.flush_interval, Duration::from_secs(5));
        assert_eq!(resolved.log_format, LogFormat::Text);
        assert_eq!(resolved.signature_key.as_deref(), Some(b"secret".as_slice()));
    }

    #[test]
    fn legacy_key_name_is_accepted() {
        let resolved = SyncConfig::from_args([
            "switchyard",
            "--service-map-url",
            "https://maps.example/service-map.json",
            "--connectors-signature-key",
            "legacy",
        ])
        .expect("config should resolve");
        assert_eq!(resolved.signature_key.as_deref(), Some(b"legacy".as_slice()));
    }

    #[test]
    fn disabling_signatures_allows_a_missing_key() {
        let resolved = SyncConfig::from_args([
            "switchyard",
            "--service-map-url",
            "https://maps.example/map.json",
            "--signature-required=no",
        ])
        .expect("config should resolve");
        assert!(resolved.signature_key.is_none());
    }

    #[rstest]
    #[case("--refresh-sync=maybe", "--refresh-sync")]
    #[case("--sync-concurrency=0", "--sync-concurrency")]
    #[case("--sync-concurrency=-1", "--sync-concurrency")]
    #[case("--refresh-jitter=1.5", "--refresh-jitter")]
    #[case("--refresh-interval-ms=0", "--refresh-interval-ms")]
    #[case("--log-format=xml", "--log-format")]
    #[case("--service-map-url=ftp://maps.example", "--service-map-url")]
    fn invalid_values_name_the_setting(#[case] arg: &str, #[case] flag: &str) {
        let result = config(&[arg]);

        let Err(ConfigError::Arguments(err)) = result else {
            panic!("expected an argument error for {arg}");
        };
        assert!(err.to_string().contains(flag), "{err}");
    }

    #[rstest]
    #[case("--refresh-interval-ms=86400001")]
    #[case("--flush-interval-ms=18446744073709551615")]
    #[case("--fetch-timeout-ms=86400001")]
    #[case("--degraded-grace-ms=18446744073709551615")]
    fn durations_beyond_one_day_are_rejected(#[case] arg: &str) {
        let result = config(&[arg]);

        assert!(matches!(
            result,
            Err(ConfigError::Arguments(err)) if err.kind() == ErrorKind::ValueValidation
        ));
    }

    #[test]
    fn one_day_is_accepted() {
        let resolved =
            config(&["--refresh-interval-ms=86400000"]).expect("config should resolve");
        assert_eq!(resolved.refresh_interval, Duration::from_secs(86_400));
    }

    #[rstest]
    #[case("TRUE", true)]
    #[case("1", true)]
    #[case("Yes", true)]
    #[case("false", false)]
    #[case("0", false)]
    fn booleans_accept_common_spellings(#[case] raw: &str, #[case] expected: bool) {
        let arg = format!("--refresh-sync={raw}");

        let resolved = config(&[arg.as_str()]).expect("config should resolve");

        assert_eq!(resolved.refresh_sync, expected);
    }

    #[test]
    fn log_format_ignores_case() {
        let resolved = config(&["--log-format=JSON"]).expect("config should resolve");
        assert_eq!(resolved.log_format, LogFormat::Json);
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let resolved = config(&[]).expect("config should resolve");
        let rendered = format!("{resolved:?}");
        assert!(!rendered.contains("secret"));
    }
}
