use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use finsight_warehouse::{resolve_finsight_home, WarehouseConfig};
use tracing::warn;

use crate::cache::CacheTtls;
use crate::Symbol;

/// Process configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct FinsightConfig {
    /// Root for the database file and model artifacts.
    pub home: PathBuf,
    pub bind: String,
    pub port: u16,
    pub ttls: CacheTtls,
    /// Maximum distance for a sentiment match; `None` is unbounded.
    pub align_tolerance: Option<time::Duration>,
    /// Look-back window for price ingestion.
    pub price_period_days: u32,
    pub sim_symbols: Vec<Symbol>,
    pub sim_interval: Duration,
    pub sim_degraded_after: u32,
    pub news_api_key: Option<String>,
    /// Use the deterministic synthetic source instead of network adapters.
    pub offline: bool,
}

impl FinsightConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let home = vars
            .string("FINSIGHT_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(resolve_finsight_home);

        let ttls = CacheTtls {
            train: Duration::from_secs(vars.u64_or("FINSIGHT_TTL_TRAIN_SECS", 3600)),
            data_read: Duration::from_secs(vars.u64_or("FINSIGHT_TTL_DATA_SECS", 600)),
            predict: Duration::from_secs(vars.u64_or("FINSIGHT_TTL_PREDICT_SECS", 300)),
        };
        if !ttls.is_ordered() {
            warn!(
                train = ttls.train.as_secs(),
                data = ttls.data_read.as_secs(),
                predict = ttls.predict.as_secs(),
                "cache TTLs are expected to satisfy train > data > predict"
            );
        }

        let align_tolerance = vars
            .u64("FINSIGHT_ALIGN_TOLERANCE_SECS")
            .map(|secs| time::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));

        let sim_symbols = vars
            .string("FINSIGHT_SIM_SYMBOLS")
            .unwrap_or_else(|| String::from("AAPL"))
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .filter_map(|raw| match Symbol::parse(raw) {
                Ok(symbol) => Some(symbol),
                Err(error) => {
                    warn!(raw, %error, "ignoring invalid simulator symbol");
                    None
                }
            })
            .collect();

        Self {
            home,
            bind: vars.string("FINSIGHT_BIND").unwrap_or_else(|| String::from("127.0.0.1")),
            port: vars
                .u64("FINSIGHT_PORT")
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or(5000),
            ttls,
            align_tolerance,
            price_period_days: vars
                .u64("FINSIGHT_PRICE_PERIOD_DAYS")
                .and_then(|days| u32::try_from(days).ok())
                .unwrap_or(100),
            sim_symbols,
            sim_interval: Duration::from_millis(vars.u64_or("FINSIGHT_SIM_INTERVAL_MS", 5000)),
            sim_degraded_after: vars
                .u64("FINSIGHT_SIM_DEGRADED_AFTER")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(3),
            news_api_key: vars.string("NEWS_API_KEY"),
            offline: vars.bool_or("FINSIGHT_OFFLINE", false),
        }
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        WarehouseConfig::in_home(&self.home)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.home.join("models")
    }

    /// Socket address to bind, falling back to loopback for an unparsable host.
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], self.port)))
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn u64(&self, name: &str) -> Option<u64> {
        let raw = self.string(name)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(name, %raw, "ignoring non-numeric value");
                None
            }
        }
    }

    fn u64_or(&self, name: &str, default: u64) -> u64 {
        self.u64(name).unwrap_or(default)
    }

    fn bool_or(&self, name: &str, default: bool) -> bool {
        self.string(name)
            .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(default)
    }
}
