use std::env;
use std::time::Duration;

use chrono::NaiveTime;
use tracing::warn;

use crate::error::ConfigError;
use crate::schedule::{SchedulePolicy, SessionWindow};

const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
const DEFAULT_INSTRUMENTS: &str = "nq,btc";
const DEFAULT_LOOKBACK: usize = 100;
const DEFAULT_WEEKDAY_LIMIT: u32 = 5;
const DEFAULT_SESSION_START: &str = "07:00";
const DEFAULT_SESSION_END: &str = "20:00";

/// Timing shared by every engine in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub cadence: Duration,
    /// Wait after a failed reconnect. Longer than `cadence`.
    pub reconnect_delay: Duration,
    /// Upper bound for one connect attempt or one market data request.
    pub io_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(300),
            io_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    Neutral,
    EmaTrend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentConfig {
    pub key: String,
    pub symbol: String,
    pub model_version: String,
    pub schedule: SchedulePolicy,
    pub regime_aware: bool,
    pub classifier: ClassifierKind,
    pub lookback: usize,
    /// Name of the environment variable holding the market data key.
    pub api_key_var: String,
    pub api_key: Option<String>,
}

struct Preset {
    symbol: &'static str,
    model_version: &'static str,
    always_open: bool,
    regime_aware: bool,
    api_key_var: &'static str,
}

fn preset(key: &str) -> Option<Preset> {
    match key {
        "nq" => Some(Preset {
            symbol: "I:NDX",
            model_version: "nq_v1.0",
            always_open: false,
            regime_aware: false,
            api_key_var: "POLYGON_API_KEY",
        }),
        "btc" => Some(Preset {
            symbol: "X:BTCUSD",
            model_version: "btc_v1.1",
            always_open: true,
            regime_aware: true,
            api_key_var: "POLYGON_CRYPTO_API_KEY",
        }),
        _ => None,
    }
}

/// Everything read from the process environment at startup.
///
/// Secrets are optional here: a missing key or database URL only leaves the
/// matching connection Disconnected once the engine runs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub polygon_base_url: String,
    pub settings: EngineSettings,
    pub instruments: Vec<InstrumentConfig>,
    /// Instruments that could not be configured, with the reason.
    pub rejected: Vec<(String, ConfigError)>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let settings = EngineSettings {
            cadence: secs_or_default(&get, "ENGINE_CADENCE_SECS", EngineSettings::default().cadence),
            reconnect_delay: secs_or_default(
                &get,
                "ENGINE_RECONNECT_DELAY_SECS",
                EngineSettings::default().reconnect_delay,
            ),
            io_timeout: secs_or_default(
                &get,
                "ENGINE_IO_TIMEOUT_SECS",
                EngineSettings::default().io_timeout,
            ),
        };

        let keys = get("INSTRUMENTS").unwrap_or_else(|| DEFAULT_INSTRUMENTS.to_string());
        let mut instruments = Vec::new();
        let mut rejected = Vec::new();
        for key in keys
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
        {
            if instruments.iter().any(|i: &InstrumentConfig| i.key == key) {
                warn!("Instrument {} listed twice, ignoring the duplicate", key);
                continue;
            }
            match instrument_from_lookup(&key, &get) {
                Ok(instrument) => instruments.push(instrument),
                Err(e) => rejected.push((key, e)),
            }
        }

        Self {
            database_url: get("DATABASE_URL"),
            polygon_base_url: get("POLYGON_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            settings,
            instruments,
            rejected,
        }
    }
}

fn instrument_from_lookup<F>(key: &str, get: &F) -> Result<InstrumentConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = key.to_uppercase();
    let var = |suffix: &str| format!("{}_{}", prefix, suffix);
    let preset = preset(key);

    let symbol = match (get(&var("SYMBOL")), &preset) {
        (Some(symbol), _) => symbol,
        (None, Some(p)) => p.symbol.to_string(),
        (None, None) => return Err(ConfigError::Missing(var("SYMBOL"))),
    };
    let model_version = get(&var("MODEL_VERSION"))
        .or_else(|| preset.as_ref().map(|p| p.model_version.to_string()))
        .unwrap_or_else(|| format!("{}_v1.0", key));

    let always_open = parse_bool(get, &var("ALWAYS_OPEN"))?
        .unwrap_or(preset.as_ref().is_some_and(|p| p.always_open));
    let schedule = if always_open {
        SchedulePolicy::AlwaysOpen
    } else {
        let limit_var = var("WEEKDAY_LIMIT");
        let weekday_limit = match get(&limit_var) {
            Some(raw) => raw.parse::<u32>().map_err(|e| invalid(&limit_var, &raw, e))?,
            None => DEFAULT_WEEKDAY_LIMIT,
        };
        let start = parse_time(get, &var("SESSION_START"), DEFAULT_SESSION_START)?;
        let end = parse_time(get, &var("SESSION_END"), DEFAULT_SESSION_END)?;
        let window = SessionWindow::new(weekday_limit, start, end).map_err(|e| ConfigError::Invalid {
            var: format!("{}/{}", var("SESSION_START"), var("SESSION_END")),
            value: format!("{} {}..{}", weekday_limit, start, end),
            reason: e.to_string(),
        })?;
        SchedulePolicy::Session(window)
    };

    let regime_aware = parse_bool(get, &var("REGIME_AWARE"))?
        .unwrap_or(preset.as_ref().is_some_and(|p| p.regime_aware));

    let classifier_var = var("REGIME_CLASSIFIER");
    let classifier = match get(&classifier_var).map(|v| v.to_lowercase()).as_deref() {
        None | Some("neutral") => ClassifierKind::Neutral,
        Some("ema") => ClassifierKind::EmaTrend,
        Some(other) => {
            return Err(ConfigError::Invalid {
                var: classifier_var,
                value: other.to_string(),
                reason: "expected `neutral` or `ema`".to_string(),
            });
        }
    };

    let lookback_var = var("LOOKBACK");
    let lookback = match get(&lookback_var) {
        Some(raw) => match raw.parse::<usize>() {
            Ok(0) => return Err(invalid(&lookback_var, &raw, "must be at least 1")),
            Ok(n) => n,
            Err(e) => return Err(invalid(&lookback_var, &raw, e)),
        },
        None => DEFAULT_LOOKBACK,
    };

    let api_key_var = get(&var("API_KEY_VAR"))
        .or_else(|| preset.as_ref().map(|p| p.api_key_var.to_string()))
        .unwrap_or_else(|| "POLYGON_API_KEY".to_string());
    let api_key = get(&api_key_var).or_else(|| {
        // The crypto key is optional when one key covers every market.
        if api_key_var != "POLYGON_API_KEY" {
            get("POLYGON_API_KEY")
        } else {
            None
        }
    });

    Ok(InstrumentConfig {
        key: key.to_string(),
        symbol,
        model_version,
        schedule,
        regime_aware,
        classifier,
        lookback,
        api_key_var,
        api_key,
    })
}

fn invalid(var: &str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var: var.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool<F>(get: &F, var: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(None),
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(invalid(var, &raw, "expected a boolean")),
        },
    }
}

fn parse_time<F>(get: &F, var: &str, default: &str) -> Result<NaiveTime, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = get(var).unwrap_or_else(|| default.to_string());
    NaiveTime::parse_from_str(&raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
        .map_err(|e| invalid(var, &raw, e))
}

fn secs_or_default<F>(get: &F, var: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                warn!("{}={:?} is not a positive number of seconds, using {:?}", var, raw, default);
                default
            }
        },
    }
}
