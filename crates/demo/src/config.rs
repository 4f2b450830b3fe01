use std::time::Duration;

use warehouse_core::channels::{CHANNEL_EMAIL, CHANNEL_LOG, CHANNEL_WEBHOOK};
use warehouse_core::error::CoreError;
use warehouse_pipeline::{JoinPolicy, OrchestratorSettings};

/// Demo configuration loaded from environment variables.
///
/// | Env Var                     | Default           |
/// |-----------------------------|-------------------|
/// | `DATABASE_URL`              | unset (in-memory) |
/// | `DEMO_TIME_UNIT_MS`         | `1000`            |
/// | `WORKER_LATENCY_UNITS`      | `30`              |
/// | `AWAIT_TIMEOUT_SECS`        | `300` (`0` = none)|
/// | `JOIN_POLICY`               | `fail-fast`       |
/// | `ALERT_CHANNEL`             | `log`             |
/// | `ALERT_RECIPIENTS`          | `ops@example.com` |
/// | `ALERT_WEBHOOK_URL`         | unset             |
/// | `SALES_ALERT_INTERVAL_SECS` | `60`              |
/// | `SCHEDULER_TICK_MS`         | `1000`            |
/// | `LOG_FORMAT`                | `text` (`json`)   |
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub database_url: Option<String>,
    /// `DEMO_TIME_UNIT_MS` * `WORKER_LATENCY_UNITS`.
    pub worker_latency: Duration,
    pub await_timeout: Option<Duration>,
    pub join_policy: JoinPolicy,
    pub alert_channel: String,
    pub alert_recipients: Vec<String>,
    pub webhook_url: Option<String>,
    pub sales_alert_interval: Duration,
    pub scheduler_tick: Duration,
    pub json_logs: bool,
}

impl DemoConfig {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let time_unit = Duration::from_millis(parse_or(&var, "DEMO_TIME_UNIT_MS", 1000)?);
        let worker_latency = time_unit
            .checked_mul(parse_or(&var, "WORKER_LATENCY_UNITS", 30)?)
            .ok_or_else(|| {
                CoreError::Config(
                    "DEMO_TIME_UNIT_MS * WORKER_LATENCY_UNITS overflows a duration".into(),
                )
            })?;
        let await_timeout = match parse_or(&var, "AWAIT_TIMEOUT_SECS", 300)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let join_policy = match var("JOIN_POLICY") {
            Some(raw) => raw.parse()?,
            None => JoinPolicy::default(),
        };

        let alert_channel = var("ALERT_CHANNEL")
            .map(|c| c.trim().to_ascii_lowercase())
            .unwrap_or_else(|| CHANNEL_LOG.to_string());
        if ![CHANNEL_LOG, CHANNEL_EMAIL, CHANNEL_WEBHOOK].contains(&alert_channel.as_str()) {
            return Err(CoreError::Config(format!(
                "ALERT_CHANNEL must be one of log, email, webhook (got '{alert_channel}')"
            )));
        }
        let webhook_url = var("ALERT_WEBHOOK_URL");
        if alert_channel == CHANNEL_WEBHOOK && webhook_url.is_none() {
            return Err(CoreError::Config(
                "ALERT_WEBHOOK_URL must be set when ALERT_CHANNEL is webhook".into(),
            ));
        }

        let alert_recipients: Vec<String> = var("ALERT_RECIPIENTS")
            .unwrap_or_else(|| "ops@example.com".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let sales_alert_interval =
            Duration::from_secs(parse_or(&var, "SALES_ALERT_INTERVAL_SECS", 60)?);
        if sales_alert_interval.is_zero() {
            return Err(CoreError::Config(
                "SALES_ALERT_INTERVAL_SECS must be greater than zero".into(),
            ));
        }
        let scheduler_tick = Duration::from_millis(parse_or(&var, "SCHEDULER_TICK_MS", 1000)?);
        if scheduler_tick.is_zero() {
            return Err(CoreError::Config(
                "SCHEDULER_TICK_MS must be greater than zero".into(),
            ));
        }

        let json_logs = match var("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(CoreError::Config(format!(
                    "LOG_FORMAT must be text or json (got '{other}')"
                )))
            }
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            worker_latency,
            await_timeout,
            join_policy,
            alert_channel,
            alert_recipients,
            webhook_url,
            sales_alert_interval,
            scheduler_tick,
            json_logs,
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            worker_latency: self.worker_latency,
            await_timeout: self.await_timeout,
            join_policy: self.join_policy,
            alert_channel: self.alert_channel.clone(),
            alert_recipients: self.alert_recipients.clone(),
            sales_alert_interval: self.sales_alert_interval,
        }
    }
}

fn parse_or<T>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, CoreError>
where
    T: std::str::FromStr,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Config(format!("{key} must be a non-negative integer (got '{raw}')"))),
    }
}
