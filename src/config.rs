//! Configuration loaded from environment variables.
//!
//! Durations accept either a bare integer (interpreted as seconds) or a string
//! with units (`"30s"`, `"2m"`), via the same flexible deserializer the rest of
//! this crate's ancestry uses.

use figment::Figment;
use figment::providers::Env;
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_db_host")]
    pub db_host: String,
    #[serde(default = "default_db_port")]
    pub db_port: u16,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default = "default_db_user")]
    pub db_user: String,
    #[serde(default = "default_db_password")]
    pub db_password: String,

    #[serde(default = "default_task_timeout", deserialize_with = "deserialize_duration")]
    pub task_timeout: Duration,
    #[serde(default = "default_proxy_timeout", deserialize_with = "deserialize_duration")]
    pub proxy_timeout: Duration,
    #[serde(default = "default_worker_timeout", deserialize_with = "deserialize_duration")]
    pub worker_timeout: Duration,
    #[serde(default = "default_heartbeat_interval", deserialize_with = "deserialize_duration")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_cleanup_interval", deserialize_with = "deserialize_duration")]
    pub cleanup_interval: Duration,
    #[serde(default = "default_db_connect_timeout", deserialize_with = "deserialize_duration")]
    pub db_connect_timeout: Duration,

    #[serde(default = "default_db_retry_attempts")]
    pub db_retry_attempts: u32,
    #[serde(default = "default_retry_delay", deserialize_with = "deserialize_duration")]
    pub retry_delay: Duration,

    #[serde(default = "default_max_task_attempts")]
    pub max_task_attempts: i32,
    #[serde(default = "default_workers_count")]
    pub workers_count: u32,
    #[serde(default = "default_program_id")]
    pub program_id: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_host() -> String {
    "localhost".to_string()
}
fn default_db_port() -> u16 {
    5432
}
fn default_db_name() -> String {
    "crawl_fleet".to_string()
}
fn default_db_user() -> String {
    "postgres".to_string()
}
fn default_db_password() -> String {
    "postgres".to_string()
}
fn default_task_timeout() -> Duration {
    Duration::from_secs(600)
}
fn default_proxy_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_worker_timeout() -> Duration {
    Duration::from_secs(240)
}
fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}
fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}
fn default_db_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_db_retry_attempts() -> u32 {
    5
}
fn default_retry_delay() -> Duration {
    Duration::from_secs(10)
}
fn default_max_task_attempts() -> i32 {
    5
}
fn default_workers_count() -> u32 {
    15
}
fn default_program_id() -> String {
    "crawl-fleet".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

const DURATION_PARSER: DurationParser<'static> = DurationParser::builder()
    .time_units(&[TimeUnit::Second, TimeUnit::MilliSecond, TimeUnit::Minute, TimeUnit::Hour])
    .parse_multiple(None)
    .allow_time_unit_delimiter()
    .disable_infinity()
    .disable_fraction()
    .disable_exponent()
    .default_unit(TimeUnit::Second)
    .build();

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration string or number of seconds")
        }

        fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            DURATION_PARSER
                .parse(value)
                .map_err(|e| serde::de::Error::custom(format!("invalid duration '{value}': {e}")))?
                .try_into()
                .map_err(|e| serde::de::Error::custom(format!("duration conversion error: {e}")))
        }

        fn visit_u64<E>(self, value: u64) -> std::result::Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> std::result::Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(serde::de::Error::custom("duration cannot be negative"));
            }
            Ok(Duration::from_secs(value as u64))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

impl Config {
    pub fn load() -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Env::raw())
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Enforces WORKER_TIMEOUT <= PROXY_TIMEOUT <= TASK_TIMEOUT.
    fn validate(&self) -> Result<()> {
        if !(self.worker_timeout <= self.proxy_timeout && self.proxy_timeout <= self.task_timeout) {
            return Err(Error::Config(format!(
                "timeout ordering violated: worker_timeout ({:?}) <= proxy_timeout ({:?}) <= task_timeout ({:?}) must hold",
                self.worker_timeout, self.proxy_timeout, self.task_timeout
            )));
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_ordering() {
        let mut cfg = Config {
            db_host: default_db_host(),
            db_port: default_db_port(),
            db_name: default_db_name(),
            db_user: default_db_user(),
            db_password: default_db_password(),
            task_timeout: Duration::from_secs(10),
            proxy_timeout: Duration::from_secs(300),
            worker_timeout: Duration::from_secs(240),
            heartbeat_interval: default_heartbeat_interval(),
            cleanup_interval: default_cleanup_interval(),
            db_connect_timeout: default_db_connect_timeout(),
            db_retry_attempts: default_db_retry_attempts(),
            retry_delay: default_retry_delay(),
            max_task_attempts: default_max_task_attempts(),
            workers_count: default_workers_count(),
            program_id: default_program_id(),
            log_level: default_log_level(),
        };
        assert!(cfg.validate().is_err());
        cfg.task_timeout = Duration::from_secs(600);
        assert!(cfg.validate().is_ok());
    }
}
