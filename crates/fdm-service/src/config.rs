//! Service configuration read from the environment.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use fdm_ingestion::application::consumer::ConsumerSettings;
use fdm_ingestion::application::poller::BackoffConfig;
use fdm_queue::sqs_queue::SqsSettings;

use crate::error::AppError;

/// Everything the service needs at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Per-statement time limit enforced by Postgres.
    pub statement_timeout: Duration,
    pub sqs: SqsSettings,
    pub consumer: ConsumerSettings,
    pub backoff: BackoffConfig,
    /// Retention applied to every written row. `None` keeps rows forever.
    pub ttl: Option<chrono::Duration>,
}

impl ServiceConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let vars = Vars(&lookup);

        let min_backoff_ms: u64 = vars.parse_or("POLL_MIN_BACKOFF_MS", 5)?;
        let max_backoff_ms: u64 = vars.parse_or("POLL_MAX_BACKOFF_MS", 32_000)?;
        if min_backoff_ms == 0 {
            return Err(AppError::Config(
                "POLL_MIN_BACKOFF_MS must be greater than zero".into(),
            ));
        }
        if min_backoff_ms > max_backoff_ms {
            return Err(AppError::Config(
                "POLL_MIN_BACKOFF_MS must not exceed POLL_MAX_BACKOFF_MS".into(),
            ));
        }
        let jitter: f64 = vars.parse_or("POLL_JITTER", 0.15)?;
        if !(0.0..1.0).contains(&jitter) {
            return Err(AppError::Config("POLL_JITTER must be in [0, 1)".into()));
        }

        let batch_size: i32 = vars.parse_or("SQS_BATCH_SIZE", 10)?;
        if !(1..=10).contains(&batch_size) {
            return Err(AppError::Config("SQS_BATCH_SIZE must be between 1 and 10".into()));
        }

        let ttl = vars
            .parse::<i64>("DATA_GLOBAL_TTL")?
            .map(chrono::Duration::seconds);

        Ok(Self {
            host: vars.get("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: vars.parse_or("PORT", 3000)?,
            database_url: vars.require("DATABASE_URL")?,
            database_max_connections: vars.parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            statement_timeout: Duration::from_millis(
                vars.parse_or("DATABASE_STATEMENT_TIMEOUT_MS", 10_000)?,
            ),
            sqs: SqsSettings {
                queue_url: vars.require("AWS_SQS_QUEUE_URL")?,
                region: vars.get("AWS_REGION").unwrap_or_else(|| "eu-west-2".to_owned()),
                endpoint_url: vars.get("AWS_ENDPOINT_URL"),
                access_key_id: vars.get("AWS_ACCESS_KEY_ID"),
                secret_access_key: vars.get("AWS_SECRET_ACCESS_KEY"),
            },
            consumer: ConsumerSettings {
                batch_size,
                wait_time: Duration::from_secs(vars.parse_or("SQS_WAIT_TIME_SECONDS", 10)?),
            },
            backoff: BackoffConfig {
                min: Duration::from_millis(min_backoff_ms),
                max: Duration::from_millis(max_backoff_ms),
                jitter,
            },
            ttl,
        })
    }

    /// The address the HTTP server listens on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST` and `PORT` do not form a socket
    /// address.
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    /// A set, non-blank variable.
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn require(&self, name: &str) -> Result<String, AppError> {
        self.get(name)
            .ok_or_else(|| AppError::Config(format!("{name} environment variable must be set")))
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>, AppError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(name)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map_err(|e| AppError::Config(format!("{name} is invalid: {e}")))
            })
            .transpose()
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse(name)?.unwrap_or(default))
    }
}
