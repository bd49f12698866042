#![forbid(unsafe_code)]

use std::fmt::Display;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use fd_types::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const RUN_LEDGER_FILE: &str = "run_ledger.json";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("system clock is before UNIX_EPOCH")]
    ClockSkew,
    #[error("invalid log filter {level:?}: {reason}")]
    InvalidLogFilter { level: String, reason: String },
    #[error("a global tracing subscriber is already installed: {0}")]
    SubscriberInstalled(String),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

impl RuntimeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidLogFilter { .. } => ErrorKind::Parameter,
            Self::ClockSkew | Self::SubscriberInstalled(_) | Self::Encode(_) => ErrorKind::Io,
        }
    }
}

pub fn now_unix_ms() -> Result<u64, RuntimeError> {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| RuntimeError::ClockSkew)?
        .as_millis();
    Ok(ms as u64)
}

fn stamp(stage: &str, now: Result<u64, RuntimeError>) -> u64 {
    now.unwrap_or_else(|err| {
        tracing::warn!(stage, error = %err, "clock unavailable, stage timestamp recorded as 0");
        0
    })
}

// ── Logging ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

fn default_level() -> String {
    "info".to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Plain,
        }
    }
}

/// Install the process-wide fmt subscriber. `RUST_LOG` overrides
/// `config.level`.
pub fn init_logging(config: &LogConfig) -> Result<(), RuntimeError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|err| RuntimeError::InvalidLogFilter {
            level: config.level.clone(),
            reason: err.to_string(),
        })?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = match config.format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| RuntimeError::SubscriberInstalled(err.to_string()))
}

// ── Run ledger ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Ok,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub outcome: StageOutcome,
    pub elapsed_ms: u64,
    pub ts_unix_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Timings of one pipeline run, in stage order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLedger {
    records: Vec<StageRecord>,
}

impl RunLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        stage: impl Into<String>,
        outcome: StageOutcome,
        elapsed_ms: u64,
        detail: Option<String>,
    ) {
        let stage = stage.into();
        let ts_unix_ms = stamp(&stage, now_unix_ms());
        self.records.push(StageRecord {
            stage,
            outcome,
            elapsed_ms,
            ts_unix_ms,
            detail,
        });
    }

    /// Run `f` as stage `stage`, recording its duration and outcome.
    pub fn time<T, E: Display>(
        &mut self,
        stage: &str,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let started = Instant::now();
        let result = f();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                tracing::info!(stage, elapsed_ms, "stage finished");
                self.record(stage, StageOutcome::Ok, elapsed_ms, None);
            }
            Err(err) => {
                tracing::warn!(stage, elapsed_ms, error = %err, "stage failed");
                self.record(stage, StageOutcome::Failed, elapsed_ms, Some(err.to_string()));
            }
        }
        result
    }

    #[must_use]
    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    #[must_use]
    pub fn total_ms(&self) -> u64 {
        self.records.iter().map(|r| r.elapsed_ms).sum()
    }

    pub fn to_json(&self) -> Result<String, RuntimeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::{
        LogConfig, LogFormat, RunLedger, RuntimeError, StageOutcome, init_logging, now_unix_ms,
        stamp,
    };

    /// Collects the message of every WARN event.
    #[derive(Clone, Default)]
    struct WarnCapture(Arc<Mutex<Vec<String>>>);

    struct MessageVisitor(String);

    impl tracing::field::Visit for MessageVisitor {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for WarnCapture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                let mut visitor = MessageVisitor(String::new());
                event.record(&mut visitor);
                self.0.lock().expect("lock").push(visitor.0);
            }
        }
    }

    #[test]
    fn log_config_defaults_and_parse() {
        let config: LogConfig = serde_json::from_str("{}").expect("empty");
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.level, "info");

        let config: LogConfig =
            serde_json::from_str(r#"{"level":"fd_aggregate=debug","format":"json"}"#)
                .expect("json");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn second_install_is_rejected() {
        let config = LogConfig {
            level: "warn".to_owned(),
            format: LogFormat::Plain,
        };
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn ledger_times_stages_in_order() {
        let mut ledger = RunLedger::new();
        let value = ledger.time("load", || Ok::<_, String>(42)).expect("load");
        assert_eq!(value, 42);
        let err = ledger
            .time("render", || Err::<(), _>("boom".to_owned()))
            .expect_err("render");
        assert_eq!(err, "boom");

        let records = ledger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].stage, "load");
        assert_eq!(records[0].outcome, StageOutcome::Ok);
        assert_eq!(records[1].outcome, StageOutcome::Failed);
        assert_eq!(records[1].detail.as_deref(), Some("boom"));
        assert!(records[0].ts_unix_ms > 0);

        let json = ledger.to_json().expect("json");
        let back: RunLedger = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, ledger);
    }

    #[test]
    fn clock_failure_is_logged_before_defaulting() {
        let capture = WarnCapture::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let (skewed, fine) = tracing::subscriber::with_default(subscriber, || {
            (
                stamp("render", Err(RuntimeError::ClockSkew)),
                stamp("render", Ok(1_700_000_000_000)),
            )
        });
        assert_eq!(skewed, 0);
        assert_eq!(fine, 1_700_000_000_000);

        let warnings = capture.0.lock().expect("lock");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("clock unavailable"));
    }

    #[test]
    fn clock_is_after_epoch() {
        assert!(now_unix_ms().expect("clock") > 1_600_000_000_000);
    }
}
