//! Periodic CRM jobs: each run talks to the query/mutation API once and
//! appends its findings to a dedicated log file.

pub mod client;
pub mod heartbeat;
pub mod log_sink;
pub mod low_stock;
pub mod reminders;
pub mod report;

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use thiserror::Error;

use crm_util::JobsConfig;

pub use client::{ClientError, CrmClient};
pub use log_sink::{LogSink, LogSinkError};
pub use reminders::ReminderReport;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The jobs known to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Heartbeat,
    LowStock,
    OrderReminders,
    WeeklyReport,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        Self::Heartbeat,
        Self::LowStock,
        Self::OrderReminders,
        Self::WeeklyReport,
    ];

    /// Label used for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::LowStock => "low_stock",
            Self::OrderReminders => "order_reminders",
            Self::WeeklyReport => "weekly_report",
        }
    }

    pub fn log_file_name(self) -> &'static str {
        match self {
            Self::Heartbeat => "crm_heartbeat_log.txt",
            Self::LowStock => "low_stock_updates_log.txt",
            Self::OrderReminders => "order_reminders_log.txt",
            Self::WeeklyReport => "crm_report_log.txt",
        }
    }

    pub fn default_interval(self) -> Duration {
        match self {
            Self::Heartbeat => Duration::from_secs(5 * 60),
            Self::LowStock => Duration::from_secs(12 * 60 * 60),
            Self::OrderReminders => Duration::from_secs(24 * 60 * 60),
            Self::WeeklyReport => Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Runs jobs against one API endpoint, writing logs under `log_dir`.
#[derive(Clone)]
pub struct JobRunner {
    client: CrmClient,
    log_dir: PathBuf,
    clock: Clock,
}

impl JobRunner {
    pub fn new(client: CrmClient, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            log_dir: log_dir.into(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn from_config(config: &JobsConfig) -> Result<Self, ClientError> {
        let client = CrmClient::from_base_url(&config.api_url)?;
        Ok(Self::new(client, config.log_dir.clone()))
    }

    /// Overrides the clock used for timestamps and the reminder window.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(&self, kind: JobKind) -> LogSink {
        LogSink::new(self.log_dir.join(kind.log_file_name()))
    }

    pub(crate) fn client(&self) -> &CrmClient {
        &self.client
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Runs one job and returns its status line. Failures never propagate.
    pub async fn run(&self, kind: JobKind) -> String {
        let start = std::time::Instant::now();
        let status = match kind {
            JobKind::Heartbeat => self.heartbeat().await,
            JobKind::LowStock => self.update_low_stock().await,
            JobKind::OrderReminders => match self.send_order_reminders().await {
                Ok(report) => report.status(),
                Err(err) => format!("Error processing order reminders: {err}"),
            },
            JobKind::WeeklyReport => self.generate_report().await,
        };
        histogram!("crm_job_duration_seconds", "job" => kind.as_str())
            .record(start.elapsed().as_secs_f64());
        status
    }
}

pub(crate) fn record_run(kind: JobKind, succeeded: bool) {
    let result = if succeeded { "ok" } else { "error" };
    counter!("crm_job_runs_total", "job" => kind.as_str(), "result" => result).increment(1);
}

/// Failures that abort the order reminder job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Log(#[from] LogSinkError),
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    pub fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 5)
            .single()
            .expect("valid timestamp")
    }

    pub fn runner(base_url: &str, log_dir: &std::path::Path) -> JobRunner {
        let client = CrmClient::from_base_url(base_url).expect("client");
        JobRunner::new(client, log_dir).with_clock(Arc::new(fixed_now))
    }

    pub async fn read_log(runner: &JobRunner, kind: JobKind) -> String {
        tokio::fs::read_to_string(runner.sink(kind).path())
            .await
            .expect("read log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_distinct_log_files() {
        let mut names: Vec<_> = JobKind::ALL.iter().map(|kind| kind.log_file_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), JobKind::ALL.len());
    }

    #[test]
    fn runner_from_config_rejects_bad_url() {
        let config = JobsConfig {
            api_url: "not a url".to_string(),
            log_dir: PathBuf::from("/tmp"),
            enabled: true,
        };
        assert!(matches!(
            JobRunner::from_config(&config),
            Err(ClientError::Url(_))
        ));
    }
}
