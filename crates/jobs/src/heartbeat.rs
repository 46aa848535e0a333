use tracing::{error, info, warn};

use crate::{record_run, JobKind, JobRunner};

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y-%H:%M:%S";

impl JobRunner {
    /// Logs that the CRM is alive, then verifies the API answers `hello`.
    pub async fn heartbeat(&self) -> String {
        let timestamp = self.now().format(TIMESTAMP_FORMAT).to_string();
        let sink = self.sink(JobKind::Heartbeat);

        if let Err(err) = sink.append([format!("{timestamp} CRM is alive")]).await {
            error!(stage = "jobs", job = "heartbeat", error = %err, "failed to write heartbeat");
            record_run(JobKind::Heartbeat, false);
            return format!("Heartbeat logging failed: {err}");
        }

        let (line, verified) = match self.client().hello().await {
            Ok(greeting) => (
                format!("{timestamp} API endpoint verified: {greeting}"),
                true,
            ),
            Err(err) => {
                warn!(stage = "jobs", job = "heartbeat", error = %err, "API endpoint check failed");
                (
                    format!("{timestamp} ERROR: API endpoint check failed: {err}"),
                    false,
                )
            }
        };

        if let Err(err) = sink.append([line]).await {
            error!(stage = "jobs", job = "heartbeat", error = %err, "failed to write endpoint check");
        }

        record_run(JobKind::Heartbeat, verified);
        info!(stage = "jobs", job = "heartbeat", verified, "heartbeat logged");
        "Heartbeat logged successfully".to_string()
    }
}
