use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::info;

use crm_jobs::{JobKind, JobRunner};

/// Drives every periodic job on its own cadence.
#[derive(Clone)]
pub struct JobScheduler {
    runner: JobRunner,
    jobs: Vec<(JobKind, Duration)>,
}

impl JobScheduler {
    /// Schedules all jobs at their default intervals.
    pub fn new(runner: JobRunner) -> Self {
        let jobs = JobKind::ALL
            .iter()
            .map(|kind| (*kind, kind.default_interval()))
            .collect();
        Self { runner, jobs }
    }

    #[cfg(test)]
    pub fn with_jobs(mut self, jobs: Vec<(JobKind, Duration)>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Spawns one background loop per job. The first run happens one period
    /// after startup.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        self.jobs
            .into_iter()
            .map(|(kind, period)| {
                let runner = self.runner.clone();
                tokio::spawn(run_loop(runner, kind, period))
            })
            .collect()
    }
}

async fn run_loop(runner: JobRunner, kind: JobKind, period: Duration) {
    info!(
        stage = "scheduler",
        job = kind.as_str(),
        period_secs = period.as_secs(),
        "job scheduled"
    );
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let status = runner.run(kind).await;
        info!(stage = "scheduler", job = kind.as_str(), status = %status, "job finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        router::{app_router, AppState},
        telemetry,
    };
    use crm_jobs::CrmClient;
    use crm_storage::Database;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::path::Path;

    async fn wait_for_log(path: &Path) -> String {
        for _ in 0..100 {
            if let Ok(contents) = tokio::fs::read_to_string(path).await {
                if !contents.is_empty() {
                    return contents;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("log file {} was never written", path.display());
    }

    #[test]
    fn default_schedule_covers_every_job() {
        let client = CrmClient::from_base_url("http://127.0.0.1:1/").expect("client");
        let scheduler = JobScheduler::new(JobRunner::new(client, "/tmp"));
        assert_eq!(scheduler.jobs.len(), JobKind::ALL.len());
        assert!(scheduler
            .jobs
            .contains(&(JobKind::Heartbeat, Duration::from_secs(300))));
    }

    #[tokio::test]
    async fn spawned_heartbeat_runs_after_one_period() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/hello");
                then.status(200).json_body(json!({ "hello": "Hello, CRM!" }));
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let client = CrmClient::from_base_url(&server.url("/")).expect("client");
        let runner = JobRunner::new(client, dir.path());

        let handles = JobScheduler::new(runner)
            .with_jobs(vec![(JobKind::Heartbeat, Duration::from_millis(50))])
            .spawn();

        let contents = wait_for_log(&dir.path().join("crm_heartbeat_log.txt")).await;
        for handle in handles {
            handle.abort();
        }
        assert!(contents.contains("CRM is alive"));
    }

    #[tokio::test]
    async fn weekly_report_reads_live_api() {
        let metrics = telemetry::init_metrics().expect("metrics");
        let database = Database::connect("sqlite::memory:").await.expect("connect");
        database.run_migrations().await.expect("migrations");
        let state = AppState::new(metrics, database);

        let customer = state
            .service()
            .create_customer(&crm_core::CustomerInput {
                name: "Alice".into(),
                email: "alice@example.com".into(),
                phone: None,
            })
            .await
            .expect("customer");
        let product = state
            .service()
            .create_product(&crm_core::ProductInput {
                name: "Pen".into(),
                price: "12.50".parse().expect("decimal"),
                stock: Some(3),
            })
            .await
            .expect("product");
        state
            .service()
            .create_order(&crm_core::OrderInput {
                customer_id: customer.id,
                product_ids: vec![product.id],
            })
            .await
            .expect("order");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let server = tokio::spawn(async move {
            axum::serve(listener, app_router(state)).await.ok();
        });

        let dir = tempfile::tempdir().expect("tempdir");
        let client = CrmClient::from_base_url(&format!("http://{addr}/")).expect("client");
        let runner = JobRunner::new(client, dir.path());
        let status = runner.run(JobKind::WeeklyReport).await;
        server.abort();

        assert!(status.starts_with("CRM report generated successfully"));
        let contents = tokio::fs::read_to_string(dir.path().join("crm_report_log.txt"))
            .await
            .expect("report log");
        assert!(contents.contains("Report: 1 customers, 1 orders, $12.50 revenue"));
    }
}
