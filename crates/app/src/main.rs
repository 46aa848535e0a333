mod problem;
mod router;
mod scheduler;
mod service;
mod telemetry;

use std::net::SocketAddr;

use tracing::info;

use crm_jobs::JobRunner;
use crm_storage::Database;
use crm_util::{load_env_file, AppConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    let state = router::AppState::new(metrics, database);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    if config.jobs.enabled {
        let runner = JobRunner::from_config(&config.jobs)?;
        let handles = scheduler::JobScheduler::new(runner).spawn();
        info!(
            stage = "scheduler",
            jobs = handles.len(),
            api_url = %config.jobs.api_url,
            log_dir = %config.jobs.log_dir.display(),
            "periodic jobs started"
        );
    }

    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
