//! Runs the order reminder job once; exits non-zero when it fails.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use crm_jobs::JobRunner;
use crm_util::{load_env_file, JobsConfig};

#[tokio::main]
async fn main() -> ExitCode {
    load_env_file();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let runner = match JobsConfig::from_env()
        .map_err(|err| err.to_string())
        .and_then(|config| JobRunner::from_config(&config).map_err(|err| err.to_string()))
    {
        Ok(runner) => runner,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runner.send_order_reminders().await {
        Ok(report) => {
            for line in &report.lines {
                println!("{line}");
            }
            println!("Order reminders processed!");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
