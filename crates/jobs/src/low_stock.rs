use tracing::{error, info};

use crate::{record_run, JobKind, JobRunner};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl JobRunner {
    /// Invokes the restock mutation and logs each updated product.
    pub async fn update_low_stock(&self) -> String {
        let timestamp = self.now().format(TIMESTAMP_FORMAT).to_string();
        let sink = self.sink(JobKind::LowStock);

        match self.client().update_low_stock_products().await {
            Ok(outcome) => {
                let mut lines = vec![format!("[{timestamp}] {}", outcome.message)];
                if outcome.success {
                    lines.extend(outcome.products.iter().map(|product| {
                        format!("Updated: {} - New Stock: {}", product.name, product.stock)
                    }));
                }
                lines.push(String::new());

                if let Err(err) = sink.append(&lines).await {
                    error!(stage = "jobs", job = "low_stock", error = %err, "failed to write low stock log");
                    record_run(JobKind::LowStock, false);
                    return format!("Error in low stock update: {err}");
                }

                record_run(JobKind::LowStock, outcome.success);
                info!(
                    stage = "jobs",
                    job = "low_stock",
                    updated = outcome.products.len(),
                    "low stock update completed"
                );
                format!("Low stock update completed: {}", outcome.message)
            }
            Err(err) => {
                if let Err(log_err) = sink
                    .append([format!("[{timestamp}] ERROR: {err}"), String::new()])
                    .await
                {
                    error!(stage = "jobs", job = "low_stock", error = %log_err, "failed to write low stock log");
                }
                error!(stage = "jobs", job = "low_stock", error = %err, "low stock update failed");
                record_run(JobKind::LowStock, false);
                format!("Error in low stock update: {err}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{read_log, runner};
    use crate::JobKind;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn logs_each_restocked_product() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/products/low-stock");
                then.status(200).json_body(json!({
                    "success": true,
                    "message": "Restocked 2 low-stock products",
                    "products": [
                        { "id": "p-1", "name": "Cable", "price": "4.50", "stock": 12, "created_at": "2024-01-01T00:00:00Z" },
                        { "id": "p-2", "name": "Mouse", "price": "19.90", "stock": 10, "created_at": "2024-01-01T00:00:00Z" }
                    ]
                }));
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner(&server.url("/"), dir.path());

        let status = runner.update_low_stock().await;
        assert_eq!(
            status,
            "Low stock update completed: Restocked 2 low-stock products"
        );
        assert_eq!(
            read_log(&runner, JobKind::LowStock).await,
            "[2024-03-15 09:30:05] Restocked 2 low-stock products\n\
             Updated: Cable - New Stock: 12\n\
             Updated: Mouse - New Stock: 10\n\n"
        );
    }

    #[tokio::test]
    async fn transport_failure_logs_error_line() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/products/low-stock");
                then.status(502).body("bad gateway");
            })
            .await;
        let dir = tempfile::tempdir().expect("tempdir");
        let runner = runner(&server.url("/"), dir.path());

        let status = runner.update_low_stock().await;
        assert!(status.starts_with("Error in low stock update:"));
        let log = read_log(&runner, JobKind::LowStock).await;
        assert!(log.starts_with("[2024-03-15 09:30:05] ERROR: unexpected status 502"));
        assert!(log.ends_with("\n\n"));
    }
}
