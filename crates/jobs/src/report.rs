use rust_decimal::Decimal;
use tracing::{error, info};

use crate::{record_run, ClientError, JobKind, JobRunner};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Aggregates reported by the weekly job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrmSummary {
    pub customers: usize,
    pub orders: usize,
    pub revenue: Decimal,
}

impl JobRunner {
    /// Logs customer count, order count and revenue.
    pub async fn generate_report(&self) -> String {
        let timestamp = self.now().format(TIMESTAMP_FORMAT).to_string();
        let sink = self.sink(JobKind::WeeklyReport);

        match self.summarize().await {
            Ok(summary) => {
                let line = format!(
                    "{timestamp} - Report: {} customers, {} orders, ${:.2} revenue",
                    summary.customers,
                    summary.orders,
                    summary.revenue.round_dp(2)
                );
                if let Err(err) = sink.append([&line]).await {
                    error!(stage = "jobs", job = "weekly_report", error = %err, "failed to write report");
                    record_run(JobKind::WeeklyReport, false);
                    return format!("Error generating CRM report: {err}");
                }
                record_run(JobKind::WeeklyReport, true);
                info!(
                    stage = "jobs",
                    job = "weekly_report",
                    customers = summary.customers,
                    orders = summary.orders,
                    revenue = %summary.revenue,
                    "CRM report generated"
                );
                format!("CRM report generated successfully: {line}")
            }
            Err(err) => {
                if let Err(log_err) = sink
                    .append([format!(
                        "{timestamp} - ERROR: failed to generate CRM report: {err}"
                    )])
                    .await
                {
                    error!(stage = "jobs", job = "weekly_report", error = %log_err, "failed to write report");
                }
                error!(stage = "jobs", job = "weekly_report", error = %err, "CRM report failed");
                record_run(JobKind::WeeklyReport, false);
                format!("Error generating CRM report: {err}")
            }
        }
    }

    async fn summarize(&self) -> Result<CrmSummary, ClientError> {
        let customers = self.client().list_customers().await?;
        let orders = self.client().list_orders().await?;
        Ok(CrmSummary {
            customers: customers.len(),
            orders: orders.len(),
            revenue: orders.iter().map(|order| order.total_amount()).sum(),
        })
    }
}
