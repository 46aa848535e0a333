use chrono::Duration;
use tracing::{error, info};

use crate::{record_run, JobError, JobKind, JobRunner};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const REMINDER_WINDOW_DAYS: i64 = 7;
const NO_RECENT_ORDERS: &str = "No orders found from the last 7 days";

/// Lines written for one reminder run, excluding the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderReport {
    pub lines: Vec<String>,
    pub reminded: usize,
}

impl ReminderReport {
    pub fn status(&self) -> String {
        format!("Order reminders processed: {} recent orders", self.reminded)
    }
}

impl JobRunner {
    /// Logs a reminder line for every order placed within the last seven days.
    ///
    /// Unlike the other jobs, failures are returned to the caller after the
    /// error line has been logged.
    pub async fn send_order_reminders(&self) -> Result<ReminderReport, JobError> {
        let sink = self.sink(JobKind::OrderReminders);
        match self.collect_reminders().await {
            Ok(report) => {
                record_run(JobKind::OrderReminders, true);
                info!(
                    stage = "jobs",
                    job = "order_reminders",
                    reminded = report.reminded,
                    "order reminders processed"
                );
                Ok(report)
            }
            Err(err) => {
                let timestamp = self.now().format(TIMESTAMP_FORMAT);
                if let Err(log_err) = sink.append([format!("[{timestamp}] ERROR: {err}")]).await {
                    error!(stage = "jobs", job = "order_reminders", error = %log_err, "failed to write reminder log");
                }
                error!(stage = "jobs", job = "order_reminders", error = %err, "order reminders failed");
                record_run(JobKind::OrderReminders, false);
                Err(err)
            }
        }
    }

    async fn collect_reminders(&self) -> Result<ReminderReport, JobError> {
        let now = self.now();
        let cutoff = now - Duration::days(REMINDER_WINDOW_DAYS);
        let orders = self.client().list_orders().await?;

        let lines: Vec<String> = orders
            .iter()
            .filter(|order| order.order_date >= cutoff)
            .map(|order| {
                format!(
                    "Order ID: {}, Customer Email: {}",
                    order.id, order.customer.email
                )
            })
            .collect();
        let reminded = lines.len();
        let lines = if lines.is_empty() {
            vec![NO_RECENT_ORDERS.to_string()]
        } else {
            lines
        };

        let header = format!(
            "[{}] Processing order reminders",
            now.format(TIMESTAMP_FORMAT)
        );
        self.sink(JobKind::OrderReminders)
            .append(std::iter::once(&header).chain(lines.iter()))
            .await?;

        Ok(ReminderReport { lines, reminded })
    }
}
