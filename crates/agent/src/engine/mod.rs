pub mod queue;
pub mod reconcile;

use crate::pipeline::EnrichmentPipeline;
use chrono::Utc;
use cron::Schedule;
use mailbox::{CalendarClient, MailboxClient};
use mailroom_core::config::SyncSettings;
use mailroom_core::error::{MailroomError, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use storage::SqliteStorage;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use self::reconcile::{reconcile_events, reconcile_messages, SyncReport};

/// Accepts 5-field crontab syntax as well as the 6/7-field form with seconds.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    let full = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };

    Schedule::from_str(&full).map_err(|e| {
        MailroomError::Configuration(format!("Invalid cron expression '{}': {}", expr, e))
    })
}

/// Time until the schedule's next firing, or `None` if it never fires again.
fn until_next(schedule: &Schedule) -> Option<Duration> {
    let next = schedule.upcoming(Utc).next()?;
    Some((next - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

pub struct SyncManager {
    store: Arc<SqliteStorage>,
    mailbox: Option<Arc<dyn MailboxClient>>,
    calendar: Option<Arc<dyn CalendarClient>>,
    pipeline: Arc<EnrichmentPipeline>,
    settings: SyncSettings,
    timeout: Duration,
}

impl SyncManager {
    pub fn new(
        store: Arc<SqliteStorage>,
        mailbox: Option<Arc<dyn MailboxClient>>,
        calendar: Option<Arc<dyn CalendarClient>>,
        pipeline: Arc<EnrichmentPipeline>,
        settings: SyncSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            mailbox,
            calendar,
            pipeline,
            settings,
            timeout,
        }
    }

    fn mailbox(&self) -> Result<&Arc<dyn MailboxClient>> {
        self.mailbox
            .as_ref()
            .ok_or_else(|| MailroomError::Configuration("No mailbox account configured".into()))
    }

    fn calendar(&self) -> Result<&Arc<dyn CalendarClient>> {
        self.calendar
            .as_ref()
            .ok_or_else(|| MailroomError::Configuration("No calendar account configured".into()))
    }

    /// Fetches, reconciles, then analyzes whatever was newly inserted. A
    /// failed fetch fails the call; per-message problems only show up in
    /// the report and the log.
    pub async fn sync_messages(&self, query: &str, max_results: u32) -> Result<SyncReport> {
        let mailbox = self.mailbox()?;
        let fetched = tokio::time::timeout(self.timeout, mailbox.fetch_messages(query, max_results))
            .await
            .map_err(|_| MailroomError::UpstreamUnavailable("Mailbox fetch timed out".into()))??;
        info!("Fetched {} messages for query '{}'", fetched.len(), query);

        let report = reconcile_messages(&self.store, &fetched).await;
        let analyzed = self.pipeline.analyze_many(&report.inserted_ids).await;
        info!(
            "Message sync: {} inserted, {} already present, {} failed, {} analyzed",
            report.inserted, report.already_present, report.failed, analyzed
        );
        Ok(report)
    }

    pub async fn sync_events(&self, max_results: u32) -> Result<SyncReport> {
        let calendar = self.calendar()?;
        let fetched = tokio::time::timeout(self.timeout, calendar.list_upcoming(max_results))
            .await
            .map_err(|_| MailroomError::UpstreamUnavailable("Calendar listing timed out".into()))??;

        let report = reconcile_events(&self.store, &fetched).await;
        info!(
            "Event sync: {} inserted, {} already present, {} failed",
            report.inserted, report.already_present, report.failed
        );
        Ok(report)
    }

    /// Local read state always changes; the mailbox is told when possible.
    pub async fn mark_read(&self, id: i64, is_read: bool) -> Result<()> {
        self.store.mark_read(id, is_read).await?;
        if !is_read {
            return Ok(());
        }

        let Some(mailbox) = &self.mailbox else {
            return Ok(());
        };
        let message = self.store.get_message(id).await?;
        match tokio::time::timeout(self.timeout, mailbox.mark_read(&message.external_id)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Could not mark {} read remotely: {}", message.external_id, e),
            Err(_) => warn!("Marking {} read remotely timed out", message.external_id),
        }
        Ok(())
    }

    /// One message sync with the configured query, plus an event sync when
    /// a calendar is attached.
    pub async fn run_once(&self) -> Result<SyncReport> {
        let report = self
            .sync_messages(&self.settings.query, self.settings.max_results)
            .await?;

        if self.calendar.is_some() {
            if let Err(e) = self.sync_events(self.settings.max_results).await {
                error!("Event sync failed: {}", e);
            }
        }
        Ok(report)
    }

    /// Runs [`run_once`](Self::run_once) forever, on the cron schedule if
    /// one is set and on the fixed interval otherwise.
    pub fn start_background_sync(self: Arc<Self>) -> Result<JoinHandle<()>> {
        let schedule = self
            .settings
            .schedule
            .as_deref()
            .map(parse_schedule)
            .transpose()?;
        if schedule.is_none() && self.settings.interval.is_zero() {
            return Err(MailroomError::Configuration("Sync interval must be non-zero".into()));
        }

        info!("Starting background sync manager");
        Ok(tokio::spawn(async move {
            match schedule {
                Some(schedule) => loop {
                    let Some(wait) = until_next(&schedule) else {
                        warn!("Sync schedule has no upcoming runs, stopping");
                        return;
                    };
                    tokio::time::sleep(wait).await;
                    self.tick().await;
                },
                None => {
                    let mut interval = tokio::time::interval(self.settings.interval);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        interval.tick().await;
                        self.tick().await;
                    }
                }
            }
        }))
    }

    async fn tick(&self) {
        info!("Running periodic sync...");
        if let Err(e) = self.run_once().await {
            error!("Periodic sync failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_cron_gets_seconds() {
        let schedule = parse_schedule("*/5 * * * *").unwrap();
        let mut upcoming = schedule.upcoming(Utc);
        let first = upcoming.next().unwrap();
        let second = upcoming.next().unwrap();
        assert_eq!((second - first).num_minutes(), 5);
    }

    #[test]
    fn six_field_cron_is_used_as_is() {
        assert!(parse_schedule("30 0 9 * * Mon-Fri").is_ok());
    }

    #[test]
    fn bad_cron_is_a_configuration_error() {
        assert!(matches!(
            parse_schedule("every five minutes"),
            Err(MailroomError::Configuration(_))
        ));
    }
}
