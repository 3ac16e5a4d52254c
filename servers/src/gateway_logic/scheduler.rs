use anyhow::Result;
use lib_feedrelay::FeedPoller;
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Starts a scheduler that runs one poll cycle every `every`.
///
/// Overlapping ticks are harmless: the poller skips a cycle while the previous
/// one still holds its limiter.
pub async fn start_polling(poller: Arc<FeedPoller>, every: Duration) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_repeated_async(every, move |_uuid, _lock| {
        let poller = Arc::clone(&poller);
        Box::pin(async move {
            let report = poller.run_cycle().await;
            if !report.skipped {
                tracing::info!(
                    feeds = report.feeds,
                    notified = report.notified,
                    failed = report.failed,
                    "poll cycle finished"
                );
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(every = ?every, "poll schedule started");
    Ok(scheduler)
}
