//! Periodic eviction of finished jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use crate::broadcast::JobStore;
use crate::config::JobsConfig;

/// Removes finished jobs once they are older than the retention window.
pub struct JobReaper {
    store: Arc<JobStore>,
    interval: Duration,
    /// `None` keeps finished jobs forever.
    retention: Option<chrono::Duration>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl JobReaper {
    /// Creates a reaper. A `ttl_hours` of 0 disables eviction.
    pub fn new(store: Arc<JobStore>, interval: Duration, ttl_hours: u64) -> Self {
        let retention = (ttl_hours > 0).then(|| chrono::Duration::hours(ttl_hours as i64));
        Self {
            store,
            interval,
            retention,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn from_config(store: Arc<JobStore>, config: &JobsConfig) -> Self {
        Self::new(
            store,
            Duration::from_secs(config.cleanup_interval_minutes * 60),
            config.ttl_hours,
        )
    }

    /// Overrides the retention window. Mostly useful for short-lived tests.
    pub fn with_retention(mut self, retention: Option<chrono::Duration>) -> Self {
        self.retention = retention;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.retention.is_some()
    }

    /// Runs one sweep relative to the current time.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Removes finished jobs completed before `now - retention`. Jobs that
    /// still have a stream client attached are kept for a later sweep.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        sweep_expired(&self.store, self.retention, now)
    }

    /// Starts the sweep loop on the current tokio runtime.
    /// `trigger_rx` requests an immediate sweep.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let interval = self.interval;
        let retention = self.retention;

        if retention.is_none() {
            log::info!("Job cleanup disabled (ttl_hours = 0)");
        }

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.tick().await; // skip immediate first tick

            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = interval_timer.tick() => {},
                    Ok(()) = trigger_rx.recv() => {
                        log::info!("Manual job cleanup triggered");
                    },
                    _ = wake.notified() => {},
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                sweep_expired(&store, retention, Utc::now());
            }

            log::debug!("Job reaper stopped");
        })
    }

    /// Signals the sweep loop to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

fn sweep_expired(
    store: &JobStore,
    retention: Option<chrono::Duration>,
    now: DateTime<Utc>,
) -> usize {
    let Some(retention) = retention else {
        return 0;
    };

    let cutoff = now - retention;
    let candidates = store.list_terminal_older_than(cutoff);
    let removed = candidates
        .iter()
        .filter(|id| store.delete_if_unobserved(id))
        .count();

    if removed > 0 {
        log::info!(
            "Removed {} finished job(s) older than {}h",
            removed,
            retention.num_hours()
        );
    }
    if removed < candidates.len() {
        log::debug!(
            "Kept {} expired job(s) with active subscribers",
            candidates.len() - removed
        );
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, JobPhase, JobStatus, JobUpdate};

    fn finished_job(store: &JobStore) -> JobId {
        let id = store.create(JobUpdate::default());
        store
            .update(
                &id,
                JobUpdate::transition(JobStatus::Complete, JobPhase::Complete, 100, "done"),
            )
            .unwrap();
        id
    }

    #[test]
    fn test_sweep_removes_only_expired_finished_jobs() {
        let store = Arc::new(JobStore::default());
        let done = finished_job(&store);
        let running = store.create(JobUpdate::default());
        let reaper = JobReaper::new(Arc::clone(&store), Duration::from_secs(60), 24);

        assert_eq!(reaper.sweep(), 0);
        assert_eq!(reaper.sweep_at(Utc::now() + chrono::Duration::hours(25)), 1);

        assert!(store.get(&done).is_err());
        assert!(store.get(&running).is_ok());
    }

    #[test]
    fn test_zero_ttl_disables_eviction() {
        let store = Arc::new(JobStore::default());
        finished_job(&store);
        let reaper = JobReaper::new(Arc::clone(&store), Duration::from_secs(60), 0);

        assert!(!reaper.is_enabled());
        assert_eq!(reaper.sweep_at(Utc::now() + chrono::Duration::days(365)), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_update_releases_subscribers() {
        let store = Arc::new(JobStore::default());
        let id = store.create(JobUpdate::default());
        let subscription = store.subscribe(&id).unwrap();
        store
            .update(&id, JobUpdate::default().with_status(JobStatus::Error))
            .unwrap();
        let reaper = JobReaper::new(Arc::clone(&store), Duration::from_secs(60), 1);
        let later = Utc::now() + chrono::Duration::hours(2);

        assert_eq!(store.broadcaster().subscriber_count(&id), 0);
        assert_eq!(reaper.sweep_at(later), 1);
        drop(subscription);
    }

    #[tokio::test]
    async fn test_sweep_keeps_job_while_client_attached() {
        let store = Arc::new(JobStore::default());
        let id = finished_job(&store);
        let reaper = JobReaper::new(Arc::clone(&store), Duration::from_secs(60), 1);

        // A client that attached before the terminal snapshot reached it.
        let subscription = store.broadcaster().subscribe(crate::job::Job::new(id.clone()));

        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(reaper.sweep_at(later), 0);
        drop(subscription);
        assert_eq!(reaper.sweep_at(later), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_and_stop() {
        let store = Arc::new(JobStore::default());
        finished_job(&store);
        let reaper = JobReaper::new(Arc::clone(&store), Duration::from_secs(1800), 1)
            .with_retention(Some(chrono::Duration::zero()));

        let (trigger_tx, trigger_rx) = broadcast::channel(4);
        let handle = reaper.start(trigger_rx);

        trigger_tx.send(()).unwrap();
        for _ in 0..10 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.is_empty());

        reaper.stop();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_tick_sweeps() {
        let store = Arc::new(JobStore::default());
        finished_job(&store);
        let reaper = JobReaper::new(Arc::clone(&store), Duration::from_secs(60), 1)
            .with_retention(Some(chrono::Duration::zero()));

        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let handle = reaper.start(trigger_rx);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(store.is_empty());

        reaper.stop();
        handle.await.unwrap();
    }
}
