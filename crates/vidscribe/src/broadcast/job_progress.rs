//! Per-job fan-out of job snapshots to live subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing never waits: a subscriber
//! whose queue is full is disconnected and sees its stream end.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::job::{Job, JobId};

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Item delivered to a stream client.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Snapshot(Job),
    /// Nothing happened during the idle window.
    Keepalive,
}

impl StreamEvent {
    pub fn snapshot(&self) -> Option<&Job> {
        match self {
            StreamEvent::Snapshot(job) => Some(job),
            StreamEvent::Keepalive => None,
        }
    }
}

struct SubscriberEntry {
    id: u64,
    sender: mpsc::Sender<Job>,
}

struct BroadcasterInner {
    registry: Mutex<HashMap<JobId, Vec<SubscriberEntry>>>,
    next_id: AtomicU64,
    capacity: usize,
    keepalive: Duration,
}

/// Broadcasts job snapshots to the subscribers of each job.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    inner: Arc<BroadcasterInner>,
}

impl JobProgressBroadcaster {
    /// Creates a broadcaster with the given per-subscriber queue capacity and
    /// keepalive interval.
    pub fn new(capacity: usize, keepalive: Duration) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                registry: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                keepalive,
            }),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<JobId, Vec<SubscriberEntry>>> {
        match self.inner.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Broadcaster registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Registers a subscriber whose first delivery is `snapshot`.
    ///
    /// A terminal snapshot is delivered and the subscription ends right after
    /// it; nothing is registered in that case.
    pub fn subscribe(&self, snapshot: Job) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let job_id = snapshot.id.clone();
        let finished = snapshot.is_finished();

        // The queue is empty, so the first send cannot fail.
        let _ = sender.try_send(snapshot);

        if !finished {
            self.registry()
                .entry(job_id.clone())
                .or_default()
                .push(SubscriberEntry { id, sender });
            log::debug!("Subscriber {} attached to job {}", id, job_id);
        }

        Subscription {
            id,
            job_id,
            receiver,
            keepalive: self.inner.keepalive,
            closed: false,
            registered: !finished,
            broadcaster: self.clone(),
        }
    }

    /// Delivers `job` to every subscriber of `job.id` without blocking.
    ///
    /// Subscribers with a full queue are disconnected. After a terminal
    /// snapshot all subscribers of the job are released.
    pub fn publish(&self, job: &Job) {
        let mut registry = self.registry();
        let Some(entries) = registry.get_mut(&job.id) else {
            return;
        };

        entries.retain(|entry| match entry.sender.try_send(job.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "Subscriber {} of job {} is not keeping up, disconnecting",
                    entry.id,
                    job.id
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });

        if job.is_finished() || entries.is_empty() {
            registry.remove(&job.id);
        }
    }

    /// Removes a single subscriber.
    pub fn unsubscribe(&self, job_id: &JobId, subscriber_id: u64) {
        let mut registry = self.registry();
        if let Some(entries) = registry.get_mut(job_id) {
            entries.retain(|entry| entry.id != subscriber_id);
            if entries.is_empty() {
                registry.remove(job_id);
            }
        }
    }

    /// Drops every subscriber of a job; their streams end.
    pub fn remove_job(&self, job_id: &JobId) {
        if let Some(entries) = self.registry().remove(job_id) {
            log::debug!(
                "Released {} subscriber(s) of removed job {}",
                entries.len(),
                job_id
            );
        }
    }

    pub fn subscriber_count(&self, job_id: &JobId) -> usize {
        self.registry().get(job_id).map_or(0, Vec::len)
    }

    /// Total number of registered subscribers across all jobs.
    pub fn total_subscribers(&self) -> usize {
        self.registry().values().map(Vec::len).sum()
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_KEEPALIVE)
    }
}

/// Live view of one job. Ends after the terminal snapshot.
///
/// Dropping the subscription deregisters it.
pub struct Subscription {
    id: u64,
    job_id: JobId,
    receiver: mpsc::Receiver<Job>,
    keepalive: Duration,
    closed: bool,
    registered: bool,
    broadcaster: JobProgressBroadcaster,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Waits for the next snapshot, or yields [`StreamEvent::Keepalive`] when
    /// the keepalive interval passes without one. Returns `None` once the
    /// stream is over.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        if self.closed {
            return None;
        }

        match tokio::time::timeout(self.keepalive, self.receiver.recv()).await {
            Ok(Some(job)) => {
                if job.is_finished() {
                    self.close();
                }
                Some(StreamEvent::Snapshot(job))
            }
            Ok(None) => {
                self.close();
                None
            }
            Err(_) => Some(StreamEvent::Keepalive),
        }
    }

    /// Collects snapshots until the stream ends, skipping keepalives.
    pub async fn collect_snapshots(mut self) -> Vec<Job> {
        let mut snapshots = Vec::new();
        while let Some(event) = self.next().await {
            if let StreamEvent::Snapshot(job) = event {
                snapshots.push(job);
            }
        }
        snapshots
    }

    /// Adapts the subscription into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }

    fn close(&mut self) {
        self.closed = true;
        self.receiver.close();
        self.deregister();
    }

    fn deregister(&mut self) {
        if self.registered {
            self.registered = false;
            self.broadcaster.unsubscribe(&self.job_id, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.deregister();
    }
}
