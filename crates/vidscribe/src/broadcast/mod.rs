//! Job state and live progress streaming.
//!
//! [`JobStore`] owns job state; every update it accepts is pushed through the
//! [`JobProgressBroadcaster`] to the job's subscribers.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{
    JobProgressBroadcaster, StreamEvent, Subscription, DEFAULT_KEEPALIVE, DEFAULT_QUEUE_CAPACITY,
};
pub use job_store::{JobCounts, JobStore};
