//! Background execution: the job manager runs pipelines, the reaper evicts
//! finished jobs.

pub mod manager;
pub mod reaper;

pub use manager::{HealthReport, JobManager, ManagerBackends, SubmitOptions};
pub use reaper::JobReaper;
