//! Job record shared by the store, the broadcaster and the pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generates a short random identifier (first 8 hex digits of a v4 UUID).
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Overall status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Transcribing,
    Extracting,
    Complete,
    Error,
    Cancelled,
}

impl JobStatus {
    /// Returns true for statuses after which the job can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Error | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Downloading => write!(f, "downloading"),
            JobStatus::Transcribing => write!(f, "transcribing"),
            JobStatus::Extracting => write!(f, "extracting"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Error => write!(f, "error"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Pipeline phase, used by clients to map progress bars.
///
/// Variants are declared in pipeline order, so `a < b` means `a` runs first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Download,
    Transcribe,
    Extract,
    Complete,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Download => write!(f, "Downloading"),
            JobPhase::Transcribe => write!(f, "Transcribing"),
            JobPhase::Extract => write!(f, "Extracting"),
            JobPhase::Complete => write!(f, "Complete"),
        }
    }
}

/// Descriptive information about the source media.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub title: String,
    pub author: String,
    /// Duration in seconds. Zero when the source did not report one.
    pub duration_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub url: String,
}

/// References to produced artifacts. Content is never held in the job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultRefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Snapshot of a processing job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub phase: Option<JobPhase>,
    /// Percentage in `0..=100`.
    pub progress: u8,
    pub message: Option<String>,
    pub metadata: Option<MediaMetadata>,
    #[serde(default)]
    pub result_refs: ResultRefs,
    /// Fatal error message, only set with [`JobStatus::Error`].
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Creates a pending job.
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            phase: None,
            progress: 0,
            message: Some("Job queued".to_string()),
            metadata: None,
            result_refs: ResultRefs::default(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Returns true if the job reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merges a partial update into the job, field by field.
    ///
    /// Progress never moves backwards unless the phase advances. `error` is kept
    /// only while the status is [`JobStatus::Error`], and `completed_at` is
    /// stamped when the status becomes terminal.
    pub fn merge(&mut self, update: JobUpdate) {
        let phase_advanced = match (update.phase, self.phase) {
            (Some(next), Some(current)) => next > current,
            (Some(_), None) => true,
            _ => false,
        };

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(phase) = update.phase {
            if self.phase.map_or(true, |current| phase >= current) {
                self.phase = Some(phase);
            } else {
                log::warn!(
                    "Ignoring phase regression {:?} -> {:?} for job {}",
                    self.phase,
                    phase,
                    self.id
                );
            }
        }
        if let Some(progress) = update.progress {
            let progress = progress.min(100);
            if phase_advanced || progress >= self.progress {
                self.progress = progress;
            }
        }
        if let Some(message) = update.message {
            self.message = Some(message);
        }
        if let Some(metadata) = update.metadata {
            self.metadata = Some(metadata);
        }
        if let Some(transcript) = update.transcript_ref {
            self.result_refs.transcript = Some(transcript);
        }
        if let Some(summary) = update.summary_ref {
            self.result_refs.summary = Some(summary);
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if self.status != JobStatus::Error {
            self.error = None;
        }
        if self.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Partial set of job fields. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub phase: Option<JobPhase>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub metadata: Option<MediaMetadata>,
    pub transcript_ref: Option<String>,
    pub summary_ref: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// A status/phase transition with its progress and message.
    pub fn transition(
        status: JobStatus,
        phase: JobPhase,
        progress: u8,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: Some(status),
            phase: Some(phase),
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A mid-stage progress report.
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Terminal failure carrying the error message.
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: Some(JobStatus::Error),
            message: Some(format!("Error: {}", error)),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            message: Some("Job cancelled".to_string()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_transcript_ref(mut self, reference: impl Into<String>) -> Self {
        self.transcript_ref = Some(reference.into());
        self
    }

    pub fn with_summary_ref(mut self, reference: impl Into<String>) -> Self {
        self.summary_ref = Some(reference.into());
        self
    }
}
