//! In-memory stand-ins for the external services.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use vidscribe::backend::{
    ArtifactKind, ArtifactWriter, AudioRef, BackendError, CaptionSource, CaptionTrack,
    ExtractRequest, ExtractionKind, Extractor, FetchedMedia, MediaFetcher, Transcriber,
};
use vidscribe::error::StorageError;
use vidscribe::job::{JobId, MediaMetadata};
use vidscribe::transcript::{Segment, TimeRange};

/// Holds callers until opened.
pub struct Gate {
    permits: Semaphore,
}

impl Gate {
    pub fn closed() -> Self {
        Self {
            permits: Semaphore::new(0),
        }
    }

    pub fn open(&self) {
        self.permits.add_permits(1_000);
    }

    async fn pass(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

/// Returns fixed metadata for every URL.
pub struct FakeFetcher {
    pub duration_secs: f64,
    pub error: Option<BackendError>,
    pub gate: Option<Gate>,
    pub fetches: AtomicUsize,
    pub cleanups: AtomicUsize,
}

impl FakeFetcher {
    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            error: None,
            gate: None,
            fetches: AtomicUsize::new(0),
            cleanups: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: BackendError) -> Self {
        Self {
            error: Some(error),
            ..Self::with_duration(0.0)
        }
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Gate::closed());
        self
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(FetchedMedia {
            audio: AudioRef(format!("/tmp/vidscribe-test/{}.m4a", self.fetches.load(Ordering::SeqCst))),
            metadata: MediaMetadata {
                title: "Integration Talk".to_string(),
                author: "Tester".to_string(),
                duration_secs: self.duration_secs,
                upload_date: Some("20250301".to_string()),
                description: "Recorded for tests.".to_string(),
                url: url.to_string(),
            },
        })
    }

    async fn cleanup(&self, _audio: &AudioRef) -> Result<(), BackendError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Emits one ten-second segment per step starting exactly at the requested
/// range start, so adjacent chunks produce duplicates inside the overlap.
pub struct ScriptedTranscriber {
    pub ranges: Mutex<Vec<TimeRange>>,
    pub gate: Option<Gate>,
    /// Errors returned by the first calls, in order.
    pub failures: Mutex<VecDeque<BackendError>>,
}

impl ScriptedTranscriber {
    pub fn new() -> Self {
        Self {
            ranges: Mutex::new(Vec::new()),
            gate: None,
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Gate::closed());
        self
    }

    pub fn failing_first(self, errors: Vec<BackendError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.ranges.lock().unwrap().len()
    }

    /// Segment count one range produces.
    pub fn segments_for(range: TimeRange) -> usize {
        Self::segments(range).len()
    }

    fn segments(range: TimeRange) -> Vec<Segment> {
        let end = if range.end.is_finite() { range.end } else { range.start + 30.0 };
        let mut segments = Vec::new();
        let mut t = range.start;
        while t < end {
            segments.push(Segment::new(t, (t + 10.0).min(end), format!("words at {:.0}", t)));
            t += 10.0;
        }
        segments
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn transcribe(
        &self,
        _audio: &AudioRef,
        range: TimeRange,
    ) -> Result<Vec<Segment>, BackendError> {
        if let Some(gate) = &self.gate {
            gate.pass().await;
        }
        self.ranges.lock().unwrap().push(range);
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(Self::segments(range))
    }
}

/// Serves a fixed caption track, or reports none.
pub struct FakeCaptions {
    pub track: Option<CaptionTrack>,
    pub lookups: AtomicUsize,
}

impl FakeCaptions {
    pub fn with_lines(title: &str, lines: &[&str]) -> Self {
        let segments = lines
            .iter()
            .enumerate()
            .map(|(i, line)| Segment::new(i as f64 * 5.0, i as f64 * 5.0 + 5.0, *line))
            .collect();
        Self {
            track: Some(CaptionTrack {
                metadata: MediaMetadata {
                    title: title.to_string(),
                    duration_secs: lines.len() as f64 * 5.0,
                    ..Default::default()
                },
                segments,
            }),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            track: None,
            lookups: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CaptionSource for FakeCaptions {
    async fn captions(&self, _url: &str) -> Result<Option<CaptionTrack>, BackendError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.track.clone())
    }
}

/// Replays a script of results, then falls back to a canned summary.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    pub calls: Mutex<Vec<ExtractionKind>>,
}

impl ScriptedExtractor {
    pub fn succeeding() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn with_script(script: Vec<Result<String, BackendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, request: ExtractRequest<'_>) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(request.kind);
        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(format!("Summary of {} characters", request.text.chars().count())),
        }
    }
}

/// Keeps written artifacts in memory.
#[derive(Default)]
pub struct MemoryWriter {
    pub artifacts: Mutex<Vec<(JobId, ArtifactKind, String)>>,
    pub fail_kind: Option<ArtifactKind>,
}

impl MemoryWriter {
    pub fn failing_on(kind: ArtifactKind) -> Self {
        Self {
            artifacts: Mutex::new(Vec::new()),
            fail_kind: Some(kind),
        }
    }

    pub fn bodies(&self, kind: ArtifactKind) -> Vec<String> {
        self.artifacts
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl ArtifactWriter for MemoryWriter {
    async fn write(
        &self,
        job_id: &JobId,
        kind: ArtifactKind,
        _metadata: &MediaMetadata,
        body: &str,
    ) -> Result<String, StorageError> {
        if self.fail_kind == Some(kind) {
            return Err(StorageError::WriteFile {
                path: format!("/memory/{}", kind).into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.artifacts
            .lock()
            .unwrap()
            .push((job_id.clone(), kind, body.to_string()));
        Ok(format!("memory://{}/{}", job_id, kind))
    }

    async fn read(&self, reference: &str) -> Result<String, StorageError> {
        self.artifacts
            .lock()
            .unwrap()
            .iter()
            .find(|(id, kind, _)| format!("memory://{}/{}", id, kind) == reference)
            .map(|(_, _, body)| body.clone())
            .ok_or_else(|| StorageError::NotFound(reference.to_string()))
    }
}
