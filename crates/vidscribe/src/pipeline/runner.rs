use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::backend::{
    ArtifactKind, ArtifactWriter, AudioRef, CaptionSource, CaptionTrack, Extractor, MediaFetcher,
    Transcriber,
};
use crate::error::StoreError;
use crate::job::{JobPhase, JobStatus, JobUpdate, MediaMetadata};
use crate::sanitize;
use crate::transcript::{self, TimeRange};

use super::chunking::{merge_chunk_segments, ChunkRange, ChunkSegments};
use super::config::PipelineConfig;
use super::context::PipelineContext;
use super::error::{PipelineError, PipelineWarning};
use super::progress::{self, ProgressReporter};

/// External services a pipeline drives.
#[derive(Clone)]
pub struct Backends {
    /// Tried first when set; audio is downloaded only without captions.
    pub captions: Option<Arc<dyn CaptionSource>>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub transcriber: Arc<dyn Transcriber>,
    /// Without an extractor jobs finish after transcription.
    pub extractor: Option<Arc<dyn Extractor>>,
    pub writer: Arc<dyn ArtifactWriter>,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        transcript_ref: String,
        summary_ref: Option<String>,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    backends: Backends,
}

impl Pipeline {
    pub fn new(config: Arc<PipelineConfig>, backends: Backends) -> Self {
        Self { config, backends }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Runs download, transcription and extraction for one job.
    ///
    /// Every state change goes through `progress`. Returns how the job ended
    /// together with the context holding intermediate results.
    pub async fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (JobOutcome, PipelineContext) {
        let span = info_span!("pipeline",
            job_id = %ctx.job_id,
            url = %sanitize::redact_url(&ctx.url),
        );

        let result = self.execute(&mut ctx, progress).instrument(span.clone()).await;

        let outcome = match result {
            Ok(()) => JobOutcome::Completed {
                transcript_ref: ctx.transcript_ref.clone().unwrap_or_default(),
                summary_ref: ctx.summary_ref.clone(),
            },
            Err(PipelineError::Cancelled) => {
                span.in_scope(|| info!("Job cancelled"));
                if let Err(e) = progress.report(JobUpdate::cancelled()) {
                    debug!("Cancellation not recorded: {}", e);
                }
                JobOutcome::Cancelled
            }
            Err(PipelineError::Store(StoreError::Terminal(_))) if ctx.cancel.is_cancelled() => {
                JobOutcome::Cancelled
            }
            Err(e) => {
                let error = e.to_string();
                span.in_scope(|| warn!("Job failed: {}", error));
                if let Err(store_err) = progress.report(JobUpdate::failed(error.clone())) {
                    debug!("Failure not recorded: {}", store_err);
                }
                JobOutcome::Failed { error }
            }
        };

        self.release_audio(&mut ctx).instrument(span).await;

        (outcome, ctx)
    }

    async fn execute(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        let captioned = self
            .step_captions(ctx, progress)
            .instrument(info_span!("captions"))
            .await?;

        if !captioned {
            self.step_fetch(ctx, progress)
                .instrument(info_span!("fetch"))
                .await?;

            self.step_transcribe(ctx, progress)
                .instrument(info_span!("transcribe"))
                .await?;
        }

        let extractor = match (&self.backends.extractor, ctx.extract) {
            (Some(extractor), true) => Arc::clone(extractor),
            (None, true) => {
                debug!("No extractor configured, finishing with transcript only");
                return self.step_complete(ctx, progress, "Complete (transcript only)");
            }
            (_, false) => {
                return self.step_complete(ctx, progress, "Complete (extraction skipped)");
            }
        };

        self.step_extract(ctx, progress, extractor.as_ref())
            .instrument(info_span!("extract"))
            .await?;

        let message = if ctx.summary_ref.is_some() {
            "Complete"
        } else {
            "Complete (summary unavailable)"
        };
        self.step_complete(ctx, progress, message)
    }

    /// Uses published captions as the transcript when the caption source has
    /// them. Returns false when audio has to be downloaded instead.
    async fn step_captions(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<bool, PipelineError> {
        let Some(source) = self.backends.captions.as_ref() else {
            return Ok(false);
        };
        ctx.check_cancelled()?;
        progress.report(JobUpdate::transition(
            JobStatus::Downloading,
            JobPhase::Download,
            progress::DOWNLOAD_START,
            "Checking for captions...",
        ))?;

        let url = ctx.url.clone();
        let track = match self
            .config
            .retry
            .run("captions", || source.captions(&url))
            .await
        {
            Ok(Some(track)) if track.segments.iter().any(|s| s.end > s.start) => track,
            Ok(_) => {
                info!("No captions available, downloading audio");
                return Ok(false);
            }
            Err(e) => {
                warn!("Caption lookup failed, downloading audio: {}", e);
                ctx.warnings.push(PipelineWarning::CaptionsFailed {
                    error: e.to_string(),
                });
                return Ok(false);
            }
        };
        ctx.check_cancelled()?;

        let CaptionTrack {
            metadata,
            mut segments,
        } = track;
        segments.retain(|s| s.end > s.start);
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        progress.report(
            JobUpdate::progress(
                progress::DOWNLOAD_DONE,
                format!("Found: {}", metadata.title),
            )
            .with_metadata(metadata.clone()),
        )?;
        progress.report(JobUpdate::transition(
            JobStatus::Transcribing,
            JobPhase::Transcribe,
            progress::TRANSCRIBE_START,
            format!("Using captions ({} segments)", segments.len()),
        ))?;

        ctx.metadata = Some(metadata);
        ctx.segments = segments;
        self.write_transcript(ctx, progress).await?;
        Ok(true)
    }

    async fn step_fetch(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        ctx.check_cancelled()?;
        progress.report(JobUpdate::transition(
            JobStatus::Downloading,
            JobPhase::Download,
            progress::DOWNLOAD_START,
            "Downloading audio...",
        ))?;

        let fetched = self
            .backends
            .fetcher
            .fetch(&ctx.url)
            .await
            .map_err(PipelineError::Fetch)?;

        debug!(
            "Fetched '{}' ({})",
            fetched.metadata.title,
            sanitize::format_duration(fetched.metadata.duration_secs)
        );

        let update = JobUpdate::progress(
            progress::DOWNLOAD_DONE,
            format!("Downloaded: {}", fetched.metadata.title),
        )
        .with_metadata(fetched.metadata.clone());
        ctx.metadata = Some(fetched.metadata.clone());
        ctx.fetched = Some(fetched);
        progress.report(update)?;

        Ok(())
    }

    async fn step_transcribe(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        ctx.check_cancelled()?;
        let (audio, metadata) = match ctx.fetched.as_ref() {
            Some(fetched) => (fetched.audio.clone(), fetched.metadata.clone()),
            None => {
                return Err(PipelineError::InvalidInput(
                    "transcription started without downloaded audio".to_string(),
                ))
            }
        };

        progress.report(JobUpdate::transition(
            JobStatus::Transcribing,
            JobPhase::Transcribe,
            progress::TRANSCRIBE_START,
            format!("Transcribing with {}...", self.backends.transcriber.name()),
        ))?;

        let plan = self.plan_for(metadata.duration_secs)?;
        let total = plan.len();
        ctx.chunk_count = total;
        if total > 1 {
            info!(
                "Transcribing {} in {} chunks",
                sanitize::format_duration(metadata.duration_secs),
                total
            );
        }

        let mut chunks = Vec::with_capacity(total);
        for range in plan {
            ctx.check_cancelled()?;
            let time_range = if metadata.duration_secs > 0.0 {
                range.time_range()
            } else {
                TimeRange::full()
            };

            let segments = self
                .config
                .retry
                .run("transcribe", || {
                    self.backends.transcriber.transcribe(&audio, time_range)
                })
                .await
                .map_err(PipelineError::Transcribe)?;

            debug!(
                "Chunk {}/{} produced {} segments",
                range.index + 1,
                total,
                segments.len()
            );
            chunks.push(ChunkSegments { range, segments });

            if total > 1 {
                progress.report(JobUpdate::progress(
                    progress::scaled(
                        progress::TRANSCRIBE_START,
                        progress::TRANSCRIBE_DONE,
                        range.index + 1,
                        total,
                    ),
                    format!("Transcribed chunk {}/{}", range.index + 1, total),
                ))?;
            }
        }

        let overlap = self.config.chunking.overlap;
        ctx.segments = merge_chunk_segments(chunks, overlap);

        self.write_transcript(ctx, progress).await
    }

    async fn write_transcript(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        ctx.check_cancelled()?;
        let metadata = ctx.metadata.clone().unwrap_or_default();
        let body = transcript::format_transcript(&ctx.segments);
        let transcript_ref = self
            .backends
            .writer
            .write(&ctx.job_id, ArtifactKind::Transcript, &metadata, &body)
            .await?;
        ctx.transcript_ref = Some(transcript_ref.clone());

        progress.report(
            JobUpdate::progress(
                progress::TRANSCRIBE_DONE,
                format!("Transcribed {} segments", ctx.segments.len()),
            )
            .with_transcript_ref(transcript_ref),
        )?;

        Ok(())
    }

    /// Chunk plan for a duration. Media without a known duration is
    /// transcribed in one pass.
    fn plan_for(&self, duration: f64) -> Result<Vec<ChunkRange>, PipelineError> {
        if duration > 0.0 {
            self.config.chunking.plan(duration)
        } else {
            Ok(vec![ChunkRange {
                index: 0,
                start: 0.0,
                end: 0.0,
            }])
        }
    }

    /// Extraction failures never fail the job; they only leave the summary out.
    /// Cancellation still ends it.
    async fn step_extract(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
        extractor: &dyn Extractor,
    ) -> Result<(), PipelineError> {
        ctx.check_cancelled()?;
        progress.report(JobUpdate::transition(
            JobStatus::Extracting,
            JobPhase::Extract,
            progress::EXTRACT_START,
            "Generating summary...",
        ))?;

        let metadata = ctx.metadata.clone().unwrap_or_default();
        let text = transcript::full_text(&ctx.segments);

        let on_progress = |done: usize, total: usize| {
            let update = JobUpdate::progress(
                progress::scaled(progress::EXTRACT_START, progress::EXTRACT_DONE, done, total),
                format!("Summarizing ({}/{})", done, total),
            );
            if let Err(e) = progress.report(update) {
                debug!("Extraction progress not recorded: {}", e);
            }
        };

        let summary = self
            .config
            .summarizer
            .summarize(
                &text,
                Some(&metadata),
                extractor,
                &self.config.retry,
                &ctx.cancel,
                &on_progress,
            )
            .await;

        let summary = match summary {
            Ok(summary) => summary,
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                warn!("Extraction failed, keeping transcript only: {}", e);
                ctx.warnings.push(PipelineWarning::ExtractionFailed {
                    error: e.to_string(),
                });
                return Ok(());
            }
        };

        ctx.check_cancelled()?;
        match self.store_summary(ctx, &metadata, &summary).await {
            Ok(summary_ref) => ctx.summary_ref = Some(summary_ref),
            Err(e) => {
                warn!("Summary could not be stored: {}", e);
                ctx.warnings.push(PipelineWarning::SummaryNotStored {
                    error: e.to_string(),
                });
            }
        }

        Ok(())
    }

    async fn store_summary(
        &self,
        ctx: &PipelineContext,
        metadata: &MediaMetadata,
        summary: &str,
    ) -> Result<String, PipelineError> {
        let summary_ref = self
            .backends
            .writer
            .write(&ctx.job_id, ArtifactKind::Summary, metadata, summary)
            .await?;
        Ok(summary_ref)
    }

    fn step_complete(
        &self,
        ctx: &PipelineContext,
        progress: &dyn ProgressReporter,
        message: &str,
    ) -> Result<(), PipelineError> {
        ctx.check_cancelled()?;
        let mut update = JobUpdate::transition(
            JobStatus::Complete,
            JobPhase::Complete,
            progress::COMPLETE,
            message,
        );
        if let Some(summary_ref) = &ctx.summary_ref {
            update = update.with_summary_ref(summary_ref.clone());
        }
        progress.report(update)?;

        info!(
            segments = ctx.segments.len(),
            chunks = ctx.chunk_count,
            summary = ctx.summary_ref.is_some(),
            "Job complete"
        );
        Ok(())
    }

    async fn release_audio(&self, ctx: &mut PipelineContext) {
        let Some(audio) = ctx.fetched.as_ref().map(|f| f.audio.clone()) else {
            return;
        };
        if let Err(e) = self.backends.fetcher.cleanup(&audio).await {
            warn!("Failed to release audio {}: {}", audio_name(&audio), e);
            ctx.warnings.push(PipelineWarning::CleanupFailed {
                error: e.to_string(),
            });
        }
    }
}

fn audio_name(audio: &AudioRef) -> String {
    sanitize::redact_path(std::path::Path::new(&audio.0))
}
