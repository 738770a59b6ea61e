//! Test harness wiring a `JobManager` to fake backends.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use vidscribe::backend::{ArtifactWriter, CaptionSource, Extractor};
use vidscribe::config::Config;
use vidscribe::job::{Job, JobId};
use vidscribe::worker::{JobManager, ManagerBackends};

use super::fakes::{
    FakeCaptions, FakeFetcher, MemoryWriter, ScriptedExtractor, ScriptedTranscriber,
};

/// Isolated manager with fakes the test can inspect afterwards.
pub struct TestHarness {
    /// Output directory; only used when the harness writes real files.
    pub temp_dir: TempDir,
    pub captions: Option<Arc<FakeCaptions>>,
    pub fetcher: Arc<FakeFetcher>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub extractor: Option<Arc<ScriptedExtractor>>,
    pub writer: Arc<MemoryWriter>,
    pub manager: JobManager,
}

/// Config with instant retries and the default chunk layout.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.base_delay_ms = 0;
    config.retry.max_delay_ms = 0;
    config.jobs.max_concurrent_jobs = 4;
    config
}

impl TestHarness {
    pub fn new(
        fetcher: FakeFetcher,
        transcriber: ScriptedTranscriber,
        extractor: Option<ScriptedExtractor>,
    ) -> Self {
        Self::with_writer(fetcher, transcriber, extractor, MemoryWriter::default())
    }

    pub fn with_writer(
        fetcher: FakeFetcher,
        transcriber: ScriptedTranscriber,
        extractor: Option<ScriptedExtractor>,
        writer: MemoryWriter,
    ) -> Self {
        Self::with_config(test_config(), None, fetcher, transcriber, extractor, writer)
    }

    pub fn with_config(
        mut config: Config,
        captions: Option<FakeCaptions>,
        fetcher: FakeFetcher,
        transcriber: ScriptedTranscriber,
        extractor: Option<ScriptedExtractor>,
        writer: MemoryWriter,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        config.output_directory = temp_dir.path().to_string_lossy().into_owned();

        let captions = captions.map(Arc::new);
        let fetcher = Arc::new(fetcher);
        let transcriber = Arc::new(transcriber);
        let extractor = extractor.map(Arc::new);
        let writer = Arc::new(writer);

        let manager = JobManager::from_config(
            &config,
            ManagerBackends {
                captions: captions.clone().map(|c| c as Arc<dyn CaptionSource>),
                fetcher: fetcher.clone(),
                transcriber: transcriber.clone(),
                extractor: extractor.clone().map(|e| e as Arc<dyn Extractor>),
                writer: Some(writer.clone() as Arc<dyn ArtifactWriter>),
            },
        );

        Self {
            temp_dir,
            captions,
            fetcher,
            transcriber,
            extractor,
            writer,
            manager,
        }
    }

    /// Waits for a job to finish, failing the test after ten seconds.
    pub async fn finish(&self, id: &JobId) -> Job {
        tokio::time::timeout(Duration::from_secs(10), self.manager.wait_for(id))
            .await
            .expect("job did not finish in time")
            .expect("job disappeared")
    }
}
