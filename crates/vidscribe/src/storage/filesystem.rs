use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::backend::{ArtifactKind, ArtifactWriter};
use crate::error::StorageError;
use crate::job::{JobId, MediaMetadata};
use crate::sanitize::{self, MAX_SLUG_BYTES};

use super::format;

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes artifacts as markdown files below an output directory:
/// `transcripts/<date> <slug>-transcript.md` and
/// `summaries/<date> <slug>-summary.md`.
pub struct FileStorage {
    output_directory: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(output_directory: P) -> Self {
        Self {
            output_directory: output_directory.as_ref().to_path_buf(),
        }
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Stores `content` as `<relative_directory>/<filename>.<extension>`,
    /// never overwriting an existing file.
    pub async fn store(
        &self,
        content: &[u8],
        relative_directory: &str,
        filename: &str,
        extension: &str,
    ) -> Result<PathBuf, StorageError> {
        let dir_path = self.output_directory.join(relative_directory);
        ensure_directory(&dir_path).await?;

        create_unique(&dir_path, filename, extension, content).await
    }
}

#[async_trait]
impl ArtifactWriter for FileStorage {
    async fn write(
        &self,
        job_id: &JobId,
        kind: ArtifactKind,
        metadata: &MediaMetadata,
        body: &str,
    ) -> Result<String, StorageError> {
        let (directory, document) = match kind {
            ArtifactKind::Transcript => ("transcripts", format::transcript_document(metadata, body)),
            ArtifactKind::Summary => ("summaries", format::summary_document(metadata, body)),
        };
        let filename = format!(
            "{} {}-{}",
            format::document_date(metadata).format("%Y-%m-%d"),
            sanitize::slugify(&metadata.title, MAX_SLUG_BYTES),
            kind
        );

        let path = self
            .store(document.as_bytes(), directory, &filename, "md")
            .await?;
        log::info!(
            "Saved {} for job {}: {}",
            kind,
            job_id,
            sanitize::redact_path(&path)
        );

        Ok(path.to_string_lossy().into_owned())
    }

    /// Only paths inside the output directory are readable.
    async fn read(&self, reference: &str) -> Result<String, StorageError> {
        let path = Path::new(reference);
        let escapes = path.components().any(|c| c == Component::ParentDir);
        if escapes || !path.starts_with(&self.output_directory) {
            return Err(StorageError::NotFound(reference.to_string()));
        }

        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(reference.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }
}

async fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Creates the file with `create_new` so concurrent jobs with the same title
/// never clobber each other; taken names get a `_2`, `_3`, ... suffix.
async fn create_unique(
    dir_path: &Path,
    base: &str,
    extension: &str,
    content: &[u8],
) -> Result<PathBuf, StorageError> {
    for counter in 1..=MAX_NAME_ATTEMPTS {
        let try_filename = if counter == 1 {
            format!("{}.{}", base, extension)
        } else {
            format!("{}_{}.{}", base, counter, extension)
        };
        let try_path = dir_path.join(&try_filename);

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&try_path)
            .await
        {
            Ok(file) => {
                write_or_discard(file, &try_path, content).await?;
                return Ok(try_path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(StorageError::WriteFile {
                    path: try_path,
                    source: e,
                });
            }
        }
    }

    Err(StorageError::NameConflict(
        dir_path.join(format!("{}.{}", base, extension)),
    ))
}

/// Writes `content` into a file just created at `path`. On failure the file
/// is removed so the name is free for the next attempt.
async fn write_or_discard<W: AsyncWrite + Unpin>(
    mut file: W,
    path: &Path,
    content: &[u8],
) -> Result<(), StorageError> {
    let written = async {
        file.write_all(content).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(file);
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            log::warn!(
                "Could not remove partial file {}: {}",
                sanitize::redact_path(path),
                remove_err
            );
        }
        return Err(StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}
