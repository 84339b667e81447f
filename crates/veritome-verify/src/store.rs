//! Checkpoint, output and quarantine storage.
//!
//! The "already processed" predicate is a trait so resume logic does not care
//! where checkpoints live. The filesystem store treats the existence of a
//! document's output file as its checkpoint.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};
use veritome_common::{Result, VeritomeError};

use crate::models::{DocumentKey, InputFile, ValidatedDocument};

/// Why a document was taken out of normal processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum QuarantineReason {
    EmptyCorpus,
    Validation(String),
    Processing(String),
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarantineReason::EmptyCorpus => f.write_str("Empty corpus"),
            QuarantineReason::Validation(d) => write!(f, "Validation error: {d}"),
            QuarantineReason::Processing(d) => write!(f, "Processing error: {d}"),
        }
    }
}

impl From<&VeritomeError> for QuarantineReason {
    fn from(err: &VeritomeError) -> Self {
        match err {
            VeritomeError::Schema(detail) => QuarantineReason::Validation(detail.clone()),
            other => QuarantineReason::Processing(other.to_string()),
        }
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Whether a finished artifact already exists for this document.
    async fn is_processed(&self, key: &DocumentKey) -> Result<bool>;
}

#[async_trait]
pub trait DocumentStore: CheckpointStore {
    /// Persist a validated record; returns where it was written.
    async fn write_output(&self, key: &DocumentKey, doc: &ValidatedDocument) -> Result<PathBuf>;

    /// Move an input out of the way with a recorded reason; returns its new location.
    async fn quarantine(&self, input: &InputFile, reason: &QuarantineReason) -> Result<PathBuf>;
}

#[derive(Debug, Serialize)]
struct QuarantineNote {
    file: String,
    reason: String,
    quarantined_at: DateTime<Utc>,
}

/// Output and quarantine directories on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    output_dir: PathBuf,
    failed_dir: PathBuf,
}

impl FsDocumentStore {
    /// Creates both directories if they do not exist yet.
    pub async fn new(output_dir: impl Into<PathBuf>, failed_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        let failed_dir = failed_dir.into();
        tokio::fs::create_dir_all(&output_dir).await?;
        tokio::fs::create_dir_all(&failed_dir).await?;
        Ok(Self { output_dir, failed_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn failed_dir(&self) -> &Path {
        &self.failed_dir
    }

    pub fn output_path(&self, key: &DocumentKey) -> PathBuf {
        self.output_dir.join(key.output_file_name())
    }
}

#[async_trait]
impl CheckpointStore for FsDocumentStore {
    async fn is_processed(&self, key: &DocumentKey) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.output_path(key)).await?)
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn write_output(&self, key: &DocumentKey, doc: &ValidatedDocument) -> Result<PathBuf> {
        let path = self.output_path(key);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(doc)?;

        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), "output written");
        Ok(path)
    }

    async fn quarantine(&self, input: &InputFile, reason: &QuarantineReason) -> Result<PathBuf> {
        let file_name = input.file_name();
        let target = self.failed_dir.join(&file_name);

        move_file(&input.path, &target).await?;

        let note = QuarantineNote {
            file: file_name,
            reason: reason.to_string(),
            quarantined_at: Utc::now(),
        };
        let note_path = self.failed_dir.join(format!("{}.reason.json", input.key));
        tokio::fs::write(&note_path, serde_json::to_vec_pretty(&note)?).await?;

        error!(document = %input.key, %reason, target = %target.display(), "document quarantined");
        Ok(target)
    }
}

/// Rename, falling back to copy + delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}

/// `*.json` inputs in `dir`, sorted by file name.
pub async fn discover_inputs(dir: &Path) -> Result<Vec<InputFile>> {
    if !tokio::fs::try_exists(dir).await? {
        return Err(VeritomeError::Config(format!(
            "input directory {} does not exist",
            dir.display()
        )));
    }

    let mut inputs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if !is_json || !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(input) = InputFile::from_path(&path) {
            inputs.push(input);
        }
    }
    inputs.sort_by(|a, b| a.path.cmp(&b.path));

    info!(dir = %dir.display(), count = inputs.len(), "discovered input documents");
    Ok(inputs)
}
