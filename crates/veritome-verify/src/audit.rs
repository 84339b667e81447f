//! Per-document audit trail.
//!
//! Every processed or quarantined document gets one entry recording which
//! search step matched, which trust rule decided, and what was linked.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;
use veritome_common::Result;

use crate::gatekeeper::{MatchDecision, RuleId};
use crate::models::DocumentKey;
use crate::strategy::MatchedBy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Verified,
    Fallback,
    Quarantined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub document: String,
    pub outcome: AuditOutcome,
    pub matched_by: Option<MatchedBy>,
    pub pmid: Option<String>,
    pub similarity: Option<f64>,
    pub rule: Option<RuleId>,
    pub link: Option<String>,
    /// Quarantine reason, when quarantined.
    pub reason: Option<String>,
    pub corpus_sha256: Option<String>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    fn base(document: &DocumentKey, outcome: AuditOutcome, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: document.to_string(),
            outcome,
            matched_by: None,
            pmid: None,
            similarity: None,
            rule: None,
            link: None,
            reason: None,
            corpus_sha256: None,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }

    /// Entry for a document that produced an output record.
    pub fn decided(
        document: &DocumentKey,
        matched_by: Option<MatchedBy>,
        pmid: Option<String>,
        decision: &MatchDecision,
        link: &str,
        corpus: &str,
        duration_ms: u64,
    ) -> Self {
        let outcome = if decision.verified { AuditOutcome::Verified } else { AuditOutcome::Fallback };
        Self {
            matched_by,
            pmid,
            similarity: Some(decision.similarity),
            rule: Some(decision.rule),
            link: Some(link.to_string()),
            corpus_sha256: Some(sha256_hex(corpus)),
            ..Self::base(document, outcome, duration_ms)
        }
    }

    pub fn quarantined(document: &DocumentKey, reason: &str, duration_ms: u64) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::base(document, AuditOutcome::Quarantined, duration_ms)
        }
    }
}

pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<()>;
}

/// Discards entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudit;

#[async_trait]
impl AuditSink for NullAudit {
    async fn record(&self, _entry: &AuditEntry) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlAuditLog {
    /// Creates the parent directory if needed. The file is created on first write.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self { path, lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditLog {
    async fn record(&self, entry: &AuditEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
