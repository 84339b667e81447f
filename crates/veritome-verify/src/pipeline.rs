//! End-to-end verification pipeline.
//!
//! For each intermediate document:
//!   1. Skip it if a checkpoint already exists
//!   2. Load it; quarantine on unreadable input or empty text
//!   3. Extract author tokens from the header lines
//!   4. Run the search strategy and fetch the candidate record
//!   5. Ask the gatekeeper whether the record may be trusted
//!   6. Assemble and validate the output record
//!   7. Persist it and append an audit entry
//!
//! Documents are processed one at a time so registry calls never outrun the
//! rate limiter. A failure inside one document quarantines that document and
//! the run carries on.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};
use veritome_common::VeritomeError;

use crate::assembler::Assembler;
use crate::audit::{AuditEntry, AuditSink, NullAudit};
use crate::forensic::AuthorTokens;
use crate::gatekeeper::{Gatekeeper, MatchDecision};
use crate::models::{InputFile, IntermediateDocument, ValidatedDocument};
use crate::sources::BibliographicSource;
use crate::store::{DocumentStore, QuarantineReason};
use crate::strategy::{Candidate, SearchStrategy};

// ── Progress events ───────────────────────────────────────────────────────────

/// Progress event emitted while a document moves through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationProgress {
    pub document: String,
    pub stage: String,
    pub message: String,
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Verified,
    Fallback,
    Quarantined(QuarantineReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub total: usize,
    /// Documents that produced an output record (verified + fallback).
    pub processed: usize,
    pub verified: usize,
    pub fallback: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

struct Processed {
    output: ValidatedDocument,
    candidate: Option<Candidate>,
    decision: MatchDecision,
}

// ── Pipeline orchestrator ─────────────────────────────────────────────────────

pub struct Pipeline {
    source: Arc<dyn BibliographicSource>,
    store: Arc<dyn DocumentStore>,
    strategy: SearchStrategy,
    gatekeeper: Gatekeeper,
    assembler: Assembler,
    audit: Arc<dyn AuditSink>,
    progress_tx: Option<broadcast::Sender<VerificationProgress>>,
}

impl Pipeline {
    /// Pipeline with default trust thresholds, fallback policy and no audit log.
    pub fn new(source: Arc<dyn BibliographicSource>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            strategy: SearchStrategy::new(source.clone()),
            source,
            store,
            gatekeeper: Gatekeeper::default(),
            assembler: Assembler::default(),
            audit: Arc::new(NullAudit),
            progress_tx: None,
        }
    }

    pub fn with_gatekeeper(mut self, gatekeeper: Gatekeeper) -> Self {
        self.gatekeeper = gatekeeper;
        self
    }

    pub fn with_assembler(mut self, assembler: Assembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_progress(mut self, tx: broadcast::Sender<VerificationProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    fn emit(&self, input: &InputFile, stage: &str, message: impl Into<String>) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(VerificationProgress {
                document: input.key.to_string(),
                stage: stage.to_string(),
                message: message.into(),
            });
        }
    }

    /// Process every input in order, skipping those already checkpointed.
    #[instrument(skip_all, fields(total = inputs.len()))]
    pub async fn run(&self, inputs: &[InputFile]) -> RunReport {
        let t0 = Instant::now();
        let mut report = RunReport { total: inputs.len(), ..RunReport::default() };
        info!(source = self.source.name(), "Starting verification run");

        for input in inputs {
            match self.store.is_processed(&input.key).await {
                Ok(true) => {
                    info!(document = %input.key, "Already processed, skipping");
                    self.emit(input, "skip", "output already exists");
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => warn!(document = %input.key, error = %e, "Checkpoint check failed, processing anyway"),
            }

            match self.process_document(input).await {
                DocumentOutcome::Verified => report.verified += 1,
                DocumentOutcome::Fallback => report.fallback += 1,
                DocumentOutcome::Quarantined(_) => report.failed += 1,
            }
        }

        report.processed = report.verified + report.fallback;
        report.duration_ms = t0.elapsed().as_millis() as u64;

        info!(
            total       = report.total,
            processed   = report.processed,
            verified    = report.verified,
            fallback    = report.fallback,
            skipped     = report.skipped,
            failed      = report.failed,
            duration_ms = report.duration_ms,
            "Verification run complete"
        );
        report
    }

    /// Verify one document. Never fails: problems end in quarantine.
    #[instrument(skip(self), fields(document = %input.key))]
    pub async fn process_document(&self, input: &InputFile) -> DocumentOutcome {
        let t0 = Instant::now();
        self.emit(input, "load", format!("loading {}", input.file_name()));

        match self.verify(input).await {
            Ok(done) => {
                let duration_ms = t0.elapsed().as_millis() as u64;
                let outcome = if done.decision.verified {
                    DocumentOutcome::Verified
                } else {
                    DocumentOutcome::Fallback
                };
                info!(
                    verified = done.decision.verified,
                    rule = %done.decision.rule,
                    link = %done.output.link,
                    duration_ms,
                    "Document saved"
                );
                self.emit(input, "done", format!("{:?}", outcome));

                let candidate = done.candidate;
                let entry = AuditEntry::decided(
                    &input.key,
                    candidate.as_ref().map(|c| c.matched_by.clone()),
                    candidate.map(|c| c.pmid),
                    &done.decision,
                    &done.output.link,
                    &done.output.corpus,
                    duration_ms,
                );
                self.record_audit(&entry).await;
                outcome
            }
            Err(reason) => {
                if let Err(e) = self.store.quarantine(input, &reason).await {
                    error!(error = %e, %reason, "Failed to quarantine document");
                }
                self.emit(input, "quarantine", reason.to_string());

                let duration_ms = t0.elapsed().as_millis() as u64;
                self.record_audit(&AuditEntry::quarantined(&input.key, &reason.to_string(), duration_ms))
                    .await;
                DocumentOutcome::Quarantined(reason)
            }
        }
    }

    async fn verify(&self, input: &InputFile) -> Result<Processed, QuarantineReason> {
        let doc = load_document(input).await.map_err(|e| QuarantineReason::from(&e))?;
        if doc.text.is_empty() {
            return Err(QuarantineReason::EmptyCorpus);
        }

        let tokens = AuthorTokens::from_text(&doc.text);
        self.emit(input, "search", format!("{} author tokens", tokens.len()));

        let resolution = self.strategy.resolve(&doc, &tokens).await;
        let decision = self.gatekeeper.evaluate(&doc, &tokens, resolution.record.as_ref());
        log_decision(resolution.candidate.as_ref(), resolution.record.is_some(), &decision, resolution.attempts);
        self.emit(input, "decide", decision.rule.to_string());

        let output = self
            .assembler
            .assemble(&doc, resolution.record.as_ref(), &decision)
            .map_err(|e| QuarantineReason::from(&e))?;

        self.store
            .write_output(&input.key, &output)
            .await
            .map_err(|e| QuarantineReason::from(&e))?;

        Ok(Processed {
            output,
            candidate: resolution.candidate,
            decision,
        })
    }

    async fn record_audit(&self, entry: &AuditEntry) {
        if let Err(e) = self.audit.record(entry).await {
            warn!(error = %e, "Failed to write audit entry");
        }
    }
}

async fn load_document(input: &InputFile) -> Result<IntermediateDocument, VeritomeError> {
    let raw = tokio::fs::read(&input.path).await?;
    Ok(serde_json::from_slice(&raw)?)
}

fn log_decision(candidate: Option<&Candidate>, fetched: bool, decision: &MatchDecision, attempts: usize) {
    match candidate {
        _ if decision.verified => {}
        None => warn!(attempts, "No candidate found, using fallback record"),
        Some(c) if !fetched => warn!(pmid = %c.pmid, "Candidate record unavailable, using fallback record"),
        Some(c) => warn!(
            pmid = %c.pmid,
            similarity = decision.similarity,
            rule = %decision.rule,
            "Candidate rejected, using fallback record"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExternalRecord;
    use crate::sources::SearchQuery;
    use crate::store::FsDocumentStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct EmptyRegistry {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BibliographicSource for EmptyRegistry {
        fn name(&self) -> &'static str {
            "empty"
        }

        async fn search(&self, _query: &SearchQuery) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            None
        }

        async fn fetch(&self, _id: &str) -> Option<ExternalRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    async fn setup(tmp: &TempDir) -> (Arc<EmptyRegistry>, Pipeline) {
        let registry = Arc::new(EmptyRegistry::default());
        let store = FsDocumentStore::new(tmp.path().join("out"), tmp.path().join("failed"))
            .await
            .unwrap();
        let pipeline = Pipeline::new(registry.clone(), Arc::new(store));
        (registry, pipeline)
    }

    fn write_input(tmp: &TempDir, name: &str, body: &str) -> InputFile {
        let path = tmp.path().join(name);
        std::fs::write(&path, body).unwrap();
        InputFile::from_path(path).unwrap()
    }

    #[tokio::test]
    async fn test_unparseable_input_is_quarantined() {
        let tmp = TempDir::new().unwrap();
        let (registry, pipeline) = setup(&tmp).await;
        let input = write_input(&tmp, "broken.json", "{ not json");

        let outcome = pipeline.process_document(&input).await;
        assert!(matches!(outcome, DocumentOutcome::Quarantined(QuarantineReason::Processing(_))));
        assert!(tmp.path().join("failed").join("broken.json").exists());
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_progress_events_emitted() {
        let tmp = TempDir::new().unwrap();
        let (tx, mut rx) = broadcast::channel(16);
        let (_, pipeline) = setup(&tmp).await;
        let pipeline = pipeline.with_progress(tx);
        let input = write_input(&tmp, "doc.json", r#"{"text": "body", "metadata": {"title": "T"}}"#);

        let outcome = pipeline.process_document(&input).await;
        assert_eq!(outcome, DocumentOutcome::Fallback);

        let mut stages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.document, "doc");
            stages.push(event.stage);
        }
        assert_eq!(stages, vec!["load", "search", "decide", "done"]);
    }

    #[tokio::test]
    async fn test_run_report_counts() {
        let tmp = TempDir::new().unwrap();
        let (_, pipeline) = setup(&tmp).await;
        let inputs = vec![
            write_input(&tmp, "a.json", r#"{"text": "body a", "metadata": {"title": "A"}}"#),
            write_input(&tmp, "b.json", r#"{"text": "", "metadata": {}}"#),
        ];

        let report = pipeline.run(&inputs).await;
        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 1);
        assert_eq!(report.fallback, 1);
        assert_eq!(report.verified, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 0);
    }
}
