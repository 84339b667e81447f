//! End-to-end tests for the verification pipeline against a scripted registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use veritome_verify::audit::JsonlAuditLog;
use veritome_verify::models::{ExternalRecord, InputFile, ValidatedDocument};
use veritome_verify::pipeline::{DocumentOutcome, Pipeline};
use veritome_verify::sources::citation::format_citation;
use veritome_verify::sources::{BibliographicSource, SearchQuery};
use veritome_verify::store::{discover_inputs, FsDocumentStore, QuarantineReason};

// ── Scripted registry ─────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedRegistry {
    hits: HashMap<String, String>,
    records: HashMap<String, ExternalRecord>,
    searches: AtomicUsize,
    fetches: AtomicUsize,
}

impl ScriptedRegistry {
    fn hit(mut self, query: SearchQuery, record: ExternalRecord) -> Self {
        self.hits.insert(query.to_term(), record.pmid.clone());
        self.records.insert(record.pmid.clone(), record);
        self
    }

    fn calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst) + self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BibliographicSource for ScriptedRegistry {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn search(&self, query: &SearchQuery) -> Option<String> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.hits.get(&query.to_term()).cloned()
    }

    async fn fetch(&self, id: &str) -> Option<ExternalRecord> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.records.get(id).cloned()
    }
}

fn record(pmid: &str, title: &str, doi: Option<&str>, authors: &[&str]) -> ExternalRecord {
    let mut r = ExternalRecord {
        pmid: pmid.to_string(),
        title: title.to_string(),
        doi: doi.map(String::from),
        authors: authors.iter().map(|a| a.to_string()).collect(),
        journal: "J Clin Oncol".to_string(),
        year: "2022".to_string(),
        volume: Some("40".to_string()),
        pages: Some("1-10".to_string()),
        citation: String::new(),
    };
    r.citation = format_citation(&r);
    r
}

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    tmp: TempDir,
    registry: Arc<ScriptedRegistry>,
    pipeline: Pipeline,
}

impl Harness {
    async fn new(registry: ScriptedRegistry) -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("in")).unwrap();
        let registry = Arc::new(registry);
        let store = FsDocumentStore::new(tmp.path().join("out"), tmp.path().join("failed"))
            .await
            .unwrap();
        let audit = JsonlAuditLog::new(tmp.path().join("audit.jsonl")).await.unwrap();
        let pipeline = Pipeline::new(registry.clone(), Arc::new(store)).with_audit(Arc::new(audit));
        Self { tmp, registry, pipeline }
    }

    fn dir(&self, name: &str) -> std::path::PathBuf {
        self.tmp.path().join(name)
    }

    fn input(&self, stem: &str, doc: serde_json::Value) -> InputFile {
        let path = self.dir("in").join(format!("{stem}.json"));
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        InputFile::from_path(path).unwrap()
    }

    fn output(&self, stem: &str) -> ValidatedDocument {
        read_output(&self.dir("out").join(format!("{stem}_final.json")))
    }
}

fn read_output(path: &Path) -> ValidatedDocument {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn doc(text: &str, title: Option<&str>, doi: Option<&str>) -> serde_json::Value {
    serde_json::json!({ "text": text, "metadata": { "title": title, "doi": doi } })
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_doi_match_links_to_resolver() {
    let registry = ScriptedRegistry::default().hit(
        SearchQuery::Doi("10.1200/JCO.22.00001".into()),
        record("35000001", "Registry Title", Some("10.1200/JCO.22.00001"), &["Smith, John"]),
    );
    let h = Harness::new(registry).await;
    let input = h.input("a", doc("Guideline body", Some("Anything"), Some("10.1200/JCO.22.00001")));

    assert_eq!(h.pipeline.process_document(&input).await, DocumentOutcome::Verified);

    let out = h.output("a");
    assert_eq!(out.link, "https://doi.org/10.1200/JCO.22.00001");
    assert_eq!(out.title, "Registry Title");
    assert_eq!(
        out.citation,
        "Smith, John. (2022). Registry Title. J Clin Oncol, 40, 1-10. https://doi.org/10.1200/JCO.22.00001"
    );
    // DOI hit needs one search and one fetch
    assert_eq!(h.registry.calls(), 2);
}

#[tokio::test]
async fn test_strong_title_without_tentative_doi_links_to_registry_page() {
    let registry = ScriptedRegistry::default().hit(
        SearchQuery::Title("Systemic Therapy for Stage IV Lung Cancer".into()),
        record(
            "35000002",
            "Systemic Therapy for Stage III Lung Cancer",
            Some("10.1200/JCO.22.02222"),
            &[],
        ),
    );
    let h = Harness::new(registry).await;
    let input = h.input("b", doc("Body", Some("Systemic Therapy for Stage IV Lung Cancer"), None));

    assert_eq!(h.pipeline.process_document(&input).await, DocumentOutcome::Verified);

    let out = h.output("b");
    assert_eq!(out.link, "https://pubmed.ncbi.nlm.nih.gov/35000002");
    assert!(!out.link.contains("doi.org"));
    assert_eq!(out.title, "Systemic Therapy for Stage III Lung Cancer");
}

#[tokio::test]
async fn test_no_candidate_produces_fallback_record() {
    let h = Harness::new(ScriptedRegistry::default()).await;
    let input = h.input("c", doc("Nancy Davidson\nBody", Some("Obscure Guideline: Summary"), None));

    assert_eq!(h.pipeline.process_document(&input).await, DocumentOutcome::Fallback);

    let out = h.output("c");
    assert_eq!(out.title, "Obscure Guideline: Summary (unverified)");
    assert_eq!(
        out.citation,
        "ASCO Guideline. Obscure Guideline: Summary. (Data extracted from text, unverified in PubMed)."
    );
    assert_eq!(out.link, "https://asco.org");
    // two variants × (exact + loose) + title/author, no fetch
    assert_eq!(h.registry.searches.load(Ordering::SeqCst), 5);
    assert_eq!(h.registry.fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_corpus_is_quarantined_without_registry_calls() {
    let h = Harness::new(ScriptedRegistry::default()).await;
    let input = h.input("d", doc("", Some("Some Title"), Some("10.1/x")));

    assert_eq!(
        h.pipeline.process_document(&input).await,
        DocumentOutcome::Quarantined(QuarantineReason::EmptyCorpus)
    );
    assert_eq!(h.registry.calls(), 0);
    assert!(!input.path.exists());
    assert!(h.dir("failed").join("d.json").exists());
    assert!(!h.dir("out").join("d_final.json").exists());

    let note: serde_json::Value =
        serde_json::from_slice(&std::fs::read(h.dir("failed").join("d.reason.json")).unwrap()).unwrap();
    assert_eq!(note["reason"], "Empty corpus");
}

// ── Invariants ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_doi_conflict_is_never_verified() {
    let title = "Adjuvant Endocrine Therapy for Breast Cancer";
    let registry = ScriptedRegistry::default().hit(
        SearchQuery::Doi("10.1200/JCO.22.00001".into()),
        record("35000003", title, Some("10.1200/JCO.19.99999"), &["Burstein, Harold"]),
    );
    let h = Harness::new(registry).await;
    let input = h.input(
        "conflict",
        doc("Harold Burstein\nBody", Some(title), Some("10.1200/JCO.22.00001")),
    );

    assert_eq!(h.pipeline.process_document(&input).await, DocumentOutcome::Fallback);

    let out = h.output("conflict");
    assert_eq!(out.link, "https://asco.org");
    assert!(!out.link.contains("10.1200/JCO.19.99999"));
    assert!(!out.citation.contains("10.1200/JCO.19.99999"));
    assert!(out.title.ends_with("(unverified)"));
}

#[tokio::test]
async fn test_corpus_preserved_in_both_paths() {
    let text = "  Übersicht — Leitlinie\r\n\tWith trailing space \n\n";
    let registry = ScriptedRegistry::default().hit(
        SearchQuery::Doi("10.1/verified".into()),
        record("1", "Verified", Some("10.1/verified"), &[]),
    );
    let h = Harness::new(registry).await;
    let verified = h.input("v", doc(text, None, Some("10.1/verified")));
    let fallback = h.input("f", doc(text, Some("Unknown Thing"), None));

    assert_eq!(h.pipeline.process_document(&verified).await, DocumentOutcome::Verified);
    assert_eq!(h.pipeline.process_document(&fallback).await, DocumentOutcome::Fallback);

    assert_eq!(h.output("v").corpus, text);
    assert_eq!(h.output("f").corpus, text);
}

#[tokio::test]
async fn test_invalid_json_is_quarantined_and_run_continues() {
    let h = Harness::new(ScriptedRegistry::default()).await;
    std::fs::write(h.dir("in").join("bad.json"), "{ nope").unwrap();
    h.input("good", doc("Body", Some("Title"), None));

    let inputs = discover_inputs(&h.dir("in")).await.unwrap();
    let report = h.pipeline.run(&inputs).await;

    assert_eq!(report.total, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.fallback, 1);
    assert!(h.dir("failed").join("bad.json").exists());

    let note: serde_json::Value =
        serde_json::from_slice(&std::fs::read(h.dir("failed").join("bad.reason.json")).unwrap()).unwrap();
    assert!(note["reason"].as_str().unwrap().starts_with("Processing error: "));
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let registry = ScriptedRegistry::default().hit(
        SearchQuery::Doi("10.1/one".into()),
        record("11", "One", Some("10.1/one"), &[]),
    );
    let h = Harness::new(registry).await;
    h.input("one", doc("Body one", None, Some("10.1/one")));
    h.input("two", doc("Body two", Some("Two"), None));
    h.input("three", doc("", None, None));

    let inputs = discover_inputs(&h.dir("in")).await.unwrap();
    let first = h.pipeline.run(&inputs).await;
    assert_eq!(first.total, 3);
    assert_eq!(first.verified, 1);
    assert_eq!(first.fallback, 1);
    assert_eq!(first.failed, 1);
    assert_eq!(first.skipped, 0);

    let before_one = std::fs::read(h.dir("out").join("one_final.json")).unwrap();
    let before_two = std::fs::read(h.dir("out").join("two_final.json")).unwrap();
    let calls = h.registry.calls();

    // the quarantined input has left the input directory
    let inputs = discover_inputs(&h.dir("in")).await.unwrap();
    let second = h.pipeline.run(&inputs).await;
    assert_eq!(second.total, 2);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.processed, 0);
    assert_eq!(second.failed, 0);

    assert_eq!(h.registry.calls(), calls);
    assert_eq!(std::fs::read(h.dir("out").join("one_final.json")).unwrap(), before_one);
    assert_eq!(std::fs::read(h.dir("out").join("two_final.json")).unwrap(), before_two);
    assert_eq!(std::fs::read_dir(h.dir("out")).unwrap().count(), 2);
}

#[tokio::test]
async fn test_audit_log_records_every_document() {
    let registry = ScriptedRegistry::default().hit(
        SearchQuery::Doi("10.1/one".into()),
        record("11", "One", Some("10.1/one"), &[]),
    );
    let h = Harness::new(registry).await;
    h.input("one", doc("Body", None, Some("10.1/one")));
    h.input("two", doc("", None, None));

    let inputs = discover_inputs(&h.dir("in")).await.unwrap();
    h.pipeline.run(&inputs).await;

    let raw = std::fs::read_to_string(h.dir("audit.jsonl")).unwrap();
    let entries: Vec<serde_json::Value> = raw.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0]["document"], "one");
    assert_eq!(entries[0]["outcome"], "verified");
    assert_eq!(entries[0]["rule"], "doi_match");
    assert_eq!(entries[0]["matched_by"]["step"], "doi");
    assert_eq!(entries[0]["pmid"], "11");

    assert_eq!(entries[1]["document"], "two");
    assert_eq!(entries[1]["outcome"], "quarantined");
    assert_eq!(entries[1]["reason"], "Empty corpus");
}
