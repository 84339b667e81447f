//! Search strategy orchestration.
//!
//! Queries are tried in a fixed order and the first identifier returned wins:
//!   1. exact DOI (when the extractor found one)
//!   2. for each title variant: exact title, then loose
//!   3. first title variant + first author token, loose
//!
//! Only the registry's top-ranked hit is considered; there is no secondary
//! disambiguation between candidates.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::forensic::AuthorTokens;
use crate::models::{ExternalRecord, IntermediateDocument};
use crate::normalise::{bare_doi, strip_summary_suffix};
use crate::sources::{BibliographicSource, SearchQuery};

/// Which step of the strategy produced the candidate, with the text it searched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "query", rename_all = "snake_case")]
pub enum MatchedBy {
    Doi,
    TitleExact(String),
    TitleLoose(String),
    TitleAuthor(String),
}

impl MatchedBy {
    pub fn step(&self) -> &'static str {
        match self {
            MatchedBy::Doi            => "doi",
            MatchedBy::TitleExact(_)  => "title_exact",
            MatchedBy::TitleLoose(_)  => "title_loose",
            MatchedBy::TitleAuthor(_) => "title_author",
        }
    }
}

impl fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedBy::Doi => f.write_str("doi"),
            MatchedBy::TitleExact(q) | MatchedBy::TitleLoose(q) | MatchedBy::TitleAuthor(q) => {
                write!(f, "{} '{}'", self.step(), q)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    pub matched_by: MatchedBy,
    pub query: SearchQuery,
}

/// Identifier accepted as the candidate match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub pmid: String,
    pub matched_by: MatchedBy,
}

/// Outcome of running the strategy for one document.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub candidate: Option<Candidate>,
    pub record: Option<ExternalRecord>,
    /// Number of search calls issued.
    pub attempts: usize,
}

/// Title variants in priority order: raw, "summary" stripped, text before the first colon.
pub fn title_variants(title: &str) -> Vec<String> {
    let base = title.trim();
    if base.is_empty() {
        return Vec::new();
    }

    let mut variants = vec![base.to_string()];
    if let Some(stripped) = strip_summary_suffix(base) {
        variants.push(stripped);
    }
    if let Some((head, _)) = base.split_once(':') {
        let head = head.trim();
        if !head.is_empty() && head != base {
            variants.push(head.to_string());
        }
    }

    let mut unique: Vec<String> = Vec::with_capacity(variants.len());
    for v in variants {
        if !unique.contains(&v) {
            unique.push(v);
        }
    }
    unique
}

/// Ordered list of queries the strategy will try for a document.
pub fn plan(doc: &IntermediateDocument, tokens: &AuthorTokens) -> Vec<PlannedQuery> {
    let mut queries = Vec::new();

    if let Some(doi) = doc.tentative_doi().map(bare_doi).filter(|d| !d.is_empty()) {
        queries.push(PlannedQuery {
            matched_by: MatchedBy::Doi,
            query: SearchQuery::Doi(doi),
        });
    }

    let variants = doc.tentative_title().map(title_variants).unwrap_or_default();
    for variant in &variants {
        queries.push(PlannedQuery {
            matched_by: MatchedBy::TitleExact(variant.clone()),
            query: SearchQuery::Title(variant.clone()),
        });
        queries.push(PlannedQuery {
            matched_by: MatchedBy::TitleLoose(variant.clone()),
            query: SearchQuery::Loose(variant.clone()),
        });
    }

    if let (Some(first_variant), Some(first_token)) = (variants.first(), tokens.first()) {
        let combined = format!("{first_variant} {first_token}");
        queries.push(PlannedQuery {
            matched_by: MatchedBy::TitleAuthor(combined.clone()),
            query: SearchQuery::Loose(combined),
        });
    }

    queries
}

/// Runs the query plan against a registry.
#[derive(Clone)]
pub struct SearchStrategy {
    source: Arc<dyn BibliographicSource>,
}

impl SearchStrategy {
    pub fn new(source: Arc<dyn BibliographicSource>) -> Self {
        Self { source }
    }

    /// Find a candidate identifier and fetch its record once.
    #[instrument(skip_all)]
    pub async fn resolve(&self, doc: &IntermediateDocument, tokens: &AuthorTokens) -> Resolution {
        let mut resolution = Resolution::default();

        for planned in plan(doc, tokens) {
            resolution.attempts += 1;
            debug!(step = planned.matched_by.step(), term = %planned.query, "searching registry");

            if let Some(pmid) = self.source.search(&planned.query).await {
                info!(matched_by = %planned.matched_by, %pmid, source = self.source.name(), "candidate found");
                resolution.candidate = Some(Candidate { pmid, matched_by: planned.matched_by });
                break;
            }
        }

        if let Some(candidate) = &resolution.candidate {
            resolution.record = self.source.fetch(&candidate.pmid).await;
            if resolution.record.is_none() {
                warn!(pmid = %candidate.pmid, "could not fetch record for candidate");
            }
        }

        resolution
    }
}
