//! Match validation.
//!
//! Decides whether a fetched registry record may be trusted for a document,
//! and whether its DOI may be surfaced. Rules are plain data: an ordered list
//! of `(predicate, outcome)` pairs evaluated top-down, first hit wins.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::forensic::AuthorTokens;
use crate::models::{ExternalRecord, IntermediateDocument};
use crate::normalise::{clean_doi, dois_match, normalize_title, similarity};

pub const DEFAULT_STRONG_TITLE: f64 = 0.92;
pub const DEFAULT_CORROBORATED_TITLE: f64 = 0.85;

/// Similarity cut-offs for the title rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Title similarity sufficient on its own.
    pub strong_title: f64,
    /// Title similarity sufficient when author tokens also overlap.
    pub corroborated_title: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            strong_title: DEFAULT_STRONG_TITLE,
            corroborated_title: DEFAULT_CORROBORATED_TITLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    DoiMatch,
    DoiConflict,
    StrongTitle,
    CorroboratedTitle,
    NoMatch,
    NoCandidate,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::DoiMatch          => "doi_match",
            RuleId::DoiConflict       => "doi_conflict",
            RuleId::StrongTitle       => "strong_title",
            RuleId::CorroboratedTitle => "corroborated_title",
            RuleId::NoMatch           => "no_match",
            RuleId::NoCandidate       => "no_candidate",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a rule may look at.
#[derive(Debug, Clone)]
pub struct MatchContext<'a> {
    pub tentative_title: Option<&'a str>,
    pub tentative_doi: Option<&'a str>,
    pub local_tokens: &'a AuthorTokens,
    pub record: &'a ExternalRecord,
    pub thresholds: Thresholds,
    /// Normalised-title similarity, computed once.
    pub similarity: f64,
}

impl<'a> MatchContext<'a> {
    pub fn new(
        doc: &'a IntermediateDocument,
        local_tokens: &'a AuthorTokens,
        record: &'a ExternalRecord,
        thresholds: Thresholds,
    ) -> Self {
        let tentative_title = doc.tentative_title();
        Self {
            tentative_title,
            tentative_doi: doc.tentative_doi(),
            local_tokens,
            record,
            thresholds,
            similarity: title_similarity(tentative_title, &record.title),
        }
    }

    /// Both DOIs present after normalisation.
    fn both_dois(&self) -> Option<(&str, &str)> {
        let local = self.tentative_doi.filter(|d| !clean_doi(d).is_empty())?;
        let external = self.record.doi.as_deref().filter(|d| !clean_doi(d).is_empty())?;
        Some((local, external))
    }

    pub fn dois_agree(&self) -> bool {
        self.both_dois().is_some_and(|(a, b)| dois_match(a, b))
    }

    pub fn doi_conflict(&self) -> bool {
        self.both_dois().is_some_and(|(a, b)| !dois_match(a, b))
    }

    pub fn authors_overlap(&self) -> bool {
        AuthorTokens::from_authors(&self.record.authors).intersects(self.local_tokens)
    }
}

/// Similarity between normalised titles; 0 when either side is empty.
pub fn title_similarity(tentative: Option<&str>, external: &str) -> f64 {
    let local = normalize_title(tentative.unwrap_or_default());
    let external = normalize_title(external);
    if local.is_empty() || external.is_empty() {
        return 0.0;
    }
    similarity(&local, &external)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub verified: bool,
    pub allow_doi_output: bool,
}

const TRUSTED_WITH_DOI: Outcome = Outcome { verified: true, allow_doi_output: true };
const TRUSTED: Outcome = Outcome { verified: true, allow_doi_output: false };
const UNTRUSTED: Outcome = Outcome { verified: false, allow_doi_output: false };

#[derive(Clone, Copy)]
pub struct TrustRule {
    pub id: RuleId,
    pub predicate: fn(&MatchContext<'_>) -> bool,
    pub outcome: Outcome,
}

impl fmt::Debug for TrustRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustRule")
            .field("id", &self.id)
            .field("outcome", &self.outcome)
            .finish()
    }
}

fn doi_match(ctx: &MatchContext<'_>) -> bool {
    ctx.dois_agree()
}

fn doi_conflict(ctx: &MatchContext<'_>) -> bool {
    ctx.doi_conflict()
}

fn strong_title(ctx: &MatchContext<'_>) -> bool {
    !ctx.doi_conflict() && ctx.similarity >= ctx.thresholds.strong_title
}

fn corroborated_title(ctx: &MatchContext<'_>) -> bool {
    !ctx.doi_conflict()
        && ctx.similarity >= ctx.thresholds.corroborated_title
        && ctx.authors_overlap()
}

/// Rule order matters: a DOI conflict must be seen before any title rule.
pub const TRUST_RULES: &[TrustRule] = &[
    TrustRule { id: RuleId::DoiMatch, predicate: doi_match, outcome: TRUSTED_WITH_DOI },
    TrustRule { id: RuleId::DoiConflict, predicate: doi_conflict, outcome: UNTRUSTED },
    TrustRule { id: RuleId::StrongTitle, predicate: strong_title, outcome: TRUSTED },
    TrustRule { id: RuleId::CorroboratedTitle, predicate: corroborated_title, outcome: TRUSTED },
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchDecision {
    pub verified: bool,
    pub allow_doi_output: bool,
    pub similarity: f64,
    pub rule: RuleId,
}

#[derive(Debug, Clone)]
pub struct Gatekeeper {
    thresholds: Thresholds,
    rules: Vec<TrustRule>,
}

impl Default for Gatekeeper {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}

impl Gatekeeper {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            rules: TRUST_RULES.to_vec(),
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn rules(&self) -> &[TrustRule] {
        &self.rules
    }

    pub fn context<'a>(
        &self,
        doc: &'a IntermediateDocument,
        local_tokens: &'a AuthorTokens,
        record: &'a ExternalRecord,
    ) -> MatchContext<'a> {
        MatchContext::new(doc, local_tokens, record, self.thresholds)
    }

    pub fn decide(&self, ctx: &MatchContext<'_>) -> MatchDecision {
        let (rule, outcome) = self
            .rules
            .iter()
            .find(|r| (r.predicate)(ctx))
            .map(|r| (r.id, r.outcome))
            .unwrap_or((RuleId::NoMatch, UNTRUSTED));

        debug!(
            pmid = %ctx.record.pmid,
            similarity = ctx.similarity,
            %rule,
            verified = outcome.verified,
            "match decision"
        );

        MatchDecision {
            verified: outcome.verified,
            allow_doi_output: outcome.allow_doi_output,
            similarity: ctx.similarity,
            rule,
        }
    }

    /// Decision when no record could be fetched.
    pub fn no_candidate(&self) -> MatchDecision {
        MatchDecision {
            verified: false,
            allow_doi_output: false,
            similarity: 0.0,
            rule: RuleId::NoCandidate,
        }
    }

    /// Convenience over [`Gatekeeper::decide`] for an optional record.
    pub fn evaluate(
        &self,
        doc: &IntermediateDocument,
        local_tokens: &AuthorTokens,
        record: Option<&ExternalRecord>,
    ) -> MatchDecision {
        match record {
            Some(record) => self.decide(&self.context(doc, local_tokens, record)),
            None => self.no_candidate(),
        }
    }
}
