//! Builds the database-ready record from a match decision.

use serde::{Deserialize, Serialize};
use url::Url;
use veritome_common::{Result, VeritomeError};

use crate::gatekeeper::MatchDecision;
use crate::models::{ExternalRecord, IntermediateDocument, ValidatedDocument};
use crate::normalise::resolver_url;

pub const REGISTRY_ROOT: &str = "https://pubmed.ncbi.nlm.nih.gov";
pub const DEFAULT_NEUTRAL_LINK: &str = "https://asco.org";
pub const DEFAULT_CITATION_LABEL: &str = "ASCO Guideline";

/// Hosts whose URLs assert a publication identity. Subdomains included.
const IDENTITY_HOSTS: &[&str] = &["doi.org", "ncbi.nlm.nih.gov"];

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNVERIFIED_SUFFIX: &str = "(unverified)";

/// What an unverified record says about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    /// Organisational landing page. Never a resolver or registry URL.
    pub neutral_link: String,
    /// Publisher label leading the disclaimer citation.
    pub citation_label: String,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            neutral_link: DEFAULT_NEUTRAL_LINK.to_string(),
            citation_label: DEFAULT_CITATION_LABEL.to_string(),
        }
    }
}

impl FallbackPolicy {
    /// The neutral link must be an http(s) URL outside the resolver and registry hosts.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.neutral_link).map_err(|e| {
            VeritomeError::Config(format!("neutral_link '{}' is not a valid URL: {e}", self.neutral_link))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VeritomeError::Config(format!(
                "neutral_link '{}' must use http or https",
                self.neutral_link
            )));
        }
        let host = url.host_str().unwrap_or_default().trim_end_matches('.').to_ascii_lowercase();
        let claims_identity = IDENTITY_HOSTS
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{h}")));
        if claims_identity {
            return Err(VeritomeError::Config(format!(
                "neutral_link '{}' points at a resolver or registry host",
                self.neutral_link
            )));
        }
        if self.citation_label.trim().is_empty() {
            return Err(VeritomeError::Config("citation_label must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Assembler {
    fallback: FallbackPolicy,
}

impl Assembler {
    /// Rejects a fallback policy whose link would claim an identity.
    pub fn new(fallback: FallbackPolicy) -> Result<Self> {
        fallback.validate()?;
        Ok(Self { fallback })
    }

    pub fn fallback_policy(&self) -> &FallbackPolicy {
        &self.fallback
    }

    /// Assemble and validate. The corpus is the input text, unchanged.
    pub fn assemble(
        &self,
        doc: &IntermediateDocument,
        record: Option<&ExternalRecord>,
        decision: &MatchDecision,
    ) -> Result<ValidatedDocument> {
        let assembled = match record {
            Some(record) if decision.verified => self.verified(doc, record, decision.allow_doi_output),
            _ => self.unverified(doc),
        };
        assembled.validate()?;
        Ok(assembled)
    }

    fn verified(&self, doc: &IntermediateDocument, record: &ExternalRecord, allow_doi_output: bool) -> ValidatedDocument {
        ValidatedDocument {
            title: record.title.clone(),
            citation: record.citation.clone(),
            link: verified_link(record, allow_doi_output),
            corpus: doc.text.clone(),
        }
    }

    fn unverified(&self, doc: &IntermediateDocument) -> ValidatedDocument {
        let title = doc.tentative_title();
        ValidatedDocument {
            title: format!("{} {UNVERIFIED_SUFFIX}", title.unwrap_or(UNKNOWN_TITLE)),
            citation: format!(
                "{}. {}. (Data extracted from text, unverified in PubMed).",
                self.fallback.citation_label,
                title.unwrap_or(UNKNOWN_TITLE)
            ),
            link: self.fallback.neutral_link.clone(),
            corpus: doc.text.clone(),
        }
    }
}

/// DOI resolver when allowed and available, else the record page, else the registry root.
pub fn verified_link(record: &ExternalRecord, allow_doi_output: bool) -> String {
    let doi = record.doi.as_deref().map(str::trim).filter(|d| !d.is_empty());
    match doi {
        Some(doi) if allow_doi_output => resolver_url(doi),
        _ if !record.pmid.trim().is_empty() => format!("{REGISTRY_ROOT}/{}", record.pmid.trim()),
        _ => REGISTRY_ROOT.to_string(),
    }
}
