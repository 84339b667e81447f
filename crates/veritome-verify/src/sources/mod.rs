//! Bibliographic registry clients.

pub mod citation;
pub mod pubmed;

use std::fmt;

use async_trait::async_trait;

use crate::models::ExternalRecord;

/// A single registry query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// Exact match on the DOI field.
    Doi(String),
    /// Exact phrase match on the title field.
    Title(String),
    /// Unrestricted search over all fields.
    Loose(String),
}

impl SearchQuery {
    /// Whether the query is restricted to a specific field.
    pub fn is_exact(&self) -> bool {
        !matches!(self, SearchQuery::Loose(_))
    }

    /// Query string in registry syntax.
    pub fn to_term(&self) -> String {
        match self {
            SearchQuery::Doi(doi) => format!("\"{}\"[DOI]", doi.trim()),
            SearchQuery::Title(title) => format!("\"{}\"[Title]", clean_term(title)),
            SearchQuery::Loose(term) => clean_term(term),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SearchQuery::Doi(_) => "doi",
            SearchQuery::Title(_) => "title",
            SearchQuery::Loose(_) => "loose",
        }
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_term())
    }
}

/// Separators that break registry phrase matching.
fn clean_term(term: &str) -> String {
    term.trim().replace([':', ';', ','], " ").trim().to_string()
}

/// Common interface for bibliographic registries.
///
/// Implementations swallow transport, timeout and parse failures: they log
/// them and return `None`, so callers treat every failure as "no result".
#[async_trait]
pub trait BibliographicSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Top-ranked identifier for the query, if any.
    async fn search(&self, query: &SearchQuery) -> Option<String>;

    /// Structured record for one identifier.
    async fn fetch(&self, id: &str) -> Option<ExternalRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doi_query_is_field_restricted() {
        let q = SearchQuery::Doi(" 10.1200/JCO.22.00001 ".into());
        assert!(q.is_exact());
        assert_eq!(q.to_term(), "\"10.1200/JCO.22.00001\"[DOI]");
    }

    #[test]
    fn test_title_query_strips_separators() {
        let q = SearchQuery::Title("Breast Cancer: Adjuvant; Therapy, Update".into());
        assert!(q.is_exact());
        assert_eq!(q.to_term(), "\"Breast Cancer  Adjuvant  Therapy  Update\"[Title]");
    }

    #[test]
    fn test_loose_query_unrestricted() {
        let q = SearchQuery::Loose("Lung Cancer: Guideline davidson".into());
        assert!(!q.is_exact());
        assert_eq!(q.to_term(), "Lung Cancer  Guideline davidson");
        assert_eq!(q.kind(), "loose");
    }
}
