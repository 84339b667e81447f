//! Normalisation helpers used for comparison only; nothing here is persisted.
//!
//! - `title`: canonical title form and the gestalt similarity ratio
//! - `doi`: prefix/case folding for DOI equality

pub mod doi;
pub mod title;

pub use doi::{bare_doi, clean_doi, dois_match, resolver_url};
pub use title::{normalize_title, similarity, strip_summary_suffix};
