//! APA-style citation formatting for registry records.

use crate::models::ExternalRecord;
use crate::normalise::resolver_url;

/// Author segment of a citation.
///
/// One author is printed as is, two or three are comma-joined with "& "
/// before the last, four or more collapse to "First et al.".
pub fn format_author_list(authors: &[String]) -> String {
    match authors {
        [] => "Unknown Authors".to_string(),
        [only] => only.clone(),
        [init @ .., last] if authors.len() <= 3 => format!("{}, & {}", init.join(", "), last),
        [first, ..] => format!("{first} et al."),
    }
}

/// `"{authors}. ({year}). {title}. {journal}[, {volume}][, {pages}][. https://doi.org/{doi}]"`
pub fn format_citation(record: &ExternalRecord) -> String {
    let mut citation = format!(
        "{}. ({}). {}. {}",
        format_author_list(&record.authors),
        record.year,
        record.title,
        record.journal
    );
    if let Some(volume) = &record.volume {
        citation.push_str(", ");
        citation.push_str(volume);
    }
    if let Some(pages) = &record.pages {
        citation.push_str(", ");
        citation.push_str(pages);
    }
    if let Some(doi) = &record.doi {
        citation.push_str(". ");
        citation.push_str(&resolver_url(doi));
    }
    citation
}
