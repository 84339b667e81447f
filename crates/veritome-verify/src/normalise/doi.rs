//! DOI comparison helpers.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DOI_PREFIX: Regex =
        Regex::new(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|doi:\s*)").unwrap();
}

/// Canonical comparison form: trimmed, resolver/`doi:` prefix removed, lowercased.
pub fn clean_doi(raw: &str) -> String {
    DOI_PREFIX.replace(raw.trim(), "").trim().to_lowercase()
}

/// True when both DOIs denote the same identifier.
pub fn dois_match(a: &str, b: &str) -> bool {
    let (a, b) = (clean_doi(a), clean_doi(b));
    !a.is_empty() && a == b
}

/// DOI with any resolver/`doi:` prefix removed. Case is kept for registry queries.
pub fn bare_doi(raw: &str) -> String {
    DOI_PREFIX.replace(raw.trim(), "").trim().to_string()
}

/// DOI resolver link for a registry-supplied DOI.
pub fn resolver_url(doi: &str) -> String {
    format!("https://doi.org/{}", bare_doi(doi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_doi_strips_prefixes() {
        assert_eq!(clean_doi("https://doi.org/10.1200/JCO.22.00001"), "10.1200/jco.22.00001");
        assert_eq!(clean_doi("  doi: 10.1200/JCO.22.00001 "), "10.1200/jco.22.00001");
        assert_eq!(clean_doi("DOI:10.1200/JCO.22.00001"), "10.1200/jco.22.00001");
        assert_eq!(clean_doi("http://dx.doi.org/10.1200/X"), "10.1200/x");
    }

    #[test]
    fn test_dois_match_case_insensitive() {
        assert!(dois_match("10.1200/JCO.22.00001", "https://doi.org/10.1200/jco.22.00001"));
        assert!(!dois_match("10.1200/JCO.22.00001", "10.1200/JCO.22.00002"));
        assert!(!dois_match("", "doi:"));
    }

    #[test]
    fn test_resolver_url_keeps_registry_case() {
        assert_eq!(resolver_url("10.1200/JCO.22.00001"), "https://doi.org/10.1200/JCO.22.00001");
        assert_eq!(resolver_url("doi:10.1200/JCO.22.00001"), "https://doi.org/10.1200/JCO.22.00001");
    }

    #[test]
    fn test_bare_doi_keeps_case() {
        assert_eq!(bare_doi("https://dx.doi.org/10.1200/JCO.22.00001"), "10.1200/JCO.22.00001");
        assert_eq!(bare_doi("  DOI: 10.1200/JCO.22.00001 "), "10.1200/JCO.22.00001");
        assert_eq!(bare_doi("https://doi.org/"), "");
    }
}
