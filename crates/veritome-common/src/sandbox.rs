use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::error::VeritomeError;

/// Registry hosts the verification pipeline is allowed to reach.
const DEFAULT_ALLOWLIST: &[&str] = &[
    "eutils.ncbi.nlm.nih.gov", // PubMed E-utilities
];

/// An HTTP client that only issues requests to approved hosts.
///
/// Every request carries the timeout given at construction, so a stalled
/// registry call surfaces as an error instead of blocking the batch.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Builds a client with the default registry allowlist and the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, VeritomeError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("veritome/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            allowlist: DEFAULT_ALLOWLIST.iter().map(|d| d.to_string()).collect(),
        })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current policy.
    /// Subdomains of an allowed host are accepted.
    pub fn is_allowed(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.allowlist
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{allowed}")))
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, VeritomeError> {
        if !self.is_allowed(url) {
            tracing::warn!(url, "blocked request to host outside allowlist");
            return Err(VeritomeError::Security(format!(
                "domain not in allowlist for URL {url}"
            )));
        }
        Ok(self.client.get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SandboxClient {
        SandboxClient::new(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_registry_host_allowed() {
        let c = client();
        assert!(c.is_allowed("https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi"));
    }

    #[test]
    fn test_unknown_host_rejected() {
        let c = client();
        assert!(!c.is_allowed("https://example.com/esearch.fcgi"));
        assert!(!c.is_allowed("not a url"));
        assert!(matches!(
            c.get("https://example.com/"),
            Err(VeritomeError::Security(_))
        ));
    }

    #[test]
    fn test_lookalike_host_rejected() {
        let c = client();
        assert!(!c.is_allowed("https://evileutils.ncbi.nlm.nih.gov.attacker.io/"));
    }

    #[test]
    fn test_allow_domain_extends_policy() {
        let mut c = client();
        c.allow_domain("localhost");
        assert!(c.is_allowed("http://localhost:8080/esearch.fcgi"));
    }
}
