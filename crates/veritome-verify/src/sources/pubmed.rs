//! PubMed E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument, warn};
use veritome_common::{Result, SandboxClient, VeritomeError};

use super::citation::format_citation;
use super::{BibliographicSource, SearchQuery};
use crate::models::ExternalRecord;
use crate::rate_limit::RateLimiter;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL:  &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const TOOL_NAME:   &str = "veritome";

/// Default bound on a single registry request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

lazy_static! {
    static ref YEAR: Regex = Regex::new(r"\d{4}").unwrap();
}

/// Credentials and limits for the E-utilities API.
#[derive(Debug)]
pub struct PubMedConfig {
    pub api_key: Option<SecretString>,
    /// Contact address NCBI asks heavy users to supply.
    pub email: Option<String>,
    pub timeout: Duration,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self { api_key: None, email: None, timeout: DEFAULT_TIMEOUT }
    }
}

pub struct PubMedClient {
    client: SandboxClient,
    config: PubMedConfig,
    limiter: Arc<dyn RateLimiter>,
}

impl PubMedClient {
    pub fn new(config: PubMedConfig, limiter: Arc<dyn RateLimiter>) -> Result<Self> {
        Ok(Self {
            client: SandboxClient::new(config.timeout)?,
            config,
            limiter,
        })
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("tool", TOOL_NAME.to_string()),
        ];
        if let Some(key) = &self.config.api_key {
            params.push(("api_key", key.expose_secret().to_string()));
        }
        if let Some(email) = self.config.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            params.push(("email", email.to_string()));
        }
        params
    }

    /// Runs one registry call between the limiter hooks.
    async fn paced<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        self.limiter.before_call().await;
        let result = call.await;
        self.limiter.after_call().await;
        result
    }

    /// Top-ranked PMID for a query.
    #[instrument(skip(self), fields(term = %query))]
    async fn esearch(&self, query: &SearchQuery) -> Result<Option<String>> {
        let mut params = self.base_params();
        params.push(("term", query.to_term()));
        params.push(("retmode", "json".to_string()));
        params.push(("retmax", "1".to_string()));

        let resp: serde_json::Value = self.client
            .get(ESEARCH_URL)?
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let pmid = first_pmid(&resp);
        debug!(?pmid, "PubMed esearch result");
        Ok(pmid)
    }

    /// Fetch and parse the record for one PMID.
    #[instrument(skip(self))]
    async fn efetch(&self, pmid: &str) -> Result<Option<ExternalRecord>> {
        let mut params = self.base_params();
        params.push(("id", pmid.to_string()));
        params.push(("rettype", "abstract".to_string()));
        params.push(("retmode", "xml".to_string()));

        let xml = self.client
            .get(EFETCH_URL)?
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_efetch_xml(&xml)
    }
}

#[async_trait]
impl BibliographicSource for PubMedClient {
    fn name(&self) -> &'static str {
        "pubmed"
    }

    async fn search(&self, query: &SearchQuery) -> Option<String> {
        match self.paced(self.esearch(query)).await {
            Ok(pmid) => pmid,
            Err(e) => {
                warn!(term = %query, error = %e, "PubMed search failed; treating as no result");
                None
            }
        }
    }

    async fn fetch(&self, pmid: &str) -> Option<ExternalRecord> {
        match self.paced(self.efetch(pmid)).await {
            Ok(record) => record,
            Err(e) => {
                warn!(pmid, error = %e, "PubMed fetch failed; treating as no result");
                None
            }
        }
    }
}

/// First id of an esearch JSON response.
pub fn first_pmid(resp: &serde_json::Value) -> Option<String> {
    resp["esearchresult"]["idlist"]
        .as_array()
        .and_then(|ids| ids.first())
        .and_then(|id| id.as_str())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
}

/// Field currently being collected from text events.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Pmid,
    Title,
    Journal,
    Volume,
    Year,
    MedlineDate,
    Pages,
    LastName,
    ForeName,
    ArticleIdDoi,
    ELocationDoi,
}

#[derive(Default)]
struct ArticleBuilder {
    pmid: Option<String>,
    title: Option<String>,
    journal: Option<String>,
    volume: Option<String>,
    year: Option<String>,
    medline_date: Option<String>,
    pages: Option<String>,
    authors: Vec<String>,
    article_id_doi: Option<String>,
    elocation_doi: Option<String>,
    last_name: String,
    fore_name: String,
}

impl ArticleBuilder {
    /// Stores a completed field. The first occurrence wins.
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Pmid => &mut self.pmid,
            Field::Title => &mut self.title,
            Field::Journal => &mut self.journal,
            Field::Volume => &mut self.volume,
            Field::Year => &mut self.year,
            Field::MedlineDate => &mut self.medline_date,
            Field::Pages => &mut self.pages,
            Field::ArticleIdDoi => &mut self.article_id_doi,
            Field::ELocationDoi => &mut self.elocation_doi,
            Field::LastName => {
                self.last_name = value;
                return;
            }
            Field::ForeName => {
                self.fore_name = value;
                return;
            }
        };
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value);
        }
    }

    fn finish_author(&mut self) {
        let last = std::mem::take(&mut self.last_name);
        let fore = std::mem::take(&mut self.fore_name);
        match (last.is_empty(), fore.is_empty()) {
            // CollectiveName entries carry neither
            (true, _) => {}
            (false, true) => self.authors.push(last),
            (false, false) => self.authors.push(format!("{last}, {fore}")),
        }
    }

    fn build(self) -> Option<ExternalRecord> {
        let pmid = self.pmid?;
        let year = self.year.or_else(|| {
            self.medline_date
                .as_deref()
                .and_then(|d| YEAR.find(d))
                .map(|m| m.as_str().to_string())
        });
        let mut record = ExternalRecord {
            pmid,
            title: self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            doi: self.article_id_doi.or(self.elocation_doi),
            authors: self.authors,
            journal: self.journal.unwrap_or_else(|| "Unknown Journal".to_string()),
            year: year.unwrap_or_else(|| "Unknown Year".to_string()),
            volume: self.volume,
            pages: self.pages,
            citation: String::new(),
        };
        record.citation = format_citation(&record);
        Some(record)
    }
}

fn has_attr(e: &BytesStart<'_>, name: &str, expected: &str) -> bool {
    matches!(
        e.try_get_attribute(name),
        Ok(Some(attr)) if attr.value.as_ref().eq_ignore_ascii_case(expected.as_bytes())
    )
}

/// Decide whether an opening tag starts a field we keep, given its parent.
fn field_for(e: &BytesStart<'_>, name: &str, stack: &[String]) -> Option<Field> {
    let parent = stack.last().map(String::as_str).unwrap_or("");
    let in_references = stack.iter().any(|s| s == "ReferenceList");
    match (name, parent) {
        ("PMID", "MedlineCitation") => Some(Field::Pmid),
        ("ArticleTitle", "Article") => Some(Field::Title),
        ("Title", "Journal") => Some(Field::Journal),
        ("Volume", "JournalIssue") => Some(Field::Volume),
        ("Year", "PubDate") => Some(Field::Year),
        ("MedlineDate", "PubDate") => Some(Field::MedlineDate),
        ("MedlinePgn", "Pagination") => Some(Field::Pages),
        ("LastName", "Author") => Some(Field::LastName),
        ("ForeName", "Author") => Some(Field::ForeName),
        ("ArticleId", "ArticleIdList") if !in_references && has_attr(e, "IdType", "doi") => {
            Some(Field::ArticleIdDoi)
        }
        ("ELocationID", "Article") if has_attr(e, "EIdType", "doi") => Some(Field::ELocationDoi),
        _ => None,
    }
}

/// Parse efetch XML (abstract mode) into the record of its first `PubmedArticle`.
///
/// Returns `Ok(None)` when the payload holds no article or the article has no PMID.
pub fn parse_efetch_xml(xml: &str) -> Result<Option<ExternalRecord>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut stack: Vec<String> = Vec::new();
    let mut article: Option<ArticleBuilder> = None;
    // (field, depth at which it was opened, collected text)
    let mut capture: Option<(Field, usize, String)> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| VeritomeError::Xml(e.to_string()))?;

        match event {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "PubmedArticle" && article.is_none() {
                    article = Some(ArticleBuilder::default());
                } else if article.is_some() && capture.is_none() {
                    if let Some(field) = field_for(e, &name, &stack) {
                        capture = Some((field, stack.len(), String::new()));
                    }
                }
                stack.push(name);
            }
            Event::Text(ref e) => {
                if let Some((_, _, text)) = capture.as_mut() {
                    let unescaped = e.unescape().map_err(|e| VeritomeError::Xml(e.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Event::CData(ref e) => {
                if let Some((_, _, text)) = capture.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::End(ref e) => {
                stack.pop();
                let name = e.name();
                let name = name.as_ref();

                let closes_capture = matches!(&capture, Some((_, depth, _)) if *depth == stack.len());
                if closes_capture {
                    if let (Some((field, _, text)), Some(a)) = (capture.take(), article.as_mut()) {
                        a.set(field, collapse_whitespace(&text));
                    }
                }

                match name {
                    b"Author" => {
                        if let Some(a) = article.as_mut() {
                            a.finish_author();
                        }
                    }
                    b"PubmedArticle" => break,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(article.and_then(ArticleBuilder::build))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
