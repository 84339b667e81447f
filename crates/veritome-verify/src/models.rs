//! Data models for the verification pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;
use veritome_common::{Result, VeritomeError};

/// Record written by the upstream extraction step. Never modified by this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntermediateDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: TentativeMetadata,
}

/// Unverified title/DOI guessed by the extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TentativeMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
}

impl IntermediateDocument {
    /// Tentative title, trimmed. Blank titles count as absent.
    pub fn tentative_title(&self) -> Option<&str> {
        non_blank(self.metadata.title.as_deref())
    }

    /// Tentative DOI, trimmed. Blank DOIs count as absent.
    pub fn tentative_doi(&self) -> Option<&str> {
        non_blank(self.metadata.doi.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One record fetched from the bibliographic registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalRecord {
    pub pmid: String,
    pub title: String,
    pub doi: Option<String>,
    /// Ordered "Last, First" (or bare "Last") names.
    pub authors: Vec<String>,
    pub journal: String,
    pub year: String,
    pub volume: Option<String>,
    pub pages: Option<String>,
    /// APA-style citation built from the fields above.
    pub citation: String,
}

/// Database-ready output record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ValidatedDocument {
    pub title: String,
    pub citation: String,
    pub link: String,
    pub corpus: String,
}

impl ValidatedDocument {
    /// Schema check applied before anything is persisted.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("Title", &self.title), ("Citation", &self.citation)] {
            if value.trim().is_empty() {
                return Err(VeritomeError::Schema(format!("{field} must not be empty")));
            }
        }
        if self.corpus.is_empty() {
            return Err(VeritomeError::Schema("Corpus must not be empty".into()));
        }

        let url = Url::parse(&self.link).map_err(|e| {
            VeritomeError::Schema(format!("Link '{}' is not a valid URL: {e}", self.link))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VeritomeError::Schema(format!(
                "Link '{}' must use http or https",
                self.link
            )));
        }
        Ok(())
    }
}

/// Stable identity of an input document, derived from its file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn new(stem: impl Into<String>) -> Self {
        Self(stem.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic name of the output artifact for this document.
    pub fn output_file_name(&self) -> String {
        format!("{}_final.json", self.0)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An intermediate record on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub key: DocumentKey,
}

impl InputFile {
    /// Returns `None` for paths without a usable file stem.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let stem = path.file_stem()?.to_str()?;
        if stem.is_empty() {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            key: DocumentKey::new(stem),
        })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.key.to_string())
    }
}
