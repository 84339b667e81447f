//! veritome-verify: Verification and enrichment of extracted guideline documents.
//!
//! Takes intermediate records produced by an untrusted extraction step and
//! cross-checks them against PubMed before writing database-ready output:
//! - Title and DOI normalisation
//! - Forensic author-token extraction
//! - Rate-limited bibliographic lookup (esearch / efetch)
//! - Ordered search strategies (DOI, title variants, title + author)
//! - Gatekeeper trust rules
//! - Output assembly, checkpointing and quarantine
//! - Audit trail

pub mod assembler;
pub mod audit;
pub mod forensic;
pub mod gatekeeper;
pub mod models;
pub mod normalise;
pub mod pipeline;
pub mod rate_limit;
pub mod sources;
pub mod store;
pub mod strategy;

pub use veritome_common::{Result, VeritomeError};
