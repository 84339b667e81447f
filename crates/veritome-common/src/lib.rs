//! veritome-common: Shared error type and the allowlisted HTTP client used across Veritome crates.

pub mod error;
pub mod sandbox;

pub use error::{Result, VeritomeError};
pub use sandbox::SandboxClient;
