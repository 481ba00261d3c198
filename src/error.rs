//! Error taxonomy for the install pipeline.
//!
//! Every variant names the stage that failed. Nothing is retried; the first
//! error aborts the install attempt.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("descriptor: {0}")]
    Descriptor(String),

    #[error("resolve: no release asset for platform '{platform}' (available: {available})")]
    UnsupportedPlatform { platform: String, available: String },

    #[error("fetch: {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("verify: sha256 mismatch (expected {expected}, got {actual})")]
    Integrity { expected: String, actual: String },

    #[error("extract: {0}")]
    Archive(String),

    #[error("build: {0}")]
    Build(String),

    #[error("self-test: {path} {reason}")]
    SelfTest { path: String, reason: String },

    #[error("install: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    pub fn network(url: &str, reason: impl ToString) -> Self {
        InstallError::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn descriptor(msg: impl Into<String>) -> Self {
        InstallError::Descriptor(msg.into())
    }
}

pub type InstallResult<T> = Result<T, InstallError>;
