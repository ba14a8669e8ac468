//! Sitefold: an offline site mirroring engine
//!
//! This crate fetches web pages, discovers the CSS/JS/image resources they
//! reference, rewrites those references to local paths, and writes the
//! result into a browsable directory tree. In crawl mode it follows
//! same-domain hyperlinks breadth-first up to a configurable page ceiling.

pub mod config;
pub mod crawler;
pub mod output;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for mirroring operations
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("{0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// URL-specific errors
///
/// `Malformed` covers references that cannot be parsed or resolved against
/// their base. Non-fetchable schemes (`javascript:`, `mailto:`, ...) are
/// filtered out before normalization and never reach this type.
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("malformed URL {reference}: {message}")]
    Malformed { reference: String, message: String },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,
}

/// Result type alias for mirroring operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::MirrorConfig;
pub use crawler::{CrawlOutcome, CrawlSession, Scheduler};
pub use crate::url::{local_path, normalize, CanonicalUrl};
