//! Runtime configuration for a mirror run
//!
//! Unlike a long-running crawler there is no config file: everything comes
//! from the command line, is validated once, and is immutable for the life
//! of the session.

use crate::url::{normalize_start, CanonicalUrl};
use crate::{MirrorError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Identification string sent on every static fetch and passed to the
/// render capability, unless overridden with `--user-agent`.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// Validated configuration shared by every worker in a crawl session.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Canonicalized start URL; its host defines the crawl's domain scope.
    pub start_url: CanonicalUrl,

    /// Root directory for the mirrored output tree.
    pub output_root: PathBuf,

    /// Minimum spacing between requests, enforced per worker.
    pub delay: Duration,

    /// Settle duration handed to the render capability in dynamic mode.
    pub render_wait: Duration,

    /// Multi-page mode. When false, exactly one page is mirrored.
    pub crawl: bool,

    /// Page ceiling for crawl mode.
    pub max_pages: usize,

    /// Worker pool size.
    pub workers: usize,

    /// Identification string for all fetches.
    pub user_agent: String,

    /// Per-request timeout for static fetches.
    pub request_timeout: Duration,
}

impl MirrorConfig {
    /// Builds a configuration with the standard defaults from a raw start URL.
    ///
    /// Fails only when the start URL cannot be normalized; this is the one
    /// fatal startup error.
    pub fn new(start_url: &str, output_root: impl Into<PathBuf>) -> Result<Self> {
        let start_url = normalize_start(start_url)?;
        Ok(Self {
            start_url,
            output_root: output_root.into(),
            delay: Duration::from_millis(500),
            render_wait: Duration::from_secs(2),
            crawl: false,
            max_pages: 10,
            workers: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(10),
        })
    }

    /// The page ceiling that actually applies: single-page mode always
    /// mirrors exactly one page regardless of `max_pages`.
    pub fn effective_max_pages(&self) -> usize {
        if self.crawl {
            self.max_pages
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_pages == 0 {
            return Err(MirrorError::Config(
                "max-pages must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(MirrorError::Config("workers must be at least 1".to_string()));
        }
        if self.user_agent.is_empty() {
            return Err(MirrorError::Config("user-agent must not be empty".to_string()));
        }
        Ok(())
    }
}
