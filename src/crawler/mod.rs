//! Crawling and mirroring machinery.
//!
//! This module contains the moving parts of a mirror run:
//! - HTTP fetching with retry logic and an optional dynamic-render fallback
//! - HTML and CSS reference extraction and rewriting
//! - The deduplicating URL frontier
//! - Shared session state (page budget, report) and the worker scheduler

mod extractor;
mod fetcher;
mod frontier;
mod renderer;
mod scheduler;
mod session;

pub use extractor::{ExtractedPage, Extractor, ResourceKind, ResourceRef};
pub use fetcher::{
    build_http_client, FailureKind, FetchError, FetchMode, FetchOutcome, Fetcher, RetryPolicy,
};
pub use frontier::{Frontier, FrontierEntry};
pub use renderer::{HeadlessChromeRenderer, RenderError, Rendered, Renderer};
pub use scheduler::Scheduler;
pub use session::{CrawlOutcome, CrawlSession};
