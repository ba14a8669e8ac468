//! URL handling module for Sitefold
//!
//! This module provides URL canonicalization (the crawl's dedup identity)
//! and the deterministic mapping from canonical URLs to local file paths.

mod mapper;
mod normalize;

pub use mapper::{local_path, relative_from};
pub use normalize::{is_followable, normalize, normalize_start, CanonicalUrl};
