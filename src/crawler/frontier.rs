//! Crawl frontier and dedup set
//!
//! FIFO queue of pending URLs plus the set of canonical URLs already
//! visited or queued. The check-and-insert on offer is a single atomic
//! step under one lock, which is what guarantees a canonical URL is
//! fetched at most once per session even with concurrent workers.

use crate::url::CanonicalUrl;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

/// A URL waiting to be fetched.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: CanonicalUrl,
    pub depth: u32,
}

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<FrontierEntry>,
    seen: HashSet<CanonicalUrl>,
}

/// Shared frontier for one crawl session.
///
/// Breadth-first: entries come back out of [`take`](Frontier::take) in the
/// order they were first offered, which bounds depth growth and makes
/// crawl order reproducible for tests.
#[derive(Debug)]
pub struct Frontier {
    scope: CanonicalUrl,
    max_offers: usize,
    inner: Mutex<Inner>,
}

impl Frontier {
    /// `scope` provides the host a crawl is restricted to; `max_offers`
    /// bounds how many distinct URLs may ever be admitted.
    pub fn new(scope: CanonicalUrl, max_offers: usize) -> Self {
        Self {
            scope,
            max_offers,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Inserts a URL into the pending queue if it has not been seen, its
    /// host matches the crawl scope, and the offer budget is not spent.
    /// Returns whether the URL was admitted; duplicate offers are silently
    /// dropped.
    pub fn offer(&self, url: CanonicalUrl, depth: u32) -> bool {
        if !url.same_host(&self.scope) {
            return false;
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.seen.len() >= self.max_offers || inner.seen.contains(&url) {
            return false;
        }
        inner.seen.insert(url.clone());
        inner.pending.push_back(FrontierEntry { url, depth });
        true
    }

    /// Removes and returns the oldest pending entry.
    pub fn take(&self) -> Option<FrontierEntry> {
        self.inner.lock().unwrap().pending.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_len() == 0
    }

    /// Number of distinct URLs ever admitted.
    pub fn offered(&self) -> usize {
        self.inner.lock().unwrap().seen.len()
    }
}
