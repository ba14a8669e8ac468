//! Shared per-run crawl state
//!
//! A [`CrawlSession`] owns everything workers share: the frontier, the
//! page budget, the asset dedup set, and the run report. It is created at
//! the start of a crawl invocation and torn down when the crawl ends;
//! nothing here is process-global, so multiple independent crawls can run
//! in one process.

use crate::config::MirrorConfig;
use crate::crawler::frontier::{Frontier, FrontierEntry};
use crate::output::CrawlReport;
use crate::url::CanonicalUrl;
use crate::Result;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// How a crawl ended. Both are expected terminal states, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Frontier empty and no in-flight work remained.
    Drained,
    /// The page ceiling stopped admissions.
    CeilingReached,
}

/// Result of asking the session for the next page to work on.
#[derive(Debug)]
pub enum Admission {
    /// A page was dequeued; the caller owns it until it reports back.
    Entry(FrontierEntry),
    /// Nothing pending right now; other workers may still produce links.
    Empty,
    /// The page ceiling has been reached; no further dequeues ever.
    CeilingReached,
}

/// State shared by all workers for the duration of one crawl.
pub struct CrawlSession {
    config: MirrorConfig,
    frontier: Frontier,
    /// Pages currently admitted (in flight or completed). Bounded by the
    /// effective page ceiling; a failed page releases its slot.
    admitted: AtomicUsize,
    pages_completed: AtomicUsize,
    in_flight: AtomicUsize,
    stop: AtomicBool,
    claimed_assets: Mutex<HashSet<CanonicalUrl>>,
    report: Mutex<CrawlReport>,
}

impl CrawlSession {
    /// Validates the configuration and seeds the frontier with the start
    /// URL at depth 0.
    pub fn new(config: MirrorConfig) -> Result<Self> {
        config.validate()?;
        let frontier = Frontier::new(config.start_url.clone(), config.effective_max_pages());
        frontier.offer(config.start_url.clone(), 0);

        Ok(Self {
            config,
            frontier,
            admitted: AtomicUsize::new(0),
            pages_completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            claimed_assets: Mutex::new(HashSet::new()),
            report: Mutex::new(CrawlReport::default()),
        })
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Attempts to dequeue the next page, reserving one slot of the page
    /// budget. The reservation is what keeps `pages_completed` at or
    /// under the ceiling even with concurrent workers racing past it.
    pub fn begin_page(&self) -> Admission {
        if self.stop.load(Ordering::SeqCst) {
            return Admission::CeilingReached;
        }

        let ceiling = self.config.effective_max_pages();
        let reserved = self
            .admitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < ceiling).then_some(n + 1)
            });
        if reserved.is_err() {
            return Admission::CeilingReached;
        }

        match self.frontier.take() {
            Some(entry) => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                Admission::Entry(entry)
            }
            None => {
                self.admitted.fetch_sub(1, Ordering::SeqCst);
                Admission::Empty
            }
        }
    }

    /// Marks a dequeued page as successfully mirrored.
    pub fn page_completed(&self, url: &CanonicalUrl, bytes: u64) {
        self.pages_completed.fetch_add(1, Ordering::SeqCst);
        self.report.lock().unwrap().record_page(url.as_str(), bytes);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Marks a dequeued page as failed, releasing its budget slot so the
    /// failure does not eat into the page ceiling.
    pub fn page_failed(&self, url: &CanonicalUrl, attempts: u32, error: &str) {
        self.report
            .lock()
            .unwrap()
            .record_failure(url.as_str(), attempts, error);
        self.admitted.fetch_sub(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Offers a discovered link to the frontier.
    pub fn offer_link(&self, url: CanonicalUrl, depth: u32) -> bool {
        self.frontier.offer(url, depth)
    }

    /// Claims an asset URL for mirroring. Returns false when another
    /// worker already took it, so each asset is fetched at most once per
    /// session.
    pub fn claim_asset(&self, url: &CanonicalUrl) -> bool {
        self.claimed_assets.lock().unwrap().insert(url.clone())
    }

    pub fn record_resource(&self, bytes: u64) {
        self.report.lock().unwrap().record_resource(bytes);
    }

    pub fn record_resource_failure(&self, url: &CanonicalUrl, attempts: u32, error: &str) {
        self.report
            .lock()
            .unwrap()
            .record_failure(url.as_str(), attempts, error);
    }

    /// Signals workers to finish their in-flight page and stop taking new
    /// ones.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn pages_completed(&self) -> usize {
        self.pages_completed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// True when no pending and no in-flight work remains.
    pub fn drained(&self) -> bool {
        self.frontier.is_empty() && self.in_flight() == 0
    }

    /// Terminal state of the run.
    pub fn outcome(&self) -> CrawlOutcome {
        if self.pages_completed() >= self.config.effective_max_pages() {
            CrawlOutcome::CeilingReached
        } else {
            CrawlOutcome::Drained
        }
    }

    /// Takes ownership of the accumulated report; call once at the end of
    /// the run.
    pub fn take_report(&self) -> CrawlReport {
        std::mem::take(&mut *self.report.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::normalize_start;

    fn session(crawl: bool, max_pages: usize) -> CrawlSession {
        let mut config = MirrorConfig::new("https://example.com/", "out").unwrap();
        config.crawl = crawl;
        config.max_pages = max_pages;
        CrawlSession::new(config).unwrap()
    }

    fn url(path: &str) -> CanonicalUrl {
        normalize_start(&format!("https://example.com{}", path)).unwrap()
    }

    #[test]
    fn test_seeded_with_start_url() {
        let session = session(true, 10);
        match session.begin_page() {
            Admission::Entry(entry) => {
                assert_eq!(entry.url.as_str(), "https://example.com/");
                assert_eq!(entry.depth, 0);
            }
            other => panic!("expected entry, got {:?}", other),
        }
        assert_eq!(session.in_flight(), 1);
    }

    #[test]
    fn test_ceiling_stops_admission() {
        let session = session(true, 2);
        session.offer_link(url("/a"), 1);
        session.offer_link(url("/b"), 1);

        let first = session.begin_page();
        let second = session.begin_page();
        assert!(matches!(first, Admission::Entry(_)));
        assert!(matches!(second, Admission::Entry(_)));
        assert!(matches!(session.begin_page(), Admission::CeilingReached));
    }

    #[test]
    fn test_failed_page_releases_budget() {
        let session = session(true, 1);
        let entry = match session.begin_page() {
            Admission::Entry(e) => e,
            other => panic!("expected entry, got {:?}", other),
        };
        session.page_failed(&entry.url, 4, "HTTP 503");

        // budget slot freed, but frontier already consumed the start URL
        session.offer_link(url("/"), 0); // duplicate, dropped
        assert!(matches!(session.begin_page(), Admission::Empty));
        assert_eq!(session.pages_completed(), 0);
        assert!(session.drained());
    }

    #[test]
    fn test_single_page_mode_admits_one() {
        let session = session(false, 10);
        assert!(!session.offer_link(url("/other"), 1));
        assert!(matches!(session.begin_page(), Admission::Entry(_)));
        assert!(matches!(session.begin_page(), Admission::CeilingReached));
    }

    #[test]
    fn test_outcome_ceiling() {
        let session = session(true, 1);
        let entry = match session.begin_page() {
            Admission::Entry(e) => e,
            other => panic!("expected entry, got {:?}", other),
        };
        session.page_completed(&entry.url, 10);
        assert_eq!(session.outcome(), CrawlOutcome::CeilingReached);
    }

    #[test]
    fn test_outcome_drained() {
        let session = session(true, 10);
        let entry = match session.begin_page() {
            Admission::Entry(e) => e,
            other => panic!("expected entry, got {:?}", other),
        };
        session.page_completed(&entry.url, 10);
        assert_eq!(session.outcome(), CrawlOutcome::Drained);
        assert!(session.drained());
    }

    #[test]
    fn test_asset_claimed_once() {
        let session = session(true, 10);
        let asset = url("/style.css");
        assert!(session.claim_asset(&asset));
        assert!(!session.claim_asset(&asset));
    }

    #[test]
    fn test_stop_blocks_new_admissions() {
        let session = session(true, 10);
        session.request_stop();
        assert!(matches!(session.begin_page(), Admission::CeilingReached));
    }
}
