//! Crawl scheduler
//!
//! Drives the fetch -> extract -> write -> enqueue loop with a fixed pool
//! of workers over the shared session. Each worker independently walks
//! `Idle -> Fetching -> Extracting -> Writing -> Idle` and enforces the
//! configured inter-request delay locally, so one slow host never stalls
//! the whole pool. A failed page sends the worker straight back to idle;
//! nothing a single page does can abort the crawl.

use crate::crawler::extractor::{ExtractedPage, Extractor, ResourceKind};
use crate::crawler::fetcher::{FetchMode, FetchOutcome, Fetcher};
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::session::{Admission, CrawlOutcome, CrawlSession};
use crate::output::MANIFEST_FILE;
use crate::storage::StorageWriter;
use crate::url::{local_path, normalize, CanonicalUrl};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How long an idle worker waits before re-polling a frontier that other
/// workers may still be feeding.
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Owns the worker pool for one crawl session.
pub struct Scheduler {
    session: Arc<CrawlSession>,
    fetcher: Arc<Fetcher>,
    extractor: Arc<Extractor>,
    writer: StorageWriter,
}

impl Scheduler {
    pub fn new(session: Arc<CrawlSession>, fetcher: Fetcher) -> Result<Self> {
        let config = session.config();
        let extractor = Arc::new(Extractor::new(config.start_url.clone()));
        let writer = StorageWriter::new(&config.output_root)?;
        Ok(Self {
            session,
            fetcher: Arc::new(fetcher),
            extractor,
            writer,
        })
    }

    /// Runs the crawl to completion: spawns the worker pool, waits for it
    /// to drain or hit the page ceiling, then writes the run manifest.
    pub async fn run(&self) -> Result<CrawlOutcome> {
        let worker_count = self.session.config().workers;
        tracing::info!(
            "starting crawl of {} with {} worker(s), ceiling {} page(s)",
            self.session.config().start_url,
            worker_count,
            self.session.config().effective_max_pages()
        );

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let worker = Worker {
                id: worker_id,
                session: Arc::clone(&self.session),
                fetcher: Arc::clone(&self.fetcher),
                extractor: Arc::clone(&self.extractor),
                writer: self.writer.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        for handle in handles {
            // a panicked worker is a bug, not a crawl failure; keep draining
            if let Err(e) = handle.await {
                tracing::error!("worker task aborted: {}", e);
            }
        }

        let outcome = self.session.outcome();
        let mut report = self.session.take_report();
        report.log_summary();

        match report.to_manifest_json() {
            Ok(json) => {
                if let Err(e) = self
                    .writer
                    .write(Path::new(MANIFEST_FILE), json.as_bytes())
                    .await
                {
                    tracing::warn!("failed to write run manifest: {}", e);
                }
            }
            Err(e) => tracing::warn!("failed to serialize run manifest: {}", e),
        }

        tracing::info!(
            "crawl finished: {:?}, {} page(s) completed",
            outcome,
            self.session.pages_completed()
        );
        Ok(outcome)
    }
}

struct Worker {
    id: usize,
    session: Arc<CrawlSession>,
    fetcher: Arc<Fetcher>,
    extractor: Arc<Extractor>,
    writer: StorageWriter,
}

impl Worker {
    async fn run(self) {
        loop {
            let entry = match self.session.begin_page() {
                Admission::Entry(entry) => entry,
                Admission::CeilingReached => break,
                Admission::Empty => {
                    if self.session.drained() || self.session.stop_requested() {
                        break;
                    }
                    tokio::time::sleep(IDLE_POLL).await;
                    continue;
                }
            };

            self.process_page(&entry).await;

            // inter-request delay, per worker
            tokio::time::sleep(self.session.config().delay).await;
        }
        tracing::debug!("worker {} finished", self.id);
    }

    /// Mirrors one page: fetch, extract, persist resources, persist the
    /// rewritten page, enqueue discovered links.
    async fn process_page(&self, entry: &FrontierEntry) {
        tracing::debug!(
            "worker {} fetching {} (depth {})",
            self.id,
            entry.url,
            entry.depth
        );

        let outcome = match self.fetcher.fetch_page(&entry.url).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("skipping page: {}", e);
                self.session.page_failed(&entry.url, e.attempts, &e.cause);
                return;
            }
        };

        let page_bytes = if outcome.is_html() {
            let extracted =
                self.extractor
                    .extract_page(&entry.url, &outcome.final_url, &outcome.body_text());

            self.mirror_resources(&extracted).await;
            self.mirror_reported_resources(&outcome).await;

            for link in &extracted.links {
                if self.session.offer_link(link.clone(), entry.depth + 1) {
                    tracing::debug!("enqueued {} at depth {}", link, entry.depth + 1);
                }
            }

            extracted.html.into_bytes()
        } else if outcome.is_css()
            || ResourceKind::classify(entry.url.path()) == ResourceKind::Stylesheet
        {
            // a stylesheet reachable as a page gets the same rewrite as
            // one reached as an asset, so both paths write identical
            // bytes to the shared local file
            let (rewritten, nested) =
                self.extractor
                    .rewrite_css(&entry.url, &outcome.final_url, &outcome.body_text());
            self.mirror_worklist(nested.into_iter().map(|r| (r.url, r.kind)).collect())
                .await;
            rewritten.into_bytes()
        } else {
            // other non-HTML pages (PDFs and friends) are mirrored verbatim
            outcome.body
        };

        match self.writer.write(&local_path(&entry.url), &page_bytes).await {
            Ok(path) => {
                tracing::info!("mirrored {} -> {}", entry.url, path.display());
                self.session
                    .page_completed(&entry.url, page_bytes.len() as u64);
            }
            Err(e) => {
                tracing::warn!("failed to persist {}: {}", entry.url, e);
                self.session.page_failed(&entry.url, 1, &e.to_string());
            }
        }
    }

    /// Downloads and persists the in-scope resources a page references.
    /// Stylesheets get their own reference scan, so nested assets (fonts,
    /// background images, imported sheets) join the worklist too.
    async fn mirror_resources(&self, extracted: &ExtractedPage) {
        let initial = extracted
            .resources
            .iter()
            .map(|r| (r.url.clone(), r.kind))
            .collect();
        self.mirror_worklist(initial).await;
    }

    /// Resources the render capability reported as loaded during a
    /// dynamic fetch; they may not appear in the markup at all.
    async fn mirror_reported_resources(&self, outcome: &FetchOutcome) {
        let mut initial = Vec::new();
        for raw in &outcome.reported_resources {
            let url = match normalize(&outcome.final_url, raw) {
                Ok(u) => u,
                Err(e) => {
                    tracing::debug!("skipping reported resource {:?}: {}", raw, e);
                    continue;
                }
            };
            if !self.extractor.in_scope(&url) {
                continue;
            }
            let kind = ResourceKind::classify(url.path());
            initial.push((url, kind));
        }
        self.mirror_worklist(initial).await;
    }

    /// Claims and mirrors each queued asset, following the references
    /// discovered inside stylesheets until the worklist drains. Already
    /// claimed assets are skipped.
    async fn mirror_worklist(&self, mut worklist: Vec<(CanonicalUrl, ResourceKind)>) {
        while let Some((url, kind)) = worklist.pop() {
            if !self.session.claim_asset(&url) {
                continue;
            }
            for nested in self.mirror_asset(&url, kind).await {
                worklist.push(nested);
            }
        }
    }

    /// Fetches and persists one asset. Returns further assets discovered
    /// inside it (stylesheet references), which the caller is expected to
    /// mirror in turn; the asset itself must already be claimed.
    async fn mirror_asset(
        &self,
        url: &CanonicalUrl,
        kind: ResourceKind,
    ) -> Vec<(CanonicalUrl, ResourceKind)> {
        let outcome = match self.fetcher.fetch(url, FetchMode::Static).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("skipping resource: {}", e);
                self.session
                    .record_resource_failure(url, e.attempts, &e.cause);
                return Vec::new();
            }
        };

        let mut discovered = Vec::new();
        let bytes = if kind == ResourceKind::Stylesheet || outcome.is_css() {
            let (rewritten, nested) =
                self.extractor
                    .rewrite_css(url, &outcome.final_url, &outcome.body_text());
            for resource in nested {
                discovered.push((resource.url, resource.kind));
            }
            rewritten.into_bytes()
        } else {
            outcome.body
        };

        match self.writer.write(&local_path(url), &bytes).await {
            Ok(_) => self.session.record_resource(bytes.len() as u64),
            Err(e) => {
                tracing::warn!("failed to persist resource {}: {}", url, e);
                self.session.record_resource_failure(url, 1, &e.to_string());
            }
        }
        discovered
    }
}
