//! Post-run reporting
//!
//! Every non-fatal failure is recorded with enough context (URL, attempt
//! count, underlying cause) for post-run inspection, and the totals are
//! serialized into a `mirror-manifest.json` under the output root at the
//! end of a run. Failures never change the process exit code.

use serde::Serialize;

/// File name of the JSON manifest written under the output root.
pub const MANIFEST_FILE: &str = "mirror-manifest.json";

/// A non-fatal failure recorded during the crawl.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub url: String,
    pub attempts: u32,
    pub error: String,
}

/// Accumulated totals for a single crawl session.
#[derive(Debug, Default, Serialize)]
pub struct CrawlReport {
    pub pages_mirrored: usize,
    pub resources_mirrored: usize,
    pub bytes_written: u64,
    pub pages: Vec<String>,
    pub failures: Vec<FailureRecord>,
}

impl CrawlReport {
    pub fn record_page(&mut self, url: &str, bytes: u64) {
        self.pages_mirrored += 1;
        self.bytes_written += bytes;
        self.pages.push(url.to_string());
    }

    pub fn record_resource(&mut self, bytes: u64) {
        self.resources_mirrored += 1;
        self.bytes_written += bytes;
    }

    pub fn record_failure(&mut self, url: &str, attempts: u32, error: &str) {
        self.failures.push(FailureRecord {
            url: url.to_string(),
            attempts,
            error: error.to_string(),
        });
    }

    /// Serializes the report as pretty-printed JSON. Pages and failures
    /// are sorted first so the manifest is byte-stable across runs
    /// regardless of worker interleaving.
    pub fn to_manifest_json(&mut self) -> serde_json::Result<String> {
        self.pages.sort();
        self.failures.sort_by(|a, b| a.url.cmp(&b.url));
        serde_json::to_string_pretty(self)
    }

    /// Logs a one-line summary plus one line per failure.
    pub fn log_summary(&self) {
        tracing::info!(
            "mirrored {} page(s) and {} resource(s), {} bytes written, {} failure(s)",
            self.pages_mirrored,
            self.resources_mirrored,
            self.bytes_written,
            self.failures.len()
        );
        for failure in &self.failures {
            tracing::warn!(
                "failed after {} attempt(s): {} ({})",
                failure.attempts,
                failure.url,
                failure.error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_accumulate() {
        let mut report = CrawlReport::default();
        report.record_page("https://a.com/", 100);
        report.record_page("https://a.com/p1", 50);
        report.record_resource(25);

        assert_eq!(report.pages_mirrored, 2);
        assert_eq!(report.resources_mirrored, 1);
        assert_eq!(report.bytes_written, 175);
    }

    #[test]
    fn test_manifest_is_order_independent() {
        let mut first = CrawlReport::default();
        first.record_page("https://a.com/b", 1);
        first.record_page("https://a.com/a", 1);

        let mut second = CrawlReport::default();
        second.record_page("https://a.com/a", 1);
        second.record_page("https://a.com/b", 1);

        assert_eq!(
            first.to_manifest_json().unwrap(),
            second.to_manifest_json().unwrap()
        );
    }

    #[test]
    fn test_failures_carry_context() {
        let mut report = CrawlReport::default();
        report.record_failure("https://a.com/broken", 4, "HTTP 503");

        let json = report.to_manifest_json().unwrap();
        assert!(json.contains("https://a.com/broken"));
        assert!(json.contains("\"attempts\": 4"));
        assert!(json.contains("HTTP 503"));
    }
}
