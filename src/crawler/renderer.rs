//! Dynamic render capability
//!
//! The headless-browser process is an external collaborator: the crawler
//! consumes it through the [`Renderer`] trait, so retry and extraction
//! logic never cares which engine produced the markup. The bundled
//! implementation shells out to a Chromium-family binary in headless mode;
//! tests substitute their own implementations.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Markup produced by a dynamic render, plus any resource URLs the render
/// engine observed loading while the page settled.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub html: String,
    pub resource_urls: Vec<String>,
}

#[derive(Debug, Error)]
#[error("render failed for {url}: {message}")]
pub struct RenderError {
    pub url: String,
    pub message: String,
}

/// Headless-render capability: load a page, wait for dynamic content to
/// settle, and hand back the resulting markup.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        url: &Url,
        wait: Duration,
        user_agent: &str,
    ) -> Result<Rendered, RenderError>;
}

/// Renders pages by invoking a local headless Chromium-family browser with
/// `--dump-dom`. The settle duration is passed as a virtual time budget.
///
/// This backend cannot observe network activity, so `resource_urls` is
/// always empty; resources are still picked up by re-extracting the
/// rendered DOM.
#[derive(Debug, Clone)]
pub struct HeadlessChromeRenderer {
    binary: PathBuf,
}

impl HeadlessChromeRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Renderer for HeadlessChromeRenderer {
    async fn render(
        &self,
        url: &Url,
        wait: Duration,
        user_agent: &str,
    ) -> Result<Rendered, RenderError> {
        let output = tokio::process::Command::new(&self.binary)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--dump-dom")
            .arg(format!("--user-agent={}", user_agent))
            .arg(format!("--virtual-time-budget={}", wait.as_millis()))
            .arg(url.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RenderError {
                url: url.to_string(),
                message: format!("failed to launch {}: {}", self.binary.display(), e),
            })?;

        if !output.status.success() {
            return Err(RenderError {
                url: url.to_string(),
                message: format!(
                    "{} exited with {}: {}",
                    self.binary.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            return Err(RenderError {
                url: url.to_string(),
                message: "renderer produced no markup".to_string(),
            });
        }

        Ok(Rendered {
            html,
            resource_urls: Vec::new(),
        })
    }
}
