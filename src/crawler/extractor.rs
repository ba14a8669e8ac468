//! Resource extractor and reference rewriter
//!
//! Parses fetched HTML to discover stylesheet links, script sources, image
//! sources (including `srcset` variants), and hyperlinks, and parses CSS
//! for `url(...)` and `@import` references. Every in-scope reference in
//! the emitted text is replaced with a relative local path, so the
//! mirrored tree is browsable without network access; out-of-scope
//! references are rewritten to their resolved absolute URL and are not
//! mirrored.
//!
//! Relative references are resolved against the URL the content was
//! actually served from (post-redirect), not the canonical form: the
//! canonical URL strips trailing slashes, which would make `pic.png` on a
//! page served at `/docs/` resolve to `/pic.png` instead of
//! `/docs/pic.png`. The canonical URL stays the dedup identity and fixes
//! the mirrored location.

use crate::url::{is_followable, local_path, normalize, relative_from, CanonicalUrl};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use url::Url;

/// What role a discovered reference plays in the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Stylesheet,
    Script,
    Image,
    Hyperlink,
}

impl ResourceKind {
    /// Classifies a bare URL path by extension. Used for references that
    /// carry no markup context, such as CSS `url(...)` entries and
    /// resources reported by the render capability.
    pub fn classify(path: &str) -> Self {
        let ext = path
            .rsplit('/')
            .next()
            .and_then(|f| f.rsplit_once('.'))
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "css" => Self::Stylesheet,
            "js" | "mjs" => Self::Script,
            _ => Self::Image,
        }
    }
}

/// A reference discovered in markup or CSS, resolved and in scope.
#[derive(Debug, Clone)]
pub struct ResourceRef {
    /// The reference text as found in the source.
    pub original: String,

    /// The resolved canonical URL.
    pub url: CanonicalUrl,

    pub kind: ResourceKind,
}

/// Output of extracting one page.
#[derive(Debug)]
pub struct ExtractedPage {
    /// Page markup with every discovered reference rewritten.
    pub html: String,

    /// In-scope resources to mirror, in discovery order.
    pub resources: Vec<ResourceRef>,

    /// In-scope hyperlink targets, candidates for the frontier.
    pub links: Vec<CanonicalUrl>,
}

/// HTML attribute selectors examined for single-URL references.
const REF_SELECTORS: &[(&str, &str, ResourceKind)] = &[
    ("link[rel='stylesheet'][href]", "href", ResourceKind::Stylesheet),
    ("script[src]", "src", ResourceKind::Script),
    ("img[src]", "src", ResourceKind::Image),
    ("a[href]", "href", ResourceKind::Hyperlink),
];

/// Discovers and rewrites references relative to a fixed domain scope.
pub struct Extractor {
    scope: CanonicalUrl,
}

impl Extractor {
    /// `scope` is the crawl's start URL; only references sharing its host
    /// are mirrored.
    pub fn new(scope: CanonicalUrl) -> Self {
        Self { scope }
    }

    pub fn in_scope(&self, url: &CanonicalUrl) -> bool {
        url.same_host(&self.scope)
    }

    /// Extracts references from a page and produces the rewritten markup.
    /// `base` is the URL the markup was served from; relative references
    /// resolve against it. `page_url` fixes the page's mirrored location.
    pub fn extract_page(
        &self,
        page_url: &CanonicalUrl,
        base: &Url,
        html: &str,
    ) -> ExtractedPage {
        let document = Html::parse_document(html);
        let page_dir = parent_dir(&local_path(page_url));

        let mut resources = Vec::new();
        let mut links = Vec::new();
        let mut rewrites: Vec<(&'static str, String, String)> = Vec::new();
        let mut seen_rewrites: HashSet<(&'static str, String)> = HashSet::new();

        for &(selector_str, attr, kind) in REF_SELECTORS {
            // Selectors are compile-time constants; parse cannot fail.
            let selector = match Selector::parse(selector_str) {
                Ok(s) => s,
                Err(_) => continue,
            };
            for element in document.select(&selector) {
                let raw = match element.value().attr(attr) {
                    Some(v) => v,
                    None => continue,
                };
                if let Some(rewritten) =
                    self.process_reference(base, &page_dir, raw, kind, &mut resources, &mut links)
                {
                    if rewritten != raw && seen_rewrites.insert((attr, raw.to_string())) {
                        rewrites.push((attr, raw.to_string(), rewritten));
                    }
                }
            }
        }

        // Responsive image variants carry several URLs in one attribute.
        if let Ok(selector) = Selector::parse("img[srcset], source[srcset]") {
            for element in document.select(&selector) {
                let raw = match element.value().attr("srcset") {
                    Some(v) => v,
                    None => continue,
                };
                let rewritten = self.rewrite_srcset(base, &page_dir, raw, &mut resources);
                if rewritten != raw && seen_rewrites.insert(("srcset", raw.to_string())) {
                    rewrites.push(("srcset", raw.to_string(), rewritten));
                }
            }
        }

        let mut output = html.to_string();
        for (attr, old, new) in &rewrites {
            output = replace_attr(&output, attr, old, new);
        }

        ExtractedPage {
            html: output,
            resources,
            links,
        }
    }

    /// Extracts `url(...)` and `@import` references from a stylesheet and
    /// rewrites them relative to the stylesheet's own mirrored location,
    /// so nested assets (fonts, background images) resolve offline too.
    /// `base` is the URL the stylesheet was served from.
    pub fn rewrite_css(
        &self,
        css_url: &CanonicalUrl,
        base: &Url,
        css: &str,
    ) -> (String, Vec<ResourceRef>) {
        let css_dir = parent_dir(&local_path(css_url));
        let mut resources = Vec::new();
        let mut output = css.to_string();

        for css_ref in scan_css_refs(css) {
            if !is_followable(&css_ref.reference) {
                continue;
            }
            let url = match normalize(base, &css_ref.reference) {
                Ok(u) => u,
                Err(e) => {
                    tracing::debug!(
                        "skipping malformed CSS reference {:?}: {}",
                        css_ref.reference,
                        e
                    );
                    continue;
                }
            };

            let replacement = if self.in_scope(&url) {
                let rel = path_str(&relative_from(&css_dir, &local_path(&url)));
                resources.push(ResourceRef {
                    original: css_ref.reference.clone(),
                    url: url.clone(),
                    kind: ResourceKind::classify(url.path()),
                });
                rel
            } else {
                url.as_str().to_string()
            };

            if replacement != css_ref.reference {
                output = replace_css_ref(&output, &css_ref, &replacement);
            }
        }

        (output, resources)
    }

    /// Resolves one reference and returns its rewritten form, collecting
    /// it as a resource or frontier link when it is in scope.
    fn process_reference(
        &self,
        base: &Url,
        page_dir: &Path,
        raw: &str,
        kind: ResourceKind,
        resources: &mut Vec<ResourceRef>,
        links: &mut Vec<CanonicalUrl>,
    ) -> Option<String> {
        if !is_followable(raw) {
            return None;
        }

        // Keep the fragment for hyperlinks; it still addresses an anchor
        // inside the mirrored page.
        let (base_ref, fragment) = match raw.split_once('#') {
            Some((b, f)) if kind == ResourceKind::Hyperlink => (b, Some(f)),
            _ => (raw, None),
        };

        let url = match normalize(base, base_ref) {
            Ok(u) => u,
            Err(e) => {
                tracing::debug!("skipping malformed reference {:?}: {}", raw, e);
                return None;
            }
        };

        if self.in_scope(&url) {
            let rel = path_str(&relative_from(page_dir, &local_path(&url)));
            match kind {
                ResourceKind::Hyperlink => links.push(url),
                _ => resources.push(ResourceRef {
                    original: raw.to_string(),
                    url,
                    kind,
                }),
            }
            Some(match fragment {
                Some(f) => format!("{}#{}", rel, f),
                None => rel,
            })
        } else {
            // Not mirrored: pin the reference to its absolute form so
            // protocol-relative and oddly-resolved links stay reachable.
            Some(match fragment {
                Some(f) => format!("{}#{}", url.as_str(), f),
                None => url.as_str().to_string(),
            })
        }
    }

    fn rewrite_srcset(
        &self,
        base: &Url,
        page_dir: &Path,
        srcset: &str,
        resources: &mut Vec<ResourceRef>,
    ) -> String {
        let mut candidates = Vec::new();
        for candidate in srcset.split(',') {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                continue;
            }
            let mut parts = candidate.split_whitespace();
            let candidate_url = parts.next().unwrap_or("");
            let descriptor = parts.collect::<Vec<_>>().join(" ");

            let rewritten = self
                .process_reference(
                    base,
                    page_dir,
                    candidate_url,
                    ResourceKind::Image,
                    resources,
                    &mut Vec::new(),
                )
                .unwrap_or_else(|| candidate_url.to_string());

            if descriptor.is_empty() {
                candidates.push(rewritten);
            } else {
                candidates.push(format!("{} {}", rewritten, descriptor));
            }
        }
        candidates.join(", ")
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Replaces a quoted attribute value in raw markup, covering both quote
/// styles. Rewriting the attribute together with its value keeps short
/// values like `/` from matching unrelated text.
fn replace_attr(html: &str, attr: &str, old: &str, new: &str) -> String {
    html.replace(
        &format!("{}=\"{}\"", attr, old),
        &format!("{}=\"{}\"", attr, new),
    )
    .replace(
        &format!("{}='{}'", attr, old),
        &format!("{}='{}'", attr, new),
    )
}

/// One reference found in CSS text. Carrying the exact source token lets
/// the rewrite target precisely what the scan matched, padding and quote
/// style included.
struct CssRef {
    /// Exact text between `url(` and `)`, or the quoted `@import` target
    /// including its quotes.
    token: String,

    /// The bare reference with quotes and padding stripped.
    reference: String,
}

/// Replaces one scanned reference in CSS text, preserving the original
/// quoting. Quoted tokens are swapped wherever they appear, which also
/// covers padded forms like `url( "x.png" )`; bare tokens are swapped
/// together with their surrounding `url(...)`.
fn replace_css_ref(css: &str, css_ref: &CssRef, new: &str) -> String {
    let trimmed = css_ref.token.trim();
    if trimmed.starts_with('"') || trimmed.starts_with('\'') {
        let quote = &trimmed[..1];
        css.replace(
            &format!("{}{}{}", quote, css_ref.reference, quote),
            &format!("{}{}{}", quote, new, quote),
        )
    } else {
        css.replace(
            &format!("url({})", css_ref.token),
            &format!("url({})", new),
        )
    }
}

/// Collects references from CSS: `url(...)` arguments and quoted
/// `@import` targets. String scanning, no CSS object model.
fn scan_css_refs(css: &str) -> Vec<CssRef> {
    let mut refs = Vec::new();
    let mut seen = HashSet::new();

    let mut rest = css;
    while let Some(pos) = rest.find("url(") {
        rest = &rest[pos + 4..];
        let end = match rest.find(')') {
            Some(e) => e,
            None => break,
        };
        let token = &rest[..end];
        let reference = token.trim().trim_matches('"').trim_matches('\'').trim();
        if !reference.is_empty() && seen.insert(token.to_string()) {
            refs.push(CssRef {
                token: token.to_string(),
                reference: reference.to_string(),
            });
        }
        rest = &rest[end + 1..];
    }

    let mut rest = css;
    while let Some(pos) = rest.find("@import") {
        rest = &rest[pos + 7..];
        let trimmed = rest.trim_start();
        if let Some(quote) = trimmed.chars().next().filter(|c| *c == '"' || *c == '\'') {
            if let Some(end) = trimmed[1..].find(quote) {
                let token = &trimmed[..end + 2];
                let reference = &trimmed[1..1 + end];
                if !reference.is_empty() && seen.insert(token.to_string()) {
                    refs.push(CssRef {
                        token: token.to_string(),
                        reference: reference.to_string(),
                    });
                }
            }
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::normalize_start;

    fn extractor() -> Extractor {
        Extractor::new(normalize_start("https://example.com/").unwrap())
    }

    fn page() -> CanonicalUrl {
        normalize_start("https://example.com/").unwrap()
    }

    fn extract(html: &str) -> ExtractedPage {
        let page = page();
        let base = page.as_url().clone();
        extractor().extract_page(&page, &base, html)
    }

    fn rewrite(css_url: &str, css: &str) -> (String, Vec<ResourceRef>) {
        let url = normalize_start(css_url).unwrap();
        let base = url.as_url().clone();
        extractor().rewrite_css(&url, &base, css)
    }

    #[test]
    fn test_stylesheet_discovered_and_rewritten() {
        let html = r#"<html><head><link rel="stylesheet" href="/css/site.css"></head><body></body></html>"#;
        let extracted = extract(html);

        assert_eq!(extracted.resources.len(), 1);
        assert_eq!(extracted.resources[0].kind, ResourceKind::Stylesheet);
        assert_eq!(
            extracted.resources[0].url.as_str(),
            "https://example.com/css/site.css"
        );
        assert!(extracted.html.contains(r#"href="css/site.css""#));
    }

    #[test]
    fn test_script_and_image_discovered() {
        let html = r#"<html><body><script src="/app.js"></script><img src="/img/logo.png"></body></html>"#;
        let extracted = extract(html);

        let kinds: Vec<_> = extracted.resources.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&ResourceKind::Script));
        assert!(kinds.contains(&ResourceKind::Image));
        assert!(extracted.html.contains(r#"src="app.js""#));
        assert!(extracted.html.contains(r#"src="img/logo.png""#));
    }

    #[test]
    fn test_same_domain_hyperlink_collected_and_localized() {
        let html = r#"<html><body><a href="/page1">One</a></body></html>"#;
        let extracted = extract(html);

        assert_eq!(extracted.links.len(), 1);
        assert_eq!(extracted.links[0].as_str(), "https://example.com/page1");
        assert!(extracted.html.contains(r#"href="page1/index.html""#));
    }

    #[test]
    fn test_hyperlink_fragment_preserved() {
        let html = r##"<html><body><a href="/page1#section">One</a></body></html>"##;
        let extracted = extract(html);

        assert!(extracted.html.contains(r##"href="page1/index.html#section""##));
        assert_eq!(extracted.links.len(), 1);
    }

    #[test]
    fn test_external_reference_not_mirrored() {
        let html = r#"<html><body><a href="https://other.com/about">Out</a><img src="https://cdn.other.com/pic.png"></body></html>"#;
        let extracted = extract(html);

        assert!(extracted.links.is_empty());
        assert!(extracted.resources.is_empty());
        assert!(extracted.html.contains("https://other.com/about"));
        assert!(extracted.html.contains("https://cdn.other.com/pic.png"));
    }

    #[test]
    fn test_protocol_relative_external_pinned_to_absolute() {
        let html = r#"<html><body><script src="//cdn.other.com/lib.js"></script></body></html>"#;
        let extracted = extract(html);

        assert!(extracted.resources.is_empty());
        assert!(extracted
            .html
            .contains(r#"src="https://cdn.other.com/lib.js""#));
    }

    #[test]
    fn test_skips_unfetchable_schemes() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:a@b.com">Mail</a>
            <a href="#top">Anchor</a>
            <img src="data:image/png;base64,AAAA">
        </body></html>"##;
        let extracted = extract(html);

        assert!(extracted.links.is_empty());
        assert!(extracted.resources.is_empty());
        assert_eq!(extracted.html, html);
    }

    #[test]
    fn test_srcset_variants_discovered() {
        let html = r#"<html><body><img srcset="/img/small.png 480w, /img/big.png 1024w" src="/img/big.png"></body></html>"#;
        let extracted = extract(html);

        let urls: Vec<_> = extracted
            .resources
            .iter()
            .map(|r| r.url.as_str().to_string())
            .collect();
        assert!(urls.contains(&"https://example.com/img/small.png".to_string()));
        assert!(urls.contains(&"https://example.com/img/big.png".to_string()));
        assert!(extracted
            .html
            .contains(r#"srcset="img/small.png 480w, img/big.png 1024w""#));
    }

    #[test]
    fn test_rewrite_relative_to_nested_page() {
        let nested = normalize_start("https://example.com/blog/post1").unwrap();
        let base = nested.as_url().clone();
        let html = r#"<html><body><img src="/img/logo.png"><a href="/">Home</a></body></html>"#;
        let extracted = extractor().extract_page(&nested, &base, html);

        // page lives at example.com/blog/post1/index.html
        assert!(extracted.html.contains(r#"src="../../img/logo.png""#));
        assert!(extracted.html.contains(r#"href="../../index.html""#));
    }

    #[test]
    fn test_relative_ref_resolved_against_served_url() {
        // the canonical form strips the trailing slash, but a page served
        // at /docs/ resolves bare references under /docs/
        let page = normalize_start("https://example.com/docs/").unwrap();
        let served = Url::parse("https://example.com/docs/").unwrap();
        let html = r#"<html><body><img src="pic.png"><a href="guide">Guide</a></body></html>"#;
        let extracted = extractor().extract_page(&page, &served, html);

        assert_eq!(extracted.resources.len(), 1);
        assert_eq!(
            extracted.resources[0].url.as_str(),
            "https://example.com/docs/pic.png"
        );
        assert_eq!(extracted.links.len(), 1);
        assert_eq!(
            extracted.links[0].as_str(),
            "https://example.com/docs/guide"
        );
    }

    #[test]
    fn test_css_url_refs_rewritten() {
        let css = r#"body { background: url('/img/bg.png'); }
@font-face { src: url("fonts/face.woff2"); }"#;

        let (rewritten, resources) = rewrite("https://example.com/css/site.css", css);

        assert_eq!(resources.len(), 2);
        assert!(rewritten.contains("url('../img/bg.png')"));
        assert!(rewritten.contains(r#"url("fonts/face.woff2")"#));
        assert_eq!(
            resources[1].url.as_str(),
            "https://example.com/css/fonts/face.woff2"
        );
    }

    #[test]
    fn test_css_import_rewritten() {
        let css = r#"@import "/css/reset.css";"#;

        let (rewritten, resources) = rewrite("https://example.com/css/site.css", css);

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind, ResourceKind::Stylesheet);
        assert!(rewritten.contains(r#"@import "reset.css""#));
    }

    #[test]
    fn test_css_padded_url_rewritten() {
        let css = r#"div { background: url( "/img/bg.png" ); }"#;

        let (rewritten, resources) = rewrite("https://example.com/css/site.css", css);

        assert_eq!(resources.len(), 1);
        assert!(rewritten.contains(r#"url( "../img/bg.png" )"#), "css: {rewritten}");
    }

    #[test]
    fn test_css_external_ref_pinned() {
        let css = "div { background: url(//cdn.other.com/tile.png); }";

        let (rewritten, resources) = rewrite("https://example.com/css/site.css", css);

        assert!(resources.is_empty());
        assert!(rewritten.contains("url(https://cdn.other.com/tile.png)"));
    }

    #[test]
    fn test_css_data_uri_untouched() {
        let css = "div { background: url(data:image/png;base64,AAAA); }";

        let (rewritten, resources) = rewrite("https://example.com/site.css", css);

        assert!(resources.is_empty());
        assert_eq!(rewritten, css);
    }

    #[test]
    fn test_scan_css_refs() {
        let css = r#"
            @import "reset.css";
            a { background: url(one.png); }
            b { background: url('two.png'); }
            c { background: url( "three.png" ); }
        "#;
        let refs: Vec<_> = scan_css_refs(css)
            .into_iter()
            .map(|r| r.reference)
            .collect();
        assert_eq!(refs, vec!["one.png", "two.png", "three.png", "reset.css"]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(ResourceKind::classify("/a/site.css"), ResourceKind::Stylesheet);
        assert_eq!(ResourceKind::classify("/a/app.js"), ResourceKind::Script);
        assert_eq!(ResourceKind::classify("/a/pic.PNG"), ResourceKind::Image);
        assert_eq!(ResourceKind::classify("/a/face.woff2"), ResourceKind::Image);
    }

    #[test]
    fn test_duplicate_references_rewritten_once_each() {
        let html = r#"<html><body><img src="/logo.png"><img src="/logo.png"></body></html>"#;
        let extracted = extract(html);

        // collected twice, but the rewrite applies cleanly to both
        assert_eq!(extracted.resources.len(), 2);
        assert_eq!(extracted.html.matches(r#"src="logo.png""#).count(), 2);
    }
}
