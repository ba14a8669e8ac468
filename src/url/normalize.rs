use crate::UrlError;
use std::fmt;
use url::Url;

/// Reference schemes that are filtered out before normalization. These are
/// not errors; markup routinely contains them and they are simply not
/// fetchable.
const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// A normalized, fragment-free URL used as the dedup identity for a crawl.
///
/// Construction goes through [`normalize`] or [`normalize_start`], which
/// guarantee an http(s) scheme, a lowercased host, a dot-segment-free path,
/// and no fragment. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The lowercased host. Always present by construction.
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or("")
    }

    pub fn port(&self) -> Option<u16> {
        self.0.port()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.0.query()
    }

    /// Whether this URL and `other` share a host. Scheme and port are not
    /// compared, so an `http://` link on an `https://` page stays in
    /// crawl scope.
    pub fn same_host(&self, other: &CanonicalUrl) -> bool {
        self.host() == other.host()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returns whether a raw reference found in markup is worth resolving.
///
/// Empty references, fragment-only anchors, and non-fetchable schemes
/// (`javascript:`, `mailto:`, `tel:`, `data:`) are filtered here, before
/// normalization, so they never surface as errors.
pub fn is_followable(reference: &str) -> bool {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return false;
    }
    !SKIPPED_SCHEMES
        .iter()
        .any(|scheme| starts_with_ignore_case(reference, scheme))
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Resolves a reference against a base URL and canonicalizes the result.
///
/// Handles relative forms (`./`, `../`, bare paths), protocol-relative
/// `//host/...` references, and absolute URLs. The fragment is dropped,
/// scheme and host are lowercased, and redundant `/.`/`/..` path segments
/// are collapsed. Pure function, no I/O.
pub fn normalize(base: &Url, reference: &str) -> Result<CanonicalUrl, UrlError> {
    let reference = reference.trim();
    let joined = base.join(reference).map_err(|e| UrlError::Malformed {
        reference: reference.to_string(),
        message: e.to_string(),
    })?;
    canonicalize(joined)
}

/// Parses and canonicalizes an absolute URL, e.g. the crawl's start URL.
pub fn normalize_start(raw: &str) -> Result<CanonicalUrl, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Malformed {
        reference: raw.to_string(),
        message: e.to_string(),
    })?;
    canonicalize(url)
}

fn canonicalize(mut url: Url) -> Result<CanonicalUrl, UrlError> {
    // Url::parse already lowercases the scheme
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .ok_or(UrlError::MissingHost)?
        .to_lowercase();
    url.set_host(Some(&host)).map_err(|e| UrlError::Malformed {
        reference: url.as_str().to_string(),
        message: e.to_string(),
    })?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);
    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(CanonicalUrl(url))
}

/// Collapses dot segments and duplicate slashes, and removes the trailing
/// slash except on the root path. `/a/../b/` and `/b` canonicalize alike.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}
