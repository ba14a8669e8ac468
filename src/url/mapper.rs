use super::CanonicalUrl;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Maps a canonical URL to a relative file path under the output root.
///
/// The mapping is deterministic and preserves site structure:
///
/// - the host becomes the top-level directory (`host_port` when the URL
///   carries an explicit port, so distinct origins never collide)
/// - path segments are kept as directories
/// - an empty path, or a final segment without an extension, maps to an
///   `index.html` inside that directory, which keeps extensionless page
///   URLs from clashing with deeper paths (`/docs` vs `/docs/guide.html`)
/// - a query string is hashed into the file name, so `page?id=1` and
///   `page?id=2` land in distinct files
///
/// No network or disk access.
pub fn local_path(url: &CanonicalUrl) -> PathBuf {
    let host_dir = match url.port() {
        Some(port) => format!("{}_{}", url.host(), port),
        None => url.host().to_string(),
    };
    let mut path = PathBuf::from(sanitize(&host_dir));

    let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();

    let file = match segments.split_last() {
        Some((last, dirs)) if last.contains('.') => {
            for dir in dirs {
                path.push(sanitize(dir));
            }
            (*last).to_string()
        }
        Some((last, dirs)) => {
            for dir in dirs {
                path.push(sanitize(dir));
            }
            path.push(sanitize(last));
            "index.html".to_string()
        }
        None => "index.html".to_string(),
    };

    path.push(match url.query() {
        Some(query) => tag_file_name(&sanitize(&file), &short_hash(query)),
        None => sanitize(&file),
    });

    path
}

/// Inserts a query hash before the file extension: `page.html` with tag
/// `ab12cd34` becomes `page-ab12cd34.html`.
fn tag_file_name(file: &str, tag: &str) -> String {
    match file.rfind('.') {
        Some(dot) => format!("{}-{}{}", &file[..dot], tag, &file[dot..]),
        None => format!("{}-{}", file, tag),
    }
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..4])
}

/// Replaces characters that are unsafe in file names on common filesystems.
fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            ':' | '?' | '*' | '"' | '<' | '>' | '|' | '\\' => '_',
            _ => c,
        })
        .collect()
}

/// Computes the relative path from one directory to a target, both given
/// relative to the same root. Used to rewrite references so a mirrored page
/// links to its neighbours without knowing where the root lives on disk.
pub fn relative_from(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from_dir.components().collect();
    let to_parts: Vec<_> = to.components().collect();

    let common = from
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for part in &to_parts[common..] {
        result.push(part);
    }
    result
}
