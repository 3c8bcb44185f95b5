//! # Static Files Module
//!
//! Serves files for URL prefixes mapped to directories, ahead of route lookup.
//! A request under a mapped prefix is always answered here: with the file, or
//! with 404 when it is missing or the path tries to escape the directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

/// Outcome of looking up a request path under the static prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticLookup {
    /// File contents and content type
    File(Vec<u8>, &'static str),
    /// Under a static prefix, but nothing servable there
    NotFound,
}

/// URL prefix to directory mapping, longest prefix first.
#[derive(Debug, Clone, Default)]
pub struct StaticFiles {
    mounts: Vec<(String, PathBuf)>,
}

impl StaticFiles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `dir` under `prefix` (`/static`). Re-mounting a prefix replaces
    /// its directory.
    pub fn mount<P: Into<PathBuf>>(&mut self, prefix: &str, dir: P) {
        let prefix = normalize_prefix(prefix);
        self.mounts.retain(|(p, _)| *p != prefix);
        self.mounts.push((prefix, dir.into()));
        self.mounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Mounted URL prefixes, longest first.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().map(|(p, _)| p.as_str())
    }

    /// Whether `url_path` falls under a mounted prefix.
    #[must_use]
    pub fn covers(&self, url_path: &str) -> bool {
        self.mount_for(url_path).is_some()
    }

    /// Resolve `url_path`; `None` when it is not under any prefix.
    #[must_use]
    pub fn lookup(&self, url_path: &str) -> Option<StaticLookup> {
        let (dir, rest) = self.mount_for(url_path)?;
        let Some(path) = map_path(dir, rest) else {
            tracing::debug!(path = url_path, "static path rejected");
            return Some(StaticLookup::NotFound);
        };
        if !path.is_file() {
            return Some(StaticLookup::NotFound);
        }
        match fs::read(&path) {
            Ok(bytes) => Some(StaticLookup::File(bytes, content_type(&path))),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "static file unreadable");
                Some(StaticLookup::NotFound)
            }
        }
    }

    fn mount_for<'a>(&'a self, url_path: &'a str) -> Option<(&'a Path, &'a str)> {
        self.mounts.iter().find_map(|(prefix, dir)| {
            let rest = url_path.strip_prefix(prefix.as_str())?;
            if rest.is_empty() || rest.starts_with('/') || prefix == "/" {
                Some((dir.as_path(), rest))
            } else {
                None
            }
        })
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn map_path(base: &Path, rest: &str) -> Option<PathBuf> {
    let mut pb = base.to_path_buf();
    let mut pushed = false;
    for comp in Path::new(rest.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => {
                pb.push(s);
                pushed = true;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    pushed.then_some(pb)
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_path_prevents_traversal() {
        let base = Path::new("static");
        assert!(map_path(base, "/../Cargo.toml").is_none());
        assert!(map_path(base, "/a/../../b").is_none());
        assert_eq!(map_path(base, "/css/./site.css"), Some(base.join("css/site.css")));
        assert!(map_path(base, "/").is_none());
    }

    #[test]
    fn test_prefix_boundaries() {
        let mut sf = StaticFiles::new();
        sf.mount("/static/", "static");
        assert!(sf.covers("/static/app.js"));
        assert!(sf.covers("/static"));
        assert!(!sf.covers("/staticfoo"));
        assert!(!sf.covers("/api"));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut sf = StaticFiles::new();
        sf.mount("/assets", "a");
        sf.mount("/assets/img", "b");
        let (dir, rest) = sf.mount_for("/assets/img/logo.png").unwrap();
        assert_eq!(dir, Path::new("b"));
        assert_eq!(rest, "/logo.png");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("x.CSS")), "text/css");
        assert_eq!(content_type(Path::new("x")), "application/octet-stream");
    }
}
