//! Resolution of `include/@href` references
//!
//! The preprocessor delegates fetching of included schema fragments to an
//! [`InclusionResolver`]. The default [`FileInclusionResolver`] loads from
//! the local filesystem and memoizes each href so a fragment referenced
//! from several places is parsed once.

use std::collections::HashMap;
use std::path::PathBuf;

use sxd_document::Package;
use url::Url;

use crate::documents;
use crate::error::{Error, Result};

/// Resolves an `include/@href` value to a parsed XML document.
///
/// Implementations may cache; the preprocessor calls `resolve` once per
/// `include` element encountered, including those introduced by earlier
/// resolutions.
pub trait InclusionResolver {
    /// Resolve `href` to the document it refers to
    fn resolve(&mut self, href: &str) -> Result<&Package>;
}

/// Default resolver reading from the local filesystem.
///
/// Accepts plain paths (absolute or relative to an optional base directory)
/// and `file:` URLs. Remote schemes are rejected. Loaded documents are
/// memoized per href value.
pub struct FileInclusionResolver {
    base_dir: Option<PathBuf>,
    cache: HashMap<String, Package>,
}

impl FileInclusionResolver {
    /// Create a resolver interpreting relative hrefs against the process
    /// working directory
    pub fn new() -> Self {
        Self {
            base_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Create a resolver interpreting relative hrefs against `base_dir`
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            cache: HashMap::new(),
        }
    }

    fn href_to_path(&self, href: &str) -> Result<PathBuf> {
        if let Ok(uri) = Url::parse(href) {
            if uri.scheme() == "file" {
                return uri.to_file_path().map_err(|_| Error::Inclusion {
                    href: href.to_string(),
                    reason: "not a valid file URL".to_string(),
                });
            }
            // Single-letter schemes are Windows drive prefixes, not URLs.
            if uri.scheme().len() > 1 {
                return Err(Error::Inclusion {
                    href: href.to_string(),
                    reason: format!("unsupported scheme '{}'", uri.scheme()),
                });
            }
        }
        let path = PathBuf::from(href);
        if path.is_relative() {
            if let Some(base) = &self.base_dir {
                return Ok(base.join(path));
            }
        }
        Ok(path)
    }
}

impl Default for FileInclusionResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl InclusionResolver for FileInclusionResolver {
    fn resolve(&mut self, href: &str) -> Result<&Package> {
        if !self.cache.contains_key(href) {
            let path = self.href_to_path(href)?;
            let package = documents::parse_file(&path).map_err(|e| Error::Inclusion {
                href: href.to_string(),
                reason: e.to_string(),
            })?;
            self.cache.insert(href.to_string(), package);
        }
        // The entry was just inserted if it was missing.
        Ok(&self.cache[href])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fragment(dir: &std::path::Path, name: &str, xml: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(xml.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_resolve_plain_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fragment(dir.path(), "frag.xml", "<frag/>");

        let mut resolver = FileInclusionResolver::new();
        let package = resolver.resolve(path.to_str().unwrap()).unwrap();
        let doc = package.as_document();
        let root = documents::root_element(&doc).unwrap();
        assert_eq!(root.name().local_part(), "frag");
    }

    #[test]
    fn test_resolve_relative_to_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_fragment(dir.path(), "frag.xml", "<frag/>");

        let mut resolver = FileInclusionResolver::with_base_dir(dir.path());
        assert!(resolver.resolve("frag.xml").is_ok());
    }

    #[test]
    fn test_resolve_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fragment(dir.path(), "frag.xml", "<frag/>");

        let href = Url::from_file_path(&path).unwrap().to_string();
        let mut resolver = FileInclusionResolver::new();
        assert!(resolver.resolve(&href).is_ok());
    }

    #[test]
    fn test_rejects_remote_scheme() {
        let mut resolver = FileInclusionResolver::new();
        let err = resolver.resolve("http://example.org/frag.xml").unwrap_err();
        assert!(matches!(err, Error::Inclusion { .. }));
    }

    #[test]
    fn test_missing_file_is_inclusion_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut resolver = FileInclusionResolver::with_base_dir(dir.path());
        let err = resolver.resolve("absent.xml").unwrap_err();
        match err {
            Error::Inclusion { href, .. } => assert_eq!(href, "absent.xml"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_memoizes_per_href() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fragment(dir.path(), "frag.xml", "<frag/>");
        let href = path.to_str().unwrap().to_string();

        let mut resolver = FileInclusionResolver::new();
        resolver.resolve(&href).unwrap();

        // Removing the backing file must not matter once cached.
        std::fs::remove_file(&path).unwrap();
        assert!(resolver.resolve(&href).is_ok());
    }
}
