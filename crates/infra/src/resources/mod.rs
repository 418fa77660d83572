//! Packaged resources served through the app scheme
//!
//! `<app-scheme>://assets/logo.png` maps to `<root>/assets/logo.png`. Every
//! request path is percent-decoded and normalized lexically before it is
//! joined to the canonical root; anything that would leave the root is
//! refused with the same not-found error as a missing file.

use std::path::{Path, PathBuf};

use loopgate_domain::{LoopgateError, Result};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::callback::{SchemePrivileges, SchemeRegistry};

/// Resource lookup failure
///
/// Deliberately carries no path: traversal attempts and missing files look
/// the same to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("resource not found")]
    NotFound,
}

impl From<ResourceError> for LoopgateError {
    fn from(err: ResourceError) -> Self {
        LoopgateError::NotFound(err.to_string())
    }
}

/// Canonical directory resources are served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRoot(PathBuf);

impl ResourceRoot {
    /// # Errors
    /// Returns `LoopgateError::Config` if `path` does not exist or is not a
    /// directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let canonical = path.canonicalize().map_err(|err| {
            LoopgateError::Config(format!("resource root {} is unusable: {err}", path.display()))
        })?;
        if !canonical.is_dir() {
            return Err(LoopgateError::Config(format!(
                "resource root {} is not a directory",
                path.display()
            )));
        }
        Ok(Self(canonical))
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// Maps app-scheme URLs to files under a [`ResourceRoot`]
#[derive(Debug, Clone)]
pub struct ResourceSchemeHandler {
    scheme: String,
    root: ResourceRoot,
    index_document: String,
}

impl ResourceSchemeHandler {
    #[must_use]
    pub fn new(
        scheme: impl Into<String>,
        root: ResourceRoot,
        index_document: impl Into<String>,
    ) -> Self {
        Self { scheme: scheme.into(), root, index_document: index_document.into() }
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn root(&self) -> &ResourceRoot {
        &self.root
    }

    /// Declare the app scheme: standard, secure, fetch and CORS enabled.
    ///
    /// # Errors
    /// Returns `LoopgateError::Platform` if the registry is already closed.
    pub fn register(&self, registry: &SchemeRegistry) -> Result<()> {
        registry.register(&self.scheme, SchemePrivileges::APP_RESOURCES)
    }

    /// Resolve a request URL to a file path under the root.
    ///
    /// # Errors
    /// Returns `ResourceError::NotFound` for unparseable URLs, other schemes,
    /// undecodable paths and anything resolving outside the root.
    pub fn resolve(&self, request_url: &str) -> std::result::Result<PathBuf, ResourceError> {
        let relative = self.request_path(request_url)?;

        let Some(segments) = normalize(&relative) else {
            warn!(
                event = "security.path_traversal_blocked",
                scheme = %self.scheme,
                "Path traversal attempt blocked"
            );
            return Err(ResourceError::NotFound);
        };

        let mut target = self.root.as_path().to_path_buf();
        if segments.is_empty() {
            target.push(&self.index_document);
        } else {
            target.extend(&segments);
        }

        if !target.starts_with(self.root.as_path()) {
            warn!(
                event = "security.path_traversal_blocked",
                scheme = %self.scheme,
                "Path traversal attempt blocked"
            );
            return Err(ResourceError::NotFound);
        }

        if target.exists() {
            let canonical = target.canonicalize().map_err(|_| ResourceError::NotFound)?;
            if !canonical.starts_with(self.root.as_path()) {
                warn!(
                    event = "security.path_traversal_blocked",
                    scheme = %self.scheme,
                    reason = "symlink",
                    "Resource resolves outside the root"
                );
                return Err(ResourceError::NotFound);
            }
        }

        Ok(target)
    }

    /// Resolve `request_url` and read the file.
    ///
    /// # Errors
    /// Returns `ResourceError::NotFound` when resolution fails or the file
    /// cannot be read.
    pub async fn load(&self, request_url: &str) -> std::result::Result<Vec<u8>, ResourceError> {
        let path = self.resolve(request_url)?;
        tokio::fs::read(&path).await.map_err(|err| {
            debug!(event = "resources.read_failed", kind = ?err.kind(), "Resource not readable");
            ResourceError::NotFound
        })
    }

    /// Decoded `host + path` of the request, without leading `/`.
    fn request_path(&self, request_url: &str) -> std::result::Result<String, ResourceError> {
        let parsed = Url::parse(request_url).map_err(|err| {
            debug!(event = "resources.request_unparseable", error = %err, "Error processing request");
            ResourceError::NotFound
        })?;
        if !parsed.scheme().eq_ignore_ascii_case(&self.scheme) {
            return Err(ResourceError::NotFound);
        }

        // Taken from the raw string: URL parsing would fold `..` segments
        // into the path and hide them from the traversal check.
        let after_scheme = &request_url[parsed.scheme().len()..];
        let rest = after_scheme.strip_prefix("://").ok_or(ResourceError::NotFound)?;
        let end = rest.find(['?', '#']).unwrap_or(rest.len());

        let decoded = urlencoding::decode(&rest[..end]).map_err(|_| ResourceError::NotFound)?;
        Ok(decoded.trim_start_matches('/').to_string())
    }
}

/// Lexically normalize a relative path. `None` if it climbs above its start
/// or names an absolute location.
fn normalize(relative: &str) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s if s.contains(':') || s.contains('\0') => return None,
            s => segments.push(s),
        }
    }
    Some(segments)
}
