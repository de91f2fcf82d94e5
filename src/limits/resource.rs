//! Physical limits resources
//!
//! A resource name resolves, in order, to:
//! 1. a file at the exact path
//! 2. a file under the base directory
//! 3. an embedded resource whose key ends with the name
//! 4. a remote document when the name is an `http(s)://` URL
//!
//! Embedded and remote resources are read-only.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading or writing resources
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Limits resource '{0}' not found")]
    NotFound(String),

    #[error("Limits resource '{0}' is read-only")]
    ReadOnly(String),

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to fetch '{url}': {message}")]
    Fetch { url: String, message: String },

    #[error(
        "Limits resource '{path}' was changed by someone else (expected checksum {expected}, actual {actual}); save skipped"
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// Where a resource name resolved to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceOrigin {
    File(PathBuf),
    Embedded(String),
    Remote(String),
}

impl ResourceOrigin {
    pub fn is_writable(&self) -> bool {
        matches!(self, ResourceOrigin::File(_))
    }

    pub fn describe(&self) -> String {
        match self {
            ResourceOrigin::File(path) => path.display().to_string(),
            ResourceOrigin::Embedded(key) => format!("embedded:{}", key),
            ResourceOrigin::Remote(url) => url.clone(),
        }
    }
}

/// Resource content together with its checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub origin: ResourceOrigin,
    pub content: String,
    pub checksum: String,
}

/// Resolves resource names and performs the physical I/O
#[derive(Debug, Clone, Default)]
pub struct ResourceLocator {
    base_dir: Option<PathBuf>,
    embedded: BTreeMap<String, String>,
    remote_timeout: Option<Duration>,
}

impl ResourceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Register an embedded (compiled-in) resource
    pub fn with_embedded(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.embedded.insert(key.into(), content.into());
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Resolve a name without reading it
    pub fn resolve(&self, name: &str) -> Option<ResourceOrigin> {
        if is_remote(name) {
            return Some(ResourceOrigin::Remote(name.to_string()));
        }

        let exact = Path::new(name);
        if exact.is_file() {
            return Some(ResourceOrigin::File(exact.to_path_buf()));
        }
        if let Some(base) = &self.base_dir {
            let combined = base.join(name);
            if combined.is_file() {
                return Some(ResourceOrigin::File(combined));
            }
        }

        let suffix = name.replace('\\', "/");
        self.embedded
            .keys()
            .find(|key| key.ends_with(&suffix))
            .map(|key| ResourceOrigin::Embedded(key.clone()))
    }

    /// File path a new resource with this name would be created at
    pub fn creation_path(&self, name: &str) -> Option<PathBuf> {
        if is_remote(name) {
            return None;
        }
        let path = Path::new(name);
        match &self.base_dir {
            Some(base) if path.is_relative() => Some(base.join(path)),
            _ => Some(path.to_path_buf()),
        }
    }

    /// Read a resolved resource
    pub fn read(&self, origin: &ResourceOrigin) -> Result<ResourceSnapshot, ResourceError> {
        self.read_within(origin, self.remote_timeout)
    }

    /// Read a resolved resource, giving up on remote ones after `timeout`
    pub fn read_within(
        &self,
        origin: &ResourceOrigin,
        timeout: Option<Duration>,
    ) -> Result<ResourceSnapshot, ResourceError> {
        let content = match origin {
            ResourceOrigin::File(path) => read_file(path)?,
            ResourceOrigin::Embedded(key) => self
                .embedded
                .get(key)
                .cloned()
                .ok_or_else(|| ResourceError::NotFound(key.clone()))?,
            ResourceOrigin::Remote(url) => fetch(url, timeout)?,
        };
        Ok(ResourceSnapshot {
            origin: origin.clone(),
            checksum: checksum(content.as_bytes()),
            content,
        })
    }

    /// Resolve and read
    pub fn load(&self, name: &str) -> Result<ResourceSnapshot, ResourceError> {
        self.load_within(name, self.remote_timeout)
    }

    pub fn load_within(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<ResourceSnapshot, ResourceError> {
        let origin = self
            .resolve(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;
        self.read_within(&origin, timeout)
    }

    /// Verify the file still matches `expected_checksum` and replace it
    ///
    /// `expected_checksum == None` means the file must not exist yet. The new
    /// content is written to a sibling temp file and renamed over the target,
    /// so readers never see a partial document.
    pub fn write_verified(
        &self,
        origin: &ResourceOrigin,
        expected_checksum: Option<&str>,
        content: &str,
    ) -> Result<String, ResourceError> {
        let ResourceOrigin::File(path) = origin else {
            return Err(ResourceError::ReadOnly(origin.describe()));
        };

        let actual = match fs::read(path) {
            Ok(bytes) => Some(checksum(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(ResourceError::Io {
                    path: path.clone(),
                    source: e,
                })
            }
        };

        if actual.as_deref() != expected_checksum {
            return Err(ResourceError::ChecksumMismatch {
                path: path.clone(),
                expected: expected_checksum.unwrap_or("<absent>").to_string(),
                actual: actual.unwrap_or_else(|| "<absent>".to_string()),
            });
        }

        let io_err = |source| ResourceError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        fs::write(&tmp_path, content).map_err(io_err)?;
        fs::rename(&tmp_path, path).map_err(io_err)?;

        tracing::debug!("Wrote limits resource {}", path.display());
        Ok(checksum(content.as_bytes()))
    }
}

fn fetch(url: &str, timeout: Option<Duration>) -> Result<String, ResourceError> {
    let fetch_err = |message: String| ResourceError::Fetch {
        url: url.to_string(),
        message,
    };

    let mut builder = reqwest::blocking::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    let client = builder.build().map_err(|e| fetch_err(e.to_string()))?;
    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_err(e.to_string()))?;
    response.text().map_err(|e| fetch_err(e.to_string()))
}

/// Hex-encoded SHA-256 of `bytes`
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn is_remote(name: &str) -> bool {
    name.starts_with("http://") || name.starts_with("https://")
}

fn read_file(path: &Path) -> Result<String, ResourceError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ResourceError::NotFound(path.display().to_string())
        } else {
            ResourceError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}
