//! Where the currently installed version is recorded.
//!
//! Three strategies exist in deployed bots: a constant compiled into the
//! build, a sidecar text file, and an inline `@version` marker inside a text
//! file (usually the installed script itself). All sit behind
//! [`VersionSource`] and are selected per deployment in configuration.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::VersionSourceConfig;
use crate::fsio::write_atomic;

/// Version assumed when no record exists yet.
pub const UNKNOWN_VERSION: &str = "0.0.0";

const MARKER: &str = "@version";

#[derive(Debug, thiserror::Error)]
pub enum VersionSourceError {
    #[error("failed to read version record {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write version record {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub trait VersionSource: Send + Sync {
    fn read(&self) -> Result<String, VersionSourceError>;

    /// Record `version` as installed. Called after the new build is in place.
    fn write(&self, version: &str) -> Result<(), VersionSourceError>;

    /// Payload with `version` already recorded in it, when the record lives
    /// inside the file being installed. The installer then skips [`write`].
    ///
    /// [`write`]: VersionSource::write
    fn stamp(&self, _installed: &Path, _payload: &[u8], _version: &str) -> Option<Vec<u8>> {
        None
    }

    fn describe(&self) -> String;
}

/// Version fixed at build time.
pub struct EmbeddedVersion {
    version: String,
}

impl EmbeddedVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn current() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl VersionSource for EmbeddedVersion {
    fn read(&self) -> Result<String, VersionSourceError> {
        Ok(self.version.clone())
    }

    fn write(&self, version: &str) -> Result<(), VersionSourceError> {
        // The new build carries its own constant.
        debug!(version = %version, "embedded version source, nothing to record");
        Ok(())
    }

    fn describe(&self) -> String {
        "embedded".to_string()
    }
}

/// A text file that holds only the version string.
pub struct SidecarFile {
    path: PathBuf,
}

impl SidecarFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl VersionSource for SidecarFile {
    fn read(&self) -> Result<String, VersionSourceError> {
        match fs::read_to_string(&self.path) {
            Ok(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Ok(_) => Ok(UNKNOWN_VERSION.to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(UNKNOWN_VERSION.to_string()),
            Err(source) => Err(VersionSourceError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, version: &str) -> Result<(), VersionSourceError> {
        write_atomic(&self.path, version.as_bytes()).map_err(|source| VersionSourceError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        format!("sidecar:{}", self.path.display())
    }
}

/// An `@version <v>` marker line inside a text file.
pub struct InlineMarker {
    path: PathBuf,
}

impl InlineMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn marker_version(line: &str) -> Option<&str> {
    let idx = line.find(MARKER)?;
    line[idx + MARKER.len()..].split_whitespace().next()
}

/// Rewrite the first marker line to `version`, or prepend one.
fn stamp_marker(text: &str, version: &str) -> String {
    let mut replaced = false;
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        if !replaced {
            if let Some(idx) = line.find(MARKER) {
                lines.push(format!("{}{} {}", &line[..idx], MARKER, version));
                replaced = true;
                continue;
            }
        }
        lines.push(line.to_string());
    }
    if !replaced {
        lines.insert(0, format!("// {} {}", MARKER, version));
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

impl VersionSource for InlineMarker {
    fn read(&self) -> Result<String, VersionSourceError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(UNKNOWN_VERSION.to_string()),
            Err(source) => {
                return Err(VersionSourceError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        Ok(text
            .lines()
            .find_map(marker_version)
            .unwrap_or(UNKNOWN_VERSION)
            .to_string())
    }

    fn write(&self, version: &str) -> Result<(), VersionSourceError> {
        let read_err = |source| VersionSourceError::Read {
            path: self.path.clone(),
            source,
        };
        let existing = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(read_err(e)),
        };
        let out = stamp_marker(&existing, version);
        write_atomic(&self.path, out.as_bytes()).map_err(|source| VersionSourceError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn stamp(&self, installed: &Path, payload: &[u8], version: &str) -> Option<Vec<u8>> {
        if self.path != installed {
            return None;
        }
        // Binary payloads cannot carry a text marker.
        let text = std::str::from_utf8(payload).ok()?;
        Some(stamp_marker(text, version).into_bytes())
    }

    fn describe(&self) -> String {
        format!("marker:{}", self.path.display())
    }
}

/// Build the configured strategy. Marker records default to the installed file.
pub fn from_config(config: &VersionSourceConfig, installed: &Path) -> Box<dyn VersionSource> {
    match config {
        VersionSourceConfig::Embedded => Box::new(EmbeddedVersion::current()),
        VersionSourceConfig::Sidecar { path } => Box::new(SidecarFile::new(path.clone())),
        VersionSourceConfig::Marker { path } => Box::new(InlineMarker::new(
            path.clone().unwrap_or_else(|| installed.to_path_buf()),
        )),
    }
}
