//! Persistent failure cache for transiently failed batches.
//!
//! A single named slot on disk holding a JSON array of telemetry events.
//! Written only when a delivery fails transiently, removed on the next
//! delivery success. Writes happen exclusively from the pipeline's delivery
//! completion path, which is serialized by the one-flush-in-flight
//! invariant, so the slot needs no locking.
//!
//! The slot is not scoped by session: if a new session starts before the
//! cache is drained externally, cached events may belong to an earlier
//! session. Callers must not assume otherwise.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::event::TelemetryEvent;

/// Persistent single-slot store of transiently failed events.
#[derive(Debug, Clone)]
pub struct FailureCache {
    path: PathBuf,
}

impl FailureCache {
    /// Create a cache backed by the given file path. The file is not
    /// touched until the first merge.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached events. An absent file means an empty cache.
    ///
    /// A file that exists but does not parse is treated as empty with a
    /// warning; the next merge overwrites it, so the slot heals itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(&self) -> Result<Vec<TelemetryEvent>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(Error::CacheRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_str(&contents) {
            Ok(events) => Ok(events),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failure cache is corrupt; treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Number of cached events.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be read.
    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }

    /// Check if the cache is empty (or absent).
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be read.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.load()?.is_empty())
    }

    /// Append a failed batch to the cache, preserving order within the
    /// batch, and return the total number of cached events.
    ///
    /// The write is atomic (temp file plus rename) so an interrupted merge
    /// never leaves a half-written slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be read or written.
    pub fn merge(&self, events: &[TelemetryEvent]) -> Result<usize> {
        let mut cached = self.load()?;
        cached.extend_from_slice(events);
        self.write(&cached)?;

        debug!(
            appended = events.len(),
            total = cached.len(),
            "merged failed batch into cache"
        );
        Ok(cached.len())
    }

    /// Overwrite the slot with exactly the given events. An empty slice
    /// removes the file, keeping "empty" and "absent" equivalent.
    ///
    /// Used by the external drain path to truncate the slot down to the
    /// not-yet-delivered tail after each successfully delivered chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    pub fn replace(&self, events: &[TelemetryEvent]) -> Result<()> {
        if events.is_empty() {
            return self.clear();
        }
        self.write(events)?;
        debug!(total = events.len(), "failure cache replaced");
        Ok(())
    }

    /// Remove the cache file. An already-absent file is fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "failure cache cleared");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::CacheWrite {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, events: &[TelemetryEvent]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let json = serde_json::to_vec(events)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| Error::CacheWrite {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| Error::CacheWrite {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}
