//! Thumbnail cache collaborator and output flavors.
//!
//! The scheduling core never touches the on-disk layout. It asks the cache
//! whether a source needs regeneration and hands it finished pixel data.

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

/// Output size profile a thumbnail is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Flavor {
    Normal,
    Large,
    XLarge,
    XxLarge,
}

impl Flavor {
    /// Every flavor the daemon can produce.
    pub const ALL: [Flavor; 4] = [Self::Normal, Self::Large, Self::XLarge, Self::XxLarge];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Large => "large",
            Self::XLarge => "x-large",
            Self::XxLarge => "xx-large",
        }
    }

    /// Maximum edge length in pixels.
    pub fn size(self) -> u32 {
        match self {
            Self::Normal => 128,
            Self::Large => 256,
            Self::XLarge => 512,
            Self::XxLarge => 1024,
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pixel data produced by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to write thumbnail for {uri}: {reason}")]
    WriteFailed { uri: String, reason: String },
}

/// Access to the thumbnail cache.
///
/// Implementations serialize their own per-URI access; the schedulers call
/// these methods from pool threads without extra locking.
pub trait ThumbnailCache: Send + Sync {
    /// True if no fresh thumbnail exists for `uri` at `flavor`.
    fn needs_update(&self, uri: &str, flavor: Flavor, source_mtime: Option<SystemTime>) -> bool;

    fn save(
        &self,
        uri: &str,
        flavor: Flavor,
        thumbnail: &Thumbnail,
        source_mtime: Option<SystemTime>,
    ) -> Result<(), CacheError>;

    /// True if `uri` points into the cache's own storage.
    fn is_thumbnail(&self, _uri: &str) -> bool {
        false
    }
}

/// In-process cache keyed by (uri, flavor).
///
/// An entry is fresh while its recorded source mtime matches the source's
/// current mtime.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, Flavor), Option<SystemTime>>>,
    prefix: Option<String>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat every URI starting with `prefix` as a cached thumbnail.
    pub fn with_thumbnail_prefix(prefix: impl Into<String>) -> Self {
        Self { entries: Mutex::default(), prefix: Some(prefix.into()) }
    }

    /// Record a fresh entry without pixel data.
    pub fn mark_fresh(&self, uri: &str, flavor: Flavor, source_mtime: Option<SystemTime>) {
        self.entries.lock().insert((uri.to_string(), flavor), source_mtime);
    }

    pub fn contains(&self, uri: &str, flavor: Flavor) -> bool {
        self.entries.lock().contains_key(&(uri.to_string(), flavor))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ThumbnailCache for MemoryCache {
    fn needs_update(&self, uri: &str, flavor: Flavor, source_mtime: Option<SystemTime>) -> bool {
        match self.entries.lock().get(&(uri.to_string(), flavor)) {
            Some(saved) => *saved != source_mtime,
            None => true,
        }
    }

    fn save(
        &self,
        uri: &str,
        flavor: Flavor,
        _thumbnail: &Thumbnail,
        source_mtime: Option<SystemTime>,
    ) -> Result<(), CacheError> {
        self.entries.lock().insert((uri.to_string(), flavor), source_mtime);
        Ok(())
    }

    fn is_thumbnail(&self, uri: &str) -> bool {
        self.prefix.as_deref().is_some_and(|p| uri.starts_with(p))
    }
}
