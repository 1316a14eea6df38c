// Metadata cache — in-memory descriptor store with an optional persistent tier.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::file::FileDescriptor;

/// Optional second cache tier that survives the process. Misses fall back
/// here and hits are promoted into memory.
pub trait PersistentTier: Send + Sync {
    fn load(&self, file_id: &str) -> Option<FileDescriptor>;
    fn store(&self, descriptor: &FileDescriptor);
    fn remove(&self, file_id: &str);
}

/// Persistent tier backed by one JSON file per descriptor in a directory.
pub struct FileTier {
    dir: PathBuf,
}

impl FileTier {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    // File ids are opaque strings; keep them filesystem-safe.
    fn path_for(&self, file_id: &str) -> PathBuf {
        let safe: String = file_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl PersistentTier for FileTier {
    fn load(&self, file_id: &str) -> Option<FileDescriptor> {
        let bytes = fs::read(self.path_for(file_id)).ok()?;
        match serde_json::from_slice::<FileDescriptor>(&bytes) {
            Ok(descriptor) if descriptor.id == file_id => Some(descriptor),
            Ok(_) => None,
            Err(e) => {
                warn!("discarding unreadable cache entry file_id={}: {}", file_id, e);
                None
            }
        }
    }

    fn store(&self, descriptor: &FileDescriptor) {
        match serde_json::to_vec(descriptor) {
            Ok(bytes) => {
                if let Err(e) = fs::write(self.path_for(&descriptor.id), bytes) {
                    warn!("persistent cache write failed file_id={}: {}", descriptor.id, e);
                }
            }
            Err(e) => warn!("descriptor serialize failed file_id={}: {}", descriptor.id, e),
        }
    }

    fn remove(&self, file_id: &str) {
        let _ = fs::remove_file(self.path_for(file_id));
    }
}

/// Identifier-keyed store of the most recently observed valid descriptors.
///
/// Entries carry no TTL; staleness is decided by the caller comparing version
/// fingerprints. Watermarked descriptors are never stored — putting one
/// evicts any existing entry for that id instead.
pub struct MetadataCache {
    mem: RwLock<HashMap<String, FileDescriptor>>,
    tier: Option<Box<dyn PersistentTier>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self {
            mem: RwLock::new(HashMap::new()),
            tier: None,
        }
    }

    pub fn with_persistent_tier(tier: Box<dyn PersistentTier>) -> Self {
        Self {
            mem: RwLock::new(HashMap::new()),
            tier: Some(tier),
        }
    }

    /// Store a descriptor, replacing any previous entry for the same id.
    /// Invalid descriptors are dropped; watermarked ones evict instead.
    pub fn put(&self, descriptor: &FileDescriptor) {
        if descriptor.watermarked {
            debug!("evicting watermarked file from cache file_id={}", descriptor.id);
            self.evict(&descriptor.id);
            return;
        }
        if !descriptor.is_valid() {
            warn!("refusing to cache invalid descriptor file_id={}", descriptor.id);
            return;
        }

        self.mem
            .write()
            .insert(descriptor.id.clone(), descriptor.clone());
        if let Some(tier) = &self.tier {
            tier.store(descriptor);
        }
    }

    pub fn get(&self, file_id: &str) -> Option<FileDescriptor> {
        if let Some(descriptor) = self.mem.read().get(file_id) {
            return Some(descriptor.clone());
        }

        // Promote persistent-tier hits into memory.
        let descriptor = self.tier.as_ref()?.load(file_id)?;
        self.mem
            .write()
            .insert(file_id.to_string(), descriptor.clone());
        Some(descriptor)
    }

    /// Cached descriptor only if it is still valid for rendering.
    pub fn get_valid(&self, file_id: &str) -> Option<FileDescriptor> {
        self.get(file_id).filter(FileDescriptor::is_valid)
    }

    pub fn evict(&self, file_id: &str) {
        self.mem.write().remove(file_id);
        if let Some(tier) = &self.tier {
            tier.remove(file_id);
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}
