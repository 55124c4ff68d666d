//! Persistent gadget cache keyed by binary content hash.
//!
//! One JSON file per sha256 digest inside a shared temporary
//! directory. Entries map file-relative gadget addresses to raw
//! bytes, so a cached scan of a PIE binary stays valid at any load
//! address. A corrupt or version-mismatched entry is a miss, never a
//! fatal error; writes go through a temp file and an atomic rename so
//! a concurrent reader can never observe a partial entry.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const FORMAT_VERSION: u32 = 1;
const CACHE_DIR_NAME: &str = "ropfind-rop-cache";

#[derive(Deserialize)]
struct CacheFile {
    version: u32,
    gadgets: BTreeMap<u64, Vec<u8>>,
}

#[derive(Serialize)]
struct CacheFileRef<'a> {
    version: u32,
    gadgets: &'a BTreeMap<u64, Vec<u8>>,
}

/// On-disk store of previously discovered gadgets.
pub struct GadgetCache {
    dir: PathBuf,
}

impl Default for GadgetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl GadgetCache {
    /// Cache under the system temporary directory (shared between
    /// processes analyzing the same binaries).
    pub fn new() -> Self {
        Self::with_dir(std::env::temp_dir().join(CACHE_DIR_NAME))
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        GadgetCache { dir }
    }

    /// Look up the entry for a binary identity.
    ///
    /// Returns the file-relative address → raw bytes mapping, or
    /// `None` for a missing or corrupt entry. Corruption is logged
    /// and the caller rescans.
    pub fn load(&self, identity: &str) -> Option<BTreeMap<u64, Vec<u8>>> {
        let path = self.dir.join(identity);
        if !path.exists() {
            return None;
        }
        match self.read_entry(identity) {
            Ok(gadgets) => {
                log::info!("loaded {} cached gadgets for {}", gadgets.len(), identity);
                Some(gadgets)
            }
            Err(e) => {
                log::warn!("cache entry for {} unusable ({}); rescanning", identity, e);
                None
            }
        }
    }

    fn read_entry(&self, identity: &str) -> Result<BTreeMap<u64, Vec<u8>>> {
        let data = fs::read(self.dir.join(identity))?;
        let parsed: CacheFile = serde_json::from_slice(&data)
            .map_err(|e| Error::CacheCorrupt(e.to_string()))?;
        if parsed.version != FORMAT_VERSION {
            return Err(Error::CacheCorrupt(format!(
                "format version {} (expected {})",
                parsed.version, FORMAT_VERSION
            )));
        }
        Ok(parsed.gadgets)
    }

    /// Write the entry for a binary identity.
    ///
    /// The payload is written to a temporary file in the cache
    /// directory and renamed into place, so concurrent writers of the
    /// same key cannot interleave and readers see old-or-new, never
    /// partial.
    pub fn save(&self, identity: &str, gadgets: &BTreeMap<u64, Vec<u8>>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let payload = serde_json::to_vec(&CacheFileRef { version: FORMAT_VERSION, gadgets })
            .map_err(|e| Error::Other(format!("serialize cache entry: {}", e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&payload)?;
        tmp.persist(self.dir.join(identity))
            .map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
