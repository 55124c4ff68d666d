//! Gadget discovery orchestration: cache short-circuit, scanning,
//! filtering, deduplication, and parallel classification.
//!
//! The pipeline per binary is scan → clean (x86) → dedup → classify.
//! A cache hit re-enters at the decode step, skipping pattern search
//! and the filter passes. Failures are scoped as narrowly as
//! possible: a candidate that will not decode or classify is dropped,
//! a corrupt cache entry triggers a rescan, and one bad binary never
//! aborts the rest of a batch.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::arch::{Arch, GadgetCategory, GadgetPattern};
use crate::cache::GadgetCache;
use crate::classify::{Gadget, GadgetClassifier};
use crate::disasm::Disassembler;
use crate::elf::BinaryImage;
use crate::error::{Error, Result};
use crate::expr::SymbolicExecutor;
use crate::filter::{dedup, pass_clean_x86};
use crate::scanner::{scan_segment, Candidate, ScanParams};
use crate::types::VirtAddr;

/// Tunable discovery parameters.
pub struct FinderConfig {
    /// Terminator category to search for.
    pub category: GadgetCategory,
    /// Backward start offsets tried per pattern match.
    pub depth: usize,
    /// x86 binaries at least this large get the inline instruction
    /// whitelist to bound candidate volume.
    pub filter_threshold: usize,
    /// Keep gadgets containing more than one category terminator.
    pub multibr: bool,
    /// Consult and update the persistent cache.
    pub use_cache: bool,
    /// Cache directory override; defaults to shared temp storage.
    pub cache_dir: Option<PathBuf>,
}

impl Default for FinderConfig {
    fn default() -> Self {
        FinderConfig {
            category: GadgetCategory::All,
            depth: 10,
            filter_threshold: 100_000,
            multibr: false,
            use_cache: true,
            cache_dir: None,
        }
    }
}

/// Discovers and classifies ROP gadgets across a batch of binaries.
pub struct GadgetFinder<'a> {
    arch: Arch,
    config: FinderConfig,
    patterns: Vec<GadgetPattern>,
    cache: GadgetCache,
    executor: &'a dyn SymbolicExecutor,
    cancel: Arc<AtomicBool>,
}

impl<'a> GadgetFinder<'a> {
    /// Construct a finder for one architecture.
    ///
    /// Fails immediately, before any binary is touched, when the
    /// architecture has no pattern table for the requested category.
    pub fn new(
        arch: Arch,
        executor: &'a dyn SymbolicExecutor,
        config: FinderConfig,
    ) -> Result<Self> {
        let patterns = arch.patterns(config.category)?;
        let cache = match &config.cache_dir {
            Some(dir) => GadgetCache::with_dir(dir.clone()),
            None => GadgetCache::new(),
        };
        Ok(GadgetFinder {
            arch,
            config,
            patterns,
            cache,
            executor,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared flag workers check between candidates. Setting it stops
    /// an in-flight batch promptly; results classified so far are
    /// still returned.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Discover and classify gadgets in every binary of the batch.
    ///
    /// All binaries must share the finder's architecture; a mismatch
    /// is an error, reported distinctly from "zero gadgets found".
    pub fn load_gadgets(&self, images: &[BinaryImage]) -> Result<Vec<Gadget>> {
        for img in images {
            if img.arch() != self.arch {
                return Err(Error::UnsupportedArchitecture(format!(
                    "binary {} is {:?}, finder targets {:?}",
                    img.identity(),
                    img.arch(),
                    self.arch
                )));
            }
        }

        let mut out = Vec::new();
        for img in images {
            let candidates = self.candidates_for(img);
            log::debug!(
                "{}: {} candidates after filtering",
                img.identity(),
                candidates.len()
            );

            let classifier = GadgetClassifier::new(self.arch, self.executor);
            let mut gadgets: Vec<Gadget> = candidates
                .par_iter()
                .filter_map(|cand| {
                    if self.cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    classifier.classify(cand)
                })
                .collect();
            log::debug!("{}: {} gadgets classified", img.identity(), gadgets.len());
            out.append(&mut gadgets);
        }
        Ok(out)
    }

    /// Candidates for one binary, from the cache when possible.
    fn candidates_for(&self, img: &BinaryImage) -> Vec<Candidate> {
        if self.config.use_cache {
            if let Some(cached) = self.cache.load(img.identity()) {
                return self.decode_cached(img, &cached);
            }
        }

        let inline_filter =
            self.arch.is_x86() && img.file_size() >= self.config.filter_threshold;
        let params = ScanParams {
            arch: self.arch,
            patterns: &self.patterns,
            depth: self.config.depth,
            inline_filter,
            cancel: &self.cancel,
        };

        let mut candidates = Vec::new();
        for seg in img.segments() {
            let base = VirtAddr(img.runtime_addr(seg.vaddr));
            let mut found = scan_segment(img.segment_bytes(seg), base, &params);
            candidates.append(&mut found);
        }

        if self.arch.is_x86() {
            candidates = pass_clean_x86(candidates, self.config.category, self.config.multibr);
        }
        let candidates = dedup(candidates);

        // A cancelled scan is incomplete; persisting it would serve a
        // truncated candidate list as authoritative on every later run.
        if self.config.use_cache && !self.cancel.load(Ordering::Relaxed) {
            let entry: BTreeMap<u64, Vec<u8>> = candidates
                .iter()
                .map(|c| (img.file_addr(c.addr.addr()), c.bytes.clone()))
                .collect();
            if let Err(e) = self.cache.save(img.identity(), &entry) {
                log::warn!("failed to write cache entry for {}: {}", img.identity(), e);
            }
        }

        candidates
    }

    /// Re-decode cached gadget bytes at the image's current load
    /// address. Cached entries skip pattern search and filtering.
    fn decode_cached(&self, img: &BinaryImage, cached: &BTreeMap<u64, Vec<u8>>) -> Vec<Candidate> {
        let dis = match Disassembler::new(self.arch) {
            Ok(d) => d,
            Err(_) => return Vec::new(),
        };
        cached
            .iter()
            .filter_map(|(&file_addr, bytes)| {
                let addr = VirtAddr(img.runtime_addr(file_addr));
                let insns = dis.decode(bytes, addr);
                if insns.is_empty() {
                    return None;
                }
                Some(Candidate { addr, bytes: bytes.clone(), insns })
            })
            .collect()
    }
}
