//! Gadget scanning: byte-pattern search plus bounded backward
//! disassembly.
//!
//! For every terminator match at segment offset `k`, candidate ranges
//! `[k - i*align, k + size)` are tried for `i` in `[0, depth)`. A
//! range survives when it decodes to at least one instruction and its
//! start address is alignment-divisible. Overlapping candidates are
//! produced on purpose: the tail of a long gadget is itself a gadget.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::arch::{Arch, GadgetPattern};
use crate::disasm::{join_insns, Disassembler, Insn};
use crate::filter::whitelist_for_large_binary;
use crate::types::VirtAddr;

/// A candidate gadget: decoded but not yet filtered or classified.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Runtime start address.
    pub addr: VirtAddr,
    /// Raw bytes from start through the end of the matched pattern.
    pub bytes: Vec<u8>,
    /// Decoded instructions.
    pub insns: Vec<Insn>,
}

impl Candidate {
    /// Joined instruction text; the dedup key.
    pub fn text(&self) -> String {
        join_insns(&self.insns)
    }
}

/// Per-scan parameters shared by all segments of one binary.
pub struct ScanParams<'a> {
    pub arch: Arch,
    pub patterns: &'a [GadgetPattern],
    /// Backward start offsets tried per match.
    pub depth: usize,
    /// Apply the large-binary instruction whitelist inline.
    pub inline_filter: bool,
    /// Checked between candidates; partial results are kept.
    pub cancel: &'a AtomicBool,
}

/// Scan one executable segment for gadget candidates.
///
/// `base_addr` is the segment's runtime load address. Byte ranges that
/// fail to decode are skipped silently.
pub fn scan_segment(data: &[u8], base_addr: VirtAddr, params: &ScanParams<'_>) -> Vec<Candidate> {
    let mut out = Vec::new();
    for gad in params.patterns {
        let refs = gad.pattern.find_all(data);
        log::debug!(
            "segment {}: {} matches for a {}-byte pattern",
            base_addr,
            refs.len(),
            gad.size
        );

        let mut found: Vec<Candidate> = refs
            .par_iter()
            .map_init(
                || Disassembler::new(params.arch),
                |dis, &r| {
                    let dis = match dis {
                        Ok(d) => d,
                        Err(_) => return Vec::new(),
                    };
                    if params.cancel.load(Ordering::Relaxed) {
                        return Vec::new();
                    }
                    candidates_at(data, base_addr, r, gad, params, dis)
                },
            )
            .flatten()
            .collect();
        out.append(&mut found);
    }
    out
}

/// Enumerate the backward start offsets for one pattern match.
fn candidates_at(
    data: &[u8],
    base_addr: VirtAddr,
    match_off: usize,
    gad: &GadgetPattern,
    params: &ScanParams<'_>,
    dis: &Disassembler,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    let end = match match_off.checked_add(gad.size) {
        Some(end) if end <= data.len() => end,
        _ => return out,
    };

    for i in 0..params.depth {
        let back = i * gad.align;
        if back > match_off {
            break;
        }
        let start = match_off - back;
        let addr = base_addr + start as u64;
        if addr.addr() % gad.align as u64 != 0 {
            continue;
        }

        let bytes = &data[start..end];
        let insns = dis.decode(bytes, addr);
        if insns.is_empty() {
            continue;
        }

        let cand = Candidate { addr, bytes: bytes.to_vec(), insns };
        if params.inline_filter && !whitelist_for_large_binary(&cand) {
            continue;
        }
        out.push(cand);
    }
    out
}
