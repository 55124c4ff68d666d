//! Structural filtering and deduplication of gadget candidates.
//!
//! The structural pass is x86-only: ARM's fixed-width encoding does
//! not produce the junk-suffix explosion that makes it necessary.
//! Deduplication is universal and keyed on instruction text, not
//! address: many addresses disassemble to the same sequence and only
//! distinct behaviors matter for chain construction.

use crate::arch::GadgetCategory;
use crate::scanner::Candidate;

/// Mnemonics that disqualify a candidate outright: they either
/// terminate analysis uselessly or introduce a branch that breaks the
/// straight-line-to-one-exit gadget model.
const BLACKLIST: &[&str] = &["db", "int3", "call", "jmp", "nop", "jne", "jg", "jge"];

/// Clean pass for x86 candidates.
///
/// Rejects a candidate when it is a single non-terminator
/// instruction, when its final instruction is not in the active
/// category, when any instruction is blacklisted, when more than one
/// category terminator appears (unless `multibr`), or when more than
/// one `ret` occurs in the sequence.
pub fn pass_clean_x86(
    candidates: Vec<Candidate>,
    category: GadgetCategory,
    multibr: bool,
) -> Vec<Candidate> {
    let br = category.branch_mnemonics();
    candidates
        .into_iter()
        .filter(|cand| {
            let insns = &cand.insns;
            if insns.is_empty() {
                return false;
            }
            if insns.len() == 1 && !br.contains(&insns[0].mnemonic.as_str()) {
                return false;
            }
            if !br.contains(&insns[insns.len() - 1].mnemonic.as_str()) {
                return false;
            }
            if insns
                .iter()
                .any(|i| BLACKLIST.contains(&i.mnemonic.as_str()))
            {
                return false;
            }
            if !multibr && branch_count(cand, &br) > 1 {
                return false;
            }
            if insns.iter().filter(|i| i.mnemonic == "ret").count() > 1 {
                return false;
            }
            true
        })
        .collect()
}

fn branch_count(cand: &Candidate, br: &[&str]) -> usize {
    cand.insns
        .iter()
        .filter(|i| br.contains(&i.mnemonic.as_str()))
        .count()
}

/// Instruction whitelist applied inline while scanning oversized x86
/// binaries: every instruction must be one of the shapes useful for
/// chain construction, or the candidate is dropped before it can
/// inflate the candidate set.
pub fn whitelist_for_large_binary(cand: &Candidate) -> bool {
    cand.insns.iter().all(|insn| {
        match insn.mnemonic.as_str() {
            "ret" | "leave" | "syscall" | "sysenter" => true,
            "pop" | "mov" | "xchg" => !insn.op_str.is_empty(),
            "int" => insn.op_str == "0x80",
            "add" => {
                // add esp/rsp/sp, imm
                insn.op_str
                    .split(',')
                    .next()
                    .map(|dst| dst.trim_end().ends_with("sp"))
                    .unwrap_or(false)
            }
            _ => false,
        }
    })
}

/// Keep the first candidate for each distinct instruction text.
pub fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|cand| seen.insert(cand.text()))
        .collect()
}
