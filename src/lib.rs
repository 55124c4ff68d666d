//! ropfind — ROP gadget discovery and semantic classification for ELF
//! binaries.
//!
//! Scans the executable segments of i386, amd64, and ARM binaries for
//! return-oriented-programming gadgets, classifies each one
//! symbolically into a register-effect map, and verifies whole gadget
//! chains against caller-supplied post-conditions. Scan results are
//! cached by file content hash so repeat analyses of the same binary
//! skip the search entirely, at any load address.
//!
//! # Module overview
//!
//! ## Pipeline
//!
//! - [`finder`] — Orchestration: cache, scan, filter, classify, across
//!   a batch of binaries.
//! - [`scanner`] — Terminator pattern search plus bounded backward
//!   disassembly into gadget candidates.
//! - [`filter`] — Structural x86 filtering and text-keyed
//!   deduplication.
//! - [`classify`] — Effect-map reduction of candidates into
//!   chain-composable gadgets.
//! - [`verify`] — Chain verification: stack layouts satisfying
//!   post-conditions.
//!
//! ## Inputs and infrastructure
//!
//! - [`elf`] — ELF loading, executable segments, load-bias address
//!   translation.
//! - [`arch`] — Architecture profiles and gadget terminator pattern
//!   tables.
//! - [`pattern`] — Byte-class pattern matching over raw segments.
//! - [`disasm`] — Capstone-backed instruction decoding.
//! - [`expr`] — Symbolic value expressions and the executor/solver
//!   capability traits.
//! - [`cache`] — Content-hash-keyed persistent gadget cache.
//! - [`types`] — Core types: `VirtAddr`.
//! - [`error`] — Error types used throughout the crate.

pub mod arch;
pub mod cache;
pub mod classify;
pub mod disasm;
pub mod elf;
pub mod error;
pub mod expr;
pub mod filter;
pub mod finder;
pub mod pattern;
pub mod scanner;
pub mod types;
pub mod verify;

#[cfg(test)]
pub(crate) mod testutil;
