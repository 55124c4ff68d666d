//! Instruction decoding via capstone.
//!
//! The engine treats decoding as a capability: bytes plus a start
//! address in, an ordered list of `{mnemonic, operands, length}` out.
//! Malformed bytes produce an empty sequence, never an error.

use capstone::arch::BuildsCapstone;
use capstone::{arch as cs_arch, Capstone};

use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::types::VirtAddr;

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insn {
    /// Mnemonic, e.g. "pop".
    pub mnemonic: String,
    /// Operand text, e.g. "rdi". Empty for operand-less instructions.
    pub op_str: String,
    /// Encoded length in bytes.
    pub len: usize,
}

impl Insn {
    /// "mnemonic operands" form, e.g. "pop rdi".
    pub fn text(&self) -> String {
        if self.op_str.is_empty() {
            self.mnemonic.clone()
        } else {
            format!("{} {}", self.mnemonic, self.op_str)
        }
    }
}

/// Join instructions into the canonical gadget text used for
/// deduplication and display, e.g. "pop rdi; ret".
pub fn join_insns(insns: &[Insn]) -> String {
    insns.iter().map(Insn::text).collect::<Vec<_>>().join("; ")
}

/// Capstone-backed decoder for one architecture.
pub struct Disassembler {
    cs: Capstone,
}

impl Disassembler {
    pub fn new(arch: Arch) -> Result<Self> {
        let cs = match arch {
            Arch::I386 => Capstone::new()
                .x86()
                .mode(cs_arch::x86::ArchMode::Mode32)
                .build(),
            Arch::Amd64 => Capstone::new()
                .x86()
                .mode(cs_arch::x86::ArchMode::Mode64)
                .build(),
            Arch::Arm => Capstone::new()
                .arm()
                .mode(cs_arch::arm::ArchMode::Arm)
                .build(),
        }
        .map_err(|e| Error::Decode(format!("capstone init: {}", e)))?;
        Ok(Disassembler { cs })
    }

    /// Decode as many instructions as the bytes allow.
    ///
    /// Returns an empty vector when the bytes do not decode at all;
    /// a partial prefix decode yields the decodable prefix.
    pub fn decode(&self, bytes: &[u8], addr: VirtAddr) -> Vec<Insn> {
        match self.cs.disasm_all(bytes, addr.addr()) {
            Ok(insns) => insns
                .iter()
                .map(|i| Insn {
                    mnemonic: i.mnemonic().unwrap_or("").to_string(),
                    op_str: i.op_str().unwrap_or("").to_string(),
                    len: i.bytes().len(),
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
