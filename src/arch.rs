//! Architecture profiles: gadget byte-pattern tables, word size, and
//! alignment for each supported target.
//!
//! Dispatch is a closed enum; each variant carries its own pattern
//! table, so adding an architecture means adding a variant and a table.

use crate::error::{Error, Result};
use crate::pattern::{ByteClass, BytePattern};

/// Supported target architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// 32-bit x86.
    I386,
    /// 64-bit x86.
    Amd64,
    /// 32-bit ARM (A32 encoding).
    Arm,
}

/// Gadget terminator category selected at finder construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GadgetCategory {
    Ret,
    Jmp,
    Call,
    Int,
    Sysenter,
    Syscall,
    Svc,
    /// Union of every category the architecture supports.
    All,
}

/// One gadget-terminator pattern: the byte pattern, its match length,
/// and the start-address alignment candidates must satisfy.
#[derive(Debug, Clone)]
pub struct GadgetPattern {
    pub pattern: BytePattern,
    pub size: usize,
    pub align: usize,
}

impl GadgetPattern {
    fn new(classes: Vec<ByteClass>, size: usize, align: usize) -> Self {
        GadgetPattern { pattern: BytePattern::new(classes), size, align }
    }
}

impl Arch {
    /// Resolve an architecture name as reported by ELF headers or
    /// given by the caller.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "i386" | "x86" | "x86-32" => Ok(Arch::I386),
            "amd64" | "x86_64" | "x86-64" => Ok(Arch::Amd64),
            "arm" | "armv7" | "arm32" => Ok(Arch::Arm),
            other => Err(Error::UnsupportedArchitecture(other.to_string())),
        }
    }

    /// Machine word size in bytes.
    pub fn word_size(&self) -> i64 {
        match self {
            Arch::I386 | Arch::Arm => 4,
            Arch::Amd64 => 8,
        }
    }

    pub fn is_x86(&self) -> bool {
        matches!(self, Arch::I386 | Arch::Amd64)
    }

    /// Stack-pointer register name in this architecture's effect maps.
    pub fn sp_name(&self) -> &'static str {
        match self {
            Arch::I386 => "esp",
            Arch::Amd64 => "rsp",
            Arch::Arm => "sp",
        }
    }

    /// Instruction-pointer register name.
    pub fn ip_name(&self) -> &'static str {
        match self {
            Arch::I386 => "eip",
            Arch::Amd64 => "rip",
            Arch::Arm => "pc",
        }
    }

    /// Flag-register names excluded from gadget effect maps.
    pub fn flags_names(&self) -> &'static [&'static str] {
        match self {
            Arch::I386 => &["eflags", "flags"],
            Arch::Amd64 => &["rflags", "eflags", "flags"],
            Arch::Arm => &["cpsr", "apsr"],
        }
    }

    /// Pattern table for one category. Fails with
    /// `UnknownGadgetCategory` when this architecture has no patterns
    /// for the requested category.
    pub fn patterns(&self, category: GadgetCategory) -> Result<Vec<GadgetPattern>> {
        use ByteClass::{Any, Exact, OneOf};

        let x86 = |cat: GadgetCategory| -> Option<Vec<GadgetPattern>> {
            match cat {
                GadgetCategory::Ret => Some(vec![
                    // ret
                    GadgetPattern::new(vec![Exact(0xc3)], 1, 1),
                    // ret imm16
                    GadgetPattern::new(vec![Exact(0xc2), Any, Any], 3, 1),
                ]),
                GadgetCategory::Jmp => Some(vec![
                    // jmp [reg]
                    GadgetPattern::new(
                        vec![Exact(0xff), OneOf(vec![0x20, 0x21, 0x22, 0x23, 0x26, 0x27])],
                        2,
                        1,
                    ),
                    // jmp reg
                    GadgetPattern::new(
                        vec![Exact(0xff), OneOf(vec![0xe0, 0xe1, 0xe2, 0xe3, 0xe4, 0xe6, 0xe7])],
                        2,
                        1,
                    ),
                    // call [reg]
                    GadgetPattern::new(
                        vec![Exact(0xff), OneOf(vec![0x10, 0x11, 0x12, 0x13, 0x16, 0x17])],
                        2,
                        1,
                    ),
                ]),
                GadgetCategory::Call => Some(vec![
                    // call reg
                    GadgetPattern::new(
                        vec![Exact(0xff), OneOf(vec![0xd0, 0xd1, 0xd2, 0xd3, 0xd4, 0xd6, 0xd7])],
                        2,
                        1,
                    ),
                ]),
                GadgetCategory::Int => Some(vec![
                    // int 0x80
                    GadgetPattern::new(vec![Exact(0xcd), Exact(0x80)], 2, 1),
                ]),
                GadgetCategory::Sysenter => Some(vec![
                    GadgetPattern::new(vec![Exact(0x0f), Exact(0x34)], 2, 1),
                ]),
                GadgetCategory::Syscall => Some(vec![
                    GadgetPattern::new(vec![Exact(0x0f), Exact(0x05)], 2, 1),
                ]),
                _ => None,
            }
        };

        let arm = |cat: GadgetCategory| -> Option<Vec<GadgetPattern>> {
            match cat {
                GadgetCategory::Ret => Some(vec![
                    // pop {..., pc}
                    GadgetPattern::new(vec![Any, Exact(0x80), Exact(0xbd), Exact(0xe8)], 4, 4),
                ]),
                GadgetCategory::Svc => Some(vec![
                    // svc #imm
                    GadgetPattern::new(vec![Any, Any, Any, Exact(0xef)], 4, 4),
                ]),
                _ => None,
            }
        };

        let lookup: &dyn Fn(GadgetCategory) -> Option<Vec<GadgetPattern>> = if self.is_x86() {
            &x86
        } else {
            &arm
        };

        if category == GadgetCategory::All {
            let mut all = Vec::new();
            for cat in self.categories() {
                if let Some(mut pats) = lookup(*cat) {
                    all.append(&mut pats);
                }
            }
            return Ok(all);
        }

        lookup(category)
            .ok_or_else(|| Error::UnknownGadgetCategory(format!("{:?}", category).to_lowercase()))
    }

    /// The categories this architecture has patterns for.
    pub fn categories(&self) -> &'static [GadgetCategory] {
        if self.is_x86() {
            &[
                GadgetCategory::Ret,
                GadgetCategory::Jmp,
                GadgetCategory::Call,
                GadgetCategory::Int,
                GadgetCategory::Sysenter,
                GadgetCategory::Syscall,
            ]
        } else {
            &[GadgetCategory::Ret, GadgetCategory::Svc]
        }
    }
}

impl GadgetCategory {
    /// Resolve a category filter name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "ret" => Ok(GadgetCategory::Ret),
            "jmp" => Ok(GadgetCategory::Jmp),
            "call" => Ok(GadgetCategory::Call),
            "int" => Ok(GadgetCategory::Int),
            "sysenter" => Ok(GadgetCategory::Sysenter),
            "syscall" => Ok(GadgetCategory::Syscall),
            "svc" => Ok(GadgetCategory::Svc),
            "all" => Ok(GadgetCategory::All),
            other => Err(Error::UnknownGadgetCategory(other.to_string())),
        }
    }

    /// Terminator mnemonics this category accepts as a gadget's final
    /// instruction (used by the x86 structural filter).
    pub fn branch_mnemonics(&self) -> Vec<&'static str> {
        match self {
            GadgetCategory::Ret => vec!["ret"],
            GadgetCategory::Jmp => vec!["jmp"],
            GadgetCategory::Call => vec!["call"],
            GadgetCategory::Int => vec!["int"],
            GadgetCategory::Sysenter => vec!["sysenter"],
            GadgetCategory::Syscall => vec!["syscall"],
            GadgetCategory::Svc => vec!["svc"],
            GadgetCategory::All => vec!["ret", "int", "sysenter", "jmp", "call", "syscall", "svc"],
        }
    }
}
