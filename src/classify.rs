//! Semantic classification of gadget candidates.
//!
//! Runs the symbolic-execution capability over a candidate's bytes
//! and reduces the effect mapping into a [`Gadget`]: per-register
//! effects, the net stack-pointer displacement (`move`), and the
//! source of the new instruction pointer. A candidate is materialized
//! only when the instruction pointer is loaded from the stack slot at
//! `move - word_size`, the slot a clean control transfer pops; any
//! other shape is not chain-composable and is dropped.

use std::collections::BTreeMap;

use crate::arch::Arch;
use crate::expr::{Dest, Expr, MemRef, SymbolicExecutor};
use crate::scanner::Candidate;
use crate::types::VirtAddr;

/// Reduced effect of a gadget on one destination register.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Receives another register's entry value.
    Reg(String),
    /// Receives a value read from memory.
    Mem(MemRef),
    /// Receives a constant.
    Const(i64),
    /// Best-effort location descriptors for effects the reduction
    /// does not model further.
    Locations(Vec<String>),
}

/// A classified, chain-composable gadget.
#[derive(Debug, Clone)]
pub struct Gadget {
    /// Runtime address.
    pub addr: VirtAddr,
    /// Instruction text, one entry per instruction.
    pub insns: Vec<String>,
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// Destination register → reduced effect. Stack and instruction
    /// pointers are folded into `stack_move`, not listed here.
    pub effects: BTreeMap<String, Effect>,
    /// Net stack-pointer displacement in bytes.
    pub stack_move: i64,
}

impl Gadget {
    /// Joined instruction text, e.g. "pop rdi; ret".
    pub fn text(&self) -> String {
        self.insns.join("; ")
    }
}

/// Reduces symbolic effect mappings into [`Gadget`]s.
pub struct GadgetClassifier<'a> {
    arch: Arch,
    executor: &'a dyn SymbolicExecutor,
}

impl<'a> GadgetClassifier<'a> {
    pub fn new(arch: Arch, executor: &'a dyn SymbolicExecutor) -> Self {
        GadgetClassifier { arch, executor }
    }

    /// Classify one candidate. `None` drops the candidate: execution
    /// failed, an effect was unmodelable, or the control-flow shape
    /// is inconsistent with a stack-popping transfer.
    pub fn classify(&self, cand: &Candidate) -> Option<Gadget> {
        let neutralize = cand
            .insns
            .last()
            .map(|i| i.mnemonic == "call")
            .unwrap_or(false);
        let mapped = self.executor.execute(&cand.bytes, neutralize)?;

        let mut effects = BTreeMap::new();
        let mut stack_move = 0i64;
        let mut ip_move: Option<i64> = None;

        for (dest, value) in mapped {
            let name = match dest {
                // A raw pointer write is deliberately unmodeled.
                Dest::Ptr(_) => return None,
                Dest::Reg(name) => name,
            };

            if self.arch.flags_names().contains(&name.as_str()) {
                continue;
            }

            if name == self.arch.sp_name() {
                // The stack pointer must move by a constant amount.
                let (_, disp) = value.linear_offset()?;
                stack_move = disp;
                continue;
            }

            if name == self.arch.ip_name() {
                match value {
                    Expr::Mem(m) => {
                        ip_move = Some(m.disp);
                        continue;
                    }
                    // IP from a register or anything else is not a
                    // stack-popping transfer.
                    _ => return None,
                }
            }

            let effect = match value {
                Expr::Mem(m) => Effect::Mem(m),
                Expr::Reg(r) => Effect::Reg(r),
                Expr::Const(c) => Effect::Const(c),
                Expr::Seq(parts) => {
                    Effect::Locations(parts.iter().flat_map(Expr::locations).collect())
                }
                other => Effect::Locations(other.locations()),
            };
            effects.insert(name, effect);
        }

        let ip_move = ip_move?;
        if ip_move != stack_move - self.arch.word_size() {
            log::debug!(
                "gadget at {} rejected: ip from slot {} with stack move {}",
                cand.addr,
                ip_move,
                stack_move
            );
            return None;
        }

        Some(Gadget {
            addr: cand.addr,
            insns: cand.insns.iter().map(|i| i.text()).collect(),
            bytes: cand.bytes.clone(),
            effects,
            stack_move,
        })
    }
}
