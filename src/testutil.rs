//! Shared test doubles: a tiny concrete interpreter standing in for
//! the symbolic-execution capability, a deterministic solver, and a
//! minimal ELF builder.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::arch::Arch;
use crate::classify::{Gadget, GadgetClassifier};
use crate::disasm::Disassembler;
use crate::expr::{
    Constraint, ConstraintSolver, Dest, Effects, Expr, MemRef, Model, SolveOutcome,
    SymbolicExecutor,
};
use crate::scanner::Candidate;
use crate::types::VirtAddr;

const REGS64: [&str; 8] = ["rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi"];

/// Interprets a straight-line subset of x86-64 (pop r64, ret,
/// ret imm16, xor eax eax, mov r64 imm32, nop) over a symbolic entry
/// state, producing the same effect shapes a real symbolic executor
/// would. Unknown opcodes fail execution.
pub(crate) struct ToyExecutor;

impl SymbolicExecutor for ToyExecutor {
    fn execute(&self, code: &[u8], _neutralize_trailing_call: bool) -> Option<Effects> {
        let mut writes: Vec<(String, Expr)> = Vec::new();
        let mut flags_touched = false;
        let mut sp_disp: i64 = 0;
        let mut ip: Option<Expr> = None;

        let mut set = |writes: &mut Vec<(String, Expr)>, name: &str, value: Expr| {
            if let Some(slot) = writes.iter_mut().find(|(n, _)| n == name) {
                slot.1 = value;
            } else {
                writes.push((name.to_string(), value));
            }
        };

        let mut i = 0;
        while i < code.len() {
            match code[i] {
                b @ 0x58..=0x5f => {
                    let reg = REGS64[(b - 0x58) as usize];
                    set(&mut writes, reg, Expr::Mem(MemRef::new(["rsp"], sp_disp, 64)));
                    sp_disp += 8;
                    i += 1;
                }
                0xc3 => {
                    ip = Some(Expr::Mem(MemRef::new(["rsp"], sp_disp, 64)));
                    sp_disp += 8;
                    i += 1;
                }
                0xc2 => {
                    if i + 3 > code.len() {
                        return None;
                    }
                    let imm = u16::from_le_bytes([code[i + 1], code[i + 2]]) as i64;
                    ip = Some(Expr::Mem(MemRef::new(["rsp"], sp_disp, 64)));
                    sp_disp += 8 + imm;
                    i += 3;
                }
                0x31 => {
                    if i + 2 > code.len() || code[i + 1] != 0xc0 {
                        return None;
                    }
                    set(&mut writes, "rax", Expr::Const(0));
                    flags_touched = true;
                    i += 2;
                }
                0x48 => {
                    // mov r64, imm32
                    if i + 7 > code.len() || code[i + 1] != 0xc7 {
                        return None;
                    }
                    let modrm = code[i + 2];
                    if !(0xc0..=0xc7).contains(&modrm) {
                        return None;
                    }
                    let reg = REGS64[(modrm - 0xc0) as usize];
                    let imm = i32::from_le_bytes([
                        code[i + 3],
                        code[i + 4],
                        code[i + 5],
                        code[i + 6],
                    ]) as i64;
                    set(&mut writes, reg, Expr::Const(imm));
                    i += 7;
                }
                0x90 => {
                    i += 1;
                }
                _ => return None,
            }
        }

        let mut effects: Effects = Vec::new();
        if flags_touched {
            effects.push((Dest::reg("rflags"), Expr::Unresolved));
        }
        let rsp_written = writes.iter().any(|(n, _)| n == "rsp");
        for (name, value) in writes {
            effects.push((Dest::Reg(name), value));
        }
        if !rsp_written {
            effects.push((Dest::reg("rsp"), Expr::Offset { reg: "rsp".into(), disp: sp_disp }));
        }
        effects.push((
            Dest::reg("rip"),
            ip.unwrap_or(Expr::Const(code.len() as i64)),
        ));
        Some(effects)
    }
}

/// Solves the constraint shapes the toy executor produces: a wanted
/// constant against a computed memory read, constant, or register.
pub(crate) struct ToySolver;

impl ConstraintSolver for ToySolver {
    fn solve(&self, constraint: &Constraint, _timeout: Option<Duration>) -> SolveOutcome {
        let Expr::Const(wanted) = &constraint.wanted else {
            return SolveOutcome::Unsat;
        };
        let wanted = *wanted;
        match &constraint.computed {
            Expr::Mem(m) => {
                let mut stack = BTreeMap::new();
                stack.insert(m.disp, wanted as u64);
                SolveOutcome::Sat(Model { stack })
            }
            Expr::Const(c) => {
                if *c == wanted {
                    SolveOutcome::Sat(Model::default())
                } else {
                    SolveOutcome::Unsat
                }
            }
            // Entry register values are unconstrained inputs.
            Expr::Reg(_) | Expr::Offset { .. } => SolveOutcome::Sat(Model::default()),
            _ => SolveOutcome::Unsat,
        }
    }
}

/// Decode and classify raw bytes into a `Gadget` (amd64).
pub(crate) fn classified(exec: &dyn SymbolicExecutor, addr: VirtAddr, bytes: &[u8]) -> Gadget {
    let dis = Disassembler::new(Arch::Amd64).unwrap();
    let insns = dis.decode(bytes, addr);
    assert!(!insns.is_empty(), "test bytes must decode");
    let cand = Candidate { addr, bytes: bytes.to_vec(), insns };
    GadgetClassifier::new(Arch::Amd64, exec)
        .classify(&cand)
        .expect("test bytes must classify")
}

/// Build a minimal ELF with a single executable PT_LOAD segment
/// holding `code` at `base` + header size.
pub(crate) fn minimal_elf(arch: Arch, pie: bool, base: u64, code: &[u8]) -> Vec<u8> {
    match arch {
        Arch::Amd64 => elf64(62, pie, base, code),
        Arch::I386 => elf32(3, pie, base, code),
        Arch::Arm => elf32(40, pie, base, code),
    }
}

fn elf64(machine: u16, pie: bool, base: u64, code: &[u8]) -> Vec<u8> {
    let code_off: u64 = 64 + 56;
    let vaddr = base + code_off;
    let mut out = Vec::new();

    // e_ident
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&(if pie { 3u16 } else { 2u16 }).to_le_bytes()); // e_type
    out.extend_from_slice(&machine.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&vaddr.to_le_bytes()); // e_entry
    out.extend_from_slice(&64u64.to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    out.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    // PT_LOAD, R+X
    out.extend_from_slice(&1u32.to_le_bytes()); // p_type
    out.extend_from_slice(&5u32.to_le_bytes()); // p_flags
    out.extend_from_slice(&code_off.to_le_bytes()); // p_offset
    out.extend_from_slice(&vaddr.to_le_bytes()); // p_vaddr
    out.extend_from_slice(&vaddr.to_le_bytes()); // p_paddr
    out.extend_from_slice(&(code.len() as u64).to_le_bytes()); // p_filesz
    out.extend_from_slice(&(code.len() as u64).to_le_bytes()); // p_memsz
    out.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align

    out.extend_from_slice(code);
    out
}

fn elf32(machine: u16, pie: bool, base: u64, code: &[u8]) -> Vec<u8> {
    let code_off: u32 = 52 + 32;
    let vaddr = base as u32 + code_off;
    let mut out = Vec::new();

    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&(if pie { 3u16 } else { 2u16 }).to_le_bytes());
    out.extend_from_slice(&machine.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&vaddr.to_le_bytes()); // e_entry
    out.extend_from_slice(&52u32.to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
    out.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
    out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    // ELF32 phdr: p_flags comes after p_memsz.
    out.extend_from_slice(&1u32.to_le_bytes()); // p_type
    out.extend_from_slice(&code_off.to_le_bytes()); // p_offset
    out.extend_from_slice(&vaddr.to_le_bytes()); // p_vaddr
    out.extend_from_slice(&vaddr.to_le_bytes()); // p_paddr
    out.extend_from_slice(&(code.len() as u32).to_le_bytes()); // p_filesz
    out.extend_from_slice(&(code.len() as u32).to_le_bytes()); // p_memsz
    out.extend_from_slice(&5u32.to_le_bytes()); // p_flags
    out.extend_from_slice(&0x1000u32.to_le_bytes()); // p_align

    out.extend_from_slice(code);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toy_executor_pop_rdi_ret() {
        let effects = ToyExecutor.execute(&[0x5f, 0xc3], false).unwrap();
        let rdi = effects
            .iter()
            .find(|(d, _)| *d == Dest::reg("rdi"))
            .map(|(_, e)| e.clone())
            .unwrap();
        assert_eq!(rdi, Expr::Mem(MemRef::new(["rsp"], 0, 64)));

        let rsp = effects
            .iter()
            .find(|(d, _)| *d == Dest::reg("rsp"))
            .map(|(_, e)| e.clone())
            .unwrap();
        assert_eq!(rsp, Expr::Offset { reg: "rsp".into(), disp: 16 });

        let rip = effects
            .iter()
            .find(|(d, _)| *d == Dest::reg("rip"))
            .map(|(_, e)| e.clone())
            .unwrap();
        assert_eq!(rip, Expr::Mem(MemRef::new(["rsp"], 8, 64)));
    }

    #[test]
    fn toy_executor_rejects_unknown_opcode() {
        assert!(ToyExecutor.execute(&[0x0f, 0x05], false).is_none());
    }

    #[test]
    fn toy_executor_rejects_unmapped_modrm() {
        // mov encoding with a modrm above the register range.
        assert!(ToyExecutor
            .execute(&[0x48, 0xc7, 0xc8, 0, 0, 0, 0], false)
            .is_none());
    }

    #[test]
    fn toy_executor_ret_imm() {
        // ret 8: pops the return slot, then releases 8 more bytes.
        let effects = ToyExecutor.execute(&[0xc2, 0x08, 0x00], false).unwrap();
        let rsp = effects
            .iter()
            .find(|(d, _)| *d == Dest::reg("rsp"))
            .map(|(_, e)| e.clone())
            .unwrap();
        assert_eq!(rsp, Expr::Offset { reg: "rsp".into(), disp: 16 });
    }

    #[test]
    fn toy_solver_memory_constraint() {
        let c = Constraint {
            wanted: Expr::Const(0x41414141),
            computed: Expr::Mem(MemRef::new(["rsp"], 8, 64)),
        };
        match ToySolver.solve(&c, None) {
            SolveOutcome::Sat(model) => assert_eq!(model.stack.get(&8), Some(&0x41414141)),
            other => panic!("expected sat, got {:?}", other),
        }
    }

    #[test]
    fn minimal_elf_parses() {
        let data = minimal_elf(Arch::Amd64, false, 0x400000, &[0xc3]);
        assert!(goblin::elf::Elf::parse(&data).is_ok());
        let data = minimal_elf(Arch::I386, true, 0, &[0xc3]);
        assert!(goblin::elf::Elf::parse(&data).is_ok());
    }
}
