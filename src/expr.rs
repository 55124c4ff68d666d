//! Typed symbolic expressions and the capability seams for symbolic
//! execution and constraint solving.
//!
//! Classification never inspects rendered expression text; everything
//! is structural over the `Expr` sum type, so a register whose name
//! contains "sp" can never be mistaken for the stack pointer.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Symbolic memory reference: a read from `[sum(base) + disp]`.
///
/// `base` is the set of registers contributing to the address, not a
/// rendered string; `size` is the access width in bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemRef {
    pub base: BTreeSet<String>,
    pub disp: i64,
    pub size: u16,
}

impl MemRef {
    pub fn new<I, S>(base: I, disp: i64, size: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MemRef { base: base.into_iter().map(Into::into).collect(), disp, size }
    }

    /// Is `reg` one of the address base registers?
    pub fn based_on(&self, reg: &str) -> bool {
        self.base.contains(reg)
    }
}

/// Symbolic value of a machine location after executing a gadget,
/// in terms of the machine state at gadget entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Entry value of a register.
    Reg(String),
    /// Entry value of a register plus a constant displacement.
    Offset { reg: String, disp: i64 },
    /// Constant value.
    Const(i64),
    /// Memory read.
    Mem(MemRef),
    /// Ordered compound of sub-expressions.
    Seq(Vec<Expr>),
    /// Effect the executor could not express in the forms above.
    Unresolved,
}

impl Expr {
    pub fn reg(name: &str) -> Self {
        Expr::Reg(name.to_string())
    }

    /// The registers contributing to this expression's value.
    pub fn locations(&self) -> Vec<String> {
        match self {
            Expr::Reg(r) => vec![r.clone()],
            Expr::Offset { reg, .. } => vec![reg.clone()],
            Expr::Const(_) | Expr::Unresolved => Vec::new(),
            Expr::Mem(m) => m.base.iter().cloned().collect(),
            Expr::Seq(parts) => parts.iter().flat_map(Expr::locations).collect(),
        }
    }

    /// View this expression as `reg + disp` if it has that shape.
    pub fn linear_offset(&self) -> Option<(&str, i64)> {
        match self {
            Expr::Reg(r) => Some((r, 0)),
            Expr::Offset { reg, disp } => Some((reg, *disp)),
            _ => None,
        }
    }
}

/// Destination written by a gadget.
#[derive(Debug, Clone, PartialEq)]
pub enum Dest {
    /// A register, by name.
    Reg(String),
    /// A write through a memory pointer. Deliberately unmodeled:
    /// a gadget producing one is rejected by the classifier.
    Ptr(Expr),
}

impl Dest {
    pub fn reg(name: &str) -> Self {
        Dest::Reg(name.to_string())
    }
}

/// Ordered effect mapping produced by symbolic execution: every
/// destination the gadget writes, with its symbolic source value.
pub type Effects = Vec<(Dest, Expr)>;

/// Symbolic execution of raw gadget bytes into an effect mapping.
///
/// Implementations lift and execute the bytes over a fully symbolic
/// initial state. `None` means execution could not be resolved; the
/// candidate is dropped, not the analysis.
pub trait SymbolicExecutor: Send + Sync {
    /// Execute `code` symbolically.
    ///
    /// When `neutralize_trailing_call` is set, a `call` as the final
    /// instruction must be treated as a return-style transfer instead
    /// of descending into the callee, so the bytes following the
    /// gadget are never interpreted as its body.
    fn execute(&self, code: &[u8], neutralize_trailing_call: bool) -> Option<Effects>;
}

/// Equality constraint handed to the solver: `wanted == computed`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub wanted: Expr,
    pub computed: Expr,
}

/// Satisfying assignment extracted from a solver model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    /// Concrete bytes the solver assigned to symbolic stack cells,
    /// keyed by signed stack-pointer-relative offset.
    pub stack: BTreeMap<i64, u64>,
}

/// Outcome of a single solver call.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Sat(Model),
    Unsat,
    /// The solver exceeded its deadline. Treated as unsatisfiable.
    Timeout,
}

/// Constraint satisfaction over symbolic expressions.
pub trait ConstraintSolver: Send + Sync {
    fn solve(&self, constraint: &Constraint, timeout: Option<Duration>) -> SolveOutcome;
}
