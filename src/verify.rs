//! Chain verification: can a gadget sequence be made to satisfy a
//! post-condition, and what stack contents does it take?
//!
//! The chain's raw bytes are concatenated and executed as one unit,
//! which captures inter-gadget data flow exactly instead of composing
//! per-gadget effect maps by hand. Verification is all-or-nothing: a
//! single unsatisfiable condition fails the chain.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::arch::Arch;
use crate::classify::Gadget;
use crate::expr::{Constraint, ConstraintSolver, Dest, Expr, SolveOutcome, SymbolicExecutor};

/// Verification result: total stack-pointer displacement and the
/// required stack layout, keyed by ascending signed offset.
pub type StackLayout = (i64, BTreeMap<i64, u64>);

/// Verifies gadget chains against caller-supplied post-conditions.
pub struct ChainVerifier<'a> {
    arch: Arch,
    executor: &'a dyn SymbolicExecutor,
    solver: &'a dyn ConstraintSolver,
    timeout: Option<Duration>,
}

impl<'a> ChainVerifier<'a> {
    pub fn new(
        arch: Arch,
        executor: &'a dyn SymbolicExecutor,
        solver: &'a dyn ConstraintSolver,
    ) -> Self {
        ChainVerifier { arch, executor, solver, timeout: None }
    }

    /// Bound every solver call; exceeding the deadline counts as
    /// unsatisfiable rather than hanging the verification.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Verify `chain` against `conditions` (destination register →
    /// desired value expression).
    ///
    /// Returns the total stack move and the stack cells the solver
    /// requires, or `None` when any condition is unsatisfiable, when
    /// a condition names a destination the chain never writes, or
    /// when no stack cell ended up constrained.
    pub fn verify(
        &self,
        chain: &[Gadget],
        conditions: &BTreeMap<String, Expr>,
    ) -> Option<StackLayout> {
        if chain.is_empty() {
            return None;
        }

        let code: Vec<u8> = chain.iter().flat_map(|g| g.bytes.iter().copied()).collect();
        let neutralize = chain
            .last()
            .and_then(|g| g.insns.last())
            .map(|text| text == "call" || text.starts_with("call "))
            .unwrap_or(false);
        let effects = self.executor.execute(&code, neutralize)?;

        let mut total_move = 0i64;
        let mut stack: BTreeMap<i64, u64> = BTreeMap::new();
        // Condition names, not hits: a destination written twice must
        // not count for two conditions.
        let mut satisfied: HashSet<&str> = HashSet::new();

        for (dest, value) in &effects {
            let name = match dest {
                Dest::Reg(name) => name,
                Dest::Ptr(_) => continue,
            };

            if name == self.arch.sp_name() {
                if let Some((_, disp)) = value.linear_offset() {
                    total_move = disp;
                }
                continue;
            }

            let Some(wanted) = conditions.get(name) else {
                continue;
            };

            let constraint = Constraint { wanted: wanted.clone(), computed: value.clone() };
            let model = match self.solver.solve(&constraint, self.timeout) {
                SolveOutcome::Sat(model) => model,
                SolveOutcome::Unsat => {
                    log::debug!("condition on {} unsatisfiable", name);
                    return None;
                }
                SolveOutcome::Timeout => {
                    log::warn!("solver timed out on {}; treating as unsatisfiable", name);
                    return None;
                }
            };
            satisfied.insert(name.as_str());

            // Only values read off the stack constrain stack cells.
            if let Expr::Mem(m) = value {
                if m.based_on(self.arch.sp_name()) {
                    stack.extend(model.stack);
                }
            }
        }

        if satisfied.len() < conditions.len() {
            return None;
        }
        if stack.is_empty() {
            return None;
        }
        Some((total_move, stack))
    }
}
