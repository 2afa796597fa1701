//! Dataflow Optimization Passes
//!
//! Intraprocedural passes over the flat IR produced by class elimination.
//! Each pass works on one function at a time and iterates to its own
//! fixpoint, so running it again on its output changes nothing.

mod access;
mod cfg;
mod liveness;
mod merge;
mod propagate;

pub use access::{has_side_effects, stmt_accesses, Access};
pub use cfg::{Cfg, CfgNode, NodeId, NodeKind};
pub use liveness::{DeadStoreEliminator, Liveness};
pub use merge::{InterferenceGraph, VariableMerger};
pub use propagate::{Binding, ConstantPropagator, Propagation, PropagationCounts};

use crate::error::{CompileError, CompileResult};
use crate::ir::{FunctionId, Program};
use serde::{Deserialize, Serialize};

/// Optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptLevel {
    /// No optimizations
    None,
    /// One round of propagation, dead-store elimination and merging
    Basic,
    /// Rounds until nothing changes
    #[default]
    Full,
}

impl std::str::FromStr for OptLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(OptLevel::None),
            "basic" => Ok(OptLevel::Basic),
            "full" => Ok(OptLevel::Full),
            other => Err(format!("unknown optimization level `{}`", other)),
        }
    }
}

/// Statistics about optimizations performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptStats {
    /// Reads replaced by a literal
    pub constants_propagated: usize,
    /// Reads replaced by an older copy
    pub copies_propagated: usize,
    /// Stores to dead locals removed or reduced to their side effects,
    /// including `x := x` left behind by propagation
    pub dead_stores_removed: usize,
    /// Locals folded into another variable
    pub locals_merged: usize,
    /// Largest number of rounds any single function needed
    pub rounds: usize,
}

impl OptStats {
    /// Total number of rewrites
    pub fn changes(&self) -> usize {
        self.constants_propagated
            + self.copies_propagated
            + self.dead_stores_removed
            + self.locals_merged
    }

    fn absorb(&mut self, other: &OptStats) {
        self.constants_propagated += other.constants_propagated;
        self.copies_propagated += other.copies_propagated;
        self.dead_stores_removed += other.dead_stores_removed;
        self.locals_merged += other.locals_merged;
        self.rounds = self.rounds.max(other.rounds);
    }
}

/// Optimizer that runs the dataflow passes over every function
pub struct Optimizer {
    level: OptLevel,
    max_rounds: usize,
}

impl Optimizer {
    /// Create a new optimizer with the given level
    pub fn new(level: OptLevel) -> Self {
        Self {
            level,
            max_rounds: 16,
        }
    }

    /// Create an optimizer with no optimizations
    pub fn none() -> Self {
        Self::new(OptLevel::None)
    }

    /// Create an optimizer running a single round
    pub fn basic() -> Self {
        Self::new(OptLevel::Basic)
    }

    /// Create an optimizer running to a fixpoint
    pub fn full() -> Self {
        Self::new(OptLevel::Full)
    }

    /// Bound the number of rounds per function at `Full`
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn level(&self) -> OptLevel {
        self.level
    }

    /// Optimize every non-native function of a flat program
    pub fn optimize(&self, program: &mut Program) -> CompileResult<OptStats> {
        let mut stats = OptStats::default();
        if self.level == OptLevel::None {
            return Ok(stats);
        }
        program.assert_flat()?;

        for i in 0..program.functions.len() {
            let id = FunctionId::new(i as u32);
            if program.function(id).native {
                continue;
            }
            let func_stats = self.optimize_function(program, id)?;
            stats.absorb(&func_stats);
        }
        log::debug!(
            "optimizer: {} constants, {} copies, {} dead stores, {} merges",
            stats.constants_propagated,
            stats.copies_propagated,
            stats.dead_stores_removed,
            stats.locals_merged
        );
        Ok(stats)
    }

    /// Optimize one function
    pub fn optimize_function(&self, program: &mut Program, id: FunctionId) -> CompileResult<OptStats> {
        let rounds = match self.level {
            OptLevel::None => return Ok(OptStats::default()),
            OptLevel::Basic => 1,
            OptLevel::Full => self.max_rounds,
        };

        let mut stats = OptStats::default();
        for _ in 0..rounds {
            let round = match self.round(program, id) {
                Ok(round) => round,
                Err(err) => return Err(attach_dump(err, program, id)),
            };
            stats.rounds += 1;
            let changed = round.changes() > 0;
            stats.absorb(&OptStats {
                rounds: 0,
                ..round
            });
            if !changed {
                break;
            }
        }
        if stats.rounds == self.max_rounds && self.level == OptLevel::Full {
            log::debug!(
                "{} still changing after {} rounds",
                program.function(id).name,
                stats.rounds
            );
        }
        Ok(stats)
    }

    /// Propagation, dead-store elimination and merging, in that order
    fn round(&self, program: &mut Program, id: FunctionId) -> CompileResult<OptStats> {
        let Program {
            vars, functions, ..
        } = program;
        let func = &mut functions[id.index()];

        let propagated = ConstantPropagator::new().propagate(vars, func)?;
        check_body("propagate", func)?;
        let dead_stores_removed = DeadStoreEliminator::new().eliminate(func)?;
        check_body("dead-store", func)?;
        let locals_merged = VariableMerger::new().merge(vars, func)?;
        check_body("merge", func)?;

        Ok(OptStats {
            constants_propagated: propagated.constants,
            copies_propagated: propagated.copies,
            dead_stores_removed: dead_stores_removed + propagated.self_copies,
            locals_merged,
            rounds: 0,
        })
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptLevel::default())
    }
}

fn check_body(pass: &str, func: &crate::ir::Function) -> CompileResult<()> {
    func.body
        .verify()
        .map_err(|message| CompileError::InvariantViolation {
            pass: pass.to_string(),
            function: func.name.clone(),
            message,
            dump: String::new(),
        })
}

/// Replace a pass's dump with the pretty-printed function
fn attach_dump(err: CompileError, program: &Program, id: FunctionId) -> CompileError {
    match err {
        CompileError::InvariantViolation {
            pass,
            function,
            message,
            ..
        } => CompileError::InvariantViolation {
            pass,
            function,
            message,
            dump: program.pretty_function(id),
        },
        other => other,
    }
}
