//! Constant and Copy Propagation
//!
//! Forward worklist fixpoint over the CFG. The fact at each point maps a
//! local to the literal it holds or to another local it is a copy of. A
//! binding survives a join only if every visited predecessor agrees on it.
//! Nodes not reached yet hold no fact at all (top) and are skipped by the
//! meet.

use super::access::{stmt_accesses, Access};
use super::cfg::{Cfg, NodeId};
use super::liveness::is_self_copy;
use crate::error::CompileResult;
use crate::ir::{ExprKind, Function, Literal, StmtKind, VarId, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Upper bound on analyse-and-rewrite rounds per function
const MAX_ROUNDS: usize = 32;

/// What is known about a local at a program point
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Const(Literal),
    Copy(VarId),
}

/// Knowledge at one program point
pub type State = FxHashMap<VarId, Binding>;

/// Counts of reads rewritten
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationCounts {
    pub constants: usize,
    pub copies: usize,
    /// `x := x` statements dropped after rewriting
    pub self_copies: usize,
}

impl PropagationCounts {
    pub fn total(&self) -> usize {
        self.constants + self.copies + self.self_copies
    }
}

/// Result of the forward analysis: the fact on entry to each node
#[derive(Debug, Clone)]
pub struct Propagation {
    pub state_in: Vec<Option<State>>,
}

impl Propagation {
    /// Run the analysis to its fixpoint
    pub fn compute(vars: &[Variable], func: &Function, cfg: &Cfg) -> Self {
        let tracked: FxHashSet<VarId> = func
            .params
            .iter()
            .chain(func.locals.iter())
            .copied()
            .collect();
        let n = cfg.len();
        let mut state_in: Vec<Option<State>> = vec![None; n];
        let mut state_out: Vec<Option<State>> = vec![None; n];
        let mut queued = vec![true; n];
        let mut worklist: VecDeque<NodeId> = (0..n).collect();

        while let Some(node) = worklist.pop_front() {
            queued[node] = false;

            let mut incoming: Option<State> = if node == Cfg::ENTRY {
                Some(State::default())
            } else {
                None
            };
            for p in cfg.preds(node) {
                if let Some(out) = &state_out[*p] {
                    incoming = Some(match incoming {
                        None => out.clone(),
                        Some(acc) => meet(&acc, out),
                    });
                }
            }
            let Some(incoming) = incoming else { continue };

            let out = transfer(vars, func, cfg, node, &tracked, incoming.clone());
            state_in[node] = Some(incoming);
            if state_out[node].as_ref() != Some(&out) {
                state_out[node] = Some(out);
                for s in cfg.succs(node) {
                    if !queued[*s] {
                        queued[*s] = true;
                        worklist.push_back(*s);
                    }
                }
            }
        }
        Self { state_in }
    }
}

/// Bindings present and equal in both states
fn meet(a: &State, b: &State) -> State {
    a.iter()
        .filter(|(v, binding)| b.get(v) == Some(binding))
        .map(|(v, binding)| (*v, binding.clone()))
        .collect()
}

/// Forget `var` and every copy of it
fn kill(state: &mut State, var: VarId) {
    state.remove(&var);
    state.retain(|_, binding| *binding != Binding::Copy(var));
}

fn transfer(
    vars: &[Variable],
    func: &Function,
    cfg: &Cfg,
    node: NodeId,
    tracked: &FxHashSet<VarId>,
    mut state: State,
) -> State {
    let Some(stmt) = cfg.stmt(node) else {
        return state;
    };
    for access in stmt_accesses(&func.body, stmt) {
        match access {
            Access::Def(var) | Access::MayDef(var) => kill(&mut state, var),
            Access::Read { .. } => {}
        }
    }
    if let StmtKind::Assign { target, value } = func.body.stmt(stmt).kind {
        if tracked.contains(&target) {
            let value_expr = func.body.expr(value);
            let target_ty = &vars[target.index()].ty;
            match &value_expr.kind {
                ExprKind::Literal(lit) if value_expr.ty == *target_ty => {
                    state.insert(target, Binding::Const(lit.clone()));
                }
                ExprKind::VarRead(source)
                    if *source != target
                        && tracked.contains(source)
                        && vars[source.index()].ty == *target_ty =>
                {
                    state.insert(target, Binding::Copy(*source));
                }
                _ => {}
            }
        }
    }
    state
}

/// Follow a copy chain to a literal or to the oldest equal local
fn resolve(state: &State, var: VarId) -> Option<Binding> {
    let mut current = var;
    let mut seen = FxHashSet::default();
    seen.insert(var);
    loop {
        match state.get(&current) {
            Some(Binding::Const(lit)) => return Some(Binding::Const(lit.clone())),
            Some(Binding::Copy(source)) if seen.insert(*source) => current = *source,
            _ => break,
        }
    }
    (current != var).then_some(Binding::Copy(current))
}

/// Constant and copy propagator
pub struct ConstantPropagator;

impl ConstantPropagator {
    /// Create a new propagator
    pub fn new() -> Self {
        Self
    }

    /// Rewrite local reads with known values until nothing changes
    pub fn propagate(&self, vars: &[Variable], func: &mut Function) -> CompileResult<PropagationCounts> {
        let mut counts = PropagationCounts::default();
        for _ in 0..MAX_ROUNDS {
            let round = self.propagate_once(vars, func)?;
            if round.total() == 0 {
                break;
            }
            counts.constants += round.constants;
            counts.copies += round.copies;
            counts.self_copies += round.self_copies;
        }
        if counts.total() > 0 {
            log::debug!(
                "propagated {} constants and {} copies in {}",
                counts.constants,
                counts.copies,
                func.name
            );
        }
        Ok(counts)
    }

    fn propagate_once(&self, vars: &[Variable], func: &mut Function) -> CompileResult<PropagationCounts> {
        let cfg = Cfg::build(&func.body)?;
        let analysis = Propagation::compute(vars, func, &cfg);
        let mut counts = PropagationCounts::default();

        for node in 0..cfg.len() {
            let (Some(stmt), Some(state)) = (cfg.stmt(node), &analysis.state_in[node]) else {
                continue;
            };
            let mut state = state.clone();
            for access in stmt_accesses(&func.body, stmt) {
                match access {
                    Access::Read { var, expr } => match resolve(&state, var) {
                        Some(Binding::Const(lit)) => {
                            let ty = func.body.expr(expr).ty.clone();
                            func.body.replace_expr(expr, ExprKind::Literal(lit), ty);
                            counts.constants += 1;
                        }
                        Some(Binding::Copy(source)) => {
                            let ty = func.body.expr(expr).ty.clone();
                            func.body.replace_expr(expr, ExprKind::VarRead(source), ty);
                            counts.copies += 1;
                        }
                        None => {}
                    },
                    Access::Def(var) | Access::MayDef(var) => kill(&mut state, var),
                }
            }
        }

        for stmt in func.body.walk_stmts() {
            if is_self_copy(&func.body, &func.body.stmt(stmt).kind) {
                func.body.remove_stmt(stmt);
                counts.self_copies += 1;
            }
        }
        Ok(counts)
    }
}

impl Default for ConstantPropagator {
    fn default() -> Self {
        Self::new()
    }
}
