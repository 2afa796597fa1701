//! Liveness Analysis and Dead-Store Elimination
//!
//! Backward worklist fixpoint over the CFG:
//!
//! ```text
//! live_in[n]  = use[n] ∪ (live_out[n] − def[n])
//! live_out[n] = ⋃ live_in[s]  for s in succ(n)
//! ```
//!
//! Only the function's own parameters and locals are tracked; globals can be
//! observed by any callee and are always considered live.

use super::access::{has_side_effects, stmt_accesses, Access};
use super::cfg::{Cfg, NodeId};
use crate::error::CompileResult;
use crate::ir::{Body, ExprId, ExprKind, Function, StmtKind, VarId};
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Per-node liveness facts
#[derive(Debug, Clone)]
pub struct Liveness {
    pub uses: Vec<FxHashSet<VarId>>,
    pub defs: Vec<FxHashSet<VarId>>,
    pub may_defs: Vec<FxHashSet<VarId>>,
    pub live_in: Vec<FxHashSet<VarId>>,
    pub live_out: Vec<FxHashSet<VarId>>,
}

impl Liveness {
    /// Run the analysis to its fixpoint
    pub fn compute(func: &Function, cfg: &Cfg) -> Self {
        let tracked: FxHashSet<VarId> = func
            .params
            .iter()
            .chain(func.locals.iter())
            .copied()
            .collect();
        let n = cfg.len();
        let mut uses = vec![FxHashSet::default(); n];
        let mut defs = vec![FxHashSet::default(); n];
        let mut may_defs = vec![FxHashSet::default(); n];

        for node in 0..n {
            let Some(stmt) = cfg.stmt(node) else { continue };
            for access in stmt_accesses(&func.body, stmt) {
                match access {
                    Access::Read { var, .. } if tracked.contains(&var) => {
                        if !defs[node].contains(&var) {
                            uses[node].insert(var);
                        }
                    }
                    Access::Def(var) if tracked.contains(&var) => {
                        defs[node].insert(var);
                    }
                    Access::MayDef(var) if tracked.contains(&var) => {
                        may_defs[node].insert(var);
                    }
                    _ => {}
                }
            }
        }

        let mut live_in: Vec<FxHashSet<VarId>> = vec![FxHashSet::default(); n];
        let mut live_out: Vec<FxHashSet<VarId>> = vec![FxHashSet::default(); n];
        let mut queued = vec![true; n];
        let mut worklist: VecDeque<NodeId> = (0..n).rev().collect();
        let mut steps = 0usize;

        while let Some(node) = worklist.pop_front() {
            queued[node] = false;
            steps += 1;

            let mut out = FxHashSet::default();
            for s in cfg.succs(node) {
                out.extend(live_in[*s].iter().copied());
            }
            let mut inn: FxHashSet<VarId> = out
                .iter()
                .filter(|v| !defs[node].contains(v))
                .copied()
                .collect();
            inn.extend(uses[node].iter().copied());
            live_out[node] = out;

            if inn != live_in[node] {
                live_in[node] = inn;
                for p in cfg.preds(node) {
                    if !queued[*p] {
                        queued[*p] = true;
                        worklist.push_back(*p);
                    }
                }
            }
        }
        log::trace!("liveness of {} stable after {} node visits", func.name, steps);

        Self {
            uses,
            defs,
            may_defs,
            live_in,
            live_out,
        }
    }

    /// Variables live at a node: `live_in ∪ live_out ∪ defs ∪ may_defs`
    pub fn live_at(&self, node: NodeId) -> FxHashSet<VarId> {
        let mut live = self.live_in[node].clone();
        live.extend(self.live_out[node].iter().copied());
        live.extend(self.defs[node].iter().copied());
        live.extend(self.may_defs[node].iter().copied());
        live
    }
}

/// Dead-store elimination
pub struct DeadStoreEliminator;

impl DeadStoreEliminator {
    /// Create a new dead-store eliminator
    pub fn new() -> Self {
        Self
    }

    /// Remove stores to locals that are never read afterwards, repeating
    /// until none is left. Returns the number of stores removed.
    pub fn eliminate(&self, func: &mut Function) -> CompileResult<usize> {
        let mut removed = 0;
        loop {
            let round = self.eliminate_once(func)?;
            if round == 0 {
                break;
            }
            removed += round;
        }
        if removed > 0 {
            log::debug!("removed {} dead stores in {}", removed, func.name);
        }
        Ok(removed)
    }

    fn eliminate_once(&self, func: &mut Function) -> CompileResult<usize> {
        let cfg = Cfg::build(&func.body)?;
        let liveness = Liveness::compute(func, &cfg);
        let mut removed = 0;

        for node in 0..cfg.len() {
            let Some(stmt) = cfg.stmt(node) else { continue };
            let StmtKind::Assign { target, value } = func.body.stmt(stmt).kind else {
                continue;
            };
            if !func.owns_var(target) || liveness.live_out[node].contains(&target) {
                continue;
            }
            if has_side_effects(&func.body, value) || binds_variable(&func.body, value) {
                func.body.replace_stmt(stmt, StmtKind::Expr(value));
            } else {
                func.body.remove_stmt(stmt);
            }
            removed += 1;
        }
        Ok(removed)
    }
}

impl Default for DeadStoreEliminator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether evaluating `expr` writes a variable through `let`
fn binds_variable(body: &Body, expr: ExprId) -> bool {
    body.sub_exprs(expr)
        .into_iter()
        .any(|e| matches!(body.expr(e).kind, ExprKind::Let { .. }))
}

/// Statements of the form `x := x`
pub(crate) fn is_self_copy(body: &Body, kind: &StmtKind) -> bool {
    match kind {
        StmtKind::Assign { target, value } => {
            matches!(body.expr(*value).kind, ExprKind::VarRead(v) if v == *target)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::interp::{Interpreter, Value};
    use crate::ir::{BinaryOp, Program, ProgramBuilder, StmtId, Type};

    /// a = 1; b = 2; loop { exitwhen a > 10; a = a + b }; return a
    fn counting_loop() -> (Program, Vec<VarId>, Vec<StmtId>) {
        let mut pb = ProgramBuilder::new();
        let mut f = pb.function("f", Type::Int);
        let a = f.local("a", Type::Int);
        let b = f.local("b", Type::Int);
        let one = f.int(1);
        let init_a = f.assign(a, one);
        f.push(init_a);
        let two = f.int(2);
        let init_b = f.assign(b, two);
        f.push(init_b);
        let read = f.read(a);
        let ten = f.int(10);
        let done = f.binary(BinaryOp::Gt, read, ten);
        let exit = f.exit_when(done);
        let read_a = f.read(a);
        let read_b = f.read(b);
        let sum = f.binary(BinaryOp::Add, read_a, read_b);
        let step = f.assign(a, sum);
        let body = f.loop_(vec![exit, step]);
        f.push(body);
        let read = f.read(a);
        let ret = f.ret(Some(read));
        f.push(ret);
        f.finish();
        (pb.finish(), vec![a, b], vec![init_a, init_b, exit, step, ret])
    }

    #[test]
    fn test_loop_carried_liveness() {
        let (program, vars, stmts) = counting_loop();
        let func = &program.functions[0];
        let cfg = Cfg::build(&func.body).unwrap();
        let live = Liveness::compute(func, &cfg);
        let (a, b) = (vars[0], vars[1]);

        let n_init_b = cfg.node_of(stmts[1]).unwrap();
        assert!(live.live_out[n_init_b].contains(&a));
        assert!(live.live_out[n_init_b].contains(&b));

        // b stays live around the back edge
        let n_step = cfg.node_of(stmts[3]).unwrap();
        assert!(live.live_out[n_step].contains(&b));

        let n_ret = cfg.node_of(stmts[4]).unwrap();
        assert!(live.live_out[n_ret].is_empty());
        assert_eq!(live.live_in[n_ret].iter().copied().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_recomputation_is_stable() {
        let (program, _, _) = counting_loop();
        let func = &program.functions[0];
        let cfg = Cfg::build(&func.body).unwrap();
        let first = Liveness::compute(func, &cfg);
        let second = Liveness::compute(func, &cfg);
        assert_eq!(first.live_in, second.live_in);
        assert_eq!(first.live_out, second.live_out);
    }

    #[test]
    fn test_dead_store_removed_or_kept_for_effects() {
        let mut pb = ProgramBuilder::new();
        let g = pb.native("g", Vec::new(), Type::Int);
        let mut f = pb.function("f", Type::Int);
        let a = f.local("a", Type::Int);
        let b = f.local("b", Type::Int);
        let one = f.int(1);
        let dead = f.assign(a, one);
        f.push(dead);
        let call = f.call(g, Vec::new());
        let effect = f.assign(b, call);
        f.push(effect);
        let two = f.int(2);
        let live = f.assign(a, two);
        f.push(live);
        let read = f.read(a);
        let ret = f.ret(Some(read));
        f.push(ret);
        let id = f.finish();
        let mut program = pb.finish();

        let func = program.function_mut(id);
        let removed = DeadStoreEliminator::new().eliminate(func).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(func.body.root(), &[effect, live, ret]);
        assert_eq!(func.body.stmt(effect).kind, StmtKind::Expr(call));
        assert!(func.body.verify().is_ok());

        // Already at its fixpoint
        assert_eq!(DeadStoreEliminator::new().eliminate(func).unwrap(), 0);
    }

    #[test]
    fn test_dead_store_with_computed_index_keeps_the_read() {
        // a = arr[p - 1]; return 0 with a dead: p = 0 must still fail
        let mut pb = ProgramBuilder::new();
        let arr = pb.global("arr", Type::array_of(Type::Int));
        let mut f = pb.function("f", Type::Int);
        let p = f.param("p", Type::Int);
        let a = f.local("a", Type::Int);
        let read = f.read(p);
        let one = f.int(1);
        let index = f.binary(BinaryOp::Sub, read, one);
        let element = f.array_read(arr, index);
        let store = f.assign(a, element);
        f.push(store);
        let zero = f.int(0);
        let ret = f.ret(Some(zero));
        f.push(ret);
        let id = f.finish();
        let mut program = pb.finish();

        let before = Interpreter::new(&program).call("f", vec![Value::Int(0)]);
        assert_eq!(before, Err(RuntimeError::NegativeIndex(-1)));

        let func = program.function_mut(id);
        assert_eq!(DeadStoreEliminator::new().eliminate(func).unwrap(), 1);
        assert_eq!(func.body.stmt(store).kind, StmtKind::Expr(element));

        let after = Interpreter::new(&program).call("f", vec![Value::Int(0)]);
        assert_eq!(after, before);
        assert_eq!(
            Interpreter::new(&program).call("f", vec![Value::Int(3)]),
            Ok(Value::Int(0))
        );
    }

    #[test]
    fn test_cascading_dead_stores() {
        let mut pb = ProgramBuilder::new();
        let mut f = pb.function("f", Type::Void);
        let a = f.local("a", Type::Int);
        let b = f.local("b", Type::Int);
        let one = f.int(1);
        let s1 = f.assign(a, one);
        f.push(s1);
        let read = f.read(a);
        let s2 = f.assign(b, read);
        f.push(s2);
        let id = f.finish();
        let mut program = pb.finish();

        let func = program.function_mut(id);
        assert_eq!(DeadStoreEliminator::new().eliminate(func).unwrap(), 2);
        assert!(func.body.root().is_empty());
    }

    #[test]
    fn test_global_stores_are_kept() {
        let mut pb = ProgramBuilder::new();
        let g = pb.global("g", Type::Int);
        let mut f = pb.function("f", Type::Void);
        let one = f.int(1);
        let s = f.assign(g, one);
        f.push(s);
        let id = f.finish();
        let mut program = pb.finish();
        let func = program.function_mut(id);
        assert_eq!(DeadStoreEliminator::new().eliminate(func).unwrap(), 0);
    }

    #[test]
    fn test_store_with_live_let_binding_keeps_its_value() {
        // a = (let t = 4 in t) + 1 with a dead and t read afterwards
        let mut pb = ProgramBuilder::new();
        let mut f = pb.function("f", Type::Int);
        let a = f.local("a", Type::Int);
        let t = f.local("t", Type::Int);
        let four = f.int(4);
        let read_t = f.read(t);
        let bound = f.let_in(t, four, read_t);
        let one = f.int(1);
        let sum = f.binary(BinaryOp::Add, bound, one);
        let store = f.assign(a, sum);
        f.push(store);
        let read_t = f.read(t);
        let ret = f.ret(Some(read_t));
        f.push(ret);
        let id = f.finish();
        let mut program = pb.finish();

        let func = program.function_mut(id);
        assert_eq!(DeadStoreEliminator::new().eliminate(func).unwrap(), 1);
        assert_eq!(func.body.stmt(store).kind, StmtKind::Expr(sum));
    }
}
