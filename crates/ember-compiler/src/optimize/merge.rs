//! Local Variable Merging
//!
//! Greedy coloring of the interference graph. Two variables of the same type
//! interfere when both are live at some node (counting the node's own
//! definitions). Parameters keep their own color; every local either joins
//! the first compatible color or opens a new one, and is then renamed to
//! that color's representative.

use super::cfg::Cfg;
use super::liveness::{is_self_copy, Liveness};
use crate::error::{CompileError, CompileResult};
use crate::ir::{Function, StmtKind, VarId, Variable};
use rustc_hash::{FxHashMap, FxHashSet};

/// Undirected interference graph over a function's parameters and locals
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    edges: FxHashMap<VarId, FxHashSet<VarId>>,
}

impl InterferenceGraph {
    /// Build the graph from liveness facts
    pub fn build(vars: &[Variable], func: &Function, cfg: &Cfg, liveness: &Liveness) -> Self {
        let mut graph = Self::default();
        for v in func.params.iter().chain(func.locals.iter()) {
            graph.edges.entry(*v).or_default();
        }
        for node in 0..cfg.len() {
            let mut live: Vec<VarId> = liveness.live_at(node).into_iter().collect();
            live.sort();
            for (i, a) in live.iter().enumerate() {
                for b in &live[i + 1..] {
                    if vars[a.index()].ty == vars[b.index()].ty {
                        graph.add_edge(*a, *b);
                    }
                }
            }
        }
        graph
    }

    fn add_edge(&mut self, a: VarId, b: VarId) {
        self.edges.entry(a).or_default().insert(b);
        self.edges.entry(b).or_default().insert(a);
    }

    pub fn interferes(&self, a: VarId, b: VarId) -> bool {
        self.edges.get(&a).is_some_and(|n| n.contains(&b))
    }

    pub fn degree(&self, v: VarId) -> usize {
        self.edges.get(&v).map_or(0, |n| n.len())
    }
}

/// Local variable merger
pub struct VariableMerger;

impl VariableMerger {
    /// Create a new variable merger
    pub fn new() -> Self {
        Self
    }

    /// Merge non-interfering locals until no more can be merged. Returns the
    /// number of locals removed from the function.
    pub fn merge(&self, vars: &[Variable], func: &mut Function) -> CompileResult<usize> {
        let mut merged = 0;
        loop {
            let round = self.merge_once(vars, func)?;
            if round == 0 {
                break;
            }
            merged += round;
        }
        if merged > 0 {
            log::debug!("merged {} locals in {}", merged, func.name);
        }
        Ok(merged)
    }

    /// Color the interference graph and return, for every local that joins
    /// another variable's color, the representative it is renamed to
    pub fn plan(&self, vars: &[Variable], func: &Function) -> CompileResult<FxHashMap<VarId, VarId>> {
        let cfg = Cfg::build(&func.body)?;
        let liveness = Liveness::compute(func, &cfg);
        let graph = InterferenceGraph::build(vars, func, &cfg, &liveness);

        // Colors are identified by their representative
        let mut colors: Vec<(VarId, Vec<VarId>)> =
            func.params.iter().map(|p| (*p, vec![*p])).collect();

        let mut order: Vec<(usize, VarId)> = func.locals.iter().copied().enumerate().collect();
        // Descending degree, ties in declaration order
        order.sort_by(|(ia, a), (ib, b)| graph.degree(*b).cmp(&graph.degree(*a)).then(ia.cmp(ib)));

        let mut rename: FxHashMap<VarId, VarId> = FxHashMap::default();
        for (_, local) in order {
            let ty = &vars[local.index()].ty;
            let slot = colors.iter_mut().find(|(rep, members)| {
                vars[rep.index()].ty == *ty && members.iter().all(|m| !graph.interferes(*m, local))
            });
            match slot {
                Some((rep, members)) => {
                    members.push(local);
                    rename.insert(local, *rep);
                }
                None => colors.push((local, vec![local])),
            }
        }

        check_coloring(func, &graph, &colors)?;
        Ok(rename)
    }

    fn merge_once(&self, vars: &[Variable], func: &mut Function) -> CompileResult<usize> {
        let rename = self.plan(vars, func)?;
        if rename.is_empty() {
            return Ok(0);
        }

        for (local, rep) in &rename {
            log::trace!("{}: {} merged into {}", func.name, local, rep);
        }
        func.body.map_vars(|v| rename.get(&v).copied().unwrap_or(v));
        for stmt in func.body.walk_stmts() {
            let kind = &func.body.stmt(stmt).kind;
            if matches!(kind, StmtKind::Assign { .. }) && is_self_copy(&func.body, kind) {
                func.body.remove_stmt(stmt);
            }
        }
        func.locals.retain(|l| !rename.contains_key(l));
        Ok(rename.len())
    }
}

impl Default for VariableMerger {
    fn default() -> Self {
        Self::new()
    }
}

fn check_coloring(
    func: &Function,
    graph: &InterferenceGraph,
    colors: &[(VarId, Vec<VarId>)],
) -> CompileResult<()> {
    for (rep, members) in colors {
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                if graph.interferes(*a, *b) {
                    return Err(CompileError::InvariantViolation {
                        pass: "merge".to_string(),
                        function: func.name.clone(),
                        message: format!("{} and {} share color {} but interfere", a, b, rep),
                        dump: String::new(),
                    });
                }
            }
        }
    }
    Ok(())
}
