//! Control-Flow Graph
//!
//! One node per atomic statement, plus a node for each `if` (evaluating the
//! condition) and each `loop` header. Two synthetic nodes bracket the graph:
//! node 0 is the function entry and node 1 the fall-off-the-end exit.

use crate::error::{CompileError, CompileResult};
use crate::ir::{Body, StmtId, StmtKind};
use rustc_hash::FxHashMap;

/// Index of a CFG node
pub type NodeId = usize;

/// What a CFG node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Entry,
    Exit,
    /// An atomic statement, an `if` condition or a `loop` header
    Stmt(StmtId),
}

/// A CFG node
#[derive(Debug, Clone)]
pub struct CfgNode {
    pub kind: NodeKind,
    pub succs: Vec<NodeId>,
    pub preds: Vec<NodeId>,
}

/// Control-flow graph of one function body
#[derive(Debug, Clone)]
pub struct Cfg {
    nodes: Vec<CfgNode>,
    by_stmt: FxHashMap<StmtId, NodeId>,
}

impl Cfg {
    pub const ENTRY: NodeId = 0;
    pub const EXIT: NodeId = 1;

    /// Build the graph for a body
    pub fn build(body: &Body) -> CompileResult<Self> {
        let mut cfg = Self {
            nodes: Vec::new(),
            by_stmt: FxHashMap::default(),
        };
        cfg.add_node(NodeKind::Entry);
        cfg.add_node(NodeKind::Exit);

        let first = cfg.build_block(body, body.root(), Self::EXIT, None)?;
        cfg.nodes[Self::ENTRY].succs.push(first);

        for n in 0..cfg.nodes.len() {
            for s in cfg.nodes[n].succs.clone() {
                cfg.nodes[s].preds.push(n);
            }
        }
        Ok(cfg)
    }

    fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        if let NodeKind::Stmt(stmt) = kind {
            self.by_stmt.insert(stmt, id);
        }
        self.nodes.push(CfgNode {
            kind,
            succs: Vec::new(),
            preds: Vec::new(),
        });
        id
    }

    fn set_succs(&mut self, node: NodeId, mut succs: Vec<NodeId>) {
        succs.dedup();
        self.nodes[node].succs = succs;
    }

    /// Build a statement list back to front; returns the node control enters
    /// the list at (`follow` for an empty list)
    fn build_block(
        &mut self,
        body: &Body,
        stmts: &[StmtId],
        follow: NodeId,
        loop_exit: Option<NodeId>,
    ) -> CompileResult<NodeId> {
        let mut next = follow;
        for stmt in stmts.iter().rev() {
            next = self.build_stmt(body, *stmt, next, loop_exit)?;
        }
        Ok(next)
    }

    fn build_stmt(
        &mut self,
        body: &Body,
        stmt: StmtId,
        follow: NodeId,
        loop_exit: Option<NodeId>,
    ) -> CompileResult<NodeId> {
        let node = self.add_node(NodeKind::Stmt(stmt));
        let succs = match &body.stmt(stmt).kind {
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => {
                let then_entry = self.build_block(body, then_block, follow, loop_exit)?;
                let else_entry = self.build_block(body, else_block, follow, loop_exit)?;
                vec![then_entry, else_entry]
            }
            StmtKind::Loop { body: loop_body } => {
                // The exit of this loop is whatever follows it
                let first = self.build_block(body, loop_body, node, Some(follow))?;
                vec![first]
            }
            StmtKind::ExitWhen { .. } => {
                let Some(exit) = loop_exit else {
                    return Err(CompileError::structural(
                        "exitwhen outside of a loop",
                        &body.stmt(stmt).span,
                    ));
                };
                vec![follow, exit]
            }
            StmtKind::Return { .. } | StmtKind::Trap { .. } => Vec::new(),
            StmtKind::Assign { .. }
            | StmtKind::ArrayAssign { .. }
            | StmtKind::MemberAssign { .. }
            | StmtKind::Expr(_)
            | StmtKind::Dealloc { .. } => vec![follow],
        };
        self.set_succs(node, succs);
        Ok(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.nodes[id]
    }

    pub fn succs(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].succs
    }

    pub fn preds(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].preds
    }

    /// Statement a node stands for
    pub fn stmt(&self, id: NodeId) -> Option<StmtId> {
        match self.nodes[id].kind {
            NodeKind::Stmt(stmt) => Some(stmt),
            NodeKind::Entry | NodeKind::Exit => None,
        }
    }

    /// Node of a statement
    pub fn node_of(&self, stmt: StmtId) -> Option<NodeId> {
        self.by_stmt.get(&stmt).copied()
    }
}
