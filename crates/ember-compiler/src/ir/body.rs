//! IR Bodies
//!
//! A function body is an arena of expression and statement nodes addressed by
//! `ExprId`/`StmtId`, plus the top-level statement list. Every node records
//! its owner in an index-based parent map, so a pass can replace a node by
//! rewriting one slot in place without walking back up from the root.
//!
//! Nodes are never freed. Detached subtrees simply become unreachable from
//! the root and are ignored by every traversal.

use super::node::{Expr, ExprId, ExprKind, Stmt, StmtId, StmtKind};
use super::program::VarId;
use super::span::Span;
use super::types::{Literal, Type};
use serde::{Deserialize, Serialize};

/// The owner of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parent {
    /// Top-level statement list
    Root,
    Stmt(StmtId),
    Expr(ExprId),
}

/// Arena of IR nodes for one function
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    exprs: Vec<Expr>,
    #[serde(default)]
    stmts: Vec<Stmt>,
    #[serde(default)]
    block: Vec<StmtId>,
    #[serde(skip)]
    expr_parents: Vec<Option<Parent>>,
    #[serde(skip)]
    stmt_parents: Vec<Option<Parent>>,
}

impl PartialEq for Body {
    fn eq(&self, other: &Self) -> bool {
        self.exprs == other.exprs && self.stmts == other.stmts && self.block == other.block
    }
}

impl Body {
    /// Create an empty body
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Add an expression node; its children become owned by it
    pub fn add_expr(&mut self, kind: ExprKind, ty: Type) -> ExprId {
        self.add_expr_spanned(kind, ty, Span::default())
    }

    pub fn add_expr_spanned(&mut self, kind: ExprKind, ty: Type, span: Span) -> ExprId {
        let id = ExprId::new(self.exprs.len() as u32);
        for child in kind.children() {
            self.set_expr_parent(child, Some(Parent::Expr(id)));
        }
        self.exprs.push(Expr { kind, ty, span });
        self.expr_parents.push(None);
        id
    }

    /// Add a statement node; its expressions and nested statements become owned by it
    pub fn add_stmt(&mut self, kind: StmtKind) -> StmtId {
        self.add_stmt_spanned(kind, Span::default())
    }

    pub fn add_stmt_spanned(&mut self, kind: StmtKind, span: Span) -> StmtId {
        let id = StmtId::new(self.stmts.len() as u32);
        self.adopt_stmt_children(id, &kind);
        self.stmts.push(Stmt { kind, span });
        self.stmt_parents.push(None);
        id
    }

    /// Literal expression
    pub fn literal(&mut self, lit: Literal) -> ExprId {
        let ty = lit.ty();
        self.add_expr(ExprKind::Literal(lit), ty)
    }

    /// Unattached assignment statement
    pub fn assign(&mut self, target: VarId, value: ExprId) -> StmtId {
        self.add_stmt(StmtKind::Assign { target, value })
    }

    /// Append a statement to the top-level list
    pub fn push(&mut self, stmt: StmtId) {
        self.set_stmt_parent(stmt, Some(Parent::Root));
        self.block.push(stmt);
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Top-level statements
    pub fn root(&self) -> &[StmtId] {
        &self.block
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// Mutable access to an expression node.
    ///
    /// Changing the node's children through this reference desynchronizes the
    /// parent map; use [`Body::replace_expr`] for that.
    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn expr_parent(&self, id: ExprId) -> Option<Parent> {
        self.expr_parents.get(id.index()).copied().flatten()
    }

    pub fn stmt_parent(&self, id: StmtId) -> Option<Parent> {
        self.stmt_parents.get(id.index()).copied().flatten()
    }

    /// Number of expression slots in the arena (reachable or not)
    pub fn expr_capacity(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Rewrite an expression slot in place.
    ///
    /// Old children that were already adopted by another node keep their new
    /// owner; the rest are detached.
    pub fn replace_expr(&mut self, id: ExprId, kind: ExprKind, ty: Type) {
        let new_children = kind.children();
        for old in self.exprs[id.index()].kind.children() {
            if !new_children.contains(&old) && self.expr_parent(old) == Some(Parent::Expr(id)) {
                self.set_expr_parent(old, None);
            }
        }
        for child in new_children {
            self.set_expr_parent(child, Some(Parent::Expr(id)));
        }
        let expr = &mut self.exprs[id.index()];
        expr.kind = kind;
        expr.ty = ty;
    }

    /// Rewrite a statement slot in place
    pub fn replace_stmt(&mut self, id: StmtId, kind: StmtKind) {
        let old = self.stmts[id.index()].kind.clone();
        let new_exprs = kind.exprs();
        for e in old.exprs() {
            if !new_exprs.contains(&e) && self.expr_parent(e) == Some(Parent::Stmt(id)) {
                self.set_expr_parent(e, None);
            }
        }
        let new_stmts: Vec<StmtId> = kind.blocks().into_iter().flatten().copied().collect();
        for block in old.blocks() {
            for s in block {
                if !new_stmts.contains(s) && self.stmt_parent(*s) == Some(Parent::Stmt(id)) {
                    self.set_stmt_parent(*s, None);
                }
            }
        }
        self.adopt_stmt_children(id, &kind);
        self.stmts[id.index()].kind = kind;
    }

    /// Detach a statement from whatever list holds it
    pub fn remove_stmt(&mut self, id: StmtId) -> bool {
        let removed = match self.stmt_parent(id) {
            Some(Parent::Root) => remove_from(&mut self.block, id),
            Some(Parent::Stmt(owner)) => self.stmts[owner.index()]
                .kind
                .blocks_mut()
                .into_iter()
                .any(|block| remove_from(block, id)),
            _ => false,
        };
        if removed {
            self.set_stmt_parent(id, None);
        }
        removed
    }

    /// Rename variable references in every reachable node.
    ///
    /// Covers reads, assignment targets, array bases and `let` binders.
    pub fn map_vars(&mut self, mut f: impl FnMut(VarId) -> VarId) {
        for stmt_id in self.walk_stmts() {
            match &mut self.stmts[stmt_id.index()].kind {
                StmtKind::Assign { target, .. } => *target = f(*target),
                StmtKind::ArrayAssign { array, .. } => *array = f(*array),
                _ => {}
            }
            for root in self.stmts[stmt_id.index()].kind.exprs() {
                for expr_id in self.sub_exprs(root) {
                    match &mut self.exprs[expr_id.index()].kind {
                        ExprKind::VarRead(v) => *v = f(*v),
                        ExprKind::ArrayRead { array, .. } => *array = f(*array),
                        ExprKind::Let { var, .. } => *var = f(*var),
                        _ => {}
                    }
                }
            }
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Reachable statements in pre-order
    pub fn walk_stmts(&self) -> Vec<StmtId> {
        let mut out = Vec::new();
        let mut stack: Vec<StmtId> = self.block.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            let blocks = self.stmts[id.index()].kind.blocks();
            for block in blocks.into_iter().rev() {
                stack.extend(block.iter().rev().copied());
            }
        }
        out
    }

    /// Expressions under `root` (inclusive) in pre-order
    pub fn sub_exprs(&self, root: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.exprs[id.index()].kind.children().into_iter().rev());
        }
        out
    }

    /// Every reachable expression
    pub fn all_exprs(&self) -> Vec<ExprId> {
        self.walk_stmts()
            .into_iter()
            .flat_map(|s| self.stmts[s.index()].kind.exprs())
            .flat_map(|root| self.sub_exprs(root))
            .collect()
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Recompute the parent map from the reachable tree
    pub fn rebuild_parents(&mut self) {
        self.expr_parents = vec![None; self.exprs.len()];
        self.stmt_parents = vec![None; self.stmts.len()];
        for stmt in self.block.clone() {
            self.set_stmt_parent(stmt, Some(Parent::Root));
        }
        for stmt_id in self.walk_stmts() {
            let kind = self.stmts[stmt_id.index()].kind.clone();
            self.adopt_stmt_children(stmt_id, &kind);
            for root in kind.exprs() {
                for expr_id in self.sub_exprs(root) {
                    for child in self.exprs[expr_id.index()].kind.children() {
                        self.set_expr_parent(child, Some(Parent::Expr(expr_id)));
                    }
                }
            }
        }
    }

    /// Check the single-owner invariant: every reachable node is reached
    /// exactly once and its recorded parent is the node that reached it
    pub fn verify(&self) -> Result<(), String> {
        if self.expr_parents.len() != self.exprs.len() || self.stmt_parents.len() != self.stmts.len()
        {
            return Err("parent map out of sync with arena".to_string());
        }
        let mut seen_stmts = vec![false; self.stmts.len()];
        let mut seen_exprs = vec![false; self.exprs.len()];
        let mut stack: Vec<(StmtId, Parent)> =
            self.block.iter().map(|s| (*s, Parent::Root)).collect();

        while let Some((id, parent)) = stack.pop() {
            if id.index() >= self.stmts.len() {
                return Err(format!("dangling statement {}", id));
            }
            if std::mem::replace(&mut seen_stmts[id.index()], true) {
                return Err(format!("statement {} is shared or cyclic", id));
            }
            if self.stmt_parent(id) != Some(parent) {
                return Err(format!("statement {} has a stale parent", id));
            }
            let kind = &self.stmts[id.index()].kind;
            for block in kind.blocks() {
                stack.extend(block.iter().map(|s| (*s, Parent::Stmt(id))));
            }
            let mut expr_stack: Vec<(ExprId, Parent)> =
                kind.exprs().into_iter().map(|e| (e, Parent::Stmt(id))).collect();
            while let Some((e, owner)) = expr_stack.pop() {
                if e.index() >= self.exprs.len() {
                    return Err(format!("dangling expression {}", e));
                }
                if std::mem::replace(&mut seen_exprs[e.index()], true) {
                    return Err(format!("expression {} is shared or cyclic", e));
                }
                if self.expr_parent(e) != Some(owner) {
                    return Err(format!("expression {} has a stale parent", e));
                }
                expr_stack.extend(
                    self.exprs[e.index()]
                        .kind
                        .children()
                        .into_iter()
                        .map(|c| (c, Parent::Expr(e))),
                );
            }
        }
        Ok(())
    }

    fn adopt_stmt_children(&mut self, id: StmtId, kind: &StmtKind) {
        for e in kind.exprs() {
            self.set_expr_parent(e, Some(Parent::Stmt(id)));
        }
        for block in kind.blocks() {
            for s in block {
                self.set_stmt_parent(*s, Some(Parent::Stmt(id)));
            }
        }
    }

    fn set_expr_parent(&mut self, id: ExprId, parent: Option<Parent>) {
        if let Some(slot) = self.expr_parents.get_mut(id.index()) {
            *slot = parent;
        }
    }

    fn set_stmt_parent(&mut self, id: StmtId, parent: Option<Parent>) {
        if let Some(slot) = self.stmt_parents.get_mut(id.index()) {
            *slot = parent;
        }
    }
}

fn remove_from(block: &mut Vec<StmtId>, id: StmtId) -> bool {
    match block.iter().position(|s| *s == id) {
        Some(pos) => {
            block.remove(pos);
            true
        }
        None => false,
    }
}
