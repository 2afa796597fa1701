//! Variable accesses of a CFG node in evaluation order
//!
//! Both dataflow analyses look at a node as a sequence of reads and writes.
//! Operands are evaluated left to right and an assignment's target is written
//! after its value. A `let` inside the right operand of `and`/`or` may not
//! execute at all, so its binding is only a may-definition.

use crate::ir::{BinaryOp, Body, ExprId, ExprKind, StmtId, StmtKind, VarId};

/// One variable access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// A `VarRead` node
    Read { var: VarId, expr: ExprId },
    /// A write that certainly happens
    Def(VarId),
    /// A write that happens on some evaluations only
    MayDef(VarId),
}

/// Accesses performed when control passes through `stmt`'s node.
///
/// For `if` and `loop` only the condition (or nothing) is included; the
/// nested statements have nodes of their own.
pub fn stmt_accesses(body: &Body, stmt: StmtId) -> Vec<Access> {
    let mut out = Vec::new();
    let kind = &body.stmt(stmt).kind;
    for e in kind.exprs() {
        expr_accesses(body, e, false, &mut out);
    }
    if let StmtKind::Assign { target, .. } = kind {
        out.push(Access::Def(*target));
    }
    out
}

fn expr_accesses(body: &Body, expr: ExprId, conditional: bool, out: &mut Vec<Access>) {
    match &body.expr(expr).kind {
        ExprKind::VarRead(var) => out.push(Access::Read { var: *var, expr }),
        ExprKind::Binary { op, lhs, rhs } => {
            expr_accesses(body, *lhs, conditional, out);
            expr_accesses(body, *rhs, conditional || op.is_short_circuit(), out);
        }
        ExprKind::Let { var, init, body: inner } => {
            expr_accesses(body, *init, conditional, out);
            out.push(if conditional {
                Access::MayDef(*var)
            } else {
                Access::Def(*var)
            });
            expr_accesses(body, *inner, conditional, out);
        }
        kind => {
            for child in kind.children() {
                expr_accesses(body, child, conditional, out);
            }
        }
    }
}

/// Whether evaluating `expr` can do more than produce a value: call a
/// function, fail on a division whose divisor is not a known non-zero, or
/// fail on an array index that is not a known non-negative
pub fn has_side_effects(body: &Body, expr: ExprId) -> bool {
    body.sub_exprs(expr)
        .into_iter()
        .any(|e| match &body.expr(e).kind {
            ExprKind::Call { .. } | ExprKind::MethodCall { .. } | ExprKind::Alloc(_) => true,
            ExprKind::Binary {
                op: BinaryOp::Div | BinaryOp::Mod,
                rhs,
                ..
            } => !literal_int_matches(body, *rhs, |v| v != 0),
            ExprKind::ArrayRead { index, .. } => !literal_int_matches(body, *index, |v| v >= 0),
            _ => false,
        })
}

fn literal_int_matches(body: &Body, expr: ExprId, pred: impl Fn(i64) -> bool) -> bool {
    match &body.expr(expr).kind {
        ExprKind::Literal(lit) => lit.as_int().is_some_and(pred),
        _ => false,
    }
}
