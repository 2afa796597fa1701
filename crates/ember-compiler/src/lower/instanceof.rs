//! Lowering of `instanceof`
//!
//! `e instanceof C` becomes a disjunction of inclusive range tests of the
//! slot value of `e` against the typeid ranges of `C` and of every class
//! that extends or implements it. Bounds are biased by one, so a dead or
//! null handle (slot value 0) is never an instance of anything.

use crate::hierarchy::{TypeIdRange, TypeIdTable};
use crate::ir::{
    BinaryOp, Body, ClassId, ExprId, ExprKind, Function, Literal, Program, Span, Type, VarId,
    VarScope, Variable,
};

/// Typeid ranges covering `subclasses`, sorted and merged where they touch
pub fn instanceof_ranges(type_ids: &TypeIdTable, subclasses: &[ClassId]) -> Vec<TypeIdRange> {
    let mut ranges: Vec<TypeIdRange> = subclasses.iter().map(|c| type_ids.range(*c)).collect();
    ranges.sort();
    let mut merged: Vec<TypeIdRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end + 1 => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

/// Rewrite the `InstanceOf` node `id` in place.
///
/// When the object is not a bare variable read, or more than
/// `cache_threshold` ranges are tested, its slot value is bound once to a
/// fresh temporary with `let`.
pub fn lower_instanceof(
    program: &mut Program,
    func: &mut Function,
    slot: VarId,
    id: ExprId,
    object: ExprId,
    ranges: &[TypeIdRange],
    cache_threshold: usize,
) {
    let span = func.body.expr(id).span.clone();
    let bare_var = match func.body.expr(object).kind {
        ExprKind::VarRead(var) => Some(var),
        _ => None,
    };

    match bare_var {
        Some(var) if ranges.len() <= cache_threshold => {
            let body = &mut func.body;
            let test = range_tests(body, ranges, &span, |body| {
                let index = body.add_expr_spanned(ExprKind::VarRead(var), Type::Int, span.clone());
                body.add_expr_spanned(ExprKind::ArrayRead { array: slot, index }, Type::Int, span.clone())
            });
            let kind = body.expr(test).kind.clone();
            body.replace_expr(id, kind, Type::Bool);
        }
        _ => {
            let mut temp = Variable::new("tid", Type::Int, VarScope::Local);
            temp.span = span.clone();
            let temp = program.add_var(temp);
            func.locals.push(temp);

            let body = &mut func.body;
            let init = body.add_expr_spanned(
                ExprKind::ArrayRead {
                    array: slot,
                    index: object,
                },
                Type::Int,
                span.clone(),
            );
            let test = range_tests(body, ranges, &span, |body| {
                body.add_expr_spanned(ExprKind::VarRead(temp), Type::Int, span.clone())
            });
            body.replace_expr(
                id,
                ExprKind::Let {
                    var: temp,
                    init,
                    body: test,
                },
                Type::Bool,
            );
        }
    }
}

/// `t0 or t1 or ...` where each `ti` tests one range against a fresh
/// occurrence of the slot value
fn range_tests(
    body: &mut Body,
    ranges: &[TypeIdRange],
    span: &Span,
    mut value: impl FnMut(&mut Body) -> ExprId,
) -> ExprId {
    let mut acc: Option<ExprId> = None;
    for range in ranges {
        let test = if range.is_point() {
            let v = value(body);
            let bound = bound(body, range.start, span);
            binary(body, BinaryOp::Eq, v, bound, span)
        } else {
            let v = value(body);
            let low = bound(body, range.start, span);
            let above = binary(body, BinaryOp::Ge, v, low, span);
            let v = value(body);
            let high = bound(body, range.end, span);
            let below = binary(body, BinaryOp::Le, v, high, span);
            binary(body, BinaryOp::And, above, below, span)
        };
        acc = Some(match acc {
            Some(prev) => binary(body, BinaryOp::Or, prev, test, span),
            None => test,
        });
    }
    match acc {
        Some(test) => test,
        None => body.add_expr_spanned(ExprKind::Literal(Literal::Bool(false)), Type::Bool, span.clone()),
    }
}

/// Biased typeid literal
fn bound(body: &mut Body, typeid: u32, span: &Span) -> ExprId {
    body.add_expr_spanned(
        ExprKind::Literal(Literal::Int(typeid as i64 + 1)),
        Type::Int,
        span.clone(),
    )
}

fn binary(body: &mut Body, op: BinaryOp, lhs: ExprId, rhs: ExprId, span: &Span) -> ExprId {
    body.add_expr_spanned(ExprKind::Binary { op, lhs, rhs }, Type::Bool, span.clone())
}
