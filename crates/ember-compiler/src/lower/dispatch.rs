//! Dispatch function generation
//!
//! A method call site names one method; the callee is decided at runtime
//! among the implementations of that method's group (the method plus all of
//! its transitive submethods). Each group gets one dispatch function that
//! reads the receiver's typeid slot once and binary-searches a sorted list of
//! typeid ranges, each mapped to one implementation.

use super::pool::unique_function_name;
use crate::error::{CompileError, CompileResult};
use crate::hierarchy::{TypeIdRange, TypeIdTable};
use crate::ir::{
    BinaryOp, BodyBuilder, ClassId, FunctionId, MethodId, Program, StmtId, Type, VarId,
};
use rustc_hash::FxHashMap;

/// One arm of a dispatch function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchEntry {
    /// Unbiased typeids handled by this arm
    pub range: TypeIdRange,
    pub implementation: FunctionId,
}

/// The method itself followed by its transitive submethods (pre-order)
pub fn method_group(program: &Program, method: MethodId) -> Vec<MethodId> {
    let mut group = Vec::new();
    let mut stack = vec![method];
    while let Some(m) = stack.pop() {
        if group.contains(&m) {
            continue;
        }
        group.push(m);
        stack.extend(program.method(m).submethods.iter().rev().copied());
    }
    group
}

/// Decide which implementation every concrete subclass of the method's
/// owner runs, sorted by typeid and merged where neighbours agree.
///
/// `subclasses` are the reflexive-transitive subclasses of the owner.
pub fn resolve_dispatch(
    program: &Program,
    type_ids: &TypeIdTable,
    subclasses: &[ClassId],
    method: MethodId,
) -> CompileResult<Vec<DispatchEntry>> {
    let group = method_group(program, method);
    let name = program.method_name(method);
    let span = &program.method(method).span;

    if group
        .iter()
        .all(|m| program.method(*m).implementation.is_none())
    {
        return Err(CompileError::structural(
            format!("method {} has no implementation in any class", name),
            span,
        ));
    }

    let mut overrides: FxHashMap<ClassId, MethodId> = FxHashMap::default();
    for m in &group {
        overrides.entry(program.method(*m).owner).or_insert(*m);
    }

    let mut resolved: Vec<(u32, FunctionId)> = Vec::new();
    for class in subclasses {
        let c = program.class(*class);
        if c.is_abstract {
            continue;
        }
        let Some(implementation) = nearest_implementation(program, &overrides, *class) else {
            return Err(CompileError::structural(
                format!("class {} has no implementation of {}", c.name, name),
                &c.span,
            ));
        };
        resolved.push((type_ids.typeid(*class), implementation));
    }
    resolved.sort_by_key(|(typeid, _)| *typeid);

    let mut entries: Vec<DispatchEntry> = Vec::new();
    for (typeid, implementation) in resolved {
        match entries.last_mut() {
            Some(last) if last.implementation == implementation => last.range.end = typeid,
            _ => entries.push(DispatchEntry {
                range: TypeIdRange::point(typeid),
                implementation,
            }),
        }
    }
    Ok(entries)
}

/// Walk up from `class` (extends first, then implements, depth first) to the
/// first group override that carries an implementation
fn nearest_implementation(
    program: &Program,
    overrides: &FxHashMap<ClassId, MethodId>,
    class: ClassId,
) -> Option<FunctionId> {
    if let Some(m) = overrides.get(&class) {
        if let Some(implementation) = program.method(*m).implementation {
            return Some(implementation);
        }
    }
    program
        .class(class)
        .supers()
        .find_map(|sup| nearest_implementation(program, overrides, sup))
}

/// Generate `dispatch_Class_method(this, p0, ...)`.
///
/// ```text
/// tid = typeId[this]
/// if tid == 0 {
///   if this == 0 { trap "null pointer" } else { trap "destroyed object" }
/// }
/// if tid <= end(mid) + 1 { <low half> } else { <high half> }
/// ```
pub fn gen_dispatch(
    program: &mut Program,
    slot: VarId,
    method: MethodId,
    entries: &[DispatchEntry],
) -> FunctionId {
    let m = program.method(method).clone();
    let qualified = program.method_name(method);
    let owner = program.class(m.owner).name.clone();
    let name = unique_function_name(program, &format!("dispatch_{}_{}", owner, m.name));
    let return_ty = m.return_ty.erase_classes();

    let mut f = BodyBuilder::new(program, &name, return_ty.clone());
    f.set_span(m.span.clone());
    let this = f.param("this", Type::Int);
    let params: Vec<VarId> = m
        .params
        .iter()
        .enumerate()
        .map(|(i, ty)| f.param(&format!("p{}", i), ty.erase_classes()))
        .collect();
    let tid = f.local("tid", Type::Int);

    let read_this = f.read(this);
    let slot_value = f.array_read(slot, read_this);
    let load = f.assign(tid, slot_value);
    f.push(load);

    let read_tid = f.read(tid);
    let zero = f.int(0);
    let dead = f.binary(BinaryOp::Eq, read_tid, zero);
    let read_this = f.read(this);
    let zero = f.int(0);
    let is_null = f.binary(BinaryOp::Eq, read_this, zero);
    let null_trap = f.trap(&format!("null pointer: called {} on null", qualified));
    let destroyed_trap = f.trap(&format!("called {} on a destroyed object", qualified));
    let which = f.if_else(is_null, vec![null_trap], vec![destroyed_trap]);
    let guard = f.if_else(dead, vec![which], Vec::new());
    f.push(guard);

    let search = Search {
        tid,
        this,
        params: &params,
        entries,
        returns_value: return_ty != Type::Void,
    };
    for stmt in search.gen(&mut f, 0, entries.len()) {
        f.push(stmt);
    }

    log::debug!(
        "generated {} with {} arm(s) for {}",
        name,
        entries.len(),
        qualified
    );
    f.finish()
}

struct Search<'a> {
    tid: VarId,
    this: VarId,
    params: &'a [VarId],
    entries: &'a [DispatchEntry],
    returns_value: bool,
}

impl Search<'_> {
    /// Statements selecting among `entries[lo..hi]`
    fn gen(&self, f: &mut BodyBuilder<'_>, lo: usize, hi: usize) -> Vec<StmtId> {
        if lo >= hi {
            return vec![f.trap("no implementation for this object")];
        }
        if hi - lo == 1 {
            return self.leaf(f, self.entries[lo].implementation);
        }
        let mid = lo + (hi - lo - 1) / 2;
        let read_tid = f.read(self.tid);
        let bound = f.int(self.entries[mid].range.end as i64 + 1);
        let cond = f.binary(BinaryOp::Le, read_tid, bound);
        let low = self.gen(f, lo, mid + 1);
        let high = self.gen(f, mid + 1, hi);
        vec![f.if_else(cond, low, high)]
    }

    fn leaf(&self, f: &mut BodyBuilder<'_>, implementation: FunctionId) -> Vec<StmtId> {
        let mut args = vec![f.read(self.this)];
        for p in self.params {
            args.push(f.read(*p));
        }
        let call = f.call(implementation, args);
        if self.returns_value {
            vec![f.ret(Some(call))]
        } else {
            let stmt = f.expr_stmt(call);
            vec![stmt, f.ret(None)]
        }
    }
}
