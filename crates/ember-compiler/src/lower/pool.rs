//! Object lifetime management
//!
//! The eliminator never decides how handles are allocated. It asks a
//! `LifetimeManager` for one `alloc_C` and one `dealloc_C` function per class
//! and only calls those. Whatever the manager does, it must keep the typeid
//! slot in sync: `typeid(C) + 1` while a handle is live, `0` otherwise.

use crate::error::CompileResult;
use crate::hierarchy::TypeIdTable;
use crate::ir::{BinaryOp, BodyBuilder, ClassId, FunctionId, Program, Span, Type, VarId};
use rustc_hash::FxHashMap;

/// Allocation and deallocation entry points per class
#[derive(Debug, Clone, Default)]
pub struct LifetimeFunctions {
    alloc: FxHashMap<ClassId, FunctionId>,
    dealloc: FxHashMap<ClassId, FunctionId>,
}

impl LifetimeFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_alloc(&mut self, class: ClassId, func: FunctionId) {
        self.alloc.insert(class, func);
    }

    pub fn set_dealloc(&mut self, class: ClassId, func: FunctionId) {
        self.dealloc.insert(class, func);
    }

    /// `alloc_C() -> int`
    pub fn alloc(&self, class: ClassId) -> Option<FunctionId> {
        self.alloc.get(&class).copied()
    }

    /// `dealloc_C(int)`
    pub fn dealloc(&self, class: ClassId) -> Option<FunctionId> {
        self.dealloc.get(&class).copied()
    }
}

/// Provider of the per-class lifetime functions
pub trait LifetimeManager {
    /// Generate the lifetime functions into `program`.
    ///
    /// Called once per elimination, while classes are still present.
    /// `slot` is the global typeid array.
    fn install(
        &mut self,
        program: &mut Program,
        slot: VarId,
        type_ids: &TypeIdTable,
    ) -> CompileResult<LifetimeFunctions>;
}

/// Default lifetime manager: one handle space shared by all classes, with a
/// free list threaded through `pool_next` and a high-water mark.
///
/// Handle 0 is never handed out, so it stays the null handle.
#[derive(Debug, Default)]
pub struct SlotPool;

impl SlotPool {
    pub fn new() -> Self {
        Self
    }
}

impl LifetimeManager for SlotPool {
    fn install(
        &mut self,
        program: &mut Program,
        slot: VarId,
        type_ids: &TypeIdTable,
    ) -> CompileResult<LifetimeFunctions> {
        let next = program.add_global(
            unique_global_name(program, "pool_next"),
            Type::array_of(Type::Int),
        );
        let free = program.add_global(unique_global_name(program, "pool_free"), Type::Int);
        let max = program.add_global(unique_global_name(program, "pool_max"), Type::Int);
        let pool = PoolVars {
            slot,
            next,
            free,
            max,
        };

        let mut functions = LifetimeFunctions::new();
        let classes: Vec<(ClassId, String, bool, Span)> = program
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassId::new(i as u32), c.name.clone(), c.is_abstract, c.span.clone()))
            .collect();

        for (class, name, is_abstract, span) in classes {
            if !is_abstract {
                let alloc = gen_alloc(program, &pool, &name, type_ids.typeid(class), &span);
                functions.set_alloc(class, alloc);
            }
            let dealloc = gen_dealloc(program, &pool, &name, &span);
            functions.set_dealloc(class, dealloc);
        }

        log::debug!(
            "slot pool installed lifetime functions for {} classes",
            program.classes.len()
        );
        Ok(functions)
    }
}

struct PoolVars {
    slot: VarId,
    next: VarId,
    free: VarId,
    max: VarId,
}

/// ```text
/// fn alloc_C() -> int {
///   h = pool_free
///   if h == 0 { pool_max = pool_max + 1; h = pool_max }
///   else { pool_free = pool_next[h] }
///   typeId[h] = typeid(C) + 1
///   return h
/// }
/// ```
fn gen_alloc(program: &mut Program, pool: &PoolVars, class: &str, typeid: u32, span: &Span) -> FunctionId {
    let name = unique_function_name(program, &format!("alloc_{}", class));
    let mut f = BodyBuilder::new(program, &name, Type::Int);
    f.set_span(span.clone());
    let h = f.local("h", Type::Int);

    let read_free = f.read(pool.free);
    let take_head = f.assign(h, read_free);
    f.push(take_head);

    let read_h = f.read(h);
    let zero = f.int(0);
    let empty = f.binary(BinaryOp::Eq, read_h, zero);

    let read_max = f.read(pool.max);
    let one = f.int(1);
    let bumped = f.binary(BinaryOp::Add, read_max, one);
    let bump = f.assign(pool.max, bumped);
    let read_max = f.read(pool.max);
    let fresh = f.assign(h, read_max);

    let read_h = f.read(h);
    let link = f.array_read(pool.next, read_h);
    let pop = f.assign(pool.free, link);

    let branch = f.if_else(empty, vec![bump, fresh], vec![pop]);
    f.push(branch);

    let read_h = f.read(h);
    let biased = f.int(typeid as i64 + 1);
    let mark = f.array_assign(pool.slot, read_h, biased);
    f.push(mark);

    let read_h = f.read(h);
    let ret = f.ret(Some(read_h));
    f.push(ret);
    f.finish()
}

/// ```text
/// fn dealloc_C(obj: int) {
///   if obj == 0 { trap "null pointer" }
///   if typeId[obj] == 0 { trap "double free" }
///   typeId[obj] = 0
///   pool_next[obj] = pool_free
///   pool_free = obj
/// }
/// ```
fn gen_dealloc(program: &mut Program, pool: &PoolVars, class: &str, span: &Span) -> FunctionId {
    let name = unique_function_name(program, &format!("dealloc_{}", class));
    let mut f = BodyBuilder::new(program, &name, Type::Void);
    f.set_span(span.clone());
    let obj = f.param("obj", Type::Int);

    let read_obj = f.read(obj);
    let zero = f.int(0);
    let is_null = f.binary(BinaryOp::Eq, read_obj, zero);
    let trap = f.trap(&format!("null pointer when destroying {}", class));
    let check_null = f.if_else(is_null, vec![trap], Vec::new());
    f.push(check_null);

    let read_obj = f.read(obj);
    let tid = f.array_read(pool.slot, read_obj);
    let zero = f.int(0);
    let is_dead = f.binary(BinaryOp::Eq, tid, zero);
    let trap = f.trap(&format!("double free of {}", class));
    let check_dead = f.if_else(is_dead, vec![trap], Vec::new());
    f.push(check_dead);

    let read_obj = f.read(obj);
    let zero = f.int(0);
    let clear = f.array_assign(pool.slot, read_obj, zero);
    f.push(clear);

    let read_obj = f.read(obj);
    let read_free = f.read(pool.free);
    let link = f.array_assign(pool.next, read_obj, read_free);
    f.push(link);

    let read_obj = f.read(obj);
    let push_free = f.assign(pool.free, read_obj);
    f.push(push_free);
    f.finish()
}

/// `base`, or `base_N` for the first N that is not a function name yet
pub(crate) fn unique_function_name(program: &Program, base: &str) -> String {
    unique_name(base, |candidate| program.function_id(candidate).is_some())
}

/// `base`, or `base_N` for the first N that is not a global name yet
pub(crate) fn unique_global_name(program: &Program, base: &str) -> String {
    unique_name(base, |candidate| program.global_id(candidate).is_some())
}

fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}
