//! Class Elimination
//!
//! Lowers the object-oriented IR to flat IR: fields become global arrays
//! indexed by object handle, methods become dispatch functions, `new` and
//! `destroy` become calls into the lifetime manager, and every class type
//! becomes `int`. Runs once over the whole program, before any dataflow pass.

mod dispatch;
mod instanceof;
mod pool;

pub use dispatch::{gen_dispatch, method_group, resolve_dispatch, DispatchEntry};
pub use instanceof::{instanceof_ranges, lower_instanceof};
pub use pool::{LifetimeFunctions, LifetimeManager, SlotPool};

use crate::config::LowerConfig;
use crate::error::{CompileError, CompileResult};
use crate::hierarchy::{assign_type_ids, Hierarchy, TypeIdTable};
use crate::ir::{
    BinaryOp, ClassId, ExprKind, FieldRef, Function, FunctionId, Literal, MethodId, Program,
    StmtKind, Type, VarId,
};
use pool::unique_global_name;
use rustc_hash::FxHashMap;

/// Everything the rewrite of one function body needs to know about the
/// program's classes
#[derive(Debug)]
pub struct EliminationContext {
    /// Typeid assignment
    pub type_ids: TypeIdTable,
    /// Reflexive-transitive subclasses per class
    pub subclasses: Vec<Vec<ClassId>>,
    /// Global array backing each field
    pub field_pools: FxHashMap<FieldRef, VarId>,
    /// Dispatch function generated per referenced method
    pub dispatch: FxHashMap<MethodId, FunctionId>,
    /// Allocation and deallocation functions
    pub lifetime: LifetimeFunctions,
    /// Global array mapping handle to typeid + 1
    pub slot: VarId,
    /// Instanceof tests with more ranges than this cache the slot value
    pub instanceof_cache_threshold: usize,
}

impl EliminationContext {
    /// Dispatch function for a method, generated on first use
    fn dispatch_for(&mut self, program: &mut Program, method: MethodId) -> CompileResult<FunctionId> {
        if let Some(func) = self.dispatch.get(&method) {
            return Ok(*func);
        }
        let owner = program.method(method).owner;
        let entries = resolve_dispatch(
            program,
            &self.type_ids,
            &self.subclasses[owner.index()],
            method,
        )?;
        let func = gen_dispatch(program, self.slot, method, &entries);
        self.dispatch.insert(method, func);
        Ok(func)
    }
}

/// Statistics about one elimination run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EliminationStats {
    pub classes: usize,
    pub field_pools: usize,
    pub dispatch_functions: usize,
    pub method_calls: usize,
    pub member_accesses: usize,
    pub instanceof_tests: usize,
}

/// Class eliminator
pub struct ClassEliminator<M: LifetimeManager = SlotPool> {
    config: LowerConfig,
    lifetime: M,
}

impl ClassEliminator<SlotPool> {
    /// Create a new eliminator using the default slot pool
    pub fn new(config: LowerConfig) -> Self {
        Self {
            config,
            lifetime: SlotPool::new(),
        }
    }
}

impl<M: LifetimeManager> ClassEliminator<M> {
    /// Create an eliminator with a custom lifetime manager
    pub fn with_lifetime_manager(config: LowerConfig, lifetime: M) -> Self {
        Self { config, lifetime }
    }

    /// Eliminate all classes from the program
    pub fn eliminate(&mut self, program: &mut Program) -> CompileResult<EliminationStats> {
        let type_ids = assign_type_ids(program)?;
        let subclasses = {
            let hierarchy = Hierarchy::new(program)?;
            (0..program.classes.len())
                .map(|i| hierarchy.subclasses(ClassId::new(i as u32)))
                .collect::<Vec<_>>()
        };
        let mut stats = EliminationStats {
            classes: program.classes.len(),
            ..Default::default()
        };
        // Functions existing now are the only ones that can mention classes
        let original_functions = program.functions.len();

        let slot_name = unique_global_name(program, &self.config.typeid_slot_name);
        let slot = program.add_global(slot_name, Type::array_of(Type::Int));

        let mut field_pools = FxHashMap::default();
        for i in 0..program.classes.len() {
            let class = ClassId::new(i as u32);
            let fields: Vec<(String, Type)> = program.classes[i]
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.ty.erase_classes()))
                .collect();
            let class_name = program.classes[i].name.clone();
            for (index, (name, ty)) in fields.into_iter().enumerate() {
                let pool_name = unique_global_name(program, &format!("{}_{}", class_name, name));
                let pool = program.add_global(pool_name, Type::array_of(ty));
                field_pools.insert(FieldRef::new(class, index as u32), pool);
            }
        }
        stats.field_pools = field_pools.len();

        let lifetime = self.lifetime.install(program, slot, &type_ids)?;

        let mut ctx = EliminationContext {
            type_ids,
            subclasses,
            field_pools,
            dispatch: FxHashMap::default(),
            lifetime,
            slot,
            instanceof_cache_threshold: self.config.instanceof_cache_threshold,
        };

        for i in 0..original_functions {
            let placeholder = Function::new(String::new(), Type::Void);
            let mut func = std::mem::replace(&mut program.functions[i], placeholder);
            let result = rewrite_function(program, &mut ctx, &mut func, &mut stats);
            program.functions[i] = func;
            result?;
        }
        stats.dispatch_functions = ctx.dispatch.len();

        erase_class_types(program);
        program.classes.clear();
        program.methods.clear();
        program.assert_flat()?;

        log::info!(
            "eliminated {} classes: {} field pools, {} dispatch functions, {} method calls rewritten",
            stats.classes,
            stats.field_pools,
            stats.dispatch_functions,
            stats.method_calls
        );
        Ok(stats)
    }
}

fn rewrite_function(
    program: &mut Program,
    ctx: &mut EliminationContext,
    func: &mut Function,
    stats: &mut EliminationStats,
) -> CompileResult<()> {
    log::debug!("eliminating classes in {}", func.name);

    for stmt_id in func.body.walk_stmts() {
        let stmt = func.body.stmt(stmt_id).clone();
        match stmt.kind {
            StmtKind::MemberAssign {
                receiver,
                field,
                value,
            } => {
                let pool = field_pool(ctx, field, &stmt.span)?;
                func.body.replace_stmt(
                    stmt_id,
                    StmtKind::ArrayAssign {
                        array: pool,
                        index: receiver,
                        value,
                    },
                );
                stats.member_accesses += 1;
            }
            StmtKind::Dealloc { class, object } => {
                let Some(dealloc) = ctx.lifetime.dealloc(class) else {
                    return Err(CompileError::not_implemented(
                        format!("no deallocation function for {}", class),
                        &stmt.span,
                    ));
                };
                let call = func.body.add_expr_spanned(
                    ExprKind::Call {
                        func: dealloc,
                        args: vec![object],
                    },
                    Type::Void,
                    stmt.span.clone(),
                );
                func.body.replace_stmt(stmt_id, StmtKind::Expr(call));
            }
            _ => {}
        }
    }

    for expr_id in func.body.all_exprs() {
        let expr = func.body.expr(expr_id).clone();
        let ty = expr.ty.erase_classes();
        match expr.kind {
            ExprKind::MethodCall {
                method,
                receiver,
                args,
            } => {
                if method.index() >= program.methods.len() {
                    return Err(CompileError::not_implemented(
                        format!("call of unknown {}", method),
                        &expr.span,
                    ));
                }
                let dispatch = ctx.dispatch_for(program, method)?;
                let mut call_args = Vec::with_capacity(args.len() + 1);
                call_args.push(receiver);
                call_args.extend(args);
                func.body.replace_expr(
                    expr_id,
                    ExprKind::Call {
                        func: dispatch,
                        args: call_args,
                    },
                    ty,
                );
                stats.method_calls += 1;
            }
            ExprKind::MemberRead { receiver, field } => {
                let pool = field_pool(ctx, field, &expr.span)?;
                func.body.replace_expr(
                    expr_id,
                    ExprKind::ArrayRead {
                        array: pool,
                        index: receiver,
                    },
                    ty,
                );
                stats.member_accesses += 1;
            }
            ExprKind::Alloc(class) => {
                let Some(alloc) = ctx.lifetime.alloc(class) else {
                    let what = match program.classes.get(class.index()) {
                        Some(c) if c.is_abstract => {
                            return Err(CompileError::structural(
                                format!("cannot instantiate abstract class {}", c.name),
                                &expr.span,
                            ))
                        }
                        Some(c) => format!("no allocation function for {}", c.name),
                        None => format!("allocation of unknown {}", class),
                    };
                    return Err(CompileError::not_implemented(what, &expr.span));
                };
                func.body.replace_expr(
                    expr_id,
                    ExprKind::Call {
                        func: alloc,
                        args: Vec::new(),
                    },
                    Type::Int,
                );
            }
            ExprKind::InstanceOf { object, class } => {
                let Some(subclasses) = ctx.subclasses.get(class.index()) else {
                    return Err(CompileError::not_implemented(
                        format!("instanceof unknown {}", class),
                        &expr.span,
                    ));
                };
                let ranges = instanceof_ranges(&ctx.type_ids, subclasses);
                lower_instanceof(
                    program,
                    func,
                    ctx.slot,
                    expr_id,
                    object,
                    &ranges,
                    ctx.instanceof_cache_threshold,
                );
                stats.instanceof_tests += 1;
            }
            ExprKind::TypeIdOfClass(class) => {
                if class.index() >= ctx.subclasses.len() {
                    return Err(CompileError::not_implemented(
                        format!("typeid of unknown {}", class),
                        &expr.span,
                    ));
                }
                let typeid = ctx.type_ids.typeid(class) as i64;
                func.body
                    .replace_expr(expr_id, ExprKind::Literal(Literal::Int(typeid)), Type::Int);
            }
            ExprKind::TypeIdOfObject(object) => {
                let slot_value = func.body.add_expr_spanned(
                    ExprKind::ArrayRead {
                        array: ctx.slot,
                        index: object,
                    },
                    Type::Int,
                    expr.span.clone(),
                );
                let bias = func.body.add_expr_spanned(
                    ExprKind::Literal(Literal::Int(1)),
                    Type::Int,
                    expr.span.clone(),
                );
                func.body.replace_expr(
                    expr_id,
                    ExprKind::Binary {
                        op: BinaryOp::Sub,
                        lhs: slot_value,
                        rhs: bias,
                    },
                    Type::Int,
                );
            }
            _ => {}
        }
    }
    Ok(())
}

fn field_pool(
    ctx: &EliminationContext,
    field: FieldRef,
    span: &crate::ir::Span,
) -> CompileResult<VarId> {
    ctx.field_pools.get(&field).copied().ok_or_else(|| {
        CompileError::not_implemented(
            format!("access to unknown field {} of {}", field.index, field.class),
            span,
        )
    })
}

/// Replace every class type in the program by `int`
fn erase_class_types(program: &mut Program) {
    for var in &mut program.vars {
        var.ty = var.ty.erase_classes();
    }
    for func in &mut program.functions {
        func.return_ty = func.return_ty.erase_classes();
        for id in func.body.all_exprs() {
            let expr = func.body.expr_mut(id);
            expr.ty = expr.ty.erase_classes();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::{Interpreter, Value};
    use crate::ir::ProgramBuilder;

    #[test]
    fn test_fields_become_global_pools() {
        let mut pb = ProgramBuilder::new();
        let point = pb.class("Point");
        let x = pb.field(point, "x", Type::Int);
        let mut f = pb.function("main", Type::Int);
        let p = f.local("p", Type::Class(point));
        let new = f.alloc(point);
        let init = f.assign(p, new);
        f.push(init);
        let read_p = f.read(p);
        let seven = f.int(7);
        let set = f.member_assign(read_p, x, seven);
        f.push(set);
        let read_p = f.read(p);
        let get = f.member_read(read_p, x);
        let ret = f.ret(Some(get));
        f.push(ret);
        f.finish();
        let mut program = pb.finish();

        let stats = ClassEliminator::new(LowerConfig::default())
            .eliminate(&mut program)
            .unwrap();
        assert_eq!(stats.field_pools, 1);
        assert_eq!(stats.member_accesses, 2);
        assert!(program.is_flat());
        assert!(program.verify().is_ok());
        assert!(program.global_id("Point_x").is_some());

        let result = Interpreter::new(&program).call("main", Vec::new()).unwrap();
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn test_typeid_expressions() {
        let mut pb = ProgramBuilder::new();
        let a = pb.class("A");
        let b = pb.class("B");
        pb.extends(b, a);
        let mut f = pb.function("main", Type::Bool);
        let obj = f.local("obj", Type::Class(a));
        let new = f.alloc(b);
        let init = f.assign(obj, new);
        f.push(init);
        let read = f.read(obj);
        let dynamic = f.typeid_of_object(read);
        let fixed = f.typeid_of_class(b);
        let same = f.binary(BinaryOp::Eq, dynamic, fixed);
        let ret = f.ret(Some(same));
        f.push(ret);
        f.finish();
        let mut program = pb.finish();

        ClassEliminator::new(LowerConfig::default())
            .eliminate(&mut program)
            .unwrap();
        let result = Interpreter::new(&program).call("main", Vec::new()).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn test_abstract_allocation_is_rejected() {
        let mut pb = ProgramBuilder::new();
        let a = pb.abstract_class("A");
        let mut f = pb.function("main", Type::Void);
        let new = f.alloc(a);
        let stmt = f.expr_stmt(new);
        f.push(stmt);
        f.finish();
        let mut program = pb.finish();
        let err = ClassEliminator::new(LowerConfig::default())
            .eliminate(&mut program)
            .unwrap_err();
        assert!(matches!(err, CompileError::Structural { .. }));
    }

    #[test]
    fn test_unknown_method_is_not_implemented() {
        let mut pb = ProgramBuilder::new();
        let a = pb.class("A");
        let mut f = pb.function("main", Type::Void);
        let obj = f.local("obj", Type::Class(a));
        let read = f.read(obj);
        let stmt = f.expr_stmt(read);
        f.push(stmt);
        f.finish();
        let mut program = pb.finish();
        // Forge a call to a method id that does not exist
        let body = &mut program.functions[0].body;
        let receiver = body.add_expr(ExprKind::VarRead(obj), Type::Class(a));
        let call = body.add_expr(
            ExprKind::MethodCall {
                method: MethodId(5),
                receiver,
                args: Vec::new(),
            },
            Type::Void,
        );
        body.replace_stmt(stmt, StmtKind::Expr(call));
        let err = ClassEliminator::new(LowerConfig::default())
            .eliminate(&mut program)
            .unwrap_err();
        assert!(matches!(err, CompileError::NotImplemented { .. }));
    }

    #[test]
    fn test_slot_name_collision_is_avoided() {
        let mut pb = ProgramBuilder::new();
        pb.global("typeId", Type::Int);
        pb.class("A");
        let mut program = pb.finish();
        ClassEliminator::new(LowerConfig::default())
            .eliminate(&mut program)
            .unwrap();
        assert!(program.global_id("typeId_1").is_some());
    }

    /// Hands out ever-increasing handles and never reuses or checks them
    #[derive(Default)]
    struct BumpLifetime {
        installs: usize,
    }

    impl LifetimeManager for BumpLifetime {
        fn install(
            &mut self,
            program: &mut Program,
            slot: VarId,
            type_ids: &TypeIdTable,
        ) -> CompileResult<LifetimeFunctions> {
            use crate::ir::BodyBuilder;

            self.installs += 1;
            let top = program.add_global("bump_top", Type::Int);
            let mut functions = LifetimeFunctions::new();
            for i in 0..program.classes.len() {
                let class = ClassId::new(i as u32);
                let name = program.class(class).name.clone();

                let mut f = BodyBuilder::new(program, &format!("bump_alloc_{}", name), Type::Int);
                let read = f.read(top);
                let one = f.int(1);
                let next = f.binary(BinaryOp::Add, read, one);
                let bump = f.assign(top, next);
                f.push(bump);
                let read = f.read(top);
                let tag = f.int(type_ids.typeid(class) as i64 + 1);
                let mark = f.array_assign(slot, read, tag);
                f.push(mark);
                let read = f.read(top);
                let ret = f.ret(Some(read));
                f.push(ret);
                functions.set_alloc(class, f.finish());

                let mut f = BodyBuilder::new(program, &format!("bump_free_{}", name), Type::Void);
                let obj = f.param("obj", Type::Int);
                let read = f.read(obj);
                let zero = f.int(0);
                let clear = f.array_assign(slot, read, zero);
                f.push(clear);
                functions.set_dealloc(class, f.finish());
            }
            Ok(functions)
        }
    }

    #[test]
    fn test_custom_lifetime_manager_is_used() {
        // o = new A; destroy o; destroy o; p = new A; return p
        let mut pb = ProgramBuilder::new();
        let a = pb.class("A");
        let mut f = pb.function("main", Type::Int);
        let o = f.local("o", Type::Class(a));
        let p = f.local("p", Type::Class(a));
        let new = f.alloc(a);
        let init = f.assign(o, new);
        f.push(init);
        for _ in 0..2 {
            let recv = f.read(o);
            let free = f.dealloc(a, recv);
            f.push(free);
        }
        let new = f.alloc(a);
        let init = f.assign(p, new);
        f.push(init);
        let read = f.read(p);
        let ret = f.ret(Some(read));
        f.push(ret);
        f.finish();
        let mut program = pb.finish();

        let mut eliminator =
            ClassEliminator::with_lifetime_manager(LowerConfig::default(), BumpLifetime::default());
        eliminator.eliminate(&mut program).unwrap();
        assert_eq!(eliminator.lifetime.installs, 1);
        assert!(program.is_flat());
        assert!(program.function_id("bump_alloc_A").is_some());
        assert!(program.function_id("alloc_A").is_none());

        // No double-free check and no handle reuse
        let result = Interpreter::new(&program).call("main", Vec::new()).unwrap();
        assert_eq!(result, Value::Int(2));
    }
}
