//! IR Builder
//!
//! In-memory construction of OO programs, used by frontends and tests.
//! `ProgramBuilder` owns the program being built; `BodyBuilder` fills in one
//! function body and infers expression types from the variable table.

use super::body::Body;
use super::node::{BinaryOp, ExprId, ExprKind, StmtId, StmtKind, UnaryOp};
use super::program::{
    Class, ClassId, Field, FieldRef, Function, FunctionId, Method, MethodId, Program, VarId,
    VarScope, Variable,
};
use super::span::Span;
use super::types::{Literal, Type};

/// Builder for a whole program
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    /// Create a new program builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a global variable
    pub fn global(&mut self, name: &str, ty: Type) -> VarId {
        self.program.add_global(name, ty)
    }

    /// Declare a concrete class
    pub fn class(&mut self, name: &str) -> ClassId {
        self.program.add_class(Class::new(name))
    }

    /// Declare an abstract class
    pub fn abstract_class(&mut self, name: &str) -> ClassId {
        let mut class = Class::new(name);
        class.is_abstract = true;
        self.program.add_class(class)
    }

    pub fn extends(&mut self, class: ClassId, superclass: ClassId) {
        self.program.classes[class.index()].extends = Some(superclass);
    }

    pub fn implements(&mut self, class: ClassId, superclass: ClassId) {
        self.program.classes[class.index()].implements.push(superclass);
    }

    /// Declare a field on a class
    pub fn field(&mut self, class: ClassId, name: &str, ty: Type) -> FieldRef {
        let fields = &mut self.program.classes[class.index()].fields;
        fields.push(Field {
            name: name.to_string(),
            ty,
        });
        FieldRef::new(class, (fields.len() - 1) as u32)
    }

    /// Declare a method; it is abstract when it has no implementation
    pub fn method(
        &mut self,
        class: ClassId,
        name: &str,
        params: Vec<Type>,
        return_ty: Type,
        implementation: Option<FunctionId>,
    ) -> MethodId {
        self.program.add_method(Method {
            name: name.to_string(),
            owner: class,
            params,
            return_ty,
            is_abstract: implementation.is_none(),
            implementation,
            submethods: Vec::new(),
            span: Span::default(),
        })
    }

    /// Declare an override of `base` in `class`
    pub fn override_method(
        &mut self,
        base: MethodId,
        class: ClassId,
        implementation: Option<FunctionId>,
    ) -> MethodId {
        let template = self.program.method(base).clone();
        let id = self.method(
            class,
            &template.name,
            template.params,
            template.return_ty,
            implementation,
        );
        self.program.methods[base.index()].submethods.push(id);
        id
    }

    /// Declare a function provided by the target runtime
    pub fn native(&mut self, name: &str, params: Vec<Type>, return_ty: Type) -> FunctionId {
        let mut func = Function::new(name, return_ty);
        func.native = true;
        for (i, ty) in params.into_iter().enumerate() {
            let var = self
                .program
                .add_var(Variable::new(format!("p{}", i), ty, VarScope::Param));
            func.params.push(var);
        }
        self.program.add_function(func)
    }

    /// Start building a function. The id is reserved up front so the body
    /// can call the function recursively.
    pub fn function(&mut self, name: &str, return_ty: Type) -> BodyBuilder<'_> {
        BodyBuilder::new(&mut self.program, name, return_ty)
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn finish(self) -> Program {
        self.program
    }
}

/// Builder for one function body
pub struct BodyBuilder<'p> {
    program: &'p mut Program,
    id: FunctionId,
    func: Function,
    span: Span,
}

impl<'p> BodyBuilder<'p> {
    /// Start a function directly on a program, reserving its id
    pub fn new(program: &'p mut Program, name: &str, return_ty: Type) -> Self {
        let id = program.add_function(Function::new(name, return_ty.clone()));
        Self {
            program,
            id,
            func: Function::new(name, return_ty),
            span: Span::default(),
        }
    }

    /// The id this function will have
    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// Source position attached to nodes created from now on
    pub fn set_span(&mut self, span: Span) {
        if self.func.body.is_empty() && !self.func.span.is_known() {
            self.func.span = span.clone();
        }
        self.span = span;
    }

    pub fn param(&mut self, name: &str, ty: Type) -> VarId {
        let var = self.new_var(name, ty, VarScope::Param);
        self.func.params.push(var);
        var
    }

    pub fn local(&mut self, name: &str, ty: Type) -> VarId {
        let var = self.new_var(name, ty, VarScope::Local);
        self.func.locals.push(var);
        var
    }

    fn new_var(&mut self, name: &str, ty: Type, scope: VarScope) -> VarId {
        let mut var = Variable::new(name, ty, scope);
        var.span = self.span.clone();
        self.program.add_var(var)
    }

    fn body(&mut self) -> &mut Body {
        &mut self.func.body
    }

    fn expr(&mut self, kind: ExprKind, ty: Type) -> ExprId {
        let span = self.span.clone();
        self.func.body.add_expr_spanned(kind, ty, span)
    }

    fn stmt(&mut self, kind: StmtKind) -> StmtId {
        let span = self.span.clone();
        self.func.body.add_stmt_spanned(kind, span)
    }

    fn type_of(&self, expr: ExprId) -> Type {
        self.func.body.expr(expr).ty.clone()
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub fn literal(&mut self, lit: Literal) -> ExprId {
        let ty = lit.ty();
        self.expr(ExprKind::Literal(lit), ty)
    }

    pub fn int(&mut self, value: i64) -> ExprId {
        self.literal(Literal::Int(value))
    }

    pub fn real(&mut self, value: f64) -> ExprId {
        self.literal(Literal::Real(value))
    }

    pub fn bool(&mut self, value: bool) -> ExprId {
        self.literal(Literal::Bool(value))
    }

    pub fn string(&mut self, value: &str) -> ExprId {
        self.literal(Literal::Str(value.to_string()))
    }

    /// Null handle of the given class type
    pub fn null(&mut self, ty: Type) -> ExprId {
        self.expr(ExprKind::Literal(Literal::Null), ty)
    }

    pub fn read(&mut self, var: VarId) -> ExprId {
        let ty = self.program.var(var).ty.clone();
        self.expr(ExprKind::VarRead(var), ty)
    }

    pub fn array_read(&mut self, array: VarId, index: ExprId) -> ExprId {
        let ty = self
            .program
            .var(array)
            .ty
            .element()
            .cloned()
            .unwrap_or(Type::Int);
        self.expr(ExprKind::ArrayRead { array, index }, ty)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        let ty = if op.is_comparison() || op.is_short_circuit() {
            Type::Bool
        } else {
            self.type_of(lhs)
        };
        self.expr(ExprKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        let ty = match op {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg => self.type_of(operand),
        };
        self.expr(ExprKind::Unary { op, operand }, ty)
    }

    pub fn call(&mut self, func: FunctionId, args: Vec<ExprId>) -> ExprId {
        let ty = self.program.function(func).return_ty.clone();
        self.expr(ExprKind::Call { func, args }, ty)
    }

    pub fn method_call(&mut self, method: MethodId, receiver: ExprId, args: Vec<ExprId>) -> ExprId {
        let ty = self.program.method(method).return_ty.clone();
        self.expr(
            ExprKind::MethodCall {
                method,
                receiver,
                args,
            },
            ty,
        )
    }

    pub fn member_read(&mut self, receiver: ExprId, field: FieldRef) -> ExprId {
        let ty = self.program.class(field.class).fields[field.index as usize]
            .ty
            .clone();
        self.expr(ExprKind::MemberRead { receiver, field }, ty)
    }

    pub fn alloc(&mut self, class: ClassId) -> ExprId {
        self.expr(ExprKind::Alloc(class), Type::Class(class))
    }

    pub fn instance_of(&mut self, object: ExprId, class: ClassId) -> ExprId {
        self.expr(ExprKind::InstanceOf { object, class }, Type::Bool)
    }

    pub fn typeid_of_class(&mut self, class: ClassId) -> ExprId {
        self.expr(ExprKind::TypeIdOfClass(class), Type::Int)
    }

    pub fn typeid_of_object(&mut self, object: ExprId) -> ExprId {
        self.expr(ExprKind::TypeIdOfObject(object), Type::Int)
    }

    pub fn let_in(&mut self, var: VarId, init: ExprId, body: ExprId) -> ExprId {
        let ty = self.type_of(body);
        self.expr(ExprKind::Let { var, init, body }, ty)
    }

    // ========================================================================
    // Statements (unattached until pushed or nested)
    // ========================================================================

    pub fn assign(&mut self, target: VarId, value: ExprId) -> StmtId {
        self.stmt(StmtKind::Assign { target, value })
    }

    pub fn array_assign(&mut self, array: VarId, index: ExprId, value: ExprId) -> StmtId {
        self.stmt(StmtKind::ArrayAssign {
            array,
            index,
            value,
        })
    }

    pub fn member_assign(&mut self, receiver: ExprId, field: FieldRef, value: ExprId) -> StmtId {
        self.stmt(StmtKind::MemberAssign {
            receiver,
            field,
            value,
        })
    }

    pub fn if_else(
        &mut self,
        cond: ExprId,
        then_block: Vec<StmtId>,
        else_block: Vec<StmtId>,
    ) -> StmtId {
        self.stmt(StmtKind::If {
            cond,
            then_block,
            else_block,
        })
    }

    pub fn loop_(&mut self, body: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::Loop { body })
    }

    pub fn exit_when(&mut self, cond: ExprId) -> StmtId {
        self.stmt(StmtKind::ExitWhen { cond })
    }

    pub fn ret(&mut self, value: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::Return { value })
    }

    pub fn expr_stmt(&mut self, expr: ExprId) -> StmtId {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn dealloc(&mut self, class: ClassId, object: ExprId) -> StmtId {
        self.stmt(StmtKind::Dealloc { class, object })
    }

    pub fn trap(&mut self, message: &str) -> StmtId {
        self.stmt(StmtKind::Trap {
            message: message.to_string(),
        })
    }

    /// Append a statement to the top-level list
    pub fn push(&mut self, stmt: StmtId) {
        self.body().push(stmt);
    }

    /// Install the function into the program
    pub fn finish(self) -> FunctionId {
        self.program.functions[self.id.index()] = self.func;
        self.id
    }
}
