//! IR Program
//!
//! The whole-program container: classes, methods, functions and the
//! program-wide variable table.

use super::body::Body;
use super::node::{ExprKind, StmtKind};
use super::span::Span;
use super::types::Type;
use crate::error::{CompileError, CompileResult};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Class identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "class{}", self.0)
    }
}

/// Method identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodId(pub u32);

impl MethodId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "method{}", self.0)
    }
}

/// Function identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Variable identifier (index into the program-wide variable table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl VarId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Reference to a field: declaring class plus position in its field list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub class: ClassId,
    pub index: u32,
}

impl FieldRef {
    pub fn new(class: ClassId, index: u32) -> Self {
        Self { class, index }
    }
}

/// Where a variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarScope {
    /// Lives for the whole program run
    Global,
    /// Lives for one activation of its function
    Local,
    /// Function parameter
    Param,
}

/// A variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub scope: VarScope,
    #[serde(default)]
    pub span: Span,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type, scope: VarScope) -> Self {
        Self {
            name: name.into(),
            ty,
            scope,
            span: Span::default(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope == VarScope::Global
    }
}

/// A class field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// A class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub methods: Vec<MethodId>,
    #[serde(default)]
    pub extends: Option<ClassId>,
    #[serde(default)]
    pub implements: Vec<ClassId>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub span: Span,
}

impl Class {
    /// Create a new concrete class with no fields or supers
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            methods: Vec::new(),
            extends: None,
            implements: Vec::new(),
            is_abstract: false,
            span: Span::default(),
        }
    }

    /// Direct superclasses: extends first, then implements
    pub fn supers(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.extends.iter().copied().chain(self.implements.iter().copied())
    }
}

/// A method slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub owner: ClassId,
    /// Parameter types, receiver excluded
    #[serde(default)]
    pub params: Vec<Type>,
    pub return_ty: Type,
    /// Implementing function; receiver is its first parameter
    #[serde(default)]
    pub implementation: Option<FunctionId>,
    #[serde(default)]
    pub is_abstract: bool,
    /// Overrides introduced by subclasses
    #[serde(default)]
    pub submethods: Vec<MethodId>,
    #[serde(default)]
    pub span: Span,
}

/// A function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<VarId>,
    #[serde(default)]
    pub locals: Vec<VarId>,
    pub return_ty: Type,
    #[serde(default)]
    pub body: Body,
    /// Provided by the target runtime; has no body
    #[serde(default)]
    pub native: bool,
    #[serde(default)]
    pub span: Span,
}

impl Function {
    /// Create a new function with an empty body
    pub fn new(name: impl Into<String>, return_ty: Type) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            locals: Vec::new(),
            return_ty,
            body: Body::new(),
            native: false,
            span: Span::default(),
        }
    }

    /// Whether a variable is a parameter or local of this function
    pub fn owns_var(&self, var: VarId) -> bool {
        self.params.contains(&var) || self.locals.contains(&var)
    }
}

/// A whole program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub vars: Vec<Variable>,
    #[serde(default)]
    pub globals: Vec<VarId>,
}

impl Program {
    /// Create an empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a program from its JSON interchange form
    pub fn from_json(text: &str) -> CompileResult<Self> {
        let mut program: Program =
            serde_json::from_str(text).map_err(|e| CompileError::Structural {
                message: format!("invalid program JSON: {}", e),
                span: Span::default(),
            })?;
        for func in &mut program.functions {
            func.body.rebuild_parents();
        }
        Ok(program)
    }

    /// Serialize to the JSON interchange form
    pub fn to_json(&self) -> CompileResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CompileError::Structural {
            message: format!("cannot serialize program: {}", e),
            span: Span::default(),
        })
    }

    pub fn add_class(&mut self, class: Class) -> ClassId {
        let id = ClassId::new(self.classes.len() as u32);
        self.classes.push(class);
        id
    }

    /// Add a method and register it with its owning class
    pub fn add_method(&mut self, method: Method) -> MethodId {
        let id = MethodId::new(self.methods.len() as u32);
        if let Some(owner) = self.classes.get_mut(method.owner.index()) {
            owner.methods.push(id);
        }
        self.methods.push(method);
        id
    }

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId::new(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    /// Add a variable to the table (does not register globals)
    pub fn add_var(&mut self, var: Variable) -> VarId {
        let id = VarId::new(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    /// Add and register a global variable
    pub fn add_global(&mut self, name: impl Into<String>, ty: Type) -> VarId {
        let id = self.add_var(Variable::new(name, ty, VarScope::Global));
        self.globals.push(id);
        id
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn var(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    /// Look up a function by name
    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunctionId::new(i as u32))
    }

    /// Look up a class by name
    pub fn class_id(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| ClassId::new(i as u32))
    }

    /// Look up a global by name
    pub fn global_id(&self, name: &str) -> Option<VarId> {
        self.globals.iter().copied().find(|g| self.var(*g).name == name)
    }

    /// Qualified display name of a method (`Class.method`)
    pub fn method_name(&self, id: MethodId) -> String {
        let method = self.method(id);
        match self.classes.get(method.owner.index()) {
            Some(owner) => format!("{}.{}", owner.name, method.name),
            None => method.name.clone(),
        }
    }

    /// Check every body's ownership and every id reference
    pub fn verify(&self) -> CompileResult<()> {
        for class in &self.classes {
            for sup in class.supers() {
                if sup.index() >= self.classes.len() {
                    return Err(structural(
                        format!("class {} references unknown superclass {}", class.name, sup),
                        &class.span,
                    ));
                }
            }
            for m in &class.methods {
                if m.index() >= self.methods.len() {
                    return Err(structural(
                        format!("class {} references unknown method {}", class.name, m),
                        &class.span,
                    ));
                }
            }
        }
        for method in &self.methods {
            if method.owner.index() >= self.classes.len() {
                return Err(structural(
                    format!("method {} has unknown owner {}", method.name, method.owner),
                    &method.span,
                ));
            }
            if method.is_abstract && method.implementation.is_some() {
                return Err(structural(
                    format!("abstract method {} has an implementation", method.name),
                    &method.span,
                ));
            }
            if let Some(imp) = method.implementation {
                if imp.index() >= self.functions.len() {
                    return Err(structural(
                        format!("method {} implemented by unknown {}", method.name, imp),
                        &method.span,
                    ));
                }
            }
            let mut owners = Vec::new();
            for sub in &method.submethods {
                let Some(sub_method) = self.methods.get(sub.index()) else {
                    return Err(structural(
                        format!("method {} lists unknown submethod {}", method.name, sub),
                        &method.span,
                    ));
                };
                if owners.contains(&sub_method.owner) {
                    return Err(structural(
                        format!(
                            "method {} has two overrides in the same class",
                            method.name
                        ),
                        &method.span,
                    ));
                }
                owners.push(sub_method.owner);
            }
        }
        for global in &self.globals {
            if global.index() >= self.vars.len() || !self.var(*global).is_global() {
                return Err(structural(
                    format!("{} is listed as a global but is not one", global),
                    &Span::default(),
                ));
            }
        }
        for func in &self.functions {
            self.verify_function(func)?;
        }
        Ok(())
    }

    fn verify_function(&self, func: &Function) -> CompileResult<()> {
        func.body
            .verify()
            .map_err(|message| structural(format!("{}: {}", func.name, message), &func.span))?;
        for (vars, scope) in [(&func.params, VarScope::Param), (&func.locals, VarScope::Local)] {
            for v in vars {
                match self.vars.get(v.index()) {
                    Some(var) if var.scope == scope => {}
                    _ => {
                        return Err(structural(
                            format!("{}: {} has the wrong scope", func.name, v),
                            &func.span,
                        ))
                    }
                }
            }
        }
        let var_ok = |v: VarId| match self.vars.get(v.index()) {
            Some(var) => var.is_global() || func.owns_var(v),
            None => false,
        };
        for stmt_id in func.body.walk_stmts() {
            let stmt = func.body.stmt(stmt_id);
            let ok = match &stmt.kind {
                StmtKind::Assign { target, .. } => var_ok(*target),
                StmtKind::ArrayAssign { array, .. } => var_ok(*array),
                StmtKind::MemberAssign { field, .. } => self.field_ok(*field),
                StmtKind::Dealloc { class, .. } => class.index() < self.classes.len(),
                _ => true,
            };
            if !ok {
                return Err(structural(
                    format!("{}: statement {} has a dangling reference", func.name, stmt_id),
                    &stmt.span,
                ));
            }
            for root in stmt.kind.exprs() {
                for expr_id in func.body.sub_exprs(root) {
                    let expr = func.body.expr(expr_id);
                    let ok = match &expr.kind {
                        ExprKind::VarRead(v) | ExprKind::ArrayRead { array: v, .. } => var_ok(*v),
                        ExprKind::Let { var, .. } => var_ok(*var),
                        ExprKind::Call { func: callee, .. } => {
                            callee.index() < self.functions.len()
                        }
                        ExprKind::MethodCall { method, .. } => method.index() < self.methods.len(),
                        ExprKind::MemberRead { field, .. } => self.field_ok(*field),
                        ExprKind::Alloc(c)
                        | ExprKind::InstanceOf { class: c, .. }
                        | ExprKind::TypeIdOfClass(c) => c.index() < self.classes.len(),
                        _ => true,
                    };
                    if !ok {
                        return Err(structural(
                            format!(
                                "{}: expression {} has a dangling reference",
                                func.name, expr_id
                            ),
                            &expr.span,
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn field_ok(&self, field: FieldRef) -> bool {
        self.classes
            .get(field.class.index())
            .is_some_and(|c| (field.index as usize) < c.fields.len())
    }

    /// Whether no class abstraction is left anywhere
    pub fn is_flat(&self) -> bool {
        self.flatness_violation().is_none()
    }

    /// Fail with the first class remnant found
    pub fn assert_flat(&self) -> CompileResult<()> {
        match self.flatness_violation() {
            None => Ok(()),
            Some((what, span)) => Err(CompileError::NotImplemented { what, span }),
        }
    }

    fn flatness_violation(&self) -> Option<(String, Span)> {
        if let Some(class) = self.classes.first() {
            return Some((format!("class {} survived elimination", class.name), class.span.clone()));
        }
        if let Some(method) = self.methods.first() {
            return Some((
                format!("method {} survived elimination", method.name),
                method.span.clone(),
            ));
        }
        if let Some(var) = self.vars.iter().find(|v| v.ty.mentions_class()) {
            return Some((format!("variable {} still has class type", var.name), var.span.clone()));
        }
        for func in &self.functions {
            if func.return_ty.mentions_class() {
                return Some((
                    format!("function {} still returns a class type", func.name),
                    func.span.clone(),
                ));
            }
            for stmt_id in func.body.walk_stmts() {
                let stmt = func.body.stmt(stmt_id);
                if stmt.kind.is_class_related() {
                    return Some((
                        format!("class statement left in {}", func.name),
                        stmt.span.clone(),
                    ));
                }
                for root in stmt.kind.exprs() {
                    for expr_id in func.body.sub_exprs(root) {
                        let expr = func.body.expr(expr_id);
                        if expr.kind.is_class_related() || expr.ty.mentions_class() {
                            return Some((
                                format!("class expression left in {}", func.name),
                                expr.span.clone(),
                            ));
                        }
                    }
                }
            }
        }
        None
    }

    /// Index of functions by name
    pub fn function_index(&self) -> FxHashMap<&str, FunctionId> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.as_str(), FunctionId::new(i as u32)))
            .collect()
    }
}

fn structural(message: String, span: &Span) -> CompileError {
    CompileError::Structural {
        message,
        span: span.clone(),
    }
}
