//! Tree-walking interpreter for flat programs
//!
//! Runs the output of the pipeline directly on the IR. Globals start at the
//! default value of their type and global arrays grow on demand. Class
//! related nodes are rejected: the interpreter only understands flat IR.

use crate::error::RuntimeError;
use crate::ir::{
    BinaryOp, ExprId, ExprKind, Function, FunctionId, Literal, Program, StmtId, StmtKind, Type,
    UnaryOp, VarId, VarScope,
};
use rustc_hash::FxHashMap;

/// Default bound on executed statements per interpreter
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

const MAX_CALL_DEPTH: usize = 512;

/// A runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Bool(bool),
    Str(String),
    Void,
}

impl Value {
    pub fn from_literal(lit: &Literal) -> Self {
        match lit {
            Literal::Int(v) => Value::Int(*v),
            Literal::Real(v) => Value::Real(*v),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Null => Value::Int(0),
        }
    }

    /// Value of an uninitialised variable or array element
    pub fn default_for(ty: &Type) -> Self {
        match ty {
            Type::Void | Type::Array(_) => Value::Void,
            other => Value::from_literal(&other.default_literal()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{:?}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Void => write!(f, "void"),
        }
    }
}

/// Host implementation of a native function
pub type NativeFn<'p> = Box<dyn FnMut(&[Value]) -> Result<Value, RuntimeError> + 'p>;

/// How a statement finished
enum Flow {
    Normal,
    /// An `exitwhen` fired; unwinds to the innermost loop
    Exit,
    Return(Value),
}

type Frame = FxHashMap<VarId, Value>;

/// Interpreter over one program
pub struct Interpreter<'p> {
    program: &'p Program,
    scalars: FxHashMap<VarId, Value>,
    arrays: FxHashMap<VarId, Vec<Value>>,
    natives: FxHashMap<String, NativeFn<'p>>,
    output: Vec<String>,
    steps: u64,
    step_limit: u64,
    depth: usize,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            scalars: FxHashMap::default(),
            arrays: FxHashMap::default(),
            natives: FxHashMap::default(),
            output: Vec::new(),
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            depth: 0,
        }
    }

    /// Bound the number of statements executed across all calls
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Provide the body of a native function. `print` is built in.
    pub fn with_native(mut self, name: impl Into<String>, native: NativeFn<'p>) -> Self {
        self.natives.insert(name.into(), native);
        self
    }

    /// Lines recorded by `print`
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Statements executed so far
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Current value of a scalar global
    pub fn global(&self, var: VarId) -> Value {
        self.scalars
            .get(&var)
            .cloned()
            .unwrap_or_else(|| Value::default_for(&self.program.var(var).ty))
    }

    /// Current value of one element of a global array
    pub fn array_element(&self, var: VarId, index: i64) -> Value {
        let stored = usize::try_from(index)
            .ok()
            .and_then(|i| self.arrays.get(&var).and_then(|a| a.get(i)));
        match stored {
            Some(value) => value.clone(),
            None => self.element_default(var),
        }
    }

    /// Call a function by name
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let id = self
            .program
            .function_id(name)
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
        self.call_function(id, args)
    }

    /// Call a function by id
    pub fn call_function(&mut self, id: FunctionId, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let program = self.program;
        let func = program.function(id);
        if args.len() != func.params.len() {
            return Err(RuntimeError::Arity {
                name: func.name.clone(),
                expected: func.params.len(),
                got: args.len(),
            });
        }
        if func.native {
            return self.call_native(func, args);
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::Unsupported(format!(
                "call depth of {} exceeded in {}",
                MAX_CALL_DEPTH, func.name
            )));
        }

        let mut frame = Frame::default();
        for (param, arg) in func.params.iter().zip(args) {
            frame.insert(*param, arg);
        }
        for local in &func.locals {
            frame.insert(*local, Value::default_for(&program.var(*local).ty));
        }

        self.depth += 1;
        let flow = self.exec_block(func, &mut frame, func.body.root());
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::Void),
            Flow::Exit => Err(RuntimeError::Unsupported(format!(
                "exitwhen escaped its loop in {}",
                func.name
            ))),
        }
    }

    fn call_native(&mut self, func: &Function, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if let Some(native) = self.natives.get_mut(&func.name) {
            return native(&args);
        }
        if func.name == "print" {
            let line = args
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            log::trace!("print: {}", line);
            self.output.push(line);
            return Ok(Value::Void);
        }
        Err(RuntimeError::Unsupported(format!(
            "native function {} has no host implementation",
            func.name
        )))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block(&mut self, func: &Function, frame: &mut Frame, stmts: &[StmtId]) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.exec_stmt(func, frame, *stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, func: &Function, frame: &mut Frame, stmt: StmtId) -> Result<Flow, RuntimeError> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(RuntimeError::StepLimit(self.step_limit));
        }

        match &func.body.stmt(stmt).kind {
            StmtKind::Assign { target, value } => {
                let value = self.eval(func, frame, *value)?;
                self.write_var(frame, *target, value);
            }
            StmtKind::ArrayAssign {
                array,
                index,
                value,
            } => {
                let index = self.eval_index(func, frame, *index)?;
                let value = self.eval(func, frame, *value)?;
                let default = self.element_default(*array);
                let elements = self.arrays.entry(*array).or_default();
                if elements.len() <= index {
                    elements.resize(index + 1, default);
                }
                elements[index] = value;
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let block = if self.eval_bool(func, frame, *cond)? {
                    then_block
                } else {
                    else_block
                };
                return self.exec_block(func, frame, block);
            }
            StmtKind::Loop { body } => loop {
                match self.exec_block(func, frame, body)? {
                    Flow::Normal => {}
                    Flow::Exit => break,
                    ret @ Flow::Return(_) => return Ok(ret),
                }
            },
            StmtKind::ExitWhen { cond } => {
                if self.eval_bool(func, frame, *cond)? {
                    return Ok(Flow::Exit);
                }
            }
            StmtKind::Return { value } => {
                let value = match value {
                    Some(v) => self.eval(func, frame, *v)?,
                    None => Value::Void,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Expr(expr) => {
                self.eval(func, frame, *expr)?;
            }
            StmtKind::Trap { message } => return Err(RuntimeError::Trap(message.clone())),
            StmtKind::MemberAssign { .. } | StmtKind::Dealloc { .. } => {
                return Err(RuntimeError::Unsupported(format!(
                    "class-related statement {} in {}",
                    stmt, func.name
                )));
            }
        }
        Ok(Flow::Normal)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn eval(&mut self, func: &Function, frame: &mut Frame, expr: ExprId) -> Result<Value, RuntimeError> {
        match &func.body.expr(expr).kind {
            ExprKind::Literal(lit) => Ok(Value::from_literal(lit)),
            ExprKind::VarRead(var) => self.read_var(frame, *var),
            ExprKind::ArrayRead { array, index } => {
                let index = self.eval_index(func, frame, *index)?;
                Ok(self.array_element(*array, index as i64))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let left = self.eval(func, frame, *lhs)?;
                match (op, &left) {
                    (BinaryOp::And, Value::Bool(false)) => return Ok(left),
                    (BinaryOp::Or, Value::Bool(true)) => return Ok(left),
                    _ => {}
                }
                let right = self.eval(func, frame, *rhs)?;
                binary(*op, left, right)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(func, frame, *operand)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
                    (UnaryOp::Neg, Value::Real(v)) => Ok(Value::Real(-v)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (op, value) => Err(RuntimeError::TypeMismatch(format!("{:?} {}", op, value))),
                }
            }
            ExprKind::Call { func: callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(func, frame, *arg)?);
                }
                self.call_function(*callee, values)
            }
            ExprKind::Let { var, init, body } => {
                let value = self.eval(func, frame, *init)?;
                self.write_var(frame, *var, value);
                self.eval(func, frame, *body)
            }
            ExprKind::MethodCall { .. }
            | ExprKind::MemberRead { .. }
            | ExprKind::Alloc(_)
            | ExprKind::InstanceOf { .. }
            | ExprKind::TypeIdOfClass(_)
            | ExprKind::TypeIdOfObject(_) => Err(RuntimeError::Unsupported(format!(
                "class-related expression {} in {}",
                expr, func.name
            ))),
        }
    }

    fn eval_bool(&mut self, func: &Function, frame: &mut Frame, expr: ExprId) -> Result<bool, RuntimeError> {
        let value = self.eval(func, frame, expr)?;
        value
            .as_bool()
            .ok_or_else(|| RuntimeError::TypeMismatch(format!("expected bool, got {}", value)))
    }

    fn eval_index(&mut self, func: &Function, frame: &mut Frame, expr: ExprId) -> Result<usize, RuntimeError> {
        let value = self.eval(func, frame, expr)?;
        let index = value
            .as_int()
            .ok_or_else(|| RuntimeError::TypeMismatch(format!("expected int index, got {}", value)))?;
        usize::try_from(index).map_err(|_| RuntimeError::NegativeIndex(index))
    }

    fn read_var(&self, frame: &Frame, var: VarId) -> Result<Value, RuntimeError> {
        match self.program.var(var).scope {
            VarScope::Global => {
                if matches!(self.program.var(var).ty, Type::Array(_)) {
                    return Err(RuntimeError::TypeMismatch(format!(
                        "array {} read as a scalar",
                        self.program.var(var).name
                    )));
                }
                Ok(self.global(var))
            }
            VarScope::Local | VarScope::Param => Ok(frame
                .get(&var)
                .cloned()
                .unwrap_or_else(|| Value::default_for(&self.program.var(var).ty))),
        }
    }

    fn write_var(&mut self, frame: &mut Frame, var: VarId, value: Value) {
        match self.program.var(var).scope {
            VarScope::Global => {
                self.scalars.insert(var, value);
            }
            VarScope::Local | VarScope::Param => {
                frame.insert(var, value);
            }
        }
    }

    fn element_default(&self, array: VarId) -> Value {
        match self.program.var(array).ty.element() {
            Some(elem) => Value::default_for(elem),
            None => Value::Void,
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    let value = match (op, &left, &right) {
        (Add, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
        (Sub, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
        (Mul, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(*b)),
        (Div | Mod, Value::Int(_), Value::Int(0)) => return Err(RuntimeError::DivisionByZero),
        (Div, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_div(*b)),
        (Mod, Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_rem(*b)),

        (Add, Value::Real(a), Value::Real(b)) => Value::Real(a + b),
        (Sub, Value::Real(a), Value::Real(b)) => Value::Real(a - b),
        (Mul, Value::Real(a), Value::Real(b)) => Value::Real(a * b),
        (Div | Mod, Value::Real(_), Value::Real(b)) if *b == 0.0 => {
            return Err(RuntimeError::DivisionByZero)
        }
        (Div, Value::Real(a), Value::Real(b)) => Value::Real(a / b),
        (Mod, Value::Real(a), Value::Real(b)) => Value::Real(a % b),

        (Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{}{}", a, b)),

        (Eq, a, b) => Value::Bool(a == b),
        (Ne, a, b) => Value::Bool(a != b),
        (Lt | Le | Gt | Ge, Value::Int(a), Value::Int(b)) => Value::Bool(compare(op, a.cmp(b))),
        (Lt | Le | Gt | Ge, Value::Real(a), Value::Real(b)) => match a.partial_cmp(b) {
            Some(ordering) => Value::Bool(compare(op, ordering)),
            None => Value::Bool(false),
        },
        (Lt | Le | Gt | Ge, Value::Str(a), Value::Str(b)) => Value::Bool(compare(op, a.cmp(b))),

        (And | Or, Value::Bool(_), Value::Bool(b)) => Value::Bool(*b),

        _ => {
            return Err(RuntimeError::TypeMismatch(format!(
                "{} {} {}",
                left, op, right
            )))
        }
    };
    Ok(value)
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Ge => ordering != Less,
        _ => false,
    }
}
