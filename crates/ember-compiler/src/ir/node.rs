//! IR Nodes
//!
//! Expression and statement kinds. Both are closed enums: every pass matches
//! them exhaustively, so a new node kind is a compile error at each call site
//! until handled.

use super::program::{ClassId, FieldRef, FunctionId, MethodId, VarId};
use super::span::Span;
use super::types::{Literal, Type};
use serde::{Deserialize, Serialize};

/// Expression node identifier (index into a body's expression arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExprId(pub u32);

impl ExprId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Statement node identifier (index into a body's statement arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StmtId(pub u32);

impl StmtId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Short-circuit conjunction
    And,
    /// Short-circuit disjunction
    Or,
}

impl BinaryOp {
    /// Whether the right operand is only evaluated conditionally
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Whether the result is a boolean regardless of operand types
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "not "),
        }
    }
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprKind {
    /// Literal value
    Literal(Literal),
    /// Read of a scalar variable
    VarRead(VarId),
    /// Read of a global array element: array[index]
    ArrayRead { array: VarId, index: ExprId },
    /// Binary operation: lhs op rhs
    Binary { op: BinaryOp, lhs: ExprId, rhs: ExprId },
    /// Unary operation: op operand
    Unary { op: UnaryOp, operand: ExprId },
    /// Direct function call
    Call { func: FunctionId, args: Vec<ExprId> },
    /// Dynamically dispatched method call: receiver.method(args)
    MethodCall {
        method: MethodId,
        receiver: ExprId,
        args: Vec<ExprId>,
    },
    /// Field read: receiver.field
    MemberRead { receiver: ExprId, field: FieldRef },
    /// Allocate a fresh instance of a class
    Alloc(ClassId),
    /// Dynamic type test: object instanceof class
    InstanceOf { object: ExprId, class: ClassId },
    /// Compile-time typeid of a class
    TypeIdOfClass(ClassId),
    /// Runtime typeid of the object a handle refers to
    TypeIdOfObject(ExprId),
    /// Evaluate `init`, bind it to `var`, then evaluate `body`
    Let { var: VarId, init: ExprId, body: ExprId },
}

impl ExprKind {
    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            ExprKind::Literal(_)
            | ExprKind::VarRead(_)
            | ExprKind::Alloc(_)
            | ExprKind::TypeIdOfClass(_) => Vec::new(),
            ExprKind::ArrayRead { index, .. } => vec![*index],
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Unary { operand, .. } => vec![*operand],
            ExprKind::Call { args, .. } => args.clone(),
            ExprKind::MethodCall { receiver, args, .. } => {
                let mut children = Vec::with_capacity(args.len() + 1);
                children.push(*receiver);
                children.extend(args.iter().copied());
                children
            }
            ExprKind::MemberRead { receiver, .. } => vec![*receiver],
            ExprKind::InstanceOf { object, .. } => vec![*object],
            ExprKind::TypeIdOfObject(object) => vec![*object],
            ExprKind::Let { init, body, .. } => vec![*init, *body],
        }
    }

    /// Whether this node only exists in the object-oriented IR
    pub fn is_class_related(&self) -> bool {
        matches!(
            self,
            ExprKind::MethodCall { .. }
                | ExprKind::MemberRead { .. }
                | ExprKind::Alloc(_)
                | ExprKind::InstanceOf { .. }
                | ExprKind::TypeIdOfClass(_)
                | ExprKind::TypeIdOfObject(_)
        )
    }
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StmtKind {
    /// target = value
    Assign { target: VarId, value: ExprId },
    /// array[index] = value
    ArrayAssign {
        array: VarId,
        index: ExprId,
        value: ExprId,
    },
    /// receiver.field = value
    MemberAssign {
        receiver: ExprId,
        field: FieldRef,
        value: ExprId,
    },
    /// Two-way conditional
    If {
        cond: ExprId,
        then_block: Vec<StmtId>,
        else_block: Vec<StmtId>,
    },
    /// Endless loop, left only through `ExitWhen` or `Return`
    Loop { body: Vec<StmtId> },
    /// Leave the directly enclosing loop when `cond` holds
    ExitWhen { cond: ExprId },
    /// Return from the function
    Return { value: Option<ExprId> },
    /// Evaluate an expression for its side effects
    Expr(ExprId),
    /// Destroy an instance of a class
    Dealloc { class: ClassId, object: ExprId },
    /// Abort execution with a runtime error
    Trap { message: String },
}

impl StmtKind {
    /// Expressions evaluated directly by this statement, in evaluation order
    pub fn exprs(&self) -> Vec<ExprId> {
        match self {
            StmtKind::Assign { value, .. } => vec![*value],
            StmtKind::ArrayAssign { index, value, .. } => vec![*index, *value],
            StmtKind::MemberAssign { receiver, value, .. } => vec![*receiver, *value],
            StmtKind::If { cond, .. } => vec![*cond],
            StmtKind::Loop { .. } => Vec::new(),
            StmtKind::ExitWhen { cond } => vec![*cond],
            StmtKind::Return { value } => value.iter().copied().collect(),
            StmtKind::Expr(expr) => vec![*expr],
            StmtKind::Dealloc { object, .. } => vec![*object],
            StmtKind::Trap { .. } => Vec::new(),
        }
    }

    /// Nested statement lists
    pub fn blocks(&self) -> Vec<&Vec<StmtId>> {
        match self {
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            StmtKind::Loop { body } => vec![body],
            _ => Vec::new(),
        }
    }

    /// Nested statement lists, mutably
    pub fn blocks_mut(&mut self) -> Vec<&mut Vec<StmtId>> {
        match self {
            StmtKind::If {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            StmtKind::Loop { body } => vec![body],
            _ => Vec::new(),
        }
    }

    /// Whether this node only exists in the object-oriented IR
    pub fn is_class_related(&self) -> bool {
        matches!(self, StmtKind::MemberAssign { .. } | StmtKind::Dealloc { .. })
    }
}

/// An expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    #[serde(default)]
    pub span: Span,
}

/// A statement node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    #[serde(default)]
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_order() {
        let kind = ExprKind::MethodCall {
            method: MethodId(0),
            receiver: ExprId(5),
            args: vec![ExprId(1), ExprId(2)],
        };
        assert_eq!(kind.children(), vec![ExprId(5), ExprId(1), ExprId(2)]);
        assert!(kind.is_class_related());

        let kind = ExprKind::Let {
            var: VarId(0),
            init: ExprId(3),
            body: ExprId(4),
        };
        assert_eq!(kind.children(), vec![ExprId(3), ExprId(4)]);
        assert!(!kind.is_class_related());
    }

    #[test]
    fn test_statement_exprs() {
        let kind = StmtKind::ArrayAssign {
            array: VarId(0),
            index: ExprId(1),
            value: ExprId(2),
        };
        assert_eq!(kind.exprs(), vec![ExprId(1), ExprId(2)]);
        assert!(StmtKind::Return { value: None }.exprs().is_empty());
    }

    #[test]
    fn test_short_circuit_ops() {
        assert!(BinaryOp::And.is_short_circuit());
        assert!(BinaryOp::Or.is_short_circuit());
        assert!(!BinaryOp::Add.is_short_circuit());
        assert!(BinaryOp::Le.is_comparison());
    }
}
