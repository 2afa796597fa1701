//! Intermediate Representation
//!
//! A structured, tree-shaped IR: functions own an arena `Body` of statements
//! and expressions, and the whole program shares one variable table. Before
//! class elimination the IR still carries classes, methods, fields and
//! dynamic dispatch; afterwards it is "flat".

pub mod body;
pub mod builder;
pub mod node;
pub mod pretty;
pub mod program;
pub mod span;
pub mod types;

pub use body::{Body, Parent};
pub use builder::{BodyBuilder, ProgramBuilder};
pub use node::{BinaryOp, Expr, ExprId, ExprKind, Stmt, StmtId, StmtKind, UnaryOp};
pub use pretty::PrettyPrint;
pub use program::{
    Class, ClassId, Field, FieldRef, Function, FunctionId, Method, MethodId, Program, VarId,
    VarScope, Variable,
};
pub use span::Span;
pub use types::{Literal, Type};
