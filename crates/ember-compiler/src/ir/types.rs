//! IR Types and Literals
//!
//! The static types the frontend attaches to variables and expressions, and
//! the literal values that may appear in the IR.

use super::program::ClassId;
use serde::{Deserialize, Serialize};

/// Static type of a variable or expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    /// No value (function return type only)
    Void,
    /// Integer (also the representation of object handles after lowering)
    Int,
    /// Floating point number
    Real,
    /// Boolean
    Bool,
    /// String
    Str,
    /// Reference to an instance of a class
    Class(ClassId),
    /// Global array indexed by integer
    Array(Box<Type>),
}

impl Type {
    /// Shorthand for an array type
    pub fn array_of(elem: Type) -> Self {
        Type::Array(Box::new(elem))
    }

    /// Whether this type mentions a class anywhere
    pub fn mentions_class(&self) -> bool {
        match self {
            Type::Class(_) => true,
            Type::Array(elem) => elem.mentions_class(),
            _ => false,
        }
    }

    /// Replace every class reference with the integer handle type
    pub fn erase_classes(&self) -> Type {
        match self {
            Type::Class(_) => Type::Int,
            Type::Array(elem) => Type::array_of(elem.erase_classes()),
            other => other.clone(),
        }
    }

    /// Element type of an array type
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// The value an uninitialised variable of this type holds
    pub fn default_literal(&self) -> Literal {
        match self {
            Type::Int => Literal::Int(0),
            Type::Real => Literal::Real(0.0),
            Type::Bool => Literal::Bool(false),
            Type::Str => Literal::Str(String::new()),
            Type::Class(_) => Literal::Null,
            Type::Void | Type::Array(_) => Literal::Null,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int => write!(f, "int"),
            Type::Real => write!(f, "real"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "string"),
            Type::Class(id) => write!(f, "{}", id),
            Type::Array(elem) => write!(f, "array<{}>", elem),
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// Integer literal
    Int(i64),
    /// Real literal
    Real(f64),
    /// Boolean literal
    Bool(bool),
    /// String literal
    Str(String),
    /// Null handle
    Null,
}

impl Literal {
    /// Static type of this literal
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) | Literal::Null => Type::Int,
            Literal::Real(_) => Type::Real,
            Literal::Bool(_) => Type::Bool,
            Literal::Str(_) => Type::Str,
        }
    }

    /// Try to get as integer (null is handle 0)
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(v) => Some(*v),
            Literal::Null => Some(0),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Real(v) => write!(f, "{:?}", v),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Str(s) => write!(f, "\"{}\"", s.escape_default()),
            Literal::Null => write!(f, "null"),
        }
    }
}
