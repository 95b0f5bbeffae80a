//! Operator and node-kind tags.

use std::fmt;

/// Binary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    AddChecked,
    Subtract,
    SubtractChecked,
    Multiply,
    MultiplyChecked,
    Divide,
    Modulo,
    Power,
    And,
    Or,
    ExclusiveOr,
    LeftShift,
    RightShift,
    AndAlso,
    OrElse,
    Coalesce,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
        )
    }

    /// Operators whose right operand is evaluated only when needed.
    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::AndAlso | BinaryOp::OrElse | BinaryOp::Coalesce)
    }

    /// Arithmetic operators that raise on overflow.
    pub fn is_checked(self) -> bool {
        matches!(
            self,
            BinaryOp::AddChecked | BinaryOp::SubtractChecked | BinaryOp::MultiplyChecked
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add | BinaryOp::AddChecked => "+",
            BinaryOp::Subtract | BinaryOp::SubtractChecked => "-",
            BinaryOp::Multiply | BinaryOp::MultiplyChecked => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "**",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::ExclusiveOr => "^",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
            BinaryOp::AndAlso => "&&",
            BinaryOp::OrElse => "||",
            BinaryOp::Coalesce => "??",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
        }
    }
}

/// Unary operators, conversions included.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    NegateChecked,
    Not,
    OnesComplement,
    UnaryPlus,
    Convert,
    ConvertChecked,
    TypeAs,
    ArrayLength,
}

impl UnaryOp {
    pub fn is_conversion(self) -> bool {
        matches!(self, UnaryOp::Convert | UnaryOp::ConvertChecked | UnaryOp::TypeAs)
    }
}

/// How a binary operator treats nullable operands.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Lifting {
    /// At least one operand is nullable and null propagates.
    pub lifted: bool,
    /// A lifted operator yields a nullable result rather than `false`.
    pub to_null: bool,
}

/// Constructs outside the supported subset.
///
/// They can be represented so that callers get a precise "unsupported"
/// failure instead of a silently wrong answer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ForeignKind {
    Block,
    Loop,
    Switch,
    Try,
    Goto,
    Label,
    Dynamic,
    RuntimeVariables,
    DebugInfo,
    ListInit,
    MemberInit,
    Invocation,
}

impl fmt::Display for ForeignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tag of a node kind, the unit that structural hashing folds per node.
///
/// Binary and unary nodes are tagged by their operator, so `a + b` and
/// `a - b` differ at the tag level.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Constant,
    Parameter,
    Binary(BinaryOp),
    Unary(UnaryOp),
    Conditional,
    Member,
    Call,
    New,
    NewArray,
    Index,
    TypeIs,
    Lambda,
    Raise,
    Extension(ForeignKind),
}

impl NodeKind {
    /// Numeric tag folded into structural hashes.
    pub fn code(self) -> i32 {
        match self {
            NodeKind::Constant => 1,
            NodeKind::Parameter => 2,
            NodeKind::Conditional => 3,
            NodeKind::Member => 4,
            NodeKind::Call => 5,
            NodeKind::New => 6,
            NodeKind::NewArray => 7,
            NodeKind::Index => 8,
            NodeKind::TypeIs => 9,
            NodeKind::Lambda => 10,
            NodeKind::Raise => 11,
            NodeKind::Binary(op) => 100 + op as i32,
            NodeKind::Unary(op) => 200 + op as i32,
            NodeKind::Extension(kind) => 300 + kind as i32,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Binary(op) => write!(f, "{op:?}"),
            NodeKind::Unary(op) => write!(f, "{op:?}"),
            NodeKind::Extension(kind) => write!(f, "{kind}"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}
