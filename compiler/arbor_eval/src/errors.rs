//! Evaluation errors and their constructors.
//!
//! Every failure the evaluators can produce is an [`EvalError`]. Build them
//! through the `#[cold]` factory functions below rather than the variants,
//! so message wording stays in one place.
//!
//! # Dynamic wrapping
//!
//! The interpreter wraps the first error to escape a node in
//! [`EvalError::Dynamic`], recording the failing subtree. Use
//! [`EvalError::root_cause`] to look past that wrapper, e.g. to assert that
//! a checked conversion overflowed regardless of which evaluator ran it.

use arbor_canon::SubstituteError;
use arbor_ir::{
    BinaryOp, DeferredError, Expr, ForeignKind, FuncSig, HostError, StructureError, Ty, UnaryOp,
    Value,
};

/// Result of evaluation.
pub type EvalResult = Result<Value, EvalError>;

#[derive(Clone, Debug, thiserror::Error)]
pub enum EvalError {
    #[error("arithmetic overflow in {operation}")]
    Overflow { operation: String },

    #[error("cannot convert {value} to `{target}`")]
    InvalidCast { value: String, target: Ty },

    #[error("division by zero")]
    DivideByZero,

    #[error("null reference in {context}")]
    NullReference { context: String },

    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i128, len: usize },

    #[error("{what} is not supported")]
    Unsupported { what: String },

    #[error("parameter `{name}` is not bound")]
    UnboundParameter { name: String },

    #[error("expected {expected} arguments, found {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("lambda of type `{found}` does not have the shape `{expected}`")]
    ShapeMismatch { expected: FuncSig, found: FuncSig },

    #[error(transparent)]
    Host(#[from] HostError),

    /// A captured failure raised by a deferred-exception placeholder.
    #[error("{0}")]
    Deferred(DeferredError),

    #[error(transparent)]
    Expansion(Box<ExpansionError>),

    #[error("expansion exceeded {limit} nested rule applications")]
    DepthExceeded { limit: usize },

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Substitute(#[from] SubstituteError),

    #[error("evaluation of `{expr}` failed: {cause}")]
    Dynamic {
        expr: Expr,
        #[source]
        cause: Box<EvalError>,
    },
}

impl EvalError {
    /// The error underneath any [`EvalError::Dynamic`] wrappers.
    pub fn root_cause(&self) -> &EvalError {
        let mut current = self;
        while let EvalError::Dynamic { cause, .. } = current {
            current = cause;
        }
        current
    }

    pub fn is_overflow(&self) -> bool {
        matches!(self.root_cause(), EvalError::Overflow { .. })
    }

    pub fn is_invalid_cast(&self) -> bool {
        matches!(self.root_cause(), EvalError::InvalidCast { .. })
    }

    /// Wrap `self` as failing at `expr`, unless it already records a node.
    #[must_use]
    pub fn at(self, expr: &Expr) -> EvalError {
        match self {
            EvalError::Dynamic { .. } => self,
            cause => EvalError::Dynamic {
                expr: expr.clone(),
                cause: Box::new(cause),
            },
        }
    }
}

/// A rewrite rule failed during expansion.
#[derive(Clone, Debug, thiserror::Error)]
#[error("rewrite rule `{rule}` failed on `{expr}`: {cause}")]
pub struct ExpansionError {
    pub rule: String,
    pub expr: Expr,
    #[source]
    pub cause: EvalError,
}

// Arithmetic

#[cold]
pub fn overflow(operation: &str) -> EvalError {
    EvalError::Overflow {
        operation: operation.to_string(),
    }
}

#[cold]
pub fn binary_overflow(op: BinaryOp, ty: &Ty) -> EvalError {
    overflow(&format!("`{}` on {ty}", op.symbol()))
}

#[cold]
pub fn conversion_overflow(value: &Value, target: &Ty) -> EvalError {
    overflow(&format!("conversion of {value} to {target}"))
}

#[cold]
pub fn division_by_zero() -> EvalError {
    EvalError::DivideByZero
}

// Conversions

#[cold]
pub fn invalid_cast(value: &Value, target: &Ty) -> EvalError {
    EvalError::InvalidCast {
        value: value.to_string(),
        target: target.clone(),
    }
}

// Operands

#[cold]
pub fn invalid_binary_operands(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::Unsupported {
        what: format!("`{left} {} {right}`", op.symbol()),
    }
}

#[cold]
pub fn invalid_unary_operand(op: UnaryOp, operand: &Value) -> EvalError {
    EvalError::Unsupported {
        what: format!("{op:?} on {operand}"),
    }
}

#[cold]
pub fn null_reference(context: &str) -> EvalError {
    EvalError::NullReference {
        context: context.to_string(),
    }
}

#[cold]
pub fn index_out_of_range(index: i128, len: usize) -> EvalError {
    EvalError::IndexOutOfRange { index, len }
}

// Tree shape

#[cold]
pub fn unsupported_kind(kind: ForeignKind) -> EvalError {
    EvalError::Unsupported {
        what: format!("`{kind}` expressions"),
    }
}

#[cold]
pub fn unsupported(what: &str) -> EvalError {
    EvalError::Unsupported {
        what: what.to_string(),
    }
}

#[cold]
pub fn unbound_parameter(name: &str) -> EvalError {
    EvalError::UnboundParameter {
        name: name.to_string(),
    }
}

#[cold]
pub fn wrong_arg_count(expected: usize, found: usize) -> EvalError {
    EvalError::ArgumentCount { expected, found }
}

#[cold]
pub fn shape_mismatch(expected: FuncSig, found: FuncSig) -> EvalError {
    EvalError::ShapeMismatch { expected, found }
}

// Deferred failures

/// The error a placeholder raises for `payload`.
///
/// Payloads that are themselves evaluation errors come back as they were
/// captured, so a folded `checked(int.MaxValue + 1)` still reports overflow.
#[cold]
pub fn raised(payload: &DeferredError) -> EvalError {
    if let Some(error) = payload.downcast_ref::<EvalError>() {
        return error.clone();
    }
    if let Some(error) = payload.downcast_ref::<ExpansionError>() {
        return EvalError::Expansion(Box::new(error.clone()));
    }
    EvalError::Deferred(payload.clone())
}

#[cold]
pub fn expansion_failed(rule: &str, expr: &Expr, cause: EvalError) -> EvalError {
    EvalError::Expansion(Box::new(ExpansionError {
        rule: rule.to_string(),
        expr: expr.clone(),
        cause,
    }))
}

#[cold]
pub fn expansion_too_deep(limit: usize) -> EvalError {
    EvalError::DepthExceeded { limit }
}
