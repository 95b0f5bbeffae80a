//! Lambda bodies and their parameter lists.

use rustc_hash::FxHashSet;

use super::{Expr, ExprKind, ParamId};
use crate::ty::{FuncSig, Ty};

/// Malformed lambda construction.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("lambda parameter #{index} is not a parameter expression")]
    NotAParameter { index: usize },
    #[error("lambda parameter name `{name}` is declared twice")]
    DuplicateParameter { name: String },
}

/// A body together with its ordered, name-unique parameters.
#[derive(Clone, Debug)]
pub struct LambdaParts {
    params: Vec<Expr>,
    body: Expr,
}

impl LambdaParts {
    pub fn new(params: Vec<Expr>, body: Expr) -> Result<Self, BuildError> {
        let mut names = FxHashSet::default();
        for (index, param) in params.iter().enumerate() {
            let Some(def) = param.as_parameter() else {
                return Err(BuildError::NotAParameter { index });
            };
            if !names.insert(def.name()) {
                return Err(BuildError::DuplicateParameter {
                    name: def.name().to_string(),
                });
            }
        }
        Ok(LambdaParts { params, body })
    }

    /// A parameterless lambda around `body`.
    pub fn closed(body: Expr) -> Self {
        LambdaParts {
            params: Vec::new(),
            body,
        }
    }

    /// A one-parameter lambda. `param` must be a parameter node.
    pub fn single(param: Expr, body: Expr) -> Self {
        debug_assert!(param.as_parameter().is_some(), "lambda parameter must be a parameter node");
        LambdaParts {
            params: vec![param],
            body,
        }
    }

    pub fn params(&self) -> &[Expr] {
        &self.params
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn param_ids(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.params
            .iter()
            .filter_map(|param| param.as_parameter().map(|def| def.id()))
    }

    pub fn param_types(&self) -> Vec<Ty> {
        self.params.iter().map(|param| param.ty().clone()).collect()
    }

    pub fn signature(&self) -> FuncSig {
        FuncSig {
            params: self.param_types(),
            ret: self.body.ty().clone(),
        }
    }

    /// Same parameters, different body.
    #[must_use]
    pub fn with_body(&self, body: Expr) -> Self {
        LambdaParts {
            params: self.params.clone(),
            body,
        }
    }

    /// Wrap into a lambda expression node.
    pub fn to_expr(&self) -> Expr {
        Expr::lambda(self.clone())
    }

    /// Lambda parts of a lambda node.
    pub fn from_expr(expr: &Expr) -> Option<Self> {
        match expr.kind() {
            ExprKind::Lambda(parts) => Some(parts.clone()),
            _ => None,
        }
    }
}
