//! Constant extraction.
//!
//! Walks every Constant node in pre-order, nested lambdas included, either
//! collecting the values ([`extract_constants_only`]) or replacing each
//! constant with a fresh placeholder parameter ([`extract_constants`]).
//!
//! Both walks visit the same nodes in the same order. A cache hit relies on
//! this: the values collected from a new tree line up with the placeholders
//! of the artifact compiled for an earlier tree of the same shape.
//!
//! Rebuilt nodes keep their declared result type, so a placeholder standing
//! in for a constant of type `T?` is itself typed `T?` and a lifted
//! comparison over it stays type-consistent.

use arbor_ir::visitor::for_each_node;
use arbor_ir::{Expr, ExprKind, Rewriter, Ty, Value};
use rustc_hash::FxHashSet;

/// Result of [`extract_constants`]. `placeholders[i]` stands for `values[i]`.
#[derive(Clone, Debug)]
pub struct Extraction {
    /// The input tree with every constant replaced by its placeholder.
    pub body: Expr,
    /// Parameter nodes, in discovery order.
    pub placeholders: Vec<Expr>,
    /// Constant values, in discovery order.
    pub values: Vec<Value>,
}

/// Values of every Constant node, in pre-order.
pub fn extract_constants_only(expr: &Expr) -> Vec<Value> {
    let mut values = Vec::new();
    for_each_node(expr, &mut |node| {
        if let Some(value) = node.as_constant() {
            values.push(value.clone());
        }
    });
    values
}

/// Replace every Constant node with a fresh parameter of the same type.
///
/// Placeholder names are `p0, p1, ...`, skipping names already used by
/// parameters in `expr` so the placeholders can share a parameter list with
/// the original lambda's parameters.
pub fn extract_constants(expr: &Expr) -> Extraction {
    let mut extractor = Extractor {
        taken: parameter_names(expr),
        next: 0,
        placeholders: Vec::new(),
        values: Vec::new(),
    };
    let body = extractor.rewrite(expr);
    tracing::trace!(count = extractor.values.len(), "extracted constants");
    Extraction {
        body,
        placeholders: extractor.placeholders,
        values: extractor.values,
    }
}

/// Replace every Constant node with `replace(value, ty)`.
pub fn replace_constants(expr: &Expr, replace: impl FnMut(&Value, &Ty) -> Expr) -> Expr {
    struct Replacer<F>(F);

    impl<F: FnMut(&Value, &Ty) -> Expr> Rewriter for Replacer<F> {
        fn rewrite_constant(&mut self, expr: &Expr, value: &Value) -> Expr {
            (self.0)(value, expr.ty())
        }
    }

    Replacer(replace).rewrite(expr)
}

struct Extractor {
    taken: FxHashSet<String>,
    next: usize,
    placeholders: Vec<Expr>,
    values: Vec<Value>,
}

impl Extractor {
    fn fresh_name(&mut self) -> String {
        loop {
            let name = format!("p{}", self.next);
            self.next += 1;
            if !self.taken.contains(&name) {
                return name;
            }
        }
    }
}

impl Rewriter for Extractor {
    fn rewrite_constant(&mut self, expr: &Expr, value: &Value) -> Expr {
        let name = self.fresh_name();
        let placeholder = Expr::parameter(&name, expr.ty().clone());
        self.placeholders.push(placeholder.clone());
        self.values.push(value.clone());
        placeholder
    }
}

fn parameter_names(expr: &Expr) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    for_each_node(expr, &mut |node| {
        if let ExprKind::Parameter(param) = node.kind() {
            names.insert(param.name().to_string());
        }
        if let ExprKind::Lambda(parts) = node.kind() {
            for param in parts.params() {
                if let Some(def) = param.as_parameter() {
                    names.insert(def.name().to_string());
                }
            }
        }
    });
    names
}
