//! Parameter-list rewriting.
//!
//! Turns `(a: A, b: B) => body` into `(args: object[]) => body'` where every
//! reference to the i-th parameter becomes `Convert(args[i], declared_type)`.
//! A compiled artifact with this shape takes its arguments as one slice,
//! whatever the arity of the source lambda.

use arbor_ir::{Expr, LambdaParts, ParamDef, ParamId, Rewriter, Ty};
use rustc_hash::FxHashMap;

/// Name of the single parameter of a rewritten lambda.
pub const ARGS_NAME: &str = "args";

/// Rewrite `body` over `params` into a single-parameter lambda over an
/// `object[]` argument array.
pub fn rewrite_lambda(body: &Expr, params: &[Expr]) -> LambdaParts {
    let args = Expr::parameter(ARGS_NAME, Ty::array(Ty::Object));
    let mut positions = FxHashMap::default();
    for (index, param) in params.iter().enumerate() {
        if let Some(def) = param.as_parameter() {
            positions.insert(def.id(), (index, param.ty().clone()));
        }
    }
    let mut rewriter = ArgsRewriter {
        args: args.clone(),
        positions,
    };
    let body = rewriter.rewrite(body);
    LambdaParts::single(args, body)
}

struct ArgsRewriter {
    args: Expr,
    positions: FxHashMap<ParamId, (usize, Ty)>,
}

impl Rewriter for ArgsRewriter {
    fn rewrite_parameter(&mut self, expr: &Expr, param: &ParamDef) -> Expr {
        let Some((index, ty)) = self.positions.get(&param.id()) else {
            return expr.clone();
        };
        let slot = Expr::index(self.args.clone(), None, vec![Expr::literal(position(*index))]);
        Expr::convert(slot, ty.clone())
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    reason = "parameter lists are far shorter than i32::MAX"
)]
fn position(index: usize) -> i32 {
    index as i32
}
