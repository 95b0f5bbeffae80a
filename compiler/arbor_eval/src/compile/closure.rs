//! Closure-tree backend.
//!
//! Lowers a lambda into nested Rust closures once, so repeated calls skip
//! the per-node dispatch of the interpreter. The lambda is first rewritten
//! into the argument-array convention (`arbor_canon::rewrite_lambda`); the
//! `Convert(args[i], T)` slots that rewrite produces are recognized and
//! lowered to direct slot reads.
//!
//! Lowering fails only for node kinds outside the supported subset. Runtime
//! failures are reported as plain [`EvalError`]s without the node wrapper
//! the interpreter adds.

use std::sync::Arc;

use arbor_canon::rewrite_lambda;
use arbor_ir::visitor::walk_children;
use arbor_ir::{
    ensure_sufficient_stack, Binary, BinaryOp, Call, Conditional, Expr, ExprKind, ExprVisitor,
    Extension, Index, LambdaParts, MemberAccess, New, NewArray, ParamDef, ParamId, Raise,
    Rewriter, Ty, TypeIs, Unary, UnaryOp, Value,
};

use super::Backend;
use crate::convert::{convert, type_as, type_is};
use crate::errors::{
    index_out_of_range, invalid_cast, null_reference, raised, unbound_parameter, unsupported,
    unsupported_kind, wrong_arg_count, EvalError, EvalResult,
};
use crate::evaluator::Callable;
use crate::operators::{self, evaluate_binary, evaluate_unary};

/// Backend that lowers trees into closure trees.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClosureBackend;

impl Backend for ClosureBackend {
    #[tracing::instrument(level = "debug", skip_all, fields(params = params.len()))]
    fn compile(&self, body: &Expr, params: &[Expr]) -> Result<Callable, EvalError> {
        let lowered = rewrite_lambda(body, params);
        let Some(args) = lowered.param_ids().next() else {
            return Err(unsupported("a lowered lambda without an argument array"));
        };
        let root = Lowerer { args }.visit(lowered.body())?;
        let arity = params.len();
        tracing::debug!(arity, "lowered lambda to closures");
        Ok(Arc::new(move |values: &[Value]| {
            if values.len() != arity {
                return Err(wrong_arg_count(arity, values.len()));
            }
            run(&root, &Env::new(values))
        }))
    }
}

type Node = Box<dyn Fn(&Env<'_>) -> EvalResult + Send + Sync>;

/// Runtime state of one call: the argument array plus parameters of
/// inline lambdas (coalesce conversions).
struct Env<'a> {
    args: &'a [Value],
    locals: Vec<(ParamId, Value)>,
}

impl<'a> Env<'a> {
    fn new(args: &'a [Value]) -> Self {
        Env {
            args,
            locals: Vec::new(),
        }
    }

    fn arg(&self, slot: usize) -> EvalResult {
        self.args
            .get(slot)
            .cloned()
            .ok_or_else(|| {
                index_out_of_range(i128::try_from(slot).unwrap_or(i128::MAX), self.args.len())
            })
    }

    fn local(&self, id: ParamId) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| *local == id)
            .map(|(_, value)| value)
    }

    fn with_locals(&self, bindings: impl IntoIterator<Item = (ParamId, Value)>) -> Env<'a> {
        let mut locals = self.locals.clone();
        locals.extend(bindings);
        Env {
            args: self.args,
            locals,
        }
    }
}

fn closure(f: impl Fn(&Env<'_>) -> EvalResult + Send + Sync + 'static) -> Node {
    Box::new(f)
}

#[inline]
fn run(node: &Node, env: &Env<'_>) -> EvalResult {
    ensure_sufficient_stack(|| node(env))
}

fn run_all(nodes: &[Node], env: &Env<'_>) -> Result<Vec<Value>, EvalError> {
    nodes.iter().map(|node| run(node, env)).collect()
}

fn run_receiver(
    node: Option<&Node>,
    env: &Env<'_>,
    what: &str,
) -> Result<Option<Value>, EvalError> {
    let Some(node) = node else {
        return Ok(None);
    };
    let value = run(node, env)?;
    if value.is_null() {
        return Err(null_reference(what));
    }
    Ok(Some(value))
}

/// Position `i` when `expr` is `args[i]` with a constant index.
fn arg_slot(expr: &Expr, args: ParamId) -> Option<usize> {
    let ExprKind::Index(index) = expr.kind() else {
        return None;
    };
    if index.indexer.is_some() || index.receiver.as_parameter().map(ParamDef::id) != Some(args) {
        return None;
    }
    match index.args.as_slice() {
        [slot] => match slot.as_constant() {
            Some(Value::I32(i)) => usize::try_from(*i).ok(),
            _ => None,
        },
        _ => None,
    }
}

struct Lowerer {
    args: ParamId,
}

impl Lowerer {
    fn lower(&mut self, expr: &Expr) -> Result<Node, EvalError> {
        self.visit(expr)
    }

    fn lower_all(&mut self, exprs: &[Expr]) -> Result<Vec<Node>, EvalError> {
        exprs.iter().map(|expr| self.lower(expr)).collect()
    }

    fn lower_opt(&mut self, expr: Option<&Expr>) -> Result<Option<Node>, EvalError> {
        expr.map(|expr| self.lower(expr)).transpose()
    }

    fn short_circuit(&mut self, binary: &Binary) -> Result<Node, EvalError> {
        let left = self.lower(&binary.left)?;
        let right = self.lower(&binary.right)?;
        Ok(match binary.op {
            BinaryOp::AndAlso => closure(move |env| {
                let l = run(&left, env)?;
                if l == Value::Bool(false) {
                    return Ok(l);
                }
                Ok(operators::and_also(l, run(&right, env)?))
            }),
            _ => closure(move |env| {
                let l = run(&left, env)?;
                if l == Value::Bool(true) {
                    return Ok(l);
                }
                Ok(operators::or_else(l, run(&right, env)?))
            }),
        })
    }

    fn coalesce(&mut self, binary: &Binary) -> Result<Node, EvalError> {
        let left = self.lower(&binary.left)?;
        let right = self.lower(&binary.right)?;
        let conversion = match binary.conversion.as_ref().and_then(Expr::as_lambda) {
            Some(lambda) => {
                let ids: Vec<ParamId> = lambda.param_ids().collect();
                let [id] = ids.as_slice() else {
                    return Err(unsupported("a coalesce conversion without exactly one parameter"));
                };
                Some((*id, self.lower(lambda.body())?))
            }
            None => None,
        };
        Ok(closure(move |env| {
            let l = run(&left, env)?;
            if l.is_null() {
                return run(&right, env);
            }
            match &conversion {
                Some((id, body)) => run(body, &env.with_locals([(*id, l)])),
                None => Ok(l),
            }
        }))
    }
}

impl ExprVisitor for Lowerer {
    type Output = Result<Node, EvalError>;

    fn visit_constant(&mut self, _expr: &Expr, value: &Value) -> Self::Output {
        let value = value.clone();
        Ok(closure(move |_| Ok(value.clone())))
    }

    fn visit_parameter(&mut self, _expr: &Expr, param: &ParamDef) -> Self::Output {
        let id = param.id();
        if id == self.args {
            return Ok(closure(|env| Ok(Value::array(Ty::Object, env.args.to_vec()))));
        }
        let name = param.name().to_string();
        Ok(closure(move |env| {
            env.local(id).cloned().ok_or_else(|| unbound_parameter(&name))
        }))
    }

    fn visit_binary(&mut self, _expr: &Expr, binary: &Binary) -> Self::Output {
        if let Some(method) = &binary.method {
            let method = Arc::clone(method);
            let left = self.lower(&binary.left)?;
            let right = self.lower(&binary.right)?;
            return Ok(closure(move |env| {
                let args = [run(&left, env)?, run(&right, env)?];
                Ok(method.invoke(None, &args)?)
            }));
        }
        match binary.op {
            BinaryOp::AndAlso | BinaryOp::OrElse => self.short_circuit(binary),
            BinaryOp::Coalesce => self.coalesce(binary),
            op => {
                let left = self.lower(&binary.left)?;
                let right = self.lower(&binary.right)?;
                let shape = binary.clone();
                Ok(closure(move |env| {
                    let l = run(&left, env)?;
                    let r = run(&right, env)?;
                    if shape.lifting.lifted && (l.is_null() || r.is_null()) {
                        return Ok(operators::lifted_null(&shape, &l, &r));
                    }
                    evaluate_binary(op, &l, &r)
                }))
            }
        }
    }

    fn visit_unary(&mut self, expr: &Expr, unary: &Unary) -> Self::Output {
        let target = expr.ty().clone();
        if unary.op == UnaryOp::Convert && unary.method.is_none() {
            if let Some(slot) = arg_slot(&unary.operand, self.args) {
                return Ok(closure(move |env| {
                    let value = env.arg(slot)?;
                    if value.is_instance_of(&target) {
                        Ok(value)
                    } else {
                        convert(value, &Ty::Object, &target, false)
                    }
                }));
            }
        }
        let operand = self.lower(&unary.operand)?;
        if let Some(method) = &unary.method {
            let method = Arc::clone(method);
            let lifted = unary.lifted;
            return Ok(closure(move |env| {
                let value = run(&operand, env)?;
                if lifted && value.is_null() {
                    return Ok(Value::Null);
                }
                Ok(method.invoke(None, &[value])?)
            }));
        }
        let source = unary.operand.ty().clone();
        let (op, lifted) = (unary.op, unary.lifted);
        Ok(closure(move |env| {
            let value = run(&operand, env)?;
            match op {
                UnaryOp::Convert | UnaryOp::ConvertChecked => {
                    convert(value, &source, &target, op == UnaryOp::ConvertChecked)
                }
                UnaryOp::TypeAs => Ok(type_as(value, &target)),
                _ if lifted && value.is_null() => Ok(Value::Null),
                UnaryOp::ArrayLength if value.is_null() => Err(null_reference("array length")),
                _ => evaluate_unary(op, &value),
            }
        }))
    }

    fn visit_conditional(&mut self, _expr: &Expr, cond: &Conditional) -> Self::Output {
        let test = self.lower(&cond.test)?;
        let if_true = self.lower(&cond.if_true)?;
        let if_false = self.lower(&cond.if_false)?;
        let test_ty = cond.test.ty().clone();
        Ok(closure(move |env| match run(&test, env)? {
            Value::Bool(true) => run(&if_true, env),
            Value::Bool(false) => run(&if_false, env),
            other => Err(invalid_cast(&other, &test_ty)),
        }))
    }

    fn visit_member(&mut self, _expr: &Expr, access: &MemberAccess) -> Self::Output {
        let receiver = self.lower_opt(access.receiver.as_ref())?;
        let member = Arc::clone(&access.member);
        let context = format!("access to `{}`", member.name());
        Ok(closure(move |env| {
            let receiver = run_receiver(receiver.as_ref(), env, &context)?;
            Ok(member.read(receiver.as_ref())?)
        }))
    }

    fn visit_call(&mut self, _expr: &Expr, call: &Call) -> Self::Output {
        let receiver = self.lower_opt(call.receiver.as_ref())?;
        let args = self.lower_all(&call.args)?;
        let method = Arc::clone(&call.method);
        let context = format!("call to `{}`", method.name());
        Ok(closure(move |env| {
            let receiver = run_receiver(receiver.as_ref(), env, &context)?;
            let args = run_all(&args, env)?;
            Ok(method.invoke(receiver.as_ref(), &args)?)
        }))
    }

    fn visit_new(&mut self, _expr: &Expr, new: &New) -> Self::Output {
        let args = self.lower_all(&new.args)?;
        let ctor = Arc::clone(&new.ctor);
        Ok(closure(move |env| Ok(ctor.construct(&run_all(&args, env)?)?)))
    }

    fn visit_new_array(&mut self, _expr: &Expr, array: &NewArray) -> Self::Output {
        let items = self.lower_all(&array.items)?;
        let element = array.element.clone();
        Ok(closure(move |env| {
            Ok(Value::array(element.clone(), run_all(&items, env)?))
        }))
    }

    fn visit_index(&mut self, _expr: &Expr, index: &Index) -> Self::Output {
        let receiver = self.lower(&index.receiver)?;
        let args = self.lower_all(&index.args)?;
        if let Some(indexer) = &index.indexer {
            let indexer = Arc::clone(indexer);
            return Ok(closure(move |env| {
                let receiver = run_receiver(Some(&receiver), env, "index access")?;
                let args = run_all(&args, env)?;
                Ok(indexer.invoke(receiver.as_ref(), &args)?)
            }));
        }
        let [slot] = <[Node; 1]>::try_from(args)
            .map_err(|_| unsupported("multi-dimensional array access"))?;
        Ok(closure(move |env| {
            let array = run_receiver(Some(&receiver), env, "index access")?.unwrap_or(Value::Null);
            operators::array_element(&array, &run(&slot, env)?)
        }))
    }

    fn visit_type_is(&mut self, _expr: &Expr, test: &TypeIs) -> Self::Output {
        let operand = self.lower(&test.operand)?;
        let target = test.target.clone();
        Ok(closure(move |env| {
            Ok(Value::Bool(type_is(&run(&operand, env)?, &target)))
        }))
    }

    fn visit_lambda(&mut self, expr: &Expr, _parts: &LambdaParts) -> Self::Output {
        let lambda = expr.clone();
        let args = self.args;
        if lambda.is_closed() {
            return Ok(closure(move |_| Ok(Value::Lambda(lambda.clone()))));
        }
        Ok(closure(move |env| {
            let mut capture = Capture { args, env };
            Ok(Value::Lambda(capture.rewrite(&lambda)))
        }))
    }

    fn visit_raise(&mut self, _expr: &Expr, raise: &Raise) -> Self::Output {
        let payload = self.lower(&raise.payload)?;
        Ok(closure(move |env| match run(&payload, env)? {
            Value::Error(error) => Err(raised(&error)),
            other => Err(unsupported(&format!("raising {other}"))),
        }))
    }

    fn visit_extension(&mut self, _expr: &Expr, ext: &Extension) -> Self::Output {
        Err(unsupported_kind(ext.kind))
    }
}

/// Quotes a nested lambda, replacing argument slots and inline-lambda
/// parameters with constants of their current values.
struct Capture<'e, 'a> {
    args: ParamId,
    env: &'e Env<'a>,
}

impl Rewriter for Capture<'_, '_> {
    fn rewrite_parameter(&mut self, expr: &Expr, param: &ParamDef) -> Expr {
        match self.env.local(param.id()) {
            Some(value) => Expr::constant(value.clone(), expr.ty().clone()),
            None => expr.clone(),
        }
    }

    fn rewrite_unary(&mut self, expr: &Expr, unary: &Unary) -> Expr {
        if unary.op == UnaryOp::Convert && unary.method.is_none() {
            let slot = arg_slot(&unary.operand, self.args);
            if let Some(value) = slot.and_then(|i| self.env.args.get(i)) {
                return Expr::constant(value.clone(), expr.ty().clone());
            }
        }
        walk_children(self, expr)
    }
}
