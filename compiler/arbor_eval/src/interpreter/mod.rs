//! Tree-walking interpreter.
//!
//! Evaluates a tree directly, without lowering it first. Each invocation of
//! an interpreted lambda gets a fresh [`Frame`] mapping the lambda's
//! parameters to their argument values.
//!
//! # Semantics
//!
//! - Operators dispatch on the runtime type tag of their operands
//!   (`operators`), conversions follow `convert`.
//! - `AndAlso`, `OrElse` and `Coalesce` evaluate the right operand only when
//!   the left one does not decide the result. Over `bool?` they follow
//!   three-valued logic: `null && false` is `false`, `null || true` is `true`.
//! - Lifted operators propagate null: arithmetic yields null, `==` is true
//!   only when both sides are null, ordering comparisons are false.
//! - A lambda node evaluates to itself as a quoted [`Value::Lambda`]. The
//!   quote is not closed over the current frame: parameters of enclosing
//!   lambdas stay free in it.
//! - Host code (methods, members, constructors, operator overloads) is reached
//!   through the [`Reflector`].
//!
//! # Errors
//!
//! The first failure to leave a node is wrapped in
//! [`EvalError::Dynamic`](crate::EvalError::Dynamic) together with that node,
//! so the error names the innermost failing subtree.

mod builder;
mod reflector;

pub use builder::InterpreterBuilder;
pub use reflector::{NativeReflector, Reflector};

use std::sync::Arc;

use arbor_ir::visitor::dispatch;
use arbor_ir::{
    ensure_sufficient_stack, Binary, BinaryOp, Call, Conditional, Expr, ExprKind, ExprVisitor,
    Extension, Index, LambdaParts, MemberAccess, New, NewArray, ParamDef, ParamId, Raise, TypeIs,
    Unary, UnaryOp, Value,
};
use rustc_hash::FxHashMap;

use crate::convert::{convert, type_as, type_is};
use crate::errors::{
    invalid_cast, null_reference, raised, unbound_parameter, unsupported, unsupported_kind,
    wrong_arg_count, EvalError, EvalResult,
};
use crate::evaluator::{ensure_closed, AdapterCache, Callable, Evaluator};
use crate::operators::{self, evaluate_binary, evaluate_unary};

/// Tree-walking evaluator.
pub struct Interpreter {
    reflector: Arc<dyn Reflector>,
    adapters: AdapterCache,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter over the native reflector.
    pub fn new() -> Self {
        InterpreterBuilder::new().build()
    }

    pub fn builder() -> InterpreterBuilder {
        InterpreterBuilder::new()
    }

    /// Evaluate `expr` with no parameters in scope.
    pub fn interpret(&self, expr: &Expr) -> EvalResult {
        Frame::new(self.reflector.as_ref(), FxHashMap::default()).eval(expr)
    }

    /// A callable that interprets the lambda's body once per call.
    pub fn interpret_lambda(&self, lambda: &LambdaParts) -> Callable {
        let reflector = Arc::clone(&self.reflector);
        let ids: Vec<ParamId> = lambda.param_ids().collect();
        let body = lambda.body().clone();
        Arc::new(move |args: &[Value]| {
            if args.len() != ids.len() {
                return Err(wrong_arg_count(ids.len(), args.len()));
            }
            let bindings = ids.iter().copied().zip(args.iter().cloned()).collect();
            Frame::new(reflector.as_ref(), bindings).eval(&body)
        })
    }
}

impl Evaluator for Interpreter {
    fn evaluate(&self, expr: &Expr) -> EvalResult {
        ensure_closed(expr)?;
        self.interpret(expr)
    }

    fn evaluate_lambda(&self, lambda: &LambdaParts) -> Result<Callable, EvalError> {
        Ok(self.interpret_lambda(lambda))
    }

    fn adapters(&self) -> &AdapterCache {
        &self.adapters
    }
}

/// Parameter bindings of one invocation.
struct Frame<'r> {
    reflector: &'r dyn Reflector,
    bindings: FxHashMap<ParamId, Value>,
}

impl<'r> Frame<'r> {
    fn new(reflector: &'r dyn Reflector, bindings: FxHashMap<ParamId, Value>) -> Self {
        Frame {
            reflector,
            bindings,
        }
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult {
        self.visit(expr)
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, EvalError> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval_receiver(
        &mut self,
        receiver: Option<&Expr>,
        what: &str,
    ) -> Result<Option<Value>, EvalError> {
        let Some(receiver) = receiver else {
            return Ok(None);
        };
        let value = self.eval(receiver)?;
        if value.is_null() {
            return Err(null_reference(what));
        }
        Ok(Some(value))
    }

    fn and_also(&mut self, binary: &Binary) -> EvalResult {
        let left = self.eval(&binary.left)?;
        if left == Value::Bool(false) {
            return Ok(left);
        }
        let right = self.eval(&binary.right)?;
        Ok(operators::and_also(left, right))
    }

    fn or_else(&mut self, binary: &Binary) -> EvalResult {
        let left = self.eval(&binary.left)?;
        if left == Value::Bool(true) {
            return Ok(left);
        }
        let right = self.eval(&binary.right)?;
        Ok(operators::or_else(left, right))
    }

    fn coalesce(&mut self, binary: &Binary) -> EvalResult {
        let left = self.eval(&binary.left)?;
        if left.is_null() {
            return self.eval(&binary.right);
        }
        match binary.conversion.as_ref().and_then(Expr::as_lambda) {
            Some(conversion) => self.apply(conversion, vec![left]),
            None => Ok(left),
        }
    }

    /// Evaluate a lambda inline, with its parameters added to this frame.
    fn apply(&mut self, lambda: &LambdaParts, args: Vec<Value>) -> EvalResult {
        if args.len() != lambda.params().len() {
            return Err(wrong_arg_count(lambda.params().len(), args.len()));
        }
        let mut bindings = self.bindings.clone();
        bindings.extend(lambda.param_ids().zip(args));
        Frame::new(self.reflector, bindings).eval(lambda.body())
    }

    fn array_element(&mut self, array: &Value, args: &[Expr]) -> EvalResult {
        let [arg] = args else {
            return Err(unsupported("multi-dimensional array access"));
        };
        let index = self.eval(arg)?;
        operators::array_element(array, &index)
    }
}

impl ExprVisitor for Frame<'_> {
    type Output = EvalResult;

    fn visit(&mut self, expr: &Expr) -> EvalResult {
        ensure_sufficient_stack(|| dispatch(self, expr)).map_err(|err| err.at(expr))
    }

    fn visit_constant(&mut self, _expr: &Expr, value: &Value) -> EvalResult {
        Ok(value.clone())
    }

    fn visit_parameter(&mut self, _expr: &Expr, param: &ParamDef) -> EvalResult {
        self.bindings
            .get(&param.id())
            .cloned()
            .ok_or_else(|| unbound_parameter(param.name()))
    }

    fn visit_binary(&mut self, _expr: &Expr, binary: &Binary) -> EvalResult {
        if let Some(method) = &binary.method {
            let left = self.eval(&binary.left)?;
            let right = self.eval(&binary.right)?;
            return self.reflector.invoke_method(method, None, &[left, right]);
        }
        match binary.op {
            BinaryOp::AndAlso => self.and_also(binary),
            BinaryOp::OrElse => self.or_else(binary),
            BinaryOp::Coalesce => self.coalesce(binary),
            op => {
                let left = self.eval(&binary.left)?;
                let right = self.eval(&binary.right)?;
                if binary.lifting.lifted && (left.is_null() || right.is_null()) {
                    return Ok(operators::lifted_null(binary, &left, &right));
                }
                evaluate_binary(op, &left, &right)
            }
        }
    }

    fn visit_unary(&mut self, expr: &Expr, unary: &Unary) -> EvalResult {
        let operand = self.eval(&unary.operand)?;
        if let Some(method) = &unary.method {
            if unary.lifted && operand.is_null() {
                return Ok(Value::Null);
            }
            return self.reflector.invoke_method(method, None, &[operand]);
        }
        match unary.op {
            UnaryOp::Convert | UnaryOp::ConvertChecked => convert(
                operand,
                unary.operand.ty(),
                expr.ty(),
                unary.op == UnaryOp::ConvertChecked,
            ),
            UnaryOp::TypeAs => Ok(type_as(operand, expr.ty())),
            _ if operand.is_null() && unary.lifted => Ok(Value::Null),
            UnaryOp::ArrayLength if operand.is_null() => Err(null_reference("array length")),
            op => evaluate_unary(op, &operand),
        }
    }

    fn visit_conditional(&mut self, _expr: &Expr, cond: &Conditional) -> EvalResult {
        match self.eval(&cond.test)? {
            Value::Bool(true) => self.eval(&cond.if_true),
            Value::Bool(false) => self.eval(&cond.if_false),
            other => Err(invalid_cast(&other, cond.test.ty())),
        }
    }

    fn visit_member(&mut self, _expr: &Expr, access: &MemberAccess) -> EvalResult {
        let context = format!("access to `{}`", access.member.name());
        let receiver = self.eval_receiver(access.receiver.as_ref(), &context)?;
        self.reflector.read_member(&access.member, receiver.as_ref())
    }

    fn visit_call(&mut self, _expr: &Expr, call: &Call) -> EvalResult {
        let context = format!("call to `{}`", call.method.name());
        let receiver = self.eval_receiver(call.receiver.as_ref(), &context)?;
        let args = self.eval_all(&call.args)?;
        self.reflector
            .invoke_method(&call.method, receiver.as_ref(), &args)
    }

    fn visit_new(&mut self, _expr: &Expr, new: &New) -> EvalResult {
        let args = self.eval_all(&new.args)?;
        self.reflector.construct(&new.ctor, &args)
    }

    fn visit_new_array(&mut self, _expr: &Expr, array: &NewArray) -> EvalResult {
        let items = self.eval_all(&array.items)?;
        Ok(Value::array(array.element.clone(), items))
    }

    fn visit_index(&mut self, _expr: &Expr, index: &Index) -> EvalResult {
        let receiver = self
            .eval_receiver(Some(&index.receiver), "index access")?
            .unwrap_or(Value::Null);
        match &index.indexer {
            Some(indexer) => {
                let args = self.eval_all(&index.args)?;
                self.reflector
                    .invoke_method(indexer, Some(&receiver), &args)
            }
            None => self.array_element(&receiver, &index.args),
        }
    }

    fn visit_type_is(&mut self, _expr: &Expr, test: &TypeIs) -> EvalResult {
        let operand = self.eval(&test.operand)?;
        Ok(Value::Bool(type_is(&operand, &test.target)))
    }

    fn visit_lambda(&mut self, expr: &Expr, _parts: &LambdaParts) -> EvalResult {
        Ok(Value::Lambda(expr.clone()))
    }

    fn visit_raise(&mut self, _expr: &Expr, raise: &Raise) -> EvalResult {
        match self.eval(&raise.payload)? {
            Value::Error(payload) => Err(raised(&payload)),
            other => Err(unsupported(&format!("raising {other}"))),
        }
    }

    fn visit_extension(&mut self, _expr: &Expr, ext: &Extension) -> EvalResult {
        Err(unsupported_kind(ext.kind))
    }
}

/// Quoted lambda held by `value`, if any.
pub(crate) fn quoted(value: &Value) -> Option<&LambdaParts> {
    match value {
        Value::Lambda(expr) => match expr.kind() {
            ExprKind::Lambda(parts) => Some(parts),
            _ => None,
        },
        _ => None,
    }
}
