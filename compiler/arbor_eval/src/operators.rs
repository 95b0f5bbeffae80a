//! Built-in binary and unary operators.
//!
//! Direct dispatch on the runtime type tag of the operands. Both operands of
//! an arithmetic or comparison node have the same type once the tree is well
//! typed; shifts take an `i32` count. Null operands of lifted operators and
//! the short-circuit operators are handled by the caller.
//!
//! Integer arithmetic wraps unless the operator is a `*Checked` variant, in
//! which case overflow raises. Division and remainder always check: zero
//! divisors and `MIN / -1` fail.

use arbor_ir::{Binary, BinaryOp, Ty, UnaryOp, Value};

use crate::errors::{
    binary_overflow, division_by_zero, index_out_of_range, invalid_binary_operands,
    invalid_unary_operand, overflow, unsupported, EvalResult,
};

/// Evaluate a non-short-circuit binary operator on two non-null operands.
pub fn evaluate_binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    match (left, right) {
        (Value::I32(_) | Value::U32(_) | Value::I64(_) | Value::U64(_), Value::I32(count))
            if matches!(op, BinaryOp::LeftShift | BinaryOp::RightShift) =>
        {
            shift(op, left, *count)
        }
        (Value::I8(a), Value::I8(b)) => int_i8(op, *a, *b),
        (Value::U8(a), Value::U8(b)) => int_u8(op, *a, *b),
        (Value::I16(a), Value::I16(b)) => int_i16(op, *a, *b),
        (Value::U16(a), Value::U16(b)) => int_u16(op, *a, *b),
        (Value::I32(a), Value::I32(b)) => int_i32(op, *a, *b),
        (Value::U32(a), Value::U32(b)) => int_u32(op, *a, *b),
        (Value::I64(a), Value::I64(b)) => int_i64(op, *a, *b),
        (Value::U64(a), Value::U64(b)) => int_u64(op, *a, *b),
        (Value::F32(a), Value::F32(b)) => float_f32(op, *a, *b),
        (Value::F64(a), Value::F64(b)) => float_f64(op, *a, *b),
        (Value::Bool(a), Value::Bool(b)) => eval_bool(op, *a, *b, left, right),
        (Value::Char(a), Value::Char(b)) => compare(op, a.cmp(b), left, right),
        (Value::Str(a), Value::Str(b)) => match op {
            BinaryOp::Add => Ok(Value::str(&format!("{a}{b}"))),
            BinaryOp::Equal => Ok(Value::Bool(a == b)),
            BinaryOp::NotEqual => Ok(Value::Bool(a != b)),
            _ => Err(invalid_binary_operands(op, left, right)),
        },
        (Value::Enum { def: da, raw: a }, Value::Enum { def: db, raw: b }) if da == db => {
            compare(op, a.cmp(b), left, right)
        }
        _ => match op {
            BinaryOp::Equal => Ok(Value::Bool(left == right)),
            BinaryOp::NotEqual => Ok(Value::Bool(left != right)),
            _ => Err(invalid_binary_operands(op, left, right)),
        },
    }
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering, left: &Value, right: &Value) -> EvalResult {
    Ok(Value::Bool(match op {
        BinaryOp::Equal => ordering.is_eq(),
        BinaryOp::NotEqual => ordering.is_ne(),
        BinaryOp::LessThan => ordering.is_lt(),
        BinaryOp::LessThanOrEqual => ordering.is_le(),
        BinaryOp::GreaterThan => ordering.is_gt(),
        BinaryOp::GreaterThanOrEqual => ordering.is_ge(),
        _ => return Err(invalid_binary_operands(op, left, right)),
    }))
}

macro_rules! int_ops {
    ($($name:ident: $ty:ty => $variant:ident, $tag:expr;)*) => {
        $(
            fn $name(op: BinaryOp, a: $ty, b: $ty) -> EvalResult {
                let checked = |result: Option<$ty>| {
                    result.map(Value::$variant).ok_or_else(|| binary_overflow(op, &$tag))
                };
                match op {
                    BinaryOp::Add => Ok(Value::$variant(a.wrapping_add(b))),
                    BinaryOp::Subtract => Ok(Value::$variant(a.wrapping_sub(b))),
                    BinaryOp::Multiply => Ok(Value::$variant(a.wrapping_mul(b))),
                    BinaryOp::AddChecked => checked(a.checked_add(b)),
                    BinaryOp::SubtractChecked => checked(a.checked_sub(b)),
                    BinaryOp::MultiplyChecked => checked(a.checked_mul(b)),
                    BinaryOp::Divide if b == 0 => Err(division_by_zero()),
                    BinaryOp::Divide => checked(a.checked_div(b)),
                    BinaryOp::Modulo if b == 0 => Err(division_by_zero()),
                    BinaryOp::Modulo => checked(a.checked_rem(b)),
                    BinaryOp::And => Ok(Value::$variant(a & b)),
                    BinaryOp::Or => Ok(Value::$variant(a | b)),
                    BinaryOp::ExclusiveOr => Ok(Value::$variant(a ^ b)),
                    _ => compare(op, a.cmp(&b), &Value::$variant(a), &Value::$variant(b)),
                }
            }
        )*
    };
}

int_ops! {
    int_i8: i8 => I8, Ty::I8;
    int_u8: u8 => U8, Ty::U8;
    int_i16: i16 => I16, Ty::I16;
    int_u16: u16 => U16, Ty::U16;
    int_i32: i32 => I32, Ty::I32;
    int_u32: u32 => U32, Ty::U32;
    int_i64: i64 => I64, Ty::I64;
    int_u64: u64 => U64, Ty::U64;
}

/// Shifts mask the count to the operand width, so `1 << 33 == 2` for `i32`.
#[allow(clippy::cast_sign_loss, reason = "shift counts are masked to the operand width")]
fn shift(op: BinaryOp, value: &Value, count: i32) -> EvalResult {
    let count = count as u32;
    let left = op == BinaryOp::LeftShift;
    Ok(match *value {
        Value::I32(v) if left => Value::I32(v.wrapping_shl(count)),
        Value::I32(v) => Value::I32(v.wrapping_shr(count)),
        Value::U32(v) if left => Value::U32(v.wrapping_shl(count)),
        Value::U32(v) => Value::U32(v.wrapping_shr(count)),
        Value::I64(v) if left => Value::I64(v.wrapping_shl(count)),
        Value::I64(v) => Value::I64(v.wrapping_shr(count)),
        Value::U64(v) if left => Value::U64(v.wrapping_shl(count)),
        Value::U64(v) => Value::U64(v.wrapping_shr(count)),
        _ => return Err(invalid_binary_operands(op, value, &Value::I32(count as i32))),
    })
}

macro_rules! float_ops {
    ($($name:ident: $ty:ty => $variant:ident;)*) => {
        $(
            fn $name(op: BinaryOp, a: $ty, b: $ty) -> EvalResult {
                Ok(match op {
                    BinaryOp::Add | BinaryOp::AddChecked => Value::$variant(a + b),
                    BinaryOp::Subtract | BinaryOp::SubtractChecked => Value::$variant(a - b),
                    BinaryOp::Multiply | BinaryOp::MultiplyChecked => Value::$variant(a * b),
                    BinaryOp::Divide => Value::$variant(a / b),
                    BinaryOp::Modulo => Value::$variant(a % b),
                    BinaryOp::Power => Value::$variant(a.powf(b)),
                    // IEEE comparisons: every ordering test against NaN is false.
                    BinaryOp::Equal => Value::Bool(a == b),
                    BinaryOp::NotEqual => Value::Bool(a != b),
                    BinaryOp::LessThan => Value::Bool(a < b),
                    BinaryOp::LessThanOrEqual => Value::Bool(a <= b),
                    BinaryOp::GreaterThan => Value::Bool(a > b),
                    BinaryOp::GreaterThanOrEqual => Value::Bool(a >= b),
                    _ => {
                        return Err(invalid_binary_operands(
                            op,
                            &Value::$variant(a),
                            &Value::$variant(b),
                        ))
                    }
                })
            }
        )*
    };
}

float_ops! {
    float_f32: f32 => F32;
    float_f64: f64 => F64;
}

fn eval_bool(op: BinaryOp, a: bool, b: bool, left: &Value, right: &Value) -> EvalResult {
    Ok(Value::Bool(match op {
        BinaryOp::And | BinaryOp::AndAlso => a & b,
        BinaryOp::Or | BinaryOp::OrElse => a | b,
        BinaryOp::ExclusiveOr | BinaryOp::NotEqual => a ^ b,
        BinaryOp::Equal => a == b,
        _ => return Err(invalid_binary_operands(op, left, right)),
    }))
}

// Short-circuit and lifted results

/// Result of `left && right` once the right operand had to be evaluated,
/// i.e. `left` is `true` or null.
pub fn and_also(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Bool(true), right) => right,
        (_, Value::Bool(false)) => Value::Bool(false),
        _ => Value::Null,
    }
}

/// Result of `left || right` once `left` turned out `false` or null.
pub fn or_else(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Bool(false), right) => right,
        (_, Value::Bool(true)) => Value::Bool(true),
        _ => Value::Null,
    }
}

/// Result of a lifted operator when at least one operand is null.
pub fn lifted_null(binary: &Binary, left: &Value, right: &Value) -> Value {
    if binary.lifting.to_null {
        return Value::Null;
    }
    let both = left.is_null() && right.is_null();
    match binary.op {
        BinaryOp::Equal => Value::Bool(both),
        BinaryOp::NotEqual => Value::Bool(!both),
        _ => Value::Bool(false),
    }
}

/// Element `index` of `array`. Indices are `i32` or `i64`.
pub fn array_element(array: &Value, index: &Value) -> EvalResult {
    let Value::Array { items, .. } = array else {
        return Err(unsupported(&format!("indexing {array}")));
    };
    let index = match *index {
        Value::I32(i) => i128::from(i),
        Value::I64(i) => i128::from(i),
        _ => return Err(unsupported(&format!("array index {index}"))),
    };
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| index_out_of_range(index, items.len()))
}

// Unary

/// Evaluate a non-conversion unary operator on a non-null operand.
pub fn evaluate_unary(op: UnaryOp, operand: &Value) -> EvalResult {
    match op {
        UnaryOp::UnaryPlus => Ok(operand.clone()),
        UnaryOp::Negate => negate(operand, false),
        UnaryOp::NegateChecked => negate(operand, true),
        UnaryOp::Not => match *operand {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            _ => ones_complement(operand, op),
        },
        UnaryOp::OnesComplement => ones_complement(operand, op),
        UnaryOp::ArrayLength => match operand {
            Value::Array { items, .. } => i32::try_from(items.len())
                .map(Value::I32)
                .map_err(|_| overflow("array length")),
            _ => Err(invalid_unary_operand(op, operand)),
        },
        UnaryOp::Convert | UnaryOp::ConvertChecked | UnaryOp::TypeAs => {
            Err(invalid_unary_operand(op, operand))
        }
    }
}

fn negate(operand: &Value, checked: bool) -> EvalResult {
    macro_rules! neg {
        ($v:expr, $variant:ident, $tag:expr) => {
            if checked {
                $v.checked_neg()
                    .map(Value::$variant)
                    .ok_or_else(|| overflow(&format!("negation of {}", $tag)))
            } else {
                Ok(Value::$variant($v.wrapping_neg()))
            }
        };
    }
    match *operand {
        Value::I8(v) => neg!(v, I8, Ty::I8),
        Value::I16(v) => neg!(v, I16, Ty::I16),
        Value::I32(v) => neg!(v, I32, Ty::I32),
        Value::I64(v) => neg!(v, I64, Ty::I64),
        Value::U32(v) => neg!(v, U32, Ty::U32),
        Value::U64(v) => neg!(v, U64, Ty::U64),
        Value::F32(v) => Ok(Value::F32(-v)),
        Value::F64(v) => Ok(Value::F64(-v)),
        _ => Err(invalid_unary_operand(
            if checked { UnaryOp::NegateChecked } else { UnaryOp::Negate },
            operand,
        )),
    }
}

fn ones_complement(operand: &Value, op: UnaryOp) -> EvalResult {
    Ok(match *operand {
        Value::I8(v) => Value::I8(!v),
        Value::U8(v) => Value::U8(!v),
        Value::I16(v) => Value::I16(!v),
        Value::U16(v) => Value::U16(!v),
        Value::I32(v) => Value::I32(!v),
        Value::U32(v) => Value::U32(!v),
        Value::I64(v) => Value::I64(!v),
        Value::U64(v) => Value::U64(!v),
        _ => return Err(invalid_unary_operand(op, operand)),
    })
}
