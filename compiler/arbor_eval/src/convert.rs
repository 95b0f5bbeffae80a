//! `Convert`, `ConvertChecked`, `TypeAs` and `TypeIs`.
//!
//! Numeric conversions go through an `i128` view for integral sources (enums
//! and chars included) and an `f64` view for floating-point sources.
//! Unchecked narrowing truncates to the low bits; checked narrowing raises
//! overflow when the value does not fit. Floating-point to integral
//! conversion truncates toward zero.
//!
//! A value-type target reached from a reference-typed source (`object`, a
//! class) is an unboxing: the value must already have exactly that type.
//! Null converts to any type that admits null and fails for value types.

use std::sync::Arc;

use arbor_ir::{Ty, Value};

use crate::errors::{conversion_overflow, invalid_cast, EvalResult};

/// Convert `value`, statically typed `source`, to `target`.
pub fn convert(value: Value, source: &Ty, target: &Ty, checked: bool) -> EvalResult {
    if let Ty::Nullable(inner) = target {
        if value.is_null() {
            return Ok(Value::Null);
        }
        return convert(value, source.non_nullable(), inner, checked);
    }
    if value.is_null() {
        return if target.can_be_null() {
            Ok(Value::Null)
        } else {
            Err(invalid_cast(&value, target))
        };
    }
    if !target.is_value_type() {
        return if value.is_instance_of(target) {
            Ok(value)
        } else {
            Err(invalid_cast(&value, target))
        };
    }
    if !source.non_nullable().is_value_type() {
        return unbox(value, target);
    }
    convert_value(value, target, checked)
}

/// `value as target`: the value itself when it is an instance, else null.
pub fn type_as(value: Value, target: &Ty) -> Value {
    if value.is_instance_of(target) {
        value
    } else {
        Value::Null
    }
}

/// `value is target`: non-null and an instance.
pub fn type_is(value: &Value, target: &Ty) -> bool {
    !value.is_null() && value.is_instance_of(target)
}

fn unbox(value: Value, target: &Ty) -> EvalResult {
    match value.runtime_ty() {
        Some(ty) if &ty == target => Ok(value),
        _ => Err(invalid_cast(&value, target)),
    }
}

fn convert_value(value: Value, target: &Ty, checked: bool) -> EvalResult {
    if value.runtime_ty().as_ref() == Some(target) {
        return Ok(value);
    }
    match target {
        Ty::Enum(def) => {
            let raw = convert_value(value, def.underlying(), checked)?;
            let raw = raw.as_i128().and_then(|raw| i64::try_from(raw).ok());
            match raw {
                Some(raw) => Ok(Value::Enum {
                    def: Arc::clone(def),
                    raw,
                }),
                None => Err(invalid_cast(&Value::Null, target)),
            }
        }
        Ty::F32 | Ty::F64 => to_float(&value, target),
        _ if target.is_integral() || *target == Ty::Char => match value {
            Value::F32(_) | Value::F64(_) => float_to_integral(&value, target, checked),
            _ => match value.as_i128() {
                Some(raw) => integral(raw, &value, target, checked),
                None => Err(invalid_cast(&value, target)),
            },
        },
        _ => Err(invalid_cast(&value, target)),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "float conversions round to the nearest representable value"
)]
fn to_float(value: &Value, target: &Ty) -> EvalResult {
    let wide = match *value {
        Value::F32(v) => f64::from(v),
        Value::F64(v) => v,
        _ => match value.as_i128() {
            Some(raw) => raw as f64,
            None => return Err(invalid_cast(value, target)),
        },
    };
    Ok(match target {
        Ty::F32 => Value::F32(wide as f32),
        _ => Value::F64(wide),
    })
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "truncation toward zero, range checked when `checked`"
)]
fn float_to_integral(value: &Value, target: &Ty, checked: bool) -> EvalResult {
    let wide = value.as_f64().unwrap_or(f64::NAN);
    if checked && !wide.is_finite() {
        return Err(conversion_overflow(value, target));
    }
    // `as i128` saturates; every supported integral target fits inside i128.
    let raw = wide.trunc() as i128;
    if checked {
        return integral(raw, value, target, true);
    }
    // Unchecked float narrowing saturates at the target bounds.
    integral(raw.clamp(min_of(target), max_of(target)), value, target, false)
}

macro_rules! bounds {
    ($target:expr, $f:ident) => {
        match $target {
            Ty::I8 => i128::from(i8::$f),
            Ty::U8 => i128::from(u8::$f),
            Ty::I16 => i128::from(i16::$f),
            Ty::U16 | Ty::Char => i128::from(u16::$f),
            Ty::I32 => i128::from(i32::$f),
            Ty::U32 => i128::from(u32::$f),
            Ty::I64 => i128::from(i64::$f),
            _ => i128::from(u64::$f),
        }
    };
}

fn min_of(target: &Ty) -> i128 {
    bounds!(target, MIN)
}

fn max_of(target: &Ty) -> i128 {
    bounds!(target, MAX)
}

/// Integral-to-integral conversion from the `i128` view.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "unchecked conversions keep the low bits"
)]
fn integral(raw: i128, value: &Value, target: &Ty, checked: bool) -> EvalResult {
    if checked && !(min_of(target)..=max_of(target)).contains(&raw) {
        return Err(conversion_overflow(value, target));
    }
    Ok(match target {
        Ty::I8 => Value::I8(raw as i8),
        Ty::U8 => Value::U8(raw as u8),
        Ty::I16 => Value::I16(raw as i16),
        Ty::U16 => Value::U16(raw as u16),
        Ty::I32 => Value::I32(raw as i32),
        Ty::U32 => Value::U32(raw as u32),
        Ty::I64 => Value::I64(raw as i64),
        Ty::U64 => Value::U64(raw as u64),
        // Surrogate code units have no `char`.
        Ty::Char => match char::from_u32(u32::from(raw as u16)) {
            Some(c) => Value::Char(c),
            None => return Err(invalid_cast(value, target)),
        },
        _ => return Err(invalid_cast(value, target)),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;
    use arbor_ir::EnumDef;
    use pretty_assertions::assert_eq;

    fn unchecked(value: Value, target: &Ty) -> EvalResult {
        let source = value.runtime_ty().unwrap_or(Ty::Object);
        convert(value, &source, target, false)
    }

    fn checked(value: Value, target: &Ty) -> EvalResult {
        let source = value.runtime_ty().unwrap_or(Ty::Object);
        convert(value, &source, target, true)
    }

    #[test]
    fn unchecked_narrowing_keeps_low_bits() {
        assert_eq!(unchecked(Value::I32(300), &Ty::U8).ok(), Some(Value::U8(44)));
        assert_eq!(unchecked(Value::I32(-1), &Ty::U32).ok(), Some(Value::U32(u32::MAX)));
        assert_eq!(
            unchecked(Value::I64(i64::from(i32::MAX) + 1), &Ty::I32).ok(),
            Some(Value::I32(i32::MIN))
        );
    }

    #[test]
    fn checked_narrowing_overflows() {
        assert!(checked(Value::I32(300), &Ty::U8).unwrap_err().is_overflow());
        assert!(checked(Value::I32(-1), &Ty::U32).unwrap_err().is_overflow());
        assert_eq!(checked(Value::I32(255), &Ty::U8).ok(), Some(Value::U8(255)));
    }

    #[test]
    fn char_targets_keep_sixteen_bits_but_reject_surrogates() {
        assert_eq!(unchecked(Value::I32(0x1_0041), &Ty::Char).ok(), Some(Value::Char('A')));
        assert!(unchecked(Value::I32(0xD800), &Ty::Char).unwrap_err().is_invalid_cast());
        assert!(unchecked(Value::I32(0x1_DFFF), &Ty::Char).unwrap_err().is_invalid_cast());
        assert_eq!(checked(Value::I32(0xE000), &Ty::Char).ok(), Some(Value::Char('\u{E000}')));
    }

    #[test]
    fn float_to_int_truncates_toward_zero() {
        assert_eq!(unchecked(Value::F64(-2.9), &Ty::I32).ok(), Some(Value::I32(-2)));
        assert!(checked(Value::F64(1e20), &Ty::I32).unwrap_err().is_overflow());
        assert!(checked(Value::F64(f64::NAN), &Ty::I64).unwrap_err().is_overflow());
    }

    #[test]
    fn null_needs_a_nullable_target() {
        assert!(convert(Value::Null, &Ty::Object, &Ty::I32, false)
            .unwrap_err()
            .is_invalid_cast());
        assert_eq!(
            convert(Value::Null, &Ty::nullable(Ty::I32), &Ty::nullable(Ty::I64), false).ok(),
            Some(Value::Null)
        );
        assert_eq!(
            convert(Value::Null, &Ty::Object, &Ty::Str, false).ok(),
            Some(Value::Null)
        );
    }

    #[test]
    fn nullable_to_plain_unwraps() {
        let value = convert(Value::I32(7), &Ty::nullable(Ty::I32), &Ty::I32, false);
        assert_eq!(value.ok(), Some(Value::I32(7)));
    }

    #[test]
    fn unboxing_requires_the_exact_type() {
        assert_eq!(
            convert(Value::I32(1), &Ty::Object, &Ty::I32, false).ok(),
            Some(Value::I32(1))
        );
        assert!(convert(Value::I64(1), &Ty::Object, &Ty::I32, false)
            .unwrap_err()
            .is_invalid_cast());
    }

    #[test]
    fn enums_convert_through_their_underlying_type() {
        let color = EnumDef::new("Color", &["Red", "Green", "Blue"]);
        let blue = Value::variant(&color, "Blue").unwrap();
        assert_eq!(unchecked(blue, &Ty::I64).ok(), Some(Value::I64(2)));
        let back = unchecked(Value::I32(1), &Ty::Enum(Arc::clone(&color))).unwrap();
        assert_eq!(back, Value::variant(&color, "Green").unwrap());
        let nullable = convert(
            Value::variant(&color, "Red").unwrap(),
            &Ty::nullable(Ty::Enum(Arc::clone(&color))),
            &Ty::nullable(Ty::I32),
            false,
        );
        assert_eq!(nullable.ok(), Some(Value::I32(0)));
    }

    #[test]
    fn reference_conversions_check_instances() {
        assert_eq!(unchecked(Value::str("s"), &Ty::Object).ok(), Some(Value::str("s")));
        assert!(convert(Value::I32(1), &Ty::Object, &Ty::Str, false)
            .unwrap_err()
            .is_invalid_cast());
    }

    #[test]
    fn type_as_and_type_is() {
        assert_eq!(type_as(Value::I32(1), &Ty::Str), Value::Null);
        assert_eq!(type_as(Value::I32(1), &Ty::nullable(Ty::I32)), Value::I32(1));
        assert!(type_is(&Value::I32(1), &Ty::nullable(Ty::I32)));
        assert!(!type_is(&Value::Null, &Ty::nullable(Ty::I32)));
    }
}
