//! Interpreter, compiler and cached compiler produce the same observable
//! results.

use std::mem::Discriminant;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arbor_ir::{
    BinaryOp, EnumDef, Expr, HostError, LambdaParts, MemberFlags, MethodDef, Ty, UnaryOp, Value,
};

use super::{outcome, Evaluators};
use crate::EvalError;

/// Evaluate `tree` with every evaluator, assert they agree, return the outcome.
fn agreed(evaluators: &Evaluators, tree: &Expr) -> Result<Value, Discriminant<EvalError>> {
    let results = evaluators
        .all()
        .map(|(name, evaluator)| (name, outcome(evaluator.evaluate(tree))));
    let (_, first) = results[0].clone();
    for (name, result) in &results[1..] {
        pretty_assertions::assert_eq!(*result, first, "{name} disagrees on `{tree}`");
    }
    first
}

fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

mod battery_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn arithmetic() {
        let evaluators = Evaluators::new();
        let cases = [
            (
                bin(
                    BinaryOp::Subtract,
                    bin(BinaryOp::Multiply, Expr::literal(7), Expr::literal(6)),
                    bin(BinaryOp::Divide, Expr::literal(9), Expr::literal(4)),
                ),
                Value::I32(40),
            ),
            (bin(BinaryOp::Modulo, Expr::literal(-7), Expr::literal(3)), Value::I32(-1)),
            (bin(BinaryOp::Add, Expr::literal(i32::MAX), Expr::literal(1)), Value::I32(i32::MIN)),
            (
                bin(BinaryOp::Multiply, Expr::literal(1.5f64), Expr::literal(4.0f64)),
                Value::F64(6.0),
            ),
            (bin(BinaryOp::LeftShift, Expr::literal(1i64), Expr::literal(40)), Value::I64(1 << 40)),
            (Expr::unary(UnaryOp::Negate, Expr::literal(5)), Value::I32(-5)),
            (Expr::unary(UnaryOp::OnesComplement, Expr::literal(0u8)), Value::U8(255)),
        ];
        for (tree, expected) in cases {
            assert_eq!(agreed(&evaluators, &tree), Ok(expected), "{tree}");
        }
    }

    #[test]
    fn arithmetic_failures() {
        let evaluators = Evaluators::new();
        let overflow = bin(BinaryOp::AddChecked, Expr::literal(i32::MAX), Expr::literal(1));
        let err = agreed(&evaluators, &overflow).unwrap_err();
        assert_eq!(
            err,
            std::mem::discriminant(&EvalError::Overflow {
                operation: String::new()
            })
        );
        let division = bin(BinaryOp::Divide, Expr::literal(1), Expr::literal(0));
        assert_eq!(
            agreed(&evaluators, &division),
            Err(std::mem::discriminant(&EvalError::DivideByZero))
        );
    }

    #[test]
    fn boolean_logic_and_conditionals() {
        let evaluators = Evaluators::new();
        let t = || Expr::literal(true);
        let f = || Expr::literal(false);
        let cases = [
            (Expr::and_also(t(), f()), false),
            (Expr::or_else(f(), t()), true),
            (Expr::not(Expr::and_also(t(), t())), false),
            (bin(BinaryOp::ExclusiveOr, t(), f()), true),
            (
                Expr::conditional(
                    bin(BinaryOp::LessThan, Expr::literal(2), Expr::literal(3)),
                    t(),
                    f(),
                ),
                true,
            ),
            (bin(BinaryOp::Equal, Expr::literal("ab"), Expr::literal("ab")), true),
        ];
        for (tree, expected) in cases {
            assert_eq!(agreed(&evaluators, &tree), Ok(Value::Bool(expected)), "{tree}");
        }
    }

    #[test]
    fn enum_conversions() {
        let evaluators = Evaluators::new();
        let color = EnumDef::new("Color", &["Red", "Green", "Blue"]);
        let green = Value::variant(&color, "Green").unwrap();
        let enum_ty = Ty::Enum(Arc::clone(&color));

        let to_int = Expr::convert(Expr::constant(green.clone(), enum_ty.clone()), Ty::I32);
        assert_eq!(agreed(&evaluators, &to_int), Ok(Value::I32(1)));

        let from_int = Expr::convert(Expr::literal(2), enum_ty.clone());
        let blue = Value::variant(&color, "Blue").unwrap();
        assert_eq!(agreed(&evaluators, &from_int), Ok(blue));

        let nullable = Ty::nullable(enum_ty);
        let present = Expr::convert(Expr::constant(green, nullable.clone()), Ty::nullable(Ty::I32));
        assert_eq!(agreed(&evaluators, &present), Ok(Value::I32(1)));
        let absent = Expr::convert(Expr::constant(Value::Null, nullable), Ty::nullable(Ty::I32));
        assert_eq!(agreed(&evaluators, &absent), Ok(Value::Null));
    }

    #[test]
    fn arrays() {
        let evaluators = Evaluators::new();
        let items = vec![Expr::literal(3), Expr::literal(5), Expr::literal(8)];
        let array = Expr::new_array(Ty::I32, items);
        let expected = Value::array(Ty::I32, vec![Value::I32(3), Value::I32(5), Value::I32(8)]);
        assert_eq!(agreed(&evaluators, &array), Ok(expected));

        let length = Expr::unary(UnaryOp::ArrayLength, array.clone());
        assert_eq!(agreed(&evaluators, &length), Ok(Value::I32(3)));
        let element = Expr::index(array.clone(), None, vec![Expr::literal(2i64)]);
        assert_eq!(agreed(&evaluators, &element), Ok(Value::I32(8)));
        let outside = Expr::index(array, None, vec![Expr::literal(-1)]);
        assert!(agreed(&evaluators, &outside).is_err());
    }

    #[test]
    fn lifted_arithmetic_and_coalesce() {
        let evaluators = Evaluators::new();
        let null = Expr::constant(Value::Null, Ty::nullable(Ty::I32));
        let four = Expr::constant(Value::I32(4), Ty::nullable(Ty::I32));
        assert_eq!(agreed(&evaluators, &Expr::add(null.clone(), four.clone())), Ok(Value::Null));
        assert_eq!(
            agreed(&evaluators, &Expr::add(four.clone(), four.clone())),
            Ok(Value::I32(8))
        );
        let fallback = Expr::coalesce(null, Expr::literal(9), None);
        assert_eq!(agreed(&evaluators, &fallback), Ok(Value::I32(9)));
        let kept = Expr::coalesce(four, Expr::literal(9), None);
        assert_eq!(agreed(&evaluators, &kept), Ok(Value::I32(4)));
    }

    #[test]
    fn lambdas_over_arguments() {
        let evaluators = Evaluators::new();
        let i = Expr::parameter("i", Ty::I32);
        let body = Expr::and_also(
            bin(
                BinaryOp::Equal,
                bin(BinaryOp::Modulo, i.clone(), Expr::literal(3)),
                Expr::literal(2),
            ),
            bin(BinaryOp::NotEqual, i.clone(), Expr::literal(14)),
        );
        let lambda = LambdaParts::single(i, body);
        for (name, evaluator) in evaluators.all() {
            let callable = evaluator.evaluate_lambda(&lambda).unwrap();
            let hits: Vec<i32> = (10..20)
                .filter(|n| callable(&[Value::I32(*n)]).unwrap() == Value::Bool(true))
                .collect();
            assert_eq!(hits, vec![11, 17], "{name}");
        }
    }
}

mod narrowing_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// 1, 100, 128, `i32::MAX / 2` and `i32::MAX / 2 + 42` past the maximum.
    const OFFSETS: [i64; 5] = [1, 100, 128, 1_073_741_823, 1_073_741_865];

    const TARGETS: [Ty; 5] = [Ty::I8, Ty::U8, Ty::I16, Ty::U16, Ty::I32];

    fn max_of(target: &Ty) -> i64 {
        match target {
            Ty::I8 => i64::from(i8::MAX),
            Ty::U8 => i64::from(u8::MAX),
            Ty::I16 => i64::from(i16::MAX),
            Ty::U16 => i64::from(u16::MAX),
            _ => i64::from(i32::MAX),
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "the expected values are the truncated ones"
    )]
    fn truncate(target: &Ty, v: i64) -> Value {
        match target {
            Ty::I8 => Value::I8(v as i8),
            Ty::U8 => Value::U8(v as u8),
            Ty::I16 => Value::I16(v as i16),
            Ty::U16 => Value::U16(v as u16),
            _ => Value::I32(v as i32),
        }
    }

    #[test]
    fn unchecked_narrowing_truncates_identically() {
        let evaluators = Evaluators::new();
        for target in TARGETS {
            for offset in OFFSETS {
                let source = max_of(&target) + offset;
                let tree = Expr::convert(Expr::literal(source), target.clone());
                assert_eq!(
                    agreed(&evaluators, &tree),
                    Ok(truncate(&target, source)),
                    "{source} as {target}"
                );
            }
        }
    }

    #[test]
    fn checked_narrowing_overflows_identically() {
        let evaluators = Evaluators::new();
        for target in TARGETS {
            for offset in OFFSETS {
                let source = max_of(&target) + offset;
                let tree = Expr::convert_checked(Expr::literal(source), target.clone());
                for (name, evaluator) in evaluators.all() {
                    let err = evaluator.evaluate(&tree).unwrap_err();
                    assert!(err.is_overflow(), "{name}: {source} as {target} gave {err}");
                }
            }
        }
    }

    #[test]
    fn checked_narrowing_in_range_succeeds() {
        let evaluators = Evaluators::new();
        let tree = Expr::convert_checked(Expr::literal(127i64), Ty::I8);
        assert_eq!(agreed(&evaluators, &tree), Ok(Value::I8(127)));
    }
}

mod short_circuit_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn will_throw(calls: &Arc<AtomicUsize>) -> Arc<MethodDef> {
        let calls = Arc::clone(calls);
        MethodDef::builder("WillThrow")
            .returns(Ty::Bool)
            .flags(MemberFlags::STATIC)
            .body(move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HostError::new("right operand evaluated"))
            })
            .build()
    }

    #[test]
    fn deciding_left_operand_skips_the_right() {
        let evaluators = Evaluators::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let method = will_throw(&calls);
        let throw = || Expr::call(None, &method, vec![]);

        let or_else = Expr::or_else(Expr::literal(true), throw());
        let and_also = Expr::and_also(Expr::literal(false), throw());
        for (name, evaluator) in evaluators.all() {
            assert_eq!(evaluator.evaluate(&or_else).unwrap(), Value::Bool(true), "{name}");
            assert_eq!(evaluator.evaluate(&and_also).unwrap(), Value::Bool(false), "{name}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn undecided_left_operand_runs_the_right() {
        let evaluators = Evaluators::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let method = will_throw(&calls);
        let tree = Expr::or_else(Expr::literal(false), Expr::call(None, &method, vec![]));
        for (name, evaluator) in evaluators.all() {
            let err = evaluator.evaluate(&tree).unwrap_err();
            assert!(matches!(err.root_cause(), EvalError::Host(_)), "{name}: {err}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

mod generated_tests {
    use proptest::prelude::*;

    use super::*;
    use crate::{partial_eval_lambda, Interpreter};

    fn arb_leaf() -> impl Strategy<Value = Expr> {
        prop_oneof![
            (-4_i32..4).prop_map(Expr::literal),
            Just(Expr::parameter("x", Ty::I32)),
        ]
    }

    fn arb_body() -> impl Strategy<Value = Expr> {
        let ops = prop::sample::select(vec![
            BinaryOp::Add,
            BinaryOp::Subtract,
            BinaryOp::Multiply,
            BinaryOp::Divide,
            BinaryOp::Modulo,
        ]);
        arb_leaf().prop_recursive(4, 24, 2, move |inner| {
            prop_oneof![
                (ops.clone(), inner.clone(), inner.clone()).prop_map(|(op, l, r)| bin(op, l, r)),
                inner.clone().prop_map(|x| Expr::unary(UnaryOp::Negate, x)),
                (inner.clone(), inner.clone(), inner).prop_map(|(t, a, b)| {
                    Expr::conditional(bin(BinaryOp::LessThan, t, a.clone()), a, b)
                }),
            ]
        })
    }

    /// `x => body`, sharing the parameter node the body was built with.
    fn over_x(body: Expr) -> LambdaParts {
        let x = body
            .free_parameters()
            .into_iter()
            .next()
            .unwrap_or_else(|| Expr::parameter("x", Ty::I32));
        LambdaParts::single(x, body)
    }

    proptest! {
        #[test]
        fn evaluators_agree_on_generated_lambdas(body in arb_body(), arg in -6_i32..6) {
            let evaluators = Evaluators::new();
            let lambda = over_x(body);
            let outcomes = evaluators.all().map(|(name, evaluator)| {
                let callable = evaluator.evaluate_lambda(&lambda).unwrap();
                (name, outcome(callable(&[Value::I32(arg)])))
            });
            let (_, first) = outcomes[0].clone();
            for (name, result) in outcomes.iter().skip(1) {
                prop_assert_eq!(result, &first, "{} on `{}`", name, lambda.body());
            }
        }

        #[test]
        fn folding_preserves_meaning(body in arb_body(), arg in -6_i32..6) {
            let interpreter = Interpreter::new();
            let lambda = over_x(body);
            let folded = partial_eval_lambda(&interpreter, &lambda);
            let before = interpreter.interpret_lambda(&lambda)(&[Value::I32(arg)]);
            let after = interpreter.interpret_lambda(&folded)(&[Value::I32(arg)]);
            prop_assert_eq!(
                outcome(after),
                outcome(before),
                "`{}` folded to `{}`",
                lambda.body(),
                folded.body()
            );
        }
    }
}
