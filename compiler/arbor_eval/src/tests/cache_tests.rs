//! Compilation cache: shape sharing, constant feeding, races.

use std::sync::Arc;

use arbor_ir::{BinaryOp, ClassDef, Expr, LambdaParts, MemberDef, Ty, Value};
use rayon::prelude::*;

use super::fresh_cache;
use crate::{Backend, CacheConfig, CachedCompiler, Callable, ClosureBackend, EvalError, Evaluator};

fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

/// `i => i < lt && i > gt && i % m == r && i != ne`
fn filter(lt: i32, gt: i32, m: i32, r: i32, ne: i32) -> LambdaParts {
    let i = Expr::parameter("i", Ty::I32);
    let body = Expr::and_also(
        Expr::and_also(
            Expr::and_also(
                bin(BinaryOp::LessThan, i.clone(), Expr::literal(lt)),
                bin(BinaryOp::GreaterThan, i.clone(), Expr::literal(gt)),
            ),
            bin(
                BinaryOp::Equal,
                bin(BinaryOp::Modulo, i.clone(), Expr::literal(m)),
                Expr::literal(r),
            ),
        ),
        bin(BinaryOp::NotEqual, i.clone(), Expr::literal(ne)),
    );
    LambdaParts::single(i, body)
}

mod sharing_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn boolean_constants_share_an_entry() {
        let cache = fresh_cache();
        let yes = LambdaParts::closed(Expr::literal(true));
        let no = LambdaParts::closed(Expr::literal(false));
        assert!(!cache.is_cached(&no));
        assert_eq!(cache.evaluate_once(yes.body()).unwrap(), Value::Bool(true));
        assert!(cache.is_cached(&no));
        assert_eq!(cache.evaluate_once(no.body()).unwrap(), Value::Bool(false));
        assert_eq!(cache.compile_count(), 1);
    }

    #[test]
    fn filters_differing_in_literals_share_an_entry() {
        let cache = fresh_cache();
        let first = filter(43, 12, 3, 2, 15);
        let second = filter(42, 11, 2, 1, 14);

        let run = |lambda: &LambdaParts| -> Vec<i32> {
            let callable = cache.get_or_compile(lambda).unwrap();
            (0..50)
                .filter(|n| callable(&[Value::I32(*n)]).unwrap() == Value::Bool(true))
                .collect()
        };
        assert_eq!(run(&first), vec![14, 17, 20, 23, 26, 29, 32, 35, 38, 41]);
        assert!(cache.is_cached(&second));
        assert_eq!(run(&second), vec![13, 15, 17, 19, 21, 23, 25, 27, 29, 31, 33, 35, 37, 39, 41]);
        assert_eq!(cache.compile_count(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_shapes_get_different_entries() {
        let cache = fresh_cache();
        let add = Expr::add(Expr::literal(1), Expr::literal(2));
        let sub = bin(BinaryOp::Subtract, Expr::literal(1), Expr::literal(2));
        let wide = Expr::add(Expr::literal(1i64), Expr::literal(2i64));
        assert_eq!(cache.evaluate(&add).unwrap(), Value::I32(3));
        assert_eq!(cache.evaluate(&sub).unwrap(), Value::I32(-1));
        assert_eq!(cache.evaluate(&wide).unwrap(), Value::I64(3));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn parameter_names_are_part_of_the_shape() {
        let cache = fresh_cache();
        let x = Expr::parameter("x", Ty::I32);
        let y = Expr::parameter("y", Ty::I32);
        let by_x = LambdaParts::single(x.clone(), Expr::add(x, Expr::literal(1)));
        let by_y = LambdaParts::single(y.clone(), Expr::add(y, Expr::literal(1)));
        cache.get_or_compile(&by_x).unwrap();
        assert!(!cache.is_cached(&by_y));
    }

    #[test]
    fn member_identity_is_part_of_the_shape() {
        let class = ClassDef::builder("Box").build();
        let width = MemberDef::property("Width", Ty::I32).getter(|_| Ok(Value::I32(1))).build();
        let height = MemberDef::property("Height", Ty::I32).getter(|_| Ok(Value::I32(2))).build();
        class.add_member(&width);
        class.add_member(&height);

        let cache = fresh_cache();
        let read = |member: &Arc<MemberDef>| {
            let b = Expr::parameter("b", Ty::class(&class));
            LambdaParts::single(b.clone(), Expr::member(Some(b), member))
        };
        cache.get_or_compile(&read(&width)).unwrap();
        assert!(cache.is_cached(&read(&width)));
        assert!(!cache.is_cached(&read(&height)));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = fresh_cache();
        cache.evaluate(&Expr::literal(1)).unwrap();
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_cached(&LambdaParts::closed(Expr::literal(2))));
    }
}

mod calling_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn caller_arguments_follow_the_constants() {
        let cache = fresh_cache();
        let a = Expr::parameter("a", Ty::I32);
        let b = Expr::parameter("b", Ty::I32);
        let body = bin(
            BinaryOp::Subtract,
            bin(BinaryOp::Multiply, a.clone(), Expr::literal(10)),
            bin(BinaryOp::Add, b.clone(), Expr::literal(3)),
        );
        let lambda = LambdaParts::new(vec![a, b], body).unwrap();
        let callable = cache.get_or_compile(&lambda).unwrap();
        assert_eq!(callable(&[Value::I32(4), Value::I32(5)]).unwrap(), Value::I32(32));
    }

    #[test]
    fn arity_is_checked_against_the_lambda() {
        let cache = fresh_cache();
        let x = Expr::parameter("x", Ty::I32);
        let lambda = LambdaParts::single(x.clone(), Expr::add(x, Expr::literal(1)));
        let callable = cache.get_or_compile(&lambda).unwrap();
        assert!(matches!(
            callable(&[]),
            Err(EvalError::ArgumentCount { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn nested_lambdas_capture_their_own_constants() {
        let cache = fresh_cache();
        let make = |k: i32| {
            let y = Expr::parameter("y", Ty::I32);
            let inner = LambdaParts::single(y.clone(), Expr::add(y, Expr::literal(k)));
            LambdaParts::closed(Expr::lambda(inner))
        };
        for k in [5, 9] {
            let quoted = cache.get_or_compile(&make(k)).unwrap()(&[]).unwrap();
            let Value::Lambda(expr) = quoted else {
                panic!("expected a lambda value");
            };
            let parts = expr.as_lambda().unwrap();
            let apply = cache.get_or_compile(parts).unwrap();
            assert_eq!(apply(&[Value::I32(1)]).unwrap(), Value::I32(1 + k));
        }
        assert!(cache.is_cached(&make(100)));
    }

    #[test]
    fn backend_errors_propagate_unchanged() {
        struct Refusing;

        impl Backend for Refusing {
            fn compile(&self, _body: &Expr, _params: &[Expr]) -> Result<Callable, EvalError> {
                Err(crate::errors::unsupported("compilation"))
            }
        }

        let cache = CachedCompiler::with_backend(Arc::new(Refusing), CacheConfig::default());
        let err = cache.evaluate(&Expr::literal(1)).unwrap_err();
        assert!(matches!(err, EvalError::Unsupported { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn shallow_hash_depth_still_separates_shapes() {
        let cache = CachedCompiler::with_backend(
            Arc::new(ClosureBackend),
            CacheConfig { hash_depth: 1 },
        );
        let deep = |op| Expr::add(Expr::literal(1), bin(op, Expr::literal(2), Expr::literal(3)));
        assert_eq!(cache.evaluate(&deep(BinaryOp::Multiply)).unwrap(), Value::I32(7));
        assert_eq!(cache.evaluate(&deep(BinaryOp::Subtract)).unwrap(), Value::I32(0));
        assert_eq!(cache.len(), 2);
    }
}

mod concurrency_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn concurrent_callers_agree() {
        let cache = fresh_cache();
        let results: Vec<Value> = (0..256)
            .into_par_iter()
            .map(|n: i32| {
                let tree = Expr::add(Expr::literal(n), Expr::literal(1));
                cache.evaluate(&tree).unwrap()
            })
            .collect();
        let expected: Vec<Value> = (1..=256).map(Value::I32).collect();
        assert_eq!(results, expected);
        assert_eq!(cache.len(), 1);
        assert!(cache.compile_count() >= 1);
    }
}
