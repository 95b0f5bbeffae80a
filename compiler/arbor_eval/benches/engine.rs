#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Benchmarks for evaluating and rewriting Arbor expression trees.
//!
//! Set `RUST_LOG` (e.g. `RUST_LOG=arbor_eval=debug`) to see cache decisions
//! while a benchmark runs.

use std::hint::black_box;

use arbor_canon::simplify;
use arbor_eval::{partial_eval, CacheConfig, CachedCompiler, Compiler, Evaluator, Interpreter};
use arbor_ir::structure::{equal, hash};
use arbor_ir::{BinaryOp, Expr, LambdaParts, Ty, Value};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn init_tracing() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(EnvFilter::from_default_env())
            .try_init();
    }
}

/// `i => i < lt && i > gt && i % 3 == 2`
fn filter(lt: i32, gt: i32) -> LambdaParts {
    let i = Expr::parameter("i", Ty::I32);
    let bin = |op, l, r| Expr::binary(op, l, r);
    let body = Expr::and_also(
        Expr::and_also(
            bin(BinaryOp::LessThan, i.clone(), Expr::literal(lt)),
            bin(BinaryOp::GreaterThan, i.clone(), Expr::literal(gt)),
        ),
        bin(
            BinaryOp::Equal,
            bin(BinaryOp::Modulo, i.clone(), Expr::literal(3)),
            Expr::literal(2),
        ),
    );
    LambdaParts::single(i, body)
}

/// A left-leaning sum of `n` literals.
fn sum_chain(n: i32) -> Expr {
    (1..n).fold(Expr::literal(0), |acc, k| Expr::add(acc, Expr::literal(k)))
}

/// `x + (closed arithmetic)` repeated `n` times.
fn mixed_chain(n: i32) -> Expr {
    let x = Expr::parameter("x", Ty::I32);
    (0..n).fold(x, |acc, k| {
        let closed = Expr::binary(BinaryOp::Multiply, Expr::literal(k), Expr::literal(2));
        Expr::add(acc, closed)
    })
}

fn bench_evaluation(c: &mut Criterion) {
    init_tracing();
    let mut group = c.benchmark_group("evaluation");
    let lambda = filter(43, 12);
    let args = [Value::I32(17)];

    let interpreter = Interpreter::new();
    let compiler = Compiler::new();
    let cache = CachedCompiler::with_backend(
        std::sync::Arc::new(arbor_eval::ClosureBackend),
        CacheConfig::default(),
    );

    group.bench_function("interpret", |b| {
        b.iter(|| {
            let callable = interpreter.evaluate_lambda(black_box(&lambda)).unwrap();
            callable(&args).unwrap()
        });
    });
    group.bench_function("compile", |b| {
        b.iter(|| {
            let callable = compiler.evaluate_lambda(black_box(&lambda)).unwrap();
            callable(&args).unwrap()
        });
    });
    group.bench_function("cached", |b| {
        let mut k = 0;
        b.iter(|| {
            k = (k + 1) % 100;
            let fresh = filter(40 + k, 10);
            let callable = cache.get_or_compile(black_box(&fresh)).unwrap();
            callable(&args).unwrap()
        });
    });
    let compiled = compiler.evaluate_lambda(&lambda).unwrap();
    group.bench_function("precompiled_call", |b| {
        b.iter(|| compiled(black_box(&args)).unwrap());
    });
    group.finish();
}

fn bench_comparing(c: &mut Criterion) {
    let mut group = c.benchmark_group("comparing");
    for size in [10, 100, 1000] {
        let a = sum_chain(size);
        let b = sum_chain(size);
        group.bench_with_input(BenchmarkId::new("equal", size), &(a.clone(), b), |bench, (a, b)| {
            bench.iter(|| equal(black_box(a), black_box(b), true).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("hash_depth_5", size), &a, |bench, a| {
            bench.iter(|| hash(black_box(a), true, Some(5)));
        });
        group.bench_with_input(BenchmarkId::new("hash_full", size), &a, |bench, a| {
            bench.iter(|| hash(black_box(a), true, None));
        });
    }
    group.finish();
}

fn bench_partial(c: &mut Criterion) {
    let mut group = c.benchmark_group("partial");
    let interpreter = Interpreter::new();
    let cache = CachedCompiler::with_backend(
        std::sync::Arc::new(arbor_eval::ClosureBackend),
        CacheConfig::default(),
    );
    for size in [10, 100] {
        let tree = mixed_chain(size);
        group.bench_with_input(BenchmarkId::new("interpreter", size), &tree, |b, tree| {
            b.iter(|| partial_eval(&interpreter, black_box(tree)));
        });
        group.bench_with_input(BenchmarkId::new("cached", size), &tree, |b, tree| {
            b.iter(|| partial_eval(&cache, black_box(tree)));
        });
    }
    group.finish();
}

fn bench_simplifying(c: &mut Criterion) {
    let mut group = c.benchmark_group("simplifying");
    let x = Expr::parameter("x", Ty::Bool);
    let tree = (0..100).fold(x, |acc, k| {
        let side = Expr::literal(k % 2 == 0);
        if k % 3 == 0 {
            Expr::and_also(side, acc)
        } else {
            Expr::or_else(acc, side)
        }
    });
    group.bench_function("boolean_chain", |b| {
        b.iter(|| simplify(black_box(&tree)));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_evaluation,
    bench_comparing,
    bench_partial,
    bench_simplifying,
);
criterion_main!(benches);
