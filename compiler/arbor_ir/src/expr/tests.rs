use super::*;
use crate::member::MemberFlags;
use pretty_assertions::assert_eq;

#[test]
fn binary_types_follow_operands() {
    let x = Expr::parameter("x", Ty::I32);
    let nx = Expr::parameter("nx", Ty::nullable(Ty::I32));

    let sum = Expr::add(x.clone(), Expr::literal(1));
    assert_eq!(sum.ty(), &Ty::I32);

    let lifted = Expr::add(nx.clone(), Expr::convert(Expr::literal(1), Ty::nullable(Ty::I32)));
    assert_eq!(lifted.ty(), &Ty::nullable(Ty::I32));
    let ExprKind::Binary(binary) = lifted.kind() else {
        panic!("expected binary");
    };
    assert!(binary.lifting.lifted && binary.lifting.to_null);

    let null = Expr::constant(Value::Null, Ty::nullable(Ty::I32));
    let cmp = Expr::binary(BinaryOp::LessThan, nx, null);
    assert_eq!(cmp.ty(), &Ty::Bool);
    let ExprKind::Binary(binary) = cmp.kind() else {
        panic!("expected binary");
    };
    assert!(binary.lifting.lifted && !binary.lifting.to_null);
}

#[test]
fn children_follow_evaluation_order() {
    let x = Expr::parameter("x", Ty::I32);
    let method = MethodDef::builder("Max")
        .param(Ty::I32)
        .param(Ty::I32)
        .returns(Ty::I32)
        .flags(MemberFlags::STATIC)
        .build();
    let call = Expr::call(None, &method, vec![x.clone(), Expr::literal(3)]);
    let names: Vec<String> = call.children().iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["x".to_string(), "3".to_string()]);

    let lambda = Expr::lambda(LambdaParts::new(vec![x.clone()], call.clone()).unwrap());
    let children = lambda.children();
    assert_eq!(children.len(), 1);
    assert!(children[0].ptr_eq(&call));
}

#[test]
fn with_children_keeps_node_type() {
    let x = Expr::parameter("x", Ty::I64);
    let converted = Expr::convert(x, Ty::I32);
    let replaced = converted.with_children([Expr::literal(7_i64)]);
    assert_eq!(replaced.ty(), &Ty::I32);
    assert_eq!(replaced.to_string(), "Convert(7, i32)");
}

#[test]
fn map_children_returns_same_node_when_nothing_changes() {
    let tree = Expr::add(Expr::literal(1), Expr::literal(2));
    let same = tree.map_children(Clone::clone);
    assert!(same.ptr_eq(&tree));
}

#[test]
fn free_parameters_skip_bound_ones() {
    let x = Expr::parameter("x", Ty::I32);
    let y = Expr::parameter("y", Ty::I32);
    let inner = Expr::lambda(
        LambdaParts::new(vec![x.clone()], Expr::add(x.clone(), y.clone())).unwrap(),
    );
    let free = inner.free_parameters();
    assert_eq!(free.len(), 1);
    assert!(free[0].ptr_eq(&y));
    assert!(!inner.is_closed());

    let outer = Expr::lambda(LambdaParts::new(vec![y], inner).unwrap());
    assert!(outer.is_closed());
}

#[test]
fn same_name_is_not_same_parameter() {
    let x1 = Expr::parameter("x", Ty::I32);
    let x2 = Expr::parameter("x", Ty::I32);
    // Body references a different declaration of `x`.
    let lambda = Expr::lambda(LambdaParts::new(vec![x1], x2.clone()).unwrap());
    let free = lambda.free_parameters();
    assert_eq!(free.len(), 1);
    assert!(free[0].ptr_eq(&x2));
}

#[test]
fn lambda_parts_reject_bad_parameter_lists() {
    let x = Expr::parameter("x", Ty::I32);
    assert_eq!(
        LambdaParts::new(vec![Expr::literal(1)], x.clone()).unwrap_err(),
        BuildError::NotAParameter { index: 0 }
    );
    let dup = Expr::parameter("x", Ty::I64);
    assert_eq!(
        LambdaParts::new(vec![x.clone(), dup], x).unwrap_err(),
        BuildError::DuplicateParameter {
            name: "x".to_string()
        }
    );
}

#[test]
fn lambda_type_is_its_signature() {
    let a = Expr::parameter("a", Ty::I32);
    let b = Expr::parameter("b", Ty::Str);
    let positive = Expr::binary(BinaryOp::GreaterThan, a.clone(), Expr::literal(0));
    let lambda = Expr::lambda(LambdaParts::new(vec![a, b], positive).unwrap());
    assert_eq!(lambda.ty(), &Ty::func(vec![Ty::I32, Ty::Str], Ty::Bool));
    assert_eq!(lambda.to_string(), "(a, b) => (a > 0)");
}

#[test]
fn unwrap_casts_sees_through_conversions() {
    let inner = Expr::literal(true);
    let wrapped = Expr::type_as(
        Expr::convert(inner.clone(), Ty::nullable(Ty::Bool)),
        Ty::Object,
    );
    assert!(wrapped.unwrap_casts().ptr_eq(&inner));
    assert!(wrapped.is_constant_value(&Value::Bool(true)));
    assert!(!wrapped.is_constant_value(&Value::Bool(false)));
}

#[test]
fn raise_carries_its_error_as_payload() {
    let error: DeferredError = Arc::new(crate::member::HostError::new("boom"));
    let raise = Expr::raise(error, Ty::I32);
    assert_eq!(raise.ty(), &Ty::I32);
    assert_eq!(raise.node_kind(), NodeKind::Raise);
    assert_eq!(raise.to_string(), "raise(<error: boom>)");
}

#[test]
fn index_type_comes_from_element_or_indexer() {
    let arr = Expr::parameter("arr", Ty::array(Ty::Str));
    let element = Expr::index(arr, None, vec![Expr::literal(0)]);
    assert_eq!(element.ty(), &Ty::Str);

    let getter = MethodDef::builder("get_Item")
        .param(Ty::Str)
        .returns(Ty::F64)
        .build();
    let map = Expr::parameter("map", Ty::Object);
    let keyed = Expr::index(map, Some(&getter), vec![Expr::literal("k")]);
    assert_eq!(keyed.ty(), &Ty::F64);
}
