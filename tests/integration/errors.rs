mod common;

use common::Fixture;
use sclower::ast::*;
use sclower::diagnostics::LowerError;
use sclower::render_error_to_string;
use sclower::span::Span;
use sclower::types::*;

const SUPPLIER: &str = "java.util.function.Supplier";

#[test]
fn unresolved_reference_points_at_the_name() {
    let fx = Fixture::new();
    let source = "String::purr";
    let mut expr = TypedExpr::method_ref(TypedExpr::class_ref(Type::string()), "purr", Type::object(SUPPLIER));
    if let Expr::MethodReference(r) = &mut expr.node {
        r.name.span = Span::new(8, 12);
    }
    let err = fx.lower(&[], expr).unwrap_err();
    assert_eq!(err.span(), Some(Span::new(8, 12)));
    assert_eq!(
        err.to_string(),
        "Unresolved reference: Failed to find the expected method[purr()] in the type[java.lang.String]"
    );
    let report = render_error_to_string(source, &err);
    assert!(report.contains("unresolved reference error"), "{report}");
    assert!(report.contains("String::purr"), "{report}");
}

#[test]
fn constructor_reference_on_a_value_is_malformed() {
    let fx = Fixture::new();
    let receiver = TypedExpr::var("s", Type::string()).with_span(Span::new(0, 1));
    let expr = TypedExpr::method_ref(receiver, "new", Type::object(SUPPLIER));
    let err = fx.lower(&[("s", Type::string())], expr).unwrap_err();
    assert!(matches!(err, LowerError::MalformedConstructorReference { span, .. } if span == Span::new(0, 1)));
    assert!(err.to_string().contains("className::new"));
}

#[test]
fn inferred_type_must_fit_the_abstract_method() {
    let fx = Fixture::new();
    let mut expr = TypedExpr::method_ref(
        TypedExpr::class_ref(Type::object("java.lang.Integer")),
        "valueOf",
        Type::object("java.util.function.IntFunction"),
    );
    if let Expr::MethodReference(r) = &mut expr.node {
        r.inferred_params = Some(vec![Some(Type::string())]);
    }
    let err = fx.lower(&[], expr).unwrap_err();
    assert!(matches!(err, LowerError::IncompatibleInferredType { .. }), "{err}");
}

#[test]
fn unrepresentable_literal_is_unsupported() {
    let fx = Fixture::new();
    let decl = TypedExpr::declaration(
        TypedExpr::var("big", Type::object(BIG_INTEGER)),
        TypedExpr::constant(Constant::Double(f64::INFINITY), Span::new(17, 25)),
    )
    .with_span(Span::new(0, 25));
    let err = fx.lower(&[], decl).unwrap_err();
    assert!(matches!(err, LowerError::UnsupportedConversion { .. }), "{err}");
    assert_eq!(err.span(), Some(Span::new(0, 25)));
    let report = render_error_to_string("BigInteger big = 1.0/0.0", &err);
    assert!(report.contains("unsupported conversion error"), "{report}");
}

#[test]
fn untyped_operand_is_missing_type() {
    let fx = Fixture::new();
    let opaque = TypedExpr::new(Expr::Other { label: "opaque".to_string(), children: vec![] }, Span::new(0, 6));
    let expr = TypedExpr::binary(BinOp::Assign, opaque, TypedExpr::int(1));
    let err = fx.lower(&[], expr).unwrap_err();
    assert!(matches!(err, LowerError::MissingType { .. }), "{err}");
    assert_eq!(err.span(), Some(Span::new(0, 6)));
}

#[test]
fn unknown_local_is_a_codegen_error() {
    let fx = Fixture::new();
    let err = fx.lower(&[], TypedExpr::var("ghost", Type::int())).unwrap_err();
    assert!(matches!(err, LowerError::Codegen { .. }));
    assert_eq!(err.span(), None);
    let report = render_error_to_string("ghost", &err);
    assert_eq!(report, "error: unknown local variable 'ghost'\n");
}
