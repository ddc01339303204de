// Property tests for expression lowering: every generated program is lowered
// and executed, and the result is checked against Rust's own arithmetic.

#[path = "../integration/common/mod.rs"]
mod common;

use common::{Fixture, eval, machine};
use proptest::prelude::*;
use sclower::ast::*;
use sclower::classes::MethodNode;
use sclower::interp::Value;
use sclower::span::Span;
use sclower::types::*;

fn declare(ty: Type, value: Constant) -> TypedExpr {
    TypedExpr::declaration(TypedExpr::var("n", ty), TypedExpr::constant(value, Span::dummy()))
}

fn declared_value(ty: Type, value: Constant) -> Option<Value> {
    let fx = Fixture::new();
    eval(&fx, &[], declare(ty, value), vec![]).1.value
}

// =============================================================================
// Numeric literal conversion
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// `byte b = <int>` wraps exactly like a Java narrowing cast.
    #[test]
    fn prop_byte_declaration_wraps(v in any::<i32>()) {
        let got = declared_value(Type::Primitive(Primitive::Byte), Constant::Int(v));
        prop_assert_eq!(got, Some(Value::Int(v as i8 as i32)));
    }

    #[test]
    fn prop_short_declaration_wraps(v in any::<i32>()) {
        let got = declared_value(Type::Primitive(Primitive::Short), Constant::Int(v));
        prop_assert_eq!(got, Some(Value::Int(v as i16 as i32)));
    }

    /// Floating literals saturate when truncated to `int`.
    #[test]
    fn prop_double_to_int_saturates(v in -1e12f64..1e12f64) {
        let got = declared_value(Type::int(), Constant::Double(v));
        prop_assert_eq!(got, Some(Value::Int(v as i32)));
    }

    #[test]
    fn prop_int_to_long_widens(v in any::<i32>()) {
        let got = declared_value(Type::long(), Constant::Int(v));
        prop_assert_eq!(got, Some(Value::Long(v as i64)));
    }
}

// =============================================================================
// Operators on executed code
// =============================================================================

#[test]
fn prop_bitwise_negate_matches_not() {
    let fx = Fixture::new();
    let int_code = fx.lower(&[("x", Type::int())], TypedExpr::unary(UnaryOp::BitwiseNegate, TypedExpr::var("x", Type::int()))).unwrap();
    let long_code = fx.lower(&[("x", Type::long())], TypedExpr::unary(UnaryOp::BitwiseNegate, TypedExpr::var("x", Type::long()))).unwrap();

    proptest!(|(a in any::<i32>(), b in any::<i64>())| {
        let mut m = machine(&int_code);
        let out = m.run(&int_code.code, vec![Value::Int(a)]).unwrap();
        prop_assert_eq!(out.value, Some(Value::Int(!a)));
        let out = m.run(&long_code.code, vec![Value::Long(b)]).unwrap();
        prop_assert_eq!(out.value, Some(Value::Long(!b)));
    });
}

/// `a <=> b` on boxed integers has the sign of `a.cmp(b)`; null sorts first.
#[test]
fn prop_ordering_has_comparison_sign() {
    let fx = Fixture::new();
    let integer = Type::object("java.lang.Integer");
    let mut bin = BinaryExpr::new(
        BinOp::CompareTo,
        TypedExpr::var("a", integer.clone()),
        TypedExpr::var("b", integer.clone()),
    );
    bin.target = Some(BinaryTarget {
        method: std::sync::Arc::new(MethodNode::new(&integer, "compareTo", vec![], Type::int())),
        name: "compareTo".to_string(),
    });
    let expr = TypedExpr::new(Expr::Binary(bin), Span::dummy());
    let lowered = fx.lower(&[("a", integer.clone()), ("b", integer)], expr).unwrap();

    proptest!(|(a in proptest::option::of(any::<i32>()), b in proptest::option::of(any::<i32>()))| {
        let mut m = machine(&lowered);
        let boxed_a = a.map_or(Value::Null, |v| m.boxed(Primitive::Int, Value::Int(v)));
        let boxed_b = b.map_or(Value::Null, |v| m.boxed(Primitive::Int, Value::Int(v)));
        let out = m.run(&lowered.code, vec![boxed_a, boxed_b]).unwrap();
        let expected = match a.cmp(&b) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        };
        prop_assert_eq!(out.value, Some(Value::Int(expected)));
    });
}

/// `(a, b) = [b, a]` exchanges any pair of longs.
#[test]
fn prop_swap_exchanges() {
    let fx = Fixture::new();
    let a = || TypedExpr::var("a", Type::long());
    let b = || TypedExpr::var("b", Type::long());
    let swap = TypedExpr::binary(
        BinOp::Assign,
        TypedExpr::new(Expr::Tuple(vec![a(), b()]), Span::dummy()),
        TypedExpr::new(Expr::List(vec![b(), a()]), Span::dummy()),
    );
    let lowered = fx.lower(&[("a", Type::long()), ("b", Type::long())], swap).unwrap();

    proptest!(|(x in any::<i64>(), y in any::<i64>())| {
        let mut m = machine(&lowered);
        let out = m.run(&lowered.code, vec![Value::Long(x), Value::Long(y)]).unwrap();
        prop_assert_eq!(out.locals[0], Value::Long(y));
        prop_assert_eq!(out.locals[2], Value::Long(x));
    });
}
