mod common;

use common::{Fixture, eval, machine};
use num_bigint::BigInt;
use sclower::ast::*;
use sclower::interp::{Object, Value};
use sclower::types::*;

fn run_unary(op: UnaryOp, ty: Type, arg: Value) -> Option<Value> {
    let fx = Fixture::new();
    let expr = TypedExpr::unary(op, TypedExpr::var("x", ty.clone()));
    let (_, out) = eval(&fx, &[("x", ty)], expr, vec![arg]);
    out.value
}

#[test]
fn bitwise_negate_on_int_category() {
    let byte = Type::Primitive(Primitive::Byte);
    assert_eq!(run_unary(UnaryOp::BitwiseNegate, byte.clone(), Value::Int(0)), Some(Value::Int(-1)));
    assert_eq!(run_unary(UnaryOp::BitwiseNegate, byte.clone(), Value::Int(-1)), Some(Value::Int(0)));
    assert_eq!(run_unary(UnaryOp::BitwiseNegate, byte, Value::Int(127)), Some(Value::Int(-128)));
    assert_eq!(run_unary(UnaryOp::BitwiseNegate, Type::int(), Value::Int(41)), Some(Value::Int(-42)));
}

#[test]
fn bitwise_negate_on_long() {
    assert_eq!(run_unary(UnaryOp::BitwiseNegate, Type::long(), Value::Long(0)), Some(Value::Long(-1)));
    assert_eq!(run_unary(UnaryOp::BitwiseNegate, Type::long(), Value::Long(-1)), Some(Value::Long(0)));
    assert_eq!(
        run_unary(UnaryOp::BitwiseNegate, Type::long(), Value::Long(i64::MAX)),
        Some(Value::Long(i64::MIN))
    );
}

#[test]
fn bitwise_negate_on_wrapper_uses_runtime() {
    let fx = Fixture::new();
    let integer = Type::object("java.lang.Integer");
    let expr = TypedExpr::unary(UnaryOp::BitwiseNegate, TypedExpr::var("x", integer.clone()));
    let lowered = fx.lower(&[("x", integer)], expr).unwrap();
    let mut m = machine(&lowered);
    let five = m.boxed(Primitive::Int, Value::Int(5));
    let out = m.run(&lowered.code, vec![five]).unwrap();
    assert_eq!(m.int_value(out.value.unwrap()), Some(-6));
}

#[test]
fn minus_renarrows_short() {
    let short = Type::Primitive(Primitive::Short);
    assert_eq!(run_unary(UnaryOp::Minus, short.clone(), Value::Int(12)), Some(Value::Int(-12)));
    assert_eq!(run_unary(UnaryOp::Minus, short, Value::Int(-32768)), Some(Value::Int(-32768)));
}

#[test]
fn minus_on_floating_point() {
    let double = Type::Primitive(Primitive::Double);
    assert_eq!(run_unary(UnaryOp::Minus, double, Value::Double(2.5)), Some(Value::Double(-2.5)));
}

#[test]
fn minus_on_big_integer() {
    let fx = Fixture::new();
    let big = Type::object(BIG_INTEGER);
    let expr = TypedExpr::unary(UnaryOp::Minus, TypedExpr::var("x", big.clone()));
    let lowered = fx.lower(&[("x", big)], expr).unwrap();
    let mut m = machine(&lowered);
    let seven = m.alloc(Object::BigInteger(BigInt::from(7)));
    let out = m.run(&lowered.code, vec![seven]).unwrap();
    assert_eq!(m.render(out.value.unwrap()), "-7");
}

#[test]
fn plus_on_primitive_keeps_value() {
    assert_eq!(run_unary(UnaryOp::Plus, Type::int(), Value::Int(-3)), Some(Value::Int(-3)));
}

#[test]
fn not_on_boolean() {
    assert_eq!(run_unary(UnaryOp::Not, Type::boolean(), Value::Int(1)), Some(Value::Int(0)));
    assert_eq!(run_unary(UnaryOp::Not, Type::boolean(), Value::Int(0)), Some(Value::Int(1)));
}

#[test]
fn not_follows_groovy_truth() {
    let fx = Fixture::new();
    let list = Type::object(LIST);
    let expr = TypedExpr::unary(UnaryOp::Not, TypedExpr::var("xs", list.clone()));
    let lowered = fx.lower(&[("xs", list)], expr).unwrap();
    let mut m = machine(&lowered);

    let empty = m.list(vec![]);
    let one = m.list(vec![Value::Int(1)]);
    let blank = m.string("");
    for (arg, expected) in [(empty, 1), (one, 0), (Value::Null, 1), (blank, 1)] {
        let out = m.run(&lowered.code, vec![arg]).unwrap();
        assert_eq!(out.value, Some(Value::Int(expected)));
    }
}
