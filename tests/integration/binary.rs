mod common;

use std::sync::Arc;

use common::{Fixture, eval, machine};
use sclower::ast::*;
use sclower::classes::{ClassInfo, MethodNode};
use sclower::interp::{Object, Value};
use sclower::resolve::MethodFinder;
use sclower::resolve::ClassTableFinder;
use sclower::span::Span;
use sclower::types::*;

fn string_lit(s: &str) -> TypedExpr {
    TypedExpr::constant(Constant::String(s.to_string()), Span::dummy())
}

fn tuple(items: Vec<TypedExpr>) -> TypedExpr {
    TypedExpr::new(Expr::Tuple(items), Span::dummy())
}

fn list(items: Vec<TypedExpr>) -> TypedExpr {
    TypedExpr::new(Expr::List(items), Span::dummy())
}

fn with_target(mut expr: TypedExpr, method: MethodNode, name: &str) -> TypedExpr {
    if let Expr::Binary(bin) = &mut expr.node {
        bin.target = Some(BinaryTarget { method: Arc::new(method), name: name.to_string() });
    }
    expr
}

fn compare_to(a: TypedExpr, b: TypedExpr, on: &Type) -> TypedExpr {
    let method = MethodNode::new(on, "compareTo", vec![], Type::int());
    with_target(TypedExpr::binary(BinOp::CompareTo, a, b), method, "compareTo")
}

#[test]
fn multiple_assignment_swaps() {
    let fx = Fixture::new();
    let a = || TypedExpr::var("a", Type::int());
    let b = || TypedExpr::var("b", Type::int());
    let swap = TypedExpr::binary(BinOp::Assign, tuple(vec![a(), b()]), list(vec![b(), a()]));
    let locals = [("a", Type::int()), ("b", Type::int())];
    for (x, y) in [(1, 2), (-7, 7), (0, i32::MAX)] {
        let (_, out) = eval(&fx, &locals, swap.clone(), vec![Value::Int(x), Value::Int(y)]);
        assert_eq!(&out.locals[..2], &[Value::Int(y), Value::Int(x)]);
    }
}

#[test]
fn multiple_assignment_of_strings_swaps() {
    let fx = Fixture::new();
    let s = Type::string();
    let a = || TypedExpr::var("a", Type::string());
    let b = || TypedExpr::var("b", Type::string());
    let swap = TypedExpr::binary(BinOp::Assign, tuple(vec![a(), b()]), list(vec![b(), a()]));
    let lowered = fx.lower(&[("a", s.clone()), ("b", s)], swap).unwrap();
    let mut m = machine(&lowered);
    let (first, second) = (m.string("left"), m.string("right"));
    let out = m.run(&lowered.code, vec![first, second]).unwrap();
    assert_eq!(m.render(out.locals[0]), "right");
    assert_eq!(m.render(out.locals[1]), "left");
}

#[test]
fn declaring_tuple_binds_in_order() {
    let fx = Fixture::new();
    let mut bin = BinaryExpr::new(
        BinOp::Assign,
        tuple(vec![TypedExpr::var("x", Type::int()), TypedExpr::var("y", Type::int())]),
        list(vec![TypedExpr::int(10), TypedExpr::int(20), TypedExpr::int(30)]),
    );
    bin.declaration = true;
    let (_, out) = eval(&fx, &[], TypedExpr::new(Expr::Binary(bin), Span::dummy()), vec![]);
    assert_eq!(out.locals, vec![Value::Int(10), Value::Int(20)]);
    assert_eq!(out.value, Some(Value::Int(20)));
}

fn declare(ty: Type, value: Constant) -> TypedExpr {
    TypedExpr::declaration(TypedExpr::var("n", ty), TypedExpr::constant(value, Span::dummy()))
}

#[test]
fn numeric_declarations_take_the_declared_kind() {
    let fx = Fixture::new();
    let cases = [
        (Type::Primitive(Primitive::Byte), Constant::Int(300), Value::Int(44)),
        (Type::Primitive(Primitive::Byte), Constant::Int(-129), Value::Int(127)),
        (Type::Primitive(Primitive::Short), Constant::Int(70000), Value::Int(4464)),
        (Type::int(), Constant::Long(1 << 33), Value::Int(0)),
        (Type::int(), Constant::Double(3.9), Value::Int(3)),
        (Type::int(), Constant::Double(1e20), Value::Int(i32::MAX)),
        (Type::long(), Constant::Int(-5), Value::Long(-5)),
        (Type::Primitive(Primitive::Float), Constant::Int(1), Value::Float(1.0)),
        (Type::Primitive(Primitive::Double), Constant::Float(0.5), Value::Double(0.5)),
    ];
    for (ty, value, expected) in cases {
        let (_, out) = eval(&fx, &[], declare(ty.clone(), value.clone()), vec![]);
        assert_eq!(out.value, Some(expected), "{value} as {ty}");
    }
}

#[test]
fn numeric_declarations_to_wrappers_and_big_numbers() {
    let fx = Fixture::new();
    let cases = [
        (Type::object("java.lang.Long"), Constant::Int(12), "12"),
        (Type::object("java.lang.Byte"), Constant::Int(255), "-1"),
        (Type::object(BIG_INTEGER), Constant::Int(7), "7"),
        (Type::object(BIG_INTEGER), Constant::Double(9.99), "9"),
    ];
    for (ty, value, expected) in cases {
        let (m, out) = eval(&fx, &[], declare(ty.clone(), value.clone()), vec![]);
        let result = out.value.unwrap();
        assert_eq!(m.render(result), expected, "{value} as {ty}");
    }

    let (m, out) = eval(&fx, &[], declare(Type::object(BIG_DECIMAL), Constant::Int(3)), vec![]);
    let result = out.value.unwrap();
    assert!(matches!(m.object(result), Some(Object::BigDecimal(_))));
    assert_eq!(m.long_value(result), Some(3));
}

#[test]
fn extreme_doubles_into_big_numbers() {
    let fx = Fixture::new();
    let render = |ty: &str, v: f64| {
        let (m, out) = eval(&fx, &[], declare(Type::object(ty), Constant::Double(v)), vec![]);
        let result = out.value.unwrap();
        (m.render(result), m.long_value(result))
    };

    assert_eq!(render(BIG_INTEGER, 1e-40), ("0".to_string(), Some(0)));
    assert_eq!(render(BIG_DECIMAL, 1e-40).0, format!("0.{}1", "0".repeat(39)));

    // The exact binary value of 1e300 has no bits below 2^944.
    let (digits, low) = render(BIG_INTEGER, 1e300);
    assert_eq!(digits.len(), 301);
    assert!(digits.starts_with("1000000000000000"));
    assert_eq!(low, Some(0));
    assert_eq!(render(BIG_DECIMAL, 1e300).0, format!("1{}.0", "0".repeat(300)));
}

#[test]
fn char_declaration_from_single_character_string() {
    let fx = Fixture::new();
    let decl = TypedExpr::declaration(TypedExpr::var("c", Type::char()), string_lit("z"));
    let (_, out) = eval(&fx, &[], decl, vec![]);
    assert_eq!(out.value, Some(Value::Int('z' as i32)));
}

#[test]
fn ordering_on_strings() {
    let fx = Fixture::new();
    let s = Type::string();
    let expr = compare_to(TypedExpr::var("a", s.clone()), TypedExpr::var("b", s.clone()), &s);
    let lowered = fx.lower(&[("a", s.clone()), ("b", s.clone())], expr).unwrap();
    let mut m = machine(&lowered);

    let apple = m.string("apple");
    let apricot = m.string("apricot");
    let also_apple = m.string("apple");
    let cases = [
        (apple, apple, 0),
        (apple, also_apple, 0),
        (Value::Null, Value::Null, 0),
        (Value::Null, apple, -1),
        (apple, Value::Null, 1),
        (apple, apricot, 'p' as i32 - 'r' as i32),
        (apricot, apple, 'r' as i32 - 'p' as i32),
    ];
    for (a, b, expected) in cases {
        let out = m.run(&lowered.code, vec![a, b]).unwrap();
        assert_eq!(out.value, Some(Value::Int(expected)));
    }
}

#[test]
fn ordering_on_boxed_integers() {
    let fx = Fixture::new();
    let integer = Type::object("java.lang.Integer");
    let expr = compare_to(TypedExpr::var("a", integer.clone()), TypedExpr::var("b", integer.clone()), &integer);
    let lowered = fx.lower(&[("a", integer.clone()), ("b", integer)], expr).unwrap();
    let mut m = machine(&lowered);
    let three = m.boxed(Primitive::Int, Value::Int(3));
    let nine = m.boxed(Primitive::Int, Value::Int(9));
    assert_eq!(m.run(&lowered.code, vec![three, nine]).unwrap().value, Some(Value::Int(-1)));
    assert_eq!(m.run(&lowered.code, vec![nine, three]).unwrap().value, Some(Value::Int(1)));
    assert_eq!(m.run(&lowered.code, vec![nine, Value::Null]).unwrap().value, Some(Value::Int(1)));
}

#[test]
fn membership_through_is_case() {
    let fx = Fixture::new();
    let list_type = Type::object(LIST);
    let finder = ClassTableFinder::new(&fx.classes, &fx.extensions);
    let is_case = finder
        .find_extension_methods("isCase", &list_type)
        .into_iter()
        .find(|m| m.owner.is_named(COLLECTION))
        .unwrap();
    let mut bin = BinaryExpr::new(BinOp::In, TypedExpr::var("x", Type::string()), TypedExpr::var("xs", list_type.clone()));
    bin.direct_target = Some(is_case);
    let expr = TypedExpr::new(Expr::Binary(bin), Span::dummy());
    let lowered = fx.lower(&[("x", Type::string()), ("xs", list_type)], expr).unwrap();
    let mut m = machine(&lowered);

    let (a, b, z) = (m.string("a"), m.string("b"), m.string("z"));
    let b_again = m.string("b");
    let xs = m.list(vec![a, b]);
    let cases = [
        (b_again, xs, 1),
        (z, xs, 0),
        (Value::Null, Value::Null, 1),
        (z, Value::Null, 0),
    ];
    for (x, list, expected) in cases {
        let out = m.run(&lowered.code, vec![x, list]).unwrap();
        assert_eq!(out.value, Some(Value::Int(expected)));
    }
}

#[test]
fn compound_assignment_without_target_dispatches_dynamically() {
    let fx = Fixture::new();
    let x = TypedExpr::var("x", Type::int());
    let expr = TypedExpr::binary(BinOp::PlusAssign, x, TypedExpr::int(5));
    let (_, out) = eval(&fx, &[("x", Type::int())], expr, vec![Value::Int(37)]);
    assert_eq!(out.value, Some(Value::Int(42)));
    assert_eq!(out.locals[0], Value::Int(42));
}

#[test]
fn string_plus_concatenates() {
    let fx = Fixture::new();
    let expr = TypedExpr::binary(BinOp::Plus, string_lit("n="), TypedExpr::var("n", Type::long()))
        .with_type(Type::string());
    let (m, out) = eval(&fx, &[("n", Type::long())], expr, vec![Value::Long(9)]);
    assert_eq!(m.render(out.value.unwrap()), "n=9");
}

#[test]
fn primitive_comparisons() {
    let fx = Fixture::new();
    let cases: [(BinOp, Type, Value, Value, i32); 6] = [
        (BinOp::Less, Type::int(), Value::Int(1), Value::Int(2), 1),
        (BinOp::GreaterEq, Type::int(), Value::Int(1), Value::Int(2), 0),
        (BinOp::Less, Type::long(), Value::Long(i64::MIN), Value::Long(0), 1),
        (BinOp::Equal, Type::long(), Value::Long(5), Value::Long(5), 1),
        (BinOp::Less, Type::Primitive(Primitive::Double), Value::Double(f64::NAN), Value::Double(1.0), 0),
        (BinOp::Greater, Type::Primitive(Primitive::Double), Value::Double(f64::NAN), Value::Double(1.0), 0),
    ];
    for (op, ty, a, b, expected) in cases {
        let expr = TypedExpr::binary(op, TypedExpr::var("a", ty.clone()), TypedExpr::var("b", ty.clone()));
        let (_, out) = eval(&fx, &[("a", ty.clone()), ("b", ty)], expr, vec![a, b]);
        assert_eq!(out.value, Some(Value::Int(expected)), "{a:?} {op} {b:?}");
    }
}

#[test]
fn null_comparison_is_identity() {
    let fx = Fixture::new();
    let expr = TypedExpr::binary(BinOp::Equal, TypedExpr::null(), TypedExpr::var("s", Type::string()));
    let lowered = fx.lower(&[("s", Type::string())], expr).unwrap();
    let mut m = machine(&lowered);
    let empty = m.string("");
    assert_eq!(m.run(&lowered.code, vec![Value::Null]).unwrap().value, Some(Value::Int(1)));
    assert_eq!(m.run(&lowered.code, vec![empty]).unwrap().value, Some(Value::Int(0)));
}

#[test]
fn char_literals_compare_as_chars() {
    let fx = Fixture::new();
    let target = MethodNode::new(&Type::string(), "compareTo", vec![], Type::int());
    let expr = with_target(TypedExpr::binary(BinOp::Less, string_lit("a"), string_lit("b")), target, "compareTo");
    let lowered = fx.lower(&[], expr).unwrap();
    assert!(lowered.code.insns.iter().any(|i| i.to_string().starts_with("IF_ICMP")));
    let mut m = machine(&lowered);
    assert_eq!(m.run(&lowered.code, vec![]).unwrap().value, Some(Value::Int(1)));
}

#[test]
fn equality_with_target_uses_adapter() {
    let fx = Fixture::new();
    let s = Type::string();
    let target = MethodNode::new(&Type::object_type(), "equals", vec![], Type::boolean());
    let expr = with_target(
        TypedExpr::binary(BinOp::Equal, TypedExpr::var("a", s.clone()), TypedExpr::var("b", s.clone())),
        target,
        "equals",
    );
    let lowered = fx.lower(&[("a", s.clone()), ("b", s)], expr).unwrap();
    let mut m = machine(&lowered);
    let (x, y) = (m.string("same"), m.string("same"));
    assert_eq!(m.run(&lowered.code, vec![x, y]).unwrap().value, Some(Value::Int(1)));
}

fn person_fixture() -> (Fixture, Arc<MethodNode>) {
    let mut fx = Fixture::new();
    fx.classes.insert(ClassInfo::class("demo.Person").method("setName", &[Type::string()], Type::Void));
    let setter = fx.classes.methods_named(&Type::object("demo.Person"), "setName").remove(0);
    (fx, setter)
}

fn name_of(receiver: TypedExpr, setter: &Arc<MethodNode>, safe: bool) -> TypedExpr {
    TypedExpr::typed(
        Expr::Property(PropertyExpr {
            object: Box::new(receiver),
            name: "name".to_string(),
            safe,
            setter: Some(setter.clone()),
            inferred_return: None,
        }),
        Span::dummy(),
        Type::string(),
    )
}

#[test]
fn property_assignment_calls_setter() {
    let (fx, setter) = person_fixture();
    let person = Type::object("demo.Person");
    let expr = TypedExpr::binary(BinOp::Assign, name_of(TypedExpr::var("p", person.clone()), &setter, false), string_lit("Ada"));
    let lowered = fx.lower(&[("p", person)], expr).unwrap();
    let mut m = machine(&lowered);
    let p = m.instance("demo.Person", &[]);
    let out = m.run(&lowered.code, vec![p]).unwrap();
    assert_eq!(m.render(out.value.unwrap()), "Ada");
    let name = m.field(p, "name").unwrap();
    assert_eq!(m.render(name), "Ada");
}

#[test]
fn safe_property_assignment_skips_null_receiver() {
    let (fx, setter) = person_fixture();
    let person = Type::object("demo.Person");
    let expr = TypedExpr::binary(BinOp::Assign, name_of(TypedExpr::var("p", person.clone()), &setter, true), string_lit("Ada"));
    let lowered = fx.lower(&[("p", person)], expr).unwrap();
    let mut m = machine(&lowered);
    let out = m.run(&lowered.code, vec![Value::Null]).unwrap();
    assert_eq!(m.render(out.value.unwrap()), "Ada");
}

#[test]
fn collection_assigned_to_array_is_converted() {
    let fx = Fixture::new();
    let strings = Type::array(Type::string());
    let list_type = Type::object(LIST);
    let decl = TypedExpr::declaration(TypedExpr::var("arr", strings), TypedExpr::var("xs", list_type.clone()));
    let lowered = fx.lower(&[("xs", list_type)], decl).unwrap();
    let mut m = machine(&lowered);
    let (a, b) = (m.string("a"), m.string("b"));
    let xs = m.list(vec![a, b]);
    let out = m.run(&lowered.code, vec![xs]).unwrap();
    let arr = out.value.unwrap();
    assert!(matches!(m.object(arr), Some(Object::Array { element, .. }) if *element == Type::string()));
    assert_eq!(m.render(arr), "[a, b]");

    let out = m.run(&lowered.code, vec![Value::Null]).unwrap();
    assert_eq!(out.value, Some(Value::Null));
}
