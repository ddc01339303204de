mod common;

use common::{Fixture, machine};
use sclower::ast::*;
use sclower::classes::ClassInfo;
use sclower::diagnostics::LowerError;
use sclower::interp::{InterpError, Machine, Object, Value};
use sclower::types::*;

const FUNCTION: &str = "java.util.function.Function";
const SUPPLIER: &str = "java.util.function.Supplier";

fn zoo() -> Fixture {
    let mut fx = Fixture::new();
    fx.classes.insert(ClassInfo::class("zoo.Animal").method("describe", &[], Type::string()));
    fx.classes.insert(ClassInfo::class("zoo.Cat").extends("zoo.Animal").method("name", &[], Type::string()));
    fx.extensions
        .register_instance("zoo.CatExtensions", "describe", &[Type::object("zoo.Cat")], Type::string());
    fx
}

fn cat_name(m: &mut Machine, args: Vec<Value>) -> Result<Value, InterpError> {
    m.field(args[0], "name").ok_or(InterpError::NullPointer { method: "zoo.Cat.name".to_string() })
}

fn describe_cat(m: &mut Machine, args: Vec<Value>) -> Result<Value, InterpError> {
    let name = m.field(args[0], "name").map(|v| m.render(v)).unwrap_or_default();
    Ok(m.string(&format!("cat {name}")))
}

fn animal_describe(m: &mut Machine, _args: Vec<Value>) -> Result<Value, InterpError> {
    Ok(m.string("some animal"))
}

fn through_type(ty: &Type, name: &str, iface: &str, param: Type) -> TypedExpr {
    let mut expr = TypedExpr::method_ref(TypedExpr::class_ref(ty.clone()), name, Type::object(iface));
    if let Expr::MethodReference(r) = &mut expr.node {
        r.inferred_params = Some(vec![Some(param)]);
    }
    expr
}

#[test]
fn extension_outranks_inherited_method() {
    let fx = zoo();
    let cat = Type::object("zoo.Cat");
    let lowered = fx.lower(&[], through_type(&cat, "describe", FUNCTION, cat.clone())).unwrap();
    let mut m = machine(&lowered);
    m.define("zoo.CatExtensions", "describe", describe_cat);
    m.define("zoo.Animal", "describe", animal_describe);

    let out = m.run(&lowered.code, vec![]).unwrap();
    let name = m.string("Tom");
    let tom = m.instance("zoo.Cat", &[("name", name)]);
    let result = m.call_functional(out.value.unwrap(), vec![tom]).unwrap().unwrap();
    assert_eq!(m.render(result), "cat Tom");
}

#[test]
fn bound_receiver_is_evaluated_once_and_captured() {
    let fx = zoo();
    let cat = Type::object("zoo.Cat");
    let expr = TypedExpr::method_ref(TypedExpr::var("c", cat.clone()), "name", Type::object(SUPPLIER));
    let lowered = fx.lower(&[("c", cat)], expr).unwrap();
    assert!(lowered.synthetics.is_empty());
    let mut m = machine(&lowered);
    m.define("zoo.Cat", "name", cat_name);

    let name = m.string("Felix");
    let felix = m.instance("zoo.Cat", &[("name", name)]);
    let out = m.run(&lowered.code, vec![felix]).unwrap();
    let supplier = out.value.unwrap();
    assert!(matches!(m.object(supplier), Some(Object::Lambda { captured, .. }) if captured == &vec![felix]));
    let result = m.call_functional(supplier, vec![]).unwrap().unwrap();
    assert_eq!(m.render(result), "Felix");
}

#[test]
fn constructor_references_get_one_bridge_each() {
    let fx = zoo();
    let cat = Type::object("zoo.Cat");
    let new_cat = || TypedExpr::method_ref(TypedExpr::class_ref(Type::object("zoo.Cat")), "new", Type::object(SUPPLIER));
    let mut unit = fx.unit();
    fx.lower_in(&mut unit, &[], new_cat()).unwrap();
    let lowered = fx.lower_in(&mut unit, &[], new_cat()).unwrap();
    let names: Vec<&str> = lowered.synthetics.iter().map(|s| s.method.name.as_str()).collect();
    assert_eq!(names, ["ctorRef$run$0", "ctorRef$run$1"]);
    assert!(lowered.synthetics.iter().all(|s| s.method.return_type == cat));

    let mut m = machine(&lowered);
    let out = m.run(&lowered.code, vec![]).unwrap();
    let supplier = out.value.unwrap();
    let first = m.call_functional(supplier, vec![]).unwrap().unwrap();
    let second = m.call_functional(supplier, vec![]).unwrap().unwrap();
    assert!(!m.same(first, second));
    assert!(matches!(m.object(first), Some(Object::Instance { class, .. }) if class == "zoo.Cat"));
}

#[test]
fn array_constructor_reference_takes_size() {
    let fx = Fixture::new();
    let mut expr = TypedExpr::method_ref(
        TypedExpr::class_ref(Type::array(Type::string())),
        "new",
        Type::object("java.util.function.IntFunction"),
    );
    if let Expr::MethodReference(r) = &mut expr.node {
        r.inferred_params = Some(vec![Some(Type::int())]);
    }
    let lowered = fx.lower(&[], expr).unwrap();
    let mut m = machine(&lowered);
    let out = m.run(&lowered.code, vec![]).unwrap();
    let array = m.call_functional(out.value.unwrap(), vec![Value::Int(3)]).unwrap().unwrap();
    assert!(matches!(m.object(array), Some(Object::Array { items, .. }) if items.len() == 3));
}

#[test]
fn static_extension_bridge_is_shared() {
    let fx = Fixture::new();
    let seconds = || {
        TypedExpr::method_ref(
            TypedExpr::class_ref(Type::object("java.lang.System")),
            "currentTimeSeconds",
            Type::object(SUPPLIER),
        )
    };
    let mut unit = fx.unit();
    fx.lower_in(&mut unit, &[], seconds()).unwrap();
    let lowered = fx.lower_in(&mut unit, &[], seconds()).unwrap();
    assert_eq!(lowered.synthetics.len(), 1);
    assert_eq!(lowered.synthetics[0].method.name, "dgsm$$java$lang$System$$currentTimeSeconds");

    let mut m = machine(&lowered);
    let out = m.run(&lowered.code, vec![]).unwrap();
    let now = m.call_functional(out.value.unwrap(), vec![]).unwrap().unwrap();
    assert!(m.long_value(now).is_some_and(|secs| secs > 0));
}

#[test]
fn static_method_through_type_takes_the_argument() {
    let fx = Fixture::new();
    let expr = through_type(&Type::string(), "valueOf", FUNCTION, Type::object("java.lang.Integer"));
    let lowered = fx.lower(&[], expr).unwrap();
    let mut m = machine(&lowered);
    let out = m.run(&lowered.code, vec![]).unwrap();
    let boxed = m.boxed(Primitive::Int, Value::Int(12));
    let result = m.call_functional(out.value.unwrap(), vec![boxed]).unwrap().unwrap();
    assert_eq!(m.render(result), "12");
}

#[test]
fn non_functional_target_becomes_method_pointer() {
    let fx = zoo();
    let expr = TypedExpr::method_ref(TypedExpr::var("c", Type::object("zoo.Cat")), "name", Type::object(CLOSURE));
    let lowered = fx.lower(&[("c", Type::object("zoo.Cat"))], expr).unwrap();
    let mut m = machine(&lowered);
    let tom = m.instance("zoo.Cat", &[]);
    let out = m.run(&lowered.code, vec![tom]).unwrap();
    let pointer = out.value.unwrap();
    assert!(matches!(m.object(pointer), Some(Object::MethodPointer { receiver, name }) if *receiver == tom && name == "name"));
}

#[test]
fn argument_matching_no_overload_is_unresolved() {
    let fx = zoo();
    let expr = through_type(&Type::object("zoo.Cat"), "name", FUNCTION, Type::string());
    let err = fx.lower(&[], expr).unwrap_err();
    assert!(matches!(err, LowerError::UnresolvedReference { .. }), "{err}");
}

#[test]
fn inherited_method_with_ancestor_receiver_is_rejected() {
    let mut fx = Fixture::new();
    fx.classes.insert(ClassInfo::class("zoo.Animal").method("describe", &[], Type::string()));
    fx.classes.insert(ClassInfo::class("zoo.Cat").extends("zoo.Animal"));
    let expr = through_type(&Type::object("zoo.Cat"), "describe", FUNCTION, Type::object("zoo.Animal"));
    let err = fx.lower(&[], expr).unwrap_err();
    assert!(matches!(err, LowerError::IncompatibleReceiver { .. }), "{err}");
    assert_eq!(
        err.to_string(),
        "Incompatible receiver: Invalid receiver type: zoo.Animal is not compatible with zoo.Cat"
    );
}
