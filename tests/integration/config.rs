mod common;

use std::fs;
use std::sync::Arc;

use common::{Fixture, machine};
use sclower::LowerConfig;
use sclower::ast::*;
use sclower::classes::{MethodNode, Param};
use sclower::codegen::insn::listing;
use sclower::diagnostics::LowerError;
use sclower::span::Span;
use sclower::types::Type;

#[test]
fn discover_without_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = LowerConfig::discover(dir.path()).unwrap();
    assert_eq!(config, LowerConfig::default());
}

#[test]
fn discover_reads_lower_toml() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("lower.toml"),
        "[lowering]\nbinary_adapters = false\n\n[naming]\nctor_ref_prefix = \"make$\"\n",
    )
    .unwrap();
    let config = LowerConfig::discover(dir.path()).unwrap();
    assert!(!config.lowering.binary_adapters);
    assert!(config.lowering.char_comparison);
    assert_eq!(config.naming.ctor_ref_prefix, "make$");
    assert_eq!(config.naming.temp_prefix, "$tmpVar$");
}

#[test]
fn load_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = LowerConfig::load(&path).unwrap_err();
    match err {
        LowerError::Config { path: reported, msg } => {
            assert_eq!(reported, path);
            assert!(msg.starts_with("cannot read config"));
        }
        other => panic!("expected a config error, got {other}"),
    }
}

#[test]
fn malformed_toml_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("lower.toml"), "[naming\n").unwrap();
    let err = LowerConfig::discover(dir.path()).unwrap_err();
    assert!(matches!(err, LowerError::Config { .. }));
    assert!(err.to_string().starts_with("Config error: invalid lowering config"));
}

#[test]
fn prefixes_name_generated_members() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("lower.toml"), "[naming]\nctor_ref_prefix = \"make$\"\n").unwrap();
    let mut fx = Fixture::new();
    fx.config = LowerConfig::discover(dir.path()).unwrap();

    let expr = TypedExpr::method_ref(
        TypedExpr::class_ref(Type::object("java.util.ArrayList")),
        "new",
        Type::object("java.util.function.Supplier"),
    );
    let lowered = fx.lower(&[], expr).unwrap();
    assert_eq!(lowered.synthetics[0].method.name, "make$run$0");

    let mut m = machine(&lowered);
    let out = m.run(&lowered.code, vec![]).unwrap();
    let list = m.call_functional(out.value.unwrap(), vec![]).unwrap().unwrap();
    assert_eq!(m.render(list), "[]");
}

#[test]
fn disabling_adapters_keeps_operator_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("lower.toml"), "[lowering]\nbinary_adapters = false\n").unwrap();
    let mut fx = Fixture::new();
    fx.config = LowerConfig::discover(dir.path()).unwrap();

    let s = Type::string();
    let mut bin = BinaryExpr::new(BinOp::Equal, TypedExpr::var("a", s.clone()), TypedExpr::var("b", s.clone()));
    let other = Param::new("other", Type::object_type());
    let equals = MethodNode::new(&Type::object_type(), "equals", vec![other], Type::boolean());
    bin.target = Some(BinaryTarget { method: Arc::new(equals), name: "equals".to_string() });
    let expr = TypedExpr::new(Expr::Binary(bin), Span::dummy());
    let lowered = fx.lower(&[("a", s.clone()), ("b", s)], expr).unwrap();
    let listing = listing(&lowered.code.insns);
    assert!(!listing.contains("compareEqual"), "{listing}");
    assert!(listing.contains("equals"), "{listing}");
}
