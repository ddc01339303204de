#![allow(dead_code)]

use std::sync::Once;

use sclower::ast::TypedExpr;
use sclower::classes::ClassTable;
use sclower::config::LowerConfig;
use sclower::context::{CompileUnit, LowerContext};
use sclower::diagnostics::LowerError;
use sclower::interp::{Machine, Outcome, Value};
use sclower::resolve::{CheckedTypes, ClassTableFinder, ExtensionRegistry};
use sclower::types::Type;
use sclower::{LoweredCode, lower_expression};

static TRACING: Once = Once::new();

/// Route lowering logs to the test harness's captured output.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    });
}

/// Everything a lowering run reads: class table, extensions and options.
pub struct Fixture {
    pub classes: ClassTable,
    pub extensions: ExtensionRegistry,
    pub config: LowerConfig,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        Self {
            classes: ClassTable::with_builtins(),
            extensions: ExtensionRegistry::with_builtins(),
            config: LowerConfig::default(),
        }
    }

    pub fn unit(&self) -> CompileUnit {
        CompileUnit::new(Type::object("demo.Main"), "run")
    }

    pub fn lower_in(
        &self,
        unit: &mut CompileUnit,
        locals: &[(&str, Type)],
        expr: TypedExpr,
    ) -> Result<LoweredCode, LowerError> {
        let finder = ClassTableFinder::new(&self.classes, &self.extensions);
        let ctx = LowerContext::new(&self.classes, &CheckedTypes, &finder, &self.config);
        lower_expression(ctx, unit, locals, expr)
    }

    pub fn lower(&self, locals: &[(&str, Type)], expr: TypedExpr) -> Result<LoweredCode, LowerError> {
        let mut unit = self.unit();
        self.lower_in(&mut unit, locals, expr)
    }
}

/// A machine that knows the unit's synthetic methods.
pub fn machine(lowered: &LoweredCode) -> Machine {
    Machine::new(&Type::object("demo.Main"), &lowered.synthetics)
}

/// Lower `expr` with `locals` bound to `args` and run it.
pub fn eval(fixture: &Fixture, locals: &[(&str, Type)], expr: TypedExpr, args: Vec<Value>) -> (Machine, Outcome) {
    let lowered = fixture.lower(locals, expr).unwrap();
    let mut m = machine(&lowered);
    let outcome = m.run(&lowered.code, args).unwrap();
    (m, outcome)
}
