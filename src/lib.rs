pub mod span;
pub mod diagnostics;
pub mod types;
pub mod classes;
pub mod ast;
pub mod config;
pub mod resolve;
pub mod context;
pub mod transform;
pub mod codegen;
pub mod pretty;
pub mod interp;

use tracing::debug;

use ast::TypedExpr;
use codegen::synthetic::{MethodCode, compile_synthetics};
use codegen::{EmittedCode, Emitter};
use context::{CompileUnit, LowerContext};
use diagnostics::LowerError;
use transform::Transformer;
use types::Type;

pub use config::LowerConfig;
pub use diagnostics::{render_error, render_error_to_string};

/// Instructions for one expression plus the compiled bodies of every helper
/// method its unit has accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredCode {
    pub code: EmittedCode,
    pub synthetics: Vec<MethodCode>,
}

/// Lower `expr` as the body of a static method of `unit` whose parameters
/// are `locals`, in order.
///
/// Runs the tree-rewriting lowerers, emits the result and finally compiles
/// the synthetic methods registered on `unit` along the way.
pub fn lower_expression(
    ctx: LowerContext<'_>,
    unit: &mut CompileUnit,
    locals: &[(&str, Type)],
    expr: TypedExpr,
) -> Result<LoweredCode, LowerError> {
    let lowered = Transformer::new(ctx, unit).transform(expr)?;
    debug!(method = %unit.method_name, tree = %pretty::pretty_print(&lowered), "lowered tree");
    let code = {
        let mut emitter = Emitter::new_static(ctx, unit);
        for (name, ty) in locals {
            emitter.declare_local(name, ty.clone());
        }
        emitter.emit_expr(&lowered)?;
        emitter.finish()
    };
    let synthetics = compile_synthetics(ctx, unit)?;
    Ok(LoweredCode { code, synthetics })
}
