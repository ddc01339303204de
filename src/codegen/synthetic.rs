//! Helper methods generated into the compiled type for references the call
//! site cannot express directly, and their compilation.

use std::sync::Arc;

use tracing::debug;

use super::{EmittedCode, Emitter};
use crate::ast::{Constant, Expr, MethodCall, TypedExpr};
use crate::classes::{Access, MethodNode, Param};
use crate::context::{CompileUnit, LowerContext};
use crate::diagnostics::LowerError;
use crate::span::Span;
use crate::types::Type;

/// A generated private static method and the expression its body returns.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticUnit {
    pub method: Arc<MethodNode>,
    pub body: TypedExpr,
}

/// Compiled form of a [`SyntheticUnit`].
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCode {
    pub method: Arc<MethodNode>,
    pub code: EmittedCode,
}

fn bridge_access() -> Access {
    Access::PRIVATE | Access::STATIC | Access::FINAL | Access::SYNTHETIC
}

fn param_reads(params: &[Param]) -> Vec<TypedExpr> {
    params.iter().map(|p| TypedExpr::var(p.name.clone(), p.ty.clone())).collect()
}

/// `static T name(shape...) { new T(shape...) }`, or an array allocation
/// sized by the parameters when `target` is an array type.
pub fn constructor_bridge(name: String, owner: &Type, target: &Type, shape: &[Param]) -> SyntheticUnit {
    let params: Vec<Param> = shape
        .iter()
        .enumerate()
        .map(|(i, p)| Param::new(format!("p{i}"), p.ty.clone()))
        .collect();
    let args = param_reads(&params);
    let node = match target {
        Type::Array(component) => {
            // one size per parameter, peeling one array level each
            let mut element = (**component).clone();
            for _ in 1..args.len() {
                if let Type::Array(inner) = element {
                    element = *inner;
                }
            }
            Expr::NewArray { element, sizes: args }
        }
        _ => Expr::New { ty: target.clone(), args },
    };
    let mut method = MethodNode::new(owner, name, params, target.clone()).with_access(bridge_access());
    method.static_compile = false;
    SyntheticUnit {
        method: Arc::new(method),
        body: TypedExpr::typed(node, Span::dummy(), target.clone()),
    }
}

/// `<prefix><SelfType with '.' as '$'>$$<name>`.
pub fn extension_bridge_name(prefix: &str, host: &MethodNode) -> String {
    let self_type = host.params.first().map(|p| p.ty.to_string()).unwrap_or_default();
    format!("{}{}$${}", prefix, self_type.replace('.', "$"), host.name)
}

/// Re-invokes a static extension as `Host.name(null, args...)`, dropping the
/// self parameter from the bridge's own signature.
pub fn extension_bridge(name: String, owner: &Type, host: &Arc<MethodNode>) -> SyntheticUnit {
    let params: Vec<Param> = host.params.iter().skip(1).cloned().collect();
    let self_type = host.params.first().map(|p| p.ty.clone()).unwrap_or_else(Type::object_type);
    let mut args = vec![TypedExpr::constant(Constant::Null, Span::dummy()).with_type(self_type)];
    args.extend(param_reads(&params));
    let call = Expr::MethodCall(MethodCall {
        receiver: Box::new(TypedExpr::class_ref(host.owner.clone())),
        name: host.name.clone(),
        args,
        target: Some(host.clone()),
        safe: false,
        implicit_this: false,
    });
    let method = MethodNode::new(owner, name, params, host.return_type.clone()).with_access(bridge_access());
    SyntheticUnit {
        method: Arc::new(method),
        body: TypedExpr::typed(call, Span::dummy(), host.return_type.clone()),
    }
}

/// Emit the body of every unit generated so far.
pub fn compile_synthetics(ctx: LowerContext<'_>, unit: &mut CompileUnit) -> Result<Vec<MethodCode>, LowerError> {
    let generated = unit.generated.clone();
    let mut out = Vec::with_capacity(generated.len());
    for synthetic in generated {
        debug!(method = %synthetic.method.name, "compiling synthetic method");
        let mut emitter = Emitter::new_static(ctx, unit);
        for param in &synthetic.method.params {
            emitter.declare_local(&param.name, param.ty.clone());
        }
        emitter.emit_expr(&synthetic.body)?;
        out.push(MethodCode { method: synthetic.method.clone(), code: emitter.finish() });
    }
    Ok(out)
}
