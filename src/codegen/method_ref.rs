//! Method and constructor references (`Type::name`, `expr::name`,
//! `Type::new`) lowered to a deferred call site producing an instance of
//! the target functional interface.

use std::sync::Arc;

use tracing::{debug, trace};

use super::Emitter;
use super::insn::{CallSite, Handle, HandleKind, Insn};
use super::synthetic;
use crate::ast::{Constant, Expr, MethodReference, TypedExpr};
use crate::classes::{MethodNode, Param, format_signature};
use crate::diagnostics::LowerError;
use crate::types::*;

/// Score granted per ancestry level the declaring type is away from the
/// receiver type, counted down from the receiver itself.
const PROXIMITY_LEVELS: usize = 9;
const PROXIMITY_WEIGHT: usize = 10;
const STATIC_MATCH_BONUS: usize = 9;
const EXTENSION_BONUS: usize = 100;

/// How the implementation method is reached from the call site.
struct Target {
    method: Arc<MethodNode>,
    owner: Type,
    owner_is_interface: bool,
    /// Receiver value evaluated and captured by the call site.
    capture: Option<Type>,
}

/// Instance methods named through a type take the receiver as an extra
/// leading parameter.
fn refers_through_type(method: &MethodNode, receiver_is_type: bool) -> bool {
    receiver_is_type && !method.is_static()
}

impl Emitter<'_, '_> {
    pub fn lower_reference(&mut self, expr: &TypedExpr) -> Result<(), LowerError> {
        let Expr::MethodReference(mref) = &expr.node else {
            return Err(LowerError::codegen("lower_reference called on a non-reference node"));
        };
        let iface = match &expr.ty {
            Some(ty) => ty.clone(),
            None => self.resolve(expr)?,
        };
        let Some(sam) = self.ctx.classes.find_sam(&iface) else {
            debug!(iface = %iface, name = %mref.name.node, "not a functional interface, using a method closure");
            return self.emit_method_closure(mref, &iface);
        };
        let shape = self.shape_params(&sam, mref)?;
        let target = if mref.is_constructor_reference() {
            self.constructor_target(mref, &shape)?
        } else {
            self.method_target(mref, &shape)?
        };

        let mut captured = Vec::new();
        if let Some(capture) = &target.capture {
            self.emit_expr(&mref.receiver)?;
            self.do_cast(capture)?;
            self.stack.pop()?;
            captured.push(capture.clone());
        }
        let method = &target.method;
        let kind = if method.is_static() {
            HandleKind::InvokeStatic
        } else if target.owner_is_interface {
            HandleKind::InvokeInterface
        } else {
            HandleKind::InvokeVirtual
        };
        let site = CallSite {
            name: sam.name.clone(),
            desc: method_descriptor(&captured, &iface),
            bootstrap: CallSite::metafactory_bootstrap(self.unit.is_interface),
            sam_desc: sam.descriptor(),
            implementation: Handle {
                kind,
                owner: target.owner.internal_name(),
                name: method.name.clone(),
                desc: method.descriptor(),
                is_interface: target.owner_is_interface,
            },
            instantiated_desc: method_descriptor(shape.iter().map(|p| &p.ty), &method.return_type),
        };
        debug!(
            iface = %iface,
            method = %method.signature(),
            owner = %target.owner,
            captured = captured.len(),
            "method reference call site"
        );
        self.insns.push(Insn::InvokeDynamic(site));
        self.stack.push(iface);
        Ok(())
    }

    /// Abstract method parameters with the checker's inferred types
    /// substituted, boxing or unboxing to match each parameter's kind.
    fn shape_params(&self, sam: &MethodNode, mref: &MethodReference) -> Result<Vec<Param>, LowerError> {
        let mut params = sam.params.clone();
        let Some(inferred) = &mref.inferred_params else {
            return Ok(params);
        };
        for (param, inferred) in params.iter_mut().zip(inferred) {
            let Some(inferred) = inferred else { continue };
            let exact = if param.ty.is_reference() && inferred.is_primitive() {
                inferred.wrapper()
            } else if param.ty.is_primitive() && inferred.is_reference() {
                inferred.unwrapper()
            } else {
                inferred.clone()
            };
            if !self.ctx.classes.is_assignable(&exact, &param.ty) {
                return Err(LowerError::incompatible_inferred_type(
                    format!("{} is not compatible with parameter {} of type {}", exact, param.name, param.ty),
                    mref.name.span,
                ));
            }
            param.ty = exact;
        }
        Ok(params)
    }

    fn constructor_target(&mut self, mref: &MethodReference, shape: &[Param]) -> Result<Target, LowerError> {
        let Expr::ClassRef(created) = &mref.receiver.node else {
            return Err(LowerError::malformed_constructor_reference(
                "Constructor reference must be className::new",
                mref.receiver.span,
            ));
        };
        let name = self.unit.next_ctor_ref_name(&self.ctx.config.naming.ctor_ref_prefix);
        let unit = synthetic::constructor_bridge(name, &self.unit.class, created, shape);
        debug!(bridge = %unit.method.name, created = %created, "constructor reference bridge");
        let method = self.unit.add_generated(unit);
        Ok(Target {
            method,
            owner: self.unit.class.clone(),
            owner_is_interface: self.unit.is_interface,
            capture: None,
        })
    }

    fn method_target(&mut self, mref: &MethodReference, shape: &[Param]) -> Result<Target, LowerError> {
        let receiver_is_type = matches!(mref.receiver.node, Expr::ClassRef(_));
        let receiver_type = match &mref.receiver.node {
            Expr::ClassRef(ty) => ty.clone(),
            _ => self.resolve(&mref.receiver)?,
        };
        let name = &mref.name.node;
        let method = self
            .find_reference_method(name, &receiver_type, shape, receiver_is_type)
            .ok_or_else(|| {
                LowerError::unresolved_reference(
                    format!(
                        "Failed to find the expected method[{}] in the type[{}]",
                        format_signature(name, shape.iter().map(|p| &p.ty)),
                        receiver_type
                    ),
                    mref.name.span,
                )
            })?;

        if refers_through_type(&method, receiver_is_type) {
            if let Some(first) = shape.first().filter(|p| !self.ctx.classes.is_assignable(&p.ty, &receiver_type)) {
                return Err(LowerError::incompatible_receiver(
                    format!("Invalid receiver type: {} is not compatible with {}", first.ty, receiver_type),
                    mref.receiver.span,
                ));
            }
        }

        if let Some(host) = method.extension_host().cloned() {
            if method.is_static_extension() {
                let bridge = self.extension_bridge(&host);
                return Ok(Target {
                    method: bridge,
                    owner: self.unit.class.clone(),
                    owner_is_interface: self.unit.is_interface,
                    capture: None,
                });
            }
            let capture = if receiver_is_type {
                None
            } else {
                host.params.first().map(|p| p.ty.clone())
            };
            return Ok(Target {
                owner_is_interface: self.ctx.classes.is_interface(&host.owner),
                owner: host.owner.clone(),
                method: host,
                capture,
            });
        }

        // a static method named through a value never evaluates the value
        let capture = if receiver_is_type || method.is_static() {
            None
        } else {
            Some(receiver_type.clone())
        };
        Ok(Target {
            owner_is_interface: self.ctx.classes.is_interface(&receiver_type),
            owner: receiver_type,
            method,
            capture,
        })
    }

    /// Visible methods and extensions named `name` whose parameters accept
    /// `shape`, ranked by [`Emitter::matching_score`]. The first of equally
    /// scored candidates, in search order, wins.
    fn find_reference_method(
        &self,
        name: &str,
        receiver_type: &Type,
        shape: &[Param],
        receiver_is_type: bool,
    ) -> Option<Arc<MethodNode>> {
        let finder = self.ctx.finder;
        let mut methods = finder.find_methods(name, receiver_type);
        methods.extend(finder.find_extension_methods(name, receiver_type));
        let methods = finder.filter_by_visibility(methods, &self.unit.class);

        let mut candidates: Vec<Arc<MethodNode>> = methods
            .into_iter()
            .filter(|m| self.accepts_shape(m, shape, receiver_is_type))
            .collect();
        if candidates.len() <= 1 {
            return candidates.pop();
        }
        let mut best: Option<(usize, Arc<MethodNode>)> = None;
        for candidate in candidates {
            let score = self.matching_score(&candidate, receiver_type, receiver_is_type);
            trace!(method = %candidate.signature(), owner = %candidate.owner, score, "reference candidate");
            if best.as_ref().is_none_or(|(top, _)| score > *top) {
                best = Some((score, candidate));
            }
        }
        best.map(|(score, method)| {
            debug!(method = %method.signature(), owner = %method.owner, score, "reference candidate chosen");
            method
        })
    }

    fn accepts_shape(&self, method: &MethodNode, shape: &[Param], receiver_is_type: bool) -> bool {
        let mut formals: Vec<&Type> = Vec::with_capacity(method.params.len() + 1);
        if refers_through_type(method, receiver_is_type) {
            formals.push(&method.owner);
        }
        formals.extend(method.param_types());
        formals.len() == shape.len()
            && shape.iter().zip(formals).all(|(p, formal)| self.ctx.classes.is_assignable(&p.ty, formal))
    }

    /// Proximity of the declaring type to the receiver, plus bonuses for a
    /// static/type-name agreement and for extension methods.
    fn matching_score(&self, method: &MethodNode, receiver_type: &Type, receiver_is_type: bool) -> usize {
        let classes = self.ctx.classes;
        let distance = classes
            .superclass_distance(receiver_type, &method.owner)
            .unwrap_or_else(|| classes.superclass_chain(receiver_type).len() + 1);
        let mut score = PROXIMITY_LEVELS.saturating_sub(distance) * PROXIMITY_WEIGHT;
        if receiver_is_type == method.is_static() {
            score += STATIC_MATCH_BONUS;
        }
        if method.is_extension() {
            score += EXTENSION_BONUS;
        }
        score
    }

    /// One bridge per static extension and unit; later references reuse it.
    fn extension_bridge(&mut self, host: &Arc<MethodNode>) -> Arc<MethodNode> {
        let name = synthetic::extension_bridge_name(&self.ctx.config.naming.extension_bridge_prefix, host);
        if let Some(existing) = self.unit.find_generated(&name) {
            return existing;
        }
        debug!(bridge = %name, host = %host.owner, "static extension bridge");
        let unit = synthetic::extension_bridge(name, &self.unit.class, host);
        self.unit.add_generated(unit)
    }

    /// `ScriptBytecodeAdapter.getMethodPointer(receiver, name)` for targets
    /// that are not functional interfaces.
    fn emit_method_closure(&mut self, mref: &MethodReference, target: &Type) -> Result<(), LowerError> {
        self.emit_expr(&mref.receiver)?;
        self.box_top()?;
        self.insns.push(Insn::Ldc(Constant::String(mref.name.node.clone())));
        self.stack.push(Type::string());
        let closure = Type::object(CLOSURE);
        let desc = method_descriptor(&[Type::object_type(), Type::string()], &closure);
        self.insns.push(Insn::invoke_static(&Type::object(BYTECODE_ADAPTER), "getMethodPointer", desc));
        self.stack.replace(closure, 2)?;
        self.do_cast(target)
    }
}
