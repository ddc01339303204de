//! Unary operators. Primitive operands get a direct instruction sequence;
//! everything else goes through the runtime's operator methods.

use tracing::debug;

use super::Emitter;
use super::insn::{Insn, Label};
use crate::ast::{Expr, TypedExpr, UnaryOp};
use crate::diagnostics::LowerError;
use crate::types::*;

fn truncation(p: Primitive) -> Option<Insn> {
    match p {
        Primitive::Byte => Some(Insn::I2B),
        Primitive::Short => Some(Insn::I2S),
        Primitive::Char => Some(Insn::I2C),
        _ => None,
    }
}

fn negation(p: Primitive) -> Option<Insn> {
    match p {
        Primitive::Byte | Primitive::Short | Primitive::Char | Primitive::Int => Some(Insn::INeg),
        Primitive::Long => Some(Insn::LNeg),
        Primitive::Float => Some(Insn::FNeg),
        Primitive::Double => Some(Insn::DNeg),
        Primitive::Boolean => None,
    }
}

impl Emitter<'_, '_> {
    /// Emit a unary expression. Never fails on its own account; errors only
    /// come from emitting the operand.
    pub fn lower_unary(&mut self, expr: &TypedExpr) -> Result<(), LowerError> {
        let Expr::Unary { op, operand } = &expr.node else {
            return Err(LowerError::codegen("lower_unary called on a non-unary node"));
        };
        match op {
            UnaryOp::Not => self.lower_not(operand),
            UnaryOp::BitwiseNegate => {
                self.emit_expr(operand)?;
                match self.stack.top().and_then(Type::primitive) {
                    Some(p @ (Primitive::Byte | Primitive::Short | Primitive::Char | Primitive::Int)) => {
                        debug!(op = "~", category = p.name(), "primitive fast path");
                        self.insns.push(Insn::IConst(-1));
                        self.insns.push(Insn::IXor);
                        self.insns.extend(truncation(p));
                        Ok(())
                    }
                    Some(Primitive::Long) => {
                        debug!(op = "~", category = "long", "primitive fast path");
                        self.insns.push(Insn::LConst(-1));
                        self.insns.push(Insn::LXor);
                        Ok(())
                    }
                    _ => self.operator_method("bitwiseNegate"),
                }
            }
            UnaryOp::Minus => {
                self.emit_expr(operand)?;
                match self.stack.top().and_then(Type::primitive) {
                    Some(p) if p.is_numeric() => {
                        debug!(op = "-", category = p.name(), "primitive fast path");
                        self.insns.extend(negation(p));
                        self.insns.extend(truncation(p));
                        Ok(())
                    }
                    _ => self.operator_method("unaryMinus"),
                }
            }
            UnaryOp::Plus => {
                self.emit_expr(operand)?;
                match self.stack.top().and_then(Type::primitive) {
                    Some(p) if p.is_numeric() => {
                        debug!(op = "+", category = p.name(), "primitive fast path");
                        Ok(())
                    }
                    _ => self.operator_method("unaryPlus"),
                }
            }
        }
    }

    fn lower_not(&mut self, operand: &TypedExpr) -> Result<(), LowerError> {
        self.emit_expr(operand)?;
        let ty = match self.resolve(operand) {
            Ok(ty) => ty,
            Err(_) => self.stack.top().cloned().unwrap_or_else(Type::object_type),
        };
        if ty.is_primitive_boolean() {
            debug!(op = "!", "primitive fast path");
            self.do_cast(&Type::boolean())?;
            self.stack.pop()?;
            let is_true = self.new_label();
            let end = self.new_label();
            self.emit_boolean_flip(is_true, end);
        } else {
            debug!(op = "!", operand = %ty, "asBoolean fallback");
            self.box_top()?;
            let desc = method_descriptor(&[Type::object_type()], &Type::boolean());
            self.insns.push(Insn::invoke_static(&Type::object(TYPE_TRANSFORMATION), "booleanUnbox", desc));
            self.stack.pop()?;
            self.insns.push(Insn::IConst(1));
            self.insns.push(Insn::IXor);
        }
        self.stack.push(Type::boolean());
        Ok(())
    }

    /// `IFNE t; ICONST_1; GOTO end; t: ICONST_0; end:`
    fn emit_boolean_flip(&mut self, is_true: Label, end: Label) {
        self.insns.push(Insn::IfNe(is_true));
        self.insns.push(Insn::IConst(1));
        self.insns.push(Insn::Goto(end));
        self.insns.push(Insn::Label(is_true));
        self.insns.push(Insn::IConst(0));
        self.insns.push(Insn::Label(end));
    }

    /// `ScriptBytecodeAdapter.<name>(Object)Object` on the boxed top operand.
    fn operator_method(&mut self, name: &str) -> Result<(), LowerError> {
        let operand = self.stack.top().cloned().unwrap_or_else(Type::object_type);
        debug!(method = name, operand = %operand, "operator method fallback");
        self.box_top()?;
        let object = Type::object_type();
        let desc = method_descriptor(&[object.clone()], &object);
        self.insns.push(Insn::invoke_static(&Type::object(BYTECODE_ADAPTER), name, desc));
        self.stack.replace(object, 1)
    }
}
