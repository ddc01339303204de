//! Tree-rewriting lowerers. These run before emission and turn checked
//! operator nodes into calls, guards and plain assignments.

pub mod binary;
pub mod numeric;

use crate::ast::{Expr, MethodCall, MethodReference, PropertyExpr, TypedExpr};
use crate::context::{CompileUnit, LowerContext};
use crate::diagnostics::LowerError;
use crate::types::Type;

pub use binary::BinaryAdapters;

/// Rewrites expression trees of one compilation unit. Temporary names come
/// from the unit, so they stay distinct across every expression lowered
/// into it.
pub struct Transformer<'a, 'u> {
    ctx: LowerContext<'a>,
    unit: &'u mut CompileUnit,
    adapters: BinaryAdapters,
}

impl<'a, 'u> Transformer<'a, 'u> {
    pub fn new(ctx: LowerContext<'a>, unit: &'u mut CompileUnit) -> Self {
        let adapters = if ctx.config.lowering.binary_adapters {
            BinaryAdapters::standard()
        } else {
            BinaryAdapters::none()
        };
        Self { ctx, unit, adapters }
    }

    /// Lower `expr` and everything below it. Binary nodes go through
    /// [`Transformer::lower_binary`]; every other node is rebuilt with
    /// lowered children.
    pub fn transform(&mut self, expr: TypedExpr) -> Result<TypedExpr, LowerError> {
        if matches!(expr.node, Expr::Binary(_)) {
            return self.lower_binary(expr);
        }
        let TypedExpr { node, span, ty } = expr;
        let node = match node {
            Expr::Property(p) => Expr::Property(PropertyExpr {
                object: self.transform_boxed(p.object)?,
                ..p
            }),
            Expr::Unary { op, operand } => Expr::Unary { op, operand: self.transform_boxed(operand)? },
            Expr::Tuple(items) => Expr::Tuple(self.transform_all(items)?),
            Expr::List(items) => Expr::List(self.transform_all(items)?),
            Expr::MethodCall(call) => Expr::MethodCall(MethodCall {
                receiver: self.transform_boxed(call.receiver)?,
                args: self.transform_all(call.args)?,
                ..call
            }),
            Expr::New { ty, args } => Expr::New { ty, args: self.transform_all(args)? },
            Expr::NewArray { element, sizes } => Expr::NewArray { element, sizes: self.transform_all(sizes)? },
            Expr::Ternary { cond, then_branch, else_branch } => Expr::Ternary {
                cond: self.transform_boxed(cond)?,
                then_branch: self.transform_boxed(then_branch)?,
                else_branch: self.transform_boxed(else_branch)?,
            },
            Expr::CompareToNull { operand, equal_to_null } => Expr::CompareToNull {
                operand: self.transform_boxed(operand)?,
                equal_to_null,
            },
            Expr::CompareIdentity { lhs, rhs } => Expr::CompareIdentity {
                lhs: self.transform_boxed(lhs)?,
                rhs: self.transform_boxed(rhs)?,
            },
            Expr::MethodReference(mref) => Expr::MethodReference(MethodReference {
                receiver: self.transform_boxed(mref.receiver)?,
                ..mref
            }),
            Expr::Sequence(items) => Expr::Sequence(self.transform_all(items)?),
            Expr::Other { label, children } => Expr::Other { label, children: self.transform_all(children)? },
            leaf @ (Expr::Constant(_) | Expr::Variable(_) | Expr::This | Expr::ClassRef(_) | Expr::Binary(_)) => leaf,
        };
        Ok(TypedExpr { node, span, ty })
    }

    fn transform_boxed(&mut self, expr: Box<TypedExpr>) -> Result<Box<TypedExpr>, LowerError> {
        Ok(Box::new(self.transform(*expr)?))
    }

    fn transform_all(&mut self, items: Vec<TypedExpr>) -> Result<Vec<TypedExpr>, LowerError> {
        items.into_iter().map(|e| self.transform(e)).collect()
    }

    fn find_type(&self, expr: &TypedExpr) -> Result<Type, LowerError> {
        self.ctx.resolver.resolve_type(expr, &self.unit.class)
    }

    fn next_temp_name(&mut self) -> String {
        self.unit.next_temp_name(&self.ctx.config.naming.temp_prefix)
    }
}
