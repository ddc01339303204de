use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::numeric::convert_constant;
use super::Transformer;
use crate::ast::*;
use crate::classes::{Access, MethodNode, Param};
use crate::diagnostics::LowerError;
use crate::span::{Span, Spanned};
use crate::types::*;

/// Static runtime methods that implement an operator directly on two boxed
/// operands, keyed by operator.
#[derive(Debug, Clone, Default)]
pub struct BinaryAdapters {
    adapters: HashMap<BinOp, Arc<MethodNode>>,
}

impl BinaryAdapters {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut adapters = HashMap::new();
        for (op, name, ret) in [
            (BinOp::Equal, "compareEqual", Type::boolean()),
            (BinOp::NotEqual, "compareNotEqual", Type::boolean()),
            (BinOp::Less, "compareLessThan", Type::boolean()),
            (BinOp::LessEq, "compareLessThanEqual", Type::boolean()),
            (BinOp::Greater, "compareGreaterThan", Type::boolean()),
            (BinOp::GreaterEq, "compareGreaterThanEqual", Type::boolean()),
            (BinOp::CompareTo, "compareTo", Type::int()),
        ] {
            adapters.insert(op, Arc::new(adapter_method(name, ret)));
        }
        Self { adapters }
    }

    pub fn get(&self, op: BinOp) -> Option<&Arc<MethodNode>> {
        self.adapters.get(&op)
    }
}

fn adapter_method(name: &str, ret: Type) -> MethodNode {
    let object = Type::object_type();
    MethodNode::new(
        &Type::object(BYTECODE_ADAPTER),
        name,
        vec![Param::new("left", object.clone()), Param::new("right", object)],
        ret,
    )
    .with_access(Access::PUBLIC | Access::STATIC)
}

/// `Comparable.compareTo(Object)`, the target of the ordering ternary's call.
fn compare_to_method() -> Arc<MethodNode> {
    Arc::new(
        MethodNode::new(
            &Type::object(COMPARABLE),
            "compareTo",
            vec![Param::new("o", Type::object_type())],
            Type::int(),
        )
        .with_access(Access::PUBLIC | Access::ABSTRACT),
    )
}

/// The character of a one-character string literal.
fn char_constant(expr: &TypedExpr) -> Option<char> {
    let Expr::Constant(Constant::String(value)) = &expr.node else {
        return None;
    };
    if expr.ty.as_ref().is_some_and(|t| *t != Type::string()) {
        return None;
    }
    let mut chars = value.chars();
    let c = chars.next()?;
    (chars.next().is_none() && c.len_utf16() == 1).then_some(c)
}

/// A property read not known to produce a `char`.
fn is_untyped_char_property(expr: &TypedExpr) -> bool {
    match &expr.node {
        Expr::Property(p) => !p
            .inferred_return
            .as_ref()
            .is_some_and(|t| t.wrapper().is_named(CHARACTER)),
        _ => false,
    }
}

fn int_constant(value: i32) -> TypedExpr {
    TypedExpr::constant(Constant::Int(value), Span::dummy())
}

impl Transformer<'_, '_> {
    /// Lower one binary node. Rules are tried in a fixed order; the first
    /// that applies produces the result.
    pub fn lower_binary(&mut self, expr: TypedExpr) -> Result<TypedExpr, LowerError> {
        let TypedExpr { node, span, ty } = expr;
        let mut bin = match node {
            Expr::Binary(bin) => bin,
            other => return self.transform(TypedExpr { node: other, span, ty }),
        };

        if bin.declaration {
            if let Some(rhs) = self.char_declaration(&bin) {
                debug!(rule = "char-declaration", "lowering binary");
                bin.rhs = Box::new(rhs);
                return Ok(TypedExpr { node: Expr::Binary(bin), span, ty });
            }
            if let Some(rhs) = self.numeric_declaration(&bin, span)? {
                debug!(rule = "numeric-declaration", "lowering binary");
                bin.rhs = Box::new(rhs);
                return Ok(TypedExpr { node: Expr::Binary(bin), span, ty });
            }
        }

        let op = bin.op.node;
        match op {
            BinOp::Assign => {
                if let Some(rhs) = self.collection_to_array(&bin)? {
                    debug!(rule = "collection-to-array", "lowering binary");
                    bin.rhs = Box::new(rhs);
                }
                if let Some(lowered) = self.setter_assignment(&bin, span, &ty)? {
                    return Ok(lowered);
                }
            }
            BinOp::Equal | BinOp::NotEqual => {
                let other = if bin.lhs.is_null_constant() {
                    Some(&bin.rhs)
                } else if bin.rhs.is_null_constant() {
                    Some(&bin.lhs)
                } else {
                    None
                };
                if let Some(other) = other {
                    debug!(rule = "compare-to-null", "lowering binary");
                    let operand = self.transform((**other).clone())?;
                    return Ok(TypedExpr::typed(
                        Expr::CompareToNull { operand: Box::new(operand), equal_to_null: op == BinOp::Equal },
                        span,
                        Type::boolean(),
                    ));
                }
            }
            BinOp::In => {
                debug!(rule = "membership", "lowering binary");
                let ternary = membership_ternary(bin, span, ty);
                return self.transform(ternary);
            }
            _ => {}
        }

        if let Some(target) = bin.target.clone() {
            return self.dispatch_to_method(bin, target, span, ty);
        }

        if op == BinOp::Assign {
            if let (Expr::Tuple(lefts), Expr::List(rights)) = (&bin.lhs.node, &bin.rhs.node) {
                debug!(rule = "multiple-assignment", declaration = bin.declaration, "lowering binary");
                let sequence = self.multiple_assignment(&bin, lefts.clone(), rights.clone(), span);
                return self.transform(sequence);
            }
        }

        trace!(op = %op, "no binary rule applies");
        let lhs = self.transform_boxed(bin.lhs)?;
        let rhs = self.transform_boxed(bin.rhs)?;
        Ok(TypedExpr { node: Expr::Binary(BinaryExpr { lhs, rhs, ..bin }), span, ty })
    }

    /// `char c = "x"` keeps a `char` constant instead of a string.
    fn char_declaration(&self, bin: &BinaryExpr) -> Option<TypedExpr> {
        let var = bin.lhs.as_variable()?;
        if var.origin_type.as_ref() != Some(&Type::char()) {
            return None;
        }
        let c = char_constant(&bin.rhs)?;
        Some(TypedExpr::constant(Constant::Char(c), bin.rhs.span))
    }

    /// Replacement initializer for `T x = <number literal>` when the literal's
    /// type is not exactly `T`.
    fn numeric_declaration(&self, bin: &BinaryExpr, span: Span) -> Result<Option<TypedExpr>, LowerError> {
        let (Expr::Variable(var), Expr::Constant(constant)) = (&bin.lhs.node, &bin.rhs.node) else {
            return Ok(None);
        };
        let Some(declared) = var.origin_type.as_ref() else {
            return Ok(None);
        };
        let literal_type = bin.rhs.ty.clone().unwrap_or_else(|| constant.ty());
        if literal_type == *declared
            || !self.ctx.classes.is_derived_from(&declared.wrapper(), NUMBER)
            || !declared.unwrapper().is_double_category()
            || *constant == Constant::Null
        {
            return Ok(None);
        }
        let converted = convert_constant(constant, &declared.wrapper(), span)?;
        Ok(Some(TypedExpr::typed(Expr::Constant(converted), bin.rhs.span, declared.clone())))
    }

    /// `T[] a = collection` reads the collection through `?.toArray(new T[0])`.
    fn collection_to_array(&self, bin: &BinaryExpr) -> Result<Option<TypedExpr>, LowerError> {
        if matches!(bin.lhs.node, Expr::Tuple(_)) || matches!(bin.rhs.node, Expr::List(_)) {
            return Ok(None);
        }
        let left_type = self.find_type(&bin.lhs)?;
        let Some(component) = left_type.component().cloned() else {
            return Ok(None);
        };
        let right_type = self.find_type(&bin.rhs)?;
        if !self.ctx.classes.is_or_implements(&right_type, COLLECTION) {
            return Ok(None);
        }
        let object_array = Type::array(Type::object_type());
        let target = self
            .ctx
            .classes
            .methods_named(&right_type, "toArray")
            .into_iter()
            .find(|m| m.params.len() == 1 && m.params[0].ty == object_array);
        let empty = TypedExpr::typed(
            Expr::NewArray { element: component, sizes: vec![int_constant(0)] },
            bin.rhs.span,
            left_type.clone(),
        );
        let call = MethodCall {
            receiver: bin.rhs.clone(),
            name: "toArray".to_string(),
            args: vec![empty],
            target,
            safe: true,
            implicit_this: false,
        };
        Ok(Some(TypedExpr::typed(Expr::MethodCall(call), bin.rhs.span, left_type)))
    }

    /// `a.x = v` / `x = v` with a resolved setter become
    /// `{ def tmp = v; a.setX(tmp); tmp }`.
    fn setter_assignment(
        &mut self,
        bin: &BinaryExpr,
        span: Span,
        ty: &Option<Type>,
    ) -> Result<Option<TypedExpr>, LowerError> {
        let setter = match &bin.lhs.node {
            Expr::Variable(v) => v.setter.clone(),
            Expr::Property(p) => p.setter.clone(),
            _ => None,
        };
        let Some(setter) = setter else {
            return Ok(None);
        };
        let left = self.transform((*bin.lhs).clone())?;
        let value = self.transform((*bin.rhs).clone())?;
        let (receiver, implicit_this, safe) = match left.node {
            Expr::Property(p) => (*p.object, false, p.safe),
            Expr::Variable(_) => (TypedExpr::this(), true, false),
            _ => return Ok(None),
        };
        debug!(rule = "setter", setter = %setter.name, safe, "lowering binary");

        let value_type = match self.find_type(&value) {
            Ok(t) => t,
            Err(e) => setter.params.first().map(|p| p.ty.clone()).ok_or(e)?,
        };
        let tmp_name = self.next_temp_name();
        let tmp = TypedExpr::var(tmp_name, value_type.clone()).with_span(value.span);
        let value_span = value.span;
        let mut declare = BinaryExpr::new(BinOp::Assign, tmp.clone(), value);
        declare.declaration = true;
        let call = MethodCall {
            receiver: Box::new(receiver),
            name: setter.name.clone(),
            args: vec![tmp.clone()],
            target: Some(setter.clone()),
            safe,
            implicit_this,
        };
        let sequence = vec![
            TypedExpr::new(Expr::Binary(declare), value_span),
            TypedExpr::typed(Expr::MethodCall(call), span, setter.return_type.clone()),
            tmp,
        ];
        Ok(Some(TypedExpr {
            node: Expr::Sequence(sequence),
            span,
            ty: Some(ty.clone().unwrap_or(value_type)),
        }))
    }

    fn dispatch_to_method(
        &mut self,
        bin: BinaryExpr,
        target: BinaryTarget,
        span: Span,
        ty: Option<Type>,
    ) -> Result<TypedExpr, LowerError> {
        let op = bin.op.node;
        let left = self.transform(*bin.lhs)?;
        let right = self.transform(*bin.rhs)?;

        if op == BinOp::CompareTo && self.is_comparable(&left)? && self.is_comparable(&right)? {
            debug!(rule = "ordering-ternary", "lowering binary");
            return Ok(ordering_ternary(left, right, span));
        }

        if self.ctx.config.lowering.char_comparison {
            if let Some((lhs, rhs)) = char_comparison(op, &left, &right) {
                debug!(rule = "char-comparison", op = %op, "lowering binary");
                let optimized = BinaryExpr {
                    op: bin.op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    declaration: bin.declaration,
                    target: None,
                    direct_target: None,
                };
                return Ok(TypedExpr { node: Expr::Binary(optimized), span, ty });
            }
        }

        let is_assignment = op.is_assignment();
        let call = match self.adapters.get(op) {
            Some(adapter) => {
                debug!(rule = "adapter", adapter = %adapter.name, "lowering binary");
                MethodCall {
                    receiver: Box::new(TypedExpr::class_ref(Type::object(BYTECODE_ADAPTER))),
                    name: adapter.name.clone(),
                    args: vec![left.clone(), right],
                    target: Some(adapter.clone()),
                    safe: false,
                    implicit_this: false,
                }
            }
            None => {
                debug!(rule = "method", method = %target.name, "lowering binary");
                MethodCall {
                    receiver: Box::new(left.clone()),
                    name: target.name.clone(),
                    args: vec![right],
                    target: Some(target.method.clone()),
                    safe: false,
                    implicit_this: false,
                }
            }
        };
        let return_type = call.target.as_ref().map(|m| m.return_type.clone()).unwrap_or_else(Type::object_type);
        if !is_assignment {
            let call_type = ty.unwrap_or(return_type);
            return Ok(TypedExpr::typed(Expr::MethodCall(call), span, call_type));
        }
        let call = TypedExpr::typed(Expr::MethodCall(call), span, return_type);
        let assign = BinaryExpr {
            op: Spanned::new(BinOp::Assign, bin.op.span),
            lhs: Box::new(left),
            rhs: Box::new(call),
            declaration: false,
            target: None,
            direct_target: None,
        };
        Ok(TypedExpr { node: Expr::Binary(assign), span, ty })
    }

    fn is_comparable(&self, expr: &TypedExpr) -> Result<bool, LowerError> {
        let ty = self.find_type(expr)?;
        Ok(self.ctx.classes.implements_interface(&ty, COMPARABLE))
    }

    /// Two-phase destructuring. Declarations pair up directly; plain
    /// assignments first copy every right-hand value into a temporary.
    fn multiple_assignment(
        &mut self,
        bin: &BinaryExpr,
        lefts: Vec<TypedExpr>,
        rights: Vec<TypedExpr>,
        span: Span,
    ) -> TypedExpr {
        let mut items = Vec::new();
        if bin.declaration {
            for (left, right) in lefts.into_iter().zip(rights) {
                let right_span = right.span;
                let mut declare = BinaryExpr::new(BinOp::Assign, left, right);
                declare.op = bin.op.clone();
                declare.declaration = true;
                items.push(TypedExpr::new(Expr::Binary(declare), right_span));
            }
            return TypedExpr::new(Expr::Sequence(items), span);
        }

        let mut finals = Vec::new();
        for (left, right) in lefts.into_iter().zip(rights) {
            let tmp_type = self.find_type(&right).unwrap_or_else(|_| Type::object_type());
            let tmp_name = self.next_temp_name();
            let right_span = right.span;
            let left_span = left.span;
            let mut declare = BinaryExpr::new(BinOp::Assign, TypedExpr::var(tmp_name.clone(), tmp_type.clone()), right);
            declare.op = bin.op.clone();
            declare.declaration = true;
            items.push(TypedExpr::new(Expr::Binary(declare), right_span));

            let mut assign = BinaryExpr::new(BinOp::Assign, left, TypedExpr::var(tmp_name, tmp_type));
            assign.op = bin.op.clone();
            finals.push(TypedExpr::new(Expr::Binary(assign), left_span));
        }
        items.extend(finals);
        TypedExpr::new(Expr::Sequence(items), span)
    }
}

/// `a in b` as `b == null ? a == null : b.isCase(a)`.
fn membership_ternary(bin: BinaryExpr, span: Span, ty: Option<Type>) -> TypedExpr {
    let call = MethodCall {
        receiver: bin.rhs.clone(),
        name: "isCase".to_string(),
        args: vec![(*bin.lhs).clone()],
        target: bin.direct_target.clone(),
        safe: false,
        implicit_this: false,
    };
    let call = TypedExpr { node: Expr::MethodCall(call), span, ty: Some(ty.unwrap_or_else(Type::boolean)) };
    let rhs_is_null = TypedExpr::binary(BinOp::Equal, *bin.rhs, TypedExpr::null());
    let lhs_is_null = TypedExpr::binary(BinOp::Equal, *bin.lhs, TypedExpr::null());
    TypedExpr::ternary(rhs_is_null, lhs_is_null, call)
        .with_span(span)
        .with_type(Type::boolean())
}

/// `left === right ? 0 : (left == null ? -1 : (right == null ? 1 : left.compareTo(right)))`
fn ordering_ternary(left: TypedExpr, right: TypedExpr, span: Span) -> TypedExpr {
    let call = MethodCall {
        receiver: Box::new(left.clone()),
        name: "compareTo".to_string(),
        args: vec![right.clone()],
        target: Some(compare_to_method()),
        safe: false,
        implicit_this: false,
    };
    let call = TypedExpr::typed(Expr::MethodCall(call), span, Type::int());
    let right_null = TypedExpr::ternary(
        TypedExpr::compare_to_null(right.clone(), true),
        int_constant(1),
        call,
    )
    .with_type(Type::int());
    let left_null = TypedExpr::ternary(
        TypedExpr::compare_to_null(left.clone(), true),
        int_constant(-1),
        right_null,
    )
    .with_type(Type::int());
    let identical = TypedExpr::typed(
        Expr::CompareIdentity { lhs: Box::new(left), rhs: Box::new(right) },
        Span::dummy(),
        Type::boolean(),
    );
    TypedExpr::ternary(identical, int_constant(0), left_null)
        .with_type(Type::int())
        .with_span(span)
}

/// Operands with one-character string literals replaced by `char` constants,
/// or `None` when the rewrite does not apply.
fn char_comparison(op: BinOp, left: &TypedExpr, right: &TypedExpr) -> Option<(TypedExpr, TypedExpr)> {
    if !(op.is_ordering() || op.is_equality()) {
        return None;
    }
    let c_left = char_constant(left);
    let c_right = char_constant(right);
    if c_left.is_none() && c_right.is_none() {
        return None;
    }
    let o_left = match c_left {
        Some(c) => TypedExpr::constant(Constant::Char(c), left.span),
        None => left.clone(),
    };
    if is_untyped_char_property(&o_left) {
        return None;
    }
    let o_right = match c_right {
        Some(c) => TypedExpr::constant(Constant::Char(c), right.span),
        None => right.clone(),
    };
    if is_untyped_char_property(&o_right) {
        return None;
    }
    Some((o_left, o_right))
}
