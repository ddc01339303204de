//! Instruction emission for lowered expression trees.
//!
//! [`Emitter`] is the driving code generator: it walks a tree that has been
//! through the [`Transformer`](crate::transform::Transformer), appends
//! instructions to its buffer and keeps a typed model of the operand stack.
//! Unary operators and method references are lowered here rather than as
//! tree rewrites because their fast paths depend on the stack types.

pub mod insn;
pub mod method_ref;
pub mod synthetic;
pub mod unary;

use std::sync::Arc;

use tracing::trace;

use crate::ast::*;
use crate::classes::MethodNode;
use crate::context::{CompileUnit, LowerContext};
use crate::diagnostics::LowerError;
use crate::types::*;
use insn::{Cmp, Insn, InvokeKind, Label};

pub const INVOKER_HELPER: &str = "org.codehaus.groovy.runtime.InvokerHelper";

/// Static types of the values on the operand stack, bottom first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperandStack {
    types: Vec<Type>,
}

impl OperandStack {
    pub fn push(&mut self, ty: Type) {
        self.types.push(ty);
    }

    pub fn pop(&mut self) -> Result<Type, LowerError> {
        self.types.pop().ok_or_else(|| LowerError::codegen("operand stack underflow"))
    }

    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Type>, LowerError> {
        if self.types.len() < n {
            return Err(LowerError::codegen("operand stack underflow"));
        }
        Ok(self.types.split_off(self.types.len() - n))
    }

    pub fn top(&self) -> Option<&Type> {
        self.types.last()
    }

    /// Replace the top `n` operands with one of type `ty`.
    pub fn replace(&mut self, ty: Type, n: usize) -> Result<(), LowerError> {
        self.pop_n(n)?;
        self.types.push(ty);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Local {
    name: String,
    slot: u16,
    ty: Type,
}

/// Result of emitting one expression or method body.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedCode {
    pub insns: Vec<Insn>,
    /// Type of the returned value, `void` when nothing is left on the stack.
    pub result: Type,
    pub max_locals: u16,
}

fn is_wide(ty: &Type) -> bool {
    matches!(ty, Type::Primitive(Primitive::Long | Primitive::Double))
}

fn stack_category(p: Primitive) -> Primitive {
    match p {
        Primitive::Long | Primitive::Float | Primitive::Double => p,
        _ => Primitive::Int,
    }
}

fn comparison(op: BinOp) -> Option<Cmp> {
    Some(match op {
        BinOp::Equal => Cmp::Eq,
        BinOp::NotEqual => Cmp::Ne,
        BinOp::Less => Cmp::Lt,
        BinOp::LessEq => Cmp::Le,
        BinOp::Greater => Cmp::Gt,
        BinOp::GreaterEq => Cmp::Ge,
        _ => return None,
    })
}

fn adapter_name(op: BinOp) -> Option<&'static str> {
    Some(match op {
        BinOp::Equal => "compareEqual",
        BinOp::NotEqual => "compareNotEqual",
        BinOp::Less => "compareLessThan",
        BinOp::LessEq => "compareLessThanEqual",
        BinOp::Greater => "compareGreaterThan",
        BinOp::GreaterEq => "compareGreaterThanEqual",
        _ => return None,
    })
}

pub struct Emitter<'a, 'u> {
    ctx: LowerContext<'a>,
    unit: &'u mut CompileUnit,
    insns: Vec<Insn>,
    stack: OperandStack,
    locals: Vec<Local>,
    is_static: bool,
    next_slot: u16,
    next_label: u32,
}

impl<'a, 'u> Emitter<'a, 'u> {
    /// Emitter for an instance method body: slot 0 holds `this`.
    pub fn new(ctx: LowerContext<'a>, unit: &'u mut CompileUnit) -> Self {
        let mut emitter = Self::new_static(ctx, unit);
        emitter.is_static = false;
        emitter.next_slot = 1;
        emitter
    }

    pub fn new_static(ctx: LowerContext<'a>, unit: &'u mut CompileUnit) -> Self {
        Self {
            ctx,
            unit,
            insns: Vec::new(),
            stack: OperandStack::default(),
            locals: Vec::new(),
            is_static: true,
            next_slot: 0,
            next_label: 0,
        }
    }

    pub fn declare_local(&mut self, name: &str, ty: Type) -> u16 {
        let slot = self.next_slot;
        self.next_slot += if is_wide(&ty) { 2 } else { 1 };
        self.locals.push(Local { name: name.to_string(), slot, ty });
        slot
    }

    fn local(&self, name: &str) -> Option<&Local> {
        self.locals.iter().rev().find(|l| l.name == name)
    }

    /// Return whatever is on top of the stack and hand back the code.
    pub fn finish(mut self) -> EmittedCode {
        let result = self.stack.top().cloned().unwrap_or(Type::Void);
        self.insns.push(Insn::Return(result.clone()));
        EmittedCode { insns: self.insns, result, max_locals: self.next_slot }
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn resolve(&self, expr: &TypedExpr) -> Result<Type, LowerError> {
        self.ctx.resolver.resolve_type(expr, &self.unit.class)
    }

    /// Emit `expr`, leaving its value (if any) on the operand stack.
    pub fn emit_expr(&mut self, expr: &TypedExpr) -> Result<(), LowerError> {
        match &expr.node {
            Expr::Constant(c) => self.emit_constant(c, expr.ty.as_ref()),
            Expr::Variable(v) => {
                let local = self
                    .local(&v.name)
                    .cloned()
                    .ok_or_else(|| LowerError::codegen(format!("unknown local variable '{}'", v.name)))?;
                self.insns.push(Insn::Load { slot: local.slot, ty: local.ty.clone() });
                self.stack.push(local.ty);
                Ok(())
            }
            Expr::This => self.load_this(),
            Expr::ClassRef(ty) => {
                self.insns.push(Insn::LdcClass(ty.clone()));
                self.stack.push(Type::object(CLASS));
                Ok(())
            }
            Expr::Property(p) => {
                let ret = self.resolve(expr)?;
                let owner = self.resolve(&p.object)?;
                let getter = format!("get{}", capitalize(&p.name));
                let call = MethodCall {
                    receiver: p.object.clone(),
                    name: getter.clone(),
                    args: Vec::new(),
                    target: Some(Arc::new(MethodNode::new(&owner, getter, Vec::new(), ret.clone()))),
                    safe: p.safe,
                    implicit_this: false,
                };
                self.emit_method_call(&call, Some(&ret))
            }
            Expr::Binary(bin) => self.emit_binary(bin, expr),
            Expr::Unary { .. } => self.lower_unary(expr),
            Expr::Tuple(_) => Err(LowerError::codegen("tuple expression outside a multiple assignment")),
            Expr::List(items) => self.emit_list(items, expr.ty.as_ref()),
            Expr::MethodCall(call) => self.emit_method_call(call, expr.ty.as_ref()),
            Expr::New { ty, args } => self.emit_new(ty, args),
            Expr::NewArray { element, sizes } => self.emit_new_array(element, sizes),
            Expr::Ternary { cond, then_branch, else_branch } => {
                let result = match &expr.ty {
                    Some(ty) => ty.clone(),
                    None => self.resolve(then_branch)?,
                };
                let else_label = self.new_label();
                let end = self.new_label();
                self.emit_condition(cond)?;
                self.insns.push(Insn::IfEq(else_label));
                self.emit_expr(then_branch)?;
                self.do_cast(&result)?;
                self.stack.pop()?;
                self.insns.push(Insn::Goto(end));
                self.insns.push(Insn::Label(else_label));
                self.emit_expr(else_branch)?;
                self.do_cast(&result)?;
                self.insns.push(Insn::Label(end));
                Ok(())
            }
            Expr::CompareToNull { operand, equal_to_null } => {
                self.emit_expr(operand)?;
                let ty = self.stack.pop()?;
                if ty.is_primitive() {
                    // a primitive is never null
                    self.insns.push(if is_wide(&ty) { Insn::Pop2 } else { Insn::Pop });
                    self.insns.push(Insn::IConst(if *equal_to_null { 0 } else { 1 }));
                } else {
                    let not_null = self.new_label();
                    let end = self.new_label();
                    self.insns.push(Insn::IfNonNull(not_null));
                    self.insns.push(Insn::IConst(if *equal_to_null { 1 } else { 0 }));
                    self.insns.push(Insn::Goto(end));
                    self.insns.push(Insn::Label(not_null));
                    self.insns.push(Insn::IConst(if *equal_to_null { 0 } else { 1 }));
                    self.insns.push(Insn::Label(end));
                }
                self.stack.push(Type::boolean());
                Ok(())
            }
            Expr::CompareIdentity { lhs, rhs } => {
                self.emit_expr(lhs)?;
                let lt = self.stack.top().cloned().unwrap_or(Type::Void);
                if lt.is_primitive() {
                    self.do_cast(&lt.wrapper())?;
                }
                self.emit_expr(rhs)?;
                let rt = self.stack.top().cloned().unwrap_or(Type::Void);
                if rt.is_primitive() {
                    self.do_cast(&rt.wrapper())?;
                }
                self.stack.pop_n(2)?;
                let differ = self.new_label();
                let end = self.new_label();
                self.insns.push(Insn::IfACmpNe(differ));
                self.insns.push(Insn::IConst(1));
                self.insns.push(Insn::Goto(end));
                self.insns.push(Insn::Label(differ));
                self.insns.push(Insn::IConst(0));
                self.insns.push(Insn::Label(end));
                self.stack.push(Type::boolean());
                Ok(())
            }
            Expr::MethodReference(_) => self.lower_reference(expr),
            Expr::Sequence(items) => {
                let Some((last, init)) = items.split_last() else {
                    return Ok(());
                };
                for item in init {
                    let depth = self.stack.len();
                    self.emit_expr(item)?;
                    if self.stack.len() > depth {
                        self.pop_value()?;
                    }
                }
                self.emit_expr(last)
            }
            Expr::Other { label, .. } => Err(LowerError::codegen(format!("no instruction lowering for '{label}'"))),
        }
    }

    fn load_this(&mut self) -> Result<(), LowerError> {
        if self.is_static {
            return Err(LowerError::codegen("'this' used in a static context"));
        }
        self.insns.push(Insn::Load { slot: 0, ty: self.unit.class.clone() });
        self.stack.push(self.unit.class.clone());
        Ok(())
    }

    fn emit_constant(&mut self, constant: &Constant, ty: Option<&Type>) -> Result<(), LowerError> {
        let insn = match constant {
            Constant::Null => {
                self.insns.push(Insn::AConstNull);
                self.stack.push(ty.cloned().unwrap_or_else(Type::object_type));
                return Ok(());
            }
            Constant::Boolean(b) => Insn::IConst(*b as i32),
            Constant::Byte(v) => Insn::IConst(*v as i32),
            Constant::Short(v) => Insn::IConst(*v as i32),
            Constant::Char(c) => Insn::IConst(*c as u32 as i32),
            Constant::Int(v) => Insn::IConst(*v),
            Constant::Long(v) => Insn::LConst(*v),
            Constant::Float(v) => Insn::FConst(*v),
            Constant::Double(v) => Insn::DConst(*v),
            Constant::BigInteger(_) | Constant::BigDecimal(_) | Constant::String(_) => Insn::Ldc(constant.clone()),
        };
        self.insns.push(insn);
        self.stack.push(constant.ty());
        if let Some(ty) = ty {
            self.do_cast(ty)?;
        }
        Ok(())
    }

    /// Emit `cond` as a primitive boolean.
    fn emit_condition(&mut self, cond: &TypedExpr) -> Result<(), LowerError> {
        self.emit_expr(cond)?;
        self.do_cast(&Type::boolean())?;
        self.stack.pop()?;
        Ok(())
    }

    fn pop_value(&mut self) -> Result<(), LowerError> {
        let ty = self.stack.pop()?;
        self.insns.push(if is_wide(&ty) { Insn::Pop2 } else { Insn::Pop });
        Ok(())
    }

    fn dup_value(&mut self) -> Result<(), LowerError> {
        let ty = self.stack.top().cloned().ok_or_else(|| LowerError::codegen("dup on empty stack"))?;
        self.insns.push(if is_wide(&ty) { Insn::Dup2 } else { Insn::Dup });
        self.stack.push(ty);
        Ok(())
    }

    fn box_top(&mut self) -> Result<(), LowerError> {
        match self.stack.top().cloned() {
            Some(ty @ Type::Primitive(_)) => self.do_cast(&ty.wrapper()),
            Some(_) => Ok(()),
            None => Err(LowerError::codegen("box on empty stack")),
        }
    }

    fn emit_binary(&mut self, bin: &BinaryExpr, expr: &TypedExpr) -> Result<(), LowerError> {
        let op = bin.op.node;
        if op == BinOp::Assign {
            return self.emit_assignment(bin);
        }
        if let Some(cmp) = comparison(op) {
            return self.emit_comparison(op, cmp, &bin.lhs, &bin.rhs);
        }
        match op {
            BinOp::LogicalAnd | BinOp::LogicalOr => {
                let short_circuit = self.new_label();
                let end = self.new_label();
                let is_and = op == BinOp::LogicalAnd;
                for side in [&bin.lhs, &bin.rhs] {
                    self.emit_condition(side)?;
                    self.insns.push(if is_and { Insn::IfEq(short_circuit) } else { Insn::IfNe(short_circuit) });
                }
                self.insns.push(Insn::IConst(if is_and { 1 } else { 0 }));
                self.insns.push(Insn::Goto(end));
                self.insns.push(Insn::Label(short_circuit));
                self.insns.push(Insn::IConst(if is_and { 0 } else { 1 }));
                self.insns.push(Insn::Label(end));
                self.stack.push(Type::boolean());
                Ok(())
            }
            BinOp::CompareTo => {
                self.emit_boxed_operands(&bin.lhs, &bin.rhs)?;
                let desc = method_descriptor(&[Type::object_type(), Type::object_type()], &Type::int());
                self.insns.push(Insn::invoke_static(&Type::object(BYTECODE_ADAPTER), "compareTo", desc));
                self.stack.replace(Type::int(), 2)
            }
            _ => {
                let name = op
                    .method_name()
                    .ok_or_else(|| LowerError::codegen(format!("no lowering for operator '{op}'")))?;
                trace!(op = %op, method = name, "dynamic operator dispatch");
                self.emit_expr(&bin.lhs)?;
                self.box_top()?;
                self.insns.push(Insn::Ldc(Constant::String(name.to_string())));
                self.stack.push(Type::string());
                self.emit_expr(&bin.rhs)?;
                self.box_top()?;
                let object = Type::object_type();
                let desc = method_descriptor(&[object.clone(), Type::string(), object.clone()], &object);
                self.insns.push(Insn::invoke_static(&Type::object(INVOKER_HELPER), "invokeMethod", desc));
                self.stack.replace(object, 3)?;
                if op.is_assignment() {
                    return self.store_into(&bin.lhs);
                }
                if let Some(ty) = &expr.ty {
                    self.do_cast(ty)?;
                }
                Ok(())
            }
        }
    }

    fn emit_boxed_operands(&mut self, lhs: &TypedExpr, rhs: &TypedExpr) -> Result<(), LowerError> {
        self.emit_expr(lhs)?;
        self.box_top()?;
        self.emit_expr(rhs)?;
        self.box_top()
    }

    fn emit_comparison(&mut self, op: BinOp, cmp: Cmp, lhs: &TypedExpr, rhs: &TypedExpr) -> Result<(), LowerError> {
        let lt = self.resolve(lhs)?;
        let rt = self.resolve(rhs)?;
        let (Some(a), Some(b)) = (lt.primitive(), rt.primitive()) else {
            let name = adapter_name(op).ok_or_else(|| LowerError::codegen("comparison without adapter"))?;
            self.emit_boxed_operands(lhs, rhs)?;
            let desc = method_descriptor(&[Type::object_type(), Type::object_type()], &Type::boolean());
            self.insns.push(Insn::invoke_static(&Type::object(BYTECODE_ADAPTER), name, desc));
            return self.stack.replace(Type::boolean(), 2);
        };
        let kind = promoted(stack_category(a), stack_category(b));
        let operand_type = Type::Primitive(kind);
        self.emit_expr(lhs)?;
        self.do_cast(&operand_type)?;
        self.emit_expr(rhs)?;
        self.do_cast(&operand_type)?;
        self.stack.pop_n(2)?;
        let fail = self.new_label();
        let end = self.new_label();
        match kind {
            Primitive::Long => {
                self.insns.push(Insn::LCmp);
                self.insns.push(Insn::If(cmp.negate(), fail));
            }
            // NaN must make every ordering test fail
            Primitive::Float => {
                self.insns.push(if nan_high(cmp) { Insn::FCmpG } else { Insn::FCmpL });
                self.insns.push(Insn::If(cmp.negate(), fail));
            }
            Primitive::Double => {
                self.insns.push(if nan_high(cmp) { Insn::DCmpG } else { Insn::DCmpL });
                self.insns.push(Insn::If(cmp.negate(), fail));
            }
            _ => self.insns.push(Insn::IfICmp(cmp.negate(), fail)),
        }
        self.insns.push(Insn::IConst(1));
        self.insns.push(Insn::Goto(end));
        self.insns.push(Insn::Label(fail));
        self.insns.push(Insn::IConst(0));
        self.insns.push(Insn::Label(end));
        self.stack.push(Type::boolean());
        Ok(())
    }

    fn emit_assignment(&mut self, bin: &BinaryExpr) -> Result<(), LowerError> {
        match &bin.lhs.node {
            Expr::Variable(v) if bin.declaration => {
                let declared = match &v.origin_type {
                    Some(ty) => ty.clone(),
                    None => self.resolve(&bin.rhs)?,
                };
                self.emit_expr(&bin.rhs)?;
                self.do_cast(&declared)?;
                let slot = self.declare_local(&v.name, declared.clone());
                self.dup_value()?;
                self.stack.pop()?;
                self.insns.push(Insn::Store { slot, ty: declared });
                Ok(())
            }
            Expr::Variable(_) => {
                self.emit_expr(&bin.rhs)?;
                self.store_into(&bin.lhs)
            }
            Expr::Property(p) => {
                // value first, then the dynamic property write
                self.emit_expr(&bin.rhs)?;
                self.box_top()?;
                let value_type = self.stack.top().cloned().unwrap_or_else(Type::object_type);
                let tmp = self.declare_local("$property$value", value_type.clone());
                self.insns.push(Insn::Store { slot: tmp, ty: value_type.clone() });
                self.stack.pop()?;
                self.insns.push(Insn::Load { slot: tmp, ty: value_type.clone() });
                self.stack.push(value_type.clone());
                self.insns.push(Insn::LdcClass(self.unit.class.clone()));
                self.stack.push(Type::object(CLASS));
                self.emit_expr(&p.object)?;
                self.box_top()?;
                self.insns.push(Insn::Ldc(Constant::String(p.name.clone())));
                self.stack.push(Type::string());
                let object = Type::object_type();
                let desc = method_descriptor(&[object.clone(), Type::object(CLASS), object, Type::string()], &Type::Void);
                self.insns.push(Insn::invoke_static(&Type::object(BYTECODE_ADAPTER), "setProperty", desc));
                self.stack.pop_n(4)?;
                self.insns.push(Insn::Load { slot: tmp, ty: value_type.clone() });
                self.stack.push(value_type);
                Ok(())
            }
            _ => Err(LowerError::codegen("left side of assignment is not assignable")),
        }
    }

    /// Store the value on top of the stack into the variable `target`, leaving
    /// a copy as the expression's value.
    fn store_into(&mut self, target: &TypedExpr) -> Result<(), LowerError> {
        let Expr::Variable(v) = &target.node else {
            return Err(LowerError::codegen("compound assignment target is not a variable"));
        };
        let local = self
            .local(&v.name)
            .cloned()
            .ok_or_else(|| LowerError::codegen(format!("unknown local variable '{}'", v.name)))?;
        self.do_cast(&local.ty)?;
        self.dup_value()?;
        self.stack.pop()?;
        self.insns.push(Insn::Store { slot: local.slot, ty: local.ty });
        Ok(())
    }

    fn emit_list(&mut self, items: &[TypedExpr], ty: Option<&Type>) -> Result<(), LowerError> {
        let list = Type::object(ARRAY_LIST);
        self.insns.push(Insn::New(list.internal_name()));
        self.insns.push(Insn::Dup);
        self.insns.push(Insn::Invoke {
            kind: InvokeKind::Special,
            owner: list.internal_name(),
            name: "<init>".to_string(),
            desc: "()V".to_string(),
            is_interface: false,
        });
        self.stack.push(list.clone());
        for item in items {
            self.insns.push(Insn::Dup);
            self.stack.push(list.clone());
            self.emit_expr(item)?;
            self.box_top()?;
            self.insns.push(Insn::Invoke {
                kind: InvokeKind::Interface,
                owner: Type::object(LIST).internal_name(),
                name: "add".to_string(),
                desc: "(Ljava/lang/Object;)Z".to_string(),
                is_interface: true,
            });
            self.stack.pop_n(2)?;
            self.insns.push(Insn::Pop);
        }
        if let Some(ty) = ty {
            self.do_cast(ty)?;
        }
        Ok(())
    }

    fn emit_new(&mut self, ty: &Type, args: &[TypedExpr]) -> Result<(), LowerError> {
        self.insns.push(Insn::New(ty.internal_name()));
        self.insns.push(Insn::Dup);
        self.stack.push(ty.clone());
        self.stack.push(ty.clone());
        let mut arg_types = Vec::with_capacity(args.len());
        for arg in args {
            self.emit_expr(arg)?;
            arg_types.push(self.stack.top().cloned().unwrap_or_else(Type::object_type));
        }
        self.insns.push(Insn::Invoke {
            kind: InvokeKind::Special,
            owner: ty.internal_name(),
            name: "<init>".to_string(),
            desc: method_descriptor(&arg_types, &Type::Void),
            is_interface: false,
        });
        self.stack.pop_n(args.len() + 1)?;
        Ok(())
    }

    fn emit_new_array(&mut self, element: &Type, sizes: &[TypedExpr]) -> Result<(), LowerError> {
        if sizes.is_empty() {
            return Err(LowerError::codegen("array allocation without dimensions"));
        }
        for size in sizes {
            self.emit_expr(size)?;
            self.do_cast(&Type::int())?;
        }
        let array = (0..sizes.len()).fold(element.clone(), |acc, _| Type::array(acc));
        let insn = match (sizes.len(), element) {
            (1, Type::Primitive(p)) => Insn::NewArray(*p),
            (1, _) => Insn::ANewArray(element.internal_name()),
            (n, _) => Insn::MultiANewArray { desc: array.descriptor(), dims: n as u8 },
        };
        self.insns.push(insn);
        self.stack.replace(array, sizes.len())
    }

    fn emit_method_call(&mut self, call: &MethodCall, ty: Option<&Type>) -> Result<(), LowerError> {
        let Some(target) = call.target.clone() else {
            return self.emit_dynamic_call(call, ty);
        };
        if let Some(host) = target.extension_host().cloned() {
            return self.emit_extension_call(call, &host, target.is_static_extension(), ty);
        }
        let is_interface = self.ctx.classes.is_interface(&target.owner);
        if target.is_static() {
            self.emit_args(&call.args, &target)?;
            self.insns.push(Insn::Invoke {
                kind: InvokeKind::Static,
                owner: target.owner.internal_name(),
                name: target.name.clone(),
                desc: target.descriptor(),
                is_interface,
            });
            self.stack.pop_n(call.args.len())?;
            return self.push_call_result(&target, ty);
        }

        if call.implicit_this {
            self.load_this()?;
        } else {
            self.emit_expr(&call.receiver)?;
        }
        self.do_cast(&target.owner)?;
        let null_label = if call.safe {
            let label = self.new_label();
            self.insns.push(Insn::Dup);
            self.insns.push(Insn::IfNull(label));
            Some(label)
        } else {
            None
        };
        self.emit_args(&call.args, &target)?;
        self.insns.push(Insn::Invoke {
            kind: if is_interface { InvokeKind::Interface } else { InvokeKind::Virtual },
            owner: target.owner.internal_name(),
            name: target.name.clone(),
            desc: target.descriptor(),
            is_interface,
        });
        self.stack.pop_n(call.args.len() + 1)?;
        let Some(null_label) = null_label else {
            return self.push_call_result(&target, ty);
        };
        // a skipped safe call yields null, so the result must be a reference
        if target.return_type != Type::Void {
            self.stack.push(target.return_type.clone());
            self.box_top()?;
            if let Some(ty) = ty.filter(|t| t.is_reference()) {
                self.do_cast(ty)?;
            }
        }
        let end = self.new_label();
        self.insns.push(Insn::Goto(end));
        self.insns.push(Insn::Label(null_label));
        if target.return_type == Type::Void {
            self.insns.push(Insn::Pop);
        }
        self.insns.push(Insn::Label(end));
        Ok(())
    }

    /// Extension methods run as static calls on their host with the receiver
    /// as first argument. Static extensions receive `null` there.
    fn emit_extension_call(
        &mut self,
        call: &MethodCall,
        host: &MethodNode,
        is_static_extension: bool,
        ty: Option<&Type>,
    ) -> Result<(), LowerError> {
        let (self_param, rest) = host
            .params
            .split_first()
            .ok_or_else(|| LowerError::codegen(format!("extension {} has no self parameter", host.signature())))?;
        if is_static_extension {
            self.insns.push(Insn::AConstNull);
            self.stack.push(self_param.ty.clone());
        } else {
            if call.implicit_this {
                self.load_this()?;
            } else {
                self.emit_expr(&call.receiver)?;
            }
            self.do_cast(&self_param.ty)?;
        }
        if call.args.len() != rest.len() {
            return Err(LowerError::codegen(format!(
                "{} expects {} arguments, got {}",
                host.signature(),
                rest.len(),
                call.args.len()
            )));
        }
        for (arg, param) in call.args.iter().zip(rest) {
            self.emit_expr(arg)?;
            self.do_cast(&param.ty)?;
        }
        self.insns.push(Insn::invoke_static(&host.owner, &host.name, host.descriptor()));
        self.stack.pop_n(host.params.len())?;
        self.push_call_result(host, ty)
    }

    fn push_call_result(&mut self, target: &MethodNode, ty: Option<&Type>) -> Result<(), LowerError> {
        if target.return_type == Type::Void {
            return Ok(());
        }
        self.stack.push(target.return_type.clone());
        if let Some(ty) = ty {
            self.do_cast(ty)?;
        }
        Ok(())
    }

    fn emit_args(&mut self, args: &[TypedExpr], target: &MethodNode) -> Result<(), LowerError> {
        if args.len() != target.params.len() {
            return Err(LowerError::codegen(format!(
                "{} expects {} arguments, got {}",
                target.signature(),
                target.params.len(),
                args.len()
            )));
        }
        for (arg, param) in args.iter().zip(&target.params) {
            self.emit_expr(arg)?;
            self.do_cast(&param.ty)?;
        }
        Ok(())
    }

    /// Call without a resolved target: `InvokerHelper.invokeMethod(receiver, name, args[])`.
    fn emit_dynamic_call(&mut self, call: &MethodCall, ty: Option<&Type>) -> Result<(), LowerError> {
        trace!(method = %call.name, "dynamic method call");
        let object = Type::object_type();
        if call.implicit_this {
            self.load_this()?;
        } else {
            self.emit_expr(&call.receiver)?;
        }
        self.box_top()?;
        self.insns.push(Insn::Ldc(Constant::String(call.name.clone())));
        self.stack.push(Type::string());
        self.insns.push(Insn::IConst(call.args.len() as i32));
        self.insns.push(Insn::ANewArray(object.internal_name()));
        self.stack.push(Type::array(object.clone()));
        for (i, arg) in call.args.iter().enumerate() {
            self.insns.push(Insn::Dup);
            self.insns.push(Insn::IConst(i as i32));
            self.emit_expr(arg)?;
            self.box_top()?;
            self.stack.pop()?;
            self.insns.push(Insn::AAStore);
        }
        let desc = method_descriptor(&[object.clone(), Type::string(), object.clone()], &object);
        self.insns.push(Insn::invoke_static(&Type::object(INVOKER_HELPER), "invokeMethod", desc));
        self.stack.replace(object, 3)?;
        if let Some(ty) = ty {
            self.do_cast(ty)?;
        }
        Ok(())
    }

    /// Convert the top operand to `target`: primitive widening/narrowing,
    /// boxing, unboxing (Groovy truthiness for `boolean`) or a checked cast.
    pub fn do_cast(&mut self, target: &Type) -> Result<(), LowerError> {
        let from = self
            .stack
            .top()
            .cloned()
            .ok_or_else(|| LowerError::codegen("cast with an empty operand stack"))?;
        if from == *target || *target == Type::Void {
            return Ok(());
        }
        match (&from, target) {
            (Type::Void, _) => return Err(LowerError::codegen("void value used as an expression")),
            (Type::Primitive(a), Type::Primitive(b)) => self.convert_primitive(*a, *b)?,
            (Type::Primitive(a), _) => {
                let boxed = match target.unwrapper() {
                    Type::Primitive(b) if b != *a => {
                        self.convert_primitive(*a, b)?;
                        b
                    }
                    _ => *a,
                };
                let wrapper = Type::Primitive(boxed).wrapper();
                let desc = method_descriptor(&[Type::Primitive(boxed)], &wrapper);
                self.insns.push(Insn::invoke_static(&wrapper, "valueOf", desc));
                if !self.ctx.classes.is_assignable(&wrapper, target) {
                    self.insns.push(Insn::CheckCast(target.internal_name()));
                }
            }
            (_, Type::Primitive(b)) => self.unbox(&from, *b)?,
            _ => {
                if !self.ctx.classes.is_assignable(&from, target) {
                    self.insns.push(Insn::CheckCast(target.internal_name()));
                }
            }
        }
        self.stack.replace(target.clone(), 1)
    }

    fn convert_primitive(&mut self, from: Primitive, to: Primitive) -> Result<(), LowerError> {
        if from == to {
            return Ok(());
        }
        if from == Primitive::Boolean || to == Primitive::Boolean {
            return Err(LowerError::codegen(format!("cannot convert {} to {}", from.name(), to.name())));
        }
        let (a, b) = (stack_category(from), stack_category(to));
        if a != b {
            self.insns.push(Insn::Convert { from: a, to: b });
        }
        let truncate = match to {
            Primitive::Byte => Some(Insn::I2B),
            Primitive::Short if !matches!(from, Primitive::Byte) => Some(Insn::I2S),
            Primitive::Char => Some(Insn::I2C),
            _ => None,
        };
        if let Some(insn) = truncate {
            self.insns.push(insn);
        }
        Ok(())
    }

    fn unbox(&mut self, from: &Type, to: Primitive) -> Result<(), LowerError> {
        if let Type::Primitive(unboxed) = from.unwrapper() {
            let desc = method_descriptor(std::iter::empty::<&Type>(), &Type::Primitive(unboxed));
            self.insns.push(Insn::Invoke {
                kind: InvokeKind::Virtual,
                owner: from.internal_name(),
                name: format!("{}Value", unboxed.name()),
                desc,
                is_interface: false,
            });
            return self.convert_primitive(unboxed, to);
        }
        let name = format!("{}Unbox", to.name());
        let desc = method_descriptor(&[Type::object_type()], &Type::Primitive(to));
        self.insns.push(Insn::invoke_static(&Type::object(TYPE_TRANSFORMATION), &name, desc));
        Ok(())
    }
}

/// `<` and `<=` compare with the NaN-is-greater variant.
fn nan_high(cmp: Cmp) -> bool {
    matches!(cmp, Cmp::Lt | Cmp::Le)
}

/// Binary numeric promotion over stack categories.
fn promoted(a: Primitive, b: Primitive) -> Primitive {
    for wide in [Primitive::Double, Primitive::Float, Primitive::Long] {
        if a == wide || b == wide {
            return wide;
        }
    }
    Primitive::Int
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
