//! Reference stack machine for emitted code.
//!
//! Executes the instruction model of [`crate::codegen::insn`] together with
//! the synthetic methods of a compile unit, and implements the subset of the
//! Groovy runtime and JDK the lowerers call into. Used to check lowered
//! code by running it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};

use crate::ast::{Constant, Decimal, wrapping_i64};
use crate::codegen::insn::{CallSite, Cmp, HandleKind, Insn, InvokeKind, Label};
use crate::codegen::synthetic::MethodCode;
use crate::codegen::{EmittedCode, INVOKER_HELPER};
use crate::resolve::{DEFAULT_GROOVY_METHODS, DEFAULT_GROOVY_STATIC_METHODS, STRING_GROOVY_METHODS};
use crate::types::*;

#[derive(Debug, Error, PartialEq)]
pub enum InterpError {
    #[error("operand stack underflow at instruction {pc}")]
    StackUnderflow { pc: usize },
    #[error("null receiver calling {method}")]
    NullPointer { method: String },
    #[error("no implementation for {owner}.{name}{desc}")]
    UnknownMethod { owner: String, name: String, desc: String },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("malformed descriptor {0}")]
    BadDescriptor(String),
    #[error("jump to undefined label {0}")]
    UnknownLabel(Label),
    #[error("array index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i32, len: usize },
    #[error("local slot {0} read before assignment")]
    UnsetLocal(u16),
}

type Result<T> = std::result::Result<T, InterpError>;

/// A stack or local value. Narrow integral kinds and `boolean` live in `Int`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Ref(usize),
}

impl Value {
    fn is_wide(self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn as_int(self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long(self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Boxed { kind: Primitive, value: Value },
    Str(String),
    BigInteger(BigInt),
    BigDecimal(Decimal),
    List(Vec<Value>),
    Array { element: Type, items: Vec<Value> },
    Instance { class: String, fields: Vec<(String, Value)> },
    /// Functional-interface instance produced by a call site.
    Lambda { site: CallSite, captured: Vec<Value> },
    Class(Type),
    MethodPointer { receiver: Value, name: String },
}

/// Number view of a primitive or boxed value.
#[derive(Debug, Clone)]
enum Num {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigInteger(BigInt),
    BigDecimal(Decimal),
}

impl Num {
    fn is_floating(&self) -> bool {
        matches!(self, Num::Float(_) | Num::Double(_) | Num::BigDecimal(_))
    }

    fn to_f64(&self) -> f64 {
        match self {
            Num::Int(v) => *v as f64,
            Num::Long(v) => *v as f64,
            Num::Float(v) => *v as f64,
            Num::Double(v) => *v,
            Num::BigInteger(v) => v.to_f64().unwrap_or(f64::NAN),
            Num::BigDecimal(d) => d.to_f64(),
        }
    }

    fn to_f32(&self) -> f32 {
        match self {
            Num::Int(v) => *v as f32,
            Num::Long(v) => *v as f32,
            Num::Float(v) => *v,
            Num::Double(v) => *v as f32,
            Num::BigInteger(v) => v.to_f32().unwrap_or(f32::NAN),
            Num::BigDecimal(d) => d.to_f64() as f32,
        }
    }

    /// Integral value, truncated toward zero; NaN and infinities are zero.
    fn to_big(&self) -> BigInt {
        match self {
            Num::Int(v) => BigInt::from(*v),
            Num::Long(v) => BigInt::from(*v),
            Num::Float(v) => BigInt::from_f32(*v).unwrap_or_default(),
            Num::Double(v) => BigInt::from_f64(*v).unwrap_or_default(),
            Num::BigInteger(v) => v.clone(),
            Num::BigDecimal(d) => d.truncate(),
        }
    }

    /// `Number.longValue()`: floating kinds saturate, integral kinds wrap.
    fn to_i64(&self) -> i64 {
        match self {
            Num::Int(v) => *v as i64,
            Num::Long(v) => *v,
            Num::Float(v) => *v as i64,
            Num::Double(v) => *v as i64,
            other => wrapping_i64(&other.to_big()),
        }
    }

    fn to_i32(&self) -> i32 {
        match self {
            Num::Float(v) => *v as i32,
            Num::Double(v) => *v as i32,
            other => other.to_i64() as i32,
        }
    }

    fn compare(&self, other: &Num) -> Ordering {
        if self.is_floating() || other.is_floating() {
            self.to_f64().partial_cmp(&other.to_f64()).unwrap_or(Ordering::Less)
        } else {
            self.to_big().cmp(&other.to_big())
        }
    }

    fn to_primitive(&self, p: Primitive) -> Value {
        match p {
            Primitive::Boolean => Value::Int(!self.to_big().is_zero() as i32),
            Primitive::Byte => Value::Int(self.to_i32() as i8 as i32),
            Primitive::Short => Value::Int(self.to_i32() as i16 as i32),
            Primitive::Char => Value::Int(self.to_i32() as u16 as i32),
            Primitive::Int => Value::Int(self.to_i32()),
            Primitive::Long => Value::Long(self.to_i64()),
            Primitive::Float => Value::Float(self.to_f32()),
            Primitive::Double => Value::Double(self.to_f64()),
        }
    }
}

fn primitive_num(value: Value) -> Option<Num> {
    Some(match value {
        Value::Int(v) => Num::Int(v),
        Value::Long(v) => Num::Long(v),
        Value::Float(v) => Num::Float(v),
        Value::Double(v) => Num::Double(v),
        Value::Null | Value::Ref(_) => return None,
    })
}

/// `String.compareTo`: first differing UTF-16 unit, else length difference.
fn compare_strings(a: &str, b: &str) -> i32 {
    let a: Vec<u16> = a.encode_utf16().collect();
    let b: Vec<u16> = b.encode_utf16().collect();
    for (x, y) in a.iter().zip(&b) {
        if x != y {
            return *x as i32 - *y as i32;
        }
    }
    a.len() as i32 - b.len() as i32
}

fn ordering_value(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn internal_to_dotted(owner: &str) -> String {
    owner.replace('/', ".")
}

fn handle_invoke_kind(kind: HandleKind) -> InvokeKind {
    match kind {
        HandleKind::InvokeStatic => InvokeKind::Static,
        HandleKind::InvokeVirtual => InvokeKind::Virtual,
        HandleKind::InvokeInterface => InvokeKind::Interface,
        HandleKind::InvokeSpecial | HandleKind::NewInvokeSpecial => InvokeKind::Special,
    }
}

/// Host-provided method body: receives the receiver (if any) followed by the
/// arguments.
pub type NativeFn = fn(&mut Machine, Vec<Value>) -> Result<Value>;

/// Final state of one executed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub value: Option<Value>,
    /// Local slots at return; unassigned slots read as `Null`.
    pub locals: Vec<Value>,
}

pub struct Machine {
    class: String,
    heap: Vec<Object>,
    methods: HashMap<String, Rc<EmittedCode>>,
    natives: HashMap<(String, String), NativeFn>,
}

impl Machine {
    /// A machine for code compiled into `class`, whose synthetic methods are
    /// callable by name.
    pub fn new(class: &Type, synthetics: &[MethodCode]) -> Self {
        let methods = synthetics
            .iter()
            .map(|m| (m.method.name.clone(), Rc::new(m.code.clone())))
            .collect();
        Self { class: class.internal_name(), heap: Vec::new(), methods, natives: HashMap::new() }
    }

    /// Provide the body of `owner.name` (owner dotted).
    pub fn define(&mut self, owner: &str, name: &str, f: NativeFn) {
        self.natives.insert((owner.replace('.', "/"), name.to_string()), f);
    }

    pub fn alloc(&mut self, object: Object) -> Value {
        self.heap.push(object);
        Value::Ref(self.heap.len() - 1)
    }

    pub fn object(&self, value: Value) -> Option<&Object> {
        match value {
            Value::Ref(index) => self.heap.get(index),
            _ => None,
        }
    }

    fn object_mut(&mut self, value: Value) -> Option<&mut Object> {
        match value {
            Value::Ref(index) => self.heap.get_mut(index),
            _ => None,
        }
    }

    pub fn string(&mut self, s: &str) -> Value {
        self.alloc(Object::Str(s.to_string()))
    }

    pub fn boxed(&mut self, kind: Primitive, value: Value) -> Value {
        self.alloc(Object::Boxed { kind, value })
    }

    pub fn list(&mut self, items: Vec<Value>) -> Value {
        self.alloc(Object::List(items))
    }

    pub fn instance(&mut self, class: &str, fields: &[(&str, Value)]) -> Value {
        let fields = fields.iter().map(|(n, v)| (n.to_string(), *v)).collect();
        self.alloc(Object::Instance { class: class.to_string(), fields })
    }

    pub fn field(&self, value: Value, name: &str) -> Option<Value> {
        match self.object(value)? {
            Object::Instance { fields, .. } => fields.iter().find(|(n, _)| n == name).map(|(_, v)| *v),
            _ => None,
        }
    }

    /// Identity as `IF_ACMPEQ` sees it.
    pub fn same(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Ref(x), Value::Ref(y)) => x == y,
            _ => false,
        }
    }

    fn num(&self, value: Value) -> Option<Num> {
        if let Some(n) = primitive_num(value) {
            return Some(n);
        }
        match self.object(value)? {
            Object::Boxed { kind, value } if kind.is_numeric() && *kind != Primitive::Char => primitive_num(*value),
            Object::BigInteger(v) => Some(Num::BigInteger(v.clone())),
            Object::BigDecimal(d) => Some(Num::BigDecimal(d.clone())),
            _ => None,
        }
    }

    /// Numeric value of a number or boxed number as `i64`.
    pub fn long_value(&self, value: Value) -> Option<i64> {
        self.num(value).map(|n| n.to_i64())
    }

    pub fn int_value(&self, value: Value) -> Option<i32> {
        self.num(value).map(|n| n.to_i32())
    }

    fn box_num(&mut self, num: Num) -> Value {
        match num {
            Num::Int(v) => self.boxed(Primitive::Int, Value::Int(v)),
            Num::Long(v) => self.boxed(Primitive::Long, Value::Long(v)),
            Num::Float(v) => self.boxed(Primitive::Float, Value::Float(v)),
            Num::Double(v) => self.boxed(Primitive::Double, Value::Double(v)),
            Num::BigInteger(v) => self.alloc(Object::BigInteger(v)),
            Num::BigDecimal(d) => self.alloc(Object::BigDecimal(d)),
        }
    }

    /// Groovy truth: null, zero, empty strings and empty collections are false.
    pub fn truth(&self, value: Value) -> bool {
        match value {
            Value::Null => false,
            Value::Int(v) => v != 0,
            Value::Long(v) => v != 0,
            Value::Float(v) => v != 0.0,
            Value::Double(v) => v != 0.0,
            Value::Ref(_) => match self.object(value) {
                Some(Object::Boxed { value, .. }) => self.truth(*value),
                Some(Object::Str(s)) => !s.is_empty(),
                Some(Object::BigInteger(v)) => !v.is_zero(),
                Some(Object::BigDecimal(d)) => !d.is_zero(),
                Some(Object::List(items)) | Some(Object::Array { items, .. }) => !items.is_empty(),
                _ => true,
            },
        }
    }

    /// `toString()` of a value.
    pub fn render(&self, value: Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => format!("{v:?}"),
            Value::Double(v) => format!("{v:?}"),
            Value::Ref(_) => match self.object(value) {
                Some(Object::Boxed { kind: Primitive::Boolean, value }) => (self.truth(*value)).to_string(),
                Some(Object::Boxed { kind: Primitive::Char, value: Value::Int(c) }) => {
                    char::from_u32(*c as u32).map(String::from).unwrap_or_default()
                }
                Some(Object::Boxed { value, .. }) => self.render(*value),
                Some(Object::Str(s)) => s.clone(),
                Some(Object::BigInteger(v)) => v.to_string(),
                Some(Object::BigDecimal(d)) => d.to_string(),
                Some(Object::List(items)) | Some(Object::Array { items, .. }) => {
                    let parts: Vec<String> = items.iter().map(|v| self.render(*v)).collect();
                    format!("[{}]", parts.join(", "))
                }
                Some(Object::Instance { class, .. }) => format!("{class}@{:x}", self.ref_index(value)),
                Some(Object::Lambda { site, .. }) => format!("{}$$Lambda", site.implementation.owner),
                Some(Object::Class(ty)) => format!("class {ty}"),
                Some(Object::MethodPointer { name, .. }) => format!("MethodClosure({name})"),
                None => "<dangling>".to_string(),
            },
        }
    }

    fn ref_index(&self, value: Value) -> usize {
        match value {
            Value::Ref(i) => i,
            _ => 0,
        }
    }

    /// Run `code` with `args` placed in the leading local slots.
    pub fn run(&mut self, code: &EmittedCode, args: Vec<Value>) -> Result<Outcome> {
        let mut locals: Vec<Option<Value>> = vec![None; code.max_locals as usize];
        let mut slot = 0usize;
        for arg in args {
            let width = if arg.is_wide() { 2 } else { 1 };
            if locals.len() < slot + width {
                locals.resize(slot + width, None);
            }
            locals[slot] = Some(arg);
            slot += width;
        }
        let labels: HashMap<Label, usize> = code
            .insns
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Insn::Label(l) => Some((*l, i)),
                _ => None,
            })
            .collect();
        let jump = |label: &Label| labels.get(label).copied().ok_or(InterpError::UnknownLabel(*label));

        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;
        macro_rules! pop {
            () => {
                stack.pop().ok_or(InterpError::StackUnderflow { pc })?
            };
        }

        while let Some(insn) = code.insns.get(pc) {
            pc += 1;
            match insn {
                Insn::AConstNull => stack.push(Value::Null),
                Insn::IConst(v) => stack.push(Value::Int(*v)),
                Insn::LConst(v) => stack.push(Value::Long(*v)),
                Insn::FConst(v) => stack.push(Value::Float(*v)),
                Insn::DConst(v) => stack.push(Value::Double(*v)),
                Insn::Ldc(c) => {
                    let value = self.constant(c);
                    stack.push(value);
                }
                Insn::LdcClass(ty) => {
                    let value = self.alloc(Object::Class(ty.clone()));
                    stack.push(value);
                }
                Insn::Load { slot, .. } => {
                    let value = locals
                        .get(*slot as usize)
                        .copied()
                        .flatten()
                        .ok_or(InterpError::UnsetLocal(*slot))?;
                    stack.push(value);
                }
                Insn::Store { slot, .. } => {
                    let value = pop!();
                    let index = *slot as usize;
                    if locals.len() <= index + 1 {
                        locals.resize(index + 2, None);
                    }
                    locals[index] = Some(value);
                }
                Insn::Dup | Insn::Dup2 => {
                    let top = *stack.last().ok_or(InterpError::StackUnderflow { pc })?;
                    stack.push(top);
                }
                Insn::Pop | Insn::Pop2 => {
                    pop!();
                }
                Insn::IXor => {
                    let (b, a) = (pop!(), pop!());
                    stack.push(Value::Int(self.int_operand(a)? ^ self.int_operand(b)?));
                }
                Insn::LXor => match (pop!(), pop!()) {
                    (Value::Long(b), Value::Long(a)) => stack.push(Value::Long(a ^ b)),
                    other => return Err(InterpError::TypeMismatch(format!("LXOR on {other:?}"))),
                },
                Insn::INeg => {
                    let a = pop!();
                    stack.push(Value::Int(self.int_operand(a)?.wrapping_neg()));
                }
                Insn::LNeg => match pop!() {
                    Value::Long(v) => stack.push(Value::Long(v.wrapping_neg())),
                    other => return Err(InterpError::TypeMismatch(format!("LNEG on {other:?}"))),
                },
                Insn::FNeg => match pop!() {
                    Value::Float(v) => stack.push(Value::Float(-v)),
                    other => return Err(InterpError::TypeMismatch(format!("FNEG on {other:?}"))),
                },
                Insn::DNeg => match pop!() {
                    Value::Double(v) => stack.push(Value::Double(-v)),
                    other => return Err(InterpError::TypeMismatch(format!("DNEG on {other:?}"))),
                },
                Insn::Convert { to, .. } => {
                    let value = pop!();
                    let num = primitive_num(value)
                        .ok_or_else(|| InterpError::TypeMismatch(format!("conversion of {value:?}")))?;
                    stack.push(num.to_primitive(*to));
                }
                Insn::I2B | Insn::I2C | Insn::I2S => {
                    let value = pop!();
                    let v = self.int_operand(value)?;
                    stack.push(Value::Int(match insn {
                        Insn::I2B => v as i8 as i32,
                        Insn::I2C => v as u16 as i32,
                        _ => v as i16 as i32,
                    }));
                }
                Insn::LCmp | Insn::FCmpL | Insn::FCmpG | Insn::DCmpL | Insn::DCmpG => {
                    let (b, a) = (pop!(), pop!());
                    let (Some(a), Some(b)) = (primitive_num(a), primitive_num(b)) else {
                        return Err(InterpError::TypeMismatch(format!("{insn} on references")));
                    };
                    let unordered = a.to_f64().is_nan() || b.to_f64().is_nan();
                    let result = match insn {
                        Insn::FCmpG | Insn::DCmpG if unordered => 1,
                        _ if unordered => -1,
                        _ => ordering_value(a.compare(&b)),
                    };
                    stack.push(Value::Int(result));
                }
                Insn::IfEq(l) | Insn::IfNe(l) => {
                    let value = pop!();
                    let zero = self.int_operand(value)? == 0;
                    if zero == matches!(insn, Insn::IfEq(_)) {
                        pc = jump(l)?;
                    }
                }
                Insn::If(cmp, l) => {
                    let value = pop!();
                    if cmp.holds(self.int_operand(value)?.cmp(&0)) {
                        pc = jump(l)?;
                    }
                }
                Insn::IfICmp(cmp, l) => {
                    let (b, a) = (pop!(), pop!());
                    if cmp.holds(self.int_operand(a)?.cmp(&self.int_operand(b)?)) {
                        pc = jump(l)?;
                    }
                }
                Insn::IfNull(l) | Insn::IfNonNull(l) => {
                    let is_null = pop!() == Value::Null;
                    if is_null == matches!(insn, Insn::IfNull(_)) {
                        pc = jump(l)?;
                    }
                }
                Insn::IfACmpEq(l) | Insn::IfACmpNe(l) => {
                    let (b, a) = (pop!(), pop!());
                    if self.same(a, b) == matches!(insn, Insn::IfACmpEq(_)) {
                        pc = jump(l)?;
                    }
                }
                Insn::Goto(l) => pc = jump(l)?,
                Insn::Label(_) => {}
                Insn::Invoke { kind, owner, name, desc, .. } => {
                    let (params, ret) =
                        parse_method_descriptor(desc).ok_or_else(|| InterpError::BadDescriptor(desc.clone()))?;
                    let count = params.len() + usize::from(*kind != InvokeKind::Static);
                    if stack.len() < count {
                        return Err(InterpError::StackUnderflow { pc });
                    }
                    let args = stack.split_off(stack.len() - count);
                    let result = self.invoke(*kind, owner, name, desc, args)?;
                    if ret != Type::Void {
                        stack.push(result);
                    }
                }
                Insn::InvokeDynamic(site) => {
                    let (params, _) = parse_method_descriptor(&site.desc)
                        .ok_or_else(|| InterpError::BadDescriptor(site.desc.clone()))?;
                    if stack.len() < params.len() {
                        return Err(InterpError::StackUnderflow { pc });
                    }
                    let captured = stack.split_off(stack.len() - params.len());
                    let value = self.alloc(Object::Lambda { site: site.clone(), captured });
                    stack.push(value);
                }
                Insn::New(owner) => {
                    let object = if owner == &Type::object(ARRAY_LIST).internal_name() {
                        Object::List(Vec::new())
                    } else {
                        Object::Instance { class: internal_to_dotted(owner), fields: Vec::new() }
                    };
                    let value = self.alloc(object);
                    stack.push(value);
                }
                Insn::CheckCast(_) => {}
                Insn::NewArray(p) => {
                    let size = pop!();
                    let size = self.int_operand(size)?;
                    let value = self.new_array(&Type::Primitive(*p), &[size])?;
                    stack.push(value);
                }
                Insn::ANewArray(component) => {
                    let size = pop!();
                    let size = self.int_operand(size)?;
                    let element = Type::from_descriptor(component)
                        .filter(Type::is_array)
                        .unwrap_or_else(|| Type::object(internal_to_dotted(component)));
                    let value = self.new_array(&element, &[size])?;
                    stack.push(value);
                }
                Insn::MultiANewArray { desc, dims } => {
                    let dims = *dims as usize;
                    if stack.len() < dims {
                        return Err(InterpError::StackUnderflow { pc });
                    }
                    let sizes: Vec<i32> = stack
                        .split_off(stack.len() - dims)
                        .into_iter()
                        .map(|v| self.int_operand(v))
                        .collect::<Result<_>>()?;
                    let mut element =
                        Type::from_descriptor(desc).ok_or_else(|| InterpError::BadDescriptor(desc.clone()))?;
                    for _ in 0..dims {
                        element = element.component().cloned().unwrap_or(element);
                    }
                    let value = self.new_array(&element, &sizes)?;
                    stack.push(value);
                }
                Insn::AAStore => {
                    let (value, index, array) = (pop!(), pop!(), pop!());
                    let index = self.int_operand(index)?;
                    match self.object_mut(array) {
                        Some(Object::Array { items, .. }) => {
                            let len = items.len();
                            let item = usize::try_from(index)
                                .ok()
                                .and_then(|i| items.get_mut(i))
                                .ok_or(InterpError::IndexOutOfBounds { index, len })?;
                            *item = value;
                        }
                        _ => return Err(InterpError::TypeMismatch("AASTORE into a non-array".into())),
                    }
                }
                Insn::Return(ty) => {
                    let value = if *ty == Type::Void { None } else { Some(pop!()) };
                    return Ok(Outcome { value, locals: locals.into_iter().map(|v| v.unwrap_or(Value::Null)).collect() });
                }
            }
        }
        Ok(Outcome { value: None, locals: locals.into_iter().map(|v| v.unwrap_or(Value::Null)).collect() })
    }

    fn int_operand(&self, value: Value) -> Result<i32> {
        value.as_int().ok_or_else(|| InterpError::TypeMismatch(format!("expected int, found {value:?}")))
    }

    fn constant(&mut self, c: &Constant) -> Value {
        match c {
            Constant::Null => Value::Null,
            Constant::Boolean(b) => Value::Int(*b as i32),
            Constant::Byte(v) => Value::Int(*v as i32),
            Constant::Short(v) => Value::Int(*v as i32),
            Constant::Char(v) => Value::Int(*v as u32 as i32),
            Constant::Int(v) => Value::Int(*v),
            Constant::Long(v) => Value::Long(*v),
            Constant::Float(v) => Value::Float(*v),
            Constant::Double(v) => Value::Double(*v),
            Constant::BigInteger(v) => self.alloc(Object::BigInteger(v.clone())),
            Constant::BigDecimal(d) => self.alloc(Object::BigDecimal(d.clone())),
            Constant::String(s) => self.alloc(Object::Str(s.clone())),
        }
    }

    fn new_array(&mut self, element: &Type, sizes: &[i32]) -> Result<Value> {
        let Some((&size, rest)) = sizes.split_first() else {
            return Err(InterpError::TypeMismatch("array without dimensions".into()));
        };
        let len = usize::try_from(size).map_err(|_| InterpError::IndexOutOfBounds { index: size, len: 0 })?;
        let mut items = Vec::with_capacity(len);
        let inner = (0..rest.len()).fold(element.clone(), |acc, _| Type::array(acc));
        for _ in 0..len {
            items.push(if rest.is_empty() {
                match element {
                    Type::Primitive(Primitive::Long) => Value::Long(0),
                    Type::Primitive(Primitive::Float) => Value::Float(0.0),
                    Type::Primitive(Primitive::Double) => Value::Double(0.0),
                    Type::Primitive(_) => Value::Int(0),
                    _ => Value::Null,
                }
            } else {
                self.new_array(element, rest)?
            });
        }
        Ok(self.alloc(Object::Array { element: inner, items }))
    }

    /// Call a method the way an `INVOKE*` instruction does; `args` starts
    /// with the receiver for non-static kinds.
    pub fn invoke(&mut self, kind: InvokeKind, owner: &str, name: &str, desc: &str, args: Vec<Value>) -> Result<Value> {
        if owner == self.class {
            if let Some(code) = self.methods.get(name).cloned() {
                return Ok(self.run(&code, args)?.value.unwrap_or(Value::Null));
            }
        }
        if kind != InvokeKind::Static {
            let receiver = args.first().copied().unwrap_or(Value::Null);
            if receiver == Value::Null {
                return Err(InterpError::NullPointer { method: format!("{owner}.{name}") });
            }
            if let Some(Object::Lambda { site, captured }) = self.object(receiver) {
                if site.name == name {
                    let (site, captured) = (site.clone(), captured.clone());
                    return self.invoke_functional(&site, captured, args[1..].to_vec());
                }
            }
            if let Some(Object::Instance { class, .. }) = self.object(receiver) {
                let key = (class.replace('.', "/"), name.to_string());
                if let Some(f) = self.natives.get(&key).copied() {
                    return f(self, args);
                }
            }
        }
        if let Some(f) = self.natives.get(&(owner.to_string(), name.to_string())).copied() {
            return f(self, args);
        }
        self.builtin(kind, owner, name, args)
            .unwrap_or_else(|| Err(InterpError::UnknownMethod { owner: owner.into(), name: name.into(), desc: desc.into() }))
    }

    /// Invoke the abstract method of a value produced by a call site.
    /// `args` follow the abstract method's erased descriptor.
    pub fn call_functional(&mut self, target: Value, args: Vec<Value>) -> Result<Option<Value>> {
        let Some(Object::Lambda { site, captured }) = self.object(target) else {
            return Err(InterpError::TypeMismatch(format!("{} is not a functional value", self.render(target))));
        };
        let (site, captured) = (site.clone(), captured.clone());
        let ret = parse_method_descriptor(&site.sam_desc).map(|(_, r)| r);
        let value = self.invoke_functional(&site, captured, args)?;
        Ok(if ret == Some(Type::Void) { None } else { Some(value) })
    }

    fn invoke_functional(&mut self, site: &CallSite, captured: Vec<Value>, args: Vec<Value>) -> Result<Value> {
        let bad = |d: &str| InterpError::BadDescriptor(d.to_string());
        let (sam_params, sam_ret) = parse_method_descriptor(&site.sam_desc).ok_or_else(|| bad(&site.sam_desc))?;
        let (cap_params, _) = parse_method_descriptor(&site.desc).ok_or_else(|| bad(&site.desc))?;
        let handle = &site.implementation;
        let (impl_params, impl_ret) = parse_method_descriptor(&handle.desc).ok_or_else(|| bad(&handle.desc))?;

        let incoming: Vec<Type> = cap_params.into_iter().chain(sam_params).collect();
        let mut expected = Vec::with_capacity(impl_params.len() + 1);
        if handle.kind != HandleKind::InvokeStatic {
            expected.push(Type::object(internal_to_dotted(&handle.owner)));
        }
        expected.extend(impl_params);
        let values: Vec<Value> = captured.into_iter().chain(args).collect();
        if values.len() != expected.len() || incoming.len() != expected.len() {
            return Err(InterpError::TypeMismatch(format!(
                "{} arguments for {}.{}{}",
                values.len(),
                handle.owner,
                handle.name,
                handle.desc
            )));
        }
        let adapted = values
            .into_iter()
            .zip(incoming.iter().zip(&expected))
            .map(|(v, (from, to))| self.adapt(v, from, to))
            .collect::<Result<Vec<_>>>()?;
        let result = self.invoke(handle_invoke_kind(handle.kind), &handle.owner, &handle.name, &handle.desc, adapted)?;
        if impl_ret == Type::Void || sam_ret == Type::Void {
            return Ok(Value::Null);
        }
        self.adapt(result, &impl_ret, &sam_ret)
    }

    /// Box or unbox `value` of static type `from` for a slot of type `to`.
    fn adapt(&mut self, value: Value, from: &Type, to: &Type) -> Result<Value> {
        match (from, to) {
            (_, Type::Primitive(p)) if matches!(value, Value::Ref(_) | Value::Null) => self.unbox(value, *p),
            (_, Type::Primitive(p)) => {
                let num = primitive_num(value).ok_or_else(|| InterpError::TypeMismatch(format!("{value:?}")))?;
                Ok(num.to_primitive(*p))
            }
            (Type::Primitive(p), _) => Ok(self.boxed(*p, value)),
            _ => match value {
                Value::Int(v) => Ok(self.boxed(Primitive::Int, Value::Int(v))),
                Value::Long(v) => Ok(self.boxed(Primitive::Long, Value::Long(v))),
                Value::Float(v) => Ok(self.boxed(Primitive::Float, Value::Float(v))),
                Value::Double(v) => Ok(self.boxed(Primitive::Double, Value::Double(v))),
                reference => Ok(reference),
            },
        }
    }

    fn unbox(&self, value: Value, p: Primitive) -> Result<Value> {
        if p == Primitive::Boolean {
            return Ok(Value::Int(self.truth(value) as i32));
        }
        if let Some(Object::Boxed { kind: Primitive::Char | Primitive::Boolean, value: inner }) = self.object(value) {
            return Ok(Num::Int(self.int_operand(*inner)?).to_primitive(p));
        }
        let num = self
            .num(value)
            .ok_or_else(|| InterpError::TypeMismatch(format!("cannot unbox {} to {}", self.render(value), p.name())))?;
        Ok(num.to_primitive(p))
    }

    fn compare_values(&self, left: Value, right: Value) -> Result<i32> {
        match (left, right) {
            (Value::Null, Value::Null) => return Ok(0),
            (Value::Null, _) => return Ok(-1),
            (_, Value::Null) => return Ok(1),
            _ => {}
        }
        if let (Some(a), Some(b)) = (self.num(left), self.num(right)) {
            return Ok(ordering_value(a.compare(&b)));
        }
        match (self.object(left), self.object(right)) {
            (Some(Object::Str(a)), Some(Object::Str(b))) => Ok(compare_strings(a, b)),
            (Some(Object::Boxed { value: a, .. }), Some(Object::Boxed { value: b, .. })) => {
                Ok(ordering_value(self.int_operand(*a)?.cmp(&self.int_operand(*b)?)))
            }
            _ => Err(InterpError::TypeMismatch(format!(
                "cannot compare {} with {}",
                self.render(left),
                self.render(right)
            ))),
        }
    }

    fn equal_values(&self, left: Value, right: Value) -> bool {
        if self.same(left, right) {
            return true;
        }
        if let (Some(a), Some(b)) = (self.num(left), self.num(right)) {
            return a.compare(&b) == Ordering::Equal;
        }
        match (self.object(left), self.object(right)) {
            (Some(Object::Str(a)), Some(Object::Str(b))) => a == b,
            (Some(Object::Boxed { kind: ka, value: a }), Some(Object::Boxed { kind: kb, value: b })) => {
                ka == kb && a == b
            }
            (Some(Object::List(a)), Some(Object::List(b))) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.equal_values(*x, *y))
            }
            _ => left == right,
        }
    }

    fn items(&self, value: Value) -> Option<&[Value]> {
        match self.object(value)? {
            Object::List(items) | Object::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    fn str(&self, value: Value) -> Option<&str> {
        match self.object(value)? {
            Object::Str(s) => Some(s),
            _ => None,
        }
    }

    fn bool_value(b: bool) -> Value {
        Value::Int(b as i32)
    }

    fn arithmetic(&mut self, name: &str, left: Value, right: Value) -> Option<Result<Value>> {
        if name == "plus" {
            if let Some(s) = self.str(left) {
                let joined = format!("{}{}", s, self.render(right));
                return Some(Ok(self.string(&joined)));
            }
        }
        let (a, b) = (self.num(left)?, self.num(right)?);
        let result = if a.is_floating() || b.is_floating() || name == "div" {
            let (x, y) = (a.to_f64(), b.to_f64());
            let v = match name {
                "plus" => x + y,
                "minus" => x - y,
                "multiply" => x * y,
                "div" => x / y,
                "mod" => x % y,
                _ => return None,
            };
            Num::Double(v)
        } else if matches!(a, Num::BigInteger(_)) || matches!(b, Num::BigInteger(_)) {
            let (x, y) = (a.to_big(), b.to_big());
            Num::BigInteger(match name {
                "plus" => x + y,
                "minus" => x - y,
                "multiply" => x * y,
                "mod" if !y.is_zero() => x % y,
                _ => return None,
            })
        } else if matches!(a, Num::Long(_)) || matches!(b, Num::Long(_)) {
            let (x, y) = (a.to_i64(), b.to_i64());
            Num::Long(match name {
                "plus" => x.wrapping_add(y),
                "minus" => x.wrapping_sub(y),
                "multiply" => x.wrapping_mul(y),
                "mod" if y != 0 => x.wrapping_rem(y),
                _ => return None,
            })
        } else {
            let (x, y) = (a.to_i32(), b.to_i32());
            Num::Int(match name {
                "plus" => x.wrapping_add(y),
                "minus" => x.wrapping_sub(y),
                "multiply" => x.wrapping_mul(y),
                "mod" if y != 0 => x.wrapping_rem(y),
                _ => return None,
            })
        };
        Some(Ok(self.box_num(result)))
    }

    /// `InvokerHelper.invokeMethod(receiver, name, args)`.
    fn invoke_dynamic_method(&mut self, receiver: Value, name: &str, args: Value) -> Result<Value> {
        let args: Vec<Value> = match self.object(args) {
            Some(Object::Array { items, .. }) => items.clone(),
            _ => vec![args],
        };
        if let [right] = args.as_slice() {
            if let Some(result) = self.arithmetic(name, receiver, *right) {
                return result;
            }
        }
        let mut call = vec![receiver];
        call.extend(args);
        let result = self.invoke(InvokeKind::Virtual, "java/lang/Object", name, "", call)?;
        self.adapt(result, &Type::Void, &Type::object_type())
    }

    fn builtin(&mut self, kind: InvokeKind, owner: &str, name: &str, args: Vec<Value>) -> Option<Result<Value>> {
        let owner_name = internal_to_dotted(owner);
        let arg = |i: usize| args.get(i).copied().unwrap_or(Value::Null);

        if kind == InvokeKind::Static {
            if let Some(p) = Primitive::from_wrapper_name(&owner_name).filter(|_| name == "valueOf") {
                return Some(Ok(self.boxed(p, arg(0))));
            }
            return match (owner_name.as_str(), name) {
                (STRING, "valueOf") => {
                    let text = self.render(arg(0));
                    Some(Ok(self.string(&text)))
                }
                (TYPE_TRANSFORMATION, unbox) if unbox.ends_with("Unbox") => {
                    let kind = Primitive::ALL.into_iter().find(|p| format!("{}Unbox", p.name()) == unbox)?;
                    Some(self.unbox(arg(0), kind))
                }
                (BYTECODE_ADAPTER, "compareTo") => Some(self.compare_values(arg(0), arg(1)).map(Value::Int)),
                (BYTECODE_ADAPTER, "compareEqual") => Some(Ok(Self::bool_value(self.equal_values(arg(0), arg(1))))),
                (BYTECODE_ADAPTER, "compareNotEqual") => Some(Ok(Self::bool_value(!self.equal_values(arg(0), arg(1))))),
                (BYTECODE_ADAPTER, "compareLessThan") => Some(self.compare_values(arg(0), arg(1)).map(|c| Self::bool_value(c < 0))),
                (BYTECODE_ADAPTER, "compareLessThanEqual") => {
                    Some(self.compare_values(arg(0), arg(1)).map(|c| Self::bool_value(c <= 0)))
                }
                (BYTECODE_ADAPTER, "compareGreaterThan") => Some(self.compare_values(arg(0), arg(1)).map(|c| Self::bool_value(c > 0))),
                (BYTECODE_ADAPTER, "compareGreaterThanEqual") => {
                    Some(self.compare_values(arg(0), arg(1)).map(|c| Self::bool_value(c >= 0)))
                }
                (BYTECODE_ADAPTER, "bitwiseNegate") => Some(self.numeric_unary(arg(0), |n| match n {
                    Num::Int(v) => Some(Num::Int(!v)),
                    Num::Long(v) => Some(Num::Long(!v)),
                    Num::BigInteger(v) => Some(Num::BigInteger(!v)),
                    _ => None,
                })),
                (BYTECODE_ADAPTER, "unaryMinus") => Some(self.numeric_unary(arg(0), |n| {
                    Some(match n {
                        Num::Int(v) => Num::Int(v.wrapping_neg()),
                        Num::Long(v) => Num::Long(v.wrapping_neg()),
                        Num::Float(v) => Num::Float(-v),
                        Num::Double(v) => Num::Double(-v),
                        Num::BigInteger(v) => Num::BigInteger(-v),
                        Num::BigDecimal(d) => Num::BigDecimal(d.negate()),
                    })
                })),
                (BYTECODE_ADAPTER, "unaryPlus") => Some(self.numeric_unary(arg(0), Some)),
                (BYTECODE_ADAPTER, "setProperty") => {
                    let (value, target, property) = (arg(0), arg(2), self.str(arg(3))?.to_string());
                    Some(self.set_field(target, &property, value).map(|_| Value::Null))
                }
                (BYTECODE_ADAPTER, "getMethodPointer") => {
                    let name = self.str(arg(1))?.to_string();
                    Some(Ok(self.alloc(Object::MethodPointer { receiver: arg(0), name })))
                }
                (INVOKER_HELPER, "invokeMethod") => {
                    let name = self.str(arg(1))?.to_string();
                    Some(self.invoke_dynamic_method(arg(0), &name, arg(2)))
                }
                (DEFAULT_GROOVY_METHODS, "isCase") => {
                    let found = match self.items(arg(0)) {
                        Some(items) => items.iter().any(|v| self.equal_values(*v, arg(1))),
                        None => self.equal_values(arg(0), arg(1)),
                    };
                    Some(Ok(Self::bool_value(found)))
                }
                (STRING_GROOVY_METHODS, "capitalize") => {
                    let s = self.str(arg(0))?;
                    let mut chars = s.chars();
                    let out: String = match chars.next() {
                        Some(c) => c.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    };
                    Some(Ok(self.string(&out)))
                }
                (STRING_GROOVY_METHODS, "reverse") => {
                    let out: String = self.str(arg(0))?.chars().rev().collect();
                    Some(Ok(self.string(&out)))
                }
                (DEFAULT_GROOVY_STATIC_METHODS, "currentTimeSeconds") => {
                    let secs = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_secs() as i64)
                        .unwrap_or(0);
                    Some(Ok(Value::Long(secs)))
                }
                _ => None,
            };
        }

        let receiver = arg(0);
        if name == "<init>" {
            let fields: Vec<(String, Value)> =
                args[1..].iter().enumerate().map(|(i, v)| (format!("_{i}"), *v)).collect();
            if let Some(Object::Instance { fields: slot, .. }) = self.object_mut(receiver) {
                *slot = fields;
            }
            return Some(Ok(Value::Null));
        }
        if let Some(p) = Primitive::ALL.into_iter().find(|p| format!("{}Value", p.name()) == name) {
            return Some(self.unbox(receiver, p));
        }
        match (name, args.len()) {
            ("compareTo", 2) => return Some(self.compare_values(receiver, arg(1)).map(Value::Int)),
            ("equals", 2) => return Some(Ok(Self::bool_value(self.equal_values(receiver, arg(1))))),
            ("toString", 1) => {
                let text = self.render(receiver);
                return Some(Ok(self.string(&text)));
            }
            _ => {}
        }
        if let Some(s) = self.str(receiver).map(str::to_string) {
            return match (name, args.len()) {
                ("length", 1) => Some(Ok(Value::Int(s.encode_utf16().count() as i32))),
                ("isEmpty", 1) => Some(Ok(Self::bool_value(s.is_empty()))),
                ("charAt", 2) => {
                    let index = self.int_operand(arg(1)).ok()?;
                    let unit = usize::try_from(index).ok().and_then(|i| s.encode_utf16().nth(i));
                    Some(unit.map(|u| Value::Int(u as i32)).ok_or(InterpError::IndexOutOfBounds {
                        index,
                        len: s.encode_utf16().count(),
                    }))
                }
                ("toUpperCase", 1) => Some(Ok(self.string(&s.to_uppercase()))),
                ("trim", 1) => Some(Ok(self.string(s.trim()))),
                ("concat", 2) => {
                    let other = self.str(arg(1))?.to_string();
                    Some(Ok(self.string(&format!("{s}{other}"))))
                }
                _ => None,
            };
        }
        if let Some(items) = self.items(receiver).map(<[Value]>::to_vec) {
            return match (name, args.len()) {
                ("add", 2) => match self.object_mut(receiver) {
                    Some(Object::List(items)) => {
                        items.push(arg(1));
                        Some(Ok(Value::Int(1)))
                    }
                    _ => None,
                },
                ("size", 1) => Some(Ok(Value::Int(items.len() as i32))),
                ("isEmpty", 1) => Some(Ok(Self::bool_value(items.is_empty()))),
                ("get", 2) => {
                    let index = self.int_operand(arg(1)).ok()?;
                    Some(
                        usize::try_from(index)
                            .ok()
                            .and_then(|i| items.get(i).copied())
                            .ok_or(InterpError::IndexOutOfBounds { index, len: items.len() }),
                    )
                }
                ("contains", 2) => Some(Ok(Self::bool_value(items.iter().any(|v| self.equal_values(*v, arg(1)))))),
                ("toArray", 2) => {
                    let element = match self.object(arg(1)) {
                        Some(Object::Array { element, .. }) => element.clone(),
                        _ => Type::object_type(),
                    };
                    Some(Ok(self.alloc(Object::Array { element, items })))
                }
                _ => None,
            };
        }
        if let Some(Object::Instance { fields, .. }) = self.object(receiver) {
            let field_name = |prefix: &str| {
                name.strip_prefix(prefix).map(|rest| {
                    let mut chars = rest.chars();
                    chars.next().map(|c| c.to_lowercase().chain(chars).collect::<String>()).unwrap_or_default()
                })
            };
            if args.len() == 1 {
                let field = field_name("get").unwrap_or_else(|| name.to_string());
                if let Some((_, v)) = fields.iter().find(|(n, _)| *n == field) {
                    return Some(Ok(*v));
                }
            }
            if let (2, Some(field)) = (args.len(), field_name("set")) {
                return Some(self.set_field(receiver, &field, arg(1)).map(|_| Value::Null));
            }
        }
        None
    }

    fn numeric_unary(&mut self, value: Value, op: impl FnOnce(Num) -> Option<Num>) -> Result<Value> {
        let num = self.num(value).and_then(op).ok_or_else(|| {
            InterpError::TypeMismatch(format!("no operator method for {}", self.render(value)))
        })?;
        Ok(self.box_num(num))
    }

    fn set_field(&mut self, target: Value, name: &str, value: Value) -> Result<()> {
        match self.object_mut(target) {
            Some(Object::Instance { fields, .. }) => {
                match fields.iter_mut().find(|(n, _)| n == name) {
                    Some((_, slot)) => *slot = value,
                    None => fields.push((name.to_string(), value)),
                }
                Ok(())
            }
            _ => Err(InterpError::TypeMismatch(format!("cannot set property '{name}'"))),
        }
    }
}
