//! Target instruction model: a JVM-shaped stack machine instruction set.

use std::fmt;

use crate::ast::Constant;
use crate::types::{Primitive, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    Virtual,
    Interface,
    Special,
}

/// Integer comparison used by `IF_ICMPxx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cmp {
    fn mnemonic(self) -> &'static str {
        match self {
            Cmp::Eq => "EQ",
            Cmp::Ne => "NE",
            Cmp::Lt => "LT",
            Cmp::Ge => "GE",
            Cmp::Gt => "GT",
            Cmp::Le => "LE",
        }
    }

    pub fn negate(self) -> Cmp {
        match self {
            Cmp::Eq => Cmp::Ne,
            Cmp::Ne => Cmp::Eq,
            Cmp::Lt => Cmp::Ge,
            Cmp::Ge => Cmp::Lt,
            Cmp::Gt => Cmp::Le,
            Cmp::Le => Cmp::Gt,
        }
    }

    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Cmp::Eq => ordering == Equal,
            Cmp::Ne => ordering != Equal,
            Cmp::Lt => ordering == Less,
            Cmp::Ge => ordering != Less,
            Cmp::Gt => ordering == Greater,
            Cmp::Le => ordering != Greater,
        }
    }
}

/// Method handle kinds, numbered as in the class-file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl HandleKind {
    fn mnemonic(self) -> &'static str {
        match self {
            HandleKind::InvokeVirtual => "H_INVOKEVIRTUAL",
            HandleKind::InvokeStatic => "H_INVOKESTATIC",
            HandleKind::InvokeSpecial => "H_INVOKESPECIAL",
            HandleKind::NewInvokeSpecial => "H_NEWINVOKESPECIAL",
            HandleKind::InvokeInterface => "H_INVOKEINTERFACE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub kind: HandleKind,
    /// Internal (slashed) name of the owning class.
    pub owner: String,
    pub name: String,
    pub desc: String,
    pub is_interface: bool,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}{}", self.kind.mnemonic(), self.owner, self.name, self.desc)?;
        if self.is_interface {
            write!(f, " itf")?;
        }
        Ok(())
    }
}

pub const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
pub const METAFACTORY_DESC: &str = "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;";

/// An unlinked call site producing a functional-interface instance. The
/// runtime links it on first execution through the bootstrap method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Name of the interface's abstract method.
    pub name: String,
    /// Captured values to interface type, e.g. `(Ljava/lang/String;)Ljava/util/function/Supplier;`.
    pub desc: String,
    pub bootstrap: Handle,
    /// Erased descriptor of the abstract method.
    pub sam_desc: String,
    pub implementation: Handle,
    /// Abstract method descriptor specialised to the exact parameter types.
    pub instantiated_desc: String,
}

impl CallSite {
    pub fn metafactory_bootstrap(owner_is_interface: bool) -> Handle {
        Handle {
            kind: HandleKind::InvokeStatic,
            owner: LAMBDA_METAFACTORY.to_string(),
            name: "metafactory".to_string(),
            desc: METAFACTORY_DESC.to_string(),
            is_interface: owner_is_interface,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    AConstNull,
    IConst(i32),
    LConst(i64),
    FConst(f32),
    DConst(f64),
    /// String, BigInteger and BigDecimal literals.
    Ldc(Constant),
    LdcClass(Type),
    Load { slot: u16, ty: Type },
    Store { slot: u16, ty: Type },
    Dup,
    Dup2,
    Pop,
    Pop2,
    IXor,
    LXor,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    /// Conversion between the int, long, float and double stack categories.
    Convert { from: Primitive, to: Primitive },
    I2B,
    I2C,
    I2S,
    LCmp,
    /// Float compare; `L` pushes -1 on NaN, `G` pushes 1.
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
    IfEq(Label),
    IfNe(Label),
    /// `IFxx` against zero after a `*CMP`.
    If(Cmp, Label),
    IfICmp(Cmp, Label),
    IfNull(Label),
    IfNonNull(Label),
    IfACmpEq(Label),
    IfACmpNe(Label),
    Goto(Label),
    Label(Label),
    Invoke { kind: InvokeKind, owner: String, name: String, desc: String, is_interface: bool },
    InvokeDynamic(CallSite),
    New(String),
    CheckCast(String),
    NewArray(Primitive),
    ANewArray(String),
    AAStore,
    MultiANewArray { desc: String, dims: u8 },
    Return(Type),
}

impl Insn {
    pub fn invoke_static(owner: &Type, name: &str, desc: String) -> Insn {
        Insn::Invoke {
            kind: InvokeKind::Static,
            owner: owner.internal_name(),
            name: name.to_string(),
            desc,
            is_interface: false,
        }
    }
}

fn category_letter(p: Primitive) -> char {
    match p {
        Primitive::Long => 'L',
        Primitive::Float => 'F',
        Primitive::Double => 'D',
        _ => 'I',
    }
}

/// Letter prefix of the typed load/store/return instruction for `ty`.
fn typed_prefix(ty: &Type) -> char {
    match ty {
        Type::Primitive(p) => category_letter(*p),
        _ => 'A',
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::AConstNull => write!(f, "ACONST_NULL"),
            Insn::IConst(-1) => write!(f, "ICONST_M1"),
            Insn::IConst(v @ 0..=5) => write!(f, "ICONST_{v}"),
            Insn::IConst(v) if i8::try_from(*v).is_ok() => write!(f, "BIPUSH {v}"),
            Insn::IConst(v) if i16::try_from(*v).is_ok() => write!(f, "SIPUSH {v}"),
            Insn::IConst(v) => write!(f, "LDC {v}"),
            Insn::LConst(v @ 0..=1) => write!(f, "LCONST_{v}"),
            Insn::LConst(v) => write!(f, "LDC {v}L"),
            Insn::FConst(v) => write!(f, "LDC {v:?}F"),
            Insn::DConst(v) => write!(f, "LDC {v:?}D"),
            Insn::Ldc(c) => write!(f, "LDC {c}"),
            Insn::LdcClass(ty) => write!(f, "LDC {}.class", ty),
            Insn::Load { slot, ty } => write!(f, "{}LOAD {slot}", typed_prefix(ty)),
            Insn::Store { slot, ty } => write!(f, "{}STORE {slot}", typed_prefix(ty)),
            Insn::Dup => write!(f, "DUP"),
            Insn::Dup2 => write!(f, "DUP2"),
            Insn::Pop => write!(f, "POP"),
            Insn::Pop2 => write!(f, "POP2"),
            Insn::IXor => write!(f, "IXOR"),
            Insn::LXor => write!(f, "LXOR"),
            Insn::INeg => write!(f, "INEG"),
            Insn::LNeg => write!(f, "LNEG"),
            Insn::FNeg => write!(f, "FNEG"),
            Insn::DNeg => write!(f, "DNEG"),
            Insn::Convert { from, to } => write!(f, "{}2{}", category_letter(*from), category_letter(*to)),
            Insn::I2B => write!(f, "I2B"),
            Insn::I2C => write!(f, "I2C"),
            Insn::I2S => write!(f, "I2S"),
            Insn::LCmp => write!(f, "LCMP"),
            Insn::FCmpL => write!(f, "FCMPL"),
            Insn::FCmpG => write!(f, "FCMPG"),
            Insn::DCmpL => write!(f, "DCMPL"),
            Insn::DCmpG => write!(f, "DCMPG"),
            Insn::IfEq(l) => write!(f, "IFEQ {l}"),
            Insn::IfNe(l) => write!(f, "IFNE {l}"),
            Insn::If(cmp, l) => write!(f, "IF{} {l}", cmp.mnemonic()),
            Insn::IfICmp(cmp, l) => write!(f, "IF_ICMP{} {l}", cmp.mnemonic()),
            Insn::IfNull(l) => write!(f, "IFNULL {l}"),
            Insn::IfNonNull(l) => write!(f, "IFNONNULL {l}"),
            Insn::IfACmpEq(l) => write!(f, "IF_ACMPEQ {l}"),
            Insn::IfACmpNe(l) => write!(f, "IF_ACMPNE {l}"),
            Insn::Goto(l) => write!(f, "GOTO {l}"),
            Insn::Label(l) => write!(f, "{l}:"),
            Insn::Invoke { kind, owner, name, desc, is_interface } => {
                let op = match kind {
                    InvokeKind::Static => "INVOKESTATIC",
                    InvokeKind::Virtual => "INVOKEVIRTUAL",
                    InvokeKind::Interface => "INVOKEINTERFACE",
                    InvokeKind::Special => "INVOKESPECIAL",
                };
                write!(f, "{op} {owner}.{name} {desc}")?;
                if *is_interface && *kind != InvokeKind::Interface {
                    write!(f, " (itf)")?;
                }
                Ok(())
            }
            Insn::InvokeDynamic(site) => write!(
                f,
                "INVOKEDYNAMIC {}{} [{}, {}, {}, {}]",
                site.name,
                site.desc,
                site.bootstrap,
                site.sam_desc,
                site.implementation,
                site.instantiated_desc
            ),
            Insn::New(owner) => write!(f, "NEW {owner}"),
            Insn::CheckCast(owner) => write!(f, "CHECKCAST {owner}"),
            Insn::NewArray(p) => write!(f, "NEWARRAY T_{}", p.name().to_uppercase()),
            Insn::ANewArray(owner) => write!(f, "ANEWARRAY {owner}"),
            Insn::AAStore => write!(f, "AASTORE"),
            Insn::MultiANewArray { desc, dims } => write!(f, "MULTIANEWARRAY {desc} {dims}"),
            Insn::Return(Type::Void) => write!(f, "RETURN"),
            Insn::Return(ty) => write!(f, "{}RETURN", typed_prefix(ty)),
        }
    }
}

/// One instruction per line, as in a class-file listing.
pub fn listing(insns: &[Insn]) -> String {
    let mut out = String::new();
    for insn in insns {
        if !matches!(insn, Insn::Label(_)) {
            out.push_str("    ");
        }
        out.push_str(&insn.to_string());
        out.push('\n');
    }
    out
}
