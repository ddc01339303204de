use std::fmt;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::classes::MethodNode;
use crate::span::{Span, Spanned};
use crate::types::*;

/// An expression node as the checker hands it over: the node itself, its
/// source span and the resolved-type slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub node: Expr,
    pub span: Span,
    /// Static type attached by the checker; read-only to the lowerers.
    pub ty: Option<Type>,
}

impl TypedExpr {
    pub fn new(node: Expr, span: Span) -> Self {
        Self { node, span, ty: None }
    }

    pub fn typed(node: Expr, span: Span, ty: Type) -> Self {
        Self { node, span, ty: Some(ty) }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn constant(value: Constant, span: Span) -> Self {
        let ty = value.ty();
        Self::typed(Expr::Constant(value), span, ty)
    }

    pub fn null() -> Self {
        Self::new(Expr::Constant(Constant::Null), Span::dummy())
    }

    pub fn int(value: i32) -> Self {
        Self::constant(Constant::Int(value), Span::dummy())
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Self::typed(Expr::Variable(Variable::new(name, Some(ty.clone()))), Span::dummy(), ty)
    }

    pub fn this() -> Self {
        Self::new(Expr::This, Span::dummy())
    }

    pub fn class_ref(ty: Type) -> Self {
        Self::typed(Expr::ClassRef(ty), Span::dummy(), Type::object(CLASS))
    }

    pub fn call(receiver: TypedExpr, name: impl Into<String>, args: Vec<TypedExpr>) -> Self {
        Self::new(
            Expr::MethodCall(MethodCall {
                receiver: Box::new(receiver),
                name: name.into(),
                args,
                target: None,
                safe: false,
                implicit_this: false,
            }),
            Span::dummy(),
        )
    }

    pub fn ternary(cond: TypedExpr, then_branch: TypedExpr, else_branch: TypedExpr) -> Self {
        Self::new(
            Expr::Ternary {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            Span::dummy(),
        )
    }

    pub fn compare_to_null(operand: TypedExpr, equal_to_null: bool) -> Self {
        Self::typed(
            Expr::CompareToNull { operand: Box::new(operand), equal_to_null },
            Span::dummy(),
            Type::boolean(),
        )
    }

    pub fn binary(op: BinOp, lhs: TypedExpr, rhs: TypedExpr) -> Self {
        Self::new(Expr::Binary(BinaryExpr::new(op, lhs, rhs)), Span::dummy())
    }

    pub fn declaration(lhs: TypedExpr, rhs: TypedExpr) -> Self {
        let mut bin = BinaryExpr::new(BinOp::Assign, lhs, rhs);
        bin.declaration = true;
        Self::new(Expr::Binary(bin), Span::dummy())
    }

    pub fn unary(op: UnaryOp, operand: TypedExpr) -> Self {
        Self::new(Expr::Unary { op, operand: Box::new(operand) }, Span::dummy())
    }

    /// `receiver::name` converted to the functional interface `iface`.
    pub fn method_ref(receiver: TypedExpr, name: impl Into<String>, iface: Type) -> Self {
        Self::typed(
            Expr::MethodReference(MethodReference {
                receiver: Box::new(receiver),
                name: Spanned::dummy(name.into()),
                inferred_params: None,
            }),
            Span::dummy(),
            iface,
        )
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.node, Expr::Constant(Constant::Null))
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match &self.node {
            Expr::Variable(v) => Some(v),
            _ => None,
        }
    }
}

/// Closed set of node kinds the lowering engine handles. `Other` stands for
/// every construct it does not rewrite; lowering only descends into its
/// children.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Constant),
    Variable(Variable),
    This,
    /// A type name used as an expression (`String` in `String::valueOf`).
    ClassRef(Type),
    Property(PropertyExpr),
    Binary(BinaryExpr),
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    /// Left side of a multiple assignment: `(a, b)`.
    Tuple(Vec<TypedExpr>),
    List(Vec<TypedExpr>),
    MethodCall(MethodCall),
    New {
        ty: Type,
        args: Vec<TypedExpr>,
    },
    NewArray {
        element: Type,
        sizes: Vec<TypedExpr>,
    },
    Ternary {
        cond: Box<TypedExpr>,
        then_branch: Box<TypedExpr>,
        else_branch: Box<TypedExpr>,
    },
    /// `operand == null` (or `!= null`) by reference identity.
    CompareToNull {
        operand: Box<TypedExpr>,
        equal_to_null: bool,
    },
    /// `lhs === rhs`.
    CompareIdentity {
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    MethodReference(MethodReference),
    /// Expressions evaluated in order; the value is the last one's.
    Sequence(Vec<TypedExpr>),
    Other {
        label: String,
        children: Vec<TypedExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Declared type, when the variable was declared with one.
    pub origin_type: Option<Type>,
    /// Setter the checker resolved when `name` is really an implicit-this property.
    pub setter: Option<Arc<MethodNode>>,
}

impl Variable {
    pub fn new(name: impl Into<String>, origin_type: Option<Type>) -> Self {
        Self { name: name.into(), origin_type, setter: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyExpr {
    pub object: Box<TypedExpr>,
    pub name: String,
    pub safe: bool,
    pub setter: Option<Arc<MethodNode>>,
    /// Return type of the getter the checker inferred for reads.
    pub inferred_return: Option<Type>,
}

/// Operator-to-method resolution the checker attached to a binary node.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryTarget {
    pub method: Arc<MethodNode>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: Spanned<BinOp>,
    pub lhs: Box<TypedExpr>,
    pub rhs: Box<TypedExpr>,
    /// `lhs` is being declared (`int x = ...`, `def (a, b) = ...`).
    pub declaration: bool,
    pub target: Option<BinaryTarget>,
    /// Method the checker picked for the call an operator desugars to (`isCase` for `in`).
    pub direct_target: Option<Arc<MethodNode>>,
}

impl BinaryExpr {
    pub fn new(op: BinOp, lhs: TypedExpr, rhs: TypedExpr) -> Self {
        Self {
            op: Spanned::dummy(op),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            declaration: false,
            target: None,
            direct_target: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub receiver: Box<TypedExpr>,
    pub name: String,
    pub args: Vec<TypedExpr>,
    pub target: Option<Arc<MethodNode>>,
    pub safe: bool,
    pub implicit_this: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodReference {
    /// Type name (`ClassRef`) or value expression.
    pub receiver: Box<TypedExpr>,
    pub name: Spanned<String>,
    /// Parameter types the checker inferred for the functional shape; `None`
    /// entries keep the abstract method's own parameter type.
    pub inferred_params: Option<Vec<Option<Type>>>,
}

impl MethodReference {
    pub fn is_constructor_reference(&self) -> bool {
        self.name.node == "new"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Assign,
    PlusAssign,
    MinusAssign,
    MultiplyAssign,
    DivideAssign,
    ModAssign,
    Plus,
    Minus,
    Multiply,
    Divide,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    CompareTo,
    In,
    LogicalAnd,
    LogicalOr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Assign => "=",
            BinOp::PlusAssign => "+=",
            BinOp::MinusAssign => "-=",
            BinOp::MultiplyAssign => "*=",
            BinOp::DivideAssign => "/=",
            BinOp::ModAssign => "%=",
            BinOp::Plus => "+",
            BinOp::Minus => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::Mod => "%",
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
            BinOp::Less => "<",
            BinOp::LessEq => "<=",
            BinOp::Greater => ">",
            BinOp::GreaterEq => ">=",
            BinOp::CompareTo => "<=>",
            BinOp::In => "in",
            BinOp::LogicalAnd => "&&",
            BinOp::LogicalOr => "||",
        }
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinOp::Assign
                | BinOp::PlusAssign
                | BinOp::MinusAssign
                | BinOp::MultiplyAssign
                | BinOp::DivideAssign
                | BinOp::ModAssign
        )
    }

    /// `<`, `<=`, `>`, `>=`.
    pub fn is_ordering(self) -> bool {
        matches!(self, BinOp::Less | BinOp::LessEq | BinOp::Greater | BinOp::GreaterEq)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Equal | BinOp::NotEqual)
    }

    /// Method name the operator desugars to when applied to objects.
    pub fn method_name(self) -> Option<&'static str> {
        match self {
            BinOp::Plus | BinOp::PlusAssign => Some("plus"),
            BinOp::Minus | BinOp::MinusAssign => Some("minus"),
            BinOp::Multiply | BinOp::MultiplyAssign => Some("multiply"),
            BinOp::Divide | BinOp::DivideAssign => Some("div"),
            BinOp::Mod | BinOp::ModAssign => Some("mod"),
            BinOp::CompareTo => Some("compareTo"),
            BinOp::In => Some("isCase"),
            _ => None,
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    BitwiseNegate,
    Not,
    Minus,
    Plus,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::BitwiseNegate => "~",
            UnaryOp::Not => "!",
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
        }
    }
}

/// Arbitrary-precision decimal literal: `unscaled * 10^-scale`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub unscaled: BigInt,
    pub scale: u32,
}

impl Decimal {
    pub fn new(unscaled: impl Into<BigInt>, scale: u32) -> Self {
        Self { unscaled: unscaled.into(), scale }
    }

    /// Parse a plain decimal literal such as `-12.50`.
    pub fn parse(text: &str) -> Option<Decimal> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        let all: String = format!("{int_part}{frac_part}");
        if !all.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let unscaled = if all.is_empty() { BigInt::zero() } else { all.parse::<BigInt>().ok()? };
        Some(Decimal {
            unscaled: if negative { -unscaled } else { unscaled },
            scale: u32::try_from(frac_part.len()).ok()?,
        })
    }

    /// Decimal of the shortest text that reads back as `value`, keeping one
    /// fractional digit for integral values (`2.0`, not `2`).
    pub fn from_f64(value: f64) -> Option<Decimal> {
        if !value.is_finite() {
            return None;
        }
        Decimal::from_float_text(format!("{value}"))
    }

    pub fn from_f32(value: f32) -> Option<Decimal> {
        if !value.is_finite() {
            return None;
        }
        Decimal::from_float_text(format!("{value}"))
    }

    // Rust's float Display never uses an exponent, so the text is always
    // plain digits however large or small the value is.
    fn from_float_text(mut text: String) -> Option<Decimal> {
        if !text.contains('.') {
            text.push_str(".0");
        }
        Decimal::parse(&text)
    }

    pub fn from_integer(value: impl Into<BigInt>) -> Decimal {
        Decimal { unscaled: value.into(), scale: 0 }
    }

    /// Nearest `f64`; values beyond its range become infinite.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// Integer part, truncated toward zero.
    pub fn truncate(&self) -> BigInt {
        &self.unscaled / BigInt::from(10u8).pow(self.scale)
    }

    pub fn negate(&self) -> Decimal {
        Decimal { unscaled: -&self.unscaled, scale: self.scale }
    }

    pub fn is_zero(&self) -> bool {
        self.unscaled.is_zero()
    }
}

/// Low 64 bits of `v` in two's complement, as `BigInteger.longValue()`.
pub fn wrapping_i64(v: &BigInt) -> i64 {
    (v & BigInt::from(u64::MAX)).to_u64().unwrap_or(0) as i64
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let sign = if self.unscaled.is_negative() { "-" } else { "" };
        let digits = self.unscaled.magnitude().to_string();
        let scale = self.scale as usize;
        let padded = if digits.len() <= scale {
            format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
        } else {
            digits
        };
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigInteger(BigInt),
    BigDecimal(Decimal),
    String(String),
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Null => Type::object_type(),
            Constant::Boolean(_) => Type::Primitive(Primitive::Boolean),
            Constant::Byte(_) => Type::Primitive(Primitive::Byte),
            Constant::Short(_) => Type::Primitive(Primitive::Short),
            Constant::Char(_) => Type::Primitive(Primitive::Char),
            Constant::Int(_) => Type::Primitive(Primitive::Int),
            Constant::Long(_) => Type::Primitive(Primitive::Long),
            Constant::Float(_) => Type::Primitive(Primitive::Float),
            Constant::Double(_) => Type::Primitive(Primitive::Double),
            Constant::BigInteger(_) => Type::object(BIG_INTEGER),
            Constant::BigDecimal(_) => Type::object(BIG_DECIMAL),
            Constant::String(_) => Type::string(),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Constant::Byte(_)
                | Constant::Short(_)
                | Constant::Int(_)
                | Constant::Long(_)
                | Constant::Float(_)
                | Constant::Double(_)
                | Constant::BigInteger(_)
                | Constant::BigDecimal(_)
        )
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => write!(f, "null"),
            Constant::Boolean(b) => write!(f, "{b}"),
            Constant::Byte(v) => write!(f, "(byte) {v}"),
            Constant::Short(v) => write!(f, "(short) {v}"),
            Constant::Char(c) => write!(f, "'{c}'"),
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(v) => write!(f, "{v:?}f"),
            Constant::Double(v) => write!(f, "{v:?}d"),
            Constant::BigInteger(v) => write!(f, "{v}G"),
            Constant::BigDecimal(v) => write!(f, "{v}G"),
            Constant::String(s) => write!(f, "\"{s}\""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_parse_and_display() {
        let d = Decimal::parse("-12.50").unwrap();
        assert_eq!(d, Decimal::new(-1250, 2));
        assert_eq!(d.to_string(), "-12.50");
        assert_eq!(Decimal::parse("0.05").unwrap().to_string(), "0.05");
        assert_eq!(Decimal::parse("7").unwrap(), Decimal::from_integer(7));
        assert!(Decimal::parse("1e5").is_none());
    }

    #[test]
    fn decimal_from_f64_is_shortest_repr() {
        assert_eq!(Decimal::from_f64(1.5), Some(Decimal::new(15, 1)));
        assert_eq!(Decimal::from_f64(0.1), Some(Decimal::new(1, 1)));
        assert_eq!(Decimal::from_f64(2.0), Some(Decimal::new(20, 1)));
        assert_eq!(Decimal::from_f32(1.1), Some(Decimal::new(11, 1)));
        assert_eq!(Decimal::from_f64(f64::NAN), None);
    }

    #[test]
    fn decimal_truncates_toward_zero() {
        assert_eq!(Decimal::new(-199, 2).truncate(), BigInt::from(-1));
        assert_eq!(Decimal::new(199, 2).truncate(), BigInt::from(1));
        assert_eq!(Decimal::new(5, 40).truncate(), BigInt::zero());
    }

    #[test]
    fn decimal_handles_extreme_doubles() {
        let tiny = Decimal::from_f64(1e-40).unwrap();
        assert_eq!(tiny, Decimal::new(1, 40));
        assert_eq!(tiny.to_string(), format!("0.{}1", "0".repeat(39)));
        assert_eq!(tiny.to_f64(), 1e-40);

        let huge = Decimal::from_f64(1e300).unwrap();
        assert_eq!(huge.truncate(), BigInt::from(10u8).pow(300));
        assert_eq!(huge.to_f64(), 1e300);
    }

    #[test]
    fn constant_types() {
        assert_eq!(Constant::Int(1).ty(), Type::int());
        assert_eq!(Constant::String("a".into()).ty(), Type::string());
        assert_eq!(Constant::BigInteger(BigInt::from(1)).ty(), Type::object(BIG_INTEGER));
    }

    #[test]
    fn assignment_operators() {
        assert!(BinOp::Assign.is_assignment());
        assert!(BinOp::PlusAssign.is_assignment());
        assert!(!BinOp::Plus.is_assignment());
        assert!(BinOp::LessEq.is_ordering());
        assert!(!BinOp::Equal.is_ordering());
    }

    #[test]
    fn constructor_reference_detection() {
        let mref = MethodReference {
            receiver: Box::new(TypedExpr::class_ref(Type::string())),
            name: Spanned::dummy("new".to_string()),
            inferred_params: None,
        };
        assert!(mref.is_constructor_reference());
    }
}
