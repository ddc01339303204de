use std::fmt;

pub const OBJECT: &str = "java.lang.Object";
pub const STRING: &str = "java.lang.String";
pub const NUMBER: &str = "java.lang.Number";
pub const CHARACTER: &str = "java.lang.Character";
pub const BOOLEAN: &str = "java.lang.Boolean";
pub const COMPARABLE: &str = "java.lang.Comparable";
pub const COLLECTION: &str = "java.util.Collection";
pub const LIST: &str = "java.util.List";
pub const ARRAY_LIST: &str = "java.util.ArrayList";
pub const BIG_INTEGER: &str = "java.math.BigInteger";
pub const BIG_DECIMAL: &str = "java.math.BigDecimal";
pub const CLASS: &str = "java.lang.Class";
pub const CLOSURE: &str = "groovy.lang.Closure";
/// Runtime class holding the static binary-operator adapters and the generic
/// operator fallbacks.
pub const BYTECODE_ADAPTER: &str = "org.codehaus.groovy.runtime.ScriptBytecodeAdapter";
/// Runtime class holding truthiness and unboxing conversions.
pub const TYPE_TRANSFORMATION: &str =
    "org.codehaus.groovy.runtime.typehandling.DefaultTypeTransformation";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Short,
        Primitive::Char,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
    ];

    pub fn descriptor(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Short => 'S',
            Primitive::Char => 'C',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Short => "short",
            Primitive::Char => "char",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    pub fn wrapper_name(self) -> &'static str {
        match self {
            Primitive::Boolean => BOOLEAN,
            Primitive::Byte => "java.lang.Byte",
            Primitive::Short => "java.lang.Short",
            Primitive::Char => CHARACTER,
            Primitive::Int => "java.lang.Integer",
            Primitive::Long => "java.lang.Long",
            Primitive::Float => "java.lang.Float",
            Primitive::Double => "java.lang.Double",
        }
    }

    pub fn from_wrapper_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.into_iter().find(|p| p.wrapper_name() == name)
    }

    /// byte, short, char, int and long.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            Primitive::Byte | Primitive::Short | Primitive::Char | Primitive::Int | Primitive::Long
        )
    }

    pub fn is_numeric(self) -> bool {
        self != Primitive::Boolean
    }

    /// Categories that live in a 32-bit stack slot but are narrower than it.
    pub fn is_sub_word(self) -> bool {
        matches!(self, Primitive::Byte | Primitive::Short | Primitive::Char)
    }

    /// Categories computed with the 32-bit integer instructions.
    pub fn is_int_category(self) -> bool {
        matches!(
            self,
            Primitive::Boolean | Primitive::Byte | Primitive::Short | Primitive::Char | Primitive::Int
        )
    }
}

/// A resolved static type, as the checker attaches it to nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    Void,
    /// Reference type by fully-qualified (dotted) name.
    Object(String),
    Array(Box<Type>),
}

impl Type {
    pub fn object(name: impl Into<String>) -> Type {
        Type::Object(name.into())
    }

    pub fn array(component: Type) -> Type {
        Type::Array(Box::new(component))
    }

    pub fn boolean() -> Type {
        Type::Primitive(Primitive::Boolean)
    }

    pub fn int() -> Type {
        Type::Primitive(Primitive::Int)
    }

    pub fn long() -> Type {
        Type::Primitive(Primitive::Long)
    }

    pub fn char() -> Type {
        Type::Primitive(Primitive::Char)
    }

    pub fn object_type() -> Type {
        Type::object(OBJECT)
    }

    pub fn string() -> Type {
        Type::object(STRING)
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            Type::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Primitive(_))
    }

    pub fn is_primitive_boolean(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Boolean))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Object(_) | Type::Array(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }

    pub fn component(&self) -> Option<&Type> {
        match self {
            Type::Array(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&str> {
        match self {
            Type::Object(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.class_name() == Some(name)
    }

    /// Boxed form of a primitive; reference types map to themselves.
    pub fn wrapper(&self) -> Type {
        match self {
            Type::Primitive(p) => Type::object(p.wrapper_name()),
            other => other.clone(),
        }
    }

    /// Primitive form of a wrapper class; everything else maps to itself.
    pub fn unwrapper(&self) -> Type {
        match self {
            Type::Object(name) => match Primitive::from_wrapper_name(name) {
                Some(p) => Type::Primitive(p),
                None => self.clone(),
            },
            other => other.clone(),
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            Type::Primitive(p) => p.descriptor().to_string(),
            Type::Void => "V".to_string(),
            Type::Object(name) => format!("L{};", name.replace('.', "/")),
            Type::Array(inner) => format!("[{}", inner.descriptor()),
        }
    }

    /// Name used by class-referencing instructions: slashed for classes,
    /// the descriptor for arrays.
    pub fn internal_name(&self) -> String {
        match self {
            Type::Object(name) => name.replace('.', "/"),
            other => other.descriptor(),
        }
    }

    /// Package part of a class name, empty for the default package.
    pub fn package(&self) -> &str {
        match self {
            Type::Object(name) => name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or(""),
            _ => "",
        }
    }

    /// Widening category check used when deciding whether a numeric constant
    /// can be rewritten for its declared type.
    pub fn is_double_category(&self) -> bool {
        match self {
            Type::Primitive(p) => *p != Primitive::Boolean,
            Type::Object(name) => name == BIG_INTEGER || name == BIG_DECIMAL,
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.name()),
            Type::Void => write!(f, "void"),
            Type::Object(name) => write!(f, "{name}"),
            Type::Array(inner) => write!(f, "{inner}[]"),
        }
    }
}

/// `(params)ret` descriptor.
pub fn method_descriptor<'a>(params: impl IntoIterator<Item = &'a Type>, ret: &Type) -> String {
    let mut desc = String::from("(");
    for p in params {
        desc.push_str(&p.descriptor());
    }
    desc.push(')');
    desc.push_str(&ret.descriptor());
    desc
}

/// Parse one field descriptor from the front of `desc`, returning the type
/// and the unparsed remainder.
fn parse_field(desc: &str) -> Option<(Type, &str)> {
    let mut chars = desc.chars();
    let ty = match chars.next()? {
        'Z' => Type::Primitive(Primitive::Boolean),
        'B' => Type::Primitive(Primitive::Byte),
        'S' => Type::Primitive(Primitive::Short),
        'C' => Type::Primitive(Primitive::Char),
        'I' => Type::Primitive(Primitive::Int),
        'J' => Type::Primitive(Primitive::Long),
        'F' => Type::Primitive(Primitive::Float),
        'D' => Type::Primitive(Primitive::Double),
        'V' => Type::Void,
        'L' => {
            let end = desc.find(';')?;
            return Some((Type::object(desc[1..end].replace('/', ".")), &desc[end + 1..]));
        }
        '[' => {
            let (inner, rest) = parse_field(&desc[1..])?;
            return Some((Type::array(inner), rest));
        }
        _ => return None,
    };
    Some((ty, chars.as_str()))
}

impl Type {
    pub fn from_descriptor(desc: &str) -> Option<Type> {
        match parse_field(desc)? {
            (ty, "") => Some(ty),
            _ => None,
        }
    }
}

/// Split a `(params)ret` descriptor into parameter and return types.
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<Type>, Type)> {
    let mut rest = desc.strip_prefix('(')?;
    let mut params = Vec::new();
    while !rest.starts_with(')') {
        let (ty, tail) = parse_field(rest)?;
        params.push(ty);
        rest = tail;
    }
    let ret = Type::from_descriptor(&rest[1..])?;
    Some((params, ret))
}
