use std::collections::{HashMap, HashSet};
use std::ops::BitOr;
use std::sync::Arc;

use crate::types::*;

/// JVM access flags, kept as the raw bit set so synthetic units can be
/// written with the exact flags the class file will carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Access(pub u16);

impl Access {
    pub const PUBLIC: Access = Access(0x0001);
    pub const PRIVATE: Access = Access(0x0002);
    pub const PROTECTED: Access = Access(0x0004);
    pub const STATIC: Access = Access(0x0008);
    pub const FINAL: Access = Access(0x0010);
    pub const ABSTRACT: Access = Access(0x0400);
    pub const SYNTHETIC: Access = Access(0x1000);
    pub const PACKAGE: Access = Access(0);

    pub fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn visibility(self) -> Visibility {
        if self.contains(Access::PUBLIC) {
            Visibility::Public
        } else if self.contains(Access::PROTECTED) {
            Visibility::Protected
        } else if self.contains(Access::PRIVATE) {
            Visibility::Private
        } else {
            Visibility::Package
        }
    }
}

impl BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MethodOrigin {
    Declared,
    /// Contributed from outside the type. `host` is the static method that
    /// implements it, whose first parameter is the receiver.
    Extension {
        host: Arc<MethodNode>,
        is_static_extension: bool,
    },
}

/// A resolved method, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub owner: Type,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub access: Access,
    pub origin: MethodOrigin,
    /// Only meaningful for generated methods: whether the body was produced by
    /// the static compiler (and may be emitted without dynamic dispatch).
    pub static_compile: bool,
}

impl MethodNode {
    /// A public, non-static method declared on `owner`.
    pub fn new(owner: &Type, name: impl Into<String>, params: Vec<Param>, return_type: Type) -> Self {
        Self {
            owner: owner.clone(),
            name: name.into(),
            params,
            return_type,
            access: Access::PUBLIC,
            origin: MethodOrigin::Declared,
            static_compile: true,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(Access::STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.access.contains(Access::ABSTRACT)
    }

    pub fn is_extension(&self) -> bool {
        matches!(self.origin, MethodOrigin::Extension { .. })
    }

    pub fn is_static_extension(&self) -> bool {
        matches!(self.origin, MethodOrigin::Extension { is_static_extension: true, .. })
    }

    pub fn extension_host(&self) -> Option<&Arc<MethodNode>> {
        match &self.origin {
            MethodOrigin::Extension { host, .. } => Some(host),
            MethodOrigin::Declared => None,
        }
    }

    pub fn param_types(&self) -> impl Iterator<Item = &Type> {
        self.params.iter().map(|p| &p.ty)
    }

    pub fn descriptor(&self) -> String {
        method_descriptor(self.param_types(), &self.return_type)
    }

    /// `name(T1,T2)` as used in diagnostics.
    pub fn signature(&self) -> String {
        format_signature(&self.name, self.param_types())
    }

    fn same_signature(&self, other: &MethodNode) -> bool {
        self.name == other.name && self.params.len() == other.params.len()
            && self.param_types().zip(other.param_types()).all(|(a, b)| a == b)
    }
}

pub fn format_signature<'a>(name: &str, params: impl IntoIterator<Item = &'a Type>) -> String {
    let params: Vec<String> = params.into_iter().map(|t| t.to_string()).collect();
    format!("{}({})", name, params.join(","))
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub methods: Vec<Arc<MethodNode>>,
}

impl ClassInfo {
    pub fn class(name: &str) -> Self {
        Self {
            name: name.to_string(),
            superclass: if name == OBJECT { None } else { Some(OBJECT.to_string()) },
            interfaces: Vec::new(),
            is_interface: false,
            methods: Vec::new(),
        }
    }

    pub fn interface(name: &str) -> Self {
        Self { superclass: None, is_interface: true, ..Self::class(name) }
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    pub fn implements(mut self, iface: &str) -> Self {
        self.interfaces.push(iface.to_string());
        self
    }

    pub fn ty(&self) -> Type {
        Type::object(self.name.clone())
    }

    /// Add a public instance method.
    pub fn method(self, name: &str, params: &[Type], ret: Type) -> Self {
        self.method_with(name, params, ret, Access::PUBLIC)
    }

    pub fn abstract_method(self, name: &str, params: &[Type], ret: Type) -> Self {
        self.method_with(name, params, ret, Access::PUBLIC | Access::ABSTRACT)
    }

    pub fn static_method(self, name: &str, params: &[Type], ret: Type) -> Self {
        self.method_with(name, params, ret, Access::PUBLIC | Access::STATIC)
    }

    pub fn method_with(mut self, name: &str, params: &[Type], ret: Type, access: Access) -> Self {
        let params = params
            .iter()
            .enumerate()
            .map(|(i, ty)| Param::new(format!("arg{i}"), ty.clone()))
            .collect();
        let node = MethodNode::new(&self.ty(), name, params, ret).with_access(access);
        self.methods.push(Arc::new(node));
        self
    }
}

/// The class hierarchy visible to the lowering engine.
#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: HashMap<String, ClassInfo>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with the JDK subset the lowerers reason about.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        for info in builtin_classes() {
            table.insert(info);
        }
        table
    }

    pub fn insert(&mut self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), info);
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn is_interface(&self, ty: &Type) -> bool {
        ty.class_name().and_then(|n| self.get(n)).is_some_and(|c| c.is_interface)
    }

    /// Direct superclass. Arrays and unknown classes extend Object.
    pub fn superclass(&self, ty: &Type) -> Option<Type> {
        match ty {
            Type::Object(name) if name == OBJECT => None,
            Type::Object(name) => match self.get(name) {
                Some(info) if info.is_interface => None,
                Some(info) => info.superclass.as_ref().map(Type::object),
                None => Some(Type::object_type()),
            },
            Type::Array(_) => Some(Type::object_type()),
            _ => None,
        }
    }

    /// Superclass chain starting at `ty` itself.
    pub fn superclass_chain(&self, ty: &Type) -> Vec<Type> {
        let mut chain = vec![ty.clone()];
        let mut current = ty.clone();
        while let Some(sup) = self.superclass(&current) {
            if chain.contains(&sup) {
                break;
            }
            chain.push(sup.clone());
            current = sup;
        }
        chain
    }

    /// Every interface `ty` implements, directly or through ancestors.
    pub fn all_interfaces(&self, ty: &Type) -> Vec<String> {
        let mut seen = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        for class in self.superclass_chain(ty) {
            if let Some(info) = class.class_name().and_then(|n| self.get(n)) {
                if info.is_interface {
                    stack.push(info.name.clone());
                }
                stack.extend(info.interfaces.iter().rev().cloned());
            }
        }
        if let Type::Array(_) = ty {
            stack.push("java.lang.Cloneable".to_string());
            stack.push("java.io.Serializable".to_string());
        }
        while let Some(name) = stack.pop() {
            if seen.contains(&name) {
                continue;
            }
            if let Some(info) = self.get(&name) {
                stack.extend(info.interfaces.iter().rev().cloned());
            }
            seen.push(name);
        }
        seen
    }

    pub fn is_derived_from(&self, ty: &Type, ancestor: &str) -> bool {
        self.superclass_chain(ty).iter().any(|t| t.is_named(ancestor))
    }

    pub fn implements_interface(&self, ty: &Type, iface: &str) -> bool {
        self.all_interfaces(ty).iter().any(|i| i == iface)
    }

    pub fn is_or_implements(&self, ty: &Type, target: &str) -> bool {
        self.is_derived_from(ty, target) || self.implements_interface(ty, target)
    }

    /// Number of superclass steps from `from` up to `to`, if `to` is on the chain.
    pub fn superclass_distance(&self, from: &Type, to: &Type) -> Option<usize> {
        self.superclass_chain(from).iter().position(|t| t == to)
    }

    /// Whether a value of static type `from` may be passed where `to` is expected.
    /// Primitives are compared through their wrappers and numeric wrappers widen.
    pub fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if from == to {
            return true;
        }
        let from = from.wrapper();
        let to = to.wrapper();
        if from == to {
            return true;
        }
        if let (Some(a), Some(b)) = (numeric_rank(&from), numeric_rank(&to)) {
            return a <= b;
        }
        if let (Type::Array(a), Type::Array(b)) = (&from, &to) {
            return self.is_assignable(a, b);
        }
        match &to {
            Type::Object(name) if name == OBJECT => from.is_reference(),
            Type::Object(name) => self.is_or_implements(&from, name),
            _ => false,
        }
    }

    /// Methods named `name` visible on `ty`: its own declarations first, then
    /// each ancestor nearest-first, then interfaces. Overridden ancestor
    /// signatures are skipped.
    pub fn methods_named(&self, ty: &Type, name: &str) -> Vec<Arc<MethodNode>> {
        let mut found: Vec<Arc<MethodNode>> = Vec::new();
        let mut owners: Vec<String> = self
            .superclass_chain(ty)
            .iter()
            .filter_map(|t| t.class_name().map(str::to_string))
            .collect();
        owners.extend(self.all_interfaces(ty));
        for owner in owners {
            let Some(info) = self.get(&owner) else { continue };
            for method in info.methods.iter().filter(|m| m.name == name) {
                if !found.iter().any(|f| f.same_signature(method)) {
                    found.push(method.clone());
                }
            }
        }
        found
    }

    /// The single abstract method of a functional interface.
    pub fn find_sam(&self, ty: &Type) -> Option<Arc<MethodNode>> {
        let name = ty.class_name()?;
        let info = self.get(name)?;
        if !info.is_interface {
            return None;
        }
        let mut candidates: Vec<Arc<MethodNode>> = Vec::new();
        let mut ifaces = vec![name.to_string()];
        ifaces.extend(self.all_interfaces(ty));
        for iface in ifaces {
            let Some(info) = self.get(&iface) else { continue };
            for method in &info.methods {
                if !method.is_abstract() || method.is_static() || overrides_object_method(method) {
                    continue;
                }
                if !candidates.iter().any(|c| c.same_signature(method)) {
                    candidates.push(method.clone());
                }
            }
        }
        if candidates.len() == 1 { candidates.pop() } else { None }
    }

    pub fn is_functional_interface(&self, ty: &Type) -> bool {
        self.find_sam(ty).is_some()
    }
}

fn numeric_rank(ty: &Type) -> Option<u8> {
    match ty.class_name()? {
        "java.lang.Byte" => Some(0),
        "java.lang.Short" => Some(1),
        "java.lang.Integer" => Some(2),
        "java.lang.Long" => Some(3),
        "java.lang.Float" => Some(4),
        "java.lang.Double" => Some(5),
        _ => None,
    }
}

fn overrides_object_method(method: &MethodNode) -> bool {
    let object = Type::object_type();
    match (method.name.as_str(), method.params.as_slice()) {
        ("equals", [p]) => p.ty == object,
        ("hashCode", []) | ("toString", []) => true,
        _ => false,
    }
}

/// JDK classes preloaded by [`ClassTable::with_builtins`].
pub fn builtin_classes() -> Vec<ClassInfo> {
    let object = Type::object_type();
    let string = Type::string();
    let int = Type::int();
    let boolean = Type::boolean();
    let object_array = Type::array(object.clone());

    let mut classes = vec![
        ClassInfo::class(OBJECT)
            .method("equals", &[object.clone()], boolean.clone())
            .method("hashCode", &[], int.clone())
            .method("toString", &[], string.clone()),
        ClassInfo::class(CLASS),
        ClassInfo::interface("java.lang.Cloneable"),
        ClassInfo::interface("java.io.Serializable"),
        ClassInfo::interface(COMPARABLE).abstract_method("compareTo", &[object.clone()], int.clone()),
        ClassInfo::interface("java.lang.CharSequence")
            .abstract_method("length", &[], int.clone())
            .abstract_method("charAt", &[int.clone()], Type::char()),
        ClassInfo::class(STRING)
            .implements(COMPARABLE)
            .implements("java.lang.CharSequence")
            .implements("java.io.Serializable")
            .method("length", &[], int.clone())
            .method("isEmpty", &[], boolean.clone())
            .method("charAt", &[int.clone()], Type::char())
            .method("toUpperCase", &[], string.clone())
            .method("trim", &[], string.clone())
            .method("concat", &[string.clone()], string.clone())
            .method("compareTo", &[string.clone()], int.clone())
            .static_method("valueOf", &[object.clone()], string.clone()),
        ClassInfo::class(NUMBER)
            .implements("java.io.Serializable")
            .abstract_method("intValue", &[], int.clone())
            .abstract_method("longValue", &[], Type::long())
            .abstract_method("doubleValue", &[], Type::Primitive(Primitive::Double)),
        ClassInfo::class(BIG_INTEGER).extends(NUMBER).implements(COMPARABLE)
            .method("compareTo", &[Type::object(BIG_INTEGER)], int.clone()),
        ClassInfo::class(BIG_DECIMAL).extends(NUMBER).implements(COMPARABLE)
            .method("compareTo", &[Type::object(BIG_DECIMAL)], int.clone()),
        ClassInfo::interface("java.lang.Iterable"),
        ClassInfo::interface(COLLECTION)
            .implements("java.lang.Iterable")
            .abstract_method("size", &[], int.clone())
            .abstract_method("isEmpty", &[], boolean.clone())
            .abstract_method("contains", &[object.clone()], boolean.clone())
            .abstract_method("add", &[object.clone()], boolean.clone())
            .abstract_method("toArray", &[object_array.clone()], object_array.clone()),
        ClassInfo::interface(LIST)
            .implements(COLLECTION)
            .abstract_method("get", &[int.clone()], object.clone()),
        ClassInfo::class(ARRAY_LIST).implements(LIST).implements("java.io.Serializable"),
        ClassInfo::interface("java.lang.Runnable").abstract_method("run", &[], Type::Void),
        ClassInfo::interface("java.util.function.Supplier").abstract_method("get", &[], object.clone()),
        ClassInfo::interface("java.util.function.Function")
            .abstract_method("apply", &[object.clone()], object.clone()),
        ClassInfo::interface("java.util.function.UnaryOperator").implements("java.util.function.Function"),
        ClassInfo::interface("java.util.function.BiFunction")
            .abstract_method("apply", &[object.clone(), object.clone()], object.clone()),
        ClassInfo::interface("java.util.function.BinaryOperator").implements("java.util.function.BiFunction"),
        ClassInfo::interface("java.util.function.IntFunction")
            .abstract_method("apply", &[int.clone()], object.clone()),
        ClassInfo::interface("java.util.function.ToIntFunction")
            .abstract_method("applyAsInt", &[object.clone()], int.clone()),
        ClassInfo::interface("java.util.function.Predicate")
            .abstract_method("test", &[object.clone()], boolean.clone()),
        ClassInfo::interface("java.util.function.Consumer")
            .abstract_method("accept", &[object.clone()], Type::Void),
        ClassInfo::interface("java.util.Comparator")
            .abstract_method("compare", &[object.clone(), object.clone()], int.clone())
            .abstract_method("equals", &[object.clone()], boolean.clone()),
    ];

    for p in Primitive::ALL {
        let wrapper = p.wrapper_name();
        let prim = Type::Primitive(p);
        let base = if p.is_numeric() && p != Primitive::Char {
            ClassInfo::class(wrapper).extends(NUMBER)
        } else {
            ClassInfo::class(wrapper)
        };
        classes.push(
            base.implements(COMPARABLE)
                .static_method("valueOf", &[prim.clone()], Type::object(wrapper))
                .method(&format!("{}Value", p.name()), &[], prim)
                .method("compareTo", &[Type::object(wrapper)], int.clone()),
        );
    }
    classes
}
