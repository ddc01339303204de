//! Collaborators the lowerers consult: static types of expressions and the
//! methods visible on a type.

use std::sync::Arc;

use crate::ast::{Expr, MethodCall, PropertyExpr, TypedExpr, Variable};
use crate::classes::{Access, ClassTable, MethodNode, MethodOrigin, Param, Visibility};
use crate::diagnostics::LowerError;
use crate::types::*;

/// Answers the static type of an expression. Must be idempotent and free of
/// side effects.
pub trait TypeResolver {
    fn resolve_type(&self, expr: &TypedExpr, enclosing: &Type) -> Result<Type, LowerError>;
}

/// Reads the type slot the checker attached, falling back to the types that
/// follow from the node itself (literals, `this`, allocations).
#[derive(Debug, Default, Clone, Copy)]
pub struct CheckedTypes;

impl TypeResolver for CheckedTypes {
    fn resolve_type(&self, expr: &TypedExpr, enclosing: &Type) -> Result<Type, LowerError> {
        if let Some(ty) = &expr.ty {
            return Ok(ty.clone());
        }
        match &expr.node {
            Expr::Constant(c) => Ok(c.ty()),
            Expr::This => Ok(enclosing.clone()),
            Expr::ClassRef(_) => Ok(Type::object(CLASS)),
            Expr::Variable(Variable { origin_type: Some(ty), .. }) => Ok(ty.clone()),
            Expr::CompareToNull { .. } | Expr::CompareIdentity { .. } => Ok(Type::boolean()),
            Expr::New { ty, .. } => Ok(ty.clone()),
            Expr::NewArray { element, sizes } => {
                Ok((0..sizes.len()).fold(element.clone(), |acc, _| Type::array(acc)))
            }
            Expr::List(_) => Ok(Type::object(ARRAY_LIST)),
            Expr::Property(PropertyExpr { inferred_return: Some(ty), .. }) => Ok(ty.clone()),
            Expr::MethodCall(MethodCall { target: Some(method), .. }) => Ok(method.return_type.clone()),
            _ => Err(LowerError::missing_type(
                "expression has no resolved type",
                expr.span,
            )),
        }
    }
}

/// Lookup of methods visible on a type.
pub trait MethodFinder {
    /// Methods declared on `on` or inherited by it.
    fn find_methods(&self, name: &str, on: &Type) -> Vec<Arc<MethodNode>>;
    /// Extension methods applicable to receivers of type `on`.
    fn find_extension_methods(&self, name: &str, on: &Type) -> Vec<Arc<MethodNode>>;
    fn filter_by_visibility(&self, methods: Vec<Arc<MethodNode>>, from: &Type) -> Vec<Arc<MethodNode>>;
}

/// A static method contributed to the type of its first parameter.
#[derive(Debug, Clone)]
pub struct ExtensionMethod {
    pub host: Arc<MethodNode>,
    pub is_static_extension: bool,
}

impl ExtensionMethod {
    pub fn self_type(&self) -> Option<&Type> {
        self.host.params.first().map(|p| &p.ty)
    }

    /// The method as seen on the extended type: declared on the self type,
    /// without the self parameter.
    fn exposed(&self) -> Option<MethodNode> {
        let self_type = self.self_type()?;
        let mut access = Access::PUBLIC;
        if self.is_static_extension {
            access = access | Access::STATIC;
        }
        Some(MethodNode {
            owner: self_type.clone(),
            name: self.host.name.clone(),
            params: self.host.params[1..].to_vec(),
            return_type: self.host.return_type.clone(),
            access,
            origin: MethodOrigin::Extension {
                host: self.host.clone(),
                is_static_extension: self.is_static_extension,
            },
            static_compile: true,
        })
    }
}

pub const DEFAULT_GROOVY_METHODS: &str = "org.codehaus.groovy.runtime.DefaultGroovyMethods";
pub const STRING_GROOVY_METHODS: &str = "org.codehaus.groovy.runtime.StringGroovyMethods";
pub const DEFAULT_GROOVY_STATIC_METHODS: &str = "org.codehaus.groovy.runtime.DefaultGroovyStaticMethods";

/// Registered extension methods, in registration order.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    methods: Vec<ExtensionMethod>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The runtime's own extension methods the lowerers rely on.
    pub fn with_builtins() -> Self {
        let object = Type::object_type();
        let char_sequence = Type::object("java.lang.CharSequence");
        let mut registry = Self::new();
        registry.register_instance(DEFAULT_GROOVY_METHODS, "isCase", &[object.clone(), object.clone()], Type::boolean());
        registry.register_instance(
            DEFAULT_GROOVY_METHODS,
            "isCase",
            &[Type::object(COLLECTION), object.clone()],
            Type::boolean(),
        );
        registry.register_instance(STRING_GROOVY_METHODS, "capitalize", &[char_sequence.clone()], Type::string());
        registry.register_instance(STRING_GROOVY_METHODS, "reverse", &[char_sequence], Type::string());
        registry.register_static(
            DEFAULT_GROOVY_STATIC_METHODS,
            "currentTimeSeconds",
            &[Type::object("java.lang.System")],
            Type::long(),
        );
        registry
    }

    pub fn register(&mut self, host: Arc<MethodNode>, is_static_extension: bool) {
        self.methods.push(ExtensionMethod { host, is_static_extension });
    }

    /// Register `host_class.name(self, params...)` as an instance extension of
    /// the first parameter's type.
    pub fn register_instance(&mut self, host_class: &str, name: &str, params: &[Type], ret: Type) {
        self.register(Arc::new(host_method(host_class, name, params, ret)), false);
    }

    /// Register a static extension: callable as `SelfType.name(params...)`.
    pub fn register_static(&mut self, host_class: &str, name: &str, params: &[Type], ret: Type) {
        self.register(Arc::new(host_method(host_class, name, params, ret)), true);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionMethod> {
        self.methods.iter()
    }
}

fn host_method(host_class: &str, name: &str, params: &[Type], ret: Type) -> MethodNode {
    let params = params
        .iter()
        .enumerate()
        .map(|(i, ty)| Param::new(if i == 0 { "self".to_string() } else { format!("arg{i}") }, ty.clone()))
        .collect();
    MethodNode::new(&Type::object(host_class), name, params, ret).with_access(Access::PUBLIC | Access::STATIC)
}

/// [`MethodFinder`] over a [`ClassTable`] plus an [`ExtensionRegistry`].
pub struct ClassTableFinder<'a> {
    classes: &'a ClassTable,
    extensions: &'a ExtensionRegistry,
}

impl<'a> ClassTableFinder<'a> {
    pub fn new(classes: &'a ClassTable, extensions: &'a ExtensionRegistry) -> Self {
        Self { classes, extensions }
    }

    fn is_visible(&self, method: &MethodNode, from: &Type) -> bool {
        if let Some(host) = method.extension_host() {
            return host.access.visibility() == Visibility::Public;
        }
        match method.access.visibility() {
            Visibility::Public => true,
            Visibility::Private => method.owner == *from,
            Visibility::Protected => {
                method.owner.package() == from.package()
                    || method
                        .owner
                        .class_name()
                        .is_some_and(|owner| self.classes.is_derived_from(from, owner))
            }
            Visibility::Package => method.owner.package() == from.package(),
        }
    }
}

impl MethodFinder for ClassTableFinder<'_> {
    fn find_methods(&self, name: &str, on: &Type) -> Vec<Arc<MethodNode>> {
        self.classes.methods_named(on, name)
    }

    fn find_extension_methods(&self, name: &str, on: &Type) -> Vec<Arc<MethodNode>> {
        self.extensions
            .iter()
            .filter(|ext| ext.host.name == name)
            .filter(|ext| ext.self_type().is_some_and(|st| self.classes.is_assignable(on, st)))
            .filter_map(|ext| ext.exposed())
            .map(Arc::new)
            .collect()
    }

    fn filter_by_visibility(&self, methods: Vec<Arc<MethodNode>>, from: &Type) -> Vec<Arc<MethodNode>> {
        methods.into_iter().filter(|m| self.is_visible(m, from)).collect()
    }
}
