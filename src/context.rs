use std::sync::Arc;

use crate::classes::{ClassTable, MethodNode};
use crate::codegen::synthetic::SyntheticUnit;
use crate::config::LowerConfig;
use crate::resolve::{MethodFinder, TypeResolver};
use crate::types::Type;

/// Read-only collaborators shared by every lowerer of one compilation unit.
#[derive(Clone, Copy)]
pub struct LowerContext<'a> {
    pub classes: &'a ClassTable,
    pub resolver: &'a dyn TypeResolver,
    pub finder: &'a dyn MethodFinder,
    pub config: &'a LowerConfig,
}

impl<'a> LowerContext<'a> {
    pub fn new(
        classes: &'a ClassTable,
        resolver: &'a dyn TypeResolver,
        finder: &'a dyn MethodFinder,
        config: &'a LowerConfig,
    ) -> Self {
        Self { classes, resolver, finder, config }
    }
}

/// The type being compiled and the helpers generated into it.
#[derive(Debug, Clone)]
pub struct CompileUnit {
    pub class: Type,
    pub is_interface: bool,
    /// Method whose body is being lowered; part of constructor bridge names.
    pub method_name: String,
    pub generated: Vec<SyntheticUnit>,
    ctor_ref_counter: usize,
    temp_counter: usize,
}

impl CompileUnit {
    pub fn new(class: Type, method_name: impl Into<String>) -> Self {
        Self {
            class,
            is_interface: false,
            method_name: method_name.into(),
            generated: Vec::new(),
            ctor_ref_counter: 0,
            temp_counter: 0,
        }
    }

    /// Start lowering another method body of the same type.
    pub fn enter_method(&mut self, method_name: impl Into<String>) {
        self.method_name = method_name.into();
    }

    /// `<prefix><enclosingMethod>$<n>`, n counting constructor references
    /// across the whole unit.
    pub fn next_ctor_ref_name(&mut self, prefix: &str) -> String {
        let name = format!("{}{}${}", prefix, self.method_name, self.ctor_ref_counter);
        self.ctor_ref_counter += 1;
        name
    }

    /// `<prefix><n>`, n counting temporaries across the whole unit.
    pub fn next_temp_name(&mut self, prefix: &str) -> String {
        let name = format!("{prefix}{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    pub fn find_generated(&self, name: &str) -> Option<Arc<MethodNode>> {
        self.generated.iter().find(|u| u.method.name == name).map(|u| u.method.clone())
    }

    pub fn add_generated(&mut self, unit: SyntheticUnit) -> Arc<MethodNode> {
        let method = unit.method.clone();
        self.generated.push(unit);
        method
    }
}
