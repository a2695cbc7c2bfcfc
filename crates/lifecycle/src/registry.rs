//! Resource type registry
//!
//! Maps type names to a [`ResourceType`] descriptor: the property and
//! attribute schemas plus the handler implementing the provider side.
//! Aliases let templates refer to a type under another name
//! (`OS::Test::GenericResource` -> `GenericResourceType`).
//!
//! A process-wide registry is available through [`init_global`] /
//! [`global`]; [`reset_global`] exists for test isolation. Nothing is
//! registered implicitly.

use crate::error::{Error, Result};
use crate::handler::ResourceHandler;
use crate::schema::{AttributeSchema, AttributesSchema, PropertiesSchema, PropertySchema};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Capability descriptor of a registered type
pub struct ResourceType {
    pub name: String,
    pub properties_schema: PropertiesSchema,
    pub attributes_schema: AttributesSchema,
    /// Additional type names this type can stand in for
    pub interfaces: Vec<String>,
    /// Maximum length of generated physical names, if the provider has one
    pub physical_name_limit: Option<usize>,
    handler: Arc<dyn ResourceHandler>,
}

impl ResourceType {
    pub fn new(name: impl Into<String>, handler: Arc<dyn ResourceHandler>) -> Self {
        Self {
            name: name.into(),
            properties_schema: PropertiesSchema::new(),
            attributes_schema: AttributesSchema::new(),
            interfaces: Vec::new(),
            physical_name_limit: None,
            handler,
        }
    }

    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties_schema.insert(name.into(), schema);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, schema: AttributeSchema) -> Self {
        self.attributes_schema.insert(name.into(), schema);
        self
    }

    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn physical_name_limit(mut self, limit: usize) -> Self {
        self.physical_name_limit = Some(limit);
        self
    }

    pub fn handler(&self) -> Arc<dyn ResourceHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("name", &self.name)
            .field("properties", &self.properties_schema.keys().collect::<Vec<_>>())
            .field("attributes", &self.attributes_schema.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Registry of resource types and aliases
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<String, Arc<ResourceType>>,
    aliases: BTreeMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any previous type of the same name
    pub fn register(&mut self, resource_type: ResourceType) -> &mut Self {
        log::debug!("Registering resource type {}", resource_type.name);
        self.types
            .insert(resource_type.name.clone(), Arc::new(resource_type));
        self
    }

    /// Make `alias` resolve to `target`
    pub fn register_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    /// Follow aliases to the registered name
    pub fn resolve_name<'a>(&'a self, name: &'a str) -> &'a str {
        let mut current = name;
        let mut seen = BTreeSet::new();
        while let Some(target) = self.aliases.get(current) {
            if !seen.insert(current) {
                break;
            }
            current = target;
        }
        current
    }

    /// Look up a type by name or alias
    pub fn get_class(&self, type_name: &str) -> Result<Arc<ResourceType>> {
        self.types
            .get(self.resolve_name(type_name))
            .cloned()
            .ok_or_else(|| Error::ResourceTypeNotFound {
                type_name: type_name.to_string(),
            })
    }

    /// Whether `type_name` can stand in for `interface`
    pub fn has_interface(&self, type_name: &str, interface: &str) -> bool {
        let resolved = self.resolve_name(type_name);
        if resolved == self.resolve_name(interface) {
            return true;
        }
        self.types
            .get(resolved)
            .is_some_and(|t| t.interfaces.iter().any(|i| i == interface))
    }

    /// Registered type names (aliases excluded)
    pub fn type_names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<ResourceType>> {
        self.types.values()
    }
}

// ============================================================================
// Process-wide Registry
// ============================================================================

static GLOBAL: RwLock<Option<Arc<TypeRegistry>>> = RwLock::new(None);

/// Install the process-wide registry. Fails if one is already installed.
pub fn init_global(registry: TypeRegistry) -> Result<Arc<TypeRegistry>> {
    let mut slot = GLOBAL.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    if slot.is_some() {
        return Err(Error::InvalidState {
            message: "type registry already initialized".to_string(),
        });
    }
    let registry = Arc::new(registry);
    *slot = Some(Arc::clone(&registry));
    Ok(registry)
}

/// The process-wide registry, if installed
pub fn global() -> Option<Arc<TypeRegistry>> {
    GLOBAL
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone()
}

/// Drop the process-wide registry so the next `init_global` starts clean
pub fn reset_global() {
    *GLOBAL.write().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::GenericHandler;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register(ResourceType::new("GenericResourceType", Arc::new(GenericHandler)))
            .register_alias("OS::Test::GenericResource", "GenericResourceType");
        registry
    }

    #[test]
    fn test_get_class_ok() {
        let registry = registry();
        assert_eq!(
            registry.get_class("GenericResourceType").unwrap().name,
            "GenericResourceType"
        );
        assert_eq!(
            registry.get_class("OS::Test::GenericResource").unwrap().name,
            "GenericResourceType"
        );
    }

    #[test]
    fn test_get_class_noexist() {
        let err = registry().get_class("NoExistResourceType").unwrap_err();
        assert!(matches!(err, Error::ResourceTypeNotFound { .. }));
    }

    #[test]
    fn test_has_interface() {
        let registry = registry();
        assert!(registry.has_interface("GenericResourceType", "GenericResourceType"));
        assert!(!registry.has_interface("GenericResourceType", "LookingForAnotherType"));
        assert!(registry.has_interface("OS::Test::GenericResource", "OS::Test::GenericResource"));
        assert!(registry.has_interface("OS::Test::GenericResource", "GenericResourceType"));
    }

    #[test]
    fn test_alias_cycle_terminates() {
        let mut registry = TypeRegistry::new();
        registry.register_alias("A", "B").register_alias("B", "A");
        assert!(registry.get_class("A").is_err());
    }

    #[test]
    fn test_global_init_once_and_reset() {
        reset_global();
        assert!(global().is_none());
        init_global(registry()).unwrap();
        assert!(init_global(TypeRegistry::new()).is_err());
        assert!(global().unwrap().get_class("GenericResourceType").is_ok());
        reset_global();
        assert!(global().is_none());
    }
}
