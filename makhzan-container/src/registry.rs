//! Bean definition registry — spec.md §4.4.
//!
//! Stores raw, as-registered [`BeanDefinition`]s by name and produces merged
//! definitions on demand by walking the parent chain. A registry may itself
//! have a parent registry (spec.md §4.4's hierarchical lookup), consulted
//! only when a name is absent locally — matching a typical parent/child
//! application-context split where the child's own definitions always win.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::definition::BeanDefinition;
use crate::error::{MakhzanError, Result};

struct Inner {
    definitions: HashMap<String, BeanDefinition>,
    /// Insertion order, for enumeration and eager pre-instantiation.
    order: Vec<String>,
    /// Cache of already-merged (parent-overlaid) definitions, invalidated
    /// wholesale by [`DefinitionRegistry::clear_metadata_cache`] whenever a
    /// definition anywhere in the hierarchy changes.
    merged_cache: HashMap<String, BeanDefinition>,
    frozen: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self { definitions: HashMap::new(), order: Vec::new(), merged_cache: HashMap::new(), frozen: false }
    }
}

/// Stores bean definitions and resolves parent/child merges.
///
/// One registry per application context tier; a child context's registry
/// holds `parent` pointing at the parent context's registry so lookups fall
/// through, per spec.md §4.4.
pub struct DefinitionRegistry {
    inner: RwLock<Inner>,
    parent: Option<Arc<DefinitionRegistry>>,
    allow_override: bool,
}

impl DefinitionRegistry {
    pub fn new(allow_override: bool) -> Self {
        Self { inner: RwLock::new(Inner::default()), parent: None, allow_override }
    }

    pub fn with_parent(allow_override: bool, parent: Arc<DefinitionRegistry>) -> Self {
        Self { inner: RwLock::new(Inner::default()), parent: Some(parent), allow_override }
    }

    /// Registers a definition under `name`. Rejects a duplicate name unless
    /// overriding is allowed, and rejects any mutation once frozen.
    pub fn register_definition(&self, name: impl Into<String>, definition: BeanDefinition) -> Result<()> {
        let name = name.into();
        let mut inner = self.inner.write();
        if inner.frozen {
            return Err(MakhzanError::bean_definition_store(name, "registry is frozen; no further definitions may be registered"));
        }
        if inner.definitions.contains_key(&name) {
            if !self.allow_override {
                return Err(MakhzanError::bean_definition_store(
                    name,
                    "a bean with this name is already registered and overriding is disabled",
                ));
            }
            warn!(name, "Overriding existing bean definition");
        } else {
            inner.order.push(name.clone());
        }
        inner.definitions.insert(name.clone(), definition);
        inner.merged_cache.clear();
        debug!(name, "Registered bean definition");
        Ok(())
    }

    pub fn remove_definition(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.frozen {
            return Err(MakhzanError::bean_definition_store(name, "registry is frozen; definitions cannot be removed"));
        }
        if inner.definitions.remove(name).is_none() {
            return Err(MakhzanError::bean_definition_store(name, "no such bean definition"));
        }
        inner.order.retain(|n| n != name);
        inner.merged_cache.clear();
        Ok(())
    }

    /// Whether `name` is defined locally, without consulting the parent.
    pub fn contains_local_definition(&self, name: &str) -> bool {
        self.inner.read().definitions.contains_key(name)
    }

    /// Whether `name` is defined locally or in any ancestor registry.
    pub fn contains_definition(&self, name: &str) -> bool {
        self.contains_local_definition(name) || self.parent.as_ref().is_some_and(|p| p.contains_definition(name))
    }

    /// Raw (unmerged) definition as registered, local only.
    pub fn get_local_definition(&self, name: &str) -> Option<BeanDefinition> {
        self.inner.read().definitions.get(name).cloned()
    }

    /// Names registered locally, in registration order.
    pub fn local_definition_names(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Names visible through this registry: ancestor names first (so a
    /// child's own names naturally take precedence on name collision when
    /// callers build a combined view), then local names in registration
    /// order, skipping any name already yielded by an ancestor.
    pub fn definition_names(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut names = Vec::new();
        if let Some(parent) = &self.parent {
            for name in parent.definition_names() {
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }
        for name in self.local_definition_names() {
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
        names
    }

    /// Resolves the fully merged definition for `name`: walks the parent
    /// chain (local registry parent pointers via `BeanDefinition::parent_name`,
    /// not the registry's own `parent`), overlaying child-over-parent fields
    /// per spec.md §4.4, then overlays onto any ancestor *registry's*
    /// version of the same name if not found locally. Cached until the next
    /// mutation anywhere in this registry.
    pub fn merged_definition(&self, name: &str) -> Result<BeanDefinition> {
        if let Some(cached) = self.inner.read().merged_cache.get(name) {
            return Ok(cached.clone());
        }

        let merged = self.compute_merged_definition(name, &mut Vec::new())?;

        let mut inner = self.inner.write();
        inner.merged_cache.insert(name.to_string(), merged.clone());
        Ok(merged)
    }

    fn compute_merged_definition(&self, name: &str, chain: &mut Vec<String>) -> Result<BeanDefinition> {
        if chain.contains(&name.to_string()) {
            chain.push(name.to_string());
            return Err(MakhzanError::bean_definition_store(
                name,
                format!("circular parent-definition chain: {}", chain.join(" -> ")),
            ));
        }
        chain.push(name.to_string());

        let local = self.inner.read().definitions.get(name).cloned();
        let definition = match local {
            Some(def) => def,
            None => {
                return self
                    .parent
                    .as_ref()
                    .ok_or_else(|| MakhzanError::bean_definition_store(name, "no such bean definition"))?
                    .compute_merged_definition(name, chain);
            }
        };

        match &definition.parent_name {
            None => Ok(definition),
            Some(parent_name) => {
                let parent_name = parent_name.clone();
                let parent_merged = if self.inner.read().definitions.contains_key(&parent_name) {
                    self.compute_merged_definition(&parent_name, chain)?
                } else if let Some(registry_parent) = &self.parent {
                    registry_parent.merged_definition(&parent_name)?
                } else {
                    return Err(MakhzanError::bean_definition_store(
                        name,
                        format!("parent bean definition '{parent_name}' not found"),
                    ));
                };
                Ok(definition.overlay_onto(&parent_merged))
            }
        }
    }

    /// Marks every currently-registered definition immutable and discards
    /// any unmerged state that won't be needed again, per spec.md §4.4
    /// `freezeConfiguration`. The merged-definition cache is left intact —
    /// it is exactly the "locked-down, ready to instantiate" metadata this
    /// call is meant to finalize.
    pub fn freeze_configuration(&self) {
        let mut inner = self.inner.write();
        inner.frozen = true;
        trace!(count = inner.definitions.len(), "Definition registry frozen");
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.read().frozen
    }

    /// Invalidates every cached merged definition, e.g. after a definition
    /// a child depends on (as a parent) was replaced via override.
    pub fn clear_metadata_cache(&self) {
        self.inner.write().merged_cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Role;

    fn def() -> BeanDefinition {
        BeanDefinition::new::<i32>(|_| Ok(1))
    }

    #[test]
    fn register_and_lookup() {
        let registry = DefinitionRegistry::new(false);
        registry.register_definition("a", def()).unwrap();
        assert!(registry.contains_definition("a"));
        assert!(!registry.contains_definition("b"));
    }

    #[test]
    fn duplicate_without_override_rejected() {
        let registry = DefinitionRegistry::new(false);
        registry.register_definition("a", def()).unwrap();
        assert!(registry.register_definition("a", def()).is_err());
    }

    #[test]
    fn duplicate_with_override_allowed() {
        let registry = DefinitionRegistry::new(true);
        registry.register_definition("a", def()).unwrap();
        assert!(registry.register_definition("a", def()).is_ok());
    }

    #[test]
    fn frozen_registry_rejects_mutation() {
        let registry = DefinitionRegistry::new(true);
        registry.register_definition("a", def()).unwrap();
        registry.freeze_configuration();
        assert!(registry.register_definition("b", def()).is_err());
        assert!(registry.remove_definition("a").is_err());
    }

    #[test]
    fn merged_definition_overlays_parent() {
        let registry = DefinitionRegistry::new(false);
        registry.register_definition("base", def().role(Role::Infrastructure).depends_on(["x"])).unwrap();
        registry.register_definition("child", def().parent("base").primary(true)).unwrap();

        let merged = registry.merged_definition("child").unwrap();
        assert_eq!(merged.depends_on, vec!["x".to_string()]);
        assert!(merged.primary);
        assert_eq!(merged.role, Role::Infrastructure);
    }

    #[test]
    fn circular_parent_chain_rejected() {
        let registry = DefinitionRegistry::new(true);
        registry.register_definition("a", def().parent("b")).unwrap();
        registry.register_definition("b", def().parent("a")).unwrap();
        assert!(registry.merged_definition("a").is_err());
    }

    #[test]
    fn hierarchical_lookup_falls_through_to_parent_registry() {
        let parent_registry = Arc::new(DefinitionRegistry::new(false));
        parent_registry.register_definition("shared", def()).unwrap();

        let child_registry = DefinitionRegistry::with_parent(false, parent_registry);
        assert!(child_registry.contains_definition("shared"));
        assert!(child_registry.merged_definition("shared").is_ok());
    }

    #[test]
    fn definition_names_lists_registration_order() {
        let registry = DefinitionRegistry::new(false);
        registry.register_definition("a", def()).unwrap();
        registry.register_definition("b", def()).unwrap();
        assert_eq!(registry.definition_names(), vec!["a".to_string(), "b".to_string()]);
    }
}
