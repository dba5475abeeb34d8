//! FactoryBean support — spec.md §4.3.
//!
//! A `FactoryBean` is itself a bean (constructed, wired, and cached like any
//! other through the singleton registry) but its *product* — what a caller
//! resolving the target name actually receives — is a different object,
//! produced by [`FactoryBean::get_object`]. [`FactoryBeanRegistry`] caches
//! that product separately and guards against a factory bean re-entering its
//! own `get_object` call.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{MakhzanError, Result};
use crate::resolver::BeanResolver;

/// Implemented by the *factory* object, not its product. Constructed and
/// cached like any other singleton or prototype bean; `get_object` is called
/// by the creation engine once the factory bean itself is ready.
pub trait FactoryBean: Send + Sync {
    /// Produces (or returns the cached) object this factory manages.
    fn get_object(&self, resolver: &dyn BeanResolver) -> Result<Arc<dyn Any + Send + Sync>>;

    /// Whether the product should be treated as a singleton (cached) or
    /// built fresh on every lookup. Defaults to `true`, matching the common
    /// case (connection pools, clients, and the like).
    fn is_singleton(&self) -> bool {
        true
    }

    /// Best-effort static type name of the product, for `getType`/type
    /// matching without forcing creation. `None` means "unknown until
    /// built."
    fn object_type_name(&self) -> Option<&'static str> {
        None
    }
}

/// Tracks factory-bean implementations by the *target* bean name (the name
/// under which the produced object, not the factory, is resolved), the
/// cached singleton products, and factories currently mid-`get_object` to
/// reject re-entrant calls.
#[derive(Default)]
pub struct FactoryBeanRegistry {
    factories: DashMap<String, Arc<dyn FactoryBean>>,
    products: DashMap<String, Arc<dyn Any + Send + Sync>>,
    producing: Mutex<HashSet<String>>,
}

impl FactoryBeanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn FactoryBean>) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn get_factory(&self, name: &str) -> Option<Arc<dyn FactoryBean>> {
        self.factories.get(name).map(|entry| entry.clone())
    }

    /// Returns the cached product, if this factory is singleton-scoped and
    /// has already produced one.
    pub fn cached_product(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.products.get(name).map(|entry| entry.clone())
    }

    /// Produces the object for `name`, consulting the cache for singleton
    /// factories and guarding against re-entrant production.
    pub fn get_object(&self, name: &str, resolver: &dyn BeanResolver) -> Result<Arc<dyn Any + Send + Sync>> {
        if let Some(cached) = self.products.get(name) {
            return Ok(cached.clone());
        }

        let factory = self
            .factories
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| MakhzanError::bean_definition_store(name, "no FactoryBean registered under this name"))?;

        {
            let mut producing = self.producing.lock();
            if !producing.insert(name.to_string()) {
                return Err(MakhzanError::currently_in_creation(name, vec![name.to_string()]));
            }
        }
        trace!(name, "Invoking FactoryBean::get_object");

        let result = factory.get_object(resolver);
        self.producing.lock().remove(name);

        let object = result?;
        if factory.is_singleton() {
            self.products.insert(name.to_string(), object.clone());
        }
        Ok(object)
    }

    pub fn remove(&self, name: &str) {
        self.factories.remove(name);
        self.products.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::DependencyKey;
    use crate::lazy::EarlyCell;
    use crate::resolver::InjectionPoint;

    struct NullResolver;
    impl BeanResolver for NullResolver {
        fn resolve_by_key(&self, point: &InjectionPoint) -> Result<Arc<dyn Any + Send + Sync>> {
            Err(MakhzanError::no_such_bean(point.key.clone(), None))
        }
        fn resolve_optional_by_key(&self, _point: &InjectionPoint) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
            Ok(None)
        }
        fn resolve_many_by_key(&self, _key: &DependencyKey) -> Result<Vec<(String, Arc<dyn Any + Send + Sync>)>> {
            Ok(Vec::new())
        }
        fn resolve_lazy_by_key(&self, point: &InjectionPoint) -> Result<(String, EarlyCell)> {
            Err(MakhzanError::no_such_bean(point.key.clone(), None))
        }
        fn current_bean_name(&self) -> Option<&str> {
            None
        }
    }

    struct CountingFactory {
        calls: Mutex<usize>,
    }

    impl FactoryBean for CountingFactory {
        fn get_object(&self, _resolver: &dyn BeanResolver) -> Result<Arc<dyn Any + Send + Sync>> {
            *self.calls.lock() += 1;
            Ok(Arc::new(7i32))
        }
    }

    #[test]
    fn caches_singleton_product() {
        let registry = FactoryBeanRegistry::new();
        registry.register("conn", Arc::new(CountingFactory { calls: Mutex::new(0) }));

        let resolver = NullResolver;
        let a = registry.get_object("conn", &resolver).unwrap();
        let b = registry.get_object("conn", &resolver).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    struct NonSingletonFactory;
    impl FactoryBean for NonSingletonFactory {
        fn get_object(&self, _resolver: &dyn BeanResolver) -> Result<Arc<dyn Any + Send + Sync>> {
            Ok(Arc::new(String::from("fresh")))
        }
        fn is_singleton(&self) -> bool {
            false
        }
    }

    #[test]
    fn non_singleton_factory_not_cached() {
        let registry = FactoryBeanRegistry::new();
        registry.register("req", Arc::new(NonSingletonFactory));
        let resolver = NullResolver;

        let a = registry.get_object("req", &resolver).unwrap();
        let b = registry.get_object("req", &resolver).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    struct ReentrantFactory {
        registry: Arc<FactoryBeanRegistry>,
    }
    impl FactoryBean for ReentrantFactory {
        fn get_object(&self, resolver: &dyn BeanResolver) -> Result<Arc<dyn Any + Send + Sync>> {
            self.registry.get_object("self", resolver)
        }
    }

    #[test]
    fn reentrant_get_object_rejected() {
        let registry = Arc::new(FactoryBeanRegistry::new());
        registry.register("self", Arc::new(ReentrantFactory { registry: registry.clone() }));
        let resolver = NullResolver;
        let result = registry.get_object("self", &resolver);
        assert!(matches!(result, Err(MakhzanError::CurrentlyInCreation(_))));
    }

    #[test]
    fn missing_factory_is_definition_store_error() {
        let registry = FactoryBeanRegistry::new();
        let resolver = NullResolver;
        assert!(registry.get_object("missing", &resolver).is_err());
    }
}
