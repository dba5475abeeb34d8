//! Bean lifecycle scopes.
//!
//! A scope is a lifecycle policy for a bean: at least `singleton` and
//! `prototype` are always registered; a container may also register
//! additional named scope handlers (e.g. a per-request scope).
//!
//! # Built-ins
//! - `singleton` — one instance per name, cached for the lifetime of the
//!   container (see [`crate::singleton::SingletonRegistry`]).
//! - `prototype` — a new instance on every lookup; the container tracks
//!   neither identity nor destruction.
//!
//! Custom scopes implement [`CustomScope`] and are registered by name
//! through [`ScopeRegistry::register_scope`], mirroring
//! `registerScope(name, handler)` from the configuration API.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::Result;

/// Name of the built-in singleton scope.
pub const SINGLETON: &str = "singleton";
/// Name of the built-in prototype scope.
pub const PROTOTYPE: &str = "prototype";

/// Identifies which scope a bean definition belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeName {
    Singleton,
    Prototype,
    Custom(String),
}

impl ScopeName {
    pub fn as_str(&self) -> &str {
        match self {
            ScopeName::Singleton => SINGLETON,
            ScopeName::Prototype => PROTOTYPE,
            ScopeName::Custom(name) => name.as_str(),
        }
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, ScopeName::Singleton)
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self, ScopeName::Prototype)
    }
}

impl From<&str> for ScopeName {
    fn from(value: &str) -> Self {
        match value {
            SINGLETON => ScopeName::Singleton,
            PROTOTYPE => ScopeName::Prototype,
            other => ScopeName::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value cached by a [`CustomScope`], type-erased so the scope
/// implementation doesn't need to be generic.
pub type ScopedInstance = Arc<dyn Any + Send + Sync>;

/// Handler for a custom (non-singleton, non-prototype) scope.
///
/// Modeled as a flat capability trait with no required methods beyond the
/// cache contract, per the "avoid class-hierarchy dispatch" guidance: a
/// scope is identified by name and queried through this one interface
/// rather than by introspecting a type hierarchy.
pub trait CustomScope: Send + Sync {
    /// Returns the cached instance for `name`, creating and storing one
    /// via `create` if absent.
    fn get_or_create(
        &self,
        name: &str,
        create: &mut dyn FnMut() -> Result<ScopedInstance>,
    ) -> Result<ScopedInstance>;

    /// Removes and returns the cached instance for `name`, if any.
    fn remove(&self, name: &str) -> Option<ScopedInstance>;

    /// Registers a callback to run when this scope instance ends (e.g. at
    /// the end of a request). Default: no-op, for scopes with no natural
    /// "end" event.
    fn register_destruction_callback(&self, _name: &str, _callback: Arc<dyn Fn() + Send + Sync>) {}

    /// Number of instances currently cached, for introspection/tests.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A minimal, general-purpose [`CustomScope`] backed by a concurrent map.
///
/// Suitable as the handler for any scope whose lifetime is "as long as this
/// `SimpleMapScope` value is kept alive" — e.g. one instance created per
/// HTTP request and dropped at the end of it.
#[derive(Default)]
pub struct SimpleMapScope {
    instances: DashMap<String, ScopedInstance>,
    destruction_callbacks: DashMap<String, Vec<Arc<dyn Fn() + Send + Sync>>>,
}

impl SimpleMapScope {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CustomScope for SimpleMapScope {
    fn get_or_create(
        &self,
        name: &str,
        create: &mut dyn FnMut() -> Result<ScopedInstance>,
    ) -> Result<ScopedInstance> {
        if let Some(existing) = self.instances.get(name) {
            return Ok(existing.clone());
        }
        let created = create()?;
        self.instances.insert(name.to_string(), created.clone());
        Ok(created)
    }

    fn remove(&self, name: &str) -> Option<ScopedInstance> {
        self.instances.remove(name).map(|(_, v)| v)
    }

    fn register_destruction_callback(&self, name: &str, callback: Arc<dyn Fn() + Send + Sync>) {
        self.destruction_callbacks
            .entry(name.to_string())
            .or_default()
            .push(callback);
    }

    fn len(&self) -> usize {
        self.instances.len()
    }
}

impl Drop for SimpleMapScope {
    fn drop(&mut self) {
        for entry in self.destruction_callbacks.iter() {
            for cb in entry.value() {
                cb();
            }
        }
    }
}

/// Registry of custom scope handlers, keyed by scope name.
///
/// `singleton` and `prototype` are handled natively by the container and
/// never appear here; this registry exists purely for scopes registered
/// via `registerScope`.
#[derive(Default)]
pub struct ScopeRegistry {
    scopes: DashMap<String, Arc<dyn CustomScope>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_scope(&self, name: impl Into<String>, handler: Arc<dyn CustomScope>) {
        self.scopes.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomScope>> {
        self.scopes.get(name).map(|entry| entry.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.contains_key(name)
    }

    pub fn registered_scope_names(&self) -> Vec<String> {
        self.scopes.iter().map(|e| e.key().clone()).collect()
    }
}
