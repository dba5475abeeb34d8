//! Dependency resolution: injection-point descriptors, candidate
//! tie-breaking, and the narrow [`BeanResolver`] interface construction
//! recipes use to pull their own dependencies.
//!
//! The container never enumerates a bean's constructor parameters
//! reflectively — a construction recipe is a closure that already knows
//! what it needs and asks for it by calling back into the resolver. What
//! this module owns is everything *around* that call: picking which
//! registered bean satisfies a `resolve::<T>()` when more than one could,
//! honoring qualifiers/primaries, building container-shaped results
//! (`Vec<Arc<T>>`), and the ignored-type / resolvable-dependency filters.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::definition::ArgumentValue;
use crate::error::Result;
use crate::key::DependencyKey;
use crate::lazy::{EarlyCell, Lazy};

/// Describes one place a dependency is needed: a constructor parameter, a
/// property, or a value passed explicitly to [`crate::resolver`] helpers.
#[derive(Debug, Clone)]
pub struct InjectionPoint {
    pub key: DependencyKey,
    /// The bean requesting this dependency, for edge-tracking and error
    /// messages. `None` for top-level `getBean` calls.
    pub requesting_bean: Option<String>,
    /// Restricts the match to a single candidate name.
    pub required_name: Option<String>,
    /// Restricts the match to candidates tagged with this qualifier.
    pub qualifier: Option<String>,
    /// A missing match is `Ok(None)`/empty rather than an error.
    pub optional: bool,
    /// Resolve through a [`Lazy`] handle instead of eagerly.
    pub lazy: bool,
}

impl InjectionPoint {
    pub fn new(key: DependencyKey) -> Self {
        Self { key, requesting_bean: None, required_name: None, qualifier: None, optional: false, lazy: false }
    }

    pub fn requested_by(mut self, name: impl Into<String>) -> Self {
        self.requesting_bean = Some(name.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.required_name = Some(name.into());
        self
    }

    pub fn qualified(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

/// Everything the tie-break algorithm needs to know about one registered
/// bean that is assignable to the requested type. Built by the registry
/// from merged definitions; deliberately free of any reference back to the
/// registry so the selection logic below is unit-testable in isolation.
#[derive(Debug, Clone)]
pub struct CandidateInfo {
    pub name: String,
    pub primary: bool,
    pub qualifier: Option<String>,
    /// Declared ordering (lower sorts first), from a priority/order
    /// annotation equivalent; `None` sorts after every `Some`.
    pub order: Option<i32>,
    /// Registration sequence number, the final tie-break.
    pub registration_index: usize,
}

/// Outcome of single-match resolution, mirroring spec.md §4.6 step 5.
#[derive(Debug, PartialEq, Eq)]
pub enum Selection {
    Unique(usize),
    None,
    Ambiguous(Vec<String>),
}

/// Sorts candidates by the container-enumeration ordering contract:
/// declared order first (lower first), then registration order.
pub fn order_candidates(candidates: &mut [CandidateInfo]) {
    candidates.sort_by(|a, b| match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y).then(a.registration_index.cmp(&b.registration_index)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.registration_index.cmp(&b.registration_index),
    });
}

/// Applies the primary/name/qualifier tie-break ladder from spec.md §4.6
/// step 5d. `candidates` need not be pre-sorted.
pub fn select_single(candidates: &[CandidateInfo], required_name: Option<&str>, qualifier: Option<&str>) -> Selection {
    if candidates.is_empty() {
        return Selection::None;
    }
    if candidates.len() == 1 {
        return Selection::Unique(0);
    }

    let primaries: Vec<usize> = candidates.iter().enumerate().filter(|(_, c)| c.primary).map(|(i, _)| i).collect();
    if primaries.len() == 1 {
        return Selection::Unique(primaries[0]);
    }
    if primaries.len() > 1 {
        return Selection::Ambiguous(primaries.iter().map(|&i| candidates[i].name.clone()).collect());
    }

    if let Some(name) = required_name {
        if let Some(i) = candidates.iter().position(|c| c.name == name) {
            return Selection::Unique(i);
        }
    }

    if let Some(q) = qualifier {
        let matches: Vec<usize> =
            candidates.iter().enumerate().filter(|(_, c)| c.qualifier.as_deref() == Some(q)).map(|(i, _)| i).collect();
        if matches.len() == 1 {
            return Selection::Unique(matches[0]);
        }
    }

    Selection::Ambiguous(candidates.iter().map(|c| c.name.clone()).collect())
}

/// Narrow interface construction recipes and property population consult to
/// resolve their own dependencies. Object-safe (no generic methods) so it
/// can be passed as `&dyn BeanResolver`; the generic, ergonomic entry points
/// below (`resolve`, `resolve_named`, ...) are free functions built on top.
pub trait BeanResolver: Send + Sync {
    fn resolve_by_key(&self, point: &InjectionPoint) -> Result<Arc<dyn Any + Send + Sync>>;

    fn resolve_optional_by_key(&self, point: &InjectionPoint) -> Result<Option<Arc<dyn Any + Send + Sync>>>;

    /// All currently-registered candidates assignable to `key`, ordered per
    /// [`order_candidates`]. Used for container-shaped injection points.
    fn resolve_many_by_key(&self, key: &DependencyKey) -> Result<Vec<(String, Arc<dyn Any + Send + Sync>)>>;

    /// Returns a lazy handle instead of resolving eagerly.
    fn resolve_lazy_by_key(&self, point: &InjectionPoint) -> Result<(String, EarlyCell)>;

    /// The name of the bean currently under construction, if any — used for
    /// dependency-edge bookkeeping and error messages.
    fn current_bean_name(&self) -> Option<&str>;

    fn constructor_arg(&self, index: usize) -> Option<ArgumentValue> {
        let _ = index;
        None
    }

    fn constructor_arg_named(&self, name: &str) -> Option<ArgumentValue> {
        let _ = name;
        None
    }

    /// Resolves a bean by name alone, with no type to narrow the search —
    /// needed for [`crate::definition::PropertyValue::BeanRef`], where the
    /// definition only carries a target name. Most call sites have a type
    /// in hand and should prefer `resolve_by_key`; the default here errs,
    /// since a resolver with no registry to consult (e.g. in unit tests)
    /// cannot honor it.
    fn resolve_by_name(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>> {
        Err(crate::error::MakhzanError::bean_definition_store(
            name,
            "untyped by-name resolution not supported by this resolver",
        ))
    }
}

fn downcast<T: Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>, key: &DependencyKey) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| {
        crate::error::MakhzanError::bean_definition_store(key.type_name(), "resolved value had an unexpected concrete type")
    })
}

/// Resolves a required dependency of type `T`.
pub fn resolve<T: Send + Sync + 'static>(resolver: &dyn BeanResolver) -> Result<Arc<T>> {
    let key = DependencyKey::of::<T>();
    let point = InjectionPoint::new(key.clone());
    downcast(resolver.resolve_by_key(&point)?, &key)
}

/// Resolves a required dependency of type `T` registered under `name`.
pub fn resolve_named<T: Send + Sync + 'static>(resolver: &dyn BeanResolver, name: &str) -> Result<Arc<T>> {
    let key = DependencyKey::of::<T>();
    let point = InjectionPoint::new(key.clone()).named(name);
    downcast(resolver.resolve_by_key(&point)?, &key)
}

/// Resolves an optional dependency of type `T`.
pub fn resolve_optional<T: Send + Sync + 'static>(resolver: &dyn BeanResolver) -> Result<Option<Arc<T>>> {
    let key = DependencyKey::of::<T>();
    let point = InjectionPoint::new(key.clone()).optional();
    match resolver.resolve_optional_by_key(&point)? {
        Some(value) => Ok(Some(downcast(value, &key)?)),
        None => Ok(None),
    }
}

/// Resolves every currently-registered bean assignable to `T`, in
/// priority-then-declared-then-registration order.
pub fn resolve_many<T: Send + Sync + 'static>(resolver: &dyn BeanResolver) -> Result<Vec<Arc<T>>> {
    let key = DependencyKey::of::<T>();
    resolver
        .resolve_many_by_key(&key)
        .map(|entries| entries.into_iter().filter_map(|(_, value)| value.downcast::<T>().ok()).collect())
}

/// Resolves every currently-registered bean assignable to `T`, keyed by
/// bean name — the map-shaped container form of spec.md §4.6 step 4.
pub fn resolve_map<T: Send + Sync + 'static>(resolver: &dyn BeanResolver) -> Result<std::collections::BTreeMap<String, Arc<T>>> {
    let key = DependencyKey::of::<T>();
    Ok(resolver
        .resolve_many_by_key(&key)?
        .into_iter()
        .filter_map(|(name, value)| value.downcast::<T>().ok().map(|v| (name, v)))
        .collect())
}

/// Resolves a dependency of type `T` through a [`Lazy`] handle instead of
/// eagerly, breaking cycles the early-exposure mechanism cannot.
pub fn resolve_lazy<T: Send + Sync + 'static>(resolver: &dyn BeanResolver) -> Result<Lazy<T>> {
    let key = DependencyKey::of::<T>();
    let point = InjectionPoint::new(key).lazy();
    let (name, cell) = resolver.resolve_lazy_by_key(&point)?;
    Ok(Lazy::new(name, cell))
}
