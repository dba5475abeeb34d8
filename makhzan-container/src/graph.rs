//! Dependency-edge bookkeeping for destruction ordering.
//!
//! Unlike a build-time acyclic-graph validator, this container is expected
//! to *carry* cycles between singletons (see [`crate::lazy`]), so this
//! module does not reject them. Its only job is the bookkeeping spec.md §3
//! describes: two directed maps, `dependents_of[A]` ("these depend on A,
//! destroy them before A") and `dependencies_of[B]` ("B depends on these"),
//! maintained jointly from three sources — explicit `dependsOn`, actual
//! injection of one singleton into another, and containment of an inner
//! bean inside an outer one. [`crate::singleton::SingletonRegistry`] walks
//! `dependents_of` to destroy dependents before their dependency.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

/// Directed dependency edges between bean names, independent of the
/// singleton/definition registries per spec.md §5 ("Fine-grained locks
/// guard: ... the containment/dependency edge maps (each independently)").
#[derive(Default)]
pub struct DependencyGraph {
    /// name -> names that depend on it (destroy these first)
    dependents_of: RwLock<HashMap<String, HashSet<String>>>,
    /// name -> names it depends on (inverse, maintained jointly)
    dependencies_of: RwLock<HashMap<String, HashSet<String>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `dependent` depends on `dependency` — `dependency`
    /// must be fully created first and destroyed last.
    pub fn record(&self, dependent: &str, dependency: &str) {
        if dependent == dependency {
            return; // self-containment is a no-op, not a cycle to track
        }
        self.dependents_of.write().entry(dependency.to_string()).or_default().insert(dependent.to_string());
        self.dependencies_of.write().entry(dependent.to_string()).or_default().insert(dependency.to_string());
    }

    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.dependents_of.read().get(name).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.dependencies_of.read().get(name).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    /// Transitively: does `dependent_name` depend (directly or through any
    /// chain) on `name`? Walks a `visited` set rather than recursing
    /// unguarded, since a singleton cycle is expected to exist here (see the
    /// module doc) and an unguarded walk would loop forever on one.
    pub fn is_dependent(&self, name: &str, dependent_name: &str) -> bool {
        let mut visited = HashSet::new();
        self.is_dependent_inner(name, dependent_name, &mut visited)
    }

    fn is_dependent_inner(&self, name: &str, dependent_name: &str, visited: &mut HashSet<String>) -> bool {
        if !visited.insert(dependent_name.to_string()) {
            return false; // already walked this node on this path
        }
        self.dependents_of.read().get(name).map(|set| set.contains(dependent_name)).unwrap_or(false)
            || self
                .dependencies_of
                .read()
                .get(dependent_name)
                .map(|deps| deps.iter().any(|d| self.is_dependent_inner(name, d, visited)))
                .unwrap_or(false)
    }

    /// Removes every edge mentioning `name`, called once it has been
    /// destroyed.
    pub fn remove(&self, name: &str) {
        let mut dependents = self.dependents_of.write();
        dependents.remove(name);
        for set in dependents.values_mut() {
            set.remove(name);
        }
        drop(dependents);

        let mut dependencies = self.dependencies_of.write();
        dependencies.remove(name);
        for set in dependencies.values_mut() {
            set.remove(name);
        }
    }
}
