//! The singleton registry — the three-map cache from spec.md §4.2, the
//! container's "signature mechanism" for cyclic object graphs.
//!
//! One [`parking_lot::Mutex`] guards the finished-instance map, the
//! insertion-ordered registration log, the in-creation set, and the
//! destruction flag together, per spec.md §5 ("One reentrant mutex guards
//! the singleton maps, the in-creation set, and destruction state").
//! `early_cells` lives in the same guarded state for the same reason, even
//! though [`crate::lazy::EarlyCell`] is itself a lock-free `OnceCell` — the
//! *presence* of a cell for a name is part of creation bookkeeping.
//!
//! Unlike the source this is ported from, there is no raw, still-mutable
//! instance to hand out mid-construction (see [`crate::lazy`] for why); an
//! [`crate::lazy::EarlyCell`] reserved here is published exactly once, with
//! the fully-finished instance, by the creation engine.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{MakhzanError, Result};
use crate::graph::DependencyGraph;
use crate::lazy::EarlyCell;

/// An adapter around a bean's destroy callback, registered at spec.md §4.5
/// Step 11 for any bean with a destroy contract.
pub trait DisposableBean: Send + Sync {
    fn destroy(&self, instance: &(dyn Any + Send + Sync));
}

impl<F: Fn(&(dyn Any + Send + Sync)) + Send + Sync> DisposableBean for F {
    fn destroy(&self, instance: &(dyn Any + Send + Sync)) {
        (self)(instance)
    }
}

/// One accumulation frame for suppressed peer failures (spec.md §7), kept
/// for the duration of a single top-level `getOrCreateSingleton` call.
#[derive(Default)]
struct SuppressedFrame {
    causes: Vec<String>,
    dropped: usize,
}

struct Inner {
    finished: HashMap<String, Arc<dyn Any + Send + Sync>>,
    registered: Vec<String>,
    in_creation: HashSet<String>,
    in_creation_excluded: HashSet<String>,
    early_cells: HashMap<String, EarlyCell>,
    in_destruction: bool,
    /// Stack of suppressed-cause frames, one per nested `getOrCreateSingleton`
    /// call currently on this thread's path; failures bubbling up from a
    /// nested creation attempt are appended to every enclosing frame.
    suppressed_stack: Vec<SuppressedFrame>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            finished: HashMap::new(),
            registered: Vec::new(),
            in_creation: HashSet::new(),
            in_creation_excluded: HashSet::new(),
            early_cells: HashMap::new(),
            in_destruction: false,
            suppressed_stack: Vec::new(),
        }
    }
}

/// The three-map singleton cache plus creation/destruction bookkeeping.
pub struct SingletonRegistry {
    inner: Mutex<Inner>,
    disposables: DashMap<String, Arc<dyn DisposableBean>>,
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()), disposables: DashMap::new() }
    }

    /// Non-creating lookup (spec.md §4.2 `getSingleton`): checks `finished`,
    /// then the early-reference cell for a bean currently in creation.
    pub fn get_singleton(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        let inner = self.inner.lock();
        if let Some(instance) = inner.finished.get(name) {
            return Some(instance.clone());
        }
        if inner.in_creation.contains(name) {
            if let Some(cell) = inner.early_cells.get(name) {
                return cell.get();
            }
        }
        None
    }

    pub fn contains_singleton(&self, name: &str) -> bool {
        self.inner.lock().finished.contains_key(name)
    }

    pub fn is_in_creation(&self, name: &str) -> bool {
        self.inner.lock().in_creation.contains(name)
    }

    pub fn singleton_count(&self) -> usize {
        self.inner.lock().finished.len()
    }

    /// Names in registration (creation-completion) order.
    pub fn singleton_names(&self) -> Vec<String> {
        self.inner.lock().registered.clone()
    }

    /// Reserves (if absent) and returns the [`EarlyCell`] for `name`, so a
    /// sibling bean under construction on the same call stack can obtain a
    /// [`crate::lazy::Lazy`] handle that resolves once this bean finishes.
    pub fn early_cell(&self, name: &str) -> EarlyCell {
        let mut inner = self.inner.lock();
        inner.early_cells.entry(name.to_string()).or_insert_with(EarlyCell::new).clone()
    }

    pub fn was_early_reference_taken(&self, name: &str) -> bool {
        self.inner.lock().early_cells.get(name).map(|c| c.was_taken()).unwrap_or(false)
    }

    /// Directly registers an already-built singleton, bypassing creation
    /// callbacks — spec.md §3's "pre-registered directly" case.
    pub fn register_singleton(&self, name: impl Into<String>, instance: Arc<dyn Any + Send + Sync>) -> Result<()> {
        let name = name.into();
        let mut inner = self.inner.lock();
        if inner.finished.contains_key(&name) {
            return Err(MakhzanError::bean_definition_store(name, "a singleton is already registered under this name"));
        }
        debug!(name, "Registered pre-built singleton");
        inner.finished.insert(name.clone(), instance);
        inner.registered.push(name);
        Ok(())
    }

    /// spec.md §4.2 `getOrCreateSingleton`. `factory` performs the actual
    /// construction (the creation engine); this method owns the
    /// in-creation bookkeeping, suppressed-cause accumulation, and final
    /// publish.
    pub fn get_or_create_singleton(
        &self,
        name: &str,
        factory: impl FnOnce() -> Result<Arc<dyn Any + Send + Sync>>,
    ) -> Result<Arc<dyn Any + Send + Sync>> {
        {
            let mut inner = self.inner.lock();
            if let Some(existing) = inner.finished.get(name) {
                return Ok(existing.clone());
            }
            if inner.in_destruction {
                return Err(MakhzanError::bean_not_allowed_for_creation(name));
            }
            if !inner.in_creation.insert(name.to_string()) {
                return Err(MakhzanError::currently_in_creation(name, vec![name.to_string()]));
            }
            inner.early_cells.entry(name.to_string()).or_insert_with(EarlyCell::new);
            inner.suppressed_stack.push(SuppressedFrame::default());
            trace!(name, "Beginning singleton creation");
        }

        let result = factory();

        let mut inner = self.inner.lock();
        inner.in_creation.remove(name);
        let frame = inner.suppressed_stack.pop().unwrap_or_default();

        match result {
            Ok(instance) => {
                // A racing creation may have published this name while we
                // were building our own copy (e.g. re-entrant lookups that
                // resolved through `register_singleton`); the finished map
                // is the single source of truth.
                if let Some(existing) = inner.finished.get(name) {
                    return Ok(existing.clone());
                }
                inner.finished.insert(name.to_string(), instance.clone());
                // The cell is left in place (not removed): any `Lazy` handle
                // obtained before, during, or after this call resolves
                // through the same cell, and publish is first-write-wins.
                if let Some(cell) = inner.early_cells.get(name) {
                    cell.publish(instance.clone());
                }
                inner.registered.push(name.to_string());
                debug!(name, "Singleton published");
                Ok(instance)
            }
            Err(err) => {
                if let Some(parent) = inner.suppressed_stack.last_mut() {
                    if parent.causes.len() < crate::error::MAX_SUPPRESSED_CAUSES {
                        parent.causes.push(format!("{name}: {err}"));
                    } else {
                        parent.dropped += 1;
                    }
                }
                // The cell is left unpublished (not removed) so a later
                // retry under the same name can still publish into it.
                Err(err.with_suppressed(frame.causes, frame.dropped))
            }
        }
    }

    pub fn set_in_creation_excluded(&self, name: &str, excluded: bool) {
        let mut inner = self.inner.lock();
        if excluded {
            inner.in_creation_excluded.insert(name.to_string());
        } else {
            inner.in_creation_excluded.remove(name);
        }
    }

    pub fn is_in_creation_excluded(&self, name: &str) -> bool {
        self.inner.lock().in_creation_excluded.contains(name)
    }

    pub fn register_disposable(&self, name: impl Into<String>, adapter: Arc<dyn DisposableBean>) {
        self.disposables.insert(name.into(), adapter);
    }

    /// Destroys a single bean by name: runs its disposable adapter (if
    /// any), then recursively destroys its dependents first, per spec.md
    /// §4.2 "Destruction" and §6's `destroyBean`.
    pub fn destroy_single(&self, name: &str, graph: &DependencyGraph) {
        let mut visited = HashSet::new();
        self.destroy_single_inner(name, graph, &mut visited);
    }

    /// `visited` guards against a singleton cycle turning this recursive
    /// dependents-first walk into unbounded recursion — this registry is
    /// expected to carry cycles between singletons (see the module doc), so
    /// the destruction order just needs to be a reasonable one, not a strict
    /// topological sort that a real cycle would make impossible anyway.
    fn destroy_single_inner(&self, name: &str, graph: &DependencyGraph, visited: &mut HashSet<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }

        for dependent in graph.dependents_of(name) {
            self.destroy_single_inner(&dependent, graph, visited);
        }

        let instance = {
            let mut inner = self.inner.lock();
            inner.finished.remove(name)
        };

        if let Some(instance) = instance {
            if let Some((_, adapter)) = self.disposables.remove(name) {
                adapter.destroy(instance.as_ref());
            }
            debug!(name, "Destroyed singleton");
        }
        graph.remove(name);
    }

    /// `destroySingletons()`: reverse registration order, dependents first.
    /// Never propagates — per spec.md §7, destruction errors are caught by
    /// the disposable adapter's own implementation, never this loop.
    pub fn destroy_all(&self, graph: &DependencyGraph) {
        let names = {
            let mut inner = self.inner.lock();
            inner.in_destruction = true;
            let mut names = inner.registered.clone();
            names.reverse();
            names
        };

        for name in names {
            if self.inner.lock().finished.contains_key(&name) {
                self.destroy_single(&name, graph);
            }
        }

        let mut inner = self.inner.lock();
        inner.registered.clear();
        inner.early_cells.clear();
        warn!("All singletons destroyed");
    }

    /// Reopens the registry for a fresh refresh after `destroy_all`.
    pub fn reset_destruction_flag(&self) {
        self.inner.lock().in_destruction = false;
    }

    pub fn is_in_destruction(&self) -> bool {
        self.inner.lock().in_destruction
    }
}
