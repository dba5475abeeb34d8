//! Lazy injection handles — the mechanism that breaks circular references.
//!
//! Spring's original container breaks A→B→A cycles by handing B a raw,
//! not-yet-fully-initialized A and patching things up later if a
//! post-processor decides to wrap A in a proxy. Rust has no way to hand out
//! a "raw, half-built" struct generically (there is no reflective field
//! mutation to finish the job later), so this port uses a different but
//! observably equivalent mechanism: an injection point that is willing to
//! wait receives a [`Lazy<T>`] handle instead of `Arc<T>` directly. The
//! handle resolves to the *finished* singleton the first time it's
//! dereferenced — which, by the time anything actually calls `.get()`, the
//! cyclic partner has normally finished constructing. An injection point
//! that insists on an immediate `Arc<T>` while `T` is still under
//! construction on the same call stack gets
//! [`crate::error::MakhzanError::CurrentlyInCreation`] instead — this is
//! the Rust-safe analogue of a constructor-injection cycle, which the
//! original container also refuses to resolve (see spec scenario: circular
//! reference via constructor injection).
//!
//! See [`crate::singleton::SingletonRegistry`] for the `early_factories` /
//! `early_refs` maps this type is built on.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;

use crate::error::{MakhzanError, Result};

/// A type-erased, shareable cell that a [`crate::singleton::SingletonRegistry`]
/// allocates the moment a singleton's construction begins, and fills in
/// exactly once — at the moment that singleton is published — with the
/// final (possibly post-processor-wrapped) instance.
///
/// This is the concrete form of spec's `earlyFactories`/`earlyRefs` map
/// entries: allocating the cell is "exposing the early factory"; filling it
/// is "the factory was invoked and memoized."
#[derive(Clone)]
pub struct EarlyCell {
    inner: Arc<OnceCell<Arc<dyn Any + Send + Sync>>>,
    /// Set the first time a [`Lazy::get`] call against this cell succeeds.
    /// Distinguishes "an early reference was exposable" from "an early
    /// reference was actually taken" per spec.md §9's second Open Question
    /// — [`crate::singleton::SingletonRegistry`] only needs to reconcile a
    /// later-wrapped value against holders that really observed the
    /// earlier one.
    taken: Arc<AtomicBool>,
}

impl EarlyCell {
    pub fn new() -> Self {
        Self { inner: Arc::new(OnceCell::new()), taken: Arc::new(AtomicBool::new(false)) }
    }

    /// Publishes the finished instance. A second call is a no-op (the
    /// first publish wins), matching "memoized so every observer sees the
    /// same reference."
    pub fn publish(&self, value: Arc<dyn Any + Send + Sync>) {
        let _ = self.inner.set(value);
    }

    pub fn get(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.get().cloned()
    }

    pub fn is_published(&self) -> bool {
        self.inner.get().is_some()
    }

    /// Whether some holder of a [`Lazy`] handle over this cell has already
    /// successfully dereferenced it.
    pub fn was_taken(&self) -> bool {
        self.taken.load(Ordering::SeqCst)
    }
}

impl Default for EarlyCell {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle to a bean that may still be under construction.
///
/// Obtained from a [`crate::resolver::BeanResolver`] via `resolve_lazy`
/// instead of `resolve`. Every call to [`Lazy::get`] resolves through the
/// same cell the container publishes to — the container, not the call
/// site, arbitrates which final object every holder of a `Lazy<T>` sees.
pub struct Lazy<T: ?Sized> {
    name: String,
    cell: EarlyCell,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), cell: self.cell.clone(), _marker: PhantomData }
    }
}

impl<T: Send + Sync + 'static> Lazy<T> {
    pub fn new(name: impl Into<String>, cell: EarlyCell) -> Self {
        Self { name: name.into(), cell, _marker: PhantomData }
    }

    /// Name of the bean this handle ultimately resolves to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the handle to the finished instance.
    ///
    /// Returns [`MakhzanError::CurrentlyInCreation`] only if called *before*
    /// the target bean has published anything at all — in practice this
    /// only happens if `.get()` is called synchronously, from within the
    /// same factory call that obtained the handle, before returning control
    /// to the container.
    pub fn get(&self) -> Result<Arc<T>> {
        match self.cell.get() {
            Some(value) => {
                self.cell.taken.store(true, Ordering::SeqCst);
                value.downcast::<T>().map_err(|_| {
                    MakhzanError::bean_definition_store(
                        self.name.clone(),
                        "lazy handle type mismatch (internal error)",
                    )
                })
            }
            None => Err(MakhzanError::currently_in_creation(self.name.clone(), vec![self.name.clone()])),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.cell.is_published()
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy").field("name", &self.name).field("ready", &self.cell.is_published()).finish()
    }
}
