//! Error types for Makhzan container operations.
//!
//! Makhzan provides detailed, actionable error messages.
//! No more `TypeNotFound: 0x7f3a2b1c`.
//!
//! The variants mirror the error taxonomy of a mature IoC container: a bean
//! can fail to resolve because it was never registered, because two
//! candidates tie, because a cycle can't be broken by a lazy handle,
//! because construction itself raised a user error, because a required
//! property was left unset, because the definition itself is malformed, or
//! because a lookup arrived while the container was tearing down.

use crate::key::DependencyKey;
use std::fmt;

/// Maximum number of suppressed peer failures kept on a single
/// [`BeanCreationFailureError`]. A cascading failure during eager
/// pre-instantiation can otherwise produce an unbounded error report.
pub const MAX_SUPPRESSED_CAUSES: usize = 100;

/// Main error type for all Makhzan operations.
#[derive(Debug, thiserror::Error)]
pub enum MakhzanError {
    /// Requested dependency was never registered.
    #[error("{0}")]
    NoSuchBean(NoSuchBeanError),

    /// Multiple candidates satisfy a required single-value lookup, and no
    /// primary/name/qualifier tie-breaker picked a winner.
    #[error("{0}")]
    NoUniqueBean(NoUniqueBeanError),

    /// A cycle was detected that the early-exposure mechanism cannot
    /// resolve (an eager injection point asked for a bean still under
    /// construction on the same call stack; see [`crate::lazy::Lazy`]).
    #[error("{0}")]
    CurrentlyInCreation(CurrentlyInCreationError),

    /// Any error escaping user code during construction, property
    /// population, or initialization.
    #[error("{0}")]
    BeanCreationFailure(BeanCreationFailureError),

    /// Dependency checking is enabled and a required value was left unset,
    /// or a required (non-optional) injection point resolved to nothing.
    #[error("{0}")]
    UnsatisfiedDependency(UnsatisfiedDependencyError),

    /// The bean definition itself is invalid: unresolvable parent, unknown
    /// scope, duplicate registration without override, or a mutation
    /// rejected by a frozen registry.
    #[error("{0}")]
    BeanDefinitionStore(BeanDefinitionStoreError),

    /// A lookup arrived while the container is being (or has been)
    /// destroyed.
    #[error("bean not allowed for creation: '{name}' was requested during destruction")]
    BeanNotAllowedForCreation { name: String },
}

/// Error when a dependency was not registered.
#[derive(Debug)]
pub struct NoSuchBeanError {
    /// The dependency that was requested.
    pub requested: DependencyKey,
    /// What required this dependency, if known.
    pub required_by: Option<String>,
    /// Similar names/types that ARE registered (for "did you mean?").
    pub suggestions: Vec<String>,
}

impl fmt::Display for NoSuchBeanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No such bean: {}", self.requested)?;

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Did you forget to register a bean for {}?",
            self.requested.type_name()
        )
    }
}

/// Error when a required single-value lookup matches more than one
/// candidate and no primary/name/qualifier tie-breaker applies.
#[derive(Debug)]
pub struct NoUniqueBeanError {
    pub requested: DependencyKey,
    pub candidates: Vec<String>,
}

impl fmt::Display for NoUniqueBeanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No unique bean of type {}: {} candidates found [{}]",
            self.requested,
            self.candidates.len(),
            self.candidates.join(", "),
        )?;
        write!(
            f,
            "\n  Hint: mark exactly one candidate primary, or resolve by name/qualifier"
        )
    }
}

/// Error when a circular dependency is detected that the lazy-handle
/// mechanism could not break.
#[derive(Debug)]
pub struct CurrentlyInCreationError {
    /// The bean that was requested while already in creation.
    pub name: String,
    /// The chain of names that led to the request, innermost last.
    pub chain: Vec<String>,
}

impl fmt::Display for CurrentlyInCreationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Requested bean '{}' is currently in creation: {}",
            self.name,
            self.chain.join(" -> "),
        )?;
        write!(
            f,
            "\n  Hint: break the cycle with a lazy injection point (resolve_lazy), \
             or restructure the dependency"
        )
    }
}

/// Error when a factory, init callback, or post-processor fails during
/// construction. Carries up to [`MAX_SUPPRESSED_CAUSES`] related failures
/// observed on other beans during the same top-level creation attempt.
#[derive(Debug)]
pub struct BeanCreationFailureError {
    pub name: String,
    /// Human description of where construction was at (factory, property
    /// population, init-method, ...).
    pub resource: String,
    pub source: Box<dyn std::error::Error + Send + Sync>,
    /// Rendered descriptions of peer failures suppressed during the same
    /// creation attempt.
    pub suppressed: Vec<String>,
    /// Count of additional suppressed causes dropped once the cap was hit.
    pub dropped: usize,
}

impl fmt::Display for BeanCreationFailureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error creating bean '{}': {} failed: {}",
            self.name, self.resource, self.source
        )?;
        if !self.suppressed.is_empty() {
            write!(f, "\n  Suppressed related failures:")?;
            for cause in &self.suppressed {
                write!(f, "\n    - {cause}")?;
            }
            if self.dropped > 0 {
                write!(f, "\n    ... and {} more (dropped, cap reached)", self.dropped)?;
            }
        }
        Ok(())
    }
}

/// Error when dependency checking finds an unset required property, or a
/// required injection point resolves to nothing.
#[derive(Debug)]
pub struct UnsatisfiedDependencyError {
    pub bean: String,
    pub property_or_param: String,
    pub reason: String,
}

impl fmt::Display for UnsatisfiedDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unsatisfied dependency on bean '{}': property/param '{}': {}",
            self.bean, self.property_or_param, self.reason
        )
    }
}

/// Error when a bean definition itself is malformed: unresolvable parent,
/// unknown scope, duplicate name without override, or a mutation attempted
/// after the registry was frozen.
#[derive(Debug)]
pub struct BeanDefinitionStoreError {
    pub name: String,
    pub reason: String,
}

impl fmt::Display for BeanDefinitionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid bean definition '{}': {}", self.name, self.reason)
    }
}

/// Convenient Result type for Makhzan operations.
pub type Result<T> = std::result::Result<T, MakhzanError>;

impl MakhzanError {
    pub fn no_such_bean(requested: DependencyKey, required_by: Option<String>) -> Self {
        MakhzanError::NoSuchBean(NoSuchBeanError { requested, required_by, suggestions: vec![] })
    }

    pub fn bean_definition_store(name: impl Into<String>, reason: impl Into<String>) -> Self {
        MakhzanError::BeanDefinitionStore(BeanDefinitionStoreError {
            name: name.into(),
            reason: reason.into(),
        })
    }

    pub fn currently_in_creation(name: impl Into<String>, chain: Vec<String>) -> Self {
        MakhzanError::CurrentlyInCreation(CurrentlyInCreationError { name: name.into(), chain })
    }

    pub fn no_unique_bean(requested: DependencyKey, candidates: Vec<String>) -> Self {
        MakhzanError::NoUniqueBean(NoUniqueBeanError { requested, candidates })
    }

    pub fn unsatisfied_dependency(
        bean: impl Into<String>,
        property_or_param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        MakhzanError::UnsatisfiedDependency(UnsatisfiedDependencyError {
            bean: bean.into(),
            property_or_param: property_or_param.into(),
            reason: reason.into(),
        })
    }

    pub fn bean_not_allowed_for_creation(name: impl Into<String>) -> Self {
        MakhzanError::BeanNotAllowedForCreation { name: name.into() }
    }

    /// Wraps `source` as a bean-creation failure, attaching up to
    /// [`MAX_SUPPRESSED_CAUSES`] suppressed peer-failure descriptions and
    /// the count dropped beyond the cap.
    pub fn bean_creation_failure(
        name: impl Into<String>,
        resource: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
        mut suppressed: Vec<String>,
    ) -> Self {
        let dropped = suppressed.len().saturating_sub(MAX_SUPPRESSED_CAUSES);
        suppressed.truncate(MAX_SUPPRESSED_CAUSES);
        MakhzanError::BeanCreationFailure(BeanCreationFailureError {
            name: name.into(),
            resource: resource.into(),
            source: source.into(),
            suppressed,
            dropped,
        })
    }

    /// Merges peer failures observed during the same top-level creation
    /// attempt into an already-built [`BeanCreationFailureError`], re-capping
    /// at [`MAX_SUPPRESSED_CAUSES`]. A no-op on every other variant: only a
    /// creation failure has somewhere to put them.
    pub fn with_suppressed(self, mut extra: Vec<String>, extra_dropped: usize) -> Self {
        match self {
            MakhzanError::BeanCreationFailure(mut e) => {
                e.suppressed.append(&mut extra);
                let overflow = e.suppressed.len().saturating_sub(MAX_SUPPRESSED_CAUSES);
                e.suppressed.truncate(MAX_SUPPRESSED_CAUSES);
                e.dropped += extra_dropped + overflow;
                MakhzanError::BeanCreationFailure(e)
            }
            other => other,
        }
    }
}
