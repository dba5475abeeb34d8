//! Core container implementation for Makhzan DI: bean definitions, the
//! singleton registry, the dependency resolver, and the post-processor
//! pipeline that together make up the container's bean-factory core.

pub mod alias;
pub mod container;
pub mod creation;
pub mod definition;
pub mod error;
pub mod factory_bean;
pub mod graph;
pub mod key;
pub mod lazy;
pub mod post_processor;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod singleton;

pub use container::{Container, ContainerBuilder};
pub use error::{MakhzanError, Result};
pub use key::DependencyKey;
pub use scope::ScopeName;

pub mod prelude {
    pub use crate::container::{Container, ContainerBuilder};
    pub use crate::definition::{AutowireMode, BeanDefinition, BeanInstance, Plain, Role};
    pub use crate::error::{MakhzanError, Result};
    pub use crate::key::DependencyKey;
    pub use crate::lazy::Lazy;
    pub use crate::resolver::{resolve, resolve_lazy, resolve_many, resolve_named, resolve_optional, BeanResolver};
    pub use crate::scope::ScopeName;
}
