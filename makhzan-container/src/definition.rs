//! Bean definitions — declarative recipes for how to build one bean.
//!
//! A [`BeanDefinition`] never holds a live instance; it holds everything the
//! creation engine needs in order to produce one: a construction recipe, a
//! scope, autowiring policy, explicit constructor/property values, and
//! lifecycle callback names. There is no reflective class loader in this
//! port — "resolve class" collapses into the `TypeId`/type-name pair
//! attached when the definition is built from a generic constructor, since
//! the construction recipe closure is already monomorphic in the produced
//! type.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::resolver::BeanResolver;
use crate::scope::ScopeName;

/// How a bean's dependencies are supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutowireMode {
    /// No autowiring; the construction recipe supplies everything itself.
    None,
    /// Unset writable properties are matched against other bean names.
    ByName,
    /// Unset writable properties are matched against other beans by type.
    ByType,
    /// The construction recipe resolves its own arguments through the
    /// resolver (the common case for closure-based recipes).
    Constructor,
}

impl Default for AutowireMode {
    fn default() -> Self {
        AutowireMode::Constructor
    }
}

/// Reporting-only classification; never affects resolution behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Application,
    Support,
    Infrastructure,
}

impl Default for Role {
    fn default() -> Self {
        Role::Application
    }
}

/// A single positional or named constructor argument, supplied explicitly
/// instead of being resolved by type.
#[derive(Clone)]
pub enum ArgumentValue {
    /// A literal, passed through a [`crate::resolver::StringValueResolver`]
    /// by the recipe if it needs conversion.
    Literal(String),
    /// A reference to another bean by name.
    BeanRef(String),
    /// An already-built, type-erased value (rare; mostly for tests).
    Value(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::Literal(s) => write!(f, "Literal({s:?})"),
            ArgumentValue::BeanRef(s) => write!(f, "BeanRef({s:?})"),
            ArgumentValue::Value(_) => write!(f, "Value(..)"),
        }
    }
}

/// Positional and named constructor/factory-method arguments.
///
/// The construction recipe closure consults these through
/// [`crate::resolver::BeanResolver::constructor_arg`] /
/// [`crate::resolver::BeanResolver::constructor_arg_named`] — there is no
/// reflective parameter list to align them against, so the recipe itself
/// decides which index or name it wants.
#[derive(Default, Clone, Debug)]
pub struct ConstructorArgumentValues {
    indexed: HashMap<usize, ArgumentValue>,
    named: HashMap<String, ArgumentValue>,
}

impl ConstructorArgumentValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_indexed(&mut self, index: usize, value: ArgumentValue) -> &mut Self {
        self.indexed.insert(index, value);
        self
    }

    pub fn add_named(&mut self, name: impl Into<String>, value: ArgumentValue) -> &mut Self {
        self.named.insert(name.into(), value);
        self
    }

    pub fn get_indexed(&self, index: usize) -> Option<&ArgumentValue> {
        self.indexed.get(&index)
    }

    pub fn get_named(&self, name: &str) -> Option<&ArgumentValue> {
        self.named.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty() && self.named.is_empty()
    }
}

/// A value to be applied to a named writable property.
#[derive(Clone)]
pub enum PropertyValue {
    Literal(String),
    BeanRef(String),
    /// Resolve by type at population time (the "by-type autowire" form, but
    /// scoped to a single declared property instead of every writable one).
    Autowired,
    Value(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Literal(s) => write!(f, "Literal({s:?})"),
            PropertyValue::BeanRef(s) => write!(f, "BeanRef({s:?})"),
            PropertyValue::Autowired => write!(f, "Autowired"),
            PropertyValue::Value(_) => write!(f, "Value(..)"),
        }
    }
}

/// Named property values to apply after instantiation, before init
/// callbacks. See [`BeanInstance::set_property`] for how these are applied
/// without a reflective property accessor.
#[derive(Default, Clone, Debug)]
pub struct PropertyValues {
    entries: HashMap<String, PropertyValue>,
}

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: PropertyValue) -> &mut Self {
        self.entries.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Free-form attributes a post-processor may stash on a definition and read
/// back later. Keyed by `'static` string so callers use constants, not
/// dynamically built keys.
#[derive(Default, Clone)]
pub struct AttributeBag {
    attributes: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &'static str, value: Arc<dyn Any + Send + Sync>) {
        self.attributes.insert(key, value);
    }

    pub fn get(&self, key: &'static str) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.attributes.get(key)
    }

    pub fn has(&self, key: &'static str) -> bool {
        self.attributes.contains_key(key)
    }
}

impl fmt::Debug for AttributeBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeBag").field("keys", &self.attributes.keys().collect::<Vec<_>>()).finish()
    }
}

/// A raw, still-mutable instance partway through construction.
///
/// This is the narrow substitute for Spring's reflective property accessor:
/// instead of enumerating every writable field on an arbitrary class, a
/// construction recipe hands back a boxed `BeanInstance` that knows how to
/// accept exactly the named properties its own definition declares, and how
/// to hand itself off as the finished, immutable, shareable object.
pub trait BeanInstance: Send + Sync {
    /// Applies a single named property value. The default rejects every
    /// property name, appropriate for beans that take all their
    /// dependencies through the constructor.
    fn set_property(&mut self, name: &str, value: Arc<dyn Any + Send + Sync>) -> Result<()> {
        let _ = value;
        Err(crate::error::MakhzanError::bean_definition_store(
            "<unnamed>",
            format!("no writable property named '{name}'"),
        ))
    }

    /// Equivalent of `afterPropertiesSet`: called once, after property
    /// population, before `initMethodName` (if any).
    fn after_properties_set(&mut self) -> Result<()> {
        Ok(())
    }

    /// Consumes the raw instance and returns the type-erased, immutable
    /// value published as the bean.
    fn finish(self: Box<Self>) -> Arc<dyn Any + Send + Sync>;

    fn as_any(&self) -> &dyn Any;

    /// Properties eligible for by-name/by-type autowiring (spec.md §4.5
    /// Step 8.2). Default: none — the common case of a bean fully built by
    /// its constructor closure has nothing left to autowire.
    fn writable_properties(&self) -> Vec<PropertyDescriptor> {
        Vec::new()
    }
}

/// Blanket wrapper turning any `T: Send + Sync + 'static` into a
/// [`BeanInstance`] with no settable properties and no init hook — the
/// common case for beans that are fully built by their constructor closure.
pub struct Plain<T>(pub T);

impl<T: Send + Sync + 'static> BeanInstance for Plain<T> {
    fn finish(self: Box<Self>) -> Arc<dyn Any + Send + Sync> {
        Arc::new(self.0)
    }

    fn as_any(&self) -> &dyn Any {
        &self.0
    }
}

/// Declares one writable, autowirable property on a [`BeanInstance`], the
/// narrow substitute for reflectively enumerating a class's writable
/// properties (spec.md §9's "type-metadata service"). Beans that want
/// by-name/by-type autowiring (rather than resolving everything through
/// their constructor closure) override [`BeanInstance::writable_properties`]
/// to advertise which properties are eligible and not yet set.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

/// How a bean's raw instance is produced.
pub enum ConstructionRecipe {
    /// The common case: a closure that resolves its own dependencies and
    /// returns a fully-built (or still-mutable, for property population)
    /// instance.
    Instantiate(Arc<dyn Fn(&dyn BeanResolver) -> Result<Box<dyn BeanInstance>> + Send + Sync>),
    /// The product is obtained by invoking another registered
    /// [`crate::factory_bean::FactoryBean`] by name.
    FactoryBean { factory_bean_name: String },
}

impl fmt::Debug for ConstructionRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionRecipe::Instantiate(_) => write!(f, "Instantiate(..)"),
            ConstructionRecipe::FactoryBean { factory_bean_name } => {
                write!(f, "FactoryBean({factory_bean_name:?})")
            }
        }
    }
}

/// A bean definition: everything needed to create one bean, short of
/// actually creating it.
pub struct BeanDefinition {
    pub type_id: Option<TypeId>,
    pub type_name: Option<&'static str>,
    pub parent_name: Option<String>,
    pub scope: ScopeName,
    pub lazy_init: bool,
    pub depends_on: Vec<String>,
    pub autowire_mode: AutowireMode,
    pub primary: bool,
    pub autowire_candidate: bool,
    pub recipe: ConstructionRecipe,
    pub constructor_argument_values: ConstructorArgumentValues,
    pub property_values: PropertyValues,
    /// Reporting-only name of the init callback, kept even when
    /// `init_fn` is set so introspection can show *something* without
    /// requiring callers to stringify their closures.
    pub init_method_name: Option<String>,
    pub destroy_method_name: Option<String>,
    /// The actual init callback. Spec.md's `initMethodName` assumes a
    /// reflective method lookup; without one, the closure itself is the
    /// definition (see spec.md §9 on the narrow type-metadata interface).
    /// Runs after `after_properties_set`, per spec.md §4.5 Step 9.4.
    pub init_fn: Option<Arc<dyn Fn(&mut dyn BeanInstance) -> Result<()> + Send + Sync>>,
    /// The actual destroy callback, invoked with the finished instance
    /// during `destroySingletons()` (spec.md §4.2 "Destruction").
    pub destroy_fn: Option<Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>>,
    pub role: Role,
    pub attributes: AttributeBag,
}

impl BeanDefinition {
    /// Starts a definition whose recipe produces `T` via `factory`, with
    /// `T`'s `TypeId` attached automatically.
    pub fn new<T: Send + Sync + 'static>(
        factory: impl Fn(&dyn BeanResolver) -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        Self::from_recipe(
            Some(TypeId::of::<T>()),
            Some(type_name::<T>()),
            ConstructionRecipe::Instantiate(Arc::new(move |resolver| {
                factory(resolver).map(|value| Box::new(Plain(value)) as Box<dyn BeanInstance>)
            })),
        )
    }

    /// Starts a definition whose recipe returns a [`BeanInstance`] directly,
    /// for beans that need property population between construction and
    /// finish (by-name/by-type autowired properties, init callbacks).
    pub fn new_mutable<T: Send + Sync + 'static>(
        factory: impl Fn(&dyn BeanResolver) -> Result<Box<dyn BeanInstance>> + Send + Sync + 'static,
    ) -> Self {
        Self::from_recipe(Some(TypeId::of::<T>()), Some(type_name::<T>()), ConstructionRecipe::Instantiate(Arc::new(factory)))
    }

    /// Starts a definition whose product comes from a registered
    /// [`crate::factory_bean::FactoryBean`].
    pub fn from_factory_bean(factory_bean_name: impl Into<String>) -> Self {
        Self::from_recipe(None, None, ConstructionRecipe::FactoryBean { factory_bean_name: factory_bean_name.into() })
    }

    fn from_recipe(type_id: Option<TypeId>, type_name: Option<&'static str>, recipe: ConstructionRecipe) -> Self {
        Self {
            type_id,
            type_name,
            parent_name: None,
            scope: ScopeName::Singleton,
            lazy_init: false,
            depends_on: Vec::new(),
            autowire_mode: AutowireMode::default(),
            primary: false,
            autowire_candidate: true,
            recipe,
            constructor_argument_values: ConstructorArgumentValues::new(),
            property_values: PropertyValues::new(),
            init_method_name: None,
            destroy_method_name: None,
            init_fn: None,
            destroy_fn: None,
            role: Role::default(),
            attributes: AttributeBag::new(),
        }
    }

    pub fn parent(mut self, name: impl Into<String>) -> Self {
        self.parent_name = Some(name.into());
        self
    }

    pub fn scope(mut self, scope: ScopeName) -> Self {
        self.scope = scope;
        self
    }

    pub fn lazy_init(mut self, lazy: bool) -> Self {
        self.lazy_init = lazy;
        self
    }

    pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn autowire_mode(mut self, mode: AutowireMode) -> Self {
        self.autowire_mode = mode;
        self
    }

    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    pub fn autowire_candidate(mut self, candidate: bool) -> Self {
        self.autowire_candidate = candidate;
        self
    }

    pub fn init_method(mut self, name: impl Into<String>) -> Self {
        self.init_method_name = Some(name.into());
        self
    }

    pub fn destroy_method(mut self, name: impl Into<String>) -> Self {
        self.destroy_method_name = Some(name.into());
        self
    }

    /// Registers the init callback actually invoked at spec.md §4.5 Step
    /// 9.4, alongside a reporting name.
    pub fn init_method_fn(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&mut dyn BeanInstance) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.init_method_name = Some(name.into());
        self.init_fn = Some(Arc::new(f));
        self
    }

    /// Registers the destroy callback invoked during `destroySingletons()`.
    pub fn destroy_method_fn(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&(dyn Any + Send + Sync)) + Send + Sync + 'static,
    ) -> Self {
        self.destroy_method_name = Some(name.into());
        self.destroy_fn = Some(Arc::new(f));
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.property_values.set(name, value);
        self
    }

    pub fn constructor_arg(mut self, index: usize, value: ArgumentValue) -> Self {
        self.constructor_argument_values.add_indexed(index, value);
        self
    }

    pub fn constructor_arg_named(mut self, name: impl Into<String>, value: ArgumentValue) -> Self {
        self.constructor_argument_values.add_named(name, value);
        self
    }

    /// Produces a child copy suitable for overlaying onto a fresh clone of
    /// the parent in [`crate::registry::DefinitionRegistry::merged_definition`].
    ///
    /// Only the fields a child definition realistically overrides are
    /// cloned shallowly here; the recipe itself is `Arc`-shared, which is
    /// safe since recipes are pure functions of the resolver.
    pub(crate) fn overlay_onto(&self, parent: &BeanDefinition) -> BeanDefinition {
        BeanDefinition {
            type_id: self.type_id.or(parent.type_id),
            type_name: self.type_name.or(parent.type_name),
            parent_name: self.parent_name.clone(),
            scope: self.scope.clone(),
            lazy_init: self.lazy_init,
            depends_on: if self.depends_on.is_empty() { parent.depends_on.clone() } else { self.depends_on.clone() },
            autowire_mode: self.autowire_mode,
            primary: self.primary,
            autowire_candidate: self.autowire_candidate,
            recipe: self.recipe.shallow_clone(),
            constructor_argument_values: merge_constructor_args(&parent.constructor_argument_values, &self.constructor_argument_values),
            property_values: merge_property_values(&parent.property_values, &self.property_values),
            init_method_name: self.init_method_name.clone().or_else(|| parent.init_method_name.clone()),
            destroy_method_name: self.destroy_method_name.clone().or_else(|| parent.destroy_method_name.clone()),
            init_fn: self.init_fn.clone().or_else(|| parent.init_fn.clone()),
            destroy_fn: self.destroy_fn.clone().or_else(|| parent.destroy_fn.clone()),
            role: self.role,
            attributes: self.attributes.clone(),
        }
    }
}

impl Clone for BeanDefinition {
    fn clone(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            parent_name: self.parent_name.clone(),
            scope: self.scope.clone(),
            lazy_init: self.lazy_init,
            depends_on: self.depends_on.clone(),
            autowire_mode: self.autowire_mode,
            primary: self.primary,
            autowire_candidate: self.autowire_candidate,
            recipe: self.recipe.shallow_clone(),
            constructor_argument_values: self.constructor_argument_values.clone(),
            property_values: self.property_values.clone(),
            init_method_name: self.init_method_name.clone(),
            destroy_method_name: self.destroy_method_name.clone(),
            init_fn: self.init_fn.clone(),
            destroy_fn: self.destroy_fn.clone(),
            role: self.role,
            attributes: self.attributes.clone(),
        }
    }
}

impl ConstructionRecipe {
    fn shallow_clone(&self) -> ConstructionRecipe {
        match self {
            ConstructionRecipe::Instantiate(f) => ConstructionRecipe::Instantiate(f.clone()),
            ConstructionRecipe::FactoryBean { factory_bean_name } => {
                ConstructionRecipe::FactoryBean { factory_bean_name: factory_bean_name.clone() }
            }
        }
    }
}

fn merge_constructor_args(parent: &ConstructorArgumentValues, child: &ConstructorArgumentValues) -> ConstructorArgumentValues {
    let mut merged = parent.clone();
    for (index, value) in &child.indexed {
        merged.add_indexed(*index, value.clone());
    }
    for (name, value) in &child.named {
        merged.add_named(name.clone(), value.clone());
    }
    merged
}

fn merge_property_values(parent: &PropertyValues, child: &PropertyValues) -> PropertyValues {
    let mut merged = parent.clone();
    for (name, value) in child.iter() {
        merged.set(name.to_string(), value.clone());
    }
    merged
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("type_name", &self.type_name)
            .field("parent_name", &self.parent_name)
            .field("scope", &self.scope)
            .field("lazy_init", &self.lazy_init)
            .field("depends_on", &self.depends_on)
            .field("autowire_mode", &self.autowire_mode)
            .field("primary", &self.primary)
            .field("recipe", &self.recipe)
            .finish()
    }
}
