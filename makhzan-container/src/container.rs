//! The container facade — spec.md §6's Bean-factory API and Configuration
//! API, plus the L4 "context refresh" driver that sequences the
//! definition-phase post-processors, freezes configuration, and eagerly
//! pre-instantiates non-lazy singletons.
//!
//! [`ContainerBuilder`] accumulates definitions, manually-registered
//! singletons, factory beans, aliases, scopes, and post-processors; calling
//! [`ContainerBuilder::build`] runs the refresh sequence once and returns a
//! ready [`Container`]. There is no later "add a definition" path on
//! `Container` itself — once built, only `ContainerBuilder` mutates
//! definitions, matching `freezeConfiguration`'s intent that a fully
//! refreshed context's metadata is settled.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::alias::AliasRegistry;
use crate::definition::BeanDefinition;
use crate::error::{MakhzanError, NoSuchBeanError, Result};
use crate::factory_bean::FactoryBeanRegistry;
use crate::graph::DependencyGraph;
use crate::key::DependencyKey;
use crate::lazy::EarlyCell;
use crate::post_processor::{
    BeanDefinitionRegistryPostProcessor, BeanFactoryPostProcessor, InstantiationAwareBeanPostProcessor,
    PostProcessorPipeline,
};
use crate::registry::DefinitionRegistry;
use crate::resolver::{order_candidates, select_single, BeanResolver, CandidateInfo, InjectionPoint, Selection};
use crate::scope::{CustomScope, ScopeName, ScopeRegistry};
use crate::singleton::SingletonRegistry;

/// Attribute key under which declared ordering is stashed on a definition's
/// [`crate::definition::AttributeBag`], read back by container-shaped
/// injection and `getBeansOfType` enumeration. There is no `#[order(n)]`
/// annotation to read reflectively, so a definition that cares about its
/// position in a `Vec`/`BTreeMap` injection sets this explicitly via
/// [`BeanDefinition::attributes`].
pub const ORDER_ATTRIBUTE: &str = "order";
/// Attribute key for a bean's qualifier, consulted only when a primary
/// candidate and a required name both fail to break a tie.
pub const QUALIFIER_ATTRIBUTE: &str = "qualifier";

thread_local! {
    /// Names currently being resolved on this call stack, outside of
    /// whatever the singleton registry's own `inCreation` bookkeeping
    /// tracks. `depends_on` is walked *before* a singleton ever reaches
    /// `getOrCreateSingleton`, so a purely declarative `dependsOn` cycle
    /// (no constructor/property cross-reference at all) would otherwise
    /// recurse through `get_or_create_named` forever. This stack catches
    /// that re-entrance and turns it into a `currently-in-creation` error
    /// instead of a stack overflow.
    static RESOLUTION_STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard pushing `name` onto [`RESOLUTION_STACK`] for the duration of
/// one `get_or_create_named` call, popping it on every exit path including
/// early returns via `?`.
struct ResolutionGuard;

impl ResolutionGuard {
    fn enter(name: &str) -> std::result::Result<Self, Vec<String>> {
        let conflict = RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|n| n == name) {
                let mut chain = stack.clone();
                chain.push(name.to_string());
                return Some(chain);
            }
            stack.push(name.to_string());
            None
        });
        match conflict {
            Some(chain) => Err(chain),
            None => Ok(ResolutionGuard),
        }
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLUTION_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn declared_order(definition: &BeanDefinition) -> Option<i32> {
    definition.attributes.get(ORDER_ATTRIBUTE).and_then(|v| v.downcast_ref::<i32>()).copied()
}

fn declared_qualifier(definition: &BeanDefinition) -> Option<String> {
    definition.attributes.get(QUALIFIER_ATTRIBUTE).and_then(|v| v.downcast_ref::<String>()).cloned()
}

/// A manually-registered singleton (spec.md §3's "pre-registered
/// directly") carries no [`BeanDefinition`], so its type for candidate
/// matching is recorded separately at registration time.
struct ManualSingleton {
    type_id: TypeId,
}

struct ContainerState {
    definitions: Arc<DefinitionRegistry>,
    singletons: Arc<SingletonRegistry>,
    factory_beans: Arc<FactoryBeanRegistry>,
    aliases: Arc<AliasRegistry>,
    graph: Arc<DependencyGraph>,
    scopes: Arc<ScopeRegistry>,
    instantiation_processors: Vec<Arc<dyn InstantiationAwareBeanPostProcessor>>,
    manual_singletons: HashMap<String, ManualSingleton>,
    /// `registerResolvableDependency`: a fixed value handed out for a given
    /// type regardless of what's registered under that type, bypassing
    /// candidate selection entirely (used for framework-supplied objects
    /// like the container reference itself).
    resolvable_dependencies: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    /// `ignoreDependencyType`: types autowiring should never attempt to
    /// satisfy automatically (the caller must supply them explicitly).
    ignored_dependency_types: HashSet<TypeId>,
    prototypes_in_creation: Mutex<HashSet<String>>,
}

/// A fully refreshed, ready-to-use bean container.
#[derive(Clone)]
pub struct Container(Arc<ContainerState>);

impl Container {
    /// Resolves `name` through any alias chain, then the alias-stripped
    /// named lookup.
    pub fn get_bean(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>> {
        self.get_or_create_named(name, None)
    }

    /// Resolves a single required bean of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = DependencyKey::of::<T>();
        let resolver = ContainerResolver { container: self, current: None };
        let value = resolver.resolve_by_key(&InjectionPoint::new(key.clone()))?;
        downcast(value, &key)
    }

    /// Resolves a single required bean of type `T` registered under `name`.
    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let key = DependencyKey::of::<T>();
        let value = self.get_bean(name)?;
        downcast(value, &key)
    }

    /// Resolves every registered bean assignable to `T`, in declared-order
    /// then registration-order, keyed by name.
    pub fn beans_of_type<T: Send + Sync + 'static>(&self) -> Result<BTreeMap<String, Arc<T>>> {
        let key = DependencyKey::of::<T>();
        let resolver = ContainerResolver { container: self, current: None };
        let entries = resolver.resolve_many_by_key(&key)?;
        Ok(entries.into_iter().filter_map(|(name, value)| value.downcast::<T>().ok().map(|v| (name, v))).collect())
    }

    /// Names of every registered bean (definitions and manually-registered
    /// singletons) assignable to `T`, definitions first, then manually
    /// registered names.
    pub fn bean_names_for_type<T: ?Sized + 'static>(&self) -> Vec<String> {
        let key = DependencyKey::of::<T>();
        self.candidates_for_key(&key, None).into_iter().map(|c| c.name).collect()
    }

    pub fn contains_bean(&self, name: &str) -> bool {
        let canonical = self.0.aliases.canonical_name(name);
        self.0.singletons.contains_singleton(&canonical)
            || self.0.definitions.contains_definition(&canonical)
            || self.0.manual_singletons.contains_key(&canonical)
            || self.0.factory_beans.contains(&canonical)
    }

    pub fn is_singleton(&self, name: &str) -> Result<bool> {
        let canonical = self.0.aliases.canonical_name(name);
        if self.0.manual_singletons.contains_key(&canonical) {
            return Ok(true);
        }
        Ok(self.0.definitions.merged_definition(&canonical)?.scope.is_singleton())
    }

    pub fn is_prototype(&self, name: &str) -> Result<bool> {
        let canonical = self.0.aliases.canonical_name(name);
        if self.0.manual_singletons.contains_key(&canonical) {
            return Ok(false);
        }
        Ok(self.0.definitions.merged_definition(&canonical)?.scope.is_prototype())
    }

    pub fn get_type(&self, name: &str) -> Option<TypeId> {
        let canonical = self.0.aliases.canonical_name(name);
        if let Some(manual) = self.0.manual_singletons.get(&canonical) {
            return Some(manual.type_id);
        }
        self.0.definitions.merged_definition(&canonical).ok().and_then(|d| d.type_id)
    }

    pub fn get_aliases(&self, name: &str) -> Vec<String> {
        let canonical = self.0.aliases.canonical_name(name);
        self.0.aliases.aliases_for(&canonical)
    }

    pub fn bean_definition_names(&self) -> Vec<String> {
        self.0.definitions.definition_names()
    }

    /// The fully merged definition for `name` (parent overlays already
    /// applied), matching spec.md §6's `getMergedBeanDefinition`.
    pub fn merged_bean_definition(&self, name: &str) -> Result<BeanDefinition> {
        let canonical = self.0.aliases.canonical_name(name);
        self.0.definitions.merged_definition(&canonical)
    }

    /// Number of [`InstantiationAwareBeanPostProcessor`]s applied around
    /// every bean's creation — spec.md §6's `getBeanPostProcessorCount`.
    /// Definition-phase registry/factory processors aren't counted: they
    /// run once during refresh and leave no per-bean-creation presence.
    pub fn bean_post_processor_count(&self) -> usize {
        self.0.instantiation_processors.len()
    }

    /// Names of every custom scope registered on this container, matching
    /// spec.md §6's `getRegisteredScopeNames`. `"singleton"`/`"prototype"`
    /// aren't included: they're built in, not registered.
    pub fn registered_scope_names(&self) -> Vec<String> {
        self.0.scopes.registered_scope_names()
    }

    /// `destroySingletons()`: destroys every singleton, dependents before
    /// their dependency.
    pub fn destroy_singletons(&self) {
        info!("Destroying all singletons");
        self.0.singletons.destroy_all(&self.0.graph);
    }

    /// Destroys a single named singleton and, recursively, anything that
    /// depends on it.
    pub fn destroy_bean(&self, name: &str) {
        let canonical = self.0.aliases.canonical_name(name);
        self.0.singletons.destroy_single(&canonical, &self.0.graph);
    }

    /// Removes a single instance from a registered custom scope, running
    /// its destruction callback if one was registered.
    pub fn destroy_scoped_bean(&self, scope_name: &str, name: &str) -> Result<()> {
        let scope = self
            .0
            .scopes
            .get(scope_name)
            .ok_or_else(|| MakhzanError::bean_definition_store(name, format!("no such scope '{scope_name}'")))?;
        scope.remove(name);
        Ok(())
    }

    /// Core resolution entry point: canonicalizes the name, records a
    /// dependency edge if `requesting` is set, and dispatches on scope.
    fn get_or_create_named(&self, name: &str, requesting: Option<String>) -> Result<Arc<dyn Any + Send + Sync>> {
        let canonical = self.0.aliases.canonical_name(name);

        if let Some(requester) = &requesting {
            self.0.graph.record(requester, &canonical);
        }

        if let Some(existing) = self.0.singletons.get_singleton(&canonical) {
            return Ok(existing);
        }

        let _guard = ResolutionGuard::enter(&canonical)
            .map_err(|chain| MakhzanError::currently_in_creation(&canonical, chain))?;

        let merged = self.0.definitions.merged_definition(&canonical).map_err(|_| {
            let known = self.bean_definition_names();
            let known: Vec<&str> = known.iter().map(String::as_str).collect();
            MakhzanError::NoSuchBean(NoSuchBeanError {
                requested: DependencyKey::from_raw(TypeId::of::<()>(), "<unknown>"),
                required_by: requesting.clone(),
                suggestions: makhzan_support::rendering::suggest_similar(&canonical, &known, 3),
            })
        })?;

        for dependency in &merged.depends_on {
            self.get_or_create_named(dependency, Some(canonical.clone()))?;
        }

        match &merged.scope {
            ScopeName::Singleton => {
                let value = self.0.singletons.get_or_create_singleton(&canonical, || self.build(&canonical, &merged))?;
                if let Some(destroy_fn) = merged.destroy_fn.clone() {
                    self.0
                        .singletons
                        .register_disposable(canonical.clone(), Arc::new(move |instance: &(dyn Any + Send + Sync)| destroy_fn(instance)));
                }
                Ok(value)
            }
            ScopeName::Prototype => {
                {
                    let mut in_creation = self.0.prototypes_in_creation.lock();
                    if !in_creation.insert(canonical.clone()) {
                        return Err(MakhzanError::currently_in_creation(&canonical, vec![canonical.clone()]));
                    }
                }
                let result = self.build(&canonical, &merged);
                self.0.prototypes_in_creation.lock().remove(&canonical);
                result
            }
            ScopeName::Custom(scope_name) => {
                let scope = self
                    .0
                    .scopes
                    .get(scope_name)
                    .ok_or_else(|| MakhzanError::bean_definition_store(&canonical, format!("no such scope '{scope_name}'")))?;
                let mut create = || self.build(&canonical, &merged);
                scope.get_or_create(&canonical, &mut create)
            }
        }
    }

    fn build(&self, name: &str, definition: &BeanDefinition) -> Result<Arc<dyn Any + Send + Sync>> {
        let resolver = ContainerResolver { container: self, current: Some(name.to_string()) };
        crate::creation::create_instance(name, definition, &resolver, &self.0.factory_beans, &self.0.instantiation_processors)
    }

    /// All candidates assignable to `key`, ordered by declared order then
    /// registration order — registered bean definitions first, then
    /// manually-registered singletons. Excludes `exclude_name` (spec.md
    /// §4.6 Step 4's "excluding self"), so a bean of type `T` asking for
    /// `Vec<T>`/`resolve_many::<T>()` never sees itself among the results,
    /// and the sole bean of its own type resolving `T` gets a clean
    /// `NoSuchBean` instead of re-entering its own in-progress creation.
    fn candidates_for_key(&self, key: &DependencyKey, exclude_name: Option<&str>) -> Vec<CandidateInfo> {
        let mut out = Vec::new();
        for (index, name) in self.0.definitions.definition_names().into_iter().enumerate() {
            if Some(name.as_str()) == exclude_name {
                continue;
            }
            let Ok(definition) = self.0.definitions.merged_definition(&name) else { continue };
            if !definition.autowire_candidate {
                continue;
            }
            if definition.type_id == Some(key.type_id()) {
                out.push(CandidateInfo {
                    name,
                    primary: definition.primary,
                    qualifier: declared_qualifier(&definition),
                    order: declared_order(&definition),
                    registration_index: index,
                });
            }
        }
        let base_index = out.len();
        for (offset, (name, manual)) in self.0.manual_singletons.iter().enumerate() {
            if Some(name.as_str()) == exclude_name {
                continue;
            }
            if manual.type_id == key.type_id() {
                out.push(CandidateInfo {
                    name: name.clone(),
                    primary: false,
                    qualifier: None,
                    order: None,
                    registration_index: base_index + offset,
                });
            }
        }
        order_candidates(&mut out);
        out
    }
}

fn downcast<T: Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>, key: &DependencyKey) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| MakhzanError::bean_definition_store(key.type_name(), "resolved value had an unexpected concrete type"))
}

/// The [`BeanResolver`] a construction recipe sees while its bean is being
/// built. Carries the name of the bean currently under construction, so
/// nested `resolve::<T>()` calls record the right dependency edge and
/// report the right chain on a cycle error.
struct ContainerResolver<'a> {
    container: &'a Container,
    current: Option<String>,
}

impl ContainerResolver<'_> {
    fn pick_name(&self, point: &InjectionPoint) -> Result<String> {
        if let Some(required_name) = &point.required_name {
            return Ok(required_name.clone());
        }

        let candidates = self.container.candidates_for_key(&point.key, self.current.as_deref());
        match select_single(&candidates, point.required_name.as_deref(), point.qualifier.as_deref()) {
            Selection::Unique(index) => Ok(candidates[index].name.clone()),
            Selection::None => Err(MakhzanError::no_such_bean(point.key.clone(), self.current.clone())),
            Selection::Ambiguous(names) => Err(MakhzanError::no_unique_bean(point.key.clone(), names)),
        }
    }
}

impl BeanResolver for ContainerResolver<'_> {
    fn resolve_by_key(&self, point: &InjectionPoint) -> Result<Arc<dyn Any + Send + Sync>> {
        if let Some(value) = self.container.0.resolvable_dependencies.get(&point.key.type_id()) {
            return Ok(value.clone());
        }
        let name = self.pick_name(point)?;
        self.container.get_or_create_named(&name, self.current.clone())
    }

    fn resolve_optional_by_key(&self, point: &InjectionPoint) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
        if self.container.0.ignored_dependency_types.contains(&point.key.type_id()) {
            return Ok(None);
        }
        match self.resolve_by_key(point) {
            Ok(value) => Ok(Some(value)),
            Err(MakhzanError::NoSuchBean(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    fn resolve_many_by_key(&self, key: &DependencyKey) -> Result<Vec<(String, Arc<dyn Any + Send + Sync>)>> {
        let candidates = self.container.candidates_for_key(key, self.current.as_deref());
        candidates
            .into_iter()
            .map(|c| {
                let value = self.container.get_or_create_named(&c.name, self.current.clone())?;
                Ok((c.name, value))
            })
            .collect()
    }

    fn resolve_lazy_by_key(&self, point: &InjectionPoint) -> Result<(String, EarlyCell)> {
        let name = self.pick_name(point)?;

        if self.container.0.singletons.contains_singleton(&name) || self.container.0.singletons.is_in_creation(&name) {
            return Ok((name.clone(), self.container.0.singletons.early_cell(&name)));
        }

        let definition = self.container.0.definitions.merged_definition(&name)?;
        if !definition.scope.is_singleton() {
            return Err(MakhzanError::bean_definition_store(&name, "lazy injection is only supported for singleton-scoped beans"));
        }

        // Nothing has asked for this bean yet on this call stack — the
        // only way its cell will ever resolve is to build it now.
        self.container.get_or_create_named(&name, self.current.clone())?;
        Ok((name.clone(), self.container.0.singletons.early_cell(&name)))
    }

    fn current_bean_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn resolve_by_name(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>> {
        self.container.get_or_create_named(name, self.current.clone())
    }
}

/// Accumulates registrations before a single [`ContainerBuilder::build`]
/// call runs the refresh sequence and produces a ready [`Container`].
pub struct ContainerBuilder {
    definitions: DefinitionRegistry,
    aliases: AliasRegistry,
    graph: DependencyGraph,
    scopes: ScopeRegistry,
    factory_beans: FactoryBeanRegistry,
    pipeline: PostProcessorPipeline,
    manual_singletons: Vec<(String, Arc<dyn Any + Send + Sync>, TypeId)>,
    resolvable_dependencies: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    ignored_dependency_types: HashSet<TypeId>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ContainerBuilder {
    pub fn new(allow_bean_definition_overriding: bool) -> Self {
        Self {
            definitions: DefinitionRegistry::new(allow_bean_definition_overriding),
            aliases: AliasRegistry::new(),
            graph: DependencyGraph::new(),
            scopes: ScopeRegistry::new(),
            factory_beans: FactoryBeanRegistry::new(),
            pipeline: PostProcessorPipeline::new(),
            manual_singletons: Vec::new(),
            resolvable_dependencies: HashMap::new(),
            ignored_dependency_types: HashSet::new(),
        }
    }

    pub fn register_definition(&mut self, name: impl Into<String>, definition: BeanDefinition) -> Result<&mut Self> {
        self.definitions.register_definition(name, definition)?;
        Ok(self)
    }

    /// Registers an already-built singleton directly, bypassing the
    /// creation engine entirely — spec.md §3's "pre-registered directly".
    pub fn register_singleton<T: Send + Sync + 'static>(&mut self, name: impl Into<String>, value: T) -> &mut Self {
        self.manual_singletons.push((name.into(), Arc::new(value), TypeId::of::<T>()));
        self
    }

    pub fn register_factory_bean(
        &mut self,
        target_name: impl Into<String>,
        factory: Arc<dyn crate::factory_bean::FactoryBean>,
    ) -> &mut Self {
        self.factory_beans.register(target_name, factory);
        self
    }

    pub fn register_alias(&mut self, canonical: impl AsRef<str>, alias: impl AsRef<str>) -> Result<&mut Self> {
        self.aliases.register_alias(canonical.as_ref(), alias.as_ref(), false)?;
        Ok(self)
    }

    pub fn register_scope(&mut self, name: impl Into<String>, handler: Arc<dyn CustomScope>) -> &mut Self {
        self.scopes.register_scope(name, handler);
        self
    }

    /// `registerResolvableDependency`: every injection point asking for
    /// `T` receives `value`, bypassing normal candidate selection. Used for
    /// framework-supplied objects (the container reference itself, a
    /// configuration handle) that aren't beans in their own right.
    pub fn register_resolvable_dependency<T: Send + Sync + 'static>(&mut self, value: Arc<T>) -> &mut Self {
        self.resolvable_dependencies.insert(TypeId::of::<T>(), value as Arc<dyn Any + Send + Sync>);
        self
    }

    /// `ignoreDependencyType`: autowiring never attempts to satisfy `T`
    /// automatically.
    pub fn ignore_dependency_type<T: 'static>(&mut self) -> &mut Self {
        self.ignored_dependency_types.insert(TypeId::of::<T>());
        self
    }

    pub fn add_registry_post_processor(&mut self, processor: Arc<dyn BeanDefinitionRegistryPostProcessor>) -> &mut Self {
        self.pipeline.add_registry_processor(processor);
        self
    }

    pub fn add_factory_post_processor(&mut self, processor: Arc<dyn BeanFactoryPostProcessor>) -> &mut Self {
        self.pipeline.add_factory_processor(processor);
        self
    }

    pub fn add_instantiation_post_processor(&mut self, processor: Arc<dyn InstantiationAwareBeanPostProcessor>) -> &mut Self {
        self.pipeline.add_instantiation_processor(processor);
        self
    }

    /// Runs the full refresh sequence and returns a ready container:
    /// definition-registry processors to a fixed point, then factory
    /// processors, then freeze configuration, then eagerly pre-instantiate
    /// every non-lazy singleton in registration order.
    pub fn build(mut self) -> Result<Container> {
        self.pipeline.run_definition_phase(&self.definitions)?;
        self.definitions.freeze_configuration();

        let mut manual_singleton_index = HashMap::new();
        let singletons = SingletonRegistry::new();
        for (name, value, type_id) in &self.manual_singletons {
            singletons.register_singleton(name.clone(), value.clone())?;
            manual_singleton_index.insert(name.clone(), ManualSingleton { type_id: *type_id });
        }

        let state = ContainerState {
            definitions: Arc::new(self.definitions),
            singletons: Arc::new(singletons),
            factory_beans: Arc::new(self.factory_beans),
            aliases: Arc::new(self.aliases),
            graph: Arc::new(self.graph),
            scopes: Arc::new(self.scopes),
            instantiation_processors: self.pipeline.instantiation_processors(),
            manual_singletons: manual_singleton_index,
            resolvable_dependencies: self.resolvable_dependencies,
            ignored_dependency_types: self.ignored_dependency_types,
            prototypes_in_creation: Mutex::new(HashSet::new()),
        };
        let container = Container(Arc::new(state));

        for name in container.0.definitions.definition_names() {
            let definition = container.0.definitions.merged_definition(&name)?;
            if definition.scope.is_singleton() && !definition.lazy_init {
                trace!(name, "Eagerly pre-instantiating singleton");
                container.get_or_create_named(&name, None)?;
            }
        }

        debug!(count = container.0.definitions.definition_names().len(), "Container refreshed");
        Ok(container)
    }
}
