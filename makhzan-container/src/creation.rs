//! Creation engine — spec.md §4.5, the steps that turn one merged
//! [`BeanDefinition`] into a finished, shareable instance.
//!
//! Two of the original eleven steps have no Rust analogue and are skipped
//! entirely rather than stubbed: resolving a class by name (a construction
//! recipe closure is already monomorphic in its produced type — see
//! [`crate::definition`]'s module doc) and selecting among method-override
//! lookup strategies (there is no reflective method table to override).
//! Constructor-argument and autowired-property resolution also collapse
//! into one step each, since a recipe closure resolves its own constructor
//! arguments directly through the resolver rather than the container
//! reflectively matching them to a parameter list.
//!
//! What remains: instantiation-aware short-circuiting, raw instantiation
//! (via a recipe or a [`crate::factory_bean::FactoryBean`]), property
//! population (explicit values, then by-name/by-type autowiring of
//! whatever a [`crate::definition::BeanInstance`] still advertises as
//! writable), initialization callbacks, and returning the finished,
//! type-erased instance for the caller to publish and register for
//! destruction.

use std::any::Any;
use std::sync::Arc;

use tracing::trace;

use crate::definition::{BeanDefinition, BeanInstance, ConstructionRecipe, PropertyValue};
use crate::error::{MakhzanError, Result};
use crate::factory_bean::FactoryBeanRegistry;
use crate::key::DependencyKey;
use crate::post_processor::InstantiationAwareBeanPostProcessor;
use crate::resolver::{BeanResolver, InjectionPoint};

/// Runs spec.md §4.5 Steps 3-11 for one bean, given its merged definition
/// and a resolver already scoped to this construction (so nested
/// `resolve::<T>()` calls inside the recipe closure record the right
/// dependency edges and in-creation bookkeeping).
pub fn create_instance(
    name: &str,
    definition: &BeanDefinition,
    resolver: &dyn BeanResolver,
    factory_beans: &FactoryBeanRegistry,
    processors: &[Arc<dyn InstantiationAwareBeanPostProcessor>],
) -> Result<Arc<dyn Any + Send + Sync>> {
    // Step 3: instantiation-aware short-circuit. A non-null result is treated
    // as the fully produced bean and skips straight to Step 9's after-init —
    // it still runs through every `after_initialization` hook (but not
    // `before_initialization`, which is only for beans this engine itself
    // instantiated), matching `resolveBeforeInstantiation`'s own call to
    // `applyBeanPostProcessorsAfterInitialization` on the short-circuit bean.
    for processor in processors {
        if let Some(substitute) = processor
            .before_instantiation(name, definition)
            .map_err(|e| wrap(name, "before_instantiation", e))?
        {
            trace!(name, "Bean short-circuited by before_instantiation hook");
            return apply_after_initialization_hooks(name, substitute, processors);
        }
    }

    // Step 4: raw instantiation.
    let mut instance: Box<dyn BeanInstance> = match &definition.recipe {
        ConstructionRecipe::Instantiate(factory) => {
            factory(resolver).map_err(|e| wrap(name, "instantiate", e))?
        }
        ConstructionRecipe::FactoryBean { factory_bean_name } => {
            let product = factory_beans
                .get_object(factory_bean_name, resolver)
                .map_err(|e| wrap(name, "FactoryBean::get_object", e))?;
            return finalize_factory_bean_product(name, product, processors);
        }
    };

    let proceed = processors.iter().try_fold(true, |proceed, processor| {
        if !proceed {
            return Ok(false);
        }
        processor.after_instantiation(name, instance.as_any()).map_err(|e| wrap(name, "after_instantiation", e))
    })?;

    if proceed {
        // Step 6/7/8: gather explicit and autowired property values, run
        // them through each processor's post_process_properties hook (each
        // seeing the previous one's replacement), then apply the result.
        populate_properties(name, instance.as_mut(), definition, resolver, processors)?;

        // Step 9: afterPropertiesSet + the init callback, wrapped by
        // before/after-initialization hooks.
        instance.after_properties_set().map_err(|e| wrap(name, "after_properties_set", e))?;
        if let Some(init_fn) = &definition.init_fn {
            init_fn(instance.as_mut()).map_err(|e| wrap(name, "init_fn", e))?;
        }
    }

    let finished = instance.finish();
    apply_initialization_hooks(name, finished, processors)
}

fn finalize_factory_bean_product(
    name: &str,
    product: Arc<dyn Any + Send + Sync>,
    processors: &[Arc<dyn InstantiationAwareBeanPostProcessor>],
) -> Result<Arc<dyn Any + Send + Sync>> {
    apply_initialization_hooks(name, product, processors)
}

fn apply_initialization_hooks(
    name: &str,
    instance: Arc<dyn Any + Send + Sync>,
    processors: &[Arc<dyn InstantiationAwareBeanPostProcessor>],
) -> Result<Arc<dyn Any + Send + Sync>> {
    let mut current = instance;
    for processor in processors {
        current = processor.before_initialization(name, current).map_err(|e| wrap(name, "before_initialization", e))?;
    }
    apply_after_initialization_hooks(name, current, processors)
}

/// Runs just the `after_initialization` half of Step 9, used for a bean
/// short-circuited out of Step 3 — it was never handed to
/// `before_initialization` because this engine never instantiated it.
fn apply_after_initialization_hooks(
    name: &str,
    instance: Arc<dyn Any + Send + Sync>,
    processors: &[Arc<dyn InstantiationAwareBeanPostProcessor>],
) -> Result<Arc<dyn Any + Send + Sync>> {
    let mut current = instance;
    for processor in processors {
        current = processor.after_initialization(name, current).map_err(|e| wrap(name, "after_initialization", e))?;
    }
    Ok(current)
}

/// Step 6/7/8: gathers explicit property values plus by-name/by-type
/// autowired candidates for whatever's still unset into one
/// [`crate::definition::PropertyValues`], runs it through each processor's
/// `post_process_properties` hook in order (each seeing the previous one's
/// replacement, matching spec.md §4.5 Step 8.3), then applies the result
/// onto the instance.
fn populate_properties(
    name: &str,
    instance: &mut dyn BeanInstance,
    definition: &BeanDefinition,
    resolver: &dyn BeanResolver,
    processors: &[Arc<dyn InstantiationAwareBeanPostProcessor>],
) -> Result<()> {
    let mut pvs = definition.property_values.clone();
    autowire_unset_properties(instance, definition, resolver, &mut pvs)?;

    for processor in processors {
        pvs = processor.post_process_properties(name, pvs).map_err(|e| wrap(name, "post_process_properties", e))?;
    }

    for (property_name, value) in pvs.iter() {
        let resolved: Arc<dyn Any + Send + Sync> = match value {
            PropertyValue::Literal(s) => Arc::new(s.clone()),
            PropertyValue::BeanRef(bean_name) => resolver
                .resolve_by_name(bean_name)
                .map_err(|e| MakhzanError::unsatisfied_dependency(name, property_name, e.to_string()))?,
            PropertyValue::Value(v) => v.clone(),
            PropertyValue::Autowired => {
                match autowire_one_by_descriptor(instance, property_name, resolver)? {
                    Some(value) => value,
                    None => continue,
                }
            }
        };
        instance
            .set_property(property_name, resolved)
            .map_err(|e| MakhzanError::unsatisfied_dependency(name, property_name, e.to_string()))?;
    }
    Ok(())
}

/// Finds the [`crate::definition::PropertyDescriptor`] matching
/// `property_name` among what the instance still advertises, and resolves
/// a dependency of that type. Returns `None` if the property isn't
/// advertised (nothing to autowire) or no candidate satisfies it.
fn autowire_one_by_descriptor(
    instance: &dyn BeanInstance,
    property_name: &str,
    resolver: &dyn BeanResolver,
) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
    let descriptor = match instance.writable_properties().into_iter().find(|d| d.name == property_name) {
        Some(d) => d,
        None => return Ok(None),
    };
    let key = DependencyKey::from_raw(descriptor.type_id, descriptor.type_name);
    let point = InjectionPoint::new(key).optional();
    resolver.resolve_optional_by_key(&point)
}

/// Step 8: by-name/by-type autowiring of every writable property the
/// instance still advertises and that explicit property values didn't
/// already set, folded into `pvs` as resolved [`PropertyValue::Value`]
/// entries so the post-processor hook sees autowired candidates too.
fn autowire_unset_properties(
    instance: &dyn BeanInstance,
    definition: &BeanDefinition,
    resolver: &dyn BeanResolver,
    pvs: &mut crate::definition::PropertyValues,
) -> Result<()> {
    use crate::definition::AutowireMode;
    if !matches!(definition.autowire_mode, AutowireMode::ByName | AutowireMode::ByType) {
        return Ok(());
    }

    for descriptor in instance.writable_properties() {
        if pvs.get(descriptor.name).is_some() {
            continue; // already set explicitly
        }

        let candidate = match definition.autowire_mode {
            AutowireMode::ByName => resolver.resolve_by_name(descriptor.name).ok(),
            AutowireMode::ByType => {
                let key = DependencyKey::from_raw(descriptor.type_id, descriptor.type_name);
                resolver.resolve_optional_by_key(&InjectionPoint::new(key).optional())?
            }
            _ => None,
        };

        if let Some(value) = candidate {
            pvs.set(descriptor.name, PropertyValue::Value(value));
        }
    }
    Ok(())
}

fn wrap(name: &str, resource: &str, err: MakhzanError) -> MakhzanError {
    match err {
        already @ MakhzanError::BeanCreationFailure(_) => already,
        other => MakhzanError::bean_creation_failure(name, resource, other, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ArgumentValue, Plain, PropertyDescriptor, PropertyValues};
    use crate::lazy::EarlyCell;
    use std::any::TypeId;
    use std::collections::HashMap;

    struct StubResolver {
        by_name: HashMap<String, Arc<dyn Any + Send + Sync>>,
    }

    impl BeanResolver for StubResolver {
        fn resolve_by_key(&self, point: &InjectionPoint) -> Result<Arc<dyn Any + Send + Sync>> {
            self.resolve_optional_by_key(point)?.ok_or_else(|| MakhzanError::no_such_bean(point.key.clone(), None))
        }
        fn resolve_optional_by_key(&self, point: &InjectionPoint) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
            Ok(self.by_name.values().find(|v| v.type_id() == point.key.type_id()).cloned())
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
        fn resolve_by_name(&self, name: &str) -> Result<Arc<dyn Any + Send + Sync>> {
            self.by_name.get(name).cloned().ok_or_else(|| MakhzanError::bean_definition_store(name, "not found"))
        }
    }

    struct Widget {
        name: String,
    }

    #[test]
    fn plain_recipe_produces_instance() {
        let definition = BeanDefinition::new::<Widget>(|_| Ok(Widget { name: "w".into() }));
        let resolver = StubResolver { by_name: HashMap::new() };
        let factory_beans = FactoryBeanRegistry::new();
        let result = create_instance("widget", &definition, &resolver, &factory_beans, &[]).unwrap();
        assert_eq!(result.downcast::<Widget>().unwrap().name, "w");
    }

    #[test]
    fn factory_errors_are_wrapped_as_creation_failure() {
        let definition = BeanDefinition::new::<Widget>(|_| Err(MakhzanError::bean_definition_store("widget", "boom")));
        let resolver = StubResolver { by_name: HashMap::new() };
        let factory_beans = FactoryBeanRegistry::new();
        let result = create_instance("widget", &definition, &resolver, &factory_beans, &[]);
        assert!(matches!(result, Err(MakhzanError::BeanCreationFailure(_))));
    }

    struct Service {
        dep: Option<Arc<Widget>>,
    }

    impl BeanInstance for Service {
        fn set_property(&mut self, name: &str, value: Arc<dyn Any + Send + Sync>) -> Result<()> {
            if name == "dep" {
                self.dep = value.downcast::<Widget>().ok();
                Ok(())
            } else {
                Err(MakhzanError::bean_definition_store("service", format!("no such property {name}")))
            }
        }
        fn finish(self: Box<Self>) -> Arc<dyn Any + Send + Sync> {
            Arc::new(*self)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn writable_properties(&self) -> Vec<PropertyDescriptor> {
            vec![PropertyDescriptor { name: "dep", type_id: TypeId::of::<Widget>(), type_name: "Widget" }]
        }
    }

    #[test]
    fn bean_ref_property_resolves_by_name() {
        let mut by_name: HashMap<String, Arc<dyn Any + Send + Sync>> = HashMap::new();
        by_name.insert("widget".into(), Arc::new(Widget { name: "w".into() }));
        let resolver = StubResolver { by_name };

        let mut pvs = PropertyValues::new();
        pvs.set("dep", PropertyValue::BeanRef("widget".into()));

        let definition =
            BeanDefinition::new_mutable::<Service>(|_| Ok(Box::new(Service { dep: None }) as Box<dyn BeanInstance>));
        let definition = BeanDefinition { property_values: pvs, ..definition };

        let factory_beans = FactoryBeanRegistry::new();
        let result = create_instance("service", &definition, &resolver, &factory_beans, &[]).unwrap();
        let service = result.downcast::<Service>().unwrap();
        assert_eq!(service.dep.as_ref().unwrap().name, "w");
    }

    #[test]
    fn by_type_autowire_fills_unset_property() {
        let mut by_name: HashMap<String, Arc<dyn Any + Send + Sync>> = HashMap::new();
        by_name.insert("widget".into(), Arc::new(Widget { name: "auto".into() }));
        let resolver = StubResolver { by_name };

        let definition =
            BeanDefinition::new_mutable::<Service>(|_| Ok(Box::new(Service { dep: None }) as Box<dyn BeanInstance>))
                .autowire_mode(crate::definition::AutowireMode::ByType);

        let factory_beans = FactoryBeanRegistry::new();
        let result = create_instance("service", &definition, &resolver, &factory_beans, &[]).unwrap();
        let service = result.downcast::<Service>().unwrap();
        assert_eq!(service.dep.as_ref().unwrap().name, "auto");
    }

    struct UppercasingProcessor;
    impl crate::post_processor::Ordered for UppercasingProcessor {}
    impl InstantiationAwareBeanPostProcessor for UppercasingProcessor {
        fn post_process_properties(
            &self,
            _name: &str,
            mut properties: PropertyValues,
        ) -> Result<PropertyValues> {
            if let Some(PropertyValue::BeanRef(bean_name)) = properties.get("dep").cloned() {
                properties.set("dep", PropertyValue::BeanRef(bean_name.to_uppercase()));
            }
            Ok(properties)
        }
    }

    #[test]
    fn post_process_properties_hook_rewrites_values_before_they_apply() {
        let mut by_name: HashMap<String, Arc<dyn Any + Send + Sync>> = HashMap::new();
        by_name.insert("WIDGET".into(), Arc::new(Widget { name: "shouted".into() }));
        let resolver = StubResolver { by_name };

        let mut pvs = PropertyValues::new();
        pvs.set("dep", PropertyValue::BeanRef("widget".into()));

        let definition =
            BeanDefinition::new_mutable::<Service>(|_| Ok(Box::new(Service { dep: None }) as Box<dyn BeanInstance>));
        let definition = BeanDefinition { property_values: pvs, ..definition };

        let factory_beans = FactoryBeanRegistry::new();
        let processors: Vec<Arc<dyn InstantiationAwareBeanPostProcessor>> = vec![Arc::new(UppercasingProcessor)];
        let result = create_instance("service", &definition, &resolver, &factory_beans, &processors).unwrap();
        let service = result.downcast::<Service>().unwrap();
        assert_eq!(service.dep.as_ref().unwrap().name, "shouted");
    }

    struct ShortCircuitingProcessor {
        substitute: Arc<dyn Any + Send + Sync>,
    }
    impl crate::post_processor::Ordered for ShortCircuitingProcessor {}
    impl InstantiationAwareBeanPostProcessor for ShortCircuitingProcessor {
        fn before_instantiation(&self, _name: &str, _definition: &BeanDefinition) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
            Ok(Some(self.substitute.clone()))
        }
    }

    struct HookCallRecorder {
        before_init_calls: Arc<std::sync::atomic::AtomicUsize>,
        after_init_calls: Arc<std::sync::atomic::AtomicUsize>,
    }
    impl crate::post_processor::Ordered for HookCallRecorder {}
    impl InstantiationAwareBeanPostProcessor for HookCallRecorder {
        fn before_initialization(&self, _name: &str, instance: Arc<dyn Any + Send + Sync>) -> Result<Arc<dyn Any + Send + Sync>> {
            self.before_init_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(instance)
        }
        fn after_initialization(&self, _name: &str, instance: Arc<dyn Any + Send + Sync>) -> Result<Arc<dyn Any + Send + Sync>> {
            self.after_init_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(instance)
        }
    }

    #[test]
    fn before_instantiation_short_circuit_still_runs_after_initialization_hooks() {
        let before_init_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let after_init_calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let definition = BeanDefinition::new::<Widget>(|_| Ok(Widget { name: "never-built".into() }));
        let resolver = StubResolver { by_name: HashMap::new() };
        let factory_beans = FactoryBeanRegistry::new();
        let substitute: Arc<dyn Any + Send + Sync> = Arc::new(Widget { name: "proxy".into() });
        let processors: Vec<Arc<dyn InstantiationAwareBeanPostProcessor>> = vec![
            Arc::new(ShortCircuitingProcessor { substitute: substitute.clone() }),
            Arc::new(HookCallRecorder {
                before_init_calls: before_init_calls.clone(),
                after_init_calls: after_init_calls.clone(),
            }),
        ];

        let result = create_instance("widget", &definition, &resolver, &factory_beans, &processors).unwrap();

        assert!(Arc::ptr_eq(&result, &substitute));
        assert_eq!(before_init_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(after_init_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn constructor_arg_literal_is_reachable_from_recipe() {
        let definition = BeanDefinition::new::<Widget>(|resolver| {
            let name = match resolver.constructor_arg(0) {
                Some(ArgumentValue::Literal(s)) => s,
                _ => "default".to_string(),
            };
            Ok(Widget { name })
        })
        .constructor_arg(0, ArgumentValue::Literal("from-arg".into()));

        struct ArgResolver<'a> {
            definition: &'a BeanDefinition,
        }
        impl BeanResolver for ArgResolver<'_> {
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
            fn constructor_arg(&self, index: usize) -> Option<ArgumentValue> {
                self.definition.constructor_argument_values.get_indexed(index).cloned()
            }
        }

        let resolver = ArgResolver { definition: &definition };
        let factory_beans = FactoryBeanRegistry::new();
        let result = create_instance("widget", &definition, &resolver, &factory_beans, &[]).unwrap();
        assert_eq!(result.downcast::<Widget>().unwrap().name, "from-arg");
    }
}
