//! Post-processor pipeline — spec.md §4.7.
//!
//! Modeled as flat capability traits rather than a class hierarchy: a
//! processor implements exactly the hooks it cares about and leaves the
//! rest at their no-op defaults, instead of subclassing a common base and
//! overriding virtual methods. This mirrors the "avoid class-hierarchy
//! dispatch" guidance already applied to [`crate::scope::CustomScope`].
//!
//! Two run phases, both ordered the same way (priority, then a declared
//! order, then registration order):
//! - Definition-phase: [`BeanDefinitionRegistryPostProcessor`]s run to a
//!   fixed point (each may register more definitions, including more
//!   registry post-processors), then [`BeanFactoryPostProcessor`]s run once.
//! - Instance-phase: [`InstantiationAwareBeanPostProcessor`] hooks run
//!   around every bean's creation, per spec.md §4.5 Steps 1, 3, 4, 6, 9, 11.

use std::any::Any;
use std::sync::Arc;

use tracing::trace;

use crate::definition::BeanDefinition;
use crate::error::Result;
use crate::registry::DefinitionRegistry;
use crate::resolver::BeanResolver;

/// Declares relative run order among processors of the same kind.
/// `Priority` processors always run before `Ordered` ones, which always run
/// before `Default`-ordered ones; within a tier, `order_hint` breaks ties
/// (lower first), then registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessorTier {
    Priority,
    Ordered,
    Default,
}

impl Default for ProcessorTier {
    fn default() -> Self {
        ProcessorTier::Default
    }
}

/// Shared ordering contract for every processor kind below.
pub trait Ordered {
    fn tier(&self) -> ProcessorTier {
        ProcessorTier::Default
    }

    /// Tie-break within a tier; lower runs first. Irrelevant across tiers.
    fn order_hint(&self) -> i32 {
        0
    }
}

/// Sorts a list of `(Ordered, registration_index)` pairs by tier, then
/// `order_hint`, then registration index, mutating in place.
fn sort_by_order<T>(items: &mut Vec<(Arc<T>, usize)>)
where
    T: Ordered + ?Sized,
{
    items.sort_by(|(a, ai), (b, bi)| {
        a.tier().cmp(&b.tier()).then(a.order_hint().cmp(&b.order_hint())).then(ai.cmp(bi))
    });
}

/// Mutates the definition registry itself before any bean is created:
/// registering additional definitions, rewriting existing ones, or reading
/// back the current set to decide what else to add.
pub trait BeanDefinitionRegistryPostProcessor: Ordered + Send + Sync {
    fn post_process_definition_registry(&self, registry: &DefinitionRegistry) -> Result<()>;
}

/// Runs once, after every `BeanDefinitionRegistryPostProcessor` has reached
/// a fixed point, to inspect or rewrite merged bean definitions (e.g.
/// globally lowering a scope, or validating required properties are set).
pub trait BeanFactoryPostProcessor: Ordered + Send + Sync {
    fn post_process_bean_factory(&self, registry: &DefinitionRegistry) -> Result<()>;
}

/// Runs around a single bean's construction. Every hook is a no-op by
/// default; a processor overrides only the ones it cares about, matching
/// spec.md §4.7's "hooks wired to specific points in §4.5" rather than a
/// single fat override-everything interface.
pub trait InstantiationAwareBeanPostProcessor: Ordered + Send + Sync {
    /// Step 1/Step 3: lets a processor short-circuit construction entirely
    /// by returning a substitute instance (e.g. a proxy).
    fn before_instantiation(&self, name: &str, definition: &BeanDefinition) -> Result<Option<Arc<dyn Any + Send + Sync>>> {
        let _ = (name, definition);
        Ok(None)
    }

    /// Step 4: runs immediately after raw instantiation, before property
    /// population. Returning `false` skips this bean's property population.
    fn after_instantiation(&self, name: &str, instance: &dyn Any) -> Result<bool> {
        let _ = (name, instance);
        Ok(true)
    }

    /// Step 6: called once per bean, right before properties are applied;
    /// lets a processor inject or rewrite property values.
    fn post_process_properties(
        &self,
        name: &str,
        properties: crate::definition::PropertyValues,
    ) -> Result<crate::definition::PropertyValues> {
        let _ = name;
        Ok(properties)
    }

    /// Step 9: before `after_properties_set`/`init_fn` run.
    fn before_initialization(&self, name: &str, instance: Arc<dyn Any + Send + Sync>) -> Result<Arc<dyn Any + Send + Sync>> {
        let _ = name;
        Ok(instance)
    }

    /// Step 9: after `after_properties_set`/`init_fn` have run. The most
    /// common hook for wrapping a bean in a proxy.
    fn after_initialization(&self, name: &str, instance: Arc<dyn Any + Send + Sync>) -> Result<Arc<dyn Any + Send + Sync>> {
        let _ = name;
        Ok(instance)
    }

    /// Whether this bean requires the Step 11 destruction callback at all;
    /// lets a processor suppress destruction for beans it knows are managed
    /// elsewhere.
    fn requires_destruction(&self, name: &str, instance: &dyn Any) -> bool {
        let _ = (name, instance);
        false
    }

    /// Step 11: invoked before the bean's own `destroy_fn`, if
    /// `requires_destruction` returned true for it.
    fn before_destruction(&self, name: &str, instance: &dyn Any) {
        let _ = (name, instance);
    }
}

/// Holds every registered processor and runs them in the phases and order
/// spec.md §4.7 describes.
#[derive(Default)]
pub struct PostProcessorPipeline {
    registry_processors: Vec<(Arc<dyn BeanDefinitionRegistryPostProcessor>, usize)>,
    factory_processors: Vec<(Arc<dyn BeanFactoryPostProcessor>, usize)>,
    instantiation_processors: Vec<(Arc<dyn InstantiationAwareBeanPostProcessor>, usize)>,
    next_index: usize,
}

impl PostProcessorPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_registry_processor(&mut self, processor: Arc<dyn BeanDefinitionRegistryPostProcessor>) {
        let index = self.next_index;
        self.next_index += 1;
        self.registry_processors.push((processor, index));
    }

    pub fn add_factory_processor(&mut self, processor: Arc<dyn BeanFactoryPostProcessor>) {
        let index = self.next_index;
        self.next_index += 1;
        self.factory_processors.push((processor, index));
    }

    pub fn add_instantiation_processor(&mut self, processor: Arc<dyn InstantiationAwareBeanPostProcessor>) {
        let index = self.next_index;
        self.next_index += 1;
        self.instantiation_processors.push((processor, index));
    }

    /// Runs registry processors to a fixed point (a processor may itself
    /// register more registry processors; those run too, in the same
    /// sweep), then every factory processor once. Called once, from the
    /// refresh driver, before any bean is instantiated.
    pub fn run_definition_phase(&mut self, registry: &DefinitionRegistry) -> Result<()> {
        let mut ran = 0;
        loop {
            let mut pending: Vec<_> = self.registry_processors[ran..].to_vec();
            if pending.is_empty() {
                break;
            }
            sort_by_order(&mut pending);
            for (processor, _) in &pending {
                trace!("Running BeanDefinitionRegistryPostProcessor");
                processor.post_process_definition_registry(registry)?;
            }
            ran = self.registry_processors.len();
        }

        let mut factory_processors = self.factory_processors.clone();
        sort_by_order(&mut factory_processors);
        for (processor, _) in &factory_processors {
            trace!("Running BeanFactoryPostProcessor");
            processor.post_process_bean_factory(registry)?;
        }
        Ok(())
    }

    pub fn instantiation_processors(&self) -> Vec<Arc<dyn InstantiationAwareBeanPostProcessor>> {
        let mut processors = self.instantiation_processors.clone();
        sort_by_order(&mut processors);
        processors.into_iter().map(|(p, _)| p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        tier: ProcessorTier,
        order_hint: i32,
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Ordered for Recorder {
        fn tier(&self) -> ProcessorTier {
            self.tier
        }
        fn order_hint(&self) -> i32 {
            self.order_hint
        }
    }

    impl BeanDefinitionRegistryPostProcessor for Recorder {
        fn post_process_definition_registry(&self, _registry: &DefinitionRegistry) -> Result<()> {
            self.log.lock().push(self.label);
            Ok(())
        }
    }

    #[test]
    fn registry_processors_run_priority_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = PostProcessorPipeline::new();
        pipeline.add_registry_processor(Arc::new(Recorder {
            tier: ProcessorTier::Default,
            order_hint: 0,
            label: "default",
            log: log.clone(),
        }));
        pipeline.add_registry_processor(Arc::new(Recorder {
            tier: ProcessorTier::Priority,
            order_hint: 0,
            label: "priority",
            log: log.clone(),
        }));

        let registry = DefinitionRegistry::new(true);
        pipeline.run_definition_phase(&registry).unwrap();
        assert_eq!(*log.lock(), vec!["priority", "default"]);
    }

    struct NoopInstantiationProcessor {
        tier: ProcessorTier,
    }
    impl Ordered for NoopInstantiationProcessor {
        fn tier(&self) -> ProcessorTier {
            self.tier
        }
    }
    impl InstantiationAwareBeanPostProcessor for NoopInstantiationProcessor {}

    #[test]
    fn instantiation_processors_sorted_by_tier() {
        let mut pipeline = PostProcessorPipeline::new();
        pipeline.add_instantiation_processor(Arc::new(NoopInstantiationProcessor { tier: ProcessorTier::Default }));
        pipeline.add_instantiation_processor(Arc::new(NoopInstantiationProcessor { tier: ProcessorTier::Priority }));
        pipeline.add_instantiation_processor(Arc::new(NoopInstantiationProcessor { tier: ProcessorTier::Ordered }));

        let ordered = pipeline.instantiation_processors();
        assert_eq!(ordered[0].tier(), ProcessorTier::Priority);
        assert_eq!(ordered[1].tier(), ProcessorTier::Ordered);
        assert_eq!(ordered[2].tier(), ProcessorTier::Default);
    }

    #[test]
    fn default_hooks_are_transparent_noops() {
        let processor = NoopInstantiationProcessor { tier: ProcessorTier::Default };
        let instance: Arc<dyn Any + Send + Sync> = Arc::new(42i32);
        let result = processor.after_initialization("x", instance.clone()).unwrap();
        assert!(Arc::ptr_eq(&instance, &result));
        assert!(!processor.requires_destruction("x", &42i32));
    }
}
