//! End-to-end coverage of the six numbered scenarios this container's
//! testable properties are built around, exercised through the public
//! `Container`/`ContainerBuilder` facade rather than any single module's
//! internals.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use makhzan_container::container::ContainerBuilder;
use makhzan_container::definition::BeanDefinition;
use makhzan_container::error::MakhzanError;
use makhzan_container::lazy::Lazy;
use makhzan_container::post_processor::{InstantiationAwareBeanPostProcessor, Ordered};
use makhzan_container::resolver::{resolve, resolve_lazy, resolve_many};

struct Logger {
    label: String,
}

struct Service {
    logger: Arc<Logger>,
}

/// Scenario 1: simple singleton chain — exactly one construction of each
/// bean, stable identity across repeat lookups, deterministic enumeration.
#[test]
fn scenario_1_simple_singleton_chain() {
    let logger_builds = Arc::new(AtomicUsize::new(0));
    let service_builds = Arc::new(AtomicUsize::new(0));

    let mut builder = ContainerBuilder::new(false);
    {
        let builds = logger_builds.clone();
        builder
            .register_definition(
                "a",
                BeanDefinition::new::<Logger>(move |_| {
                    builds.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(Logger { label: "main".into() })
                }),
            )
            .unwrap();
    }
    {
        let builds = service_builds.clone();
        builder
            .register_definition(
                "b",
                BeanDefinition::new::<Service>(move |resolver| {
                    builds.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(Service { logger: resolve::<Logger>(resolver)? })
                }),
            )
            .unwrap();
    }

    let container = builder.build().unwrap();
    let before = container.get::<Logger>().unwrap();
    let b = container.get_named::<Service>("b").unwrap();
    let after = container.get::<Logger>().unwrap();

    assert_eq!(logger_builds.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(service_builds.load(AtomicOrdering::SeqCst), 1);
    assert!(Arc::ptr_eq(&before, &after));
    assert!(Arc::ptr_eq(&before, &b.logger));
    assert_eq!(container.bean_definition_names(), vec!["a".to_string(), "b".to_string()]);
}

struct SetterA {
    b: Lazy<SetterB>,
}
struct SetterB {
    a: Lazy<SetterA>,
}

/// Scenario 2: circular reference via setter-style injection.
///
/// The original resolves this cycle automatically by handing out a raw,
/// still-mutable instance mid-construction; there is no safe Rust analogue
/// for that (see `lazy.rs`'s module doc), so both sides declare the cyclic
/// edge explicitly via `Lazy<T>` instead of plain `Arc<T>`. The outcome the
/// scenario actually checks — both lookups succeed, and each side's `Lazy`
/// handle resolves back to the other's finished, identical instance — holds
/// exactly as specified.
#[test]
fn scenario_2_circular_setter_injection_resolves_via_lazy() {
    let mut builder = ContainerBuilder::new(false);
    builder
        .register_definition("a", BeanDefinition::new::<SetterA>(|resolver| Ok(SetterA { b: resolve_lazy::<SetterB>(resolver)? })))
        .unwrap();
    builder
        .register_definition("b", BeanDefinition::new::<SetterB>(|resolver| Ok(SetterB { a: resolve_lazy::<SetterA>(resolver)? })))
        .unwrap();

    let container = builder.build().unwrap();
    let a = container.get::<SetterA>().unwrap();
    let b = a.b.get().unwrap();
    let a_via_b = b.a.get().unwrap();
    assert!(Arc::ptr_eq(&a, &a_via_b));
}

struct CtorA {
    _b: Arc<CtorB>,
}
struct CtorB {
    _a: Arc<CtorA>,
}

/// Scenario 3: circular reference via constructor injection. Unlike setter
/// injection there is no lazy handle in play — both sides ask for the other
/// eagerly and unconditionally — so the cycle is unbreakable and must fail.
///
/// The raised error surfaces as a `BeanCreationFailure` whose `source` is a
/// `CurrentlyInCreation` error (the creation engine wraps any error escaping
/// a construction recipe as the owning bean's creation failure — see
/// `creation.rs::wrap`), the same shape the container this was ported from
/// uses for a constructor-cycle `BeanCreationException`. The underlying cycle
/// is still exactly `currently-in-creation`, just nested one level deep.
#[test]
fn scenario_3_constructor_cycle_fails_currently_in_creation() {
    let mut builder = ContainerBuilder::new(false);
    builder
        .register_definition("a", BeanDefinition::new::<CtorA>(|resolver| Ok(CtorA { _b: resolve::<CtorB>(resolver)? })))
        .unwrap();
    builder
        .register_definition("b", BeanDefinition::new::<CtorB>(|resolver| Ok(CtorB { _a: resolve::<CtorA>(resolver)? })))
        .unwrap();

    let err = builder.build().unwrap_err();
    assert!(matches!(err, MakhzanError::BeanCreationFailure(_)));
    assert!(err.to_string().contains("currently in creation"));
}

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct Primary;
impl Greeter for Primary {
    fn greet(&self) -> String {
        "primary".into()
    }
}

struct Secondary;
impl Greeter for Secondary {
    fn greet(&self) -> String {
        "secondary".into()
    }
}

struct Consumer {
    greeter: Arc<Box<dyn Greeter>>,
}

/// Scenario 4: prototype consumer with a primary/non-primary tie-break
/// among its constructor dependency. Every `getBean` on the prototype
/// returns a distinct consumer, but each wraps the same primary singleton;
/// the non-primary candidate is never built.
#[test]
fn scenario_4_prototype_with_primary_tie_break() {
    let secondary_builds = Arc::new(AtomicUsize::new(0));

    let mut builder = ContainerBuilder::new(false);
    builder
        .register_definition("a1", BeanDefinition::new::<Box<dyn Greeter>>(|_| Ok(Box::new(Primary) as Box<dyn Greeter>)).primary(true))
        .unwrap();
    {
        let builds = secondary_builds.clone();
        builder
            .register_definition(
                "a2",
                BeanDefinition::new::<Box<dyn Greeter>>(move |_| {
                    builds.fetch_add(1, AtomicOrdering::SeqCst);
                    Ok(Box::new(Secondary) as Box<dyn Greeter>)
                }),
            )
            .unwrap();
    }
    builder
        .register_definition(
            "consumer",
            BeanDefinition::new::<Consumer>(|resolver| Ok(Consumer { greeter: resolve::<Box<dyn Greeter>>(resolver)? }))
                .scope(makhzan_container::scope::ScopeName::Prototype),
        )
        .unwrap();

    let container = builder.build().unwrap();
    let c1 = container.get_named::<Consumer>("consumer").unwrap();
    let c2 = container.get_named::<Consumer>("consumer").unwrap();

    assert!(!Arc::ptr_eq(&c1, &c2));
    assert_eq!(c1.greeter.greet(), "primary");
    assert_eq!(c2.greeter.greet(), "primary");
    assert_eq!(secondary_builds.load(AtomicOrdering::SeqCst), 0);
}

/// Scenario 5: `dependsOn` forces construction and destruction ordering even
/// without a direct property/constructor reference between the two beans.
#[test]
fn scenario_5_depends_on_orders_construction_and_destruction() {
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut builder = ContainerBuilder::new(false);
    {
        let order_ctor = order.clone();
        let order_dtor = order.clone();
        builder
            .register_definition(
                "Logger",
                BeanDefinition::new::<Logger>(move |_| {
                    order_ctor.lock().push("construct:Logger");
                    Ok(Logger { label: "l".into() })
                })
                .destroy_method_fn("close", move |_| order_dtor.lock().push("destroy:Logger")),
            )
            .unwrap();
    }
    {
        let order_ctor = order.clone();
        let order_dtor = order.clone();
        builder
            .register_definition(
                "Service",
                BeanDefinition::new::<Service>(move |resolver| {
                    order_ctor.lock().push("construct:Service");
                    Ok(Service { logger: resolve::<Logger>(resolver)? })
                })
                .depends_on(vec!["Logger".to_string()])
                .destroy_method_fn("close", move |_| order_dtor.lock().push("destroy:Service")),
            )
            .unwrap();
    }

    let container = builder.build().unwrap();
    assert_eq!(*order.lock(), vec!["construct:Logger", "construct:Service"]);

    container.destroy_singletons();
    assert_eq!(*order.lock(), vec!["construct:Logger", "construct:Service", "destroy:Service", "destroy:Logger"]);
}

struct ProxyCapableA {
    proxied: bool,
    b: Lazy<ProxyCapableB>,
}
struct ProxyCapableB {
    a: Lazy<ProxyCapableA>,
}

struct ProxyPostProcessor;
impl Ordered for ProxyPostProcessor {}
impl InstantiationAwareBeanPostProcessor for ProxyPostProcessor {
    fn after_initialization(
        &self,
        name: &str,
        instance: Arc<dyn Any + Send + Sync>,
    ) -> makhzan_container::error::Result<Arc<dyn Any + Send + Sync>> {
        if name != "a" {
            return Ok(instance);
        }
        let raw = instance.downcast::<ProxyCapableA>().expect("bean 'a' is a ProxyCapableA");
        Ok(Arc::new(ProxyCapableA { proxied: true, b: raw.b.clone() }) as Arc<dyn Any + Send + Sync>)
    }
}

/// Scenario 6: a post-processor substitutes A with a proxy in
/// `after_initialization`, under the same setter-style cycle as scenario 2.
///
/// In Rust, a processor cannot hand back a *different concrete type* and
/// expect typed consumers (`Lazy<ProxyCapableA>`) to keep working — there is
/// no shared interface/vtable identity the way a dynamic proxy or CGLIB
/// subclass provides in the original. The substitute here is therefore the
/// same concrete type with a `proxied` flag flipped, which is the
/// substitution pattern this port's processors use (see DESIGN.md). What
/// the scenario actually tests — that every observer of A after
/// construction sees the *same*, fully-substituted instance, never a raw
/// pre-processor one — holds: the early-exposure cell only ever publishes
/// the fully-finished (post-processed) instance, so there is no "too late"
/// window for `allowRawInjectionDespiteWrapping` to matter.
#[test]
fn scenario_6_post_processor_substitution_is_seen_consistently_under_cycle() {
    let mut builder = ContainerBuilder::new(false);
    builder
        .register_definition(
            "a",
            BeanDefinition::new::<ProxyCapableA>(|resolver| Ok(ProxyCapableA { proxied: false, b: resolve_lazy::<ProxyCapableB>(resolver)? })),
        )
        .unwrap();
    builder
        .register_definition("b", BeanDefinition::new::<ProxyCapableB>(|resolver| Ok(ProxyCapableB { a: resolve_lazy::<ProxyCapableA>(resolver)? })))
        .unwrap();
    builder.add_instantiation_post_processor(Arc::new(ProxyPostProcessor));

    let container = builder.build().unwrap();
    let a = container.get::<ProxyCapableA>().unwrap();
    assert!(a.proxied, "getBean(\"a\") must observe the substituted instance");

    let b = a.b.get().unwrap();
    let a_via_b = b.a.get().unwrap();
    assert!(a_via_b.proxied, "b's view of a must be the same substituted instance, not the raw one");
    assert!(Arc::ptr_eq(&a, &a_via_b));
}

struct SelfTypedWidget {
    siblings: Vec<Arc<SelfTypedWidget>>,
}

/// A bean whose own constructor asks for every bean of its own type must
/// exclude itself from the enumeration (spec.md §4.6 Step 4), not just fail
/// to include an unfinished version of itself.
#[test]
fn collection_injection_excludes_the_requesting_bean_itself() {
    let mut builder = ContainerBuilder::new(false);
    builder
        .register_definition(
            "root",
            BeanDefinition::new::<SelfTypedWidget>(|resolver| Ok(SelfTypedWidget { siblings: resolve_many::<SelfTypedWidget>(resolver)? })),
        )
        .unwrap();
    builder
        .register_definition("sibling", BeanDefinition::new::<SelfTypedWidget>(|_| Ok(SelfTypedWidget { siblings: Vec::new() })))
        .unwrap();

    let container = builder.build().unwrap();
    let root = container.get_named::<SelfTypedWidget>("root").unwrap();
    assert_eq!(root.siblings.len(), 1, "root must see only 'sibling', never itself");
}

struct OnlyOneOfItsOwnType {
    _self_ref: Arc<OnlyOneOfItsOwnType>,
}

/// The sole bean of its own type asking `resolve::<Self>()` must see a clean
/// `NoSuchBean` (there is truly nothing else of that type to inject), not a
/// `CurrentlyInCreation` error from re-entering its own in-progress build.
#[test]
fn sole_bean_of_its_own_type_resolving_itself_reports_no_such_bean_not_a_cycle() {
    let mut builder = ContainerBuilder::new(false);
    builder
        .register_definition(
            "lonely",
            BeanDefinition::new::<OnlyOneOfItsOwnType>(|resolver| {
                Ok(OnlyOneOfItsOwnType { _self_ref: resolve::<OnlyOneOfItsOwnType>(resolver)? })
            }),
        )
        .unwrap();

    let err = builder.build().unwrap_err();
    assert!(matches!(err, MakhzanError::BeanCreationFailure(_)));
    assert!(err.to_string().contains("No such bean"), "expected a NoSuchBean-flavored message, got: {err}");
}
