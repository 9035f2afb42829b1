mod common;

use std::rc::Rc;

use crt_wasm::clock::{Clock, ManualClock};
use crt_wasm::{ResourceKind, ResourceMeta, ResourceRegistry};

use common::{count, SpyPlatform};

fn registry() -> (ResourceRegistry<SpyPlatform>, common::CallLog) {
    let (spy, log) = SpyPlatform::new();
    let clock: Rc<dyn Clock> = Rc::new(ManualClock::new(0.0));
    (ResourceRegistry::new(spy, clock), log)
}

#[test]
fn timer_is_cancelled_by_cleanup_all() {
    let (mut registry, log) = registry();
    registry
        .register_timer(17, ResourceMeta::new("title", "glitch reset"))
        .unwrap();
    assert_eq!(registry.len(), 1);

    let report = registry.cleanup_all();
    assert_eq!(report.cleaned, 1);
    assert_eq!(count(&log, ResourceKind::Timer), 1);
    assert_eq!(log.borrow()[0].1, "17");
    assert_eq!(registry.len(), 0);

    let again = registry.cleanup_all();
    assert_eq!(again.cleaned, 0);
    assert_eq!(count(&log, ResourceKind::Timer), 1);
}

#[test]
fn every_resource_is_disposed_exactly_once() {
    let (mut registry, log) = registry();
    let timer = registry
        .register_timer(1, ResourceMeta::new("nav", "t"))
        .unwrap();
    registry.register_interval(2, ResourceMeta::new("nav", "i"));
    registry.register_animation(3, ResourceMeta::new("nav", "raf"));
    registry.register_element("div#overlay".into(), ResourceMeta::new("mini", "overlay"));
    registry.register_listener("resize".into(), ResourceMeta::new("mini", "resize"));
    registry.register_worker("decoder".into(), ResourceMeta::new("slides", "decode"));

    assert!(registry.release(timer));
    assert!(!registry.release(timer));
    registry.cleanup_all();
    registry.cleanup_all();

    assert_eq!(log.borrow().len(), 6);
    for kind in [
        ResourceKind::Timer,
        ResourceKind::Interval,
        ResourceKind::AnimationFrame,
        ResourceKind::Element,
        ResourceKind::Listener,
        ResourceKind::Worker,
    ] {
        assert_eq!(count(&log, kind), 1, "{kind:?}");
    }
}

#[test]
fn callbacks_stop_before_elements_are_removed() {
    let (mut registry, log) = registry();
    registry.register_element("canvas".into(), ResourceMeta::new("ambient", "canvas"));
    registry.register_gl_context("gl".into(), ResourceMeta::new("ambient", "gl"));
    registry.register_animation(9, ResourceMeta::new("ambient", "loop"));
    registry.register_observer("resize-observer".into(), ResourceMeta::new("ambient", "fit"));
    registry.cleanup_all();

    let order: Vec<ResourceKind> = log.borrow().iter().map(|(k, _)| *k).collect();
    assert_eq!(
        order,
        vec![
            ResourceKind::AnimationFrame,
            ResourceKind::Observer,
            ResourceKind::GlContext,
            ResourceKind::Element,
        ]
    );
}

#[test]
fn failing_disposal_is_counted_and_does_not_stop_cleanup() {
    let (mut spy, log) = SpyPlatform::new();
    spy.refuse.push("stubborn".into());
    let clock: Rc<dyn Clock> = Rc::new(ManualClock::new(0.0));
    let mut registry = ResourceRegistry::new(spy, clock);
    registry.register_media_stream("stubborn".into(), ResourceMeta::new("audio", "mic"));
    registry.register_media_stream("fine".into(), ResourceMeta::new("audio", "mic"));

    let report = registry.cleanup_all();
    assert_eq!(report.cleaned, 1);
    assert_eq!(report.errors, 1);
    assert!(registry.is_empty());
    assert_eq!(count(&log, ResourceKind::MediaStream), 2);

    let stats = registry.statistics();
    assert_eq!(stats.total_errors, 1);
    assert_eq!(stats.live, 0);
}

#[test]
fn retired_resources_are_not_disposed() {
    let (mut registry, log) = registry();
    let fired = registry
        .register_timer_with_callback(5, Rc::new(()), ResourceMeta::new("title", "one-shot"))
        .unwrap();
    assert!(registry.retire(fired));
    assert!(!registry.retire(fired));
    assert!(!registry.release(fired));
    registry.cleanup_all();
    assert!(log.borrow().is_empty());
    assert_eq!(
        registry.statistics().by_kind[&ResourceKind::Timer].retired,
        1
    );
}

#[test]
fn null_handles_are_ignored() {
    let (mut registry, _) = registry();
    assert!(registry.register_timer(0, ResourceMeta::new("x", "y")).is_none());
    assert!(registry.register_interval(-1, ResourceMeta::new("x", "y")).is_none());
    assert!(registry.is_empty());
}

#[test]
fn dropping_the_registry_cleans_up() {
    let (mut registry, log) = registry();
    registry.register_interval(8, ResourceMeta::new("slides", "advance"));
    drop(registry);
    assert_eq!(count(&log, ResourceKind::Interval), 1);
}
