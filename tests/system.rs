mod common;

use std::rc::Rc;

use crt_wasm::clock::{Clock, ManualClock};
use crt_wasm::coordinator::{EffectType, Mode};
use crt_wasm::engines::EngineKind;
use crt_wasm::events::{collector, CrtEvent, EventBus};
use crt_wasm::performance::{FixedPerformance, FrameRateMonitor, PerformanceLevel};
use crt_wasm::style::RecordingSink;
use crt_wasm::{CrtConfig, CrtSystem, ResourceKind, ResourceMeta};

use common::{count, deterministic_config, SpyPlatform};

fn config() -> CrtConfig {
    CrtConfig {
        coordinator: deterministic_config(),
        ..CrtConfig::default()
    }
}

#[test]
fn system_ready_lists_installed_engines() {
    let bus = EventBus::new();
    let (_, seen) = collector(&bus);
    let mut config = config();
    config.engines.interlacing = None;
    let (spy, _) = SpyPlatform::new();
    let clock: Rc<dyn Clock> = Rc::new(ManualClock::new(0.0));
    let system = CrtSystem::create_with_bus(
        config,
        bus,
        spy,
        clock,
        Box::new(FixedPerformance::new(PerformanceLevel::High)),
    )
    .unwrap();

    match &seen.borrow()[0] {
        CrtEvent::SystemReady(ready) => assert_eq!(
            ready.engines,
            vec![EngineKind::Color, EngineKind::Geometry, EngineKind::ShadowMask]
        ),
        other => panic!("unexpected first event {other:?}"),
    }
    assert!(system.engines().interlacing().is_none());
}

#[test]
fn invalid_config_is_refused() {
    let mut config = config();
    config.coordinator.max_simultaneous = 0;
    let (spy, _) = SpyPlatform::new();
    let result = CrtSystem::create(
        config,
        spy,
        Rc::new(ManualClock::new(0.0)),
        Box::new(FixedPerformance::new(PerformanceLevel::High)),
    );
    assert!(result.is_err());
}

#[test]
fn slow_frames_lower_the_tier_and_frame_rate() {
    let clock = Rc::new(ManualClock::new(0.0));
    let (spy, _) = SpyPlatform::new();
    let mut config = config();
    config.performance_poll_ms = 1_000.0;
    let mut system = CrtSystem::create(
        config,
        spy,
        Rc::clone(&clock) as Rc<dyn Clock>,
        Box::new(FrameRateMonitor::default()),
    )
    .unwrap();
    let (_, seen) = collector(system.bus());

    let mut sink = RecordingSink::default();
    // 40 ms frames: 25 fps
    for _ in 0..30 {
        clock.advance(40.0);
        system.frame(&mut sink);
    }
    assert_eq!(
        system.coordinator().state().performance_level,
        PerformanceLevel::Low
    );
    assert!(seen
        .borrow()
        .iter()
        .any(|e| matches!(e, CrtEvent::PerformanceUpdate(_))));
}

#[test]
fn cascade_spreads_to_engines_and_styles() {
    let clock = Rc::new(ManualClock::new(0.0));
    let (spy, _) = SpyPlatform::new();
    let mut system = CrtSystem::create(
        config(),
        spy,
        Rc::clone(&clock) as Rc<dyn Clock>,
        Box::new(FixedPerformance::new(PerformanceLevel::High)),
    )
    .unwrap();

    let mut sink = RecordingSink::default();
    system.frame(&mut sink);
    let cold = system.engines().shadow_mask().unwrap().thermal_state().temperature;

    assert!(system
        .coordinator_mut()
        .request_effect(&EffectType::Title, 0.95, "title", "hero"));
    assert_eq!(system.coordinator().state().mode, Mode::Failure);

    clock.advance(20.0);
    system.frame(&mut sink);
    assert!(sink.has_class("crt-mode-failure"));
    assert!(system.engines().shadow_mask().unwrap().thermal_state().temperature > cold + 0.1);
    assert!(sink.number("--crt-barrel").unwrap() > 0.2);
}

#[test]
fn dispose_releases_registered_resources_once() {
    let clock = Rc::new(ManualClock::new(0.0));
    let (spy, log) = SpyPlatform::new();
    let mut system = CrtSystem::create(
        config(),
        spy,
        Rc::clone(&clock) as Rc<dyn Clock>,
        Box::new(FixedPerformance::new(PerformanceLevel::High)),
    )
    .unwrap();
    system
        .resources_mut()
        .register_timer(11, ResourceMeta::new("nav", "glitch"));
    system
        .resources_mut()
        .register_listener("mousemove".into(), ResourceMeta::new("runtime", "cursor"));

    let report = system.dispose();
    assert_eq!(report.cleaned, 2);
    assert!(system.resources().is_empty());
    system.dispose();
    drop(system);
    assert_eq!(count(&log, ResourceKind::Timer), 1);
    assert_eq!(count(&log, ResourceKind::Listener), 1);
}
