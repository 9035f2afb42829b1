mod common;

use crt_wasm::coordinator::{CoordinatorConfig, EffectType, Mode, RejectReason};
use crt_wasm::events::{collector, CrtEvent};
use crt_wasm::performance::{FixedPerformance, PerformanceLevel};

use common::{coordinator, deterministic_config};

#[test]
fn repeated_title_request_is_rejected_within_cooldown() {
    let (mut c, _, bus) = coordinator(deterministic_config());
    let (_, seen) = collector(&bus);
    assert!(c.request_effect(&EffectType::Title, 0.5, "x", "title"));
    assert!(!c.request_effect(&EffectType::Title, 0.5, "x", "title"));

    let reasons: Vec<RejectReason> = seen
        .borrow()
        .iter()
        .filter_map(|e| match e {
            CrtEvent::EffectRejected(r) => Some(r.reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec![RejectReason::TypeCooldown]);
}

#[test]
fn failure_cascade_decays_back_to_stable() {
    let (mut c, clock, bus) = coordinator(deterministic_config());
    let (_, seen) = collector(&bus);

    c.trigger_cascade(0.9, "x");
    assert_eq!(c.state().mode, Mode::Failure);
    assert_eq!(c.state().cascade_level, 0.9);

    for _ in 0..20 {
        clock.advance(5_000.0);
        c.pump();
    }
    assert_eq!(c.state().mode, Mode::Stable);
    assert_eq!(c.state().cascade_level, 0.0);
    assert!(c.cascade_decay_due().is_none());
    assert_eq!(
        seen.borrow()
            .iter()
            .filter(|e| matches!(e, CrtEvent::Recovery(_)))
            .count(),
        1
    );
}

#[test]
fn failure_is_never_downgraded_by_a_weaker_cascade() {
    let (mut c, _, _) = coordinator(deterministic_config());
    c.trigger_cascade(0.95, "title");
    c.trigger_cascade(0.3, "nav");
    assert_eq!(c.state().mode, Mode::Failure);
    assert_eq!(c.state().cascade_level, 0.95);
}

#[test]
fn very_intense_effect_cascades() {
    let (mut c, _, bus) = coordinator(deterministic_config());
    let (_, seen) = collector(&bus);
    assert!(c.request_effect(&EffectType::Background, 0.95, "slides", "bg"));
    assert_eq!(c.state().mode, Mode::Failure);
    let names: Vec<&str> = seen.borrow().iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec!["effectRequest", "effectApproved", "crtCascade"]
    );
}

#[test]
fn low_tier_rejects_more_often_than_high() {
    fn approvals(level: PerformanceLevel) -> usize {
        let config = CoordinatorConfig {
            seed: Some(1234),
            initial_performance: level,
            ..CoordinatorConfig::default()
        };
        let (mut c, _, _) = coordinator(config);
        (0..10_000)
            .filter(|_| c.can_run_effect(&EffectType::Ambient, 0.3))
            .count()
    }

    let low = approvals(PerformanceLevel::Low);
    let high = approvals(PerformanceLevel::High);
    assert!(low < high);
    // 0.35 vs 0.9 acceptance, with generous sampling tolerance
    assert!((low as f64 / 10_000.0 - 0.35).abs() < 0.03, "low = {low}");
    assert!((high as f64 / 10_000.0 - 0.9).abs() < 0.03, "high = {high}");
}

#[test]
fn low_end_device_is_forced_to_low_tier() {
    let (mut c, _, bus) = coordinator(deterministic_config());
    let (_, seen) = collector(&bus);
    let monitor = FixedPerformance {
        level: PerformanceLevel::High,
        low_end: true,
    };
    assert!(c.update_performance_settings(&monitor));
    assert_eq!(c.state().performance_level, PerformanceLevel::Low);
    assert_eq!(c.state().target_fps, 30);
    assert!(seen
        .borrow()
        .iter()
        .any(|e| matches!(e, CrtEvent::FrameRateChange(f) if f.fps == 30)));
    assert!(!c.update_performance_settings(&monitor));
}

#[test]
fn custom_effect_types_use_the_default_cooldown() {
    let (mut c, clock, _) = coordinator(deterministic_config());
    let sparkle = EffectType::parse("sparkle");
    assert!(c.request_effect(&sparkle, 0.1, "x", "s"));
    c.complete_effect(&sparkle, "x", "s");
    clock.advance(1_999.0);
    assert!(!c.can_run_effect(&sparkle, 0.1));
    clock.advance(1.0);
    assert!(c.can_run_effect(&sparkle, 0.1));
}

#[test]
fn audio_raises_background_intensity() {
    let (mut c, _, _) = coordinator(deterministic_config());
    let base = c.state().background_intensity;
    c.set_audio_amplitude(1.0);
    assert!((c.state().background_intensity - (base + 0.25)).abs() < 1e-9);
    c.set_audio_amplitude(f64::NAN);
    assert_eq!(c.state().audio_amplitude, 0.0);
}

#[test]
fn rerun_of_a_running_effect_still_counts_against_capacity() {
    let (mut c, clock, _) = coordinator(deterministic_config());
    assert!(c.request_effect(&EffectType::Title, 0.5, "hero", "title"));
    clock.advance(4_000.0);
    // Cooldown is over but the first run has not completed or timed out.
    assert!(c.request_effect(&EffectType::Title, 0.5, "hero", "title"));
    assert_eq!(c.active_count(), 2);

    clock.advance(300.0);
    assert_eq!(
        c.check_effect(&EffectType::Nav, 0.2),
        Err(RejectReason::CapacityReached)
    );
    assert!(!c.request_effect(&EffectType::Nav, 0.2, "menu", "nav"));

    // Completion retires the oldest run only.
    assert!(c.complete_effect(&EffectType::Title, "hero", "title"));
    assert_eq!(c.active_count(), 1);
    let remaining: Vec<f64> = c.active_effects().map(|e| e.time).collect();
    assert_eq!(remaining, vec![14_000.0]);
    assert!(c.complete_effect(&EffectType::Title, "hero", "title"));
    assert!(!c.complete_effect(&EffectType::Title, "hero", "title"));
}

#[test]
fn low_tier_stretches_type_cooldowns() {
    let mut config = deterministic_config();
    config.initial_performance = PerformanceLevel::Low;
    config.tiers.low.effect_probability = 1.0;
    let (mut c, clock, _) = coordinator(config);

    assert!(c.request_effect(&EffectType::Title, 0.5, "hero", "title"));
    assert!(c.complete_effect(&EffectType::Title, "hero", "title"));
    clock.advance(4_000.0);
    assert_eq!(
        c.check_effect(&EffectType::Title, 0.5),
        Err(RejectReason::TypeCooldown)
    );
    clock.advance(3_999.0);
    assert_eq!(
        c.check_effect(&EffectType::Title, 0.5),
        Err(RejectReason::TypeCooldown)
    );
    clock.advance(1.0);
    assert_eq!(c.check_effect(&EffectType::Title, 0.5), Ok(()));
}

fn thermal_changes(seen: &[CrtEvent]) -> Vec<(f64, f64)> {
    seen.iter()
        .filter_map(|e| match e {
            CrtEvent::ThermalChange(t) => Some((t.level, t.delta)),
            _ => None,
        })
        .collect()
}

#[test]
fn cascade_heating_reports_thermal_change() {
    let mut config = deterministic_config();
    config.wear.initial.thermal_stress = 0.0;
    config.wear.rates.thermal_step = 0.0;
    config.wear.rates.thermal_reversion = 0.0;
    config.wear.rates.cascade_heating = 0.1;
    config.ripple_chance = 0.0;
    let (mut c, _, bus) = coordinator(config);
    let (_, seen) = collector(&bus);

    c.update_wear();
    assert!(thermal_changes(&seen.borrow()).is_empty());

    c.trigger_cascade(0.5, "test");
    c.update_wear();
    let changes = thermal_changes(&seen.borrow());
    assert_eq!(changes.len(), 1);
    // 0.5 * 0.1 heating against a 0.5 bound
    assert!((changes[0].0 - 0.1).abs() < 1e-9);
    assert!((changes[0].1 - 0.1).abs() < 1e-9);
}

#[test]
fn worn_power_supply_ripples() {
    let mut config = deterministic_config();
    config.wear.bounds.power_supply_wear.max = 1.0;
    config.wear.initial.power_supply_wear = 1.0;
    config.ripple_chance = 1.0;
    let (mut c, _, bus) = coordinator(config);
    let (_, seen) = collector(&bus);

    c.update_wear();
    let ripples: Vec<(f64, f64)> = seen
        .borrow()
        .iter()
        .filter_map(|e| match e {
            CrtEvent::PowerSupplyRipple(r) => Some((r.magnitude, r.frequency_hz)),
            _ => None,
        })
        .collect();
    assert_eq!(ripples.len(), 1);
    assert!((0.5..1.0).contains(&ripples[0].0));
    assert_eq!(ripples[0].1, 120.0);
}

#[test]
fn healthy_power_supply_never_ripples() {
    let mut config = deterministic_config();
    config.ripple_chance = 0.0;
    let (mut c, _, bus) = coordinator(config);
    let (_, seen) = collector(&bus);
    for _ in 0..50 {
        c.update_wear();
    }
    assert!(!seen
        .borrow()
        .iter()
        .any(|e| matches!(e, CrtEvent::PowerSupplyRipple(_))));
}
