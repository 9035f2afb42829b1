//! Effect coordination.
//!
//! The coordinator decides which visual effect may run at a given moment,
//! owns the shared [`GlobalState`] and runs the wear simulation. Requests are
//! answered synchronously; a denied caller simply retries on its own next
//! tick.

mod config;
mod effect;
mod state;
mod wear;

pub use config::{CoordinatorConfig, TierSpacing};
pub use effect::{EffectRequest, EffectType, IntensityTier, RejectReason};
pub use state::{CursorState, GlobalState, Mode};
pub use wear::{Bound, WearBounds, WearConfig, WearPatterns, WearRates, WearSimulator};

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::events::{self, CrtEvent, EventBus};
use crate::performance::{PerformanceLevel, PerformanceMonitor, TierSettings};
use crate::scheduler::{Deadline, RepeatingTask};
use crate::style::StyleSink;
use effect::{ActiveEffect, ActiveKey};

/// Bookkeeping record of a consumer module.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredSystem {
    pub id: String,
    pub initial_state: serde_json::Value,
    pub registered_at: f64,
}

pub struct EffectCoordinator {
    config: CoordinatorConfig,
    bus: Rc<EventBus>,
    clock: Rc<dyn Clock>,
    rng: SmallRng,
    state: GlobalState,
    wear: WearSimulator,
    tier: TierSettings,
    systems: BTreeMap<String, RegisteredSystem>,
    active: BTreeMap<ActiveKey, ActiveEffect>,
    next_seq: u64,
    last_by_type: HashMap<EffectType, f64>,
    last_by_tier: HashMap<IntensityTier, f64>,
    global_cooldown_until: f64,
    wear_task: RepeatingTask,
    cascade_decay: Deadline,
    last_thermal_broadcast: f64,
}

impl EffectCoordinator {
    pub fn new(config: CoordinatorConfig, bus: Rc<EventBus>, clock: Rc<dyn Clock>) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let wear = WearSimulator::new(&config.wear);
        let level = config.initial_performance;
        let tier = config.tiers.get(level);
        let mut state = GlobalState {
            performance_level: level,
            target_fps: tier.target_fps,
            wear: *wear.wear(),
            global_wear: wear.global_wear(),
            thermal_level: wear.thermal_level(),
            ..GlobalState::default()
        };
        state.background_intensity = config.background_base;

        let mut wear_task = RepeatingTask::new(config.wear_interval_ms);
        wear_task.start(clock.now_ms());

        EffectCoordinator {
            last_thermal_broadcast: state.thermal_level,
            config,
            bus,
            clock,
            rng,
            state,
            wear,
            tier,
            systems: BTreeMap::new(),
            active: BTreeMap::new(),
            next_seq: 0,
            last_by_type: HashMap::new(),
            last_by_tier: HashMap::new(),
            global_cooldown_until: 0.0,
            wear_task,
            cascade_decay: Deadline::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn tier_settings(&self) -> TierSettings {
        self.tier
    }

    pub fn wear_simulator(&self) -> &WearSimulator {
        &self.wear
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_effects(&self) -> impl Iterator<Item = &EffectRequest> {
        self.active.values().map(|a| &a.request)
    }

    pub fn global_cooldown_until(&self) -> f64 {
        self.global_cooldown_until
    }

    pub fn cascade_decay_due(&self) -> Option<f64> {
        self.cascade_decay.due_ms()
    }

    // ----------------------------------------------------------------------
    // System registration
    // ----------------------------------------------------------------------

    pub fn register_system(&mut self, id: &str, initial_state: serde_json::Value) -> bool {
        if self.systems.contains_key(id) {
            warn!(system = id, "system already registered");
            return false;
        }
        let record = RegisteredSystem {
            id: id.to_string(),
            initial_state,
            registered_at: self.clock.now_ms(),
        };
        self.systems.insert(id.to_string(), record);
        debug!(system = id, total = self.systems.len(), "system registered");
        true
    }

    pub fn unregister_system(&mut self, id: &str) -> bool {
        let removed = self.systems.remove(id).is_some();
        if !removed {
            debug!(system = id, "unregister of unknown system");
        }
        removed
    }

    pub fn systems(&self) -> impl Iterator<Item = &RegisteredSystem> {
        self.systems.values()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.systems.contains_key(id)
    }

    // ----------------------------------------------------------------------
    // Effect arbitration
    // ----------------------------------------------------------------------

    fn expire_stale(&mut self, now: f64) {
        let timeout = self.config.effect_timeout_ms;
        let before = self.active.len();
        self.active
            .retain(|_, effect| now - effect.request.time < timeout);
        if self.active.len() != before {
            debug!(expired = before - self.active.len(), "active effects timed out");
            self.recompute_max_intensity();
        }
    }

    /// Checks every gate in order and reports the first one that fails.
    ///
    /// Only consumes one random draw and drops timed-out effects; cooldown
    /// state is left untouched.
    pub fn check_effect(
        &mut self,
        effect_type: &EffectType,
        intensity: f64,
    ) -> Result<(), RejectReason> {
        if intensity.is_nan() {
            return Err(RejectReason::InvalidIntensity);
        }
        if self.state.motion_paused {
            return Err(RejectReason::MotionPaused);
        }
        if self.rng.gen::<f64>() > self.tier.effect_probability {
            return Err(RejectReason::ProbabilityGate);
        }

        let now = self.clock.now_ms();
        self.expire_stale(now);

        if now < self.global_cooldown_until {
            return Err(RejectReason::GlobalCooldown);
        }

        let cooldown = self.config.cooldown_for(effect_type) * self.tier.cooldown_multiplier;
        if let Some(last) = self.last_by_type.get(effect_type) {
            if now - last < cooldown {
                return Err(RejectReason::TypeCooldown);
            }
        }

        let tier = self.intensity_tier(intensity);
        if let Some(last) = self.last_by_tier.get(&tier) {
            if now - last < self.config.tier_spacing.get(tier) {
                return Err(RejectReason::IntensityCooldown);
            }
        }

        if self.active.len() >= self.config.max_simultaneous {
            return Err(RejectReason::CapacityReached);
        }
        Ok(())
    }

    pub fn can_run_effect(&mut self, effect_type: &EffectType, intensity: f64) -> bool {
        self.check_effect(effect_type, intensity).is_ok()
    }

    pub fn intensity_tier(&self, intensity: f64) -> IntensityTier {
        IntensityTier::classify(
            intensity.clamp(0.0, 1.0),
            self.config.medium_threshold,
            self.config.high_threshold,
        )
    }

    fn notice(
        &self,
        effect_type: &EffectType,
        intensity: f64,
        source: &str,
        system_id: &str,
        time: f64,
    ) -> events::EffectNotice {
        events::EffectNotice {
            effect_type: effect_type.to_string(),
            intensity,
            source: source.to_string(),
            system_id: system_id.to_string(),
            time,
        }
    }

    /// Ask permission to run an effect. On approval the effect counts as
    /// active until [`complete_effect`](Self::complete_effect) or timeout.
    pub fn request_effect(
        &mut self,
        effect_type: &EffectType,
        intensity: f64,
        source: &str,
        system_id: &str,
    ) -> bool {
        let now = self.clock.now_ms();
        let raw = if intensity.is_nan() {
            intensity
        } else {
            intensity.clamp(0.0, 1.0)
        };
        self.bus.publish(CrtEvent::EffectRequest(
            self.notice(effect_type, raw, source, system_id, now),
        ));

        if let Err(reason) = self.check_effect(effect_type, raw) {
            debug!(effect = %effect_type, source, ?reason, "effect rejected");
            self.bus.publish(CrtEvent::EffectRejected(events::EffectRejected {
                notice: self.notice(effect_type, raw, source, system_id, now),
                reason,
            }));
            return false;
        }

        let scaled = (raw * self.tier.intensity_multiplier).clamp(0.0, 1.0);
        let request = EffectRequest {
            effect_type: effect_type.clone(),
            intensity: raw,
            source: source.to_string(),
            system_id: system_id.to_string(),
            time: now,
        };
        let key = ActiveKey {
            effect_type: effect_type.clone(),
            source: source.to_string(),
            system_id: system_id.to_string(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.active.insert(
            key,
            ActiveEffect {
                request,
                scaled_intensity: scaled,
            },
        );
        let tier = self.intensity_tier(raw);
        self.last_by_type.insert(effect_type.clone(), now);
        self.last_by_tier.insert(tier, now);
        self.recompute_max_intensity();

        self.bus.publish(CrtEvent::EffectApproved(
            self.notice(effect_type, scaled, source, system_id, now),
        ));

        if raw >= self.config.global_cooldown_threshold {
            self.trigger_global_cooldown(self.config.high_intensity_recovery_ms);
        }
        if raw >= self.config.cascade_threshold {
            self.trigger_cascade(raw, source);
        }
        true
    }

    /// Retire the oldest still-active run of this effect.
    pub fn complete_effect(&mut self, effect_type: &EffectType, source: &str, system_id: &str) -> bool {
        let oldest = self
            .active
            .keys()
            .find(|k| k.matches(effect_type, source, system_id))
            .cloned();
        let Some(key) = oldest else {
            debug!(effect = %effect_type, source, "completion for inactive effect");
            return false;
        };
        self.active.remove(&key);
        self.recompute_max_intensity();
        self.bus.publish(CrtEvent::EffectComplete(events::EffectComplete {
            effect_type: effect_type.to_string(),
            source: source.to_string(),
            system_id: system_id.to_string(),
            max_active_intensity: self.state.max_active_intensity,
        }));
        true
    }

    fn recompute_max_intensity(&mut self) {
        self.state.max_active_intensity = self
            .active
            .values()
            .map(|a| a.scaled_intensity)
            .fold(0.0, f64::max);
    }

    /// Block every request until `duration_ms` from now. Never shortens an
    /// already running cooldown.
    pub fn trigger_global_cooldown(&mut self, duration_ms: f64) {
        let until = self.clock.now_ms() + duration_ms.max(0.0);
        if until > self.global_cooldown_until {
            self.global_cooldown_until = until;
            debug!(duration_ms, "global cooldown");
        }
    }

    // ----------------------------------------------------------------------
    // Cascade state machine
    // ----------------------------------------------------------------------

    pub fn trigger_cascade(&mut self, intensity: f64, origin: &str) {
        if intensity.is_nan() {
            return;
        }
        let intensity = intensity.clamp(0.0, 1.0);
        self.state.cascade_level = self.state.cascade_level.max(intensity);

        if intensity > self.config.failure_threshold {
            self.state.mode = Mode::Failure;
        } else if self.state.mode == Mode::Stable {
            self.state.mode = Mode::Cascade;
        }
        info!(
            level = self.state.cascade_level,
            origin,
            mode = self.state.mode.as_str(),
            "cascade triggered"
        );

        self.update_background_intensity();
        self.bus.publish(CrtEvent::Cascade(events::Cascade {
            level: self.state.cascade_level,
            origin: origin.to_string(),
            mode: self.state.mode,
        }));
        self.schedule_decay();

        if self.state.mode == Mode::Failure {
            self.trigger_global_cooldown(self.config.failure_recovery_ms);
        }
    }

    fn schedule_decay(&mut self) {
        let (lo, hi) = (self.config.cascade_decay_min_ms, self.config.cascade_decay_max_ms);
        let delay = if hi > lo { self.rng.gen_range(lo..hi) } else { lo };
        self.cascade_decay.schedule_at(self.clock.now_ms() + delay);
    }

    fn decay_cascade(&mut self) {
        self.state.cascade_level *= self.config.cascade_decay_factor;
        if self.state.cascade_level < self.config.cascade_floor {
            self.state.cascade_level = 0.0;
            self.state.mode = Mode::Stable;
            self.update_background_intensity();
            info!("cascade decayed, tube stable");
            self.bus.publish(CrtEvent::Recovery(events::Recovery {
                mode: Mode::Stable,
                time: self.clock.now_ms(),
            }));
        } else {
            self.update_background_intensity();
            self.schedule_decay();
        }
    }

    // ----------------------------------------------------------------------
    // Periodic jobs
    // ----------------------------------------------------------------------

    /// Run whatever periodic work is due at the current clock time.
    pub fn pump(&mut self) {
        let now = self.clock.now_ms();
        if self.wear_task.poll(now) {
            self.update_wear();
        }
        if self.cascade_decay.poll(now) {
            self.decay_cascade();
        }
        self.expire_stale(now);
    }

    /// One wear tick: drift, clamp, derive, broadcast.
    pub fn update_wear(&mut self) {
        self.wear.tick(&mut self.rng, self.state.cascade_level);
        self.state.wear = *self.wear.wear();
        self.state.global_wear = self.wear.global_wear();
        self.state.thermal_level = self.wear.thermal_level();

        self.bus.publish(CrtEvent::WearUpdate(events::WearUpdate {
            wear: self.state.wear,
            global_wear: self.state.global_wear,
            thermal_level: self.state.thermal_level,
        }));

        let delta = self.state.thermal_level - self.last_thermal_broadcast;
        if delta.abs() >= self.config.thermal_report_step {
            self.last_thermal_broadcast = self.state.thermal_level;
            self.bus.publish(CrtEvent::ThermalChange(events::ThermalChange {
                level: self.state.thermal_level,
                delta,
            }));
        }

        let psu = self.state.wear.power_supply_wear;
        if self.rng.gen::<f64>() < psu * self.config.ripple_chance {
            let magnitude = psu * self.rng.gen_range(0.5..1.0);
            self.bus.publish(CrtEvent::PowerSupplyRipple(events::PowerSupplyRipple {
                magnitude,
                frequency_hz: self.config.ripple_frequency_hz,
            }));
        }
    }

    // ----------------------------------------------------------------------
    // Performance and inputs
    // ----------------------------------------------------------------------

    /// Adopt the monitor's tier. Returns `true` when the tier changed.
    pub fn update_performance_settings(&mut self, monitor: &dyn PerformanceMonitor) -> bool {
        let level = if monitor.is_low_end_device() {
            PerformanceLevel::Low
        } else {
            monitor.performance_level()
        };
        self.set_performance_level(level)
    }

    pub fn set_performance_level(&mut self, level: PerformanceLevel) -> bool {
        if level == self.state.performance_level {
            return false;
        }
        self.tier = self.config.tiers.get(level);
        self.state.performance_level = level;
        self.state.target_fps = self.tier.target_fps;
        info!(?level, fps = self.tier.target_fps, "performance tier changed");
        self.bus.publish(CrtEvent::PerformanceUpdate(events::PerformanceUpdate {
            level,
            settings: self.tier,
        }));
        self.bus.publish(CrtEvent::FrameRateChange(events::FrameRateChange {
            fps: self.tier.target_fps,
        }));
        true
    }

    /// Global kill switch; pauses the wear job while set.
    pub fn set_motion_paused(&mut self, paused: bool) {
        if paused == self.state.motion_paused {
            return;
        }
        let now = self.clock.now_ms();
        self.state.motion_paused = paused;
        if paused {
            self.wear_task.pause(now);
        } else {
            self.wear_task.resume(now);
        }
        debug!(paused, "motion flag changed");
    }

    pub fn set_cursor(&mut self, x: f64, y: f64, active: bool) {
        self.state.cursor = CursorState { x, y, active };
        self.bus
            .publish(CrtEvent::CursorUpdate(events::CursorUpdate { x, y, active }));
    }

    pub fn set_audio_amplitude(&mut self, amplitude: f64) {
        let amplitude = if amplitude.is_finite() {
            amplitude.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.state.audio_amplitude = amplitude;
        self.update_background_intensity();
        self.bus
            .publish(CrtEvent::AudioUpdate(events::AudioUpdate { amplitude }));
    }

    fn update_background_intensity(&mut self) {
        self.state.background_intensity = (self.config.background_base
            + self.state.cascade_level * 0.4
            + self.state.audio_amplitude * 0.25)
            .clamp(0.0, 1.0);
    }

    /// Write the coordinator-owned CSS properties and mode classes.
    pub fn write_styles(&self, sink: &mut dyn StyleSink) {
        let s = &self.state;
        sink.set_number("--adaptive-intensity", s.max_active_intensity);
        sink.set_number("--crt-background-intensity", s.background_intensity);
        sink.set_number("--crt-cascade-level", s.cascade_level);
        sink.set_number("--crt-thermal-level", s.thermal_level);
        sink.set_number("--crt-global-wear", s.global_wear);
        for mode in [Mode::Stable, Mode::Cascade, Mode::Failure] {
            sink.set_class(&format!("crt-mode-{}", mode.as_str()), mode == s.mode);
        }
    }

    /// Stop periodic jobs and forget active effects.
    pub fn shutdown(&mut self) {
        self.wear_task.cancel();
        self.cascade_decay.cancel();
        self.active.clear();
        self.state.max_active_intensity = 0.0;
    }
}

impl std::fmt::Debug for EffectCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectCoordinator")
            .field("mode", &self.state.mode)
            .field("active", &self.active.len())
            .field("systems", &self.systems.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::collector;

    fn always_on() -> CoordinatorConfig {
        let mut config = CoordinatorConfig {
            seed: Some(11),
            ..CoordinatorConfig::default()
        };
        config.tiers.high.effect_probability = 1.0;
        config
    }

    fn setup(config: CoordinatorConfig) -> (EffectCoordinator, Rc<ManualClock>, Rc<EventBus>) {
        let clock = Rc::new(ManualClock::new(1_000.0));
        let bus = EventBus::new();
        let coordinator = EffectCoordinator::new(config, Rc::clone(&bus), clock.clone());
        (coordinator, clock, bus)
    }

    #[test]
    fn duplicate_registration_is_a_noop() {
        let (mut c, _, _) = setup(always_on());
        assert!(c.register_system("nav", serde_json::json!({"links": 4})));
        assert!(!c.register_system("nav", serde_json::Value::Null));
        assert_eq!(c.systems().count(), 1);
        assert!(c.unregister_system("nav"));
        assert!(!c.unregister_system("nav"));
    }

    #[test]
    fn same_type_blocked_until_cooldown_elapses() {
        let (mut c, clock, _) = setup(always_on());
        let title = EffectType::Title;
        assert!(c.request_effect(&title, 0.5, "x", "s"));
        assert!(c.complete_effect(&title, "x", "s"));
        assert!(!c.request_effect(&title, 0.5, "x", "s"));
        clock.advance(4_000.0);
        assert!(c.request_effect(&title, 0.5, "x", "s"));
    }

    #[test]
    fn intensity_tier_spacing_applies_across_types() {
        let (mut c, clock, _) = setup(always_on());
        assert!(c.request_effect(&EffectType::Nav, 0.5, "a", "s"));
        assert_eq!(
            c.check_effect(&EffectType::Ambient, 0.45),
            Err(RejectReason::IntensityCooldown)
        );
        assert!(c.can_run_effect(&EffectType::Ambient, 0.1));
        clock.advance(1_200.0);
        assert!(c.can_run_effect(&EffectType::Ambient, 0.45));
    }

    #[test]
    fn capacity_cap_is_enforced() {
        let (mut c, _, _) = setup(always_on());
        assert!(c.request_effect(&EffectType::Nav, 0.1, "a", "s"));
        assert!(c.request_effect(&EffectType::Ambient, 0.5, "b", "s"));
        assert_eq!(
            c.check_effect(&EffectType::Scanline, 0.75),
            Err(RejectReason::CapacityReached)
        );
        assert_eq!(c.active_count(), 2);
        c.complete_effect(&EffectType::Nav, "a", "s");
        assert!(c.request_effect(&EffectType::Scanline, 0.75, "c", "s"));
    }

    #[test]
    fn approval_is_scaled_by_tier() {
        let mut config = always_on();
        config.tiers.medium.effect_probability = 1.0;
        let (mut c, _, bus) = setup(config);
        c.set_performance_level(PerformanceLevel::Medium);
        let (_, seen) = collector(&bus);
        assert!(c.request_effect(&EffectType::Nav, 0.5, "nav", "s"));
        let approved = seen
            .borrow()
            .iter()
            .find_map(|e| match e {
                CrtEvent::EffectApproved(n) => Some(n.intensity),
                _ => None,
            })
            .unwrap();
        assert!((approved - 0.4).abs() < 1e-9);
        assert!((c.state().max_active_intensity - 0.4).abs() < 1e-9);
    }

    #[test]
    fn high_intensity_starts_global_cooldown() {
        let (mut c, clock, _) = setup(always_on());
        assert!(c.request_effect(&EffectType::Nav, 0.86, "a", "s"));
        assert_eq!(
            c.check_effect(&EffectType::Ambient, 0.1),
            Err(RejectReason::GlobalCooldown)
        );
        assert_eq!(c.state().mode, Mode::Stable);
        clock.advance(3_000.0);
        assert!(c.can_run_effect(&EffectType::Ambient, 0.1));
    }

    #[test]
    fn motion_pause_rejects_first() {
        let (mut c, _, _) = setup(always_on());
        c.set_motion_paused(true);
        assert_eq!(
            c.check_effect(&EffectType::Title, 0.2),
            Err(RejectReason::MotionPaused)
        );
        assert_eq!(
            c.check_effect(&EffectType::Title, f64::NAN),
            Err(RejectReason::InvalidIntensity)
        );
    }

    #[test]
    fn stale_effects_time_out() {
        let (mut c, clock, _) = setup(always_on());
        assert!(c.request_effect(&EffectType::Nav, 0.2, "a", "s"));
        clock.advance(6_000.0);
        c.pump();
        assert_eq!(c.active_count(), 0);
        assert!(!c.complete_effect(&EffectType::Nav, "a", "s"));
    }

    #[test]
    fn moderate_cascade_enters_cascade_mode() {
        let (mut c, _, bus) = setup(always_on());
        let (_, seen) = collector(&bus);
        c.trigger_cascade(0.5, "title");
        assert_eq!(c.state().mode, Mode::Cascade);
        assert_eq!(c.state().cascade_level, 0.5);
        assert!(c.cascade_decay_due().is_some());
        assert!(matches!(seen.borrow()[0], CrtEvent::Cascade(_)));
        // lower intensity never lowers the level
        c.trigger_cascade(0.2, "nav");
        assert_eq!(c.state().cascade_level, 0.5);
    }

    #[test]
    fn wear_tick_broadcasts() {
        let (mut c, clock, bus) = setup(always_on());
        let (_, seen) = collector(&bus);
        clock.advance(500.0);
        c.pump();
        assert!(seen
            .borrow()
            .iter()
            .any(|e| matches!(e, CrtEvent::WearUpdate(_))));
        assert_eq!(c.wear_simulator().ticks(), 1);
    }

    #[test]
    fn styles_reflect_mode() {
        let (mut c, _, _) = setup(always_on());
        c.trigger_cascade(0.95, "x");
        let mut sink = crate::style::RecordingSink::default();
        c.write_styles(&mut sink);
        assert!(sink.has_class("crt-mode-failure"));
        assert!(!sink.has_class("crt-mode-stable"));
        assert_eq!(sink.number("--crt-cascade-level"), Some(0.95));
    }
}
