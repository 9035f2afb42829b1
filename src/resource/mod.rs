//! Resource lifecycle registry.
//!
//! Every timer, animation frame, DOM node, listener, observer, worker, media
//! stream and GL context created by an effect is registered here so the page
//! can tear all of them down with one [`ResourceRegistry::cleanup_all`].
//!
//! A registered resource leaves the registry exactly once, either disposed
//! (`release`/`cleanup_all`) or retired after it finished on its own
//! (`retire`, e.g. a timeout that already fired).

mod platform;

pub use platform::Platform;

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::Result;

/// Category of a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    AnimationFrame,
    Timer,
    Interval,
    Listener,
    Observer,
    Worker,
    MediaStream,
    GlContext,
    Element,
}

impl ResourceKind {
    /// Disposal order used by `cleanup_all`: callbacks stop before the
    /// nodes they touch are removed.
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::AnimationFrame,
        ResourceKind::Timer,
        ResourceKind::Interval,
        ResourceKind::Listener,
        ResourceKind::Observer,
        ResourceKind::Worker,
        ResourceKind::MediaStream,
        ResourceKind::GlContext,
        ResourceKind::Element,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Rebuild an id handed out across the JS boundary.
    pub fn from_raw(raw: u64) -> Self {
        ResourceId(raw)
    }
}

/// Who created a resource and why. `created_at` is stamped by the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub created_at: f64,
    pub created_by: String,
    pub purpose: String,
}

impl ResourceMeta {
    pub fn new(created_by: impl Into<String>, purpose: impl Into<String>) -> Self {
        ResourceMeta {
            created_at: 0.0,
            created_by: created_by.into(),
            purpose: purpose.into(),
        }
    }
}

enum Payload<P: Platform> {
    Timer(i32, Option<P::Callback>),
    Interval(i32, Option<P::Callback>),
    AnimationFrame(i32, Option<P::Callback>),
    Element(P::Element),
    Listener(P::Listener),
    Observer(P::Observer),
    Worker(P::Worker),
    MediaStream(P::MediaStream),
    GlContext(P::GlContext),
}

impl<P: Platform> Payload<P> {
    fn kind(&self) -> ResourceKind {
        match self {
            Payload::Timer(..) => ResourceKind::Timer,
            Payload::Interval(..) => ResourceKind::Interval,
            Payload::AnimationFrame(..) => ResourceKind::AnimationFrame,
            Payload::Element(_) => ResourceKind::Element,
            Payload::Listener(_) => ResourceKind::Listener,
            Payload::Observer(_) => ResourceKind::Observer,
            Payload::Worker(_) => ResourceKind::Worker,
            Payload::MediaStream(_) => ResourceKind::MediaStream,
            Payload::GlContext(_) => ResourceKind::GlContext,
        }
    }

    fn dispose(&self, platform: &mut P) -> Result<()> {
        match self {
            Payload::Timer(id, _) => platform.clear_timeout(*id),
            Payload::Interval(id, _) => platform.clear_interval(*id),
            Payload::AnimationFrame(id, _) => platform.cancel_animation_frame(*id),
            Payload::Element(el) => platform.remove_element(el),
            Payload::Listener(l) => platform.remove_listener(l),
            Payload::Observer(o) => platform.disconnect_observer(o),
            Payload::Worker(w) => platform.terminate_worker(w),
            Payload::MediaStream(s) => platform.stop_media_stream(s),
            Payload::GlContext(gl) => platform.lose_gl_context(gl),
        }
    }
}

struct Entry<P: Platform> {
    meta: ResourceMeta,
    payload: Payload<P>,
}

/// Per-kind counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindStats {
    pub registered: u64,
    pub cleaned: u64,
    pub retired: u64,
    pub errors: u64,
    pub live: u64,
}

/// Diagnostics snapshot returned by [`ResourceRegistry::statistics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStats {
    pub by_kind: BTreeMap<ResourceKind, KindStats>,
    pub total_registered: u64,
    pub total_cleaned: u64,
    pub total_errors: u64,
    pub live: u64,
    pub cleanup_passes: u64,
}

/// Outcome of one `cleanup_all` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub cleaned: usize,
    pub errors: usize,
}

pub struct ResourceRegistry<P: Platform> {
    platform: P,
    clock: Rc<dyn Clock>,
    entries: BTreeMap<ResourceId, Entry<P>>,
    counters: BTreeMap<ResourceKind, KindStats>,
    next_id: u64,
    cleanup_passes: u64,
}

impl<P: Platform> ResourceRegistry<P> {
    pub fn new(platform: P, clock: Rc<dyn Clock>) -> Self {
        ResourceRegistry {
            platform,
            clock,
            entries: BTreeMap::new(),
            counters: BTreeMap::new(),
            next_id: 1,
            cleanup_passes: 0,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    fn insert(&mut self, payload: Payload<P>, mut meta: ResourceMeta) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        meta.created_at = self.clock.now_ms();
        let kind = payload.kind();
        let counters = self.counters.entry(kind).or_default();
        counters.registered += 1;
        counters.live += 1;
        self.entries.insert(id, Entry { meta, payload });
        id
    }

    // Browsers never hand out 0 or negative handles; treat them as null.
    fn valid_handle(id: i32, kind: ResourceKind) -> bool {
        if id <= 0 {
            debug!(?kind, id, "ignoring null handle");
            return false;
        }
        true
    }

    pub fn register_timer(&mut self, id: i32, meta: ResourceMeta) -> Option<ResourceId> {
        Self::valid_handle(id, ResourceKind::Timer)
            .then(|| self.insert(Payload::Timer(id, None), meta))
    }

    pub fn register_timer_with_callback(
        &mut self,
        id: i32,
        callback: P::Callback,
        meta: ResourceMeta,
    ) -> Option<ResourceId> {
        Self::valid_handle(id, ResourceKind::Timer)
            .then(|| self.insert(Payload::Timer(id, Some(callback)), meta))
    }

    pub fn register_interval(&mut self, id: i32, meta: ResourceMeta) -> Option<ResourceId> {
        Self::valid_handle(id, ResourceKind::Interval)
            .then(|| self.insert(Payload::Interval(id, None), meta))
    }

    pub fn register_interval_with_callback(
        &mut self,
        id: i32,
        callback: P::Callback,
        meta: ResourceMeta,
    ) -> Option<ResourceId> {
        Self::valid_handle(id, ResourceKind::Interval)
            .then(|| self.insert(Payload::Interval(id, Some(callback)), meta))
    }

    pub fn register_animation(&mut self, id: i32, meta: ResourceMeta) -> Option<ResourceId> {
        Self::valid_handle(id, ResourceKind::AnimationFrame)
            .then(|| self.insert(Payload::AnimationFrame(id, None), meta))
    }

    pub fn register_animation_with_callback(
        &mut self,
        id: i32,
        callback: P::Callback,
        meta: ResourceMeta,
    ) -> Option<ResourceId> {
        Self::valid_handle(id, ResourceKind::AnimationFrame)
            .then(|| self.insert(Payload::AnimationFrame(id, Some(callback)), meta))
    }

    pub fn register_element(&mut self, element: P::Element, meta: ResourceMeta) -> ResourceId {
        self.insert(Payload::Element(element), meta)
    }

    pub fn register_listener(&mut self, listener: P::Listener, meta: ResourceMeta) -> ResourceId {
        self.insert(Payload::Listener(listener), meta)
    }

    pub fn register_observer(&mut self, observer: P::Observer, meta: ResourceMeta) -> ResourceId {
        self.insert(Payload::Observer(observer), meta)
    }

    pub fn register_worker(&mut self, worker: P::Worker, meta: ResourceMeta) -> ResourceId {
        self.insert(Payload::Worker(worker), meta)
    }

    pub fn register_media_stream(
        &mut self,
        stream: P::MediaStream,
        meta: ResourceMeta,
    ) -> ResourceId {
        self.insert(Payload::MediaStream(stream), meta)
    }

    pub fn register_gl_context(&mut self, context: P::GlContext, meta: ResourceMeta) -> ResourceId {
        self.insert(Payload::GlContext(context), meta)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn kind(&self, id: ResourceId) -> Option<ResourceKind> {
        self.entries.get(&id).map(|e| e.payload.kind())
    }

    pub fn meta(&self, id: ResourceId) -> Option<&ResourceMeta> {
        self.entries.get(&id).map(|e| &e.meta)
    }

    /// Number of live resources of one kind.
    pub fn live(&self, kind: ResourceKind) -> usize {
        self.entries
            .values()
            .filter(|e| e.payload.kind() == kind)
            .count()
    }

    fn dispose_entry(&mut self, id: ResourceId, entry: Entry<P>) -> bool {
        let kind = entry.payload.kind();
        let result = entry.payload.dispose(&mut self.platform);
        let counters = self.counters.entry(kind).or_default();
        counters.live = counters.live.saturating_sub(1);
        match result {
            Ok(()) => {
                counters.cleaned += 1;
                true
            }
            Err(err) => {
                counters.errors += 1;
                warn!(
                    id = id.raw(),
                    created_by = %entry.meta.created_by,
                    purpose = %entry.meta.purpose,
                    %err,
                    "resource disposal failed"
                );
                false
            }
        }
    }

    /// Dispose one resource. Returns `false` for unknown or already released
    /// ids; a failed disposal still removes the entry.
    pub fn release(&mut self, id: ResourceId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                self.dispose_entry(id, entry);
                true
            }
            None => false,
        }
    }

    /// Forget a resource that already completed by itself, without calling
    /// its disposal primitive.
    pub fn retire(&mut self, id: ResourceId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                let counters = self.counters.entry(entry.payload.kind()).or_default();
                counters.live = counters.live.saturating_sub(1);
                counters.retired += 1;
                true
            }
            None => false,
        }
    }

    /// Dispose everything. Per-resource failures are logged and counted but
    /// never stop the pass. Safe to call repeatedly.
    pub fn cleanup_all(&mut self) -> CleanupReport {
        self.cleanup_passes += 1;
        let mut drained: Vec<(ResourceId, Entry<P>)> =
            std::mem::take(&mut self.entries).into_iter().collect();
        drained.sort_by_key(|(id, entry)| (entry.payload.kind(), *id));

        let mut report = CleanupReport::default();
        for (id, entry) in drained {
            if self.dispose_entry(id, entry) {
                report.cleaned += 1;
            } else {
                report.errors += 1;
            }
        }
        debug!(
            cleaned = report.cleaned,
            errors = report.errors,
            pass = self.cleanup_passes,
            "resource cleanup complete"
        );
        report
    }

    pub fn statistics(&self) -> ResourceStats {
        let mut stats = ResourceStats {
            cleanup_passes: self.cleanup_passes,
            live: self.entries.len() as u64,
            ..ResourceStats::default()
        };
        for (kind, counters) in &self.counters {
            stats.total_registered += counters.registered;
            stats.total_cleaned += counters.cleaned;
            stats.total_errors += counters.errors;
            stats.by_kind.insert(*kind, *counters);
        }
        stats
    }
}

impl<P: Platform> Drop for ResourceRegistry<P> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.cleanup_all();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::SpyPlatform;
    use super::*;
    use crate::clock::ManualClock;

    fn registry() -> ResourceRegistry<SpyPlatform> {
        ResourceRegistry::new(SpyPlatform::default(), Rc::new(ManualClock::new(42.0)))
    }

    fn meta() -> ResourceMeta {
        ResourceMeta::new("test", "unit")
    }

    #[test]
    fn null_handles_are_ignored() {
        let mut reg = registry();
        assert!(reg.register_timer(0, meta()).is_none());
        assert!(reg.register_animation(-1, meta()).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn metadata_is_stamped() {
        let mut reg = registry();
        let id = reg.register_interval(7, meta()).unwrap();
        let m = reg.meta(id).unwrap();
        assert_eq!(m.created_at, 42.0);
        assert_eq!(m.created_by, "test");
        assert_eq!(reg.kind(id), Some(ResourceKind::Interval));
    }

    #[test]
    fn release_disposes_exactly_once() {
        let mut reg = registry();
        let id = reg.register_element("div#overlay".into(), meta());
        assert!(reg.release(id));
        assert!(!reg.release(id));
        reg.cleanup_all();
        assert_eq!(reg.platform().count(ResourceKind::Element), 1);
    }

    #[test]
    fn retire_skips_disposal() {
        let mut reg = registry();
        let id = reg.register_timer(3, meta()).unwrap();
        assert!(reg.retire(id));
        reg.cleanup_all();
        assert!(reg.platform().calls.is_empty());
        let stats = reg.statistics();
        assert_eq!(stats.by_kind[&ResourceKind::Timer].retired, 1);
        assert_eq!(stats.by_kind[&ResourceKind::Timer].live, 0);
    }

    #[test]
    fn cleanup_orders_callbacks_before_nodes() {
        let mut reg = registry();
        reg.register_element("node".into(), meta());
        reg.register_listener("click".into(), meta());
        reg.register_animation(9, meta());
        reg.cleanup_all();
        let kinds: Vec<ResourceKind> = reg.platform().calls.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::AnimationFrame,
                ResourceKind::Listener,
                ResourceKind::Element
            ]
        );
    }

    #[test]
    fn failures_are_counted_and_do_not_abort() {
        let mut reg = registry();
        reg.platform_mut().failing.push("broken".into());
        reg.register_observer("broken".into(), meta());
        reg.register_observer("fine".into(), meta());
        reg.register_worker("w".into(), meta());
        let report = reg.cleanup_all();
        assert_eq!(report, CleanupReport { cleaned: 2, errors: 1 });
        assert!(reg.is_empty());
        let stats = reg.statistics();
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.total_cleaned, 2);
    }
}
