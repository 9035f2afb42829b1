//! Disposal primitives of the host environment.

use crate::error::Result;

/// The browser (or a test double) as seen by the resource registry.
///
/// Associated types are the payloads kept alive by the registry; each
/// `dispose_*` method is the type-appropriate release primitive.
pub trait Platform {
    /// DOM node
    type Element;
    /// Event listener binding (target, event name, callback)
    type Listener;
    /// Mutation/resize/intersection observer
    type Observer;
    type Worker;
    type MediaStream;
    /// WebGL rendering context
    type GlContext;
    /// Closure kept alive while a timer or frame callback is pending
    type Callback;

    fn clear_timeout(&mut self, id: i32) -> Result<()>;
    fn clear_interval(&mut self, id: i32) -> Result<()>;
    fn cancel_animation_frame(&mut self, id: i32) -> Result<()>;
    fn remove_element(&mut self, element: &Self::Element) -> Result<()>;
    fn remove_listener(&mut self, listener: &Self::Listener) -> Result<()>;
    fn disconnect_observer(&mut self, observer: &Self::Observer) -> Result<()>;
    fn terminate_worker(&mut self, worker: &Self::Worker) -> Result<()>;
    fn stop_media_stream(&mut self, stream: &Self::MediaStream) -> Result<()>;
    fn lose_gl_context(&mut self, context: &Self::GlContext) -> Result<()>;
}
