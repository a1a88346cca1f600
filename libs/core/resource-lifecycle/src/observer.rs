use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

/// Lifecycle transitions reported to a [`LifecycleObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A new instance was constructed
    Loaded,
    /// Construction failed; the slot is still empty
    LoadFailed,
    /// A lease was handed out
    Acquired,
    /// A lease was dropped
    Released,
    /// The last lease ended and the instance was destroyed
    Unloaded,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::LoadFailed => "load_failed",
            Self::Acquired => "acquired",
            Self::Released => "released",
            Self::Unloaded => "unloaded",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook notified on every lifecycle transition of a managed resource.
///
/// Runs inline on the acquiring/releasing task, so keep it cheap.
pub trait LifecycleObserver: Send + Sync {
    fn on_event(&self, resource: &str, event: LifecycleEvent);
}

/// Emits a debug event and a counter per transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_event(&self, resource: &str, event: LifecycleEvent) {
        debug!(resource = %resource, event = %event, "Resource lifecycle event");
        metrics::counter!(
            "resource_lifecycle_events_total",
            "resource" => resource.to_string(),
            "event" => event.as_str()
        )
        .increment(1);
    }
}

/// Keeps every event in memory. Handy for asserting release on failure paths.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(String, LifecycleEvent)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.lock().iter().map(|(_, e)| *e).collect()
    }

    pub fn count(&self, event: LifecycleEvent) -> usize {
        self.lock().iter().filter(|(_, e)| *e == event).count()
    }

    /// Acquired minus released. Zero means every lease was given back.
    pub fn outstanding(&self) -> isize {
        self.count(LifecycleEvent::Acquired) as isize - self.count(LifecycleEvent::Released) as isize
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, LifecycleEvent)>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_event(&self, resource: &str, event: LifecycleEvent) {
        self.lock().push((resource.to_string(), event));
    }
}
