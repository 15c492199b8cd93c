//! Lifecycle event dispatch.
//!
//! Events are delivered synchronously, on the audio thread, to every
//! registered listener. Listener registration uses a copy-on-write snapshot
//! (`ArcSwap<Vec<_>>`) rather than a mutex: a write replaces the whole list
//! behind the pointer, a read clones the `Arc` once and iterates without
//! ever blocking behind a concurrent registration.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;

/// Stable, ownership-free reference to the cue that raised an event.
/// Deliberately not a strong `Arc<Cue>` — a listener must never be able to
/// keep a cue alive past its owner dropping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CueId(pub u64);

/// One lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// A cue's standalone player thread started.
    AudioCueOpened {
        cue: CueId,
        wall_ms: u64,
        thread_priority: i32,
        buffer_frames: u32,
    },
    /// A cue's standalone player thread stopped.
    AudioCueClosed { cue: CueId, wall_ms: u64 },
    /// An instance was taken from the availability pool.
    ObtainInstance {
        cue: CueId,
        instance_id: usize,
        wall_ms: u64,
        frame_at_event: f64,
    },
    /// An instance was returned to the availability pool.
    ReleaseInstance {
        cue: CueId,
        instance_id: usize,
        wall_ms: u64,
        frame_at_event: f64,
    },
    /// An instance began (or resumed) playback.
    StartInstance {
        cue: CueId,
        instance_id: usize,
        wall_ms: u64,
        frame_at_event: f64,
    },
    /// An instance stopped playback (explicit `stop()` or natural end).
    StopInstance {
        cue: CueId,
        instance_id: usize,
        wall_ms: u64,
        frame_at_event: f64,
    },
    /// An instance looped back to the start of the cue.
    Loop {
        cue: CueId,
        instance_id: usize,
        wall_ms: u64,
        frame_at_event: f64,
    },
}

/// Returns the current wall-clock time in milliseconds since the epoch.
/// Centralized so callers don't scatter `SystemTime::now()` across the
/// audio-thread hot path.
#[inline]
pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Implemented by anything that wants to observe engine lifecycle events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// Copy-on-write fan-out list. `register`/`unregister` are control-thread
/// operations; `dispatch` runs on the audio thread and never blocks.
pub struct EventDispatcher {
    listeners: ArcSwap<Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Register a new listener. Replaces the whole snapshot; existing
    /// readers mid-iteration keep using their already-cloned `Arc`.
    pub fn register(&self, listener: Arc<dyn EventListener>) {
        let mut next = (**self.listeners.load()).clone();
        next.push(listener);
        self.listeners.store(Arc::new(next));
    }

    /// Unregister a listener by pointer identity.
    pub fn unregister(&self, listener: &Arc<dyn EventListener>) {
        let mut next = (**self.listeners.load()).clone();
        next.retain(|l| !Arc::ptr_eq(l, listener));
        self.listeners.store(Arc::new(next));
    }

    /// Deliver `event` to every listener in the current snapshot. Called
    /// from the audio thread; never takes a lock.
    pub fn dispatch(&self, event: EngineEvent) {
        let snapshot = self.listeners.load();
        for listener in snapshot.iter() {
            listener.on_event(event);
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(Arc<AtomicUsize>);

    impl EventListener for CountingListener {
        fn on_event(&self, _event: EngineEvent) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_dispatch_reaches_registered_listeners() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let listener: Arc<dyn EventListener> = Arc::new(CountingListener(count.clone()));
        dispatcher.register(listener);

        dispatcher.dispatch(EngineEvent::ObtainInstance {
            cue: CueId(1),
            instance_id: 0,
            wall_ms: 0,
            frame_at_event: 0.0,
        });

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let listener: Arc<dyn EventListener> = Arc::new(CountingListener(count.clone()));
        dispatcher.register(listener.clone());
        dispatcher.unregister(&listener);

        dispatcher.dispatch(EngineEvent::ObtainInstance {
            cue: CueId(1),
            instance_id: 0,
            wall_ms: 0,
            frame_at_event: 0.0,
        });

        assert_eq!(count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_no_listeners_does_not_panic() {
        let dispatcher = EventDispatcher::new();
        dispatcher.dispatch(EngineEvent::AudioCueClosed {
            cue: CueId(1),
            wall_ms: 0,
        });
    }
}
