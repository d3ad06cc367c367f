// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered per-frame callback scheduler.
//!
//! Registrations are bucketed into a fixed set of [`CallbackCategory`]s. The
//! scheduler holds a subscription to the platform frame signal only while at
//! least one callback is pending, and on each signal runs the callbacks that
//! were pending when the tick began, lowest category first. Callbacks
//! registered while a tick runs wait for the next one.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Callback invoked with the frame time in nanoseconds
pub type FrameCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Ordering bucket for frame callbacks, lowest runs first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum CallbackCategory {
    /// Performance markers
    PerfMarkers,
    /// Animated graph updates
    #[default]
    NativeAnimatedModule,
    /// Flush of batched view mutations
    DispatchUi,
    /// Timers and queued events
    TimersEvents,
    /// Idle work
    IdleEvent,
}

impl CallbackCategory {
    /// Every category, in run order
    pub const ALL: [CallbackCategory; 5] = [
        Self::PerfMarkers,
        Self::NativeAnimatedModule,
        Self::DispatchUi,
        Self::TimersEvents,
        Self::IdleEvent,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Platform per-frame signal
pub trait FrameSignalSource: Send + Sync {
    /// Ask for `callback` to run once on the next display refresh
    fn subscribe(&self, callback: FrameCallback);

    /// Cancel the outstanding subscription, if any
    fn unsubscribe(&self);
}

struct Registration {
    seq: u64,
    callback: FrameCallback,
}

struct SchedulerState {
    queues: [VecDeque<Registration>; 5],
    next_seq: u64,
    pending: usize,
    subscribed: bool,
}

struct SchedulerInner {
    source: Arc<dyn FrameSignalSource>,
    state: Mutex<SchedulerState>,
    tick: Mutex<Option<FrameCallback>>,
}

/// Multiplexes callback registrations onto one platform frame signal.
///
/// Cheap to clone; clones share the pending queues. Registration is safe
/// from any thread.
#[derive(Clone)]
pub struct FrameScheduler {
    inner: Arc<SchedulerInner>,
}

impl FrameScheduler {
    /// Create a scheduler over a frame signal source
    pub fn new(source: Arc<dyn FrameSignalSource>) -> Self {
        let inner = Arc::new(SchedulerInner {
            source,
            state: Mutex::new(SchedulerState {
                queues: Default::default(),
                next_seq: 0,
                pending: 0,
                subscribed: false,
            }),
            tick: Mutex::new(None),
        });

        let weak: Weak<SchedulerInner> = Arc::downgrade(&inner);
        let tick: FrameCallback = Arc::new(move |frame_time| {
            if let Some(inner) = weak.upgrade() {
                FrameScheduler { inner }.do_frame(frame_time);
            }
        });
        *inner.tick.lock() = Some(tick);

        Self { inner }
    }

    /// Queue `callback` for the next tick
    pub fn register(&self, category: CallbackCategory, callback: FrameCallback) {
        let subscribe = {
            let mut state = self.inner.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queues[category.index()].push_back(Registration { seq, callback });
            state.pending += 1;
            !std::mem::replace(&mut state.subscribed, true)
        };
        if subscribe {
            self.subscribe();
        }
    }

    /// Remove a pending registration; unknown callbacks are ignored
    pub fn unregister(&self, category: CallbackCategory, callback: &FrameCallback) {
        let unsubscribe = {
            let mut state = self.inner.state.lock();
            let queue = &mut state.queues[category.index()];
            let Some(position) = queue.iter().position(|r| Arc::ptr_eq(&r.callback, callback))
            else {
                return;
            };
            queue.remove(position);
            state.pending -= 1;
            if state.pending == 0 && state.subscribed {
                state.subscribed = false;
                true
            } else {
                false
            }
        };
        if unsubscribe {
            tracing::debug!("no frame callbacks pending, unsubscribing");
            self.inner.source.unsubscribe();
        }
    }

    /// Number of pending registrations across all categories
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending
    }

    /// Whether the scheduler holds a frame signal subscription
    pub fn is_subscribed(&self) -> bool {
        self.inner.state.lock().subscribed
    }

    fn subscribe(&self) {
        if let Some(tick) = self.inner.tick.lock().clone() {
            self.inner.source.subscribe(tick);
        }
    }

    fn do_frame(&self, frame_time: u64) {
        let cutoff = {
            let mut state = self.inner.state.lock();
            state.subscribed = false;
            state.next_seq
        };

        for category in CallbackCategory::ALL {
            loop {
                let callback = {
                    let mut state = self.inner.state.lock();
                    let queue = &mut state.queues[category.index()];
                    match queue.front() {
                        Some(front) if front.seq < cutoff => {}
                        _ => break,
                    }
                    let Some(registration) = queue.pop_front() else {
                        break;
                    };
                    state.pending -= 1;
                    registration.callback
                };
                if catch_unwind(AssertUnwindSafe(|| callback(frame_time))).is_err() {
                    tracing::error!(?category, "frame callback panicked");
                }
            }
        }

        let resubscribe = {
            let mut state = self.inner.state.lock();
            state.pending > 0 && !std::mem::replace(&mut state.subscribed, true)
        };
        if resubscribe {
            self.subscribe();
        }
    }
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("FrameScheduler")
            .field("pending", &state.pending)
            .field("subscribed", &state.subscribed)
            .finish()
    }
}

/// Frame signal fired by hand, for headless hosts and tests
#[derive(Default)]
pub struct ManualFrameSignal {
    callback: Mutex<Option<FrameCallback>>,
    subscriptions: Mutex<usize>,
}

impl ManualFrameSignal {
    /// Create an idle signal
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver one frame to the current subscriber.
    ///
    /// Returns `false` if nobody was subscribed.
    pub fn fire(&self, frame_time_nanos: u64) -> bool {
        let callback = self.callback.lock().take();
        match callback {
            Some(callback) => {
                callback(frame_time_nanos);
                true
            }
            None => false,
        }
    }

    /// Whether a subscription is outstanding
    pub fn is_subscribed(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Total number of subscribe calls so far
    pub fn subscription_count(&self) -> usize {
        *self.subscriptions.lock()
    }
}

impl FrameSignalSource for ManualFrameSignal {
    fn subscribe(&self, callback: FrameCallback) {
        *self.subscriptions.lock() += 1;
        *self.callback.lock() = Some(callback);
    }

    fn unsubscribe(&self) {
        self.callback.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> FrameCallback {
        let log = log.clone();
        Arc::new(move |_: u64| log.lock().push(name))
    }

    #[test]
    fn test_subscribes_only_while_pending() {
        let signal = ManualFrameSignal::new();
        let scheduler = FrameScheduler::new(signal.clone());
        assert!(!signal.is_subscribed());

        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");
        scheduler.register(CallbackCategory::DispatchUi, a.clone());
        scheduler.register(CallbackCategory::DispatchUi, b);
        assert!(signal.is_subscribed());
        assert_eq!(signal.subscription_count(), 1);

        assert!(signal.fire(1));
        assert_eq!(*log.lock(), vec!["a", "b"]);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(!signal.is_subscribed());
        assert!(!scheduler.is_subscribed());
    }

    #[test]
    fn test_categories_run_in_order() {
        let signal = ManualFrameSignal::new();
        let scheduler = FrameScheduler::new(signal.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.register(CallbackCategory::IdleEvent, recorder(&log, "idle"));
        scheduler.register(CallbackCategory::DispatchUi, recorder(&log, "dispatch"));
        scheduler.register(CallbackCategory::TimersEvents, recorder(&log, "timers"));
        scheduler.register(CallbackCategory::NativeAnimatedModule, recorder(&log, "animated"));
        scheduler.register(CallbackCategory::PerfMarkers, recorder(&log, "perf"));

        signal.fire(1);
        assert_eq!(*log.lock(), vec!["perf", "animated", "dispatch", "timers", "idle"]);
    }

    #[test]
    fn test_registration_during_tick_runs_next_tick() {
        let signal = ManualFrameSignal::new();
        let scheduler = FrameScheduler::new(signal.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        let late = recorder(&log, "late");
        let registrar = {
            let scheduler = scheduler.clone();
            let log = log.clone();
            Arc::new(move |_: u64| {
                log.lock().push("first");
                // Same category and a lower one; neither may run this tick
                scheduler.register(CallbackCategory::NativeAnimatedModule, late.clone());
                scheduler.register(CallbackCategory::PerfMarkers, late.clone());
            }) as FrameCallback
        };
        scheduler.register(CallbackCategory::NativeAnimatedModule, registrar);

        signal.fire(1);
        assert_eq!(*log.lock(), vec!["first"]);
        assert!(signal.is_subscribed());
        assert_eq!(scheduler.pending_count(), 2);

        signal.fire(2);
        assert_eq!(*log.lock(), vec!["first", "late", "late"]);
        assert!(!signal.is_subscribed());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let signal = ManualFrameSignal::new();
        let scheduler = FrameScheduler::new(signal.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&log, "a");

        scheduler.unregister(CallbackCategory::DispatchUi, &a);
        scheduler.register(CallbackCategory::DispatchUi, a.clone());
        scheduler.unregister(CallbackCategory::TimersEvents, &a);
        assert!(signal.is_subscribed());

        scheduler.unregister(CallbackCategory::DispatchUi, &a);
        assert!(!signal.is_subscribed());
        scheduler.unregister(CallbackCategory::DispatchUi, &a);

        assert!(!signal.fire(1));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_panicking_callback_does_not_stop_tick() {
        let signal = ManualFrameSignal::new();
        let scheduler = FrameScheduler::new(signal.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        scheduler.register(CallbackCategory::PerfMarkers, Arc::new(|_: u64| panic!("boom")));
        scheduler.register(CallbackCategory::DispatchUi, recorder(&log, "after"));

        signal.fire(1);
        assert_eq!(*log.lock(), vec!["after"]);
    }

    #[test]
    fn test_registration_from_other_thread() {
        let signal = ManualFrameSignal::new();
        let scheduler = FrameScheduler::new(signal.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        let remote = scheduler.clone();
        let callback = recorder(&log, "remote");
        std::thread::spawn(move || remote.register(CallbackCategory::TimersEvents, callback))
            .join()
            .unwrap();

        signal.fire(1);
        assert_eq!(*log.lock(), vec!["remote"]);
    }
}
