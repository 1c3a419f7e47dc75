//! Ring timeout scheduling
//!
//! `TimeoutScheduler` keeps at most one pending single-shot timer per call id on
//! top of a `TimerDriver`. Two drivers are provided:
//!
//! - `TokioTimerDriver` spawns a sleeping task per timer and aborts it on cancel.
//! - `ManualTimerDriver` keeps timers in a list and fires them when the host calls
//!   `advance`, for embedding in an externally pumped event loop and for tests.
//!
//! Every arm gets a fresh generation number. A timer whose callback is already
//! running when it is disarmed or replaced sees a generation mismatch and drops
//! the expiry, so a cancelled timer never reaches the router.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::errors::{Result, SignalError};
use crate::types::CallId;

/// Work to run when a timer fires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle for one scheduled timer
pub trait TimerHandle: Send + Sync {
    /// Cancel the timer if it has not fired yet. Idempotent.
    fn cancel(&self);
}

/// Single-shot delayed-callback facility
pub trait TimerDriver: Send + Sync {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<Box<dyn TimerHandle>>;
}

/// Timer driver backed by tokio tasks
#[derive(Debug, Clone)]
pub struct TokioTimerDriver {
    handle: Handle,
}

impl TokioTimerDriver {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| SignalError::timer(format!("No tokio runtime available: {}", e)))
    }
}

struct TokioTimer {
    task: JoinHandle<()>,
}

impl TimerHandle for TokioTimer {
    fn cancel(&self) {
        self.task.abort();
    }
}

impl TimerDriver for TokioTimerDriver {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<Box<dyn TimerHandle>> {
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Ok(Box::new(TokioTimer { task }))
    }
}

#[derive(Default)]
struct ManualState {
    elapsed: Duration,
    next_id: u64,
    pending: BTreeMap<u64, (Duration, TimerCallback)>,
}

/// Host-driven timer driver; time only moves on `advance`
#[derive(Clone, Default)]
pub struct ManualTimerDriver {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTimerDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time advanced so far
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Number of timers waiting to fire
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Move time forward and fire every timer that came due, earliest first.
    /// Callbacks run after the driver lock is released. Returns how many fired.
    pub fn advance(&self, by: Duration) -> usize {
        let mut due = {
            let mut state = self.state.lock();
            state.elapsed += by;
            let now = state.elapsed;
            let ids: Vec<u64> = state
                .pending
                .iter()
                .filter(|(_, (deadline, _))| *deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.pending.remove(&id).map(|(deadline, cb)| (deadline, id, cb)))
                .collect::<Vec<_>>()
        };
        due.sort_by_key(|(deadline, id, _)| (*deadline, *id));

        let fired = due.len();
        for (_, _, callback) in due {
            callback();
        }
        fired
    }
}

struct ManualTimer {
    id: u64,
    state: Weak<Mutex<ManualState>>,
}

impl TimerHandle for ManualTimer {
    fn cancel(&self) {
        if let Some(state) = self.state.upgrade() {
            state.lock().pending.remove(&self.id);
        }
    }
}

impl TimerDriver for ManualTimerDriver {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<Box<dyn TimerHandle>> {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.elapsed + delay;
        state.pending.insert(id, (deadline, callback));
        Ok(Box::new(ManualTimer {
            id,
            state: Arc::downgrade(&self.state),
        }))
    }
}

struct ArmedTimer {
    generation: u64,
    handle: Box<dyn TimerHandle>,
}

/// One pending ring timeout per call id
pub struct TimeoutScheduler {
    driver: Arc<dyn TimerDriver>,
    armed: Arc<Mutex<HashMap<CallId, ArmedTimer>>>,
    generation: AtomicU64,
}

impl TimeoutScheduler {
    pub fn new(driver: Arc<dyn TimerDriver>) -> Self {
        Self {
            driver,
            armed: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Schedule `on_expire` for `call_id` after `duration`, replacing any timer
    /// already pending for that call.
    pub fn arm<F>(&self, call_id: &CallId, duration: Duration, on_expire: F) -> Result<()>
    where
        F: FnOnce(CallId) + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let armed_ref = Arc::downgrade(&self.armed);
        let fired_id = call_id.clone();

        let callback: TimerCallback = Box::new(move || {
            let Some(armed) = armed_ref.upgrade() else {
                return;
            };
            let current = {
                let mut armed = armed.lock();
                match armed.get(&fired_id) {
                    Some(timer) if timer.generation == generation => {
                        armed.remove(&fired_id);
                        true
                    }
                    _ => false,
                }
            };
            if current {
                debug!("Ring timeout fired for call {}", fired_id);
                on_expire(fired_id);
            } else {
                trace!("Dropping superseded timer for call {}", fired_id);
            }
        });

        // Hold the map while scheduling so a fast-firing timer finds its entry
        let mut armed = self.armed.lock();
        let handle = self.driver.schedule(duration, callback)?;
        if let Some(previous) = armed.insert(call_id.clone(), ArmedTimer { generation, handle }) {
            trace!("Replacing pending timer for call {}", call_id);
            previous.handle.cancel();
        }
        Ok(())
    }

    /// Cancel the pending timer for `call_id`. Returns whether one was pending.
    pub fn disarm(&self, call_id: &CallId) -> bool {
        match self.armed.lock().remove(call_id) {
            Some(timer) => {
                timer.handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, call_id: &CallId) -> bool {
        self.armed.lock().contains_key(call_id)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.lock().len()
    }

    /// Cancel every pending timer
    pub fn disarm_all(&self) {
        let drained: Vec<ArmedTimer> = self.armed.lock().drain().map(|(_, t)| t).collect();
        for timer in drained {
            timer.handle.cancel();
        }
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.disarm_all();
    }
}
