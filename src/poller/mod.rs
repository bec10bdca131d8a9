//! Adaptive Poller
//!
//! Runs an async effect on a repeating, self-adjusting cadence between a
//! start and a stop signal:
//! - at most one effect invocation in flight per poller
//! - the interval is evaluated after every tick, so it can change at runtime
//! - effect failures never stop the poller
//! - once stopped, no further invocation happens

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Notify};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SyncError;

type EffectFn<P, S> =
    Arc<dyn Fn(Tick<P, S>) -> BoxFuture<'static, Result<(), SyncError>> + Send + Sync>;

/// Delay between the end of one effect and the start of the next tick
#[derive(Clone)]
pub enum PollInterval {
    Fixed(Duration),
    /// Evaluated fresh after every tick
    Dynamic(Arc<dyn Fn() -> Duration + Send + Sync>),
}

impl PollInterval {
    pub fn dynamic(f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        PollInterval::Dynamic(Arc::new(f))
    }

    pub fn current(&self) -> Duration {
        match self {
            PollInterval::Fixed(duration) => *duration,
            PollInterval::Dynamic(f) => f(),
        }
    }
}

impl From<Duration> for PollInterval {
    fn from(duration: Duration) -> Self {
        PollInterval::Fixed(duration)
    }
}

impl fmt::Debug for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollInterval::Fixed(duration) => f.debug_tuple("Fixed").field(duration).finish(),
            PollInterval::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// Arguments of one effect invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Tick<P, S> {
    /// Zero-based, reset on every start
    pub counter: u64,
    /// Captured at start for the whole run
    pub payload: P,
    /// Sampled when the tick fires
    pub source: Option<S>,
}

struct RunState<P> {
    running: bool,
    counter: u64,
    payload: Option<P>,
    driver_alive: bool,
}

struct PollerInner<P, S> {
    name: Arc<str>,
    effect: EffectFn<P, S>,
    interval: PollInterval,
    source: Option<watch::Receiver<S>>,
    state: Mutex<RunState<P>>,
    running_tx: watch::Sender<bool>,
    wake: Arc<Notify>,
}

impl<P: Clone, S: Clone> PollerInner<P, S> {
    fn next_tick(&self) -> Option<Tick<P, S>> {
        let mut state = self.state.lock();
        let payload = match (state.running, state.payload.clone()) {
            (true, Some(payload)) => payload,
            _ => {
                state.driver_alive = false;
                return None;
            }
        };

        let counter = state.counter;
        state.counter += 1;
        Some(Tick {
            counter,
            payload,
            source: self.source.as_ref().map(|rx| rx.borrow().clone()),
        })
    }
}

impl<P, S> Drop for PollerInner<P, S> {
    fn drop(&mut self) {
        self.wake.notify_waiters();
    }
}

/// Single driver loop of a poller. Holds only a weak reference between
/// ticks so dropping every handle ends it.
async fn drive<P, S>(inner: Weak<PollerInner<P, S>>, name: Arc<str>, wake: Arc<Notify>)
where
    P: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    loop {
        let Some((counter, effect)) = inner.upgrade().and_then(|inner| {
            inner
                .next_tick()
                .map(|tick| (tick.counter, (inner.effect)(tick)))
        }) else {
            break;
        };

        debug!(poller = %name, counter, "Tick");
        if let Err(e) = effect.await {
            warn!(poller = %name, counter, "Poll effect failed: {}", e);
        }

        let Some(delay) = inner.upgrade().map(|inner| inner.interval.current()) else {
            break;
        };
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wake.notified() => {}
        }
    }

    debug!(poller = %name, "Driver exited");
}

/// Handle to a poller. Clones share the same run.
pub struct Poller<P, S = ()> {
    inner: Arc<PollerInner<P, S>>,
}

impl<P, S> Clone for Poller<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P> Poller<P, ()>
where
    P: Clone + Send + Sync + 'static,
{
    /// Poller without a source.
    pub fn new<F, Fut>(name: impl Into<String>, interval: impl Into<PollInterval>, effect: F) -> Self
    where
        F: Fn(Tick<P, ()>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        Self::build(name.into(), interval.into(), None, effect)
    }
}

impl<P, S> Poller<P, S>
where
    P: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    /// Poller whose ticks sample `source` at the moment they fire.
    pub fn with_source<F, Fut>(
        name: impl Into<String>,
        interval: impl Into<PollInterval>,
        source: watch::Receiver<S>,
        effect: F,
    ) -> Self
    where
        F: Fn(Tick<P, S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        Self::build(name.into(), interval.into(), Some(source), effect)
    }

    fn build<F, Fut>(
        name: String,
        interval: PollInterval,
        source: Option<watch::Receiver<S>>,
        effect: F,
    ) -> Self
    where
        F: Fn(Tick<P, S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        let (running_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(PollerInner {
                name: name.into(),
                effect: Arc::new(move |tick| Box::pin(effect(tick))),
                interval,
                source,
                state: Mutex::new(RunState {
                    running: false,
                    counter: 0,
                    payload: None,
                    driver_alive: false,
                }),
                running_tx,
                wake: Arc::new(Notify::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Arm the poller: reset the counter and capture `payload` for the run.
    ///
    /// The first tick fires immediately unless an effect of a previous run is
    /// still pending, in which case the run continues after it settles.
    /// Must be called within a Tokio runtime.
    pub fn start(&self, payload: P) {
        let spawn_driver = {
            let mut state = self.inner.state.lock();
            state.running = true;
            state.counter = 0;
            state.payload = Some(payload);
            !std::mem::replace(&mut state.driver_alive, true)
        };
        self.inner.running_tx.send_replace(true);
        info!(poller = %self.inner.name, "Poller started");

        if spawn_driver {
            tokio::spawn(drive(
                Arc::downgrade(&self.inner),
                self.inner.name.clone(),
                self.inner.wake.clone(),
            ));
        }
    }

    /// Disarm the poller. An in-flight effect is not interrupted, but no
    /// further tick follows it.
    pub fn stop(&self) {
        let was_running = {
            let mut state = self.inner.state.lock();
            state.counter = 0;
            state.payload = None;
            std::mem::replace(&mut state.running, false)
        };
        self.inner.running_tx.send_replace(false);
        self.inner.wake.notify_waiters();

        if was_running {
            info!(poller = %self.inner.name, "Poller stopped");
        }
    }

    /// Fire the next tick without waiting for the rest of the interval.
    /// Never overlaps a pending effect: the tick follows it.
    pub fn tick(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.inner.wake.notify_one();
        true
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.running_tx.subscribe()
    }
}
