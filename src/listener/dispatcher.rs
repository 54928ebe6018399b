//! Dispatcher - change detection and listener invocation
//!
//! One dispatch cycle samples the input source, compares the result with the
//! installed snapshot, collects the listeners whose channels changed, swaps the
//! new snapshot in and finally runs the collected listeners outside the lock.
//!
//! # State Machine
//!
//! ```text
//!            sample_and_compare()
//!   Idle ────────────────────────► Cycling(PendingCycle)
//!    ▲  │                                 │
//!    │  │ shut_down()                     │ swap_and_invoke()
//!    │  ▼                                 │
//!    │ Stopped                            │
//!    └────────────────────────────────────┘
//! ```
//!
//! # Change detection
//!
//! - press identity: previous `false`, new `true`
//! - release identity: previous `true`, new `false`
//! - axis: previous value != new value
//!
//! Both edges of one button are arms of the same match, so at most one of
//! them fires per cycle. Listeners are deduplicated by [`ListenerId`].
//!
//! [`ListenerId`]: super::registry::ListenerId

use super::listenable::{Axis, Button, Listenable};
use super::registry::{Listener, ListenerRegistry, ListenerSet};
use super::snapshot::{axis_changed, Sampler, Snapshot, SnapshotStore};
use chrono::Local;
use statum::{machine, state};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Work carried from the compare step to the invoke step
#[derive(Debug, Clone)]
pub struct PendingCycle {
    pub snapshot: Arc<Snapshot>,
    pub listeners: Vec<Listener>,
}

#[state]
#[derive(Debug, Clone)]
pub enum DispatchState {
    Idle,
    Cycling(PendingCycle),
    Stopped,
}

/// Counters shared between the dispatch thread and the manager
#[derive(Debug, Default)]
pub struct CycleStats {
    cycles: AtomicU64,
    invoked: AtomicU64,
    failures: AtomicU64,
}

impl CycleStats {
    /// Completed dispatch cycles since the manager was created
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Listener invocations, successful or not
    pub fn invoked(&self) -> u64 {
        self.invoked.load(Ordering::Acquire)
    }

    /// Listener invocations that returned an error or panicked
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }
}

/// Outcome of one dispatch cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub invoked: usize,
    pub failed: usize,
}

#[machine]
pub struct Dispatcher<S: DispatchState> {
    sampler: Sampler,
    store: Arc<SnapshotStore>,
    registry: Arc<ListenerRegistry>,
    stats: Arc<CycleStats>,
}

impl<S: DispatchState> Dispatcher<S> {
    pub fn stats(&self) -> &Arc<CycleStats> {
        &self.stats
    }
}

impl Dispatcher<Idle> {
    pub fn create(
        sampler: Sampler,
        store: Arc<SnapshotStore>,
        registry: Arc<ListenerRegistry>,
        stats: Arc<CycleStats>,
    ) -> Self {
        debug!("Creating dispatcher");
        Self::new(sampler, store, registry, stats)
    }

    /// Takes a fresh sample and installs it without firing anything.
    ///
    /// Used when the loop (re)starts so the first cycle compares against
    /// current input instead of whatever was installed before.
    pub fn seed(&self) {
        let snapshot = Arc::new(self.sampler.sample());
        debug!(
            "Seeding store with snapshot taken at {}",
            snapshot.taken_at().format("%H:%M:%S.%3f")
        );
        self.store.swap(snapshot);
    }

    /// Samples, compares against the installed snapshot and collects listeners
    pub fn sample_and_compare(self) -> Dispatcher<Cycling> {
        let snapshot = Arc::new(self.sampler.sample());

        let listeners = match self.store.current() {
            Some(previous) => collect_listeners(&self.registry, &previous, &snapshot),
            None => {
                debug!("No snapshot installed yet, nothing to compare against");
                ListenerSet::new()
            }
        };

        if !listeners.is_empty() {
            debug!("Collected {} listeners for this cycle", listeners.len());
        }

        self.transition_with(PendingCycle {
            snapshot,
            listeners: listeners.into_vec(),
        })
    }

    pub fn shut_down(self) -> Dispatcher<Stopped> {
        info!(
            "Dispatcher stopping after {} cycles ({} listener failures)",
            self.stats.cycles(),
            self.stats.failures()
        );
        self.transition()
    }
}

impl Dispatcher<Cycling> {
    /// Installs the new snapshot, then runs every collected listener once
    pub fn swap_and_invoke(self) -> (Dispatcher<Idle>, CycleReport) {
        let pending = match self.get_state_data() {
            Some(pending) => pending.clone(),
            None => {
                warn!("No pending cycle found in state data, this should not happen");
                return (self.transition(), CycleReport::default());
            }
        };

        self.store.swap(pending.snapshot);

        let mut report = CycleReport::default();
        for listener in &pending.listeners {
            report.invoked += 1;
            if !invoke_listener(listener) {
                report.failed += 1;
            }
        }

        self.stats.cycles.fetch_add(1, Ordering::AcqRel);
        self.stats
            .invoked
            .fetch_add(report.invoked as u64, Ordering::AcqRel);
        self.stats
            .failures
            .fetch_add(report.failed as u64, Ordering::AcqRel);

        (self.transition(), report)
    }
}

fn collect_listeners(
    registry: &ListenerRegistry,
    previous: &Snapshot,
    next: &Snapshot,
) -> ListenerSet {
    let mut listeners = ListenerSet::new();

    for button in Button::ALL {
        match (previous.button(button), next.button(button)) {
            (false, true) => listeners.extend(registry.lookup(Listenable::Down(button))),
            (true, false) => listeners.extend(registry.lookup(Listenable::Up(button))),
            _ => {}
        }
    }

    for axis in Axis::ALL {
        if axis_changed(previous.axis(axis), next.axis(axis)) {
            listeners.extend(registry.lookup(Listenable::Axis(axis)));
        }
    }

    listeners
}

// Returns false if the listener failed
fn invoke_listener(listener: &Listener) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| listener.invoke())) {
        Ok(Ok(())) => true,
        Ok(Err(report)) => {
            error!("Caught an error from control listener {}: {:?}", listener, report);
            false
        }
        Err(payload) => {
            error!(
                "Control listener {} panicked: {}",
                listener,
                panic_message(payload.as_ref())
            );
            false
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Runs dispatch cycles every `interval_ms` until `shutdown_rx` receives a
/// message or its sender is dropped.
///
/// Blocks the calling thread. Listeners run on that thread too, so the
/// manager gives the loop a thread of its own.
pub fn run_dispatch_loop(
    mut dispatcher: Dispatcher<Idle>,
    interval_ms: u64,
    shutdown_rx: mpsc::Receiver<()>,
) -> Dispatcher<Stopped> {
    info!("Starting dispatch loop with {}ms interval", interval_ms);

    let interval = Duration::from_millis(interval_ms.max(1));
    let mut next_tick = Instant::now() + interval;

    let mut cycles = 0u64;
    let mut invoked = 0usize;
    let mut last_stats_time = Local::now();
    let stats_interval = chrono::Duration::seconds(30);

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        match shutdown_rx.recv_timeout(wait) {
            Ok(()) => {
                info!("Stop requested, leaving dispatch loop");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => {
                info!("Listener manager dropped, leaving dispatch loop");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let (idle, report) = dispatcher.sample_and_compare().swap_and_invoke();
        dispatcher = idle;

        // A late cycle pushes the schedule back instead of bursting to catch up
        next_tick += interval;
        let now = Instant::now();
        if next_tick <= now {
            next_tick = now + interval;
        }

        cycles += 1;
        invoked += report.invoked;
        if report.failed > 0 {
            warn!(
                "{} of {} listeners failed this cycle",
                report.failed, report.invoked
            );
        }

        let now = Local::now();
        if now - last_stats_time > stats_interval {
            let elapsed_seconds = (now - last_stats_time).num_seconds().max(1);
            info!(
                "Dispatcher stats: {} cycles, {} listener calls in {} seconds ({:.2} cycles/sec)",
                cycles,
                invoked,
                elapsed_seconds,
                cycles as f64 / elapsed_seconds as f64
            );
            cycles = 0;
            invoked = 0;
            last_stats_time = now;
        }
    }

    dispatcher.shut_down()
}
