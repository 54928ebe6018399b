//! Listener Manager - public API of the input dispatcher
//!
//! Owns the snapshot store, the listener registry and the background dispatch
//! task, and exposes the synchronous read API that control threads use.
//!
//! # Threading Model
//!
//! ```text
//!  InputSource ──► Sampler ──► dispatch thread ──swap──► SnapshotStore ◄── read_* (any thread)
//!                                    │
//!                                    └──lookup──► ListenerRegistry ◄── register (any thread)
//! ```
//!
//! The dispatch loop owns a dedicated thread, `listener-dispatch`, so a slow
//! listener delays the next cycle but never an async runtime or a caller.
//! At most one dispatch loop runs at a time: the manager's running flag is
//! set before the thread starts and cleared only when it has left its loop,
//! and `start` refuses to spawn while it is set.

use super::dispatcher::{panic_message, run_dispatch_loop, CycleStats, Dispatcher, Stopped};
use super::error::ListenerError;
use super::listenable::Listenable;
use super::registry::{Listener, ListenerRegistry};
use super::snapshot::{ChannelReader, Sampler, Snapshot, SnapshotStore};
use crate::source::{InputSource, RawIndexTable};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

const DISPATCH_THREAD_NAME: &str = "listener-dispatch";

/// Settings for the dispatcher
///
/// The poll interval is the dispatcher's only timing granularity: an input
/// that changes and changes back within one interval is never seen.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerSettings {
    /// Time between two dispatch cycles in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
        }
    }
}

struct DispatchWorker {
    shutdown_tx: mpsc::Sender<()>,
    thread: JoinHandle<Dispatcher<Stopped>>,
}

// Clears the running flag when the dispatch thread leaves, panics included
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Polls an input source and calls listeners when their channels change
///
/// Listeners run on the dispatch thread. A listener registered on several
/// channels runs at most once per cycle; distinct listeners registered on the
/// same channel all run.
pub struct ListenerManager {
    settings: ManagerSettings,
    sampler: Sampler,
    store: Arc<SnapshotStore>,
    registry: Arc<ListenerRegistry>,
    stats: Arc<CycleStats>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<DispatchWorker>>,
}

impl ListenerManager {
    /// Creates a stopped manager. Reads return defaults until [`start`](Self::start).
    pub fn new(
        source: Arc<dyn InputSource>,
        settings: Option<ManagerSettings>,
        table: RawIndexTable,
    ) -> Self {
        let settings = settings.unwrap_or_default();
        info!("Creating listener manager with settings: {:?}", settings);

        Self {
            settings,
            sampler: Sampler::new(source, table),
            store: Arc::new(SnapshotStore::new()),
            registry: Arc::new(ListenerRegistry::new()),
            stats: Arc::new(CycleStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Creates a manager and starts its dispatch loop right away
    pub fn spawn(
        source: Arc<dyn InputSource>,
        settings: Option<ManagerSettings>,
        table: RawIndexTable,
    ) -> Result<Self, ListenerError> {
        let manager = Self::new(source, settings, table);
        manager.start()?;
        Ok(manager)
    }

    /// Starts the dispatch loop if it is not running.
    ///
    /// Takes one full sample and installs it before returning, so reads made
    /// after `start` never hit the not-ready path and the first cycle compares
    /// against current input. Returns `Ok(false)` if a loop is running or a
    /// stop is still waiting for it to exit.
    ///
    /// # Errors
    ///
    /// [`ListenerError::ThreadSpawn`] when the dispatch thread cannot be created.
    pub fn start(&self) -> Result<bool, ListenerError> {
        let mut worker = self.worker.lock();

        if self.running.load(Ordering::Acquire) {
            debug!("Dispatch loop still running, start ignored");
            return Ok(false);
        }

        if let Some(stale) = worker.take() {
            warn!("Dispatch loop ended without a stop request, restarting it");
            if let Err(payload) = stale.thread.join() {
                error!(
                    "Previous dispatch loop panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }

        let dispatcher = Dispatcher::create(
            self.sampler.clone(),
            self.store.clone(),
            self.registry.clone(),
            self.stats.clone(),
        );
        dispatcher.seed();

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let interval_ms = self.settings.poll_interval_ms;
        self.running.store(true, Ordering::Release);
        let guard = RunningGuard(self.running.clone());

        let thread = std::thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = guard;
                run_dispatch_loop(dispatcher, interval_ms, shutdown_rx)
            })
            .map_err(|e| {
                error!("Failed to spawn dispatch thread: {}", e);
                self.running.store(false, Ordering::Release);
                ListenerError::ThreadSpawn(e)
            })?;

        *worker = Some(DispatchWorker {
            shutdown_tx,
            thread,
        });
        info!("Dispatch loop started");
        Ok(true)
    }

    /// Stops the dispatch loop and blocks until it has exited.
    ///
    /// `is_running` stays `true` until the loop is gone, so a concurrent
    /// `start` is a no-op rather than a second loop. The last installed
    /// snapshot stays readable. Stopping a stopped manager does nothing.
    ///
    /// Called from a listener, the stop is only requested: the loop exits
    /// once the current cycle is done.
    ///
    /// # Errors
    ///
    /// [`ListenerError::LoopPanicked`] when the dispatch thread panicked.
    pub fn stop(&self) -> Result<(), ListenerError> {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            debug!("Stop requested but the dispatch loop is not running");
            return Ok(());
        };

        if worker.shutdown_tx.send(()).is_err() {
            debug!("Dispatch loop had already exited");
        }

        if worker.thread.thread().id() == std::thread::current().id() {
            debug!("Stop requested from a listener, loop exits after this cycle");
            return Ok(());
        }

        match worker.thread.join() {
            Ok(_stopped) => {
                info!("Dispatch loop stopped");
                Ok(())
            }
            Err(payload) => Err(ListenerError::LoopPanicked(
                panic_message(payload.as_ref()).to_string(),
            )),
        }
    }

    /// `true` from `start` until the dispatch loop has actually exited
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Boolean value of a press or release identity
    ///
    /// # Errors
    ///
    /// [`ListenerError::InvalidArgument`] for axis identities.
    pub fn read_boolean(&self, channel: Listenable) -> Result<bool, ListenerError> {
        self.reader().read_boolean(channel)
    }

    /// Value of an axis identity
    ///
    /// # Errors
    ///
    /// [`ListenerError::InvalidArgument`] for button identities.
    pub fn read_axis(&self, channel: Listenable) -> Result<f64, ListenerError> {
        self.reader().read_axis(channel)
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.store.current()
    }

    /// Read-only view for listeners that need control data
    pub fn reader(&self) -> ChannelReader {
        ChannelReader::new(self.store.clone())
    }

    pub fn register(&self, channel: Listenable, listener: Listener) {
        debug!("Registering listener {} for {}", listener, channel);
        self.registry.register(channel, listener);
    }

    /// Removes the listeners of exactly `channel`; `AUP` and `ADOWN` are separate.
    pub fn unregister_all_for(&self, channel: Listenable) {
        debug!("Removing all listeners for {}", channel);
        self.registry.unregister_all_for(channel);
    }

    pub fn unregister_all(&self) {
        debug!("Removing all listeners");
        self.registry.unregister_all();
    }

    pub fn listener_count(&self, channel: Listenable) -> usize {
        self.registry.listener_count(channel)
    }

    pub fn cycle_count(&self) -> u64 {
        self.stats.cycles()
    }

    pub fn stats(&self) -> Arc<CycleStats> {
        self.stats.clone()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }
}

impl Drop for ListenerManager {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Dispatch loop failed before the manager was dropped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::listenable::{Axis, Button};
    use crate::source::VirtualSource;
    use std::time::{Duration, Instant};

    fn manager(source: &VirtualSource) -> ListenerManager {
        ListenerManager::new(
            Arc::new(source.clone()),
            Some(ManagerSettings {
                poll_interval_ms: 10,
            }),
            RawIndexTable::default(),
        )
    }

    #[test]
    fn reads_before_start_return_defaults() {
        let source = VirtualSource::new();
        source.set_button(1, true);
        source.set_axis(0, 0.5);
        let manager = manager(&source);

        assert!(!manager.read_boolean(Listenable::Down(Button::A)).unwrap());
        assert_eq!(manager.read_axis(Listenable::Axis(Axis::Joy1X)).unwrap(), 0.0);
        assert!(manager.snapshot().is_none());
        assert!(!manager.is_running());
    }

    #[test]
    fn start_and_stop_need_no_runtime() {
        let manager = manager(&VirtualSource::new());

        assert!(manager.start().unwrap());
        assert!(manager.is_running());
        manager.stop().unwrap();
        assert!(!manager.is_running());
    }

    #[test]
    fn wrong_range_reads_are_rejected() {
        let manager = manager(&VirtualSource::new());
        assert!(matches!(
            manager.read_boolean(Listenable::Axis(Axis::Joy2Y)),
            Err(ListenerError::InvalidArgument { .. })
        ));
        assert!(matches!(
            manager.read_axis(Listenable::Up(Button::B)),
            Err(ListenerError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn start_seeds_store_synchronously() {
        let source = VirtualSource::new();
        source.set_button(1, true);
        source.set_axis(0, -0.25);
        let manager = manager(&source);

        assert!(manager.start().unwrap());

        assert!(manager.read_boolean(Listenable::Down(Button::A)).unwrap());
        assert!(!manager.read_boolean(Listenable::Up(Button::A)).unwrap());
        assert_eq!(manager.read_axis(Listenable::Axis(Axis::Joy1X)).unwrap(), -0.25);

        manager.stop().unwrap();
    }

    #[test]
    fn second_start_is_a_no_op() {
        let manager = manager(&VirtualSource::new());

        assert!(manager.start().unwrap());
        assert!(!manager.start().unwrap());
        assert!(manager.is_running());

        manager.stop().unwrap();
        assert!(!manager.is_running());
        manager.stop().unwrap();
    }

    #[test]
    fn listener_can_stop_its_own_manager() {
        let source = VirtualSource::new();
        let manager = Arc::new(manager(&source));
        let handle = Arc::downgrade(&manager);
        manager.register(
            Listenable::Down(Button::Back),
            Listener::new("stopper", move || {
                if let Some(manager) = handle.upgrade() {
                    manager.stop()?;
                }
                Ok(())
            }),
        );
        manager.start().unwrap();

        source.set_button(7, true);
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        assert!(!manager.is_running());
        assert!(manager.start().unwrap());
        manager.stop().unwrap();
    }

    #[test]
    fn dropping_the_manager_ends_the_loop() {
        let source = VirtualSource::new();
        let manager = manager(&source);
        manager.start().unwrap();
        std::thread::sleep(Duration::from_millis(25));

        drop(manager);
        let samples = source.sample_count();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(source.sample_count(), samples);
    }
}
