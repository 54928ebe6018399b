//! Listener handles and the registry mapping channels to them

use super::listenable::Listenable;
use color_eyre::Result;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a listener, assigned when it is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Callback = dyn Fn() -> Result<()> + Send + Sync;

/// A callback the dispatcher can invoke
///
/// Clones share the same [`ListenerId`] and count as the same listener: one
/// listener registered on several channels runs at most once per cycle.
/// Two calls to [`Listener::new`] always give two distinct listeners, even
/// for identical closures.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    name: Arc<str>,
    callback: Arc<Callback>,
}

impl Listener {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
            name: Arc::from(name.into()),
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self) -> Result<()> {
        (self.callback)()
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Multi-map from channel identity to listeners
///
/// Registration and removal take the write lock for the duration of a single
/// map update. The dispatcher only ever sees a copy of a channel's listener
/// list, so mutation never races an in-progress lookup.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<Listenable, Vec<Listener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener for `channel`; the same listener may be added repeatedly
    pub fn register(&self, channel: Listenable, listener: Listener) {
        self.listeners
            .write()
            .entry(channel)
            .or_default()
            .push(listener);
    }

    pub fn unregister_all(&self) {
        self.listeners.write().clear();
    }

    /// Removes every listener registered under exactly `channel`.
    ///
    /// The paired press/release identity is a different key and is untouched.
    pub fn unregister_all_for(&self, channel: Listenable) {
        self.listeners.write().remove(&channel);
    }

    /// Copy of the listeners registered for `channel`
    pub fn lookup(&self, channel: Listenable) -> Vec<Listener> {
        self.listeners
            .read()
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    pub fn listener_count(&self, channel: Listenable) -> usize {
        self.listeners.read().get(&channel).map_or(0, Vec::len)
    }
}

/// Per-cycle set of listeners to run, deduplicated by [`ListenerId`]
///
/// Keeps the order in which listeners were first collected.
#[derive(Debug, Default)]
pub struct ListenerSet {
    seen: HashSet<ListenerId>,
    ordered: Vec<Listener>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, listeners: impl IntoIterator<Item = Listener>) {
        for listener in listeners {
            if self.seen.insert(listener.id()) {
                self.ordered.push(listener);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn into_vec(self) -> Vec<Listener> {
        self.ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::listenable::{Axis, Button};

    fn noop(name: &str) -> Listener {
        Listener::new(name, || Ok(()))
    }

    #[test]
    fn clones_share_identity_and_new_listeners_do_not() {
        let first = noop("a");
        let second = noop("a");
        assert_eq!(first.id(), first.clone().id());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn same_channel_keeps_every_registration() {
        let registry = ListenerRegistry::new();
        let channel = Listenable::Down(Button::A);
        registry.register(channel, noop("one"));
        registry.register(channel, noop("two"));

        assert_eq!(registry.lookup(channel).len(), 2);
        assert_eq!(registry.listener_count(channel), 2);
    }

    #[test]
    fn unregister_for_release_leaves_press_listeners() {
        let registry = ListenerRegistry::new();
        registry.register(Listenable::Down(Button::A), noop("press"));
        registry.register(Listenable::Up(Button::A), noop("release"));

        registry.unregister_all_for(Listenable::Up(Button::A));

        assert_eq!(registry.listener_count(Listenable::Up(Button::A)), 0);
        assert_eq!(registry.listener_count(Listenable::Down(Button::A)), 1);

        registry.register(Listenable::Up(Button::A), noop("release"));
        registry.unregister_all_for(Listenable::Down(Button::A));
        assert_eq!(registry.listener_count(Listenable::Up(Button::A)), 1);
    }

    #[test]
    fn unregister_all_clears_every_channel() {
        let registry = ListenerRegistry::new();
        registry.register(Listenable::Down(Button::B), noop("b"));
        registry.register(Listenable::Axis(Axis::Joy1X), noop("x"));

        registry.unregister_all();

        assert!(registry.lookup(Listenable::Down(Button::B)).is_empty());
        assert!(registry.lookup(Listenable::Axis(Axis::Joy1X)).is_empty());
    }

    #[test]
    fn lookup_is_unaffected_by_later_mutation() {
        let registry = ListenerRegistry::new();
        let channel = Listenable::Axis(Axis::Triggers);
        registry.register(channel, noop("t"));

        let found = registry.lookup(channel);
        registry.unregister_all();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "t");
    }

    #[test]
    fn listener_set_deduplicates_by_id_in_first_seen_order() {
        let shared = noop("shared");
        let other = noop("other");

        let mut set = ListenerSet::new();
        set.extend([shared.clone(), other.clone()]);
        set.extend([shared.clone()]);

        let ids: Vec<_> = set.into_vec().iter().map(Listener::id).collect();
        assert_eq!(ids, vec![shared.id(), other.id()]);
    }

    #[test]
    fn concurrent_registration_during_lookups() {
        let registry = Arc::new(ListenerRegistry::new());
        let channel = Listenable::Down(Button::Start);

        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    registry.register(channel, noop("w"));
                    if i % 50 == 0 {
                        registry.unregister_all_for(channel);
                    }
                }
            })
        };

        for _ in 0..500 {
            let found = registry.lookup(channel);
            assert!(found.iter().all(|l| l.name() == "w"));
        }

        writer.join().unwrap();
        assert!(registry.listener_count(channel) <= 50);
    }
}
