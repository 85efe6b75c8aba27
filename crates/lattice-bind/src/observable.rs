//! Property-change notification hub.
//!
//! An [`Observable`] maps property names to ordered sets of listeners and
//! delivers a [`Change`] to them synchronously when a property is
//! notified. It is the binding engine's counterpart of a signal: where a
//! signal carries arguments to every slot, a hub routes one property name
//! to the listeners interested in it.
//!
//! # Listener lifetime
//!
//! Hubs hold listeners weakly. Registering never keeps a listener alive;
//! a dropped listener is pruned the next time the hub notifies. Removal
//! is explicit and idempotent:
//!
//! - by id with [`Observable::remove`],
//! - by identity with [`Observable::unregister_listener`],
//! - by dropping the [`Registration`] returned from
//!   [`Observable::register_scoped`].
//!
//! # Delivery
//!
//! Notification takes a snapshot of the matching listeners and releases
//! the hub's lock before calling any of them. Listeners registered during
//! delivery are not called for that notification; listeners removed
//! during delivery still are. A listener that fails or panics is logged
//! and never stops delivery to the rest of the snapshot.
//!
//! # Nested observables
//!
//! When a property holds another observable object, the hub keeps one
//! bubbling subscription on that child. Any change in the child is
//! re-announced as a change of the holding property. See
//! [`Observable::publish_change`] for the usual entry point.
//!
//! # Example
//!
//! ```
//! use lattice_bind::{Change, Observable};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let hub = Observable::new();
//! let hits = Arc::new(AtomicUsize::new(0));
//!
//! let hits_clone = hits.clone();
//! let sub = hub.subscribe("name", move |change: Change<'_>| {
//!     assert_eq!(change.property(), Some("name"));
//!     hits_clone.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! hub.notify_property("name");
//! hub.notify_property("other");
//! drop(sub);
//! hub.notify_property("name");
//!
//! assert_eq!(hits.load(Ordering::SeqCst), 1);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::error::ListenerError;
use crate::value::Value;

new_key_type! {
    /// Identifies one listener registration on a hub.
    ///
    /// Registering the same listener for the same property twice returns
    /// the same id.
    pub struct ListenerId;
}

/// Re-entrant notification deeper than this on one hub is dropped.
///
/// Reaching the limit means a bubbling cycle (an object nested inside
/// itself, directly or through other objects).
pub const MAX_NOTIFY_DEPTH: usize = 64;

/// What changed on an observable object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<'a> {
    /// A single named property.
    Property(&'a str),
    /// Every property, e.g. after a batch update.
    All,
}

impl<'a> Change<'a> {
    /// The changed property, or `None` for [`Change::All`].
    pub fn property(&self) -> Option<&'a str> {
        match self {
            Self::Property(name) => Some(name),
            Self::All => None,
        }
    }

    /// Whether this change covers `name`.
    pub fn affects(&self, name: &str) -> bool {
        match self {
            Self::Property(changed) => *changed == name,
            Self::All => true,
        }
    }
}

/// Receives change notifications from an [`Observable`].
pub trait ObjectListener: Send + Sync {
    /// Called synchronously when a registered property changes.
    ///
    /// Returning an error is logged; it does not affect other listeners.
    fn on_event(&self, change: Change<'_>) -> Result<(), ListenerError>;
}

/// Adapts a closure into a listener.
struct FnListener<F>(F);

impl<F> ObjectListener for FnListener<F>
where
    F: Fn(Change<'_>) + Send + Sync,
{
    fn on_event(&self, change: Change<'_>) -> Result<(), ListenerError> {
        (self.0)(change);
        Ok(())
    }
}

/// Re-announces a child's changes as a change of the holding property.
struct BubbleListener {
    parent: Weak<Hub>,
    property: String,
}

impl ObjectListener for BubbleListener {
    fn on_event(&self, _change: Change<'_>) -> Result<(), ListenerError> {
        if let Some(hub) = self.parent.upgrade() {
            Observable { hub }.notify_property(&self.property);
        }
        Ok(())
    }
}

struct ListenerEntry {
    /// `None` for whole-object listeners.
    property: Option<String>,
    listener: Weak<dyn ObjectListener>,
}

struct NestedLink {
    child: Observable,
    // Keeps the bubbling listener alive; the child only holds it weakly.
    _bubble: Arc<BubbleListener>,
    _registration: Registration,
}

#[derive(Default)]
struct HubState {
    listeners: SlotMap<ListenerId, ListenerEntry>,
    order: Vec<ListenerId>,
    nested: HashMap<String, NestedLink>,
}

#[derive(Default)]
struct Hub {
    state: Mutex<HubState>,
    blocked: AtomicBool,
    depth: AtomicUsize,
}

impl Hub {
    fn remove(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let removed = state.listeners.remove(id).is_some();
        if removed {
            state.order.retain(|existing| *existing != id);
        }
        removed
    }
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Option<Self> {
        if depth.fetch_add(1, Ordering::SeqCst) >= MAX_NOTIFY_DEPTH {
            depth.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self(depth))
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A property-change notification hub.
///
/// Cloning an `Observable` yields another handle to the same hub.
#[derive(Clone, Default)]
pub struct Observable {
    hub: Arc<Hub>,
}

impl Observable {
    /// Create a hub with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether two handles refer to the same hub.
    pub fn ptr_eq(&self, other: &Observable) -> bool {
        Arc::ptr_eq(&self.hub, &other.hub)
    }

    /// Register `listener` for changes to `property`.
    ///
    /// Idempotent: registering the same listener for the same property
    /// again returns the existing id.
    pub fn register_listener<L>(&self, property: &str, listener: &Arc<L>) -> ListenerId
    where
        L: ObjectListener + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn ObjectListener> = weak;
        self.insert(Some(property), weak)
    }

    /// Register a listener for every change on this object.
    pub fn register_object_listener<L>(&self, listener: &Arc<L>) -> ListenerId
    where
        L: ObjectListener + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn ObjectListener> = weak;
        self.insert(None, weak)
    }

    /// Register an already type-erased listener.
    ///
    /// `property` of `None` registers a whole-object listener.
    pub fn register_weak(&self, property: Option<&str>, listener: Weak<dyn ObjectListener>) -> ListenerId {
        self.insert(property, listener)
    }

    /// Register `listener` for `property` and return a handle that
    /// unregisters it when dropped.
    ///
    /// Because registration is idempotent, two handles for the same
    /// listener and property share one registration; dropping either
    /// removes it.
    pub fn register_scoped<L>(&self, property: &str, listener: &Arc<L>) -> Registration
    where
        L: ObjectListener + 'static,
    {
        let id = self.register_listener(property, listener);
        Registration {
            hub: Arc::downgrade(&self.hub),
            id,
        }
    }

    /// Scoped form of [`register_object_listener`](Self::register_object_listener).
    pub fn register_object_scoped<L>(&self, listener: &Arc<L>) -> Registration
    where
        L: ObjectListener + 'static,
    {
        let id = self.register_object_listener(listener);
        Registration {
            hub: Arc::downgrade(&self.hub),
            id,
        }
    }

    /// Subscribe a closure to changes of `property`.
    ///
    /// The returned [`Subscription`] owns the closure; dropping it
    /// unsubscribes.
    pub fn subscribe<F>(&self, property: &str, f: F) -> Subscription
    where
        F: Fn(Change<'_>) + Send + Sync + 'static,
    {
        let listener = Arc::new(FnListener(f));
        let registration = self.register_scoped(property, &listener);
        Subscription {
            registration,
            _listener: listener,
        }
    }

    /// Subscribe a closure to every change on this object.
    pub fn subscribe_all<F>(&self, f: F) -> Subscription
    where
        F: Fn(Change<'_>) + Send + Sync + 'static,
    {
        let listener = Arc::new(FnListener(f));
        let registration = self.register_object_scoped(&listener);
        Subscription {
            registration,
            _listener: listener,
        }
    }

    fn insert(&self, property: Option<&str>, listener: Weak<dyn ObjectListener>) -> ListenerId {
        let mut state = self.hub.state.lock();
        let existing = state.order.iter().copied().find(|id| {
            state.listeners.get(*id).is_some_and(|entry| {
                entry.property.as_deref() == property && Weak::ptr_eq(&entry.listener, &listener)
            })
        });
        if let Some(id) = existing {
            return id;
        }

        let id = state.listeners.insert(ListenerEntry {
            property: property.map(str::to_string),
            listener,
        });
        state.order.push(id);
        tracing::trace!(target: "lattice_bind::observable", ?property, ?id, "listener registered");
        id
    }

    /// Unregister `listener` from `property`.
    ///
    /// Returns `false` when it was not registered.
    pub fn unregister_listener<L>(&self, property: &str, listener: &Arc<L>) -> bool
    where
        L: ObjectListener + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn ObjectListener> = weak;
        self.unregister(Some(property), &weak)
    }

    /// Unregister a whole-object listener.
    pub fn unregister_object_listener<L>(&self, listener: &Arc<L>) -> bool
    where
        L: ObjectListener + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn ObjectListener> = weak;
        self.unregister(None, &weak)
    }

    fn unregister(&self, property: Option<&str>, listener: &Weak<dyn ObjectListener>) -> bool {
        let id = {
            let state = self.hub.state.lock();
            state.listeners.iter().find_map(|(id, entry)| {
                (entry.property.as_deref() == property && Weak::ptr_eq(&entry.listener, listener))
                    .then_some(id)
            })
        };
        id.is_some_and(|id| self.hub.remove(id))
    }

    /// Remove a registration by id. Returns `false` when absent.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.hub.remove(id)
    }

    /// Notify the listeners of `property`, then whole-object listeners.
    #[tracing::instrument(skip(self), target = "lattice_bind::observable", level = "trace")]
    pub fn notify_property(&self, property: &str) {
        self.dispatch(Some(property));
    }

    /// Notify every registered property as if each had changed, then the
    /// whole-object listeners once with [`Change::All`].
    #[tracing::instrument(skip(self), target = "lattice_bind::observable", level = "trace")]
    pub fn notify_all(&self) {
        self.dispatch(None);
    }

    fn dispatch(&self, target: Option<&str>) {
        if self.is_blocked() {
            tracing::trace!(target: "lattice_bind::observable", "hub blocked, skipping notify");
            return;
        }
        let Some(_depth) = DepthGuard::enter(&self.hub.depth) else {
            tracing::error!(
                target: "lattice_bind::observable",
                property = ?target,
                max_depth = MAX_NOTIFY_DEPTH,
                "notification depth exceeded, dropping notification (bubbling cycle?)"
            );
            return;
        };

        let (keyed, whole) = self.snapshot(target);
        tracing::trace!(
            target: "lattice_bind::observable",
            keyed = keyed.len(),
            whole = whole.len(),
            "delivering notification"
        );

        for (property, listener) in &keyed {
            deliver(listener, Change::Property(property));
        }
        let change = match target {
            Some(property) => Change::Property(property),
            None => Change::All,
        };
        for listener in &whole {
            deliver(listener, change);
        }
    }

    /// Collects live listeners in registration order and prunes dead ones.
    #[allow(clippy::type_complexity)]
    fn snapshot(&self, target: Option<&str>) -> (Vec<(String, Arc<dyn ObjectListener>)>, Vec<Arc<dyn ObjectListener>>) {
        let mut state = self.hub.state.lock();
        let mut keyed = Vec::new();
        let mut whole = Vec::new();
        let mut dead = Vec::new();

        for id in &state.order {
            let Some(entry) = state.listeners.get(*id) else {
                continue;
            };
            let Some(listener) = entry.listener.upgrade() else {
                dead.push(*id);
                continue;
            };
            match (&entry.property, target) {
                (None, _) => whole.push(listener),
                (Some(property), None) => keyed.push((property.clone(), listener)),
                (Some(property), Some(target)) if property == target => {
                    keyed.push((property.clone(), listener));
                }
                _ => {}
            }
        }

        if !dead.is_empty() {
            tracing::trace!(target: "lattice_bind::observable", pruned = dead.len(), "pruning dropped listeners");
            for id in &dead {
                state.listeners.remove(*id);
            }
            state.order.retain(|id| !dead.contains(id));
        }

        (keyed, whole)
    }

    /// Announce that `property` went from `old` to `new`.
    ///
    /// Does nothing and returns `false` when the values are equal. When
    /// either value is an observable object, the bubbling subscription is
    /// moved from the old child to the new one before the single
    /// notification.
    pub fn publish_change(&self, property: &str, old: &Value, new: &Value) -> bool {
        if old == new {
            return false;
        }
        let old_child = old.observable();
        let new_child = new.observable();
        if old_child.is_some() || new_child.is_some() || self.has_nested(property) {
            self.rebind_nested(property, old_child.as_ref(), new_child.as_ref());
        } else {
            self.notify_property(property);
        }
        true
    }

    /// Start bubbling `child`'s changes as changes of `property`.
    ///
    /// Returns `false` if `child` is already attached there. Attaching a
    /// different child replaces the previous one. Does not notify.
    pub fn attach_nested(&self, property: &str, child: &Observable) -> bool {
        if self.nested_child(property).is_some_and(|current| current.ptr_eq(child)) {
            return false;
        }
        let link = self.link(property, child);
        let stale = self.hub.state.lock().nested.insert(property.to_string(), link);
        drop(stale);
        tracing::debug!(target: "lattice_bind::observable", property, "nested observable attached");
        true
    }

    /// Stop bubbling from the child held in `property`.
    pub fn detach_nested(&self, property: &str) -> bool {
        let stale = self.hub.state.lock().nested.remove(property);
        let detached = stale.is_some();
        drop(stale);
        if detached {
            tracing::debug!(target: "lattice_bind::observable", property, "nested observable detached");
        }
        detached
    }

    /// Move the bubbling subscription of `property` from `old` to `new`,
    /// then notify `property` once.
    pub fn rebind_nested(&self, property: &str, old: Option<&Observable>, new: Option<&Observable>) {
        let current = self.nested_child(property);
        let matches_old = match (&current, old) {
            (Some(current), Some(old)) => current.ptr_eq(old),
            (None, None) => true,
            _ => false,
        };
        if !matches_old {
            tracing::debug!(
                target: "lattice_bind::observable",
                property,
                "rebinding nested observable that was not the attached child"
            );
        }

        let replacement = new.map(|child| self.link(property, child));
        let stale = {
            let mut state = self.hub.state.lock();
            match replacement {
                Some(link) => state.nested.insert(property.to_string(), link),
                None => state.nested.remove(property),
            }
        };
        drop(stale);

        self.notify_property(property);
    }

    fn link(&self, property: &str, child: &Observable) -> NestedLink {
        let bubble = Arc::new(BubbleListener {
            parent: Arc::downgrade(&self.hub),
            property: property.to_string(),
        });
        let registration = child.register_object_scoped(&bubble);
        NestedLink {
            child: child.clone(),
            _bubble: bubble,
            _registration: registration,
        }
    }

    fn nested_child(&self, property: &str) -> Option<Observable> {
        self.hub.state.lock().nested.get(property).map(|link| link.child.clone())
    }

    fn has_nested(&self, property: &str) -> bool {
        self.hub.state.lock().nested.contains_key(property)
    }

    /// Suppress notification while `blocked` is true.
    pub fn set_blocked(&self, blocked: bool) {
        self.hub.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Whether notification is currently suppressed.
    pub fn is_blocked(&self) -> bool {
        self.hub.blocked.load(Ordering::SeqCst)
    }

    /// Run `f` with notification blocked, then fire [`notify_all`](Self::notify_all).
    ///
    /// Nested batches notify once, when the outermost batch ends.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Restore<'a> {
            hub: &'a Hub,
            was_blocked: bool,
        }
        impl Drop for Restore<'_> {
            fn drop(&mut self) {
                self.hub.blocked.store(self.was_blocked, Ordering::SeqCst);
            }
        }

        let was_blocked = self.hub.blocked.swap(true, Ordering::SeqCst);
        let restore = Restore {
            hub: &self.hub,
            was_blocked,
        };
        let result = f();
        drop(restore);
        if !was_blocked {
            self.notify_all();
        }
        result
    }

    /// Number of live listeners registered for `property`.
    pub fn listener_count(&self, property: &str) -> usize {
        let state = self.hub.state.lock();
        state
            .listeners
            .values()
            .filter(|entry| entry.property.as_deref() == Some(property) && entry.listener.strong_count() > 0)
            .count()
    }

    /// Number of live listeners of any kind.
    pub fn total_listener_count(&self) -> usize {
        let state = self.hub.state.lock();
        state
            .listeners
            .values()
            .filter(|entry| entry.listener.strong_count() > 0)
            .count()
    }

    /// Distinct property names with registrations, in registration order.
    pub fn property_names(&self) -> Vec<String> {
        let state = self.hub.state.lock();
        let mut names: Vec<String> = Vec::new();
        for id in &state.order {
            if let Some(name) = state.listeners.get(*id).and_then(|entry| entry.property.as_ref()) {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Properties currently bubbling from a nested observable, sorted.
    pub fn nested_properties(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hub.state.lock().nested.keys().cloned().collect();
        names.sort();
        names
    }
}

fn deliver(listener: &Arc<dyn ObjectListener>, change: Change<'_>) {
    match catch_unwind(AssertUnwindSafe(|| listener.on_event(change))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(target: "lattice_bind::observable", ?change, error = %err, "listener failed");
        }
        Err(_) => {
            tracing::error!(target: "lattice_bind::observable", ?change, "listener panicked");
        }
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("listeners", &self.total_listener_count())
            .field("nested", &self.nested_properties())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

/// A listener registration that is removed when dropped.
///
/// The handle does not keep the hub alive; once the hub is gone, dropping
/// the handle does nothing.
#[must_use = "dropping a Registration unregisters the listener"]
pub struct Registration {
    hub: Weak<Hub>,
    id: ListenerId,
}

impl Registration {
    /// The id of the registration.
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether the hub still exists and still holds this registration.
    pub fn is_active(&self) -> bool {
        self.hub
            .upgrade()
            .is_some_and(|hub| hub.state.lock().listeners.contains_key(self.id))
    }

    /// The hub this registration belongs to, if it still exists.
    pub fn observable(&self) -> Option<Observable> {
        self.hub.upgrade().map(|hub| Observable { hub })
    }

    /// Unregister now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// A closure subscription created by [`Observable::subscribe`].
///
/// Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the closure"]
pub struct Subscription {
    registration: Registration,
    _listener: Arc<dyn ObjectListener>,
}

impl Subscription {
    /// The id of the underlying registration.
    pub fn id(&self) -> ListenerId {
        self.registration.id()
    }

    /// Whether the subscription is still registered.
    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("registration", &self.registration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().clone()
        }
    }

    impl ObjectListener for Recorder {
        fn on_event(&self, change: Change<'_>) -> Result<(), ListenerError> {
            let label = change.property().unwrap_or("*").to_string();
            self.seen.lock().push(label);
            Ok(())
        }
    }

    #[test]
    fn test_notify_reaches_only_matching_property() {
        let hub = Observable::new();
        let recorder = Recorder::new();
        hub.register_listener("a", &recorder);

        hub.notify_property("a");
        hub.notify_property("b");

        assert_eq!(recorder.seen(), vec!["a"]);
    }

    #[test]
    fn test_double_registration_delivers_once() {
        let hub = Observable::new();
        let recorder = Recorder::new();

        let first = hub.register_listener("a", &recorder);
        let second = hub.register_listener("a", &recorder);
        assert_eq!(first, second);
        assert_eq!(hub.listener_count("a"), 1);

        hub.notify_property("a");
        assert_eq!(recorder.seen(), vec!["a"]);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = Observable::new();
        let recorder = Recorder::new();
        let id = hub.register_listener("a", &recorder);

        assert!(hub.unregister_listener("a", &recorder));
        assert!(!hub.unregister_listener("a", &recorder));
        assert!(!hub.remove(id));

        hub.notify_property("a");
        assert!(recorder.seen().is_empty());
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let hub = Observable::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Vec::new();

        for i in 0..3 {
            let order_clone = order.clone();
            subs.push(hub.subscribe("p", move |_| order_clone.lock().push(i)));
        }

        hub.notify_property("p");
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_whole_object_listener_hears_everything() {
        let hub = Observable::new();
        let recorder = Recorder::new();
        hub.register_object_listener(&recorder);

        hub.notify_property("a");
        hub.notify_property("b");
        hub.notify_all();

        assert_eq!(recorder.seen(), vec!["a", "b", "*"]);
    }

    #[test]
    fn test_notify_all_covers_each_property() {
        let hub = Observable::new();
        let recorder = Recorder::new();
        hub.register_listener("x", &recorder);
        hub.register_listener("y", &recorder);

        hub.notify_all();
        assert_eq!(recorder.seen(), vec!["x", "y"]);
    }

    #[test]
    fn test_unregister_during_notification_keeps_snapshot() {
        let hub = Observable::new();
        let second = Recorder::new();

        let hub_clone = hub.clone();
        let second_clone = second.clone();
        let remover = Arc::new(FnListener(move |_: Change<'_>| {
            hub_clone.unregister_listener("p", &second_clone);
        }));
        hub.register_listener("p", &remover);
        hub.register_listener("p", &second);

        hub.notify_property("p");
        assert_eq!(second.seen(), vec!["p"]);

        hub.notify_property("p");
        assert_eq!(second.seen(), vec!["p"]);
    }

    #[test]
    fn test_listener_added_during_notification_waits() {
        let hub = Observable::new();
        let late = Recorder::new();

        let hub_clone = hub.clone();
        let late_clone = late.clone();
        let _adder = hub.subscribe("p", move |_| {
            hub_clone.register_listener("p", &late_clone);
        });

        hub.notify_property("p");
        assert!(late.seen().is_empty());

        hub.notify_property("p");
        assert_eq!(late.seen(), vec!["p"]);
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let hub = Observable::new();
        let recorder = Recorder::new();
        hub.register_listener("a", &recorder);
        assert_eq!(hub.listener_count("a"), 1);

        drop(recorder);
        assert_eq!(hub.listener_count("a"), 0);

        hub.notify_property("a");
        assert!(hub.property_names().is_empty());
    }

    #[test]
    fn test_failing_listener_does_not_stop_delivery() {
        struct Failing;
        impl ObjectListener for Failing {
            fn on_event(&self, _change: Change<'_>) -> Result<(), ListenerError> {
                Err(ListenerError::new("boom"))
            }
        }

        let hub = Observable::new();
        let failing = Arc::new(Failing);
        let panicking = Arc::new(FnListener(|_: Change<'_>| panic!("listener panic")));
        let recorder = Recorder::new();
        hub.register_listener("p", &failing);
        hub.register_listener("p", &panicking);
        hub.register_listener("p", &recorder);

        hub.notify_property("p");
        assert_eq!(recorder.seen(), vec!["p"]);
    }

    #[test]
    fn test_registration_drop_unregisters() {
        let hub = Observable::new();
        let recorder = Recorder::new();

        let registration = hub.register_scoped("a", &recorder);
        assert!(registration.is_active());
        hub.notify_property("a");

        registration.release();
        hub.notify_property("a");

        assert_eq!(recorder.seen(), vec!["a"]);
        assert_eq!(hub.total_listener_count(), 0);
    }

    #[test]
    fn test_registration_outlives_hub() {
        let recorder = Recorder::new();
        let registration = {
            let hub = Observable::new();
            hub.register_scoped("a", &recorder)
        };
        assert!(!registration.is_active());
        drop(registration);
    }

    #[test]
    fn test_blocked_and_batch() {
        let hub = Observable::new();
        let recorder = Recorder::new();
        hub.register_listener("a", &recorder);

        hub.set_blocked(true);
        hub.notify_property("a");
        hub.set_blocked(false);
        assert!(recorder.seen().is_empty());

        let value = hub.batch(|| {
            hub.notify_property("a");
            hub.notify_property("a");
            7
        });
        assert_eq!(value, 7);
        assert!(!hub.is_blocked());
        assert_eq!(recorder.seen(), vec!["a"]);
    }

    #[test]
    fn test_nested_bubbling_and_rebind() {
        let parent = Observable::new();
        let first = Observable::new();
        let second = Observable::new();
        let recorder = Recorder::new();
        parent.register_listener("child", &recorder);

        assert!(parent.attach_nested("child", &first));
        assert!(!parent.attach_nested("child", &first));

        first.notify_property("x");
        assert_eq!(recorder.seen(), vec!["child"]);

        parent.rebind_nested("child", Some(&first), Some(&second));
        assert_eq!(recorder.seen(), vec!["child", "child"]);

        first.notify_property("x");
        assert_eq!(recorder.seen().len(), 2);
        assert_eq!(first.total_listener_count(), 0);

        second.notify_all();
        assert_eq!(recorder.seen().len(), 3);

        assert!(parent.detach_nested("child"));
        second.notify_property("x");
        assert_eq!(recorder.seen().len(), 3);
        assert!(parent.nested_properties().is_empty());
    }

    #[test]
    fn test_bubbling_cycle_is_bounded() {
        let a = Observable::new();
        let b = Observable::new();
        a.attach_nested("b", &b);
        b.attach_nested("a", &a);

        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        let _sub = a.subscribe("b", move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        a.notify_property("x");
        assert!(hits.load(Ordering::SeqCst) <= MAX_NOTIFY_DEPTH);

        a.detach_nested("b");
        b.detach_nested("a");
    }

    #[test]
    fn test_publish_change_skips_equal_values() {
        let hub = Observable::new();
        let recorder = Recorder::new();
        hub.register_listener("n", &recorder);

        assert!(!hub.publish_change("n", &Value::Int(1), &Value::Int(1)));
        assert!(hub.publish_change("n", &Value::Int(1), &Value::Int(2)));
        assert_eq!(recorder.seen(), vec!["n"]);
    }
}
