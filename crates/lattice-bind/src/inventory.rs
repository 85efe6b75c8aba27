//! Per-scope registry of active bindings.
//!
//! A [`BindingInventory`] belongs to one UI scope (a screen, a dialog, a
//! list row). UI collaborators declare their bindings on it; when a model
//! root is attached the inventory resolves every path, registers on each
//! observable node along the way, and pushes the current values out. When
//! any node in a chain changes, the affected binding is re-resolved and
//! re-registered before its value is pushed again.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lattice_bind::{BindingInventory, DynamicObject, PropertyAccessor};
//! use parking_lot::Mutex;
//!
//! let model = Arc::new(DynamicObject::new().with("count", 5));
//! let inventory = BindingInventory::new(Default::default());
//!
//! let (_id, count) = inventory.bind_path("count").unwrap();
//! let shown = Arc::new(Mutex::new(String::new()));
//! let shown_clone = shown.clone();
//! count.set_ui_update_listener(move |update| *shown_clone.lock() = update.text.clone());
//!
//! inventory.attach(model.clone());
//! assert_eq!(*shown.lock(), "5");
//!
//! model.set("count", 6.into()).unwrap();
//! assert_eq!(*shown.lock(), "6");
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::error::{ListenerError, PathError};
use crate::format::FormatResources;
use crate::object::{same_object, ObjectRef};
use crate::observable::{Change, ObjectListener, Registration};
use crate::path::PropertyPath;
use crate::two_way::{ConversionPolicy, PropertyState, TwoWayProperty};

new_key_type! {
    /// Identifies one binding within an inventory.
    pub struct BindingId;
}

/// Configuration for a [`BindingInventory`].
#[derive(Clone)]
pub struct InventoryConfig {
    /// Scope name used in log output.
    pub name: String,
    /// Conversion policy for bindings created with
    /// [`BindingInventory::bind_path`].
    pub conversion: ConversionPolicy,
    /// Resource lookup for bindings created with
    /// [`BindingInventory::bind_path`].
    pub format_resources: Option<Arc<dyn FormatResources>>,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            name: "bindings".to_string(),
            conversion: ConversionPolicy::default(),
            format_resources: None,
        }
    }
}

impl InventoryConfig {
    /// Create a configuration with the given scope name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl fmt::Debug for InventoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InventoryConfig")
            .field("name", &self.name)
            .field("conversion", &self.conversion)
            .field("format_resources", &self.format_resources.is_some())
            .finish()
    }
}

/// Builder for creating inventories with custom configuration.
#[derive(Debug, Default)]
pub struct InventoryBuilder {
    config: InventoryConfig,
}

impl InventoryBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scope name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the default conversion policy.
    pub fn conversion(mut self, conversion: ConversionPolicy) -> Self {
        self.config.conversion = conversion;
        self
    }

    /// Set the format resource lookup.
    pub fn format_resources(mut self, resources: Arc<dyn FormatResources>) -> Self {
        self.config.format_resources = Some(resources);
        self
    }

    /// Build the inventory.
    pub fn build(self) -> BindingInventory {
        BindingInventory::new(self.config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Value,
    Format,
}

/// Registered on every node of a binding's chain.
struct ChainListener {
    inventory: Weak<Shared>,
    binding: BindingId,
    role: Role,
}

impl ObjectListener for ChainListener {
    fn on_event(&self, change: Change<'_>) -> Result<(), ListenerError> {
        if let Some(shared) = self.inventory.upgrade() {
            tracing::trace!(
                target: "lattice_bind::inventory",
                binding = ?self.binding,
                role = ?self.role,
                ?change,
                "chain node changed"
            );
            shared.refresh(self.binding, self.role);
        }
        Ok(())
    }
}

struct Entry {
    property: Arc<TwoWayProperty>,
    value_listener: Arc<ChainListener>,
    format_listener: Option<Arc<ChainListener>>,
    registrations: Vec<Registration>,
}

struct Target {
    id: BindingId,
    property: Arc<TwoWayProperty>,
    value_listener: Arc<ChainListener>,
    format_listener: Option<Arc<ChainListener>>,
}

impl Target {
    fn of(id: BindingId, entry: &Entry) -> Self {
        Self {
            id,
            property: entry.property.clone(),
            value_listener: entry.value_listener.clone(),
            format_listener: entry.format_listener.clone(),
        }
    }

    /// Register on every observable node of the value and format chains.
    fn wire(&self, root: &ObjectRef) -> Vec<Registration> {
        let mut registrations = Vec::new();
        register_chain(root, self.property.path(), &self.value_listener, &mut registrations);
        if let (Some(listener), Some(path)) = (&self.format_listener, self.property.format_path()) {
            register_chain(root, &path, listener, &mut registrations);
        }
        registrations
    }
}

fn register_chain(
    root: &ObjectRef,
    path: &PropertyPath,
    listener: &Arc<ChainListener>,
    registrations: &mut Vec<Registration>,
) {
    for link in path.chain(root) {
        match link.node.observable() {
            Some(observable) => registrations.push(observable.register_scoped(&link.segment, listener)),
            None => tracing::trace!(
                target: "lattice_bind::inventory",
                path = %path,
                segment = %link.segment,
                "chain node is not observable"
            ),
        }
    }
}

#[derive(Default)]
struct State {
    root: Option<ObjectRef>,
    entries: SlotMap<BindingId, Entry>,
    order: Vec<BindingId>,
}

impl State {
    fn is_root(&self, root: &ObjectRef) -> bool {
        self.root.as_ref().is_some_and(|current| same_object(current, root))
    }
}

struct Shared {
    config: InventoryConfig,
    state: Mutex<State>,
}

impl Shared {
    /// Re-resolve one binding after a chain notification.
    fn refresh(&self, id: BindingId, role: Role) {
        let (root, target, stale) = {
            let mut state = self.state.lock();
            let Some(root) = state.root.clone() else {
                return;
            };
            let Some(entry) = state.entries.get_mut(id) else {
                return;
            };
            let stale = std::mem::take(&mut entry.registrations);
            (root, Target::of(id, entry), stale)
        };
        // Registration is idempotent, so the old handles must go before
        // the new ones are taken or they would share ids.
        drop(stale);

        let registrations = target.wire(&root);
        let count = registrations.len();
        let leftover = self.store(&root, id, registrations);
        drop(leftover);
        tracing::debug!(
            target: "lattice_bind::inventory",
            scope = %self.config.name,
            path = %target.property.path(),
            registrations = count,
            "binding rewired"
        );

        match role {
            Role::Value => {
                target.property.push_from_model();
            }
            Role::Format => {
                target.property.refresh_format();
            }
        }
    }

    /// Store fresh registrations unless the root or binding changed meanwhile.
    ///
    /// Returns the registrations that were not stored, to be dropped
    /// outside the lock.
    fn store(&self, root: &ObjectRef, id: BindingId, registrations: Vec<Registration>) -> Vec<Registration> {
        let mut state = self.state.lock();
        if !state.is_root(root) {
            return registrations;
        }
        match state.entries.get_mut(id) {
            Some(entry) => std::mem::replace(&mut entry.registrations, registrations),
            None => registrations,
        }
    }

    /// Swap the root: unwire everything, then wire and push every binding.
    fn install_root(&self, root: Option<ObjectRef>) {
        let (stale, targets) = {
            let mut state = self.state.lock();
            state.root = root.clone();
            let mut stale = Vec::new();
            let mut targets = Vec::with_capacity(state.order.len());
            let order = state.order.clone();
            for id in order {
                if let Some(entry) = state.entries.get_mut(id) {
                    stale.append(&mut entry.registrations);
                    targets.push(Target::of(id, entry));
                }
            }
            (stale, targets)
        };
        drop(stale);

        let Some(root) = root else {
            for target in &targets {
                target.property.detach_root();
            }
            tracing::debug!(target: "lattice_bind::inventory", scope = %self.config.name, "inventory detached");
            return;
        };

        for target in &targets {
            target.property.attach_root(root.clone());
            let registrations = target.wire(&root);
            drop(self.store(&root, target.id, registrations));
        }
        tracing::debug!(
            target: "lattice_bind::inventory",
            scope = %self.config.name,
            bindings = targets.len(),
            "inventory attached"
        );

        for target in &targets {
            target.property.push_from_model();
        }
    }
}

/// A summary of one binding, for diagnostics.
#[derive(Debug, Clone)]
pub struct BindingSummary {
    /// The binding id.
    pub id: BindingId,
    /// The binding name.
    pub name: String,
    /// The bound path text.
    pub path: String,
    /// The binding state.
    pub state: PropertyState,
    /// Number of chain registrations held for the binding.
    pub registrations: usize,
    /// The display-format path, if any.
    pub format_path: Option<String>,
}

/// The set of bindings for one UI scope.
pub struct BindingInventory {
    shared: Arc<Shared>,
}

impl BindingInventory {
    /// Create an empty, detached inventory.
    pub fn new(config: InventoryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Create a builder.
    pub fn builder() -> InventoryBuilder {
        InventoryBuilder::new()
    }

    /// The configuration.
    pub fn config(&self) -> &InventoryConfig {
        &self.shared.config
    }

    /// Add a binding.
    ///
    /// If a root is attached, the binding is wired and pushed immediately.
    pub fn bind(&self, property: Arc<TwoWayProperty>) -> BindingId {
        let inventory = Arc::downgrade(&self.shared);
        let has_format_path = property.format_path().is_some();

        let (id, root) = {
            let mut state = self.shared.state.lock();
            let id = state.entries.insert_with_key(|binding| Entry {
                property: property.clone(),
                value_listener: Arc::new(ChainListener {
                    inventory: inventory.clone(),
                    binding,
                    role: Role::Value,
                }),
                format_listener: has_format_path.then(|| {
                    Arc::new(ChainListener {
                        inventory: inventory.clone(),
                        binding,
                        role: Role::Format,
                    })
                }),
                registrations: Vec::new(),
            });
            state.order.push(id);
            (id, state.root.clone())
        };
        tracing::debug!(
            target: "lattice_bind::inventory",
            scope = %self.shared.config.name,
            path = %property.path(),
            "binding added"
        );

        if let Some(root) = root {
            let target = {
                let state = self.shared.state.lock();
                state.entries.get(id).map(|entry| Target::of(id, entry))
            };
            if let Some(target) = target {
                target.property.attach_root(root.clone());
                let registrations = target.wire(&root);
                drop(self.shared.store(&root, id, registrations));
                target.property.push_from_model();
            }
        }
        id
    }

    /// Parse `path`, create a binding for it with this inventory's
    /// configuration, and add it.
    pub fn bind_path(&self, path: &str) -> Result<(BindingId, Arc<TwoWayProperty>), PathError> {
        let mut property = TwoWayProperty::parse(path)?.with_conversion(self.shared.config.conversion);
        if let Some(resources) = &self.shared.config.format_resources {
            property = property.with_resources(resources.clone());
        }
        let property = Arc::new(property);
        let id = self.bind(property.clone());
        Ok((id, property))
    }

    /// Remove a binding and release its registrations.
    ///
    /// Returns `false` if the id is unknown.
    pub fn unbind(&self, id: BindingId) -> bool {
        let removed = {
            let mut state = self.shared.state.lock();
            state.order.retain(|existing| *existing != id);
            state.entries.remove(id)
        };
        match removed {
            Some(entry) => {
                entry.property.detach_root();
                tracing::debug!(
                    target: "lattice_bind::inventory",
                    scope = %self.shared.config.name,
                    path = %entry.property.path(),
                    "binding removed"
                );
                true
            }
            None => false,
        }
    }

    /// Attach a model root, wiring and pushing every binding.
    ///
    /// Attaching while already attached replaces the root.
    #[tracing::instrument(skip_all, fields(scope = %self.shared.config.name), target = "lattice_bind::inventory", level = "debug")]
    pub fn attach(&self, root: ObjectRef) {
        self.shared.install_root(Some(root));
    }

    /// Release every registration and unbind every binding from the root.
    ///
    /// Idempotent.
    pub fn detach(&self) {
        if !self.is_attached() && self.registration_count() == 0 {
            return;
        }
        self.shared.install_root(None);
    }

    /// Swap the root in one step: unwire everything, then rewire and push.
    ///
    /// No UI update happens between the unwiring and the rewiring.
    pub fn replace_root(&self, root: ObjectRef) {
        self.shared.install_root(Some(root));
    }

    /// The attached root.
    pub fn root(&self) -> Option<ObjectRef> {
        self.shared.state.lock().root.clone()
    }

    /// Whether a root is attached.
    pub fn is_attached(&self) -> bool {
        self.shared.state.lock().root.is_some()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Whether there are no bindings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The binding with id `id`.
    pub fn property(&self, id: BindingId) -> Option<Arc<TwoWayProperty>> {
        self.shared.state.lock().entries.get(id).map(|entry| entry.property.clone())
    }

    /// Binding ids in the order they were added.
    pub fn binding_ids(&self) -> Vec<BindingId> {
        self.shared.state.lock().order.clone()
    }

    /// Total number of chain registrations currently held.
    pub fn registration_count(&self) -> usize {
        let state = self.shared.state.lock();
        state.entries.values().map(|entry| entry.registrations.len()).sum()
    }

    /// Summaries of every binding, in order.
    pub fn describe(&self) -> Vec<BindingSummary> {
        let state = self.shared.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| {
                let entry = state.entries.get(*id)?;
                Some(BindingSummary {
                    id: *id,
                    name: entry.property.name().to_string(),
                    path: entry.property.path().to_string(),
                    state: entry.property.state(),
                    registrations: entry.registrations.len(),
                    format_path: entry.property.format_path().map(|path| path.to_string()),
                })
            })
            .collect()
    }
}

impl Default for BindingInventory {
    fn default() -> Self {
        Self::new(InventoryConfig::default())
    }
}

impl Drop for BindingInventory {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for BindingInventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingInventory")
            .field("config", &self.shared.config)
            .field("attached", &self.is_attached())
            .field("bindings", &self.len())
            .field("registrations", &self.registration_count())
            .finish()
    }
}
