//! Two-way, path-based property binding.
//!
//! This crate keeps a graph of model objects and a set of UI collaborators
//! synchronized without either side knowing the other's concrete type:
//!
//! - **Property Accessor**: named `get`/`set`/`type_of` on model objects,
//!   usually generated by `#[derive(Bindable)]` from `lattice-bind-macros`
//! - **Property Paths**: dotted paths (`order.customer.name`) resolved
//!   leniently against a root
//! - **Observable**: per-object listener hubs with nested-object bubbling
//! - **Two-Way Property**: one binding with echo suppression, string
//!   conversion and an optional display format
//! - **Binding Inventory**: the bindings of one UI scope, rewired when the
//!   root or any node along a path changes
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lattice_bind::{BindingInventory, DynamicObject, PropertyAccessor, Value, ValueType};
//!
//! let address = Arc::new(DynamicObject::new().with("city", "Oslo"));
//! let person = Arc::new(DynamicObject::new().with_typed("address", ValueType::Object, address));
//!
//! let inventory = BindingInventory::builder().name("person-form").build();
//! let (_id, city) = inventory.bind_path("address.city").unwrap();
//! inventory.attach(person.clone());
//! assert_eq!(city.display_text().as_deref(), Some("Oslo"));
//!
//! // A UI edit flows back to the model.
//! city.push_to_model("Bergen").unwrap();
//! let address = person.get("address").unwrap();
//! assert_eq!(address.as_object().unwrap().get("city"), Some(Value::from("Bergen")));
//! ```
//!
//! # Threading
//!
//! All types are `Send + Sync`, but propagation is synchronous and no lock
//! is held while listeners, UI callbacks or model setters run. Drive a
//! binding graph from one logical thread.

pub mod error;
pub mod format;
pub mod inventory;
pub mod logging;
pub mod object;
pub mod observable;
pub mod path;
pub mod property;
pub mod two_way;
pub mod value;

pub use error::{
    BindError, ConversionError, FormatError, ListenerError, PathError, PropertyError, Result,
    WriteError,
};
pub use format::{FormatResources, FormatSource, FormatState};
pub use inventory::{BindingId, BindingInventory, BindingSummary, InventoryBuilder, InventoryConfig};
pub use logging::{InventoryDebug, PerfSpan, TreeFormatOptions, TreeStyle};
pub use object::{same_object, DynamicObject, ObjectRef, ObservableObject, PropertyAccessor};
pub use observable::{
    Change, ListenerId, ObjectListener, Observable, Registration, Subscription, MAX_NOTIFY_DEPTH,
};
pub use path::{Chain, ChainLink, PropertyPath, Resolved};
pub use property::{Property, PropertyMeta};
pub use two_way::{ConversionPolicy, PropertyState, TwoWayProperty, UiUpdate};
pub use value::{PropertyValue, Value, ValueType};

/// Commonly used items.
pub mod prelude {
    pub use crate::{
        BindingInventory, Change, DynamicObject, ObjectListener, ObjectRef, Observable,
        ObservableObject, Property, PropertyAccessor, PropertyPath, PropertyValue, TwoWayProperty,
        Value, ValueType,
    };
}

static_assertions::assert_impl_all!(Value: Send, Sync);
static_assertions::assert_impl_all!(Observable: Send, Sync);
static_assertions::assert_impl_all!(Registration: Send, Sync);
static_assertions::assert_impl_all!(DynamicObject: Send, Sync);
static_assertions::assert_impl_all!(TwoWayProperty: Send, Sync);
static_assertions::assert_impl_all!(BindingInventory: Send, Sync);
static_assertions::assert_impl_all!(Property<String>: Send, Sync);
