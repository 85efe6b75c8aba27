//! The property-accessor capability and two ready-made accessors.
//!
//! Bindings never inspect concrete model types. Everything they need goes
//! through [`PropertyAccessor`]: read a named property, write it, ask for
//! its declared type, and optionally reach the object's notification hub.
//!
//! Model structs usually get their accessor from `#[derive(Bindable)]`.
//! For ad-hoc graphs and tests, [`DynamicObject`] is a map-backed property
//! bag. [`ObservableObject`] adds change notification to an accessor that
//! has none.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::PropertyError;
use crate::observable::Observable;
use crate::value::{Value, ValueType};

/// A shared reference to any bindable object.
pub type ObjectRef = Arc<dyn PropertyAccessor>;

/// Whether two object references point at the same allocation.
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Named property access on an object.
///
/// # Contract
///
/// - `get` returns `None` when the object has no property with that name.
/// - `set` validates the value against the declared type and returns
///   [`PropertyError::TypeMismatch`] rather than storing a wrong kind.
/// - An object that returns a hub from [`observable`](Self::observable)
///   must call [`Observable::publish_change`] after every `set` that
///   changed a value.
pub trait PropertyAccessor: Send + Sync {
    /// Read a property.
    fn get(&self, name: &str) -> Option<Value>;

    /// Write a property.
    fn set(&self, name: &str, value: Value) -> Result<(), PropertyError>;

    /// The declared type of a property.
    fn type_of(&self, name: &str) -> Option<ValueType>;

    /// The notification hub, if this object is observable.
    fn observable(&self) -> Option<&Observable> {
        None
    }

    /// The concrete type name, for diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert into `Arc<dyn Any>` for downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Makes a plain accessor observable.
///
/// The wrapper holds its source weakly; once the source is dropped every
/// read returns `None` and every write fails with
/// [`PropertyError::SourceDropped`]. Successful writes that change the
/// value notify listeners registered on the wrapper.
///
/// ```
/// use std::sync::Arc;
/// use lattice_bind::{DynamicObject, ObservableObject, PropertyAccessor};
///
/// let plain = Arc::new(DynamicObject::new().with("count", 1));
/// let observed = ObservableObject::wrap(&plain);
///
/// observed.set("count", 2.into()).unwrap();
/// assert_eq!(plain.get("count"), Some(2.into()));
/// ```
pub struct ObservableObject<T: PropertyAccessor> {
    source: Weak<T>,
    observable: Observable,
}

impl<T: PropertyAccessor + 'static> ObservableObject<T> {
    /// Wrap `source`, which must outlive the wrapper to stay useful.
    pub fn wrap(source: &Arc<T>) -> Arc<Self> {
        Arc::new(Self {
            source: Arc::downgrade(source),
            observable: Observable::new(),
        })
    }

    /// The wrapped object, if it still exists.
    pub fn source(&self) -> Option<Arc<T>> {
        self.source.upgrade()
    }

    /// The hub listeners register on.
    pub fn hub(&self) -> &Observable {
        &self.observable
    }
}

impl<T: PropertyAccessor + 'static> PropertyAccessor for ObservableObject<T> {
    fn get(&self, name: &str) -> Option<Value> {
        self.source.upgrade()?.get(name)
    }

    fn set(&self, name: &str, value: Value) -> Result<(), PropertyError> {
        let source = self.source.upgrade().ok_or(PropertyError::SourceDropped)?;
        let old = source.get(name).unwrap_or_default();
        source.set(name, value)?;
        let new = source.get(name).unwrap_or_default();
        self.observable.publish_change(name, &old, &new);
        Ok(())
    }

    fn type_of(&self, name: &str) -> Option<ValueType> {
        self.source.upgrade()?.type_of(name)
    }

    fn observable(&self) -> Option<&Observable> {
        Some(&self.observable)
    }

    fn type_name(&self) -> &'static str {
        match self.source.upgrade() {
            Some(source) => source.type_name(),
            None => std::any::type_name::<Self>(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: PropertyAccessor> fmt::Debug for ObservableObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableObject")
            .field("alive", &(self.source.strong_count() > 0))
            .field("observable", &self.observable)
            .finish()
    }
}

struct Slot {
    declared: ValueType,
    value: Value,
}

/// A map-backed observable object.
///
/// Properties are declared up front with [`with`](Self::with) or
/// [`with_typed`](Self::with_typed); writes to undeclared names fail with
/// [`PropertyError::NotFound`]. Object values that carry their own hub
/// bubble their changes up to listeners of the holding property.
///
/// ```
/// use lattice_bind::{DynamicObject, PropertyAccessor, ValueType};
///
/// let person = DynamicObject::new()
///     .with("name", "Ada")
///     .with_typed("age", ValueType::Int, 36);
///
/// assert!(person.set("age", "old".into()).is_err());
/// assert_eq!(person.get("name").unwrap().to_string(), "Ada");
/// ```
#[derive(Default)]
pub struct DynamicObject {
    slots: RwLock<HashMap<String, Slot>>,
    observable: Observable,
}

impl DynamicObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property whose type is taken from its initial value.
    ///
    /// A null initial value declares a property of type [`ValueType::Any`].
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let declared = value.value_type().unwrap_or(ValueType::Any);
        self.with_typed(name, declared, value)
    }

    /// Declare a property with an explicit type.
    pub fn with_typed(self, name: impl Into<String>, declared: ValueType, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some(child) = value.observable() {
            self.observable.attach_nested(&name, &child);
        }
        self.slots.write().insert(name, Slot { declared, value });
        self
    }

    /// Names of every declared property, sorted.
    pub fn property_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl PropertyAccessor for DynamicObject {
    fn get(&self, name: &str) -> Option<Value> {
        self.slots.read().get(name).map(|slot| slot.value.clone())
    }

    fn set(&self, name: &str, value: Value) -> Result<(), PropertyError> {
        let (old, new) = {
            let mut slots = self.slots.write();
            let slot = slots
                .get_mut(name)
                .ok_or_else(|| PropertyError::not_found(name))?;
            let value = slot.declared.coerce(value)?;
            let old = std::mem::replace(&mut slot.value, value.clone());
            (old, value)
        };
        self.observable.publish_change(name, &old, &new);
        Ok(())
    }

    fn type_of(&self, name: &str) -> Option<ValueType> {
        self.slots.read().get(name).map(|slot| slot.declared)
    }

    fn observable(&self) -> Option<&Observable> {
        Some(&self.observable)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read();
        let mut map = f.debug_map();
        for name in self.property_names() {
            if let Some(slot) = slots.get(&name) {
                map.entry(&name, &slot.value);
            }
        }
        map.finish()
    }
}
