//! Field cells for bindable model structs.
//!
//! [`Property<T>`] is the storage for one model field: interior mutability
//! plus change detection. It does not notify anyone by itself; the owning
//! object's [`PropertyAccessor`](crate::PropertyAccessor) implementation
//! publishes a change on its [`Observable`](crate::Observable) after a
//! successful write. `#[derive(Bindable)]` generates exactly that glue.
//!
//! # Example
//!
//! ```
//! use lattice_bind::{Observable, Property};
//!
//! struct Counter {
//!     value: Property<i32>,
//!     observable: Observable,
//! }
//!
//! impl Counter {
//!     fn set_value(&self, new_value: i32) {
//!         if let Some(old) = self.value.replace(new_value) {
//!             self.observable
//!                 .publish_change("value", &old.into(), &new_value.into());
//!         }
//!     }
//! }
//! ```

use std::fmt;

use parking_lot::RwLock;

use crate::value::ValueType;

/// A field value with change detection.
///
/// `replace()` compares the new value with the current one and returns the
/// old value only on a real change, so the owner only notifies then.
///
/// # Thread Safety
///
/// `Property<T>` uses interior mutability with `RwLock` and is `Send + Sync`
/// when `T` is.
///
/// ```
/// use lattice_bind::Property;
///
/// let prop = Property::new(42);
/// assert_eq!(prop.replace(42), None);
/// assert_eq!(prop.replace(100), Some(42));
/// assert_eq!(prop.get(), 100);
/// ```
pub struct Property<T> {
    value: RwLock<T>,
}

impl<T: Clone> Property<T> {
    /// Create a new property with an initial value.
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Get a clone of the current value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Store the value without notifying anyone.
    ///
    /// The owner announces the change itself, e.g. with
    /// [`Observable::notify_property`](crate::Observable::notify_property).
    pub fn set_silent(&self, value: T) {
        *self.value.write() = value;
    }

    /// Store `value` and return the previous one, changed or not.
    ///
    /// Used by generated accessors, which compare the values afterwards
    /// through [`Value`](crate::Value) equality.
    pub fn swap(&self, value: T) -> T {
        std::mem::replace(&mut *self.value.write(), value)
    }
}

impl<T: Clone + PartialEq> Property<T> {
    /// Set the value, returning the old value if it changed.
    pub fn replace(&self, value: T) -> Option<T> {
        let mut current = self.value.write();
        if *current != value {
            Some(std::mem::replace(&mut *current, value))
        } else {
            None
        }
    }
}

impl<T: Clone> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

impl<T: Clone + Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone> From<T> for Property<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .finish()
    }
}

/// Static metadata for one property of a bindable type.
///
/// `#[derive(Bindable)]` emits a `PROPERTIES` table of these.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PropertyMeta {
    /// The property name as seen by paths.
    pub name: &'static str,
    /// The Rust type name of the field.
    pub type_name: &'static str,
    /// The declared value type.
    pub value_type: ValueType,
    /// Whether writes are rejected.
    pub read_only: bool,
}

impl PropertyMeta {
    /// Create metadata for a property.
    pub const fn new(
        name: &'static str,
        type_name: &'static str,
        value_type: ValueType,
        read_only: bool,
    ) -> Self {
        Self {
            name,
            type_name,
            value_type,
            read_only,
        }
    }

    /// Find the entry named `name` in a metadata table.
    pub fn find(table: &'static [PropertyMeta], name: &str) -> Option<&'static PropertyMeta> {
        table.iter().find(|meta| meta.name == name)
    }
}

impl fmt::Debug for PropertyMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyMeta")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("value_type", &self.value_type)
            .field("read_only", &self.read_only)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_property_basic() {
        let prop = Property::new(42);
        assert_eq!(prop.get(), 42);
    }

    #[test]
    fn test_property_replace() {
        let prop = Property::new("hello".to_string());

        assert!(prop.replace("hello".to_string()).is_none());

        let old = prop.replace("world".to_string());
        assert_eq!(old, Some("hello".to_string()));
        assert_eq!(prop.get(), "world");
    }

    #[test]
    fn test_property_swap_always_stores() {
        let prop = Property::new(1.5_f64);

        assert_eq!(prop.swap(1.5), 1.5);
        assert_eq!(prop.swap(2.5), 1.5);
        assert_eq!(prop.get(), 2.5);
    }

    #[test]
    fn test_property_thread_safe() {
        let prop = Arc::new(Property::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let prop = prop.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        prop.set_silent(i);
                        let _ = prop.get();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_property_default_and_from() {
        let prop: Property<String> = Property::default();
        assert_eq!(prop.get(), "");

        let prop: Property<i64> = 7.into();
        assert_eq!(prop.get(), 7);
    }

    #[test]
    fn test_property_meta() {
        const TABLE: &[PropertyMeta] = &[
            PropertyMeta::new("count", "i32", ValueType::Int, false),
            PropertyMeta::new("id", "String", ValueType::Str, true),
        ];

        let meta = PropertyMeta::find(TABLE, "id").unwrap();
        assert_eq!(meta.value_type, ValueType::Str);
        assert!(meta.read_only);
        assert!(PropertyMeta::find(TABLE, "missing").is_none());
    }
}
