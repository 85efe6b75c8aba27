//! The two-way binding primitive.
//!
//! A [`TwoWayProperty`] connects one property path under a model root to
//! one UI collaborator. It caches the last value that crossed the binding
//! in either direction (the *temp value*) and uses it to suppress echoes:
//!
//! - model to UI: [`push_from_model`](TwoWayProperty::push_from_model)
//!   reads the path and calls the UI-update callback only if the value
//!   differs from the temp value;
//! - UI to model: [`push_to_model`](TwoWayProperty::push_to_model) converts
//!   the UI value to the terminal's type, stores it as the temp value
//!   *before* writing, so the model's synchronous change notification comes
//!   back as a no-op.
//!
//! No lock is held while the model, the resolver's accessors or the UI
//! callback run.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{BindError, ConversionError, PathError, WriteError};
use crate::format::{resolve_source, FormatResources, FormatSource, FormatState};
use crate::object::ObjectRef;
use crate::path::PropertyPath;
use crate::value::{PropertyValue, Value, ValueType};

/// What the UI collaborator receives when the model value changes.
#[derive(Debug, Clone, PartialEq)]
pub struct UiUpdate {
    /// The raw model value.
    pub value: Value,
    /// The value rendered through the display format.
    pub text: String,
}

/// Whether a binding currently holds a model value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PropertyState {
    /// The path has not resolved since the last root change.
    #[default]
    Unbound,
    /// The path resolved; holds the cached temp value.
    Bound(Value),
}

impl PropertyState {
    /// The cached temp value, if bound.
    pub fn temp(&self) -> Option<&Value> {
        match self {
            Self::Bound(value) => Some(value),
            Self::Unbound => None,
        }
    }
}

/// How a UI string is written to a terminal with no string conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConversionPolicy {
    /// Write the raw string and let the model accept or reject it.
    #[default]
    BestEffortString,
    /// Fail with [`ConversionError::Unsupported`] without writing.
    Strict,
}

type UiCallback = Arc<dyn Fn(&UiUpdate) + Send + Sync>;

struct Inner {
    root: Option<ObjectRef>,
    state: PropertyState,
    format: FormatState,
}

/// One two-way binding between a property path and a UI collaborator.
pub struct TwoWayProperty {
    name: Option<String>,
    path: PropertyPath,
    conversion: ConversionPolicy,
    resources: Option<Arc<dyn FormatResources>>,
    inner: Mutex<Inner>,
    on_update: RwLock<Option<UiCallback>>,
}

impl TwoWayProperty {
    /// Create an unbound property for `path`.
    pub fn new(path: PropertyPath) -> Self {
        Self {
            name: None,
            path,
            conversion: ConversionPolicy::default(),
            resources: None,
            inner: Mutex::new(Inner {
                root: None,
                state: PropertyState::Unbound,
                format: FormatState::NoFormat,
            }),
            on_update: RwLock::new(None),
        }
    }

    /// Parse `text` and create an unbound property for it.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        PropertyPath::parse(text).map(Self::new)
    }

    /// Name the binding for diagnostics. Defaults to the path text.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Render values through a display format.
    pub fn with_format(self, source: FormatSource) -> Self {
        self.inner.lock().format = FormatState::new(Some(source));
        self
    }

    /// Set the policy for UI strings written to non-primitive terminals.
    pub fn with_conversion(mut self, conversion: ConversionPolicy) -> Self {
        self.conversion = conversion;
        self
    }

    /// Resolve resource-id formats through `resources`.
    pub fn with_resources(mut self, resources: Arc<dyn FormatResources>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// The name given with [`with_name`](Self::with_name), or the path text.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.path.as_str())
    }

    /// The bound path.
    pub fn path(&self) -> &PropertyPath {
        &self.path
    }

    /// The UI-string conversion policy.
    pub fn conversion(&self) -> ConversionPolicy {
        self.conversion
    }

    /// The path of a path-backed display format.
    pub fn format_path(&self) -> Option<PropertyPath> {
        self.inner.lock().format.source().and_then(FormatSource::path).cloned()
    }

    /// A snapshot of the display-format state.
    pub fn format_state(&self) -> FormatState {
        self.inner.lock().format.clone()
    }

    /// The current root, if attached.
    pub fn root(&self) -> Option<ObjectRef> {
        self.inner.lock().root.clone()
    }

    /// Use `root` for future reads and writes.
    ///
    /// Resets the binding to [`PropertyState::Unbound`] and returns a
    /// resolved path or resource format to pending. Does not push.
    pub fn attach_root(&self, root: ObjectRef) {
        let mut inner = self.inner.lock();
        inner.root = Some(root);
        inner.state = PropertyState::Unbound;
        inner.format.reset();
    }

    /// Drop the root and return to [`PropertyState::Unbound`].
    pub fn detach_root(&self) {
        let mut inner = self.inner.lock();
        inner.root = None;
        inner.state = PropertyState::Unbound;
        inner.format.reset();
    }

    /// Set the callback invoked with every model-to-UI update.
    pub fn set_ui_update_listener<F>(&self, f: F)
    where
        F: Fn(&UiUpdate) + Send + Sync + 'static,
    {
        *self.on_update.write() = Some(Arc::new(f));
    }

    /// Remove the UI-update callback.
    pub fn clear_ui_update_listener(&self) {
        *self.on_update.write() = None;
    }

    /// The binding state.
    pub fn state(&self) -> PropertyState {
        self.inner.lock().state.clone()
    }

    /// Whether the path resolved since the last root change.
    pub fn is_bound(&self) -> bool {
        matches!(self.inner.lock().state, PropertyState::Bound(_))
    }

    /// The cached temp value.
    pub fn temp_value(&self) -> Option<Value> {
        self.inner.lock().state.temp().cloned()
    }

    /// The cached temp value converted to `T`.
    pub fn temp_as<T: PropertyValue>(&self) -> Option<T> {
        self.temp_value().and_then(|value| T::from_value(value).ok())
    }

    /// The temp value rendered through the display format.
    pub fn display_text(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner.state.temp().map(|value| inner.format.render(value))
    }

    /// Pull the model value into the binding.
    ///
    /// An unresolvable path makes the binding unbound without a UI update.
    /// A value equal to the temp value is ignored. Otherwise the value is
    /// cached and the UI-update callback runs once. Returns whether the UI
    /// was updated.
    #[tracing::instrument(skip(self), fields(path = %self.path), target = "lattice_bind::property", level = "trace")]
    pub fn push_from_model(&self) -> bool {
        let Some(root) = self.root() else {
            self.inner.lock().state = PropertyState::Unbound;
            return false;
        };

        let Some(value) = self.path.read(&root) else {
            tracing::trace!(target: "lattice_bind::property", "path unresolvable, binding unbound");
            self.inner.lock().state = PropertyState::Unbound;
            return false;
        };

        let pending = {
            let inner = self.inner.lock();
            if inner.state.temp() == Some(&value) {
                return false;
            }
            if inner.format.is_pending() {
                inner.format.source().cloned()
            } else {
                None
            }
        };
        let resolved = pending.and_then(|source| resolve_source(&source, Some(&root), self.resources.as_deref()));

        let text = {
            let mut inner = self.inner.lock();
            if resolved.is_some() {
                inner.format.update(resolved);
            }
            inner.state = PropertyState::Bound(value.clone());
            inner.format.render(&value)
        };

        self.emit(UiUpdate { value, text });
        true
    }

    /// Write a UI value through the path.
    ///
    /// Returns `Ok(false)` when the value is an echo of the temp value,
    /// before or after conversion. Strings headed for primitive terminals
    /// are parsed; a parse failure leaves the model and the temp value
    /// untouched. If the write fails the previous temp value is restored.
    #[tracing::instrument(skip(self, value), fields(path = %self.path), target = "lattice_bind::property", level = "trace")]
    pub fn push_to_model(&self, value: impl Into<Value>) -> Result<bool, BindError> {
        let value = value.into();
        let (root, previous) = {
            let inner = self.inner.lock();
            (inner.root.clone(), inner.state.clone())
        };
        let root = root.ok_or_else(|| WriteError::Unresolvable {
            path: self.path.to_string(),
        })?;

        if previous.temp() == Some(&value) {
            return Ok(false);
        }
        let converted = self.convert(&root, value)?;
        if previous.temp() == Some(&converted) {
            return Ok(false);
        }

        self.inner.lock().state = PropertyState::Bound(converted.clone());

        match self.path.write(&root, converted.clone()) {
            Ok(()) => {
                tracing::trace!(target: "lattice_bind::property", value = ?converted, "wrote UI value to model");
                Ok(true)
            }
            Err(err) => {
                {
                    let mut inner = self.inner.lock();
                    if inner.state.temp() == Some(&converted) {
                        inner.state = previous;
                    }
                }
                tracing::debug!(target: "lattice_bind::property", error = %err, "model rejected UI value");
                Err(err.into())
            }
        }
    }

    fn convert(&self, root: &ObjectRef, value: Value) -> Result<Value, BindError> {
        let terminal = self.path.terminal_type(root);
        match (value, terminal) {
            (Value::Str(text), Some(ty)) if ty.is_primitive() => Ok(ty.parse(&text)?),
            (Value::Str(text), None | Some(ValueType::Str | ValueType::Any)) => Ok(Value::Str(text)),
            (Value::Str(text), Some(ty)) => match self.conversion {
                ConversionPolicy::BestEffortString => {
                    tracing::debug!(
                        target: "lattice_bind::property",
                        path = %self.path,
                        terminal = %ty,
                        "no string conversion, writing raw string"
                    );
                    Ok(Value::Str(text))
                }
                ConversionPolicy::Strict => Err(ConversionError::Unsupported(ty).into()),
            },
            (other, Some(ty)) => Ok(ty.coerce(other.clone()).unwrap_or(other)),
            (other, None) => Ok(other),
        }
    }

    /// Re-resolve a path or resource display format.
    ///
    /// When the resolved format changes and the binding is bound, the UI
    /// gets one update with the re-rendered text. Returns whether the
    /// format changed.
    pub fn refresh_format(&self) -> bool {
        let (root, source) = {
            let inner = self.inner.lock();
            (inner.root.clone(), inner.format.source().cloned())
        };
        let Some(source) = source else {
            return false;
        };
        if matches!(source, FormatSource::Literal(_)) {
            return false;
        }
        let resolved = resolve_source(&source, root.as_ref(), self.resources.as_deref());

        let update = {
            let mut inner = self.inner.lock();
            if !inner.format.update(resolved) {
                return false;
            }
            inner.state.temp().map(|value| UiUpdate {
                value: value.clone(),
                text: inner.format.render(value),
            })
        };
        tracing::trace!(target: "lattice_bind::format", path = %self.path, "display format changed");

        if let Some(update) = update {
            self.emit(update);
        }
        true
    }

    fn emit(&self, update: UiUpdate) {
        let callback = self.on_update.read().clone();
        if let Some(callback) = callback {
            callback(&update);
        }
    }
}

impl fmt::Debug for TwoWayProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TwoWayProperty")
            .field("name", &self.name())
            .field("path", &self.path.as_str())
            .field("state", &inner.state)
            .field("format", &inner.format)
            .field("attached", &inner.root.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DynamicObject;
    use crate::PropertyAccessor;

    fn recording(prop: &TwoWayProperty) -> Arc<Mutex<Vec<UiUpdate>>> {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let updates_clone = updates.clone();
        prop.set_ui_update_listener(move |update| updates_clone.lock().push(update.clone()));
        updates
    }

    fn model() -> Arc<DynamicObject> {
        Arc::new(
            DynamicObject::new()
                .with("count", 5)
                .with("label", "hi")
                .with("ratio", 0.5_f64)
                .with("flag", false),
        )
    }

    #[test]
    fn test_push_from_model_fires_once() {
        let root = model();
        let prop = TwoWayProperty::parse("count").unwrap();
        let updates = recording(&prop);
        prop.attach_root(root);

        assert!(prop.push_from_model());
        assert!(!prop.push_from_model());

        let updates = updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].value, Value::Int(5));
        assert_eq!(updates[0].text, "5");
        assert_eq!(prop.temp_as::<i32>(), Some(5));
    }

    #[test]
    fn test_nan_model_value_does_not_echo() {
        let root = Arc::new(DynamicObject::new().with("ratio", f64::NAN));
        let prop = TwoWayProperty::parse("ratio").unwrap();
        let updates = recording(&prop);
        prop.attach_root(root.clone());

        assert!(prop.push_from_model());
        assert!(!prop.push_from_model());
        assert!(!prop.push_from_model());
        assert_eq!(updates.lock().len(), 1);

        assert!(!prop.push_to_model("NaN").unwrap());
        root.set("ratio", Value::Double(f64::NAN)).unwrap();
        assert!(!prop.push_from_model());
        assert_eq!(updates.lock().len(), 1);
    }

    #[test]
    fn test_unresolvable_is_unbound_without_update() {
        let root: ObjectRef = Arc::new(DynamicObject::new().with_typed("a", ValueType::Object, Value::Null));
        let prop = TwoWayProperty::parse("a.b").unwrap();
        let updates = recording(&prop);
        prop.attach_root(root);

        assert!(!prop.push_from_model());
        assert_eq!(prop.state(), PropertyState::Unbound);
        assert!(updates.lock().is_empty());
    }

    #[test]
    fn test_push_to_model_parses_and_suppresses_echo() {
        let root = model();
        let prop = TwoWayProperty::parse("count").unwrap();
        let updates = recording(&prop);
        prop.attach_root(root.clone());
        prop.push_from_model();

        assert_eq!(prop.push_to_model("42"), Ok(true));
        assert_eq!(root.get("count"), Some(Value::Int(42)));
        assert_eq!(prop.temp_value(), Some(Value::Int(42)));

        // The model now equals the temp value: no echo to the UI.
        assert!(!prop.push_from_model());
        assert_eq!(updates.lock().len(), 1);

        // Same value again, as text or typed.
        assert_eq!(prop.push_to_model("42"), Ok(false));
        assert_eq!(prop.push_to_model(42), Ok(false));
    }

    #[test]
    fn test_push_to_model_rejects_bad_text() {
        let root = model();
        let prop = TwoWayProperty::parse("count").unwrap();
        prop.attach_root(root.clone());
        prop.push_from_model();

        let result = prop.push_to_model("abc");
        assert!(matches!(result, Err(BindError::Conversion(_))));
        assert_eq!(root.get("count"), Some(Value::Int(5)));
        assert_eq!(prop.temp_value(), Some(Value::Int(5)));
    }

    #[test]
    fn test_push_to_model_other_primitives() {
        let root = model();
        let ratio = TwoWayProperty::parse("ratio").unwrap();
        let flag = TwoWayProperty::parse("flag").unwrap();
        ratio.attach_root(root.clone());
        flag.attach_root(root.clone());

        assert_eq!(ratio.push_to_model("1.25"), Ok(true));
        assert_eq!(root.get("ratio"), Some(Value::Double(1.25)));
        assert_eq!(flag.push_to_model("TRUE"), Ok(true));
        assert_eq!(root.get("flag"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_write_failure_restores_temp() {
        let root = model();
        let prop = TwoWayProperty::parse("count").unwrap();
        prop.attach_root(root.clone());
        prop.push_from_model();

        let result = prop.push_to_model(Value::Bool(true));
        assert!(matches!(result, Err(BindError::Write(WriteError::TypeMismatch { .. }))));
        assert_eq!(prop.temp_value(), Some(Value::Int(5)));
    }

    #[test]
    fn test_string_fallback_policies() {
        let root: ObjectRef = Arc::new(DynamicObject::new().with_typed("child", ValueType::Object, Value::Null));

        let lenient = TwoWayProperty::parse("child").unwrap();
        lenient.attach_root(root.clone());
        // The raw string reaches the model, which rejects it.
        assert!(matches!(lenient.push_to_model("x"), Err(BindError::Write(_))));

        let strict = TwoWayProperty::parse("child")
            .unwrap()
            .with_conversion(ConversionPolicy::Strict);
        strict.attach_root(root);
        assert_eq!(
            strict.push_to_model("x"),
            Err(BindError::Conversion(ConversionError::Unsupported(ValueType::Object)))
        );
    }

    #[test]
    fn test_push_to_model_without_root() {
        let prop = TwoWayProperty::parse("count").unwrap();
        assert!(matches!(
            prop.push_to_model(1),
            Err(BindError::Write(WriteError::Unresolvable { .. }))
        ));
    }

    #[test]
    fn test_literal_format_renders_text_only() {
        let root = model();
        let prop = TwoWayProperty::parse("count")
            .unwrap()
            .with_format(FormatSource::Literal("%d items".into()));
        let updates = recording(&prop);
        prop.attach_root(root.clone());
        prop.push_from_model();

        assert_eq!(updates.lock()[0].text, "5 items");
        assert_eq!(prop.display_text().as_deref(), Some("5 items"));

        prop.push_to_model("6").unwrap();
        assert_eq!(root.get("count"), Some(Value::Int(6)));
    }

    #[test]
    fn test_path_format_value_first() {
        let root: ObjectRef = Arc::new(
            DynamicObject::new()
                .with("count", 3)
                .with_typed("fmt", ValueType::Str, Value::Null),
        );
        let prop = TwoWayProperty::parse("count")
            .unwrap()
            .with_format(FormatSource::Path(PropertyPath::parse("fmt").unwrap()));
        let updates = recording(&prop);
        prop.attach_root(root.clone());

        prop.push_from_model();
        assert_eq!(updates.lock()[0].text, "3");
        assert!(prop.format_state().is_pending());

        root.set("fmt", "n=%d".into()).unwrap();
        assert!(prop.refresh_format());
        assert_eq!(updates.lock().len(), 2);
        assert_eq!(updates.lock()[1].text, "n=3");
        assert!(!prop.refresh_format());
    }

    #[test]
    fn test_path_format_first() {
        let root: ObjectRef = Arc::new(DynamicObject::new().with("count", 3).with("fmt", "<%s>"));
        let prop = TwoWayProperty::parse("count")
            .unwrap()
            .with_format(FormatSource::Path(PropertyPath::parse("fmt").unwrap()));
        let updates = recording(&prop);
        prop.attach_root(root);

        // The format resolves before any value arrives.
        assert!(prop.refresh_format());
        assert!(updates.lock().is_empty());
        prop.push_from_model();

        let updates = updates.lock();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].text, "<3>");
    }

    #[test]
    fn test_resource_format() {
        let root: ObjectRef = Arc::new(DynamicObject::new().with("count", 3));
        let resources: Arc<dyn FormatResources> =
            Arc::new(|id: i64| (id == 1).then(|| "#%d".to_string()));
        let prop = TwoWayProperty::parse("count")
            .unwrap()
            .with_format(FormatSource::Resource(1))
            .with_resources(resources);
        prop.attach_root(root);
        prop.push_from_model();

        assert_eq!(prop.display_text().as_deref(), Some("#3"));
    }

    #[test]
    fn test_attach_resets_state() {
        let prop = TwoWayProperty::parse("count").unwrap().with_name("counter");
        prop.attach_root(model());
        prop.push_from_model();
        assert!(prop.is_bound());
        assert_eq!(prop.name(), "counter");

        prop.attach_root(model());
        assert!(!prop.is_bound());
        prop.detach_root();
        assert!(prop.root().is_none());
        assert!(!prop.push_from_model());
    }
}
