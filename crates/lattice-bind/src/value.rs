//! Dynamically typed values carried along property paths.
//!
//! Paths are resolved at runtime, so every value read or written through
//! one travels as a [`Value`]. Model structs keep their fields strongly
//! typed and cross into the dynamic world through [`PropertyValue`].
//!
//! # Equality
//!
//! Scalars compare by value. Objects compare by *reference identity*: two
//! `Value::Object`s are equal only if they point at the same allocation.
//! Echo suppression relies on this, so a replaced child object always counts
//! as a change even when its contents look the same.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConversionError, PropertyError};
use crate::object::{same_object, ObjectRef, PropertyAccessor};
use crate::observable::Observable;

/// A value read from or written to a property.
#[derive(Clone, Default)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// An 8-bit signed integer.
    Byte(i8),
    /// A 16-bit signed integer.
    Short(i16),
    /// A 32-bit signed integer.
    Int(i32),
    /// A 64-bit signed integer.
    Long(i64),
    /// A 32-bit float.
    Float(f32),
    /// A 64-bit float.
    Double(f64),
    /// A single character.
    Char(char),
    /// A string.
    Str(String),
    /// A reference to another bindable object.
    Object(ObjectRef),
}

impl Value {
    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The declared type matching this value, or `None` for null.
    pub fn value_type(&self) -> Option<ValueType> {
        ValueType::of(self)
    }

    /// A short name for the kind of value, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Byte(_) => "i8",
            Self::Short(_) => "i16",
            Self::Int(_) => "i32",
            Self::Long(_) => "i64",
            Self::Float(_) => "f32",
            Self::Double(_) => "f64",
            Self::Char(_) => "char",
            Self::Str(_) => "String",
            Self::Object(_) => "object",
        }
    }

    /// Borrow the object reference, if this is an object.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Borrow the string, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The notification hub of an observable object value.
    pub fn observable(&self) -> Option<Observable> {
        self.as_object().and_then(|obj| obj.observable().cloned())
    }

    /// Downcast an object value to its concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let obj = Arc::clone(self.as_object()?);
        obj.into_any().downcast::<T>().ok()
    }

    /// Convert into a typed value.
    pub fn to_typed<T: PropertyValue>(&self) -> Result<T, PropertyError> {
        T::from_value(self.clone())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            // Bitwise, so NaN equals itself and echoes stay suppressed.
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => same_object(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Byte(v) => write!(f, "Byte({v})"),
            Self::Short(v) => write!(f, "Short({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Long(v) => write!(f, "Long({v})"),
            Self::Float(v) => write!(f, "Float({v:?})"),
            Self::Double(v) => write!(f, "Double({v:?})"),
            Self::Char(v) => write!(f, "Char({v:?})"),
            Self::Str(v) => write!(f, "Str({v:?})"),
            Self::Object(obj) => write!(f, "Object({} @ {:p})", obj.type_name(), Arc::as_ptr(obj)),
        }
    }
}

/// Renders the value the way a text widget shows it. Null renders empty.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            // Debug keeps the trailing ".0" on whole floats.
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::Char(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
            Self::Object(obj) => {
                let name = obj.type_name();
                write!(f, "[{}]", name.rsplit("::").next().unwrap_or(name))
            }
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => Str,
    ObjectRef => Object,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl<T: PropertyAccessor + 'static> From<Arc<T>> for Value {
    fn from(obj: Arc<T>) -> Self {
        Self::Object(obj)
    }
}

/// The declared type of a property.
///
/// The first eight variants are *primitive*: a string coming from the UI is
/// converted to them through [`ValueType::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `bool`
    Bool,
    /// `i8`
    Byte,
    /// `i16`
    Short,
    /// `i32`
    Int,
    /// `i64`
    Long,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `char`
    Char,
    /// `String`
    Str,
    /// A reference to another bindable object.
    Object,
    /// Any value at all.
    Any,
}

impl ValueType {
    /// The type matching a value, or `None` for null.
    pub fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => return None,
            Value::Bool(_) => Self::Bool,
            Value::Byte(_) => Self::Byte,
            Value::Short(_) => Self::Short,
            Value::Int(_) => Self::Int,
            Value::Long(_) => Self::Long,
            Value::Float(_) => Self::Float,
            Value::Double(_) => Self::Double,
            Value::Char(_) => Self::Char,
            Value::Str(_) => Self::Str,
            Value::Object(_) => Self::Object,
        })
    }

    /// Whether a UI string is converted to this type before writing.
    pub fn is_primitive(self) -> bool {
        !matches!(self, Self::Str | Self::Object | Self::Any)
    }

    /// Whether a property of this type can hold `value`.
    ///
    /// Null fits only reference-like types. Integers widen to larger
    /// integers and to floats.
    pub fn accepts(self, value: &Value) -> bool {
        use Value as V;
        match self {
            Self::Any => true,
            Self::Bool => matches!(value, V::Bool(_)),
            Self::Byte => matches!(value, V::Byte(_)),
            Self::Short => matches!(value, V::Byte(_) | V::Short(_)),
            Self::Int => matches!(value, V::Byte(_) | V::Short(_) | V::Int(_)),
            Self::Long => matches!(value, V::Byte(_) | V::Short(_) | V::Int(_) | V::Long(_)),
            Self::Float => matches!(value, V::Byte(_) | V::Short(_) | V::Int(_) | V::Float(_)),
            Self::Double => matches!(
                value,
                V::Byte(_) | V::Short(_) | V::Int(_) | V::Long(_) | V::Float(_) | V::Double(_)
            ),
            Self::Char => matches!(value, V::Char(_)),
            Self::Str => matches!(value, V::Null | V::Str(_)),
            Self::Object => matches!(value, V::Null | V::Object(_)),
        }
    }

    /// Widen `value` to this type's representation.
    pub fn coerce(self, value: Value) -> Result<Value, PropertyError> {
        use Value as V;
        if !self.accepts(&value) {
            return Err(PropertyError::type_mismatch(self, &value));
        }
        Ok(match (self, value) {
            (Self::Short, V::Byte(v)) => V::Short(v.into()),
            (Self::Int, V::Byte(v)) => V::Int(v.into()),
            (Self::Int, V::Short(v)) => V::Int(v.into()),
            (Self::Long, V::Byte(v)) => V::Long(v.into()),
            (Self::Long, V::Short(v)) => V::Long(v.into()),
            (Self::Long, V::Int(v)) => V::Long(v.into()),
            (Self::Float, V::Byte(v)) => V::Float(v.into()),
            (Self::Float, V::Short(v)) => V::Float(v.into()),
            (Self::Float, V::Int(v)) => V::Float(v as f32),
            (Self::Double, V::Byte(v)) => V::Double(v.into()),
            (Self::Double, V::Short(v)) => V::Double(v.into()),
            (Self::Double, V::Int(v)) => V::Double(v.into()),
            (Self::Double, V::Long(v)) => V::Double(v as f64),
            (Self::Double, V::Float(v)) => V::Double(v.into()),
            (_, v) => v,
        })
    }

    /// Convert UI text to a value of this type.
    ///
    /// Integers parse strictly. Floats ignore surrounding whitespace and a
    /// trailing `f`/`d` suffix. Booleans are `true` only for the text
    /// "true" in any case, and never fail. Chars need exactly one
    /// character. Object and Any have no string conversion.
    pub fn parse(self, text: &str) -> Result<Value, ConversionError> {
        let invalid = || ConversionError::Invalid {
            text: text.to_string(),
            target: self,
        };
        match self {
            Self::Bool => Ok(Value::Bool(text.eq_ignore_ascii_case("true"))),
            Self::Byte => text.parse().map(Value::Byte).map_err(|_| invalid()),
            Self::Short => text.parse().map(Value::Short).map_err(|_| invalid()),
            Self::Int => text.parse().map(Value::Int).map_err(|_| invalid()),
            Self::Long => text.parse().map(Value::Long).map_err(|_| invalid()),
            Self::Float => float_literal(text)
                .parse()
                .map(Value::Float)
                .map_err(|_| invalid()),
            Self::Double => float_literal(text)
                .parse()
                .map(Value::Double)
                .map_err(|_| invalid()),
            Self::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(invalid()),
                }
            }
            Self::Str => Ok(Value::Str(text.to_string())),
            Self::Object | Self::Any => Err(ConversionError::Unsupported(self)),
        }
    }
}

fn float_literal(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_suffix(|c: char| matches!(c, 'f' | 'F' | 'd' | 'D'))
        .unwrap_or(trimmed)
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Byte => "i8",
            Self::Short => "i16",
            Self::Int => "i32",
            Self::Long => "i64",
            Self::Float => "f32",
            Self::Double => "f64",
            Self::Char => "char",
            Self::Str => "String",
            Self::Object => "object",
            Self::Any => "any",
        })
    }
}

/// Bridges a strongly typed field and the dynamic [`Value`] world.
///
/// Implemented for the primitive types, `String`, `Value` itself, and
/// `Option<Arc<T>>` for nested bindable objects. `#[derive(Bindable)]`
/// requires every exposed field type to implement it.
pub trait PropertyValue: Sized {
    /// The type reported by `type_of` for fields of this type.
    const VALUE_TYPE: ValueType;

    /// Convert to a dynamic value.
    fn to_value(&self) -> Value;

    /// Convert from a dynamic value, widening where allowed.
    fn from_value(value: Value) -> Result<Self, PropertyError>;
}

macro_rules! scalar_property_value {
    ($($ty:ty => $vt:ident :: $variant:ident),* $(,)?) => {
        $(
            impl PropertyValue for $ty {
                const VALUE_TYPE: ValueType = ValueType::$vt;

                fn to_value(&self) -> Value {
                    Value::$variant(*self)
                }

                fn from_value(value: Value) -> Result<Self, PropertyError> {
                    match ValueType::$vt.coerce(value)? {
                        Value::$variant(v) => Ok(v),
                        other => Err(PropertyError::type_mismatch(ValueType::$vt, &other)),
                    }
                }
            }
        )*
    };
}

scalar_property_value! {
    bool => Bool::Bool,
    i8 => Byte::Byte,
    i16 => Short::Short,
    i32 => Int::Int,
    i64 => Long::Long,
    f32 => Float::Float,
    f64 => Double::Double,
    char => Char::Char,
}

impl PropertyValue for String {
    const VALUE_TYPE: ValueType = ValueType::Str;

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, PropertyError> {
        match value {
            Value::Str(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Err(PropertyError::type_mismatch(ValueType::Str, &other)),
        }
    }
}

impl PropertyValue for Value {
    const VALUE_TYPE: ValueType = ValueType::Any;

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> Result<Self, PropertyError> {
        Ok(value)
    }
}

impl<T: PropertyAccessor + 'static> PropertyValue for Option<Arc<T>> {
    const VALUE_TYPE: ValueType = ValueType::Object;

    fn to_value(&self) -> Value {
        match self {
            Some(obj) => Value::Object(Arc::clone(obj) as ObjectRef),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, PropertyError> {
        match value {
            Value::Null => Ok(None),
            Value::Object(obj) => {
                let got = obj.type_name();
                obj.into_any()
                    .downcast::<T>()
                    .map(Some)
                    .map_err(|_| PropertyError::TypeMismatch {
                        expected: ValueType::Object,
                        got,
                    })
            }
            other => Err(PropertyError::type_mismatch(ValueType::Object, &other)),
        }
    }
}
