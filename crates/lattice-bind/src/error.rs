//! Error types for Lattice Bind.
//!
//! Nothing in the binding engine is process-fatal. Path errors are rejected
//! when a binding is declared; everything else is reported to the caller
//! and the binding keeps its previous state.

use crate::value::ValueType;

/// The umbrella error type for binding operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindError {
    /// The path text could not be parsed.
    #[error("Invalid path: {0}")]
    Path(#[from] PathError),
    /// Writing through a path failed.
    #[error("Write failed: {0}")]
    Write(#[from] WriteError),
    /// A UI value could not be converted to the terminal's type.
    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConversionError),
    /// An accessor rejected a property operation.
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),
    /// A display format could not be applied.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

/// Errors produced when parsing a dotted property path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The path text was empty.
    #[error("path is empty")]
    Empty,
    /// A segment between two separators was empty (`a..b`, `.a`, `a.`).
    #[error("empty segment at index {index} in '{path}'")]
    EmptySegment {
        /// The full path text.
        path: String,
        /// Index of the offending segment.
        index: usize,
    },
    /// A segment contained whitespace.
    #[error("invalid segment '{segment}' in '{path}'")]
    InvalidSegment {
        /// The full path text.
        path: String,
        /// The offending segment.
        segment: String,
    },
}

/// Errors raised by a [`PropertyAccessor`](crate::PropertyAccessor).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// The property was not found.
    #[error("Property '{name}' not found")]
    NotFound {
        /// The name of the property that was not found.
        name: String,
    },
    /// The value does not fit the property's declared type.
    #[error("Property type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// The declared type.
        expected: ValueType,
        /// The kind of value that was supplied.
        got: &'static str,
    },
    /// The property is read-only and cannot be modified.
    #[error("Property '{name}' is read-only")]
    ReadOnly {
        /// The name of the read-only property.
        name: String,
    },
    /// The wrapped source object no longer exists.
    #[error("Wrapped source object has been dropped")]
    SourceDropped,
}

impl PropertyError {
    /// Create a `NotFound` error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a `ReadOnly` error.
    pub fn read_only(name: impl Into<String>) -> Self {
        Self::ReadOnly { name: name.into() }
    }

    /// Create a `TypeMismatch` error for `value` against `expected`.
    pub fn type_mismatch(expected: ValueType, value: &crate::Value) -> Self {
        Self::TypeMismatch {
            expected,
            got: value.kind_name(),
        }
    }
}

/// Errors produced when writing a value through a path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteError {
    /// An intermediate segment was null or missing, or the terminal
    /// property does not exist.
    #[error("path '{path}' is unresolvable")]
    Unresolvable {
        /// The path text.
        path: String,
    },
    /// The terminal property rejected the value's type.
    #[error("type mismatch writing '{path}': expected {expected}, got {got}")]
    TypeMismatch {
        /// The path text.
        path: String,
        /// The declared type.
        expected: ValueType,
        /// The kind of value that was supplied.
        got: &'static str,
    },
    /// The accessor rejected the write for another reason.
    #[error("write to '{path}' rejected: {source}")]
    Rejected {
        /// The path text.
        path: String,
        /// The accessor error.
        #[source]
        source: PropertyError,
    },
}

impl WriteError {
    /// Classify an accessor error raised while writing `path`.
    pub fn from_property(path: &str, err: PropertyError) -> Self {
        match err {
            PropertyError::NotFound { .. } | PropertyError::SourceDropped => Self::Unresolvable {
                path: path.to_string(),
            },
            PropertyError::TypeMismatch { expected, got } => Self::TypeMismatch {
                path: path.to_string(),
                expected,
                got,
            },
            other => Self::Rejected {
                path: path.to_string(),
                source: other,
            },
        }
    }
}

/// Errors produced by string-to-primitive conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// The text is not a valid literal of the target type.
    #[error("'{text}' is not a valid {target}")]
    Invalid {
        /// The rejected text.
        text: String,
        /// The target type.
        target: ValueType,
    },
    /// No string conversion exists for the target type.
    #[error("no string conversion for {0}")]
    Unsupported(ValueType),
}

/// Errors a listener may report from its callback.
///
/// A failing listener never stops delivery to the remaining listeners.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    /// Create a listener error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors produced while applying a printf-style display format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The conversion character is not supported.
    #[error("unknown format conversion '%{0}'")]
    UnknownConversion(char),
    /// The value cannot be rendered with this conversion.
    #[error("conversion '%{conversion}' cannot format a {got} value")]
    IllegalConversion {
        /// The conversion character.
        conversion: char,
        /// The kind of value supplied.
        got: &'static str,
    },
    /// The format consumes more than the single bound value.
    #[error("format string requires more than one argument")]
    MissingArgument,
    /// The format string ends in the middle of a specifier.
    #[error("format string ends inside a specifier")]
    Truncated,
    /// A width or precision exceeds the supported maximum.
    #[error("format width or precision {requested} exceeds the limit of {limit}")]
    WidthTooLarge {
        /// The width or precision in the format string.
        requested: usize,
        /// The largest accepted value.
        limit: usize,
    },
}

/// A specialized Result type for binding operations.
pub type Result<T> = std::result::Result<T, BindError>;
