//! Display formats for bound values.
//!
//! A binding may render its value through a printf-style format before
//! handing text to the UI. The format itself can be a literal, the value
//! of another property path, or a resource id looked up through
//! [`FormatResources`]. Because a path or resource can resolve later than
//! the value it formats, the format moves through [`FormatState`]:
//!
//! ```text
//! NoFormat
//! FormatPending(source) --resolved--> FormatApplied { source, format }
//!                       <--reset----- (root swap, source unresolvable)
//! ```
//!
//! While pending, values render raw. Formats only affect displayed text;
//! the model always receives raw values.

use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::FormatError;
use crate::object::ObjectRef;
use crate::path::PropertyPath;
use crate::value::Value;

/// Looks up format strings by resource id.
pub trait FormatResources: Send + Sync {
    /// The format string for `id`, if one exists.
    fn format_string(&self, id: i64) -> Option<String>;
}

impl<F> FormatResources for F
where
    F: Fn(i64) -> Option<String> + Send + Sync,
{
    fn format_string(&self, id: i64) -> Option<String> {
        self(id)
    }
}

impl FormatResources for HashMap<i64, String> {
    fn format_string(&self, id: i64) -> Option<String> {
        self.get(&id).cloned()
    }
}

/// Where a binding's display format comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSource {
    /// A fixed format string.
    Literal(String),
    /// A property path whose value is a format string or a resource id.
    Path(PropertyPath),
    /// A resource id.
    Resource(i64),
}

impl FormatSource {
    /// The property path, for path-backed formats.
    pub fn path(&self) -> Option<&PropertyPath> {
        match self {
            Self::Path(path) => Some(path),
            _ => None,
        }
    }
}

/// Resolve a format source to a format string.
///
/// A path whose value is a string yields that string; an integer value is
/// treated as a resource id. Returns `None` while the source cannot be
/// resolved.
pub fn resolve_source(
    source: &FormatSource,
    root: Option<&ObjectRef>,
    resources: Option<&dyn FormatResources>,
) -> Option<String> {
    match source {
        FormatSource::Literal(format) => Some(format.clone()),
        FormatSource::Resource(id) => resources?.format_string(*id),
        FormatSource::Path(path) => match path.read(root?)? {
            Value::Str(format) => Some(format),
            Value::Byte(id) => resources?.format_string(id.into()),
            Value::Short(id) => resources?.format_string(id.into()),
            Value::Int(id) => resources?.format_string(id.into()),
            Value::Long(id) => resources?.format_string(id),
            _ => None,
        },
    }
}

/// The display-format state of one binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FormatState {
    /// The binding renders values as-is.
    #[default]
    NoFormat,
    /// A format was declared but has not resolved yet.
    FormatPending(FormatSource),
    /// The format is resolved and used for rendering.
    FormatApplied {
        /// Where the format came from.
        source: FormatSource,
        /// The resolved format string.
        format: String,
    },
}

impl FormatState {
    /// Initial state for an optional source. Literals apply immediately.
    pub fn new(source: Option<FormatSource>) -> Self {
        match source {
            None => Self::NoFormat,
            Some(FormatSource::Literal(format)) => Self::FormatApplied {
                source: FormatSource::Literal(format.clone()),
                format,
            },
            Some(source) => Self::FormatPending(source),
        }
    }

    /// The declared source, if any.
    pub fn source(&self) -> Option<&FormatSource> {
        match self {
            Self::NoFormat => None,
            Self::FormatPending(source) | Self::FormatApplied { source, .. } => Some(source),
        }
    }

    /// The resolved format string, if applied.
    pub fn format(&self) -> Option<&str> {
        match self {
            Self::FormatApplied { format, .. } => Some(format),
            _ => None,
        }
    }

    /// Whether a declared format is still waiting to resolve.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::FormatPending(_))
    }

    /// Feed the latest resolution of the source.
    ///
    /// Returns `true` if the applied format changed, in which case the
    /// current value should be re-rendered.
    pub fn update(&mut self, resolved: Option<String>) -> bool {
        match (std::mem::take(self), resolved) {
            (Self::NoFormat, _) => false,
            (Self::FormatPending(source), Some(format)) => {
                *self = Self::FormatApplied { source, format };
                true
            }
            (Self::FormatPending(source), None) => {
                *self = Self::FormatPending(source);
                false
            }
            (Self::FormatApplied { source, format }, Some(next)) => {
                let changed = format != next;
                *self = Self::FormatApplied { source, format: next };
                changed
            }
            (Self::FormatApplied { source, format }, None) => {
                if matches!(source, FormatSource::Literal(_)) {
                    *self = Self::FormatApplied { source, format };
                    false
                } else {
                    *self = Self::FormatPending(source);
                    true
                }
            }
        }
    }

    /// Return an applied path or resource format to pending.
    ///
    /// Used when the root changes and the format must resolve again.
    pub fn reset(&mut self) {
        if let Self::FormatApplied { source, .. } = self {
            if !matches!(source, FormatSource::Literal(_)) {
                *self = Self::FormatPending(source.clone());
            }
        }
    }

    /// Render `value` as UI text.
    ///
    /// Null renders as an empty string. A format that cannot be applied to
    /// the value is logged and the value renders raw.
    pub fn render(&self, value: &Value) -> String {
        if value.is_null() {
            return String::new();
        }
        match self.format() {
            Some(format) => apply_format(format, value).unwrap_or_else(|err| {
                tracing::warn!(target: "lattice_bind::format", format, ?value, error = %err, "format failed, rendering raw");
                value.to_string()
            }),
            None => value.to_string(),
        }
    }
}

/// Largest width or precision [`apply_format`] accepts.
pub const MAX_FORMAT_WIDTH: usize = 1024;

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

impl Spec {
    fn parse(chars: &mut Peekable<Chars<'_>>) -> (Self, Option<char>) {
        let mut spec = Spec::default();
        while let Some(&c) = chars.peek() {
            match c {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = digits(chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(digits(chars).unwrap_or(0));
        }
        (spec, chars.next())
    }

    fn check_limits(&self) -> Result<(), FormatError> {
        let requested = self.width.unwrap_or(0).max(self.precision.unwrap_or(0));
        if requested > MAX_FORMAT_WIDTH {
            return Err(FormatError::WidthTooLarge {
                requested,
                limit: MAX_FORMAT_WIDTH,
            });
        }
        Ok(())
    }

    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        }
    }

    fn pad(&self, sign: &str, body: &str, numeric: bool) -> String {
        let len = sign.chars().count() + body.chars().count();
        let fill = self.width.unwrap_or(0).saturating_sub(len);
        if fill == 0 {
            return format!("{sign}{body}");
        }
        if self.left {
            format!("{sign}{body}{}", " ".repeat(fill))
        } else if self.zero && numeric {
            format!("{sign}{}{body}", "0".repeat(fill))
        } else {
            format!("{}{sign}{body}", " ".repeat(fill))
        }
    }
}

fn digits(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    let mut result: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        result = Some(result.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    result
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Byte(v) => Some((*v).into()),
        Value::Short(v) => Some((*v).into()),
        Value::Int(v) => Some((*v).into()),
        Value::Long(v) => Some(*v),
        _ => None,
    }
}

fn hex(value: &Value) -> Option<String> {
    // Negative values print as two's complement at their own width.
    match value {
        Value::Byte(v) => Some(format!("{v:x}")),
        Value::Short(v) => Some(format!("{v:x}")),
        Value::Int(v) => Some(format!("{v:x}")),
        Value::Long(v) => Some(format!("{v:x}")),
        _ => None,
    }
}

/// Apply a printf-style format to a single value.
///
/// Supported conversions: `%s %S %d %x %X %f %b %c %% %n`, with the
/// flags `- 0 + space`, a width, and a precision. The format may consume
/// the value at most once. Widths and precisions above
/// [`MAX_FORMAT_WIDTH`] are rejected.
///
/// ```
/// use lattice_bind::format::apply_format;
/// use lattice_bind::Value;
///
/// assert_eq!(apply_format("%.2f kg", &Value::Double(1.5)).unwrap(), "1.50 kg");
/// assert_eq!(apply_format("[%5d]", &Value::Int(42)).unwrap(), "[   42]");
/// ```
pub fn apply_format(format: &str, value: &Value) -> Result<String, FormatError> {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars().peekable();
    let mut consumed = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let (spec, conversion) = Spec::parse(&mut chars);
        let conversion = conversion.ok_or(FormatError::Truncated)?;
        spec.check_limits()?;
        match conversion {
            '%' => {
                out.push_str(&spec.pad("", "%", false));
                continue;
            }
            'n' => {
                out.push('\n');
                continue;
            }
            _ => {}
        }
        if consumed {
            return Err(FormatError::MissingArgument);
        }
        consumed = true;

        let illegal = || FormatError::IllegalConversion {
            conversion,
            got: value.kind_name(),
        };
        let rendered = match conversion {
            's' | 'S' => {
                let text = if value.is_null() { "null".to_string() } else { value.to_string() };
                let mut text = match spec.precision {
                    Some(max) => text.chars().take(max).collect(),
                    None => text,
                };
                if conversion == 'S' {
                    text = text.to_uppercase();
                }
                spec.pad("", &text, false)
            }
            'b' | 'B' => {
                let truth = match value {
                    Value::Null => false,
                    Value::Bool(b) => *b,
                    _ => true,
                };
                let text = if conversion == 'B' {
                    truth.to_string().to_uppercase()
                } else {
                    truth.to_string()
                };
                spec.pad("", &text, false)
            }
            'c' => match value {
                Value::Char(ch) => spec.pad("", &ch.to_string(), false),
                _ => return Err(illegal()),
            },
            'd' => {
                let n = integer(value).ok_or_else(illegal)?;
                spec.pad(spec.sign(n < 0), &n.unsigned_abs().to_string(), true)
            }
            'x' | 'X' => {
                let text = hex(value).ok_or_else(illegal)?;
                let text = if conversion == 'X' { text.to_uppercase() } else { text };
                spec.pad("", &text, true)
            }
            'f' => {
                let n = match value {
                    Value::Float(v) => f64::from(*v),
                    Value::Double(v) => *v,
                    _ => return Err(illegal()),
                };
                let precision = spec.precision.unwrap_or(6);
                let body = format!("{:.*}", precision, n.abs());
                let negative = n.is_sign_negative() && n != 0.0;
                spec.pad(spec.sign(negative), &body, true)
            }
            other => return Err(FormatError::UnknownConversion(other)),
        };
        out.push_str(&rendered);
    }

    Ok(out)
}

impl fmt::Display for FormatSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(format) => write!(f, "{format:?}"),
            Self::Path(path) => write!(f, "@{path}"),
            Self::Resource(id) => write!(f, "#{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DynamicObject;
    use std::sync::Arc;

    #[test]
    fn test_basic_conversions() {
        assert_eq!(apply_format("Hello %s!", &Value::from("Ada")).unwrap(), "Hello Ada!");
        assert_eq!(apply_format("%d items", &Value::Int(3)).unwrap(), "3 items");
        assert_eq!(apply_format("%S", &Value::from("abc")).unwrap(), "ABC");
        assert_eq!(apply_format("%c", &Value::Char('z')).unwrap(), "z");
        assert_eq!(apply_format("%b", &Value::Bool(false)).unwrap(), "false");
        assert_eq!(apply_format("100%%", &Value::Int(1)).unwrap(), "100%");
    }

    #[test]
    fn test_width_flags_precision() {
        assert_eq!(apply_format("%05d", &Value::Int(-42)).unwrap(), "-0042");
        assert_eq!(apply_format("%+d", &Value::Int(7)).unwrap(), "+7");
        assert_eq!(apply_format("%-4s|", &Value::from("ab")).unwrap(), "ab  |");
        assert_eq!(apply_format("%.3s", &Value::from("abcdef")).unwrap(), "abc");
        assert_eq!(apply_format("%.2f", &Value::Float(2.5)).unwrap(), "2.50");
        assert_eq!(apply_format("%f", &Value::Double(1.0)).unwrap(), "1.000000");
        assert_eq!(apply_format("%x", &Value::Int(255)).unwrap(), "ff");
        assert_eq!(apply_format("%X", &Value::Int(-1)).unwrap(), "FFFFFFFF");
    }

    #[test]
    fn test_format_errors() {
        assert_eq!(
            apply_format("%d", &Value::from("x")),
            Err(FormatError::IllegalConversion {
                conversion: 'd',
                got: "String"
            })
        );
        assert_eq!(apply_format("%q", &Value::Int(1)), Err(FormatError::UnknownConversion('q')));
        assert_eq!(apply_format("%s %s", &Value::Int(1)), Err(FormatError::MissingArgument));
        assert_eq!(apply_format("abc %", &Value::Int(1)), Err(FormatError::Truncated));
    }

    #[test]
    fn test_oversized_width_is_rejected() {
        assert_eq!(
            apply_format("%99999999999999999999999d", &Value::Int(5)),
            Err(FormatError::WidthTooLarge {
                requested: usize::MAX,
                limit: MAX_FORMAT_WIDTH
            })
        );
        assert!(matches!(
            apply_format("%.5000f", &Value::Double(1.0)),
            Err(FormatError::WidthTooLarge { requested: 5000, .. })
        ));
        assert_eq!(apply_format("%1024d", &Value::Int(5)).unwrap().len(), 1024);

        let state = FormatState::new(Some(FormatSource::Literal("%99999999999999999999999d".into())));
        assert_eq!(state.render(&Value::Int(5)), "5");
    }

    #[test]
    fn test_state_transitions() {
        let path = PropertyPath::parse("fmt").unwrap();
        let mut state = FormatState::new(Some(FormatSource::Path(path)));
        assert!(state.is_pending());
        assert_eq!(state.render(&Value::Int(5)), "5");

        assert!(!state.update(None));
        assert!(state.update(Some("n=%d".into())));
        assert_eq!(state.render(&Value::Int(5)), "n=5");
        assert!(!state.update(Some("n=%d".into())));

        state.reset();
        assert!(state.is_pending());
        assert_eq!(state.render(&Value::Int(5)), "5");
    }

    #[test]
    fn test_literal_applies_immediately_and_survives_reset() {
        let mut state = FormatState::new(Some(FormatSource::Literal("<%s>".into())));
        assert_eq!(state.format(), Some("<%s>"));

        state.reset();
        assert!(!state.update(None));
        assert_eq!(state.render(&Value::from("x")), "<x>");
    }

    #[test]
    fn test_render_null_and_bad_format() {
        let state = FormatState::new(Some(FormatSource::Literal("%d".into())));
        assert_eq!(state.render(&Value::Null), "");
        assert_eq!(state.render(&Value::from("raw")), "raw");
    }

    #[test]
    fn test_resolve_source() {
        let mut resources = HashMap::new();
        resources.insert(7_i64, "R:%s".to_string());
        let root: ObjectRef = Arc::new(DynamicObject::new().with("fmt", "P:%s").with("res", 7));

        let path = |p: &str| FormatSource::Path(PropertyPath::parse(p).unwrap());

        assert_eq!(resolve_source(&path("fmt"), Some(&root), None), Some("P:%s".into()));
        assert_eq!(
            resolve_source(&path("res"), Some(&root), Some(&resources)),
            Some("R:%s".into())
        );
        assert_eq!(resolve_source(&path("res"), Some(&root), None), None);
        assert_eq!(resolve_source(&path("fmt"), None, None), None);
        assert_eq!(
            resolve_source(&FormatSource::Resource(7), None, Some(&resources)),
            Some("R:%s".into())
        );
    }
}
