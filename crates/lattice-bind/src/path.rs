//! Dotted property paths.
//!
//! A [`PropertyPath`] such as `"order.customer.name"` names a property by
//! walking from a root object through intermediate object-valued
//! properties. Resolution is lenient: a null or missing intermediate makes
//! the path *unresolvable* (`None`) and never panics or errors. Only
//! malformed path text is an error, and that is caught when the path is
//! parsed.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{PathError, WriteError};
use crate::object::ObjectRef;
use crate::value::{Value, ValueType};

/// A parsed, immutable dotted property path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    text: String,
    segments: Vec<String>,
}

impl PropertyPath {
    /// Parse dotted path text.
    ///
    /// # Errors
    ///
    /// - [`PathError::Empty`] for empty text.
    /// - [`PathError::EmptySegment`] for `a..b`, `.a` or `a.`.
    /// - [`PathError::InvalidSegment`] for segments containing whitespace.
    ///
    /// ```
    /// use lattice_bind::PropertyPath;
    ///
    /// let path = PropertyPath::parse("a.b.c").unwrap();
    /// assert_eq!(path.segments(), ["a", "b", "c"]);
    /// assert!(PropertyPath::parse("a..b").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self, PathError> {
        if text.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = Vec::new();
        for (index, segment) in text.split('.').enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    path: text.to_string(),
                    index,
                });
            }
            if segment.chars().any(char::is_whitespace) {
                return Err(PathError::InvalidSegment {
                    path: text.to_string(),
                    segment: segment.to_string(),
                });
            }
            segments.push(segment.to_string());
        }
        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// The original path text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The segments in walking order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// The final segment, naming the terminal property.
    pub fn terminal(&self) -> &str {
        // parse() guarantees at least one segment
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Walk every segment but the last.
    ///
    /// Returns `None` as soon as an intermediate value is null, missing or
    /// not an object.
    pub fn resolve(&self, root: &ObjectRef) -> Option<Resolved<'_>> {
        let (terminal, intermediates) = self.segments.split_last()?;
        let mut owner = Arc::clone(root);
        for segment in intermediates {
            owner = match owner.get(segment)? {
                Value::Object(next) => next,
                _ => return None,
            };
        }
        Some(Resolved {
            owner,
            property: terminal,
        })
    }

    /// Read the terminal value, or `None` if unresolvable.
    ///
    /// A resolvable path whose terminal property does not exist also reads
    /// as `None`.
    pub fn read(&self, root: &ObjectRef) -> Option<Value> {
        let resolved = self.resolve(root)?;
        resolved.owner.get(resolved.property)
    }

    /// Write the terminal value.
    pub fn write(&self, root: &ObjectRef, value: Value) -> Result<(), WriteError> {
        let resolved = self.resolve(root).ok_or_else(|| WriteError::Unresolvable {
            path: self.text.clone(),
        })?;
        tracing::trace!(target: "lattice_bind::path", path = %self.text, ?value, "writing through path");
        resolved
            .owner
            .set(resolved.property, value)
            .map_err(|err| WriteError::from_property(&self.text, err))
    }

    /// The declared type of the terminal property.
    pub fn terminal_type(&self, root: &ObjectRef) -> Option<ValueType> {
        let resolved = self.resolve(root)?;
        resolved.owner.type_of(resolved.property)
    }

    /// Every (node, segment) pair the walk reaches, terminal owner included.
    ///
    /// The walk stops at the first null, missing or non-object intermediate;
    /// [`Chain::is_complete`] reports whether it reached the terminal owner.
    pub fn chain(&self, root: &ObjectRef) -> Chain {
        let mut links = Vec::with_capacity(self.segments.len());
        let mut node = Arc::clone(root);
        let last = self.segments.len().saturating_sub(1);
        for (index, segment) in self.segments.iter().enumerate() {
            links.push(ChainLink {
                node: Arc::clone(&node),
                segment: segment.clone(),
            });
            if index == last {
                return Chain {
                    links,
                    complete: true,
                };
            }
            node = match node.get(segment) {
                Some(Value::Object(next)) => next,
                _ => break,
            };
        }
        Chain {
            links,
            complete: false,
        }
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for PropertyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A resolved path: the object owning the terminal property.
pub struct Resolved<'p> {
    /// The object that holds the terminal property.
    pub owner: ObjectRef,
    /// The terminal property name.
    pub property: &'p str,
}

impl fmt::Debug for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("owner", &self.owner.type_name())
            .field("property", &self.property)
            .finish()
    }
}

/// One step of a path walk.
#[derive(Clone)]
pub struct ChainLink {
    /// The object the segment is read from.
    pub node: ObjectRef,
    /// The property read from `node`.
    pub segment: String,
}

impl fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node.type_name(), self.segment)
    }
}

/// The nodes a path walks through from a given root.
#[derive(Debug, Clone)]
pub struct Chain {
    links: Vec<ChainLink>,
    complete: bool,
}

impl Chain {
    /// The links in walking order.
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    /// Whether the walk reached the terminal owner.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the chain has no links.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

impl IntoIterator for Chain {
    type Item = ChainLink;
    type IntoIter = std::vec::IntoIter<ChainLink>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.into_iter()
    }
}

/// Parse dotted path text. See [`PropertyPath::parse`].
pub fn parse(text: &str) -> Result<PropertyPath, PathError> {
    PropertyPath::parse(text)
}

/// Resolve `path` against `root`. See [`PropertyPath::resolve`].
pub fn resolve<'p>(root: &ObjectRef, path: &'p PropertyPath) -> Option<Resolved<'p>> {
    path.resolve(root)
}

/// Read `path` from `root`. See [`PropertyPath::read`].
pub fn read(root: &ObjectRef, path: &PropertyPath) -> Option<Value> {
    path.read(root)
}

/// Write `value` to `path` under `root`. See [`PropertyPath::write`].
pub fn write(root: &ObjectRef, path: &PropertyPath, value: Value) -> Result<(), WriteError> {
    path.write(root, value)
}

/// Terminal type of `path` under `root`. See [`PropertyPath::terminal_type`].
pub fn terminal_type(root: &ObjectRef, path: &PropertyPath) -> Option<ValueType> {
    path.terminal_type(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DynamicObject;

    fn graph() -> ObjectRef {
        let c = Arc::new(DynamicObject::new().with("c", 3));
        let b = Arc::new(DynamicObject::new().with("b", c));
        Arc::new(
            DynamicObject::new()
                .with("a", b)
                .with_typed("empty", ValueType::Object, Value::Null)
                .with("n", 1),
        )
    }

    #[test]
    fn test_parse() {
        let path = PropertyPath::parse("a.b.c").unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.terminal(), "c");
        assert_eq!(path.to_string(), "a.b.c");
        assert_eq!("x".parse::<PropertyPath>().unwrap().segments(), ["x"]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(PropertyPath::parse(""), Err(PathError::Empty));
        assert_eq!(
            PropertyPath::parse("a..b"),
            Err(PathError::EmptySegment {
                path: "a..b".into(),
                index: 1
            })
        );
        assert!(matches!(PropertyPath::parse(".a"), Err(PathError::EmptySegment { index: 0, .. })));
        assert!(matches!(PropertyPath::parse("a."), Err(PathError::EmptySegment { index: 1, .. })));
        assert!(matches!(PropertyPath::parse("a b"), Err(PathError::InvalidSegment { .. })));
    }

    #[test]
    fn test_read_and_terminal_type() {
        let root = graph();
        let path = parse("a.b.c").unwrap();

        assert_eq!(read(&root, &path), Some(Value::Int(3)));
        assert_eq!(terminal_type(&root, &path), Some(ValueType::Int));
        assert_eq!(resolve(&root, &path).unwrap().property, "c");
    }

    #[test]
    fn test_null_intermediate_is_unresolvable() {
        let root = graph();
        let path = parse("empty.x").unwrap();

        assert!(path.resolve(&root).is_none());
        assert!(path.read(&root).is_none());
        assert_eq!(
            path.write(&root, Value::Int(1)),
            Err(WriteError::Unresolvable {
                path: "empty.x".into()
            })
        );
    }

    #[test]
    fn test_scalar_and_missing_intermediates() {
        let root = graph();
        assert!(parse("n.x").unwrap().resolve(&root).is_none());
        assert!(parse("missing.x").unwrap().resolve(&root).is_none());
        assert!(parse("missing").unwrap().read(&root).is_none());
    }

    #[test]
    fn test_write_through_path() {
        let root = graph();
        let path = parse("a.b.c").unwrap();

        path.write(&root, Value::Int(9)).unwrap();
        assert_eq!(path.read(&root), Some(Value::Int(9)));

        assert!(matches!(
            path.write(&root, Value::Str("x".into())),
            Err(WriteError::TypeMismatch { .. })
        ));
        assert!(matches!(
            parse("a.nope").unwrap().write(&root, Value::Int(1)),
            Err(WriteError::Unresolvable { .. })
        ));
    }

    #[test]
    fn test_chain() {
        let root = graph();

        let full = parse("a.b.c").unwrap().chain(&root);
        assert!(full.is_complete());
        let segments: Vec<_> = full.links().iter().map(|l| l.segment.as_str()).collect();
        assert_eq!(segments, ["a", "b", "c"]);

        let broken = parse("empty.x.y").unwrap().chain(&root);
        assert!(!broken.is_complete());
        assert_eq!(broken.len(), 1);
    }
}
