use crate::error::{Result, ShapeError};
use crate::schema::RawShape;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// `(namespace, name)` identity of a shape, used as the key for domain lookups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId {
    pub namespace: String,
    pub name: String,
}

impl ShapeId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Terminal types without constraints worth modelling beyond bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeafKind {
    Blob,
    Boolean,
    Double,
    Float,
    Integer,
    Long,
    Timestamp,
}

impl LeafKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            LeafKind::Blob => "blob",
            LeafKind::Boolean => "boolean",
            LeafKind::Double => "double",
            LeafKind::Float => "float",
            LeafKind::Integer => "integer",
            LeafKind::Long => "long",
            LeafKind::Timestamp => "timestamp",
        }
    }
}

/// Constraints a string shape may declare
#[derive(Debug, Clone, Default)]
pub struct StringConstraints {
    /// Ordered literal set
    pub enum_values: Option<Vec<String>>,
    pub min_length: Option<f64>,
    pub max_length: Option<f64>,
    pub pattern: Option<String>,
    compiled: Option<Regex>,
}

impl StringConstraints {
    pub fn from_raw(raw: &RawShape) -> Self {
        let compiled = raw.pattern.as_deref().and_then(|pattern| {
            // Model patterns are written for Java; the ones Rust cannot compile are not enforced.
            match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    log::debug!("Ignoring uncompilable pattern {:?}: {}", pattern, err);
                    None
                }
            }
        });

        Self {
            enum_values: raw.enum_values.clone(),
            min_length: raw.min,
            max_length: raw.max,
            pattern: raw.pattern.clone(),
            compiled,
        }
    }

    /// Whether a candidate string fits the declared length and pattern
    pub fn admits(&self, value: &str) -> bool {
        let len = value.chars().count() as f64;
        if self.min_length.is_some_and(|min| len < min) {
            return false;
        }
        if self.max_length.is_some_and(|max| len > max) {
            return false;
        }
        match &self.compiled {
            Some(re) => re.is_match(value),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Closed set of shape variants
#[derive(Debug, Clone)]
pub enum ShapeKind {
    Leaf {
        kind: LeafKind,
        bounds: NumericBounds,
        timestamp_format: Option<String>,
    },
    String(StringConstraints),
    List,
    Map,
    Structure {
        required: BTreeSet<String>,
        /// Members the SDK fills automatically; never part of the canonical form
        idempotency_members: BTreeSet<String>,
    },
    Alias,
}

impl ShapeKind {
    /// Map a raw type tag onto a variant. Children are attached later as graph edges.
    pub fn from_raw(namespace: &str, shape: &str, raw: &RawShape) -> Result<Self> {
        let leaf = |kind| ShapeKind::Leaf {
            kind,
            bounds: NumericBounds {
                min: raw.min,
                max: raw.max,
            },
            timestamp_format: raw.timestamp_format.clone(),
        };

        let kind = match raw.type_name.as_str() {
            "blob" => leaf(LeafKind::Blob),
            "boolean" => leaf(LeafKind::Boolean),
            "double" => leaf(LeafKind::Double),
            "float" => leaf(LeafKind::Float),
            "integer" => leaf(LeafKind::Integer),
            "long" => leaf(LeafKind::Long),
            "timestamp" => leaf(LeafKind::Timestamp),
            "string" => ShapeKind::String(StringConstraints::from_raw(raw)),
            "list" => ShapeKind::List,
            "map" => ShapeKind::Map,
            "structure" => ShapeKind::Structure {
                required: raw.required.iter().cloned().collect(),
                idempotency_members: raw
                    .members
                    .iter()
                    .filter(|(_, member)| member.idempotency_token)
                    .map(|(name, _)| name.clone())
                    .collect(),
            },
            "alias" => ShapeKind::Alias,
            other => {
                return Err(ShapeError::UnknownShapeType {
                    namespace: namespace.to_string(),
                    shape: shape.to_string(),
                    type_name: other.to_string(),
                })
            }
        };

        Ok(kind)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeKind::Leaf { kind, .. } => kind.type_name(),
            ShapeKind::String(_) => "string",
            ShapeKind::List => "list",
            ShapeKind::Map => "map",
            ShapeKind::Structure { .. } => "structure",
            ShapeKind::Alias => "alias",
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, ShapeKind::Leaf { .. } | ShapeKind::String(_))
    }
}

/// Role of a child shape relative to its parent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeEdge {
    Member(String),
    Element,
    Key,
    Value,
    Target,
}

impl ShapeEdge {
    pub fn label(&self) -> String {
        match self {
            ShapeEdge::Member(name) => format!("member:{name}"),
            ShapeEdge::Element => "element".to_string(),
            ShapeEdge::Key => "key".to_string(),
            ShapeEdge::Value => "value".to_string(),
            ShapeEdge::Target => "target".to_string(),
        }
    }
}

/// Shallow identity from the type tag and immediate metadata only.
///
/// Used to memoize a shape while its children are still being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Silhouette {
    pub namespace: String,
    pub name: String,
    pub type_name: String,
    pub metadata: String,
}

impl Silhouette {
    pub fn of(namespace: &str, name: &str, raw: &RawShape) -> Self {
        let metadata = serde_json::json!({
            "enum": raw.enum_values,
            "min": raw.min,
            "max": raw.max,
            "pattern": raw.pattern,
            "timestampFormat": raw.timestamp_format,
            "required": raw.required,
        });

        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            type_name: raw.type_name.clone(),
            metadata: metadata.to_string(),
        }
    }

    pub fn descriptor(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.namespace, self.name, self.type_name, self.metadata
        )
    }
}

/// Fully resolved structural identity (hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalForm(pub String);

impl fmt::Display for CanonicalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node in the shape graph
#[derive(Debug, Clone)]
pub struct ShapeNode {
    pub id: ShapeId,
    pub kind: ShapeKind,
    pub silhouette: Silhouette,

    /// `None` while the node is still being built
    pub canonical: Option<CanonicalForm>,
}

impl ShapeNode {
    pub fn new(id: ShapeId, kind: ShapeKind, silhouette: Silhouette) -> Self {
        Self {
            id,
            kind,
            silhouette,
            canonical: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn is_complete(&self) -> bool {
        self.canonical.is_some()
    }

    pub fn required(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            ShapeKind::Structure { required, .. } => Some(required),
            _ => None,
        }
    }

    pub fn string_constraints(&self) -> Option<&StringConstraints> {
        match &self.kind {
            ShapeKind::String(constraints) => Some(constraints),
            _ => None,
        }
    }
}

pub(crate) fn hex_encode_lower(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
