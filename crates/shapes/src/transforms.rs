//! Per-service special cases.
//!
//! Cloud models are not always truthful about what an API accepts or returns. The
//! registry holds overrides keyed by `(namespace, shape-or-operation)` and is consulted
//! at three points:
//!
//! - shape construction: the raw definition is rewritten before it enters the model
//! - image construction: a candidate set is rewritten before it is offered as parameters
//! - manifestation: a response value is rewritten before it is stored as an entity
//!
//! A registry is an explicit value owned by one run. Absence of an entry is a no-op.

use crate::error::{Result, ShapeError};
use crate::schema::RawShape;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

pub type ShapeTransform = Arc<dyn Fn(RawShape) -> RawShape + Send + Sync>;
pub type ImageTransform = Arc<dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync>;
pub type ValueTransform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Member aliases declared for every structure of a namespace
pub const ANY_STRUCTURE: &str = "*";

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Clone, Default)]
pub struct TransformRegistry {
    shape_construction: HashMap<Key, Vec<ShapeTransform>>,
    image_construction: HashMap<Key, Vec<ImageTransform>>,
    manifestation: HashMap<Key, Vec<ValueTransform>>,
    member_aliases: HashMap<Key, BTreeMap<String, String>>,
    excluded_operations: HashMap<String, BTreeSet<String>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: &[TransformRule]) -> Result<Self> {
        let mut registry = Self::new();
        for rule in rules {
            registry.register(rule.clone())?;
        }
        Ok(registry)
    }

    pub fn on_shape<F>(&mut self, namespace: &str, shape: &str, transform: F) -> &mut Self
    where
        F: Fn(RawShape) -> RawShape + Send + Sync + 'static,
    {
        self.shape_construction
            .entry(key(namespace, shape))
            .or_default()
            .push(Arc::new(transform));
        self
    }

    pub fn on_image<F>(&mut self, namespace: &str, shape: &str, transform: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    {
        self.image_construction
            .entry(key(namespace, shape))
            .or_default()
            .push(Arc::new(transform));
        self
    }

    pub fn on_manifest<F>(&mut self, namespace: &str, shape: &str, transform: F) -> &mut Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.manifestation
            .entry(key(namespace, shape))
            .or_default()
            .push(Arc::new(transform));
        self
    }

    /// Replace the shape of `member` in `structure` (or in every structure with `"*"`) with
    /// an alias shape named `alias`
    pub fn alias_member(
        &mut self,
        namespace: &str,
        structure: &str,
        member: &str,
        alias: &str,
    ) -> &mut Self {
        self.member_aliases
            .entry(key(namespace, structure))
            .or_default()
            .insert(member.to_string(), alias.to_string());
        self
    }

    pub fn exclude_operation(&mut self, namespace: &str, operation: &str) -> &mut Self {
        self.excluded_operations
            .entry(namespace.to_string())
            .or_default()
            .insert(operation.to_string());
        self
    }

    pub fn register(&mut self, rule: TransformRule) -> Result<&mut Self> {
        match rule {
            TransformRule::StripEnum {
                namespace,
                shape,
                values,
            } => {
                self.on_shape(&namespace, &shape, move |mut raw| {
                    if let Some(literals) = raw.enum_values.as_mut() {
                        literals.retain(|literal| !values.contains(literal));
                    }
                    raw
                });
            }
            TransformRule::RestrictMembers {
                namespace,
                shape,
                keep,
            } => {
                self.on_shape(&namespace, &shape, move |mut raw| {
                    raw.members.retain(|name, _| keep.contains(name));
                    raw.required.retain(|name| keep.contains(name));
                    raw
                });
            }
            TransformRule::DropRequired {
                namespace,
                shape,
                members,
            } => {
                self.on_shape(&namespace, &shape, move |mut raw| {
                    raw.required.retain(|name| !members.contains(name));
                    raw
                });
            }
            TransformRule::AliasMember {
                namespace,
                structure,
                member,
                alias,
            } => {
                self.alias_member(&namespace, &structure, &member, &alias);
            }
            TransformRule::Partition {
                namespace,
                shape,
                size,
            } => {
                if size == 0 {
                    return Err(ShapeError::InvalidTransform(format!(
                        "partition size for {namespace}:{shape} must be > 0"
                    )));
                }
                self.on_image(&namespace, &shape, move |images| {
                    partition_lists(images, size)
                });
            }
            TransformRule::JsonEncode { namespace, shape } => {
                self.on_manifest(&namespace, &shape, json_encode);
            }
            TransformRule::ExcludeOperation {
                namespace,
                operation,
            } => {
                self.exclude_operation(&namespace, &operation);
            }
        }
        Ok(self)
    }

    pub fn apply_shape(&self, namespace: &str, shape: &str, raw: RawShape) -> RawShape {
        match self.shape_construction.get(&key(namespace, shape)) {
            Some(transforms) => transforms.iter().fold(raw, |acc, t| t(acc)),
            None => raw,
        }
    }

    pub fn apply_image(&self, namespace: &str, shape: &str, images: Vec<Value>) -> Vec<Value> {
        match self.image_construction.get(&key(namespace, shape)) {
            Some(transforms) => transforms.iter().fold(images, |acc, t| t(acc)),
            None => images,
        }
    }

    pub fn apply_manifest(&self, namespace: &str, shape: &str, value: Value) -> Value {
        match self.manifestation.get(&key(namespace, shape)) {
            Some(transforms) => transforms.iter().fold(value, |acc, t| t(acc)),
            None => value,
        }
    }

    pub fn has_image(&self, namespace: &str, shape: &str) -> bool {
        self.image_construction.contains_key(&key(namespace, shape))
    }

    pub fn has_manifest(&self, namespace: &str, shape: &str) -> bool {
        self.manifestation.contains_key(&key(namespace, shape))
    }

    /// Alias for a structure member; structure-specific entries win over `"*"`
    pub fn member_alias(&self, namespace: &str, structure: &str, member: &str) -> Option<&str> {
        self.member_aliases
            .get(&key(namespace, structure))
            .and_then(|aliases| aliases.get(member))
            .or_else(|| {
                self.member_aliases
                    .get(&key(namespace, ANY_STRUCTURE))
                    .and_then(|aliases| aliases.get(member))
            })
            .map(String::as_str)
    }

    pub fn is_excluded(&self, namespace: &str, operation: &str) -> bool {
        self.excluded_operations
            .get(namespace)
            .is_some_and(|ops| ops.contains(operation))
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("shape_construction", &self.shape_construction.len())
            .field("image_construction", &self.image_construction.len())
            .field("manifestation", &self.manifestation.len())
            .field("member_aliases", &self.member_aliases)
            .field("excluded_operations", &self.excluded_operations)
            .finish()
    }
}

/// Declarative form of the common special cases, loadable from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformRule {
    /// Remove enum literals the API rejects
    StripEnum {
        namespace: String,
        shape: String,
        values: Vec<String>,
    },
    /// Keep only the structure members the API actually accepts
    RestrictMembers {
        namespace: String,
        shape: String,
        keep: Vec<String>,
    },
    DropRequired {
        namespace: String,
        shape: String,
        members: Vec<String>,
    },
    AliasMember {
        namespace: String,
        #[serde(default = "any_structure")]
        structure: String,
        member: String,
        alias: String,
    },
    /// Split list candidates into chunks the API accepts
    Partition {
        namespace: String,
        shape: String,
        size: usize,
    },
    /// Store a structured value as its JSON string form
    JsonEncode { namespace: String, shape: String },
    ExcludeOperation { namespace: String, operation: String },
}

fn any_structure() -> String {
    ANY_STRUCTURE.to_string()
}

/// Split every list candidate into consecutive chunks of at most `size` elements
pub fn partition_lists(images: Vec<Value>, size: usize) -> Vec<Value> {
    images
        .into_iter()
        .flat_map(|image| match image {
            Value::Array(items) if items.len() > size => items
                .chunks(size)
                .map(|chunk| Value::Array(chunk.to_vec()))
                .collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

pub fn json_encode(value: Value) -> Value {
    match value {
        Value::String(_) => value,
        other => Value::String(other.to_string()),
    }
}
