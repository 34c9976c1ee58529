//! Candidate parameter construction.
//!
//! Every shape variant knows how to offer values from the current scope:
//!
//! - leaf / string: known values; strings fall back to their enum literals
//! - alias: values known under the alias, else the wrapped shape's candidates
//! - list: one candidate holding every known element value (never every sub-list)
//! - map: known values for the map itself
//! - structure: labelled cross-product of the members that have candidates
//!
//! Registered image transforms rewrite each shape's candidate set before it is used.

use grump_domain::Scope;
use grump_shapes::{NodeIndex, Operation, ShapeId, ShapeKind, ShapeModel, TransformRegistry};
use itertools::Itertools;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Lazily produced parameter maps
pub type Candidates = Box<dyn Iterator<Item = Value> + Send>;

/// A structure's required members cannot all be built from what is currently known.
///
/// Recoverable: the scheduler retries the operation in a later pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsufficientMembers {
    pub shape: ShapeId,
    pub required: BTreeSet<String>,
    pub available: BTreeSet<String>,
}

impl InsufficientMembers {
    pub fn missing(&self) -> BTreeSet<&String> {
        self.required.difference(&self.available).collect()
    }
}

impl fmt::Display for InsufficientMembers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "insufficient members for {}: missing {:?}",
            self.shape,
            self.missing()
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstructOptions {
    /// Offer `[]` in addition to the list of known element values
    pub include_empty_list: bool,
    /// Cap on parameter maps produced for one operation
    pub max_candidates: Option<usize>,
}

pub struct Constructor<'a> {
    model: &'a ShapeModel,
    transforms: &'a TransformRegistry,
    options: ConstructOptions,
}

impl<'a> Constructor<'a> {
    pub fn new(model: &'a ShapeModel, transforms: &'a TransformRegistry) -> Self {
        Self {
            model,
            transforms,
            options: ConstructOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConstructOptions) -> Self {
        self.options = options;
        self
    }

    /// Parameter maps for `operation`.
    ///
    /// Pagination-managed members are never constructed. When the input has no required
    /// members the empty map is offered too, so a starter always yields at least one call.
    pub fn parameters(
        &self,
        operation: &Operation,
        scope: &Scope<'_>,
    ) -> Result<Candidates, InsufficientMembers> {
        let Some(input) = operation.input else {
            return Ok(Box::new(std::iter::once(Value::Object(Map::new()))));
        };

        let mut visiting = vec![input];
        let skip = |member: &str| operation.consumes(member);
        let (pools, required) = self.member_pools(input, &skip, scope, &mut visiting)?;

        let mut candidates = labelled_product(pools);
        if required.is_empty() {
            candidates = Box::new(candidates.chain(std::iter::once(Value::Object(Map::new()))));
        }

        let id = self.model.id(input);
        if self.transforms.has_image(&id.namespace, &id.name) {
            let images = self
                .transforms
                .apply_image(&id.namespace, &id.name, candidates.collect());
            candidates = Box::new(images.into_iter());
        }

        Ok(match self.options.max_candidates {
            Some(limit) => Box::new(candidates.take(limit)),
            None => candidates,
        })
    }

    /// Candidate values for any shape
    pub fn construct(&self, shape: NodeIndex, scope: &Scope<'_>) -> Vec<Value> {
        self.candidates(shape, scope, &mut Vec::new())
    }

    fn candidates(
        &self,
        idx: NodeIndex,
        scope: &Scope<'_>,
        visiting: &mut Vec<NodeIndex>,
    ) -> Vec<Value> {
        // A shape already being constructed further up contributes nothing
        if visiting.contains(&idx) {
            return Vec::new();
        }
        visiting.push(idx);

        let shape = self.model.shape(idx);
        let id = &shape.id;
        let values = match &shape.kind {
            ShapeKind::Leaf { .. } | ShapeKind::Map => scope.images(id, None),
            ShapeKind::String(constraints) => {
                let mut known = scope.images(id, None);
                if known.is_empty() {
                    if let Some(literals) = &constraints.enum_values {
                        known = literals.iter().cloned().map(Value::String).collect();
                    }
                }
                known.retain(|value| value.as_str().map_or(true, |s| constraints.admits(s)));
                known
            }
            ShapeKind::Alias => {
                let known = scope.images(id, None);
                match self.model.target(idx) {
                    Some(target) if known.is_empty() => self.candidates(target, scope, visiting),
                    _ => known,
                }
            }
            ShapeKind::List => match self.model.element(idx) {
                Some(element) => {
                    let items = self.candidates(element, scope, visiting);
                    let mut lists = Vec::new();
                    if !items.is_empty() {
                        lists.push(Value::Array(items));
                    }
                    if self.options.include_empty_list {
                        lists.push(Value::Array(Vec::new()));
                    }
                    lists
                }
                None => Vec::new(),
            },
            ShapeKind::Structure { .. } => {
                match self.member_pools(idx, &|_: &str| false, scope, visiting) {
                    Ok((pools, _)) => labelled_product(pools).collect(),
                    Err(insufficient) => {
                        log::trace!("{insufficient}");
                        Vec::new()
                    }
                }
            }
        };

        visiting.pop();
        self.transforms.apply_image(&id.namespace, &id.name, values)
    }

    /// Non-empty candidate pools per member, after checking the required members.
    ///
    /// Members without candidates are dropped. Idempotency tokens are left to the SDK
    /// unless the API marks them required.
    fn member_pools(
        &self,
        idx: NodeIndex,
        skip: &dyn Fn(&str) -> bool,
        scope: &Scope<'_>,
        visiting: &mut Vec<NodeIndex>,
    ) -> Result<(Vec<(String, Vec<Value>)>, BTreeSet<String>), InsufficientMembers> {
        let shape = self.model.shape(idx);
        let (required, idempotent) = match &shape.kind {
            ShapeKind::Structure {
                required,
                idempotency_members,
            } => (required, idempotency_members),
            _ => return Ok((Vec::new(), BTreeSet::new())),
        };

        let required: BTreeSet<String> = required
            .iter()
            .filter(|member| !skip(member.as_str()))
            .cloned()
            .collect();

        let mut pools = Vec::new();
        for (member, member_shape) in self.model.members(idx) {
            if skip(member.as_str()) {
                continue;
            }
            if idempotent.contains(&member) && !required.contains(&member) {
                continue;
            }
            let values = self.candidates(member_shape, scope, visiting);
            if !values.is_empty() {
                pools.push((member, values));
            }
        }

        let available: BTreeSet<String> = pools.iter().map(|(name, _)| name.clone()).collect();
        if !required.is_subset(&available) {
            return Err(InsufficientMembers {
                shape: shape.id.clone(),
                required,
                available,
            });
        }

        log::trace!(
            "{}: {} member pool(s), sizes {:?}",
            shape.id,
            pools.len(),
            pools.iter().map(|(_, v)| v.len()).collect::<Vec<_>>()
        );
        Ok((pools, required))
    }
}

/// Cartesian product of member pools as parameter maps keyed by member name
fn labelled_product(pools: Vec<(String, Vec<Value>)>) -> Candidates {
    if pools.is_empty() {
        return Box::new(std::iter::empty());
    }

    let (names, values): (Vec<String>, Vec<Vec<Value>>) = pools.into_iter().unzip();
    Box::new(
        values
            .into_iter()
            .multi_cartesian_product()
            .map(move |combination| {
                Value::Object(names.iter().cloned().zip(combination).collect())
            }),
    )
}
