use crate::entity::Entity;
use crate::hash::ValueHash;
use crate::lineage::Lineage;
use grump_shapes::ShapeId;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Optional restriction of `images` by provenance
pub type LineageFilter<'f> = &'f dyn Fn(&Lineage) -> bool;

/// Entities observed for one shape, in discovery order
#[derive(Debug, Clone, Default)]
struct ShapeEntities {
    entities: Vec<Entity>,
    scalars: HashMap<ValueHash, usize>,
}

impl ShapeEntities {
    fn manifest(&mut self, entity: Entity) -> (&Entity, bool) {
        if entity.is_scalar() {
            if let Some(&pos) = self.scalars.get(&entity.hash) {
                return (&self.entities[pos], false);
            }
            self.scalars.insert(entity.hash, self.entities.len());
        }
        self.entities.push(entity);
        let pos = self.entities.len() - 1;
        (&self.entities[pos], true)
    }
}

/// A dimension of discovered values.
///
/// Child dimensions are keyed by the structural hash of the entity that spawned them
/// (a region name, a service namespace, ...). Entities are stored per shape identity
/// and are only visible from the dimension they were manifested in; values that must be
/// visible everywhere live in the universal dimension consulted through [`Scope`].
#[derive(Debug, Clone, Default)]
pub struct Domain {
    key: Option<Value>,
    dimensions: BTreeMap<ValueHash, Domain>,
    entities: BTreeMap<ShapeId, ShapeEntities>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty dimension spawned at `key`
    pub fn spawned(key: Value) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    /// The entity that spawned this dimension; `None` for a root
    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    /// Child dimension at `key`, created on first use
    pub fn dimension(&mut self, key: &Value) -> &mut Domain {
        self.dimensions
            .entry(ValueHash::of(key))
            .or_insert_with(|| Domain::spawned(key.clone()))
    }

    pub fn get_dimension(&self, key: &Value) -> Option<&Domain> {
        self.dimensions.get(&ValueHash::of(key))
    }

    /// Child dimensions in hash order
    pub fn dimensions(&self) -> impl Iterator<Item = &Domain> {
        self.dimensions.values()
    }

    /// Register a discovered value. Scalars equal by structural hash are stored once;
    /// the existing entity (and its original lineage) is returned for repeats.
    pub fn manifest(&mut self, shape: &ShapeId, value: Value, lineage: Lineage) -> &Entity {
        self.manifest_entity(shape, Entity::new(value, lineage)).0
    }

    fn manifest_entity(&mut self, shape: &ShapeId, entity: Entity) -> (&Entity, bool) {
        let stored = self.entities.entry(shape.clone()).or_default();
        let (entity, inserted) = stored.manifest(entity);
        if inserted {
            log::trace!("manifest {shape}: {}", entity.value);
        }
        (entity, inserted)
    }

    /// Known values for `shape` in this dimension only
    pub fn images(&self, shape: &ShapeId, filter: Option<LineageFilter<'_>>) -> Vec<Value> {
        self.entities(shape)
            .iter()
            .filter(|entity| filter.map_or(true, |keep| keep(&entity.lineage)))
            .map(|entity| entity.value.clone())
            .collect()
    }

    pub fn entities(&self, shape: &ShapeId) -> &[Entity] {
        self.entities
            .get(shape)
            .map(|stored| stored.entities.as_slice())
            .unwrap_or(&[])
    }

    /// Number of values known for `shape` in this dimension
    pub fn count(&self, shape: &ShapeId) -> usize {
        self.entities(shape).len()
    }

    /// Entity count per shape in this dimension, children excluded
    pub fn entity_counts(&self) -> BTreeMap<String, usize> {
        self.entities
            .iter()
            .map(|(shape, stored)| (shape.to_string(), stored.entities.len()))
            .collect()
    }

    /// Entities here and in every descendant dimension
    pub fn total_entities(&self) -> usize {
        let own: usize = self.entities.values().map(|s| s.entities.len()).sum();
        own + self
            .dimensions
            .values()
            .map(Domain::total_entities)
            .sum::<usize>()
    }

    /// Fold another domain into this one, dimension by dimension.
    ///
    /// Used to reattach a subtree that was populated independently. Scalar dedup still
    /// applies, so merging a domain into itself is a no-op for leaf values.
    pub fn absorb(&mut self, other: Domain) {
        for (shape, stored) in other.entities {
            for entity in stored.entities {
                self.manifest_entity(&shape, entity);
            }
        }
        for (hash, child) in other.dimensions {
            match self.dimensions.get_mut(&hash) {
                Some(existing) => existing.absorb(child),
                None => {
                    self.dimensions.insert(hash, child);
                }
            }
        }
    }

    pub fn snapshot(&self) -> DomainSnapshot {
        DomainSnapshot {
            key: self.key.clone(),
            entities: self
                .entities
                .iter()
                .map(|(shape, stored)| (shape.to_string(), stored.entities.clone()))
                .collect(),
            dimensions: self.dimensions.values().map(Domain::snapshot).collect(),
        }
    }
}

/// Serializable view of a domain tree
#[derive(Debug, Clone, Serialize)]
pub struct DomainSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub entities: BTreeMap<String, Vec<Entity>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<DomainSnapshot>,
}

/// A writable dimension paired with the read-only universal dimension.
///
/// Writes go to the local dimension. Lookups see local values first, then universal ones.
pub struct Scope<'a> {
    universal: &'a Domain,
    local: &'a mut Domain,
}

impl<'a> Scope<'a> {
    pub fn new(universal: &'a Domain, local: &'a mut Domain) -> Self {
        Self { universal, local }
    }

    /// Child scope at `key`, sharing the same universal dimension
    pub fn dimension(&mut self, key: &Value) -> Scope<'_> {
        Scope {
            universal: self.universal,
            local: self.local.dimension(key),
        }
    }

    pub fn manifest(&mut self, shape: &ShapeId, value: Value, lineage: Lineage) -> &Entity {
        self.local.manifest(shape, value, lineage)
    }

    /// Local values, then universal ones not already known locally
    pub fn images(&self, shape: &ShapeId, filter: Option<LineageFilter<'_>>) -> Vec<Value> {
        let keep = |entity: &&Entity| filter.map_or(true, |keep| keep(&entity.lineage));
        let local = self.local.entities(shape);
        let seen: HashSet<ValueHash> = local
            .iter()
            .filter(keep)
            .filter(|entity| entity.is_scalar())
            .map(|entity| entity.hash)
            .collect();

        local
            .iter()
            .filter(keep)
            .chain(
                self.universal
                    .entities(shape)
                    .iter()
                    .filter(|entity| !(entity.is_scalar() && seen.contains(&entity.hash)))
                    .filter(keep),
            )
            .map(|entity| entity.value.clone())
            .collect()
    }

    /// Local count only; universal values are not discoveries of this scope
    pub fn count(&self, shape: &ShapeId) -> usize {
        self.local.count(shape)
    }

    pub fn local(&self) -> &Domain {
        self.local
    }
}
