use crate::error::Result;
use grump_domain::{Lineage, Scope};
use grump_shapes::{NodeIndex, Operation, ShapeKind, ShapeModel, TransformRegistry};
use serde_json::Value;

/// Walks a shape and a response value together, manifesting every matched sub-value
pub struct Harvester<'a> {
    model: &'a ShapeModel,
    transforms: &'a TransformRegistry,
}

fn keep_all(_: &str) -> bool {
    false
}

impl<'a> Harvester<'a> {
    pub fn new(model: &'a ShapeModel, transforms: &'a TransformRegistry) -> Self {
        Self { model, transforms }
    }

    /// Harvest an operation response. Pagination output tokens are not entities.
    pub fn harvest(
        &self,
        operation: &Operation,
        response: &Value,
        scope: &mut Scope<'_>,
        lineage: &Lineage,
    ) -> Result<()> {
        let Some(output) = operation.output else {
            return Ok(());
        };
        let skip = |member: &str| operation.produces(member);
        self.walk(output, response, scope, lineage, &skip)
    }

    pub fn populate(
        &self,
        shape: NodeIndex,
        value: &Value,
        scope: &mut Scope<'_>,
        lineage: &Lineage,
    ) -> Result<()> {
        self.walk(shape, value, scope, lineage, &keep_all)
    }

    fn walk(
        &self,
        idx: NodeIndex,
        value: &Value,
        scope: &mut Scope<'_>,
        lineage: &Lineage,
        skip: &dyn Fn(&str) -> bool,
    ) -> Result<()> {
        if is_empty(value) {
            return Ok(());
        }

        let shape = self.model.shape(idx);
        let id = &shape.id;

        match (&shape.kind, value) {
            (ShapeKind::Structure { .. }, Value::Object(fields)) => {
                self.manifest(idx, value, scope, lineage);
                for (member, member_shape) in self.model.members(idx) {
                    if skip(member.as_str()) {
                        continue;
                    }
                    let Some(member_value) = fields.get(&member) else {
                        continue;
                    };
                    let key = lineage.unique_key(&format!("structure:{}.{}", id.name, member));
                    let next = lineage.extended(key, Value::String(member))?;
                    self.walk(member_shape, member_value, scope, &next, &keep_all)?;
                }
            }
            (ShapeKind::List, Value::Array(items)) => {
                self.manifest(idx, value, scope, lineage);
                if let Some(element) = self.model.element(idx) {
                    let key = lineage.unique_key(&format!("list:{}", id.name));
                    for (index, item) in items.iter().enumerate() {
                        let next = lineage.extended(key.clone(), Value::from(index))?;
                        self.walk(element, item, scope, &next, &keep_all)?;
                    }
                }
            }
            (ShapeKind::Map, Value::Object(entries)) => {
                self.manifest(idx, value, scope, lineage);
                if let Some((key_shape, value_shape)) = self.model.entries(idx) {
                    let key = lineage.unique_key(&format!("map:{}", id.name));
                    for (entry_key, entry_value) in entries {
                        let entry_key = Value::String(entry_key.clone());
                        let next = lineage.extended(key.clone(), entry_key.clone())?;
                        self.walk(key_shape, &entry_key, scope, &next, &keep_all)?;
                        self.walk(value_shape, entry_value, scope, &next, &keep_all)?;
                    }
                }
            }
            (ShapeKind::Alias, _) => {
                self.manifest(idx, value, scope, lineage);
                if let Some(target) = self.model.target(idx) {
                    if !self.model.shape(target).kind.is_leaf() {
                        self.walk(target, value, scope, lineage, skip)?;
                    }
                }
            }
            (kind, Value::Array(_) | Value::Object(_))
                if kind.is_leaf() && !self.transforms.has_manifest(&id.namespace, &id.name) =>
            {
                log::debug!("{id}: {} shape received a composite value", kind.type_name());
            }
            (kind, _) if kind.is_leaf() => {
                self.manifest(idx, value, scope, lineage);
            }
            (kind, _) => {
                log::debug!(
                    "{id}: expected {}, got {}",
                    kind.type_name(),
                    json_type(value)
                );
            }
        }

        Ok(())
    }

    fn manifest(&self, idx: NodeIndex, value: &Value, scope: &mut Scope<'_>, lineage: &Lineage) {
        let id = self.model.id(idx);
        let value = self
            .transforms
            .apply_manifest(&id.namespace, &id.name, value.clone());
        scope.manifest(id, value, lineage.clone());
    }
}

/// Null, `{}` and `[]` carry nothing worth remembering
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
