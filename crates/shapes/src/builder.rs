use crate::error::{Result, ShapeError};
use crate::model::ShapeModel;
use crate::operation::{Operation, Pagination};
use crate::schema::{PaginatorDocument, RawShape, ServiceSchema};
use crate::transforms::TransformRegistry;
use crate::types::*;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Build a shape model from a raw service description
///
/// Resolution is depth-first with two-phase memoization so that self-referential
/// shapes terminate:
///
/// 1. On first visit a node is added to the graph and registered under its
///    [`Silhouette`] in a transient memo. Re-entering the same raw shape while its
///    children are still resolving returns that incomplete node.
/// 2. Once every child is attached, the silhouette is dropped from the memo and the
///    node is installed under its full [`CanonicalForm`].
pub struct ShapeModelBuilder<'a> {
    schema: &'a ServiceSchema,
    paginators: Option<&'a PaginatorDocument>,
    transforms: &'a TransformRegistry,
    namespace: String,
    graph: StableDiGraph<ShapeNode, ShapeEdge>,
    by_name: HashMap<String, NodeIndex>,
    by_canonical: HashMap<CanonicalForm, NodeIndex>,
    silhouettes: HashMap<Silhouette, NodeIndex>,
    /// Synthetic member aliases and the declared shape each one wraps
    synthetic_aliases: HashMap<String, String>,
}

impl<'a> ShapeModelBuilder<'a> {
    pub fn new(schema: &'a ServiceSchema, transforms: &'a TransformRegistry) -> Self {
        Self {
            schema,
            paginators: None,
            transforms,
            namespace: schema.namespace(),
            graph: StableDiGraph::new(),
            by_name: HashMap::new(),
            by_canonical: HashMap::new(),
            silhouettes: HashMap::new(),
            synthetic_aliases: HashMap::new(),
        }
    }

    pub fn with_paginators(mut self, paginators: Option<&'a PaginatorDocument>) -> Self {
        self.paginators = paginators;
        self
    }

    /// Override the namespace derived from the schema metadata
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn build(mut self) -> Result<ShapeModel> {
        let schema = self.schema;

        for name in schema.shapes.keys() {
            self.resolve(name, "<schema>")?;
        }

        let mut operations = BTreeMap::new();
        for (name, raw) in &schema.operations {
            if self.transforms.is_excluded(&self.namespace, name) {
                log::debug!("Skipping excluded operation {}:{}", self.namespace, name);
                continue;
            }

            let input = match &raw.input {
                Some(reference) => Some(self.resolve_operation_shape(name, &reference.shape)?),
                None => None,
            };
            let output = match &raw.output {
                Some(reference) => Some(self.resolve_operation_shape(name, &reference.shape)?),
                None => None,
            };
            let pagination = self
                .paginators
                .and_then(|doc| doc.pagination.get(name))
                .map(Pagination::from_raw);

            operations.insert(
                name.clone(),
                Operation {
                    name: name.clone(),
                    input,
                    output,
                    pagination,
                },
            );
        }

        log::info!(
            "Built shape model for {}: {} shapes, {} operations",
            self.namespace,
            self.graph.node_count(),
            operations.len()
        );

        Ok(ShapeModel {
            namespace: self.namespace,
            graph: self.graph,
            by_name: self.by_name,
            by_canonical: self.by_canonical,
            operations,
        })
    }

    fn resolve_operation_shape(&mut self, operation: &str, shape: &str) -> Result<NodeIndex> {
        if !self.schema.shapes.contains_key(shape) {
            return Err(ShapeError::MissingOperationShape {
                operation: operation.to_string(),
                shape: shape.to_string(),
            });
        }
        self.resolve(shape, operation)
    }

    /// Resolve a declared shape by name
    fn resolve(&mut self, name: &str, referenced_by: &str) -> Result<NodeIndex> {
        if let Some(&idx) = self.by_name.get(name) {
            return Ok(idx);
        }

        let raw = self
            .schema
            .shapes
            .get(name)
            .cloned()
            .ok_or_else(|| ShapeError::MissingShape {
                namespace: self.namespace.clone(),
                shape: name.to_string(),
                referenced_by: referenced_by.to_string(),
            })?;
        let raw = self.transforms.apply_shape(&self.namespace, name, raw);

        self.install(name, raw)
    }

    /// Resolve a member alias: a declared shape of that name wins, otherwise a
    /// synthetic alias wrapping the member's declared shape is created
    fn resolve_alias(&mut self, alias: &str, target: &str, referenced_by: &str) -> Result<NodeIndex> {
        if self.schema.shapes.contains_key(alias) {
            return self.resolve(alias, referenced_by);
        }
        let wrapped = self
            .synthetic_aliases
            .entry(alias.to_string())
            .or_insert_with(|| target.to_string());
        if wrapped.as_str() != target {
            return Err(ShapeError::InvalidTransform(format!(
                "alias '{alias}' on {referenced_by} wraps '{target}' but already wraps '{wrapped}'"
            )));
        }
        self.install(alias, RawShape::aliasing(target))
    }

    fn install(&mut self, name: &str, raw: RawShape) -> Result<NodeIndex> {
        if let Some(&idx) = self.by_name.get(name) {
            return Ok(idx);
        }

        let kind = ShapeKind::from_raw(&self.namespace, name, &raw)?;
        let silhouette = Silhouette::of(&self.namespace, name, &raw);

        // Phase 1: re-entry while children are resolving
        if let Some(&idx) = self.silhouettes.get(&silhouette) {
            return Ok(idx);
        }

        let id = ShapeId::new(self.namespace.clone(), name);
        let idx = self
            .graph
            .add_node(ShapeNode::new(id, kind, silhouette.clone()));
        self.silhouettes.insert(silhouette.clone(), idx);

        for (edge, child) in self.resolve_children(name, &raw)? {
            self.graph.add_edge(idx, child, edge);
        }

        // Phase 2: promote to the permanent table
        self.silhouettes.remove(&silhouette);
        let canonical = self.canonical_form(idx);
        debug_assert!(
            !self.by_canonical.contains_key(&canonical),
            "canonical collision for {name}"
        );
        self.graph[idx].canonical = Some(canonical.clone());
        self.by_canonical.insert(canonical, idx);
        self.by_name.insert(name.to_string(), idx);

        Ok(idx)
    }

    fn resolve_children(&mut self, name: &str, raw: &RawShape) -> Result<Vec<(ShapeEdge, NodeIndex)>> {
        let mut children = Vec::new();

        match raw.type_name.as_str() {
            "structure" => {
                for (member, reference) in &raw.members {
                    let alias = self
                        .transforms
                        .member_alias(&self.namespace, name, member)
                        .map(str::to_string);
                    let child = match alias {
                        Some(alias) => self.resolve_alias(&alias, &reference.shape, name)?,
                        None => self.resolve(&reference.shape, name)?,
                    };
                    children.push((ShapeEdge::Member(member.clone()), child));
                }
            }
            "list" => {
                let element = raw
                    .member
                    .as_ref()
                    .ok_or_else(|| ShapeError::missing_reference(name, "member"))?;
                children.push((ShapeEdge::Element, self.resolve(&element.shape, name)?));
            }
            "map" => {
                let key = raw
                    .key
                    .as_ref()
                    .ok_or_else(|| ShapeError::missing_reference(name, "key"))?;
                let value = raw
                    .value
                    .as_ref()
                    .ok_or_else(|| ShapeError::missing_reference(name, "value"))?;
                children.push((ShapeEdge::Key, self.resolve(&key.shape, name)?));
                children.push((ShapeEdge::Value, self.resolve(&value.shape, name)?));
            }
            "alias" => {
                let target = raw
                    .target
                    .as_ref()
                    .ok_or_else(|| ShapeError::missing_reference(name, "shape"))?;
                children.push((ShapeEdge::Target, self.resolve(target, name)?));
            }
            _ => {}
        }

        Ok(children)
    }

    /// Type tag and immediate metadata plus the identity of every child.
    ///
    /// A child that is still incomplete (a back-reference in a cycle) contributes its
    /// silhouette instead of its canonical form.
    fn canonical_form(&self, idx: NodeIndex) -> CanonicalForm {
        let node = &self.graph[idx];

        let mut children: Vec<(String, String)> = self
            .graph
            .edges(idx)
            .map(|edge| {
                let child = &self.graph[edge.target()];
                let identity = match &child.canonical {
                    Some(canonical) => canonical.0.clone(),
                    None => child.silhouette.descriptor(),
                };
                (edge.weight().label(), identity)
            })
            .collect();
        children.sort();

        let mut hasher = Sha256::new();
        hasher.update(node.silhouette.descriptor().as_bytes());
        for (label, identity) in children {
            hasher.update(b"\x1f");
            hasher.update(label.as_bytes());
            hasher.update(b"=");
            hasher.update(identity.as_bytes());
        }

        CanonicalForm(hex_encode_lower(&hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::ANY_STRUCTURE;

    fn expression_schema() -> ServiceSchema {
        // Directly self-referential, like Cost Explorer's Expression
        ServiceSchema::default()
            .with_shape(
                "Expression",
                RawShape::of_type("structure")
                    .with_member("Not", "Expression")
                    .with_member("And", "Expressions")
                    .with_member("Dimension", "DimensionName"),
            )
            .with_shape("Expressions", RawShape::of_type("list").with_element("Expression"))
            .with_shape("DimensionName", RawShape::of_type("string"))
    }

    #[test]
    fn self_referential_structure_terminates() {
        let schema = expression_schema();
        let registry = TransformRegistry::new();
        let model = ShapeModelBuilder::new(&schema, &registry).build().unwrap();

        assert_eq!(model.shape_count(), 3);
        let expression = model.find("Expression").unwrap();
        let members: HashMap<String, NodeIndex> = model.members(expression).into_iter().collect();
        assert_eq!(members["Not"], expression);

        let list = members["And"];
        assert_eq!(model.element(list), Some(expression));
        assert!(model.shape(expression).is_complete());
    }

    #[test]
    fn unknown_type_aborts_build() {
        let schema = ServiceSchema::default().with_shape("Weird", RawShape::of_type("union"));
        let registry = TransformRegistry::new();
        let err = ShapeModelBuilder::new(&schema, &registry).build().unwrap_err();
        assert!(matches!(err, ShapeError::UnknownShapeType { .. }));
    }

    #[test]
    fn missing_member_shape_aborts_build() {
        let schema = ServiceSchema::default().with_shape(
            "Holder",
            RawShape::of_type("structure").with_member("Ghost", "NotDeclared"),
        );
        let registry = TransformRegistry::new();
        let err = ShapeModelBuilder::new(&schema, &registry).build().unwrap_err();
        match err {
            ShapeError::MissingShape {
                shape,
                referenced_by,
                ..
            } => {
                assert_eq!(shape, "NotDeclared");
                assert_eq!(referenced_by, "Holder");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn operation_with_missing_shape_aborts_build() {
        let schema = ServiceSchema::default().with_operation("ListThings", Some("Nope"), None);
        let registry = TransformRegistry::new();
        let err = ShapeModelBuilder::new(&schema, &registry).build().unwrap_err();
        assert!(matches!(err, ShapeError::MissingOperationShape { .. }));
    }

    #[test]
    fn list_without_member_is_malformed() {
        let schema = ServiceSchema::default().with_shape("Broken", RawShape::of_type("list"));
        let registry = TransformRegistry::new();
        let err = ShapeModelBuilder::new(&schema, &registry).build().unwrap_err();
        assert!(matches!(
            err,
            ShapeError::MissingReference { field: "member", .. }
        ));
    }

    #[test]
    fn member_alias_wraps_declared_shape() {
        let schema = ServiceSchema::default()
            .with_shape(
                "GetStageRequest",
                RawShape::of_type("structure")
                    .with_member("restApiId", "String")
                    .with_required("restApiId"),
            )
            .with_shape(
                "RestApi",
                RawShape::of_type("structure").with_member("restApiId", "String"),
            )
            .with_shape("String", RawShape::of_type("string"));

        let mut registry = TransformRegistry::new();
        registry.alias_member("unknown", ANY_STRUCTURE, "restApiId", "RestApiIdType");
        let model = ShapeModelBuilder::new(&schema, &registry).build().unwrap();

        let alias = model.find("RestApiIdType").expect("alias installed");
        assert_eq!(model.target(alias), model.find("String"));

        // Both structures share the one alias instance
        for owner in ["GetStageRequest", "RestApi"] {
            let members: HashMap<String, NodeIndex> =
                model.members(model.find(owner).unwrap()).into_iter().collect();
            assert_eq!(members["restApiId"], alias);
        }
    }

    #[test]
    fn member_alias_over_different_shapes_is_rejected() {
        let schema = ServiceSchema::default()
            .with_shape("A", RawShape::of_type("structure").with_member("id", "S"))
            .with_shape("B", RawShape::of_type("structure").with_member("id", "N"))
            .with_shape("S", RawShape::of_type("string"))
            .with_shape("N", RawShape::of_type("integer"));

        let mut registry = TransformRegistry::new();
        registry.alias_member("unknown", ANY_STRUCTURE, "id", "IdType");
        let err = ShapeModelBuilder::new(&schema, &registry).build().unwrap_err();
        assert!(
            matches!(err, ShapeError::InvalidTransform(ref message) if message.contains("IdType"))
        );
    }

    #[test]
    fn excluded_operations_are_not_modelled() {
        let schema = ServiceSchema::default()
            .with_shape("Empty", RawShape::of_type("structure"))
            .with_operation("GetExport", Some("Empty"), None)
            .with_operation("GetRestApis", Some("Empty"), None);
        let mut registry = TransformRegistry::new();
        registry.exclude_operation("unknown", "GetExport");

        let model = ShapeModelBuilder::new(&schema, &registry).build().unwrap();
        assert!(model.operation("GetExport").is_none());
        assert!(model.operation("GetRestApis").is_some());
    }
}
