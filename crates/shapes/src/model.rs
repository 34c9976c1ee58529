use crate::builder::ShapeModelBuilder;
use crate::error::Result;
use crate::operation::Operation;
use crate::schema::{PaginatorDocument, ServiceSchema};
use crate::transforms::TransformRegistry;
use crate::types::{CanonicalForm, ShapeEdge, ShapeId, ShapeNode};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, EdgeRef};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Immutable shape graph for one service namespace
///
/// Nodes are shapes, edges are member/element/key/value/target relationships.
/// The graph may be cyclic.
pub struct ShapeModel {
    pub(crate) namespace: String,
    pub(crate) graph: StableDiGraph<ShapeNode, ShapeEdge>,
    pub(crate) by_name: HashMap<String, NodeIndex>,
    pub(crate) by_canonical: HashMap<CanonicalForm, NodeIndex>,
    pub(crate) operations: BTreeMap<String, Operation>,
}

impl ShapeModel {
    pub fn build(
        schema: &ServiceSchema,
        paginators: Option<&PaginatorDocument>,
        transforms: &TransformRegistry,
    ) -> Result<Self> {
        ShapeModelBuilder::new(schema, transforms)
            .with_paginators(paginators)
            .build()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Node data for an index handed out by this model
    pub fn shape(&self, idx: NodeIndex) -> &ShapeNode {
        &self.graph[idx]
    }

    pub fn id(&self, idx: NodeIndex) -> &ShapeId {
        &self.graph[idx].id
    }

    /// Find shape by declared (or alias) name
    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.by_name.get(name).copied()
    }

    pub fn find_canonical(&self, canonical: &CanonicalForm) -> Option<NodeIndex> {
        self.by_canonical.get(canonical).copied()
    }

    /// Structure members sorted by name
    pub fn members(&self, idx: NodeIndex) -> Vec<(String, NodeIndex)> {
        let mut members: Vec<(String, NodeIndex)> = self
            .graph
            .edges(idx)
            .filter_map(|edge| match edge.weight() {
                ShapeEdge::Member(name) => Some((name.clone(), edge.target())),
                _ => None,
            })
            .collect();
        members.sort();
        members
    }

    pub fn element(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.child(idx, &ShapeEdge::Element)
    }

    pub fn entries(&self, idx: NodeIndex) -> Option<(NodeIndex, NodeIndex)> {
        Some((
            self.child(idx, &ShapeEdge::Key)?,
            self.child(idx, &ShapeEdge::Value)?,
        ))
    }

    pub fn target(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.child(idx, &ShapeEdge::Target)
    }

    fn child(&self, idx: NodeIndex, role: &ShapeEdge) -> Option<NodeIndex> {
        self.graph
            .edges(idx)
            .find(|edge| edge.weight() == role)
            .map(|edge| edge.target())
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.values()
    }

    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub fn shape_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Required input members of an operation, minus those the paginator owns
    pub fn required_inputs(&self, operation: &Operation) -> BTreeSet<String> {
        operation
            .input
            .and_then(|input| self.shape(input).required().cloned())
            .unwrap_or_default()
            .into_iter()
            .filter(|member| !operation.consumes(member))
            .collect()
    }

    /// Operations whose input has no required members
    pub fn is_starter(&self, operation: &Operation) -> bool {
        self.required_inputs(operation).is_empty()
    }

    /// Whether every leaf reachable from `idx` satisfies `condition`.
    ///
    /// Cycles are visited once; a shape with no reachable leaves satisfies trivially.
    pub fn satisfies_leaf_condition<F>(&self, idx: NodeIndex, condition: F) -> bool
    where
        F: Fn(&ShapeNode) -> bool,
    {
        let mut dfs = Dfs::new(&self.graph, idx);
        while let Some(node) = dfs.next(&self.graph) {
            let shape = &self.graph[node];
            if shape.kind.is_leaf() && !condition(shape) {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for ShapeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeModel")
            .field("namespace", &self.namespace)
            .field("shapes", &self.graph.node_count())
            .field("operations", &self.operations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawPaginator, RawShape, TokenKeys};
    use crate::types::ShapeKind;
    use pretty_assertions::assert_eq;

    fn model() -> ShapeModel {
        let schema = ServiceSchema::default()
            .with_shape(
                "ListUsersRequest",
                RawShape::of_type("structure")
                    .with_member("PathPrefix", "pathPrefixType")
                    .with_member("Marker", "markerType")
                    .with_member("MaxItems", "maxItemsType")
                    .with_required("Marker"),
            )
            .with_shape(
                "GetUserRequest",
                RawShape::of_type("structure")
                    .with_member("UserName", "userNameType")
                    .with_required("UserName"),
            )
            .with_shape("pathPrefixType", RawShape::of_type("string"))
            .with_shape("markerType", RawShape::of_type("string"))
            .with_shape("maxItemsType", RawShape::of_type("integer"))
            .with_shape("userNameType", RawShape::of_type("string"))
            .with_shape("scopeType", RawShape::of_type("string").with_enum(["Local", "AWS"]))
            .with_shape(
                "Tags",
                RawShape::of_type("map").with_entries("pathPrefixType", "scopeType"),
            )
            .with_operation("ListUsers", Some("ListUsersRequest"), None)
            .with_operation("GetUser", Some("GetUserRequest"), None);

        let mut paginators = PaginatorDocument::default();
        paginators.pagination.insert(
            "ListUsers".to_string(),
            RawPaginator {
                input_token: TokenKeys::One("Marker".into()),
                output_token: TokenKeys::One("Marker".into()),
                limit_key: Some("MaxItems".into()),
            },
        );

        ShapeModel::build(&schema, Some(&paginators), &TransformRegistry::new()).unwrap()
    }

    #[test]
    fn paginated_required_tokens_do_not_block() {
        let model = model();
        let list_users = model.operation("ListUsers").unwrap();
        assert!(list_users.is_paginated());
        assert!(model.is_starter(list_users));

        let get_user = model.operation("GetUser").unwrap();
        assert_eq!(
            model.required_inputs(get_user).into_iter().collect::<Vec<_>>(),
            vec!["UserName".to_string()]
        );
        assert!(!model.is_starter(get_user));
    }

    #[test]
    fn map_entries_resolve_to_key_and_value() {
        let model = model();
        let tags = model.find("Tags").unwrap();
        let (key, value) = model.entries(tags).unwrap();
        assert_eq!(model.id(key).name, "pathPrefixType");
        assert_eq!(model.id(value).name, "scopeType");
    }

    #[test]
    fn leaf_condition_walks_reachable_leaves() {
        let model = model();
        let tags = model.find("Tags").unwrap();
        let is_string = |shape: &ShapeNode| matches!(shape.kind, ShapeKind::String(_));
        assert!(model.satisfies_leaf_condition(tags, is_string));

        let request = model.find("ListUsersRequest").unwrap();
        assert!(!model.satisfies_leaf_condition(request, is_string));
    }

    #[test]
    fn canonical_lookup_returns_same_instance() {
        let model = model();
        let idx = model.find("scopeType").unwrap();
        let canonical = model.shape(idx).canonical.clone().unwrap();
        assert_eq!(model.find_canonical(&canonical), Some(idx));
    }
}
