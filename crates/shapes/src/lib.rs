//! # Grump Shapes
//!
//! Typed model of a cloud API's shapes, built once per service and shared read-only.
//!
//! ## Architecture
//!
//! ```text
//! service-2.json + paginators-1.json
//!     │
//!     ├──> TransformRegistry (per-service special cases)
//!     │      ├─ rewrite raw shapes before they are modelled
//!     │      └─ alias structure members to semantic names
//!     │
//!     ├──> ShapeModelBuilder (two-phase, cycle safe)
//!     │      ├─ silhouette memo while children resolve
//!     │      └─ canonical table once complete
//!     │
//!     └──> ShapeModel (petgraph)
//!            ├─ Nodes: leaf, string, list, map, structure, alias
//!            └─ Edges: member, element, key, value, target
//! ```

mod builder;
mod error;
mod model;
mod operation;
mod schema;
mod transforms;
mod types;

pub use builder::ShapeModelBuilder;
pub use error::{Result, ShapeError};
pub use model::ShapeModel;
pub use operation::{Operation, Pagination, READ_ONLY_PREFIXES};
pub use schema::{
    PaginatorDocument, RawOperation, RawPaginator, RawShape, ServiceMetadata, ServiceSchema,
    ShapeRef, TokenKeys,
};
pub use transforms::{
    json_encode, partition_lists, ImageTransform, ShapeTransform, TransformRegistry,
    TransformRule, ValueTransform, ANY_STRUCTURE,
};
pub use types::{
    CanonicalForm, LeafKind, NumericBounds, ShapeEdge, ShapeId, ShapeKind, ShapeNode, Silhouette,
    StringConstraints,
};

pub use petgraph::stable_graph::NodeIndex;
