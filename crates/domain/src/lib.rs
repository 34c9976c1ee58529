//! # Grump Domain
//!
//! In-memory store of everything a crawl has discovered.
//!
//! ```text
//! root
//!  ├─ "us-east-1"            (dimension spawned by a region)
//!  │    └─ "iam"             (dimension spawned by a service namespace)
//!  │         └─ iam:userNameType -> [Entity { value, lineage }, ...]
//!  └─ ...
//! universal                  (consulted by every Scope after its local dimension)
//! ```
//!
//! Scalar entities are deduplicated by [`ValueHash`]; lists and maps are kept per
//! occurrence.

mod domain;
mod entity;
mod error;
mod hash;
mod lineage;

pub use domain::{Domain, DomainSnapshot, LineageFilter, Scope};
pub use entity::Entity;
pub use error::{DomainError, Result};
pub use hash::{structural_hash, ValueHash};
pub use lineage::{Lineage, LineageStep};
