//! # Grump Discovery
//!
//! Empirical resolution of a service's call order, with no prior knowledge of what
//! resources exist.
//!
//! ## Architecture
//!
//! ```text
//! Discovery (one task per region)
//!     │
//!     └──> Crawler (fixpoint loop)
//!            ├─ starters: attempted once, unconditionally
//!            └─ passes until nothing resolves
//!                 │
//!                 ├──> Constructor: domain values -> parameter maps
//!                 ├──> Invoker: call / paginate + merge pages
//!                 └──> Harvester: response -> entities with lineage
//! ```
//!
//! Recoverable conditions are values: [`InsufficientMembers`] defers an operation to a
//! later pass, and failure kinds in the [`AllowList`] are recorded as "no data".
//! Everything else surfaces as a [`DiscoveryError`].

mod config;
mod construct;
mod error;
mod harvest;
mod invoker;
mod report;
mod scheduler;
mod session;

pub use config::{AllowList, CrawlConfig, NonFatalRule, ANY_OPERATION};
pub use construct::{Candidates, ConstructOptions, Constructor, InsufficientMembers};
pub use error::{DiscoveryError, Result};
pub use harvest::Harvester;
pub use invoker::{invoke, merge_pages, InvocationError, Invoker};
pub use report::{
    CrawlReport, Failure, PendingReason, Plan, PlannedOperation, Resolution, Unresolved,
};
pub use scheduler::{crawlable, Crawler};
pub use session::{Discovery, DiscoveryOutcome, RegionOutcome};
