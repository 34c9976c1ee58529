use crate::construct::InsufficientMembers;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of crawling one service in one region
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub namespace: String,
    pub region: String,
    /// Fixpoint passes run after the starter phase
    pub passes: usize,
    pub invocations: usize,
    pub starters: Vec<String>,
    pub resolved: Vec<Resolution>,
    pub unresolved: Vec<Unresolved>,
    pub failures: Vec<Failure>,
    /// Pending operations left after the starter phase and after each pass
    pub pending_history: Vec<usize>,
    pub entity_counts: BTreeMap<String, usize>,
}

impl CrawlReport {
    pub fn new(namespace: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            region: region.into(),
            ..Default::default()
        }
    }

    /// Pass in which `operation` was resolved; `Some(0)` for starters
    pub fn resolved_in(&self, operation: &str) -> Option<usize> {
        self.resolved
            .iter()
            .find(|r| r.operation == operation)
            .map(|r| r.pass)
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub operation: String,
    pub pass: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unresolved {
    pub operation: String,
    pub reason: PendingReason,
}

/// Why an operation never left the pending set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingReason {
    InsufficientMembers(InsufficientMembers),
    /// The pass bound was reached before the operation was attempted
    PassLimit,
}

/// A non-fatal invocation failure; the call produced no data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub operation: String,
    pub kind: String,
    pub message: String,
}

/// What a crawl would attempt, computed without invoking anything
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub namespace: String,
    pub shapes: usize,
    pub operations: usize,
    pub starters: Vec<String>,
    pub dependent: Vec<PlannedOperation>,
    /// Operations outside the read-only prefixes or explicitly excluded
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedOperation {
    pub operation: String,
    pub required: BTreeSet<String>,
}
