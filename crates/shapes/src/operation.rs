use crate::schema::RawPaginator;
use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Read-only naming convention used to pick the operations worth crawling
pub const READ_ONLY_PREFIXES: [&str; 3] = ["List", "Describe", "Get"];

/// Tokens and limits the paginator manages on behalf of the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub input_tokens: Vec<String>,
    pub output_tokens: Vec<String>,
    pub limit_key: Option<String>,
}

impl Pagination {
    pub fn from_raw(raw: &RawPaginator) -> Self {
        Self {
            input_tokens: raw.input_token.keys(),
            output_tokens: raw.output_token.keys(),
            limit_key: raw.limit_key.clone(),
        }
    }

    /// Request members that must never be constructed
    pub fn consumes(&self, member: &str) -> bool {
        self.input_tokens.iter().any(|t| t == member) || self.limit_key.as_deref() == Some(member)
    }

    /// Response members that must never be harvested
    pub fn produces(&self, member: &str) -> bool {
        self.output_tokens.iter().any(|t| t == member)
    }
}

/// An API operation resolved against the shape graph
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub input: Option<NodeIndex>,
    pub output: Option<NodeIndex>,
    pub pagination: Option<Pagination>,
}

impl Operation {
    pub fn is_paginated(&self) -> bool {
        self.pagination.is_some()
    }

    pub fn is_read_only<S: AsRef<str>>(&self, prefixes: &[S]) -> bool {
        prefixes
            .iter()
            .any(|prefix| self.name.starts_with(prefix.as_ref()))
    }

    pub fn consumes(&self, member: &str) -> bool {
        self.pagination.as_ref().is_some_and(|p| p.consumes(member))
    }

    pub fn produces(&self, member: &str) -> bool {
        self.pagination.as_ref().is_some_and(|p| p.produces(member))
    }
}
