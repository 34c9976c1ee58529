//! Invoker backed by recorded responses.
//!
//! Fixture layout, keyed by operation name:
//!
//! ```json
//! {
//!   "ListThings": [{ "pages": [{ "Things": [] }, { "Things": [] }] }],
//!   "DescribeThing": [
//!     { "params": { "Id": "a" }, "response": { "Thing": {} } },
//!     { "region": "eu-west-1", "response": { "Thing": null } },
//!     { "error": { "kind": "AccessDenied", "message": "denied" } }
//!   ]
//! }
//! ```
//!
//! An entry with `params` only answers that exact parameter map, and an entry with
//! `region` only answers calls for that region. Among the entries that apply, an exact
//! `params` match wins, then a region-specific entry, then file order. Unrecorded calls
//! return `{}`.

use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use grump_discovery::{merge_pages, InvocationError, Invoker};
use grump_shapes::Operation;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Recorded {
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    pages: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<InvocationError>,
}

impl Recorded {
    /// Lower is more specific; `None` when the entry does not apply
    fn rank(&self, region: &str, params: &Value) -> Option<u8> {
        let exact_params = match &self.params {
            Some(recorded) if recorded == params => true,
            Some(_) => return None,
            None => false,
        };
        let exact_region = match &self.region {
            Some(recorded) if recorded == region => true,
            Some(_) => return None,
            None => false,
        };
        Some(match (exact_params, exact_region) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        })
    }
}

#[derive(Debug, Default)]
pub struct ReplayInvoker {
    recorded: BTreeMap<String, Vec<Recorded>>,
    calls: Mutex<usize>,
}

impl ReplayInvoker {
    pub fn from_json(body: &str) -> Result<Self> {
        let recorded: BTreeMap<String, Vec<Recorded>> =
            serde_json::from_str(body).context("Invalid response fixtures")?;
        for (operation, entries) in &recorded {
            for entry in entries {
                if entry.error.is_some() && (entry.response.is_some() || entry.pages.is_some()) {
                    anyhow::bail!("{operation}: a fixture holds either an error or a response");
                }
            }
        }
        Ok(Self {
            recorded,
            calls: Mutex::new(0),
        })
    }

    /// Number of calls answered so far
    pub fn calls(&self) -> usize {
        self.calls.lock().map(|calls| *calls).unwrap_or_default()
    }

    fn lookup(&self, region: &str, operation: &str, params: &Value) -> Option<&Recorded> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        self.recorded
            .get(operation)?
            .iter()
            .filter_map(|entry| entry.rank(region, params).map(|rank| (rank, entry)))
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, entry)| entry)
    }
}

#[async_trait]
impl Invoker for ReplayInvoker {
    async fn call(
        &self,
        region: &str,
        operation: &str,
        params: &Value,
    ) -> Result<Value, InvocationError> {
        let Some(entry) = self.lookup(region, operation, params) else {
            log::debug!("{region}/{operation}: nothing recorded for {params}");
            return Ok(json!({}));
        };
        if let Some(error) = &entry.error {
            return Err(error.clone());
        }
        if let Some(pages) = &entry.pages {
            return Ok(merge_pages(pages.clone()));
        }
        Ok(entry.response.clone().unwrap_or_else(|| json!({})))
    }

    async fn paginate(
        &self,
        region: &str,
        operation: &Operation,
        params: &Value,
    ) -> Result<Vec<Value>, InvocationError> {
        match self.lookup(region, &operation.name, params) {
            Some(Recorded {
                pages: Some(pages),
                ..
            }) => Ok(pages.clone()),
            Some(Recorded {
                error: Some(error), ..
            }) => Err(error.clone()),
            Some(entry) => Ok(vec![entry.response.clone().unwrap_or_else(|| json!({}))]),
            None => Ok(vec![json!({})]),
        }
    }
}
