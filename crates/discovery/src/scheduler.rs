//! Fixpoint crawl of one service in one region.
//!
//! Starters (operations whose input needs nothing discovered) run once up front. The
//! remaining operations are retried pass after pass; a pass that resolves nothing ends
//! the crawl, since nothing new can have become constructible.

use crate::config::{AllowList, CrawlConfig};
use crate::construct::{Candidates, ConstructOptions, Constructor, InsufficientMembers};
use crate::error::{DiscoveryError, Result};
use crate::harvest::Harvester;
use crate::invoker::{invoke, Invoker};
use crate::report::{CrawlReport, Failure, PendingReason, Resolution, Unresolved};
use grump_domain::{Domain, Lineage, Scope};
use grump_shapes::{Operation, ShapeModel, TransformRegistry};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Read-only, non-excluded operations, sorted by name
pub fn crawlable<'m>(
    model: &'m ShapeModel,
    transforms: &TransformRegistry,
    config: &CrawlConfig,
) -> Vec<&'m Operation> {
    model
        .operations()
        .filter(|op| op.is_read_only(&config.read_only_prefixes))
        .filter(|op| !transforms.is_excluded(model.namespace(), &op.name))
        .collect()
}

pub struct Crawler<'a, I: ?Sized> {
    model: &'a ShapeModel,
    transforms: &'a TransformRegistry,
    config: &'a CrawlConfig,
    allow_list: AllowList,
    invoker: &'a I,
}

impl<'a, I> Crawler<'a, I>
where
    I: Invoker + ?Sized,
{
    pub fn new(
        model: &'a ShapeModel,
        transforms: &'a TransformRegistry,
        config: &'a CrawlConfig,
        invoker: &'a I,
    ) -> Self {
        Self {
            model,
            transforms,
            config,
            allow_list: config.allow_list(),
            invoker,
        }
    }

    pub fn crawlable(&self) -> Vec<&'a Operation> {
        crawlable(self.model, self.transforms, self.config)
    }

    /// Crawl `region`, writing into the `region -> namespace` dimension of `root`.
    ///
    /// A fatal invocation failure aborts the crawl; everything harvested up to that
    /// point stays in `root`.
    pub async fn run(
        &self,
        region: &str,
        universal: &Domain,
        root: &mut Domain,
    ) -> Result<CrawlReport> {
        let namespace = self.model.namespace();
        let mut report = CrawlReport::new(namespace, region);

        let mut root_scope = Scope::new(universal, root);
        let mut region_scope = root_scope.dimension(&Value::from(region));
        let mut scope = region_scope.dimension(&Value::from(namespace));

        let constructor = Constructor::new(self.model, self.transforms).with_options(
            ConstructOptions {
                include_empty_list: self.config.include_empty_list,
                max_candidates: self.config.max_candidates,
            },
        );

        let (starters, mut pending): (Vec<&Operation>, Vec<&Operation>) = self
            .crawlable()
            .into_iter()
            .partition(|op| self.model.is_starter(op));

        log::info!(
            "{namespace}/{region}: {} starter(s), {} pending",
            starters.len(),
            pending.len()
        );

        for op in starters {
            report.starters.push(op.name.clone());
            match constructor.parameters(op, &scope) {
                Ok(candidates) => self.attempt(op, candidates, &mut scope, &mut report).await?,
                // Only a misbehaving image transform can empty a starter's input
                Err(insufficient) => log::debug!("{}: {insufficient}", op.name),
            }
            report.resolved.push(Resolution {
                operation: op.name.clone(),
                pass: 0,
            });
        }
        report.pending_history.push(pending.len());

        let mut blocked: BTreeMap<String, InsufficientMembers> = BTreeMap::new();
        while !pending.is_empty() {
            if self.config.max_passes.is_some_and(|max| report.passes >= max) {
                log::info!(
                    "{namespace}/{region}: stopping after {} pass(es), {} pending",
                    report.passes,
                    pending.len()
                );
                break;
            }
            report.passes += 1;
            let pass = report.passes;

            let mut resolved = BTreeSet::new();
            for op in &pending {
                match constructor.parameters(op, &scope) {
                    Ok(candidates) => {
                        self.attempt(op, candidates, &mut scope, &mut report).await?;
                        blocked.remove(&op.name);
                        resolved.insert(op.name.clone());
                        report.resolved.push(Resolution {
                            operation: op.name.clone(),
                            pass,
                        });
                    }
                    Err(insufficient) => {
                        log::debug!("{}: {insufficient}", op.name);
                        blocked.insert(op.name.clone(), insufficient);
                    }
                }
            }

            pending.retain(|op| !resolved.contains(&op.name));
            report.pending_history.push(pending.len());
            log::info!(
                "{namespace}/{region}: pass {pass} resolved {}, {} pending",
                resolved.len(),
                pending.len()
            );

            if resolved.is_empty() {
                break;
            }
        }

        report.unresolved = pending
            .iter()
            .map(|op| Unresolved {
                operation: op.name.clone(),
                reason: match blocked.remove(&op.name) {
                    Some(insufficient) => PendingReason::InsufficientMembers(insufficient),
                    None => PendingReason::PassLimit,
                },
            })
            .collect();
        report.entity_counts = scope.local().entity_counts();

        Ok(report)
    }

    /// Invoke once per candidate and harvest every successful response
    async fn attempt(
        &self,
        op: &Operation,
        candidates: Candidates,
        scope: &mut Scope<'_>,
        report: &mut CrawlReport,
    ) -> Result<()> {
        let namespace = self.model.namespace();
        let harvester = Harvester::new(self.model, self.transforms);

        for params in candidates {
            report.invocations += 1;
            log::debug!("{namespace}:{} {params}", op.name);

            let outcome = invoke(self.invoker, &report.region, op, &params).await;
            match outcome {
                Ok(response) => {
                    let lineage = Lineage::from_steps([
                        ("region", Value::from(report.region.as_str())),
                        ("service", Value::from(namespace)),
                        ("operation", Value::from(op.name.as_str())),
                        ("parameters", params),
                    ])?;
                    harvester.harvest(op, &response, scope, &lineage)?;
                }
                Err(err) if self.allow_list.permits(namespace, &op.name, &err.kind) => {
                    log::warn!("{namespace}:{} produced no data: {err}", op.name);
                    report.failures.push(Failure {
                        operation: op.name.clone(),
                        kind: err.kind,
                        message: err.message,
                    });
                }
                Err(err) => {
                    return Err(DiscoveryError::Fatal {
                        namespace: namespace.to_string(),
                        operation: op.name.clone(),
                        kind: err.kind,
                        message: err.message,
                    })
                }
            }
        }

        Ok(())
    }
}
