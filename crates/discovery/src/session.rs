use crate::config::CrawlConfig;
use crate::error::{DiscoveryError, Result};
use crate::invoker::Invoker;
use crate::report::{CrawlReport, Plan, PlannedOperation};
use crate::scheduler::{crawlable, Crawler};
use grump_domain::{Domain, Lineage};
use grump_shapes::{
    PaginatorDocument, ServiceSchema, ShapeId, ShapeModel, ShapeModelBuilder, TransformRegistry,
};
use serde_json::Value;
use std::sync::Arc;

/// How one region's crawl ended
#[derive(Debug)]
pub struct RegionOutcome {
    pub region: String,
    /// `Err` when the crawl was aborted; whatever it harvested first is still in the root
    pub result: Result<CrawlReport>,
}

/// Everything one discovery run produced
#[derive(Debug)]
pub struct DiscoveryOutcome {
    /// One outcome per region, in configuration order
    pub regions: Vec<RegionOutcome>,
    /// `region -> namespace` dimensions holding the harvested entities, partial crawls included
    pub root: Domain,
    pub universal: Domain,
}

impl DiscoveryOutcome {
    /// Reports of the regions that ran to completion
    pub fn reports(&self) -> impl Iterator<Item = &CrawlReport> {
        self.regions
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
    }

    /// Regions aborted by a fatal failure
    pub fn failures(&self) -> impl Iterator<Item = (&str, &DiscoveryError)> {
        self.regions.iter().filter_map(|outcome| match &outcome.result {
            Ok(_) => None,
            Err(err) => Some((outcome.region.as_str(), err)),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// A service model plus the configuration to crawl it with.
///
/// Regions are crawled concurrently; each owns a disjoint domain subtree and only shares
/// the read-only universal dimension.
#[derive(Debug, Clone)]
pub struct Discovery {
    model: Arc<ShapeModel>,
    transforms: Arc<TransformRegistry>,
    config: Arc<CrawlConfig>,
    /// Operations dropped by exclusion before the model was built
    excluded: Vec<String>,
}

impl Discovery {
    pub fn new(
        schema: &ServiceSchema,
        paginators: Option<&PaginatorDocument>,
        config: CrawlConfig,
    ) -> Result<Self> {
        Self::with_transforms(schema, paginators, config, |_, _| {})
    }

    /// Like [`Discovery::new`], letting `extra` register closures the config cannot express
    pub fn with_transforms(
        schema: &ServiceSchema,
        paginators: Option<&PaginatorDocument>,
        config: CrawlConfig,
        extra: impl FnOnce(&str, &mut TransformRegistry),
    ) -> Result<Self> {
        config.validate().map_err(DiscoveryError::Config)?;

        let namespace = config
            .namespace
            .clone()
            .unwrap_or_else(|| schema.namespace());
        let mut transforms = config.registry(&namespace)?;
        extra(&namespace, &mut transforms);
        let excluded = schema
            .operations
            .keys()
            .filter(|name| transforms.is_excluded(&namespace, name))
            .cloned()
            .collect();
        let model = ShapeModelBuilder::new(schema, &transforms)
            .with_paginators(paginators)
            .with_namespace(namespace)
            .build()?;

        Ok(Self {
            model: Arc::new(model),
            transforms: Arc::new(transforms),
            config: Arc::new(config),
            excluded,
        })
    }

    pub fn model(&self) -> &ShapeModel {
        &self.model
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    /// Starters and dependent operations, without invoking anything
    pub fn plan(&self) -> Plan {
        let crawlable = crawlable(&self.model, &self.transforms, &self.config);
        let mut plan = Plan {
            namespace: self.model.namespace().to_string(),
            shapes: self.model.shape_count(),
            operations: self.model.operation_count(),
            ..Default::default()
        };

        for op in self.model.operations() {
            if !crawlable.iter().any(|c| c.name == op.name) {
                plan.skipped.push(op.name.clone());
            } else if self.model.is_starter(op) {
                plan.starters.push(op.name.clone());
            } else {
                plan.dependent.push(PlannedOperation {
                    operation: op.name.clone(),
                    required: self.model.required_inputs(op),
                });
            }
        }
        plan.skipped.extend(self.excluded.iter().cloned());
        plan.skipped.sort();
        plan
    }

    /// Universal dimension seeded with the configured values
    pub fn universal(&self) -> Domain {
        let mut universal = Domain::new();
        let namespace = self.model.namespace();
        for (shape, values) in &self.config.universal {
            if self.model.find(shape).is_none() {
                log::warn!("universal values for unknown shape {namespace}:{shape}");
            }
            let id = ShapeId::new(namespace, shape.as_str());
            let lineage = Lineage::single("source", Value::from("configuration"));
            for value in values {
                universal.manifest(&id, value.clone(), lineage.clone());
            }
        }
        universal
    }

    /// Crawl every configured region concurrently.
    ///
    /// A fatal failure aborts only the region it happened in. Every region's harvest,
    /// partial or not, is absorbed into the returned root.
    pub async fn run<I>(&self, invoker: Arc<I>) -> DiscoveryOutcome
    where
        I: Invoker + ?Sized + 'static,
    {
        let universal = Arc::new(self.universal());

        let handles: Vec<_> = self
            .config
            .regions
            .iter()
            .map(|region| {
                let region = region.clone();
                let model = Arc::clone(&self.model);
                let transforms = Arc::clone(&self.transforms);
                let config = Arc::clone(&self.config);
                let invoker = Arc::clone(&invoker);
                let universal = Arc::clone(&universal);

                let handle = tokio::spawn({
                    let region = region.clone();
                    async move {
                        let crawler = Crawler::new(&model, &transforms, &config, invoker.as_ref());
                        let mut root = Domain::new();
                        let result = crawler.run(&region, &universal, &mut root).await;
                        (result, root)
                    }
                });
                (region, handle)
            })
            .collect();

        let mut regions = Vec::with_capacity(handles.len());
        let mut root = Domain::new();

        for (region, handle) in handles {
            let result = match handle.await {
                Ok((result, region_root)) => {
                    root.absorb(region_root);
                    result
                }
                Err(join) => Err(DiscoveryError::Task {
                    region: region.clone(),
                    message: join.to_string(),
                }),
            };
            if let Err(err) = &result {
                log::error!("{region}: {err}");
            }
            regions.push(RegionOutcome { region, result });
        }

        let universal = Arc::try_unwrap(universal).unwrap_or_else(|shared| (*shared).clone());
        DiscoveryOutcome {
            regions,
            root,
            universal,
        }
    }
}
