use grump_shapes::{TransformRegistry, TransformRule, READ_ONLY_PREFIXES};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Operation wildcard in non-fatal rules
pub const ANY_OPERATION: &str = "*";

/// Settings for one crawl of one service across one or more regions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Override for the namespace derived from the schema metadata
    pub namespace: Option<String>,

    /// One isolated scope per region
    pub regions: Vec<String>,

    /// Operations are crawled only if their name starts with one of these
    pub read_only_prefixes: Vec<String>,

    pub exclude_operations: Vec<String>,

    /// Failure kinds that mean "no data" rather than aborting the scope
    pub non_fatal: Vec<NonFatalRule>,

    /// Stop after this many fixpoint passes (starter phase excluded)
    pub max_passes: Option<usize>,

    /// Upper bound on parameter maps tried per operation per pass
    pub max_candidates: Option<usize>,

    /// Offer the empty list alongside the known-values list
    pub include_empty_list: bool,

    /// Values known before the crawl starts, by shape name; visible from every scope
    pub universal: BTreeMap<String, Vec<Value>>,

    pub transforms: Vec<TransformRule>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            regions: vec!["global".to_string()],
            read_only_prefixes: READ_ONLY_PREFIXES.iter().map(|p| p.to_string()).collect(),
            exclude_operations: Vec::new(),
            non_fatal: Vec::new(),
            max_passes: None,
            max_candidates: None,
            include_empty_list: false,
            universal: BTreeMap::new(),
            transforms: Vec::new(),
        }
    }
}

impl CrawlConfig {
    pub fn from_toml(body: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(body).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.regions.is_empty() {
            return Err("regions must not be empty".to_string());
        }

        let unique: BTreeSet<&String> = self.regions.iter().collect();
        if unique.len() != self.regions.len() {
            return Err("regions must not repeat".to_string());
        }

        if self.read_only_prefixes.is_empty() {
            return Err("read_only_prefixes must not be empty".to_string());
        }

        if self.read_only_prefixes.iter().any(|p| p.is_empty()) {
            return Err("read_only_prefixes must not contain an empty prefix".to_string());
        }

        if self.max_passes == Some(0) {
            return Err("max_passes must be > 0".to_string());
        }

        if self.max_candidates == Some(0) {
            return Err("max_candidates must be > 0".to_string());
        }

        if let Some(rule) = self.non_fatal.iter().find(|r| r.kinds.is_empty()) {
            return Err(format!(
                "non_fatal rule for {}:{} lists no kinds",
                rule.namespace, rule.operation
            ));
        }

        Ok(())
    }

    /// Registry holding the configured transforms plus the excluded operations of `namespace`
    pub fn registry(&self, namespace: &str) -> grump_shapes::Result<TransformRegistry> {
        let mut registry = TransformRegistry::from_rules(&self.transforms)?;
        for operation in &self.exclude_operations {
            registry.exclude_operation(namespace, operation);
        }
        Ok(registry)
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::from_rules(&self.non_fatal)
    }
}

/// `(namespace, operation) -> kinds` entry of the non-fatal allow-list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonFatalRule {
    pub namespace: String,
    #[serde(default = "any_operation")]
    pub operation: String,
    pub kinds: Vec<String>,
}

fn any_operation() -> String {
    ANY_OPERATION.to_string()
}

/// Failure kinds that are recoverable for a given namespace and operation
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    kinds: HashMap<(String, String), BTreeSet<String>>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: &[NonFatalRule]) -> Self {
        let mut list = Self::new();
        for rule in rules {
            for kind in &rule.kinds {
                list.allow(&rule.namespace, &rule.operation, kind);
            }
        }
        list
    }

    pub fn allow(&mut self, namespace: &str, operation: &str, kind: &str) -> &mut Self {
        self.kinds
            .entry((namespace.to_string(), operation.to_string()))
            .or_default()
            .insert(kind.to_string());
        self
    }

    /// Operation-specific entries and the namespace wildcard both apply
    pub fn permits(&self, namespace: &str, operation: &str, kind: &str) -> bool {
        [operation, ANY_OPERATION].iter().any(|op| {
            self.kinds
                .get(&(namespace.to_string(), op.to_string()))
                .is_some_and(|kinds| kinds.contains(kind))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        let config = CrawlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.regions, vec!["global".to_string()]);
        assert_eq!(config.read_only_prefixes, vec!["List", "Describe", "Get"]);
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let config = CrawlConfig {
            max_passes: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CrawlConfig {
            max_candidates: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_or_repeated_regions_are_rejected() {
        let config = CrawlConfig {
            regions: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CrawlConfig {
            regions: vec!["us-east-1".into(), "us-east-1".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn allow_list_matches_operation_or_wildcard() {
        let list = AllowList::from_rules(&[
            NonFatalRule {
                namespace: "iam".into(),
                operation: "GetAccountPasswordPolicy".into(),
                kinds: vec!["NoSuchEntity".into()],
            },
            NonFatalRule {
                namespace: "iam".into(),
                operation: ANY_OPERATION.into(),
                kinds: vec!["AccessDenied".into()],
            },
        ]);

        assert!(list.permits("iam", "GetAccountPasswordPolicy", "NoSuchEntity"));
        assert!(!list.permits("iam", "GetUser", "NoSuchEntity"));
        assert!(list.permits("iam", "GetUser", "AccessDenied"));
        assert!(!list.permits("s3", "GetUser", "AccessDenied"));
    }

    #[test]
    fn parses_toml_with_rules() {
        let config = CrawlConfig::from_toml(
            r#"
            regions = ["us-east-1", "eu-west-1"]
            max_passes = 5
            exclude_operations = ["GetCredentialReport"]

            [universal]
            partitionType = ["aws"]

            [[non_fatal]]
            namespace = "iam"
            kinds = ["AccessDenied"]

            [[transforms]]
            kind = "json_encode"
            namespace = "iam"
            shape = "policyDocumentType"
            "#,
        )
        .unwrap();

        assert_eq!(config.regions, vec!["us-east-1", "eu-west-1"]);
        assert_eq!(config.max_passes, Some(5));
        assert_eq!(config.non_fatal[0].operation, ANY_OPERATION);
        assert_eq!(config.universal["partitionType"], vec![Value::from("aws")]);
        assert_eq!(
            config.transforms,
            vec![TransformRule::JsonEncode {
                namespace: "iam".into(),
                shape: "policyDocumentType".into()
            }]
        );
        assert_eq!(config.read_only_prefixes.len(), 3);
    }

    #[test]
    fn invalid_toml_values_are_reported() {
        let err = CrawlConfig::from_toml("max_candidates = 0").unwrap_err();
        assert!(err.contains("max_candidates"));
    }

    #[test]
    fn registry_excludes_configured_operations() {
        let config = CrawlConfig {
            exclude_operations: vec!["GetCredentialReport".into()],
            ..Default::default()
        };
        let registry = config.registry("iam").unwrap();
        assert!(registry.is_excluded("iam", "GetCredentialReport"));
        assert!(!registry.is_excluded("iam", "GetUser"));
    }
}
