//! Raw service description as published in botocore-style JSON models.
//!
//! These types are a faithful, permissive mirror of the on-disk layout: unknown
//! fields are ignored and nothing is resolved. Resolution into a typed graph is
//! the job of [`crate::ShapeModelBuilder`].

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to another shape (`{"shape": "Name"}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeRef {
    pub shape: String,

    /// Member is filled by the SDK on write operations
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub idempotency_token: bool,
}

impl ShapeRef {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            idempotency_token: false,
        }
    }
}

/// One entry of the `shapes` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawShape {
    #[serde(rename = "type")]
    pub type_name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub members: BTreeMap<String, ShapeRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<ShapeRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<ShapeRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ShapeRef>,

    /// Alias target (`{"type": "alias", "shape": "String"}`)
    #[serde(default, rename = "shape", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_format: Option<String>,
}

impl RawShape {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn with_member(mut self, name: impl Into<String>, shape: impl Into<String>) -> Self {
        self.members.insert(name.into(), ShapeRef::new(shape));
        self
    }

    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn with_element(mut self, shape: impl Into<String>) -> Self {
        self.member = Some(ShapeRef::new(shape));
        self
    }

    pub fn with_entries(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.key = Some(ShapeRef::new(key));
        self.value = Some(ShapeRef::new(value));
        self
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn aliasing(target: impl Into<String>) -> Self {
        Self {
            type_name: "alias".to_string(),
            target: Some(target.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<ShapeRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ShapeRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// A whole `service-2.json` document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSchema {
    #[serde(default)]
    pub metadata: ServiceMetadata,

    #[serde(default)]
    pub operations: BTreeMap<String, RawOperation>,

    #[serde(default)]
    pub shapes: BTreeMap<String, RawShape>,
}

impl ServiceSchema {
    pub fn from_json(body: &str) -> Result<Self> {
        let mut schema: Self = serde_json::from_str(body)?;
        // Operation names are keys in the table; the inner `name` is optional in hand-written models.
        for (name, op) in schema.operations.iter_mut() {
            if op.name.is_empty() {
                op.name = name.clone();
            }
        }
        Ok(schema)
    }

    /// Namespace used for shape identities and transform lookups
    pub fn namespace(&self) -> String {
        self.metadata
            .endpoint_prefix
            .clone()
            .or_else(|| {
                self.metadata
                    .service_id
                    .as_ref()
                    .map(|id| id.to_lowercase().replace(' ', "-"))
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn with_shape(mut self, name: impl Into<String>, shape: RawShape) -> Self {
        self.shapes.insert(name.into(), shape);
        self
    }

    pub fn with_operation(
        mut self,
        name: impl Into<String>,
        input: Option<&str>,
        output: Option<&str>,
    ) -> Self {
        let name = name.into();
        self.operations.insert(
            name.clone(),
            RawOperation {
                name,
                input: input.map(ShapeRef::new),
                output: output.map(ShapeRef::new),
            },
        );
        self
    }
}

/// `input_token` / `output_token` may be a single key or a list of keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenKeys {
    One(String),
    Many(Vec<String>),
}

impl TokenKeys {
    pub fn keys(&self) -> Vec<String> {
        match self {
            TokenKeys::One(key) => vec![key.clone()],
            TokenKeys::Many(keys) => keys.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPaginator {
    pub input_token: TokenKeys,
    pub output_token: TokenKeys,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_key: Option<String>,
}

/// A whole `paginators-1.json` document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatorDocument {
    #[serde(default)]
    pub pagination: BTreeMap<String, RawPaginator>,
}

impl PaginatorDocument {
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_botocore_layout() {
        let body = r#"{
            "metadata": {"endpointPrefix": "acm", "serviceId": "ACM"},
            "operations": {
                "ListCertificates": {
                    "name": "ListCertificates",
                    "http": {"method": "POST"},
                    "input": {"shape": "ListCertificatesRequest"},
                    "output": {"shape": "ListCertificatesResponse"}
                }
            },
            "shapes": {
                "ListCertificatesRequest": {
                    "type": "structure",
                    "members": {"NextToken": {"shape": "NextToken"}},
                    "documentation": "ignored"
                },
                "NextToken": {"type": "string", "min": 1, "max": 10000, "pattern": "[\\u0009\\u000A]*"}
            }
        }"#;

        let schema = ServiceSchema::from_json(body).unwrap();
        assert_eq!(schema.namespace(), "acm");
        let op = &schema.operations["ListCertificates"];
        assert_eq!(op.input.as_ref().unwrap().shape, "ListCertificatesRequest");
        let token = &schema.shapes["NextToken"];
        assert_eq!(token.min, Some(1.0));
        assert_eq!(token.max, Some(10000.0));
    }

    #[test]
    fn fills_missing_operation_names_from_keys() {
        let schema =
            ServiceSchema::from_json(r#"{"operations": {"GetThing": {}}, "shapes": {}}"#).unwrap();
        assert_eq!(schema.operations["GetThing"].name, "GetThing");
        assert_eq!(schema.namespace(), "unknown");
    }

    #[test]
    fn paginator_tokens_accept_single_or_many() {
        let doc = PaginatorDocument::from_json(
            r#"{"pagination": {
                "ListA": {"input_token": "NextToken", "output_token": "NextToken", "limit_key": "MaxItems"},
                "ListB": {"input_token": ["Marker", "Page"], "output_token": ["NextMarker", "NextPage"]}
            }}"#,
        )
        .unwrap();
        assert_eq!(doc.pagination["ListA"].input_token.keys(), vec!["NextToken"]);
        assert_eq!(
            doc.pagination["ListB"].output_token.keys(),
            vec!["NextMarker", "NextPage"]
        );
        assert_eq!(doc.pagination["ListB"].limit_key, None);
    }
}
