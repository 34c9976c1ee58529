use async_trait::async_trait;
use grump_shapes::Operation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure raised by the invocation collaborator.
///
/// `kind` is the provider's error code (e.g. `AccessDenied`) and is what the
/// non-fatal allow-list is matched against.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct InvocationError {
    pub kind: String,
    pub message: String,
}

impl InvocationError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Calls one operation of the crawled service.
///
/// Every call names the region it belongs to; implementations route it to that
/// region's endpoint.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn call(
        &self,
        region: &str,
        operation: &str,
        params: &Value,
    ) -> Result<Value, InvocationError>;

    /// Every page of a paginated call, in order. The default issues a single call.
    async fn paginate(
        &self,
        region: &str,
        operation: &Operation,
        params: &Value,
    ) -> Result<Vec<Value>, InvocationError> {
        Ok(vec![self.call(region, &operation.name, params).await?])
    }
}

/// Call `operation` in `region`, merging pages when it is paginated
pub async fn invoke<I>(
    invoker: &I,
    region: &str,
    operation: &Operation,
    params: &Value,
) -> Result<Value, InvocationError>
where
    I: Invoker + ?Sized,
{
    if operation.is_paginated() {
        let pages = invoker.paginate(region, operation, params).await?;
        log::debug!("{}: merging {} page(s)", operation.name, pages.len());
        Ok(merge_pages(pages))
    } else {
        invoker.call(region, &operation.name, params).await
    }
}

/// Merge response pages key-wise: list values under a repeated key are concatenated,
/// everything else is last-write.
pub fn merge_pages(pages: Vec<Value>) -> Value {
    let mut merged = serde_json::Map::new();
    for page in pages {
        let Value::Object(page) = page else {
            log::debug!("skipping non-object page");
            continue;
        };
        for (key, value) in page {
            match (merged.get_mut(&key), value) {
                (Some(Value::Array(existing)), Value::Array(more)) => existing.extend(more),
                (_, value) => {
                    merged.insert(key, value);
                }
            }
        }
    }
    Value::Object(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grump_shapes::Pagination;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn pages_concatenate_lists_and_overwrite_scalars() {
        let merged = merge_pages(vec![
            json!({"Users": [{"UserName": "a"}], "Marker": "m1", "IsTruncated": true}),
            json!({"Users": [{"UserName": "b"}], "IsTruncated": false}),
        ]);
        assert_eq!(
            merged,
            json!({
                "Users": [{"UserName": "a"}, {"UserName": "b"}],
                "Marker": "m1",
                "IsTruncated": false
            })
        );
    }

    #[test]
    fn a_list_replaces_a_scalar_under_the_same_key() {
        let merged = merge_pages(vec![json!({"Items": "none"}), json!({"Items": [1]})]);
        assert_eq!(merged, json!({"Items": [1]}));
    }

    struct Pager {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Invoker for Pager {
        async fn call(
            &self,
            region: &str,
            operation: &str,
            _params: &Value,
        ) -> Result<Value, InvocationError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("call:{region}:{operation}"));
            Ok(json!({"Items": [0]}))
        }

        async fn paginate(
            &self,
            region: &str,
            operation: &Operation,
            _params: &Value,
        ) -> Result<Vec<Value>, InvocationError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("paginate:{region}:{}", operation.name));
            Ok(vec![json!({"Items": [1]}), json!({"Items": [2]})])
        }
    }

    fn operation(paginated: bool) -> Operation {
        Operation {
            name: "ListItems".into(),
            input: None,
            output: None,
            pagination: paginated.then(|| Pagination {
                input_tokens: vec!["NextToken".into()],
                output_tokens: vec!["NextToken".into()],
                limit_key: None,
            }),
        }
    }

    #[tokio::test]
    async fn paginated_operations_are_paged_and_merged() {
        let pager = Pager {
            calls: Mutex::new(Vec::new()),
        };

        let merged = invoke(&pager, "us-east-1", &operation(true), &json!({}))
            .await
            .unwrap();
        assert_eq!(merged, json!({"Items": [1, 2]}));

        let single = invoke(&pager, "eu-west-1", &operation(false), &json!({}))
            .await
            .unwrap();
        assert_eq!(single, json!({"Items": [0]}));

        assert_eq!(
            *pager.calls.lock().unwrap(),
            vec![
                "paginate:us-east-1:ListItems".to_string(),
                "call:eu-west-1:ListItems".to_string()
            ]
        );
    }
}
