use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One step of provenance: which call, member or index produced a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageStep {
    pub key: String,
    pub value: Value,
}

/// Ordered provenance of a manifested value, from its originating call down to the
/// member that carried it. Keys are unique; steps are shared between sibling entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lineage {
    steps: Vec<Arc<LineageStep>>,
}

impl Lineage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lineage of a single step
    pub fn single(key: impl Into<String>, value: Value) -> Self {
        Self {
            steps: vec![Arc::new(LineageStep {
                key: key.into(),
                value,
            })],
        }
    }

    pub fn from_steps<I, K>(steps: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut lineage = Self::new();
        for (key, value) in steps {
            lineage.push(key, value)?;
        }
        Ok(lineage)
    }

    /// Append a step; rejects a key that is already present
    pub fn push(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        if self.contains_key(&key) {
            return Err(DomainError::DuplicateLineageKey(key));
        }
        self.steps.push(Arc::new(LineageStep { key, value }));
        Ok(())
    }

    /// Copy of this lineage with one more step
    pub fn extended(&self, key: impl Into<String>, value: Value) -> Result<Self> {
        let mut next = self.clone();
        next.push(key, value)?;
        Ok(next)
    }

    /// `label` if unused, otherwise the first free `label#n`.
    ///
    /// Recursive shapes revisit the same member path; numbering keeps their keys unique.
    pub fn unique_key(&self, label: &str) -> String {
        if !self.contains_key(label) {
            return label.to_string();
        }
        (2..)
            .map(|n| format!("{label}#{n}"))
            .find(|candidate| !self.contains_key(candidate))
            .unwrap_or_else(|| label.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.steps
            .iter()
            .find(|step| step.key == key)
            .map(|step| &step.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.steps.iter().any(|step| step.key == key)
    }

    pub fn steps(&self) -> impl Iterator<Item = &LineageStep> {
        self.steps.iter().map(|step| step.as_ref())
    }

    pub fn last(&self) -> Option<&LineageStep> {
        self.steps.last().map(|step| step.as_ref())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn duplicate_keys_are_rejected() {
        let lineage = Lineage::from_steps([("ListThings", json!({}))]).unwrap();
        let err = lineage.extended("ListThings", json!(1)).unwrap_err();
        assert_eq!(err, DomainError::DuplicateLineageKey("ListThings".into()));

        let err = Lineage::from_steps([("a", json!(1)), ("a", json!(2))]).unwrap_err();
        assert_eq!(err, DomainError::DuplicateLineageKey("a".into()));
    }

    #[test]
    fn extending_leaves_the_parent_untouched() {
        let parent = Lineage::from_steps([("op", json!({"Id": "x"}))]).unwrap();
        let child = parent.extended("structure:Thing.Id", json!("Id")).unwrap();
        assert_eq!(parent.len(), 1);
        assert_eq!(child.len(), 2);
        assert_eq!(child.get("op"), Some(&json!({"Id": "x"})));
        assert_eq!(child.last().map(|s| s.key.as_str()), Some("structure:Thing.Id"));
    }

    #[test]
    fn unique_key_numbers_repeated_labels() {
        let lineage = Lineage::from_steps([("a", json!(0)), ("a#2", json!(1))]).unwrap();
        assert_eq!(lineage.unique_key("b"), "b");
        assert_eq!(lineage.unique_key("a"), "a#3");
    }

    #[test]
    fn serializes_as_an_ordered_list_of_steps() {
        let lineage = Lineage::from_steps([("op", json!({})), ("member", json!("Id"))]).unwrap();
        let encoded = serde_json::to_value(&lineage).unwrap();
        assert_eq!(
            encoded,
            json!([{"key": "op", "value": {}}, {"key": "member", "value": "Id"}])
        );
    }
}
