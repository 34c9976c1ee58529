use crate::hash::ValueHash;
use crate::lineage::Lineage;
use serde::Serialize;
use serde_json::Value;

/// A value observed for some shape, with the provenance that produced it
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    pub value: Value,
    pub lineage: Lineage,
    #[serde(skip)]
    pub hash: ValueHash,
}

impl Entity {
    pub fn new(value: Value, lineage: Lineage) -> Self {
        let hash = ValueHash::of(&value);
        Self {
            value,
            lineage,
            hash,
        }
    }

    /// Scalars are deduplicated by hash; lists and maps always append
    pub fn is_scalar(&self) -> bool {
        !matches!(self.value, Value::Array(_) | Value::Object(_))
    }
}
