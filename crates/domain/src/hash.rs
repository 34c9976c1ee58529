use serde::{Serialize, Serializer};
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Structural hash of a JSON value.
///
/// Objects hash as the sorted sequence of `(key, hash(value))` pairs, so member order
/// is irrelevant. Arrays hash as the ordered sequence of element hashes, so order and
/// duplicates matter. Scalars hash by value; integral floats hash like integers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueHash([u8; 32]);

impl ValueHash {
    pub fn of(value: &Value) -> Self {
        structural_hash(value)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::with_capacity(64);
        for byte in self.0 {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Debug for ValueHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueHash({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ValueHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ValueHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

pub fn structural_hash(value: &Value) -> ValueHash {
    let mut hasher = Sha256::new();

    match value {
        Value::Null => hasher.update(b"null"),
        Value::Bool(flag) => {
            hasher.update(b"bool");
            hasher.update([u8::from(*flag)]);
        }
        Value::Number(number) => {
            hasher.update(b"num");
            hasher.update(number_repr(number).as_bytes());
        }
        Value::String(text) => {
            hasher.update(b"str");
            update_len_prefixed(&mut hasher, text.as_bytes());
        }
        Value::Array(items) => {
            hasher.update(b"seq");
            hasher.update((items.len() as u64).to_be_bytes());
            for item in items {
                hasher.update(structural_hash(item).0);
            }
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, ValueHash)> = map
                .iter()
                .map(|(key, item)| (key, structural_hash(item)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            hasher.update(b"map");
            hasher.update((entries.len() as u64).to_be_bytes());
            for (key, item) in entries {
                update_len_prefixed(&mut hasher, key.as_bytes());
                hasher.update(item.0);
            }
        }
    }

    ValueHash(hasher.finalize().into())
}

fn update_len_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

fn number_repr(number: &Number) -> String {
    if let Some(f) = number.as_f64().filter(|_| number.is_f64()) {
        if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
            return (f as i64).to_string();
        }
    }
    number.to_string()
}
