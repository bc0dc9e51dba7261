//! The shared value bag.
//!
//! One bag per render tree, created lazily at the root the first time any
//! node touches it. Every node of the tree sees the same instance, so a
//! child can leave values for its parent and its layout.
//!
//! ```
//! use vellum::ValueBag;
//!
//! let mut bag = ValueBag::new();
//! bag.set("total", 2).unwrap();
//! assert_eq!(bag.get_as::<i64>("total"), Some(2));
//! ```

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValueBag {
    values: BTreeMap<String, Value>,
}

impl ValueBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bag from the fields of any serializable object.
    ///
    /// Fails unless `value` serializes to a JSON object (or `null`, which
    /// gives an empty bag).
    pub fn from_serialize(value: impl Serialize) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(value)? {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(serde::de::Error::custom(format!(
                "a value bag needs an object, got `{other}`"
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read. `None` when absent or of a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Typed write.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<(), serde_json::Error> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The whole bag as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<_, _>>(),
        )
    }
}

impl FromIterator<(String, Value)> for ValueBag {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
