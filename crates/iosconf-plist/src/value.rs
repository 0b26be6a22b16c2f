use serde::ser::{Serialize, SerializeMap, Serializer};

/// A property-list value.
///
/// Dates and data blobs are kept as their textual encodings; nothing in the
/// resolution engine needs to interpret them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// ISO 8601 text as found in `<date>`.
    Date(String),
    /// Base64 text as found in `<data>`, whitespace removed.
    Data(String),
    Array(Vec<Value>),
    Dictionary(Dictionary),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&Dictionary> {
        match self {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Collects every string leaf below this value, depth first.
    pub fn string_leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_strings(&mut out);
        out
    }

    fn collect_strings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Value::String(s) => out.push(s),
            Value::Array(items) => items.iter().for_each(|item| item.collect_strings(out)),
            Value::Dictionary(dict) => dict.values().for_each(|item| item.collect_strings(out)),
            _ => {}
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<Dictionary> for Value {
    fn from(value: Dictionary) -> Self {
        Value::Dictionary(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::String(s) | Value::Date(s) | Value::Data(s) => serializer.serialize_str(s),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Array(items) => items.serialize(serializer),
            Value::Dictionary(dict) => dict.serialize(serializer),
        }
    }
}

/// String-keyed mapping that remembers insertion order.
///
/// Inserting an existing key replaces its value in place, so the key keeps
/// the position of its first insertion. Merging several partial mappings
/// therefore yields a stable key order with later values winning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: Vec<(String, Value)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Overlays `other` onto `self`; keys present in both take `other`'s value.
    pub fn merge(&mut self, other: Dictionary) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Dictionary::new();
        for (key, value) in iter {
            dict.insert(key, value);
        }
        dict
    }
}

impl IntoIterator for Dictionary {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_in_place() {
        let mut dict = Dictionary::new();
        dict.insert("a", "1");
        dict.insert("b", "2");
        let previous = dict.insert("a", "3");

        assert_eq!(previous, Some(Value::from("1")));
        assert_eq!(dict.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(dict.get("a"), Some(&Value::from("3")));
    }

    #[test]
    fn test_merge_later_wins() {
        let mut base: Dictionary = [("CFBundleName", "Base"), ("CFBundleVersion", "1")]
            .into_iter()
            .collect();
        let overlay: Dictionary = [("CFBundleName", "Override"), ("Extra", "x")]
            .into_iter()
            .collect();

        base.merge(overlay);

        assert_eq!(base.len(), 3);
        assert_eq!(base.get("CFBundleName").and_then(Value::as_str), Some("Override"));
        assert_eq!(
            base.keys().collect::<Vec<_>>(),
            vec!["CFBundleName", "CFBundleVersion", "Extra"]
        );
    }

    #[test]
    fn test_string_leaves_are_depth_first() {
        let mut inner = Dictionary::new();
        inner.insert("k", "b");
        let value = Value::Array(vec![
            Value::from("a"),
            Value::Integer(3),
            Value::Dictionary(inner),
            Value::from(vec!["c"]),
        ]);

        assert_eq!(value.string_leaves(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_serializes_to_ordered_json() {
        let mut dict = Dictionary::new();
        dict.insert("z", 1i64);
        dict.insert("a", true);

        let json = serde_json::to_string(&Value::Dictionary(dict)).expect("serialize");
        assert_eq!(json, r#"{"z":1,"a":true}"#);
    }
}
