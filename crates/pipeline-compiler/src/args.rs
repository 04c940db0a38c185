//! Layered engine arguments
//!
//! Arguments arrive as ordered `name`/`value` lists from several layers
//! (provider defaults, then pipeline overrides). A value is either a scalar
//! or a list. Merging keeps every value: nothing is deduplicated and a later
//! layer appends to, rather than replaces, an earlier one.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// A scalar or list value as written in a configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Single(String),
    Multiple(Vec<String>),
}

impl ArgValue {
    pub fn into_values(self) -> Vec<String> {
        match self {
            ArgValue::Single(value) => vec![value],
            ArgValue::Multiple(values) => values,
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Single(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Single(value)
    }
}

impl From<Vec<&str>> for ArgValue {
    fn from(values: Vec<&str>) -> Self {
        ArgValue::Multiple(values.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(values: Vec<String>) -> Self {
        ArgValue::Multiple(values)
    }
}

/// Untyped document value; numbers and booleans are rendered as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
    List(Vec<RawValue>),
}

impl RawValue {
    fn into_values(self) -> Vec<String> {
        match self {
            RawValue::Text(text) => vec![text],
            RawValue::Integer(n) => vec![n.to_string()],
            RawValue::Float(n) => vec![n.to_string()],
            RawValue::Flag(b) => vec![b.to_string()],
            RawValue::List(items) => items.into_iter().flat_map(RawValue::into_values).collect(),
        }
    }
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawValue::deserialize(deserializer)? {
            RawValue::List(items) => {
                ArgValue::Multiple(items.into_iter().flat_map(RawValue::into_values).collect())
            }
            RawValue::Text(text) => ArgValue::Single(text),
            RawValue::Integer(n) => ArgValue::Single(n.to_string()),
            RawValue::Float(n) => ArgValue::Single(n.to_string()),
            RawValue::Flag(b) => ArgValue::Single(b.to_string()),
        })
    }
}

/// Deserialize a scalar (string, number or boolean) as text, rejecting lists.
pub(crate) fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match ArgValue::deserialize(deserializer)? {
        ArgValue::Single(value) => Ok(value),
        ArgValue::Multiple(_) => Err(D::Error::custom("expected a scalar value, found a list")),
    }
}

/// One `name`/`value` entry of an argument layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedArg {
    pub name: String,
    pub value: ArgValue,
}

impl NamedArg {
    pub fn new(name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Argument name to ordered, duplicate-preserving values.
///
/// Keys iterate in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentMultimap {
    entries: IndexMap<String, Vec<String>>,
}

impl ArgumentMultimap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a document layer into a multimap.
    pub fn from_named(args: &[NamedArg]) -> Self {
        let mut map = Self::new();
        for arg in args {
            map.insert(arg.name.clone(), arg.value.clone());
        }
        map
    }

    /// Append one value under `name`.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.slot(name.into()).push(value.into());
    }

    /// Append a scalar or every element of a list under `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        let values = value.into().into_values();
        self.slot(name.into()).extend(values);
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of values across all keys.
    pub fn value_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Merge layers in order. Each key's values are the concatenation of
    /// that key's values across layers, first layer first.
    pub fn merge<'a>(layers: impl IntoIterator<Item = &'a ArgumentMultimap>) -> Self {
        let mut merged = Self::new();
        for layer in layers {
            for (key, values) in layer.iter() {
                merged.slot(key.to_string()).extend(values.iter().cloned());
            }
        }
        merged
    }

    /// One `--{key}={value}` token per value.
    pub fn to_flags(&self) -> Vec<String> {
        self.iter()
            .flat_map(|(key, values)| values.iter().map(move |value| format!("--{}={}", key, value)))
            .collect()
    }

    fn slot(&mut self, name: String) -> &mut Vec<String> {
        self.entries.entry(name).or_default()
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for ArgumentMultimap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_merge_concatenates_in_layer_order() {
        let defaults: ArgumentMultimap = [("runner", "DirectRunner"), ("direct_num_workers", "1")]
            .into_iter()
            .collect();
        let overrides: ArgumentMultimap = [("runner", "DataflowRunner")].into_iter().collect();

        let merged = ArgumentMultimap::merge([&defaults, &overrides]);
        assert_eq!(merged.get("runner").unwrap(), ["DirectRunner", "DataflowRunner"]);
        assert_eq!(merged.get("direct_num_workers").unwrap(), ["1"]);
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["runner", "direct_num_workers"]);
    }

    #[test]
    fn test_duplicates_preserved() {
        let layer: ArgumentMultimap = [("experiments", "a"), ("experiments", "a")].into_iter().collect();
        let merged = ArgumentMultimap::merge([&layer, &layer]);
        assert_eq!(merged.get("experiments").unwrap().len(), 4);
    }

    #[test]
    fn test_scalar_and_list_normalize() {
        let mut map = ArgumentMultimap::new();
        map.insert("experiments", vec!["use_runner_v2", "shuffle_mode=service"]);
        map.insert("experiments", "no_use_multiple_sdk_containers");

        assert_eq!(
            map.to_flags(),
            vec![
                "--experiments=use_runner_v2",
                "--experiments=shuffle_mode=service",
                "--experiments=no_use_multiple_sdk_containers",
            ]
        );
    }

    #[test]
    fn test_deserialize_named_args() {
        let yaml = r#"
- name: project
  value: my-project
- name: max_num_workers
  value: 4
- name: experiments
  value: [a, b]
- name: save_main_session
  value: true
"#;
        let args: Vec<NamedArg> = serde_yaml::from_str(yaml).unwrap();
        let map = ArgumentMultimap::from_named(&args);
        assert_eq!(
            map.to_flags(),
            vec![
                "--project=my-project",
                "--max_num_workers=4",
                "--experiments=a",
                "--experiments=b",
                "--save_main_session=true",
            ]
        );
    }

    #[test]
    fn test_keys_keep_first_insertion_order() {
        let first: ArgumentMultimap = [("runner", "a"), ("project", "p")].into_iter().collect();
        let second: ArgumentMultimap = [("temp_location", "t"), ("runner", "b")].into_iter().collect();

        let merged = ArgumentMultimap::merge([&first, &second]);
        assert_eq!(merged.keys().collect::<Vec<_>>(), vec!["runner", "project", "temp_location"]);
        assert!(merged.contains_key("temp_location"));
        assert!(!merged.contains_key("region"));
        assert_eq!(
            merged.to_flags(),
            vec!["--runner=a", "--runner=b", "--project=p", "--temp_location=t"]
        );
    }

    #[test]
    fn test_empty_merge() {
        let merged = ArgumentMultimap::merge(std::iter::empty());
        assert!(merged.is_empty());
        assert!(merged.to_flags().is_empty());
    }

    fn layer() -> impl Strategy<Value = ArgumentMultimap> {
        prop::collection::vec(("[a-d]", "[a-z0-9=]{0,4}"), 0..8)
            .prop_map(|pairs| pairs.into_iter().collect())
    }

    proptest! {
        #[test]
        fn merge_is_concatenation(first in layer(), second in layer()) {
            let merged = ArgumentMultimap::merge([&first, &second]);
            for key in first.keys().chain(second.keys()) {
                let mut expected = first.get(key).unwrap_or_default().to_vec();
                expected.extend_from_slice(second.get(key).unwrap_or_default());
                prop_assert_eq!(merged.get(key).unwrap(), expected.as_slice());
            }
            prop_assert_eq!(merged.value_count(), first.value_count() + second.value_count());
        }

        #[test]
        fn flags_cover_every_value(map in layer()) {
            let flags = map.to_flags();
            prop_assert_eq!(flags.len(), map.value_count());
            let expected: Vec<String> = map
                .iter()
                .flat_map(|(k, vs)| vs.iter().map(move |v| format!("--{}={}", k, v)))
                .collect();
            prop_assert_eq!(flags, expected);
        }
    }
}
