//! Values handling with deep merge support

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::cloak::cloak;
use crate::error::{CoreError, Result};
use crate::overrides::{ListOverride, PathSegment, ValueOverride, parse_path, set_path};

/// Values container with deep merge capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Default for Values {
    fn default() -> Self {
        Self::new()
    }
}

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse values from a YAML string
    ///
    /// An empty document yields empty values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Self::from_overlay(yaml)?.unwrap_or_default())
    }

    /// Parse one overlay document
    ///
    /// Returns `None` for documents that are blank or only comments. A
    /// document whose root is not a map is rejected.
    pub fn from_overlay(doc: &str) -> Result<Option<Self>> {
        if doc.trim().is_empty() {
            return Ok(None);
        }

        let parsed: JsonValue = serde_yaml::from_str(doc).map_err(|e| CoreError::InvalidValues {
            fragment: doc.to_string(),
            message: e.to_string(),
        })?;

        match parsed {
            JsonValue::Null => Ok(None),
            JsonValue::Object(_) => Ok(Some(Self(parsed))),
            other => Err(CoreError::InvalidValues {
                fragment: doc.to_string(),
                message: format!("values must be a map, got {}", json_type_name(&other)),
            }),
        }
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Objects: recursive merge
    /// - Scalars and arrays: overlay replaces base (arrays are never concatenated)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Set a value by key path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let segments = parse_path(path)?;
        set_path(&mut self.0, &segments, value);
        Ok(())
    }

    /// Get a value by key path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let segments = parse_path(path).ok()?;
        get_path(&self.0, &segments)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Serialize to a compact JSON string with sorted keys
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&Sorted(&self.0))?)
    }

    /// Serialize to YAML with sorted keys
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&Sorted(&self.0))?)
    }
}

/// Everything that contributes to a release's values
///
/// Application order is fixed: overlays left to right, then `set`, then
/// `set_sensitive`, then `set_list`, each in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSources {
    /// Raw YAML documents
    #[serde(default)]
    pub values: Vec<String>,

    #[serde(default)]
    pub set: Vec<ValueOverride>,

    #[serde(default)]
    pub set_sensitive: Vec<ValueOverride>,

    #[serde(default)]
    pub set_list: Vec<ListOverride>,
}

impl ValueSources {
    /// Merge all sources into one tree
    pub fn merge(&self) -> Result<MergedValues> {
        let mut values = merge_overlays(&self.values)?;

        for o in &self.set {
            o.apply(&mut values)?;
        }
        for o in &self.set_sensitive {
            o.apply(&mut values)?;
        }
        for o in &self.set_list {
            o.apply(&mut values)?;
        }

        Ok(MergedValues {
            values,
            sensitive_paths: self.set_sensitive.iter().map(|o| o.name.clone()).collect(),
        })
    }

    /// Raw values of every `set_sensitive` entry
    pub fn sensitive_literals(&self) -> Vec<&str> {
        self.set_sensitive.iter().map(|o| o.value.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
            && self.set.is_empty()
            && self.set_sensitive.is_empty()
            && self.set_list.is_empty()
    }
}

/// Result of merging `ValueSources`
///
/// `values()` is what gets submitted to an install or render call;
/// `cloaked()` is the only form that may be logged or persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedValues {
    values: Values,
    sensitive_paths: Vec<String>,
}

impl MergedValues {
    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn into_values(self) -> Values {
        self.values
    }

    pub fn sensitive_paths(&self) -> &[String] {
        &self.sensitive_paths
    }

    /// Copy of the tree with every sensitive path redacted
    pub fn cloaked(&self) -> Values {
        cloak(&self.values, &self.sensitive_paths)
    }

    /// JSON form of the cloaked tree, as stored in release metadata
    pub fn cloaked_json(&self) -> Result<String> {
        self.cloaked().to_json()
    }
}

/// Merge overlays, then overrides, then sensitive overrides
pub fn merge(
    overlays: &[String],
    overrides: &[ValueOverride],
    sensitive_overrides: &[ValueOverride],
) -> Result<Values> {
    let sources = ValueSources {
        values: overlays.to_vec(),
        set: overrides.to_vec(),
        set_sensitive: sensitive_overrides.to_vec(),
        set_list: Vec::new(),
    };
    Ok(sources.merge()?.into_values())
}

/// Merge overlay documents left to right
fn merge_overlays(overlays: &[String]) -> Result<Values> {
    let mut result = Values::new();
    for doc in overlays {
        if let Some(overlay) = Values::from_overlay(doc)? {
            result.merge(&overlay);
        }
    }
    Ok(result)
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

fn get_path<'a>(value: &'a JsonValue, path: &[PathSegment]) -> Option<&'a JsonValue> {
    let Some((head, rest)) = path.split_first() else {
        return Some(value);
    };

    let next = match (head, value) {
        (PathSegment::Key(key), JsonValue::Object(map)) => map.get(key)?,
        (PathSegment::Index(i), JsonValue::Array(list)) => list.get(*i)?,
        _ => return None,
    };
    get_path(next, rest)
}

/// Serializes a JSON value with map keys in lexical order at every level
struct Sorted<'a>(&'a JsonValue);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            JsonValue::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Sorted(value))?;
                }
                out.end()
            }
            JsonValue::Array(list) => serializer.collect_seq(list.iter().map(Sorted)),
            other => other.serialize(serializer),
        }
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloak::SENSITIVE_VALUE;
    use serde_json::json;

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_yaml(
            r#"
image:
  repository: nginx
  tag: "1.0"
replicas: 1
"#,
        )
        .unwrap();

        let overlay = Values::from_yaml(
            r#"
image:
  tag: "2.0"
  pullPolicy: Always
replicas: 3
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("image.repository").unwrap(), "nginx");
        assert_eq!(base.get("image.tag").unwrap(), "2.0");
        assert_eq!(base.get("image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_lists_are_replaced() {
        let sources = ValueSources {
            values: vec!["hosts: [a, b]".into(), "hosts: [c]".into()],
            ..Default::default()
        };
        let merged = sources.merge().unwrap();
        assert_eq!(merged.values().inner(), &json!({"hosts": ["c"]}));
    }

    #[test]
    fn test_map_replaced_by_scalar() {
        let sources = ValueSources {
            values: vec!["db: {host: x}".into(), "db: disabled".into()],
            ..Default::default()
        };
        let merged = sources.merge().unwrap();
        assert_eq!(merged.values().inner(), &json!({"db": "disabled"}));
    }

    #[test]
    fn test_override_on_overlay() {
        let tree = merge(&["foo: bar".to_string()], &[ValueOverride::new("foo", "qux")], &[]).unwrap();
        assert_eq!(tree.inner(), &json!({"foo": "qux"}));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let overlays = vec![
            "z: 1\na: {y: 2, b: 3}".to_string(),
            "m: [1, 2]\na: {c: 4}".to_string(),
        ];
        let first = merge(&overlays, &[ValueOverride::new("a.d", "5")], &[]).unwrap();
        for _ in 0..10 {
            let again = merge(&overlays, &[ValueOverride::new("a.d", "5")], &[]).unwrap();
            assert_eq!(first.to_json().unwrap(), again.to_json().unwrap());
        }
        assert_eq!(
            first.to_json().unwrap(),
            r#"{"a":{"b":3,"c":4,"d":5,"y":2},"m":[1,2],"z":1}"#
        );
    }

    #[test]
    fn test_empty_overlays_skipped() {
        let sources = ValueSources {
            values: vec!["".into(), "   \n".into(), "# only a comment\n".into(), "a: 1".into()],
            ..Default::default()
        };
        assert_eq!(sources.merge().unwrap().values().inner(), &json!({"a": 1}));
    }

    #[test]
    fn test_malformed_overlay() {
        let sources = ValueSources {
            values: vec!["a: 1".into(), "b: [unclosed".into()],
            ..Default::default()
        };
        match sources.merge().unwrap_err() {
            CoreError::InvalidValues { fragment, .. } => assert_eq!(fragment, "b: [unclosed"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_map_overlay() {
        let err = Values::from_overlay("- a\n- b").unwrap_err();
        assert!(err.to_string().contains("values must be a map"));
    }

    #[test]
    fn test_sensitive_scenario() {
        let sources = ValueSources {
            values: vec!["foo: bar".into(), "foo: baz".into()],
            set_sensitive: vec![ValueOverride::new("foo", "baz")],
            ..Default::default()
        };
        let merged = sources.merge().unwrap();

        assert_eq!(merged.values().inner(), &json!({"foo": "baz"}));
        assert_eq!(merged.cloaked().inner(), &json!({"foo": SENSITIVE_VALUE}));
        // the submitted tree is untouched by cloaking
        assert_eq!(merged.values().inner(), &json!({"foo": "baz"}));
    }

    #[test]
    fn test_application_order() {
        let sources = ValueSources {
            values: vec!["a: overlay".into()],
            set: vec![ValueOverride::new("a", "set")],
            set_sensitive: vec![ValueOverride::new("a", "sensitive")],
            set_list: vec![ListOverride::new("a", vec!["list".into()])],
        };
        let merged = sources.merge().unwrap();
        assert_eq!(merged.values().inner(), &json!({"a": ["list"]}));

        let without_list = ValueSources {
            set_list: vec![],
            ..sources
        };
        assert_eq!(
            without_list.merge().unwrap().values().inner(),
            &json!({"a": "sensitive"})
        );
    }

    #[test]
    fn test_cloaked_json() {
        let sources = ValueSources {
            values: vec!["auth:\n  user: admin\n".into()],
            set_sensitive: vec![ValueOverride::new("auth.password", "hunter2")],
            ..Default::default()
        };
        let json = sources.merge().unwrap().cloaked_json().unwrap();
        assert_eq!(
            json,
            r#"{"auth":{"password":"(sensitive value)","user":"admin"}}"#
        );
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn test_get_with_index() {
        let values = Values::from_yaml("servers:\n  - port: 80\n  - port: 443\n").unwrap();
        assert_eq!(values.get("servers[1].port").unwrap(), 443);
        assert!(values.get("servers[5].port").is_none());
    }
}
