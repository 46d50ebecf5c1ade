//! Structured value overrides (`set`, `set_sensitive`, `set_list`)
//!
//! An override writes a single value at a key path inside the values tree.
//! Key paths are dot separated; a literal dot inside a key is escaped with a
//! backslash (`podAnnotations.prometheus\.io/scrape`) and list elements are
//! addressed with `[index]` (`servers[0].port`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::values::Values;

/// Largest list index an override may address
pub const MAX_INDEX: usize = 65536;

/// How the raw string value of an override is interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideKind {
    /// Infer booleans, null and integers; everything else is a string
    #[default]
    Auto,
    /// Always store the value as a string
    String,
    /// Parse the value as a YAML/JSON fragment
    Literal,
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::String => write!(f, "string"),
            Self::Literal => write!(f, "literal"),
        }
    }
}

impl FromStr for OverrideKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "string" => Ok(Self::String),
            "literal" => Ok(Self::Literal),
            _ => Err(format!("unknown override type: {}", s)),
        }
    }
}

/// A single `name = value` assignment applied on top of the overlays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueOverride {
    /// Dot separated key path
    pub name: String,

    /// Raw value
    pub value: String,

    /// Parsing mode
    #[serde(default, rename = "type")]
    pub kind: OverrideKind,
}

impl ValueOverride {
    /// Create an override with type inference
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            kind: OverrideKind::Auto,
        }
    }

    /// Create an override whose value is always a string
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: OverrideKind::String,
            ..Self::new(name, value)
        }
    }

    /// Create an override whose value is a YAML/JSON fragment
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: OverrideKind::Literal,
            ..Self::new(name, value)
        }
    }

    /// Interpret the raw value according to the override kind
    pub fn parsed_value(&self) -> Result<JsonValue> {
        match self.kind {
            OverrideKind::Auto => Ok(typed_value(&self.value)),
            OverrideKind::String => Ok(JsonValue::String(self.value.clone())),
            OverrideKind::Literal => serde_yaml::from_str::<JsonValue>(&self.value)
                .map_err(|e| CoreError::invalid_override(&self.name, e.to_string())),
        }
    }

    /// Write this override into a values tree
    pub fn apply(&self, values: &mut Values) -> Result<()> {
        let path = parse_path(&self.name)?;
        let value = self.parsed_value()?;
        set_path(&mut values.0, &path, value);
        Ok(())
    }
}

/// A `set_list` entry: a list of strings written at a key path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOverride {
    pub name: String,
    #[serde(default)]
    pub value: Vec<String>,
}

impl ListOverride {
    pub fn new(name: impl Into<String>, value: Vec<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn apply(&self, values: &mut Values) -> Result<()> {
        let path = parse_path(&self.name)?;
        let list = self
            .value
            .iter()
            .map(|v| JsonValue::String(v.clone()))
            .collect();
        set_path(&mut values.0, &path, JsonValue::Array(list));
        Ok(())
    }
}

/// One step of a key path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse a key path such as `a.b\.c[2].d` into segments
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    if path.is_empty() {
        return Err(CoreError::invalid_override(path, "key path is empty"));
    }

    let mut segments = Vec::new();
    let mut key = String::new();
    // true right after `]`, where only `.`, `[` or the end may follow
    let mut after_index = false;
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if after_index {
                    return Err(CoreError::invalid_override(path, "unexpected character after index"));
                }
                let escaped = chars
                    .next()
                    .ok_or_else(|| CoreError::invalid_override(path, "dangling escape at end of key"))?;
                key.push(escaped);
            }
            '.' => {
                if after_index {
                    after_index = false;
                    continue;
                }
                if key.is_empty() {
                    return Err(CoreError::invalid_override(path, "empty key segment"));
                }
                segments.push(PathSegment::Key(std::mem::take(&mut key)));
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                } else if segments.is_empty() {
                    return Err(CoreError::invalid_override(path, "key path cannot start with an index"));
                } else if !after_index {
                    return Err(CoreError::invalid_override(path, "empty key segment"));
                }

                let mut digits = String::new();
                let mut closed = false;
                for d in chars.by_ref() {
                    if d == ']' {
                        closed = true;
                        break;
                    }
                    digits.push(d);
                }
                if !closed {
                    return Err(CoreError::invalid_override(path, "unterminated index"));
                }
                let index: usize = digits.trim().parse().map_err(|_| {
                    CoreError::invalid_override(path, format!("invalid list index '{}'", digits))
                })?;
                if index > MAX_INDEX {
                    return Err(CoreError::invalid_override(
                        path,
                        format!("index {} is greater than maximum supported index {}", index, MAX_INDEX),
                    ));
                }
                segments.push(PathSegment::Index(index));
                after_index = true;
            }
            other => {
                if after_index {
                    return Err(CoreError::invalid_override(path, "unexpected character after index"));
                }
                key.push(other);
            }
        }
    }

    if !key.is_empty() {
        segments.push(PathSegment::Key(key));
    } else if !after_index {
        return Err(CoreError::invalid_override(path, "empty key segment"));
    }

    Ok(segments)
}

/// Infer the type of a raw override value
///
/// `true`/`false` become booleans and `null` becomes null (case-insensitive),
/// `0` and integers without a leading zero become numbers. Anything else,
/// floats and zero-padded numbers included, stays a string. Commas are never
/// treated as list separators.
pub fn typed_value(raw: &str) -> JsonValue {
    if raw.eq_ignore_ascii_case("true") {
        return JsonValue::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return JsonValue::Bool(false);
    }
    if raw.eq_ignore_ascii_case("null") {
        return JsonValue::Null;
    }
    if raw == "0" {
        return JsonValue::Number(0.into());
    }
    if !raw.is_empty() && !raw.starts_with('0') {
        if let Ok(n) = raw.parse::<i64>() {
            return JsonValue::Number(n.into());
        }
    }
    JsonValue::String(raw.to_string())
}

/// Write `value` at `path`, creating intermediate maps and lists as needed
///
/// A scalar found where a map or list is required is replaced.
pub(crate) fn set_path(target: &mut JsonValue, path: &[PathSegment], value: JsonValue) {
    let Some((head, rest)) = path.split_first() else {
        *target = value;
        return;
    };

    match head {
        PathSegment::Key(key) => {
            if !target.is_object() {
                *target = JsonValue::Object(Map::new());
            }
            if let JsonValue::Object(map) = target {
                let entry = map.entry(key.clone()).or_insert(JsonValue::Null);
                set_path(entry, rest, value);
            }
        }
        PathSegment::Index(index) => {
            if !target.is_array() {
                *target = JsonValue::Array(Vec::new());
            }
            if let JsonValue::Array(list) = target {
                if list.len() <= *index {
                    list.resize(index + 1, JsonValue::Null);
                }
                set_path(&mut list[*index], rest, value);
            }
        }
    }
}
