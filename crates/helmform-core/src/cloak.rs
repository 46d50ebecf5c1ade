//! Sensitive value cloaking
//!
//! Cloaking produces a redacted copy of a values tree. The copy is what gets
//! logged and persisted; the original tree is the one sent to the cluster.

use serde_json::Value as JsonValue;

use crate::overrides::{PathSegment, parse_path};
use crate::values::Values;

/// Replacement text for redacted values
pub const SENSITIVE_VALUE: &str = "(sensitive value)";

/// Return a copy of `tree` with the value at each key path replaced by
/// [`SENSITIVE_VALUE`]
///
/// A path is only cloaked when every parent segment resolves to a map; the
/// terminal key is written even if it was absent. Paths that do not resolve
/// are skipped silently.
pub fn cloak<S: AsRef<str>>(tree: &Values, sensitive_paths: &[S]) -> Values {
    let mut cloaked = tree.clone();
    for path in sensitive_paths {
        cloak_path(&mut cloaked.0, path.as_ref());
    }
    cloaked
}

fn cloak_path(tree: &mut JsonValue, path: &str) {
    let Ok(segments) = parse_path(path) else {
        return;
    };
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let PathSegment::Key(sensitive_key) = last else {
        return;
    };

    let mut current = tree;
    for segment in parents {
        let PathSegment::Key(key) = segment else {
            return;
        };
        match current.get_mut(key.as_str()) {
            Some(next @ JsonValue::Object(_)) => current = next,
            _ => return,
        }
    }

    if let JsonValue::Object(map) = current {
        map.insert(
            sensitive_key.clone(),
            JsonValue::String(SENSITIVE_VALUE.to_string()),
        );
    }
}

/// Replace every occurrence of the given literals in `text` with
/// [`SENSITIVE_VALUE`]
///
/// Empty literals are ignored.
pub fn redact_literals<S: AsRef<str>>(text: &str, literals: &[S]) -> String {
    let mut masked = text.to_string();
    for literal in literals {
        let literal = literal.as_ref();
        if literal.is_empty() {
            continue;
        }
        masked = masked.replace(literal, SENSITIVE_VALUE);
    }
    masked
}
