//! Manifest normalization
//!
//! A rendered manifest is a stream of YAML documents. For drift detection it
//! is turned into one JSON object keyed by resource identity, so that the
//! planned value does not depend on document order or YAML formatting.

use helmform_core::{SENSITIVE_VALUE, redact_literals};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::{ReleaseError, Result};

const SOURCE_PREFIX: &str = "# Source: ";

/// Type and object metadata shared by every resource
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceHeader {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: ObjectMeta,
}

impl ResourceHeader {
    /// `lower(kind[.group])/version/namespace/name`
    fn key(&self) -> String {
        let (group, version) = match self.api_version.split_once('/') {
            Some((group, version)) => (group, version),
            None => ("", self.api_version.as_str()),
        };
        let group_kind = if group.is_empty() {
            self.kind.clone()
        } else {
            format!("{}.{}", self.kind, group)
        };

        format!(
            "{}/{}/{}/{}",
            group_kind.to_lowercase(),
            version,
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    fn is_secret(&self) -> bool {
        self.api_version == "v1" && self.kind == "Secret"
    }
}

/// Split a multi-document manifest, dropping blank documents
pub fn split_documents(manifest: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();

    for line in manifest.lines() {
        if is_separator(line) {
            push_document(&mut docs, &current);
            current.clear();
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    push_document(&mut docs, &current);

    docs
}

fn is_separator(line: &str) -> bool {
    line.strip_prefix("---")
        .is_some_and(|rest| rest.trim().is_empty())
}

fn push_document(docs: &mut Vec<String>, doc: &str) {
    let doc = doc.trim();
    if !doc.is_empty() {
        docs.push(doc.to_string());
    }
}

/// Convert a YAML manifest into a JSON object keyed by resource
///
/// `data` and `stringData` of `v1/Secret` objects are always redacted.
pub fn manifest_to_json(manifest: &str) -> Result<String> {
    let mut resources = BTreeMap::new();

    for doc in split_documents(manifest) {
        if is_comment_only(&doc) {
            continue;
        }
        let mut value: JsonValue =
            serde_yaml::from_str(&doc).map_err(|e| ReleaseError::InvalidManifest(e.to_string()))?;
        if value.is_null() {
            continue;
        }

        let header: ResourceHeader = serde_json::from_value(value.clone())
            .map_err(|e| ReleaseError::InvalidManifest(e.to_string()))?;
        if header.is_secret() {
            redact_secret(&mut value);
        }

        resources.insert(header.key(), value);
    }

    Ok(serde_json::to_string(&resources)?)
}

fn is_comment_only(doc: &str) -> bool {
    doc.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#'))
}

fn redact_secret(secret: &mut JsonValue) {
    for field in ["data", "stringData"] {
        if let Some(JsonValue::Object(entries)) = secret.get_mut(field) {
            for value in entries.values_mut() {
                *value = JsonValue::String(SENSITIVE_VALUE.to_string());
            }
        }
    }
}

/// Normalized JSON manifest with every sensitive literal redacted
pub fn normalize<S: AsRef<str>>(manifest: &str, sensitive_literals: &[S]) -> Result<String> {
    let json = manifest_to_json(manifest)?;
    Ok(redact_literals(&json, sensitive_literals))
}

/// Group documents by their `# Source: <chart>/<path>` header
///
/// Documents sharing a source are joined with `---`. Documents without a
/// source header are dropped.
pub fn split_by_source(manifest: &str) -> BTreeMap<String, String> {
    let mut sources: BTreeMap<String, String> = BTreeMap::new();

    for doc in split_documents(manifest) {
        let Some(source) = doc
            .lines()
            .find_map(|line| line.strip_prefix(SOURCE_PREFIX))
            .map(|s| s.trim().to_string())
        else {
            tracing::debug!("skipping manifest document without a source header");
            continue;
        };

        sources
            .entry(source)
            .and_modify(|existing| {
                existing.push_str("\n---\n");
                existing.push_str(&doc);
            })
            .or_insert(doc);
    }

    sources
}
