//! Values command - merge overlays and overrides the way a release does

use clap::Args;
use helmform_core::{ListOverride, ValueOverride, ValueSources};
use std::path::PathBuf;

use crate::error::{CliError, Result};

/// Overlay files and overrides shared by the commands that merge values
#[derive(Args, Debug, Default, Clone)]
pub struct ValueArgs {
    /// Values file(s) to merge, left to right
    #[arg(short = 'f', long = "values")]
    pub values: Vec<PathBuf>,

    /// Set a value with type inference (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Set a value that is always a string (key=value)
    #[arg(long = "set-string")]
    pub set_string: Vec<String>,

    /// Set a value parsed as a YAML fragment (key=value)
    #[arg(long = "set-literal")]
    pub set_literal: Vec<String>,

    /// Set a value that is redacted from output (key=value)
    #[arg(long = "set-sensitive")]
    pub set_sensitive: Vec<String>,

    /// Set a list of strings (key=a,b,c)
    #[arg(long = "set-list")]
    pub set_list: Vec<String>,
}

impl ValueArgs {
    /// Overrides apply as `--set`, `--set-string`, `--set-literal`, then
    /// `--set-sensitive` and `--set-list`
    pub fn sources(&self) -> Result<ValueSources> {
        let mut values = Vec::with_capacity(self.values.len());
        for path in &self.values {
            let content = std::fs::read_to_string(path).map_err(|e| CliError::Io {
                message: format!("{}: {}", path.display(), e),
            })?;
            values.push(content);
        }

        let mut set = Vec::new();
        for raw in &self.set {
            let (key, value) = assignment(raw)?;
            set.push(ValueOverride::new(key, value));
        }
        for raw in &self.set_string {
            let (key, value) = assignment(raw)?;
            set.push(ValueOverride::string(key, value));
        }
        for raw in &self.set_literal {
            let (key, value) = assignment(raw)?;
            set.push(ValueOverride::literal(key, value));
        }

        let set_sensitive = self
            .set_sensitive
            .iter()
            .map(|raw| assignment(raw).map(|(key, value)| ValueOverride::new(key, value)))
            .collect::<Result<Vec<_>>>()?;

        let set_list = self
            .set_list
            .iter()
            .map(|raw| {
                assignment(raw).map(|(key, value)| {
                    let items = if value.is_empty() {
                        Vec::new()
                    } else {
                        value.split(',').map(str::to_string).collect()
                    };
                    ListOverride::new(key, items)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ValueSources {
            values,
            set,
            set_sensitive,
            set_list,
        })
    }
}

fn assignment(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => Err(CliError::usage(
            format!("invalid assignment {:?}", raw),
            "use key=value, for example --set image.tag=1.2.3",
        )),
    }
}

pub fn run(args: &ValueArgs, reveal: bool, json: bool) -> Result<()> {
    let merged = args.sources()?.merge()?;
    tracing::debug!("merged values with {} sensitive paths", merged.sensitive_paths().len());

    let tree = if reveal {
        merged.into_values()
    } else {
        merged.cloaked()
    };

    if json {
        println!("{}", tree.to_json()?);
    } else {
        print!("{}", tree.to_yaml()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmform_core::{OverrideKind, SENSITIVE_VALUE};
    use tempfile::TempDir;

    #[test]
    fn test_assignment() {
        assert_eq!(assignment("a.b=1").unwrap(), ("a.b", "1"));
        assert_eq!(assignment("a=x=y").unwrap(), ("a", "x=y"));
        assert_eq!(assignment("a=").unwrap(), ("a", ""));
        assert!(assignment("novalue").is_err());
        assert!(assignment("=1").is_err());
    }

    #[test]
    fn test_sources_order_and_kinds() {
        let args = ValueArgs {
            set: vec!["replicas=2".to_string()],
            set_string: vec!["tag=007".to_string()],
            set_literal: vec!["ports=[80, 443]".to_string()],
            set_list: vec!["hosts=a.example.com,b.example.com".to_string(), "empty=".to_string()],
            ..Default::default()
        };

        let sources = args.sources().unwrap();
        let kinds: Vec<OverrideKind> = sources.set.iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![OverrideKind::Auto, OverrideKind::String, OverrideKind::Literal]);
        assert_eq!(sources.set_list[0].value, vec!["a.example.com", "b.example.com"]);
        assert!(sources.set_list[1].value.is_empty());

        let merged = sources.merge().unwrap();
        let values = merged.values();
        assert_eq!(values.get("replicas").unwrap(), 2);
        assert_eq!(values.get("tag").unwrap(), "007");
        assert_eq!(values.get("ports").unwrap(), &serde_json::json!([80, 443]));
    }

    #[test]
    fn test_sources_from_files() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("base.yaml");
        let prod = temp.path().join("prod.yaml");
        std::fs::write(&base, "image:\n  tag: latest\n  repository: web\n").unwrap();
        std::fs::write(&prod, "image:\n  tag: v1\n").unwrap();

        let args = ValueArgs {
            values: vec![base, prod],
            set_sensitive: vec!["auth.password=hunter2".to_string()],
            ..Default::default()
        };

        let merged = args.sources().unwrap().merge().unwrap();
        assert_eq!(merged.values().get("image.tag").unwrap(), "v1");
        assert_eq!(merged.values().get("image.repository").unwrap(), "web");
        assert_eq!(merged.cloaked().get("auth.password").unwrap(), SENSITIVE_VALUE);
    }

    #[test]
    fn test_missing_values_file() {
        let args = ValueArgs {
            values: vec![PathBuf::from("/nonexistent/values.yaml")],
            ..Default::default()
        };
        assert!(matches!(args.sources(), Err(CliError::Io { .. })));
    }
}
