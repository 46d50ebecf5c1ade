//! The `helm_template` data source

use helmform_release::{Release, split_by_source};
use std::collections::BTreeMap;

use crate::error::{ProviderError, Result};
use crate::meta::Meta;
use crate::release::load_chart;
use crate::schema::{TemplateConfig, TemplateState};

/// Renders a chart locally, without creating a release
pub struct TemplateDataSource<'a> {
    meta: &'a Meta,
}

impl<'a> TemplateDataSource<'a> {
    pub fn new(meta: &'a Meta) -> Self {
        Self { meta }
    }

    pub async fn read(&self, config: &TemplateConfig) -> Result<TemplateState> {
        let release = &config.release;
        let log_id = release.log_id();
        release.validate()?;

        let chart = load_chart(self.meta, release).await?;
        let merged = release.value_sources().merge()?;
        tracing::debug!("{} Rendering with values: {}", log_id, merged.cloaked_json()?);

        let crds = if config.include_crds {
            chart.crds.iter().map(|crd| crd.as_str().into_owned()).collect()
        } else {
            Vec::new()
        };
        let chart_name = chart.name().to_string();

        let options = config.render_options(chart, merged.into_values());
        let rendered = self.meta.driver().render(&options).await?;

        let all = split_by_source(&full_manifest(&rendered, config.skip_tests));
        let manifests = select(all, &chart_name, &config.show_only)?;
        let manifest = manifests
            .values()
            .map(|doc| format!("---\n{}\n", doc))
            .collect();

        tracing::debug!("{} Rendered {} templates", log_id, manifests.len());
        Ok(TemplateState {
            id: release.name.clone(),
            manifests,
            manifest,
            crds,
            notes: rendered.notes().to_string(),
        })
    }
}

/// Manifest plus hooks, each hook under its own source header
fn full_manifest(release: &Release, skip_tests: bool) -> String {
    let mut manifest = release.manifest.clone();
    for hook in &release.hooks {
        if skip_tests && hook.is_test() {
            continue;
        }
        manifest.push_str(&format!("\n---\n# Source: {}\n{}\n", hook.path, hook.manifest.trim()));
    }
    manifest
}

/// Keep the templates named by `show_only`, or everything when it is empty
fn select(
    manifests: BTreeMap<String, String>,
    chart_name: &str,
    show_only: &[String],
) -> Result<BTreeMap<String, String>> {
    if show_only.is_empty() {
        return Ok(manifests);
    }

    let prefix = format!("{}/", chart_name);
    let mut selected = BTreeMap::new();
    for wanted in show_only {
        let wanted = wanted.trim_start_matches("./");
        let mut found = false;
        for (source, content) in &manifests {
            let relative = source.strip_prefix(&prefix).unwrap_or(source);
            if glob_match(wanted, relative) || glob_match(wanted, source) {
                selected.insert(source.clone(), content.clone());
                found = true;
            }
        }
        if !found {
            return Err(ProviderError::TemplateNotFound {
                path: wanted.to_string(),
            });
        }
    }
    Ok(selected)
}

/// `*` matches within one path segment, `?` matches one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let patterns: Vec<&str> = pattern.split('/').collect();
    let segments: Vec<&str> = text.split('/').collect();
    patterns.len() == segments.len()
        && patterns
            .iter()
            .zip(&segments)
            .all(|(p, t)| segment_match(p, t))
}

fn segment_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // last `*` seen, and the text position it currently stretches to
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if let Some((star_pi, star_ti)) = star {
            pi = star_pi + 1;
            ti = star_ti + 1;
            star = Some((star_pi, ti));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}
