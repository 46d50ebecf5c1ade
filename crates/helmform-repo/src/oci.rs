//! OCI registry pulls
//!
//! Charts stored in an OCI registry are addressed as
//! `oci://<registry>/<path>/<chart>`; the version is the image tag.

use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use semver::Version;

use crate::constraint::{Constraint, parse_version};
use crate::credentials::RegistryConfig;
use crate::error::{RepoError, Result};

/// Media types for Helm charts in OCI
pub mod media_types {
    pub const HELM_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
    pub const HELM_PROVENANCE: &str = "application/vnd.cncf.helm.chart.provenance.v1.prov";
}

/// A pulled chart
#[derive(Debug, Clone)]
pub struct PulledChart {
    /// Chart name, the last path segment of the reference
    pub name: String,
    pub version: String,
    pub data: Vec<u8>,
    pub provenance: Option<Vec<u8>>,
}

/// OCI registry client
pub struct OciRegistry {
    client: Client,
    logins: RegistryConfig,
}

impl OciRegistry {
    pub fn new(logins: RegistryConfig) -> Self {
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            logins,
        }
    }

    fn auth_for(&self, reference: &Reference) -> RegistryAuth {
        match self.logins.credentials_for_host(reference.registry()) {
            Some((username, password)) => RegistryAuth::Basic(username, password),
            None => RegistryAuth::Anonymous,
        }
    }

    /// Pull the highest tag of `reference` satisfying `constraint`
    pub async fn pull(&self, reference: &str, constraint: &str, devel: bool) -> Result<PulledChart> {
        let base = OciReference::parse(reference)?;

        let tag = match base.tag.clone() {
            Some(tag) => tag,
            None if is_exact_version(constraint) => to_tag(constraint.trim()),
            None => {
                let tags = self.list_tags(&base).await?;
                select_tag(&tags, constraint, devel)
                    .ok_or_else(|| RepoError::chart_not_found(reference, constraint))?
            }
        };

        let image = base.with_tag(&tag).to_reference()?;
        let auth = self.auth_for(&image);
        tracing::debug!("pulling {}", image);

        let image_data = self
            .client
            .pull(
                &image,
                &auth,
                vec![
                    media_types::HELM_CONFIG,
                    media_types::HELM_CONTENT,
                    media_types::HELM_PROVENANCE,
                ],
            )
            .await
            .map_err(|e| RepoError::OciError {
                message: format!("Failed to pull {}: {}", image, e),
            })?;

        let content = image_data
            .layers
            .iter()
            .find(|l| l.media_type == media_types::HELM_CONTENT)
            .ok_or_else(|| RepoError::OciError {
                message: "No chart content layer found in manifest".to_string(),
            })?;
        let provenance = image_data
            .layers
            .iter()
            .find(|l| l.media_type == media_types::HELM_PROVENANCE)
            .map(|l| l.data.clone());

        Ok(PulledChart {
            name: base.chart_name().to_string(),
            version: from_tag(&tag),
            data: content.data.clone(),
            provenance,
        })
    }

    async fn list_tags(&self, base: &OciReference) -> Result<Vec<String>> {
        let reference = base.with_tag("latest").to_reference()?;
        let auth = self.auth_for(&reference);
        let tags = self
            .client
            .list_tags(&reference, &auth, None, None)
            .await
            .map_err(|e| RepoError::OciError {
                message: format!("Failed to list tags: {}", e),
            })?;
        Ok(tags.tags)
    }
}

/// Pick the highest semver tag matching a constraint
pub fn select_tag(tags: &[String], constraint: &str, devel: bool) -> Option<String> {
    let constraint = constraint.trim();
    let parsed = if constraint.is_empty() {
        None
    } else {
        Some(Constraint::parse(constraint).ok()?)
    };

    tags.iter()
        .filter_map(|tag| parse_version(&from_tag(tag)).map(|v| (v, tag)))
        .filter(|(version, _): &(Version, &String)| match &parsed {
            Some(c) => c.matches(version),
            None => devel || version.pre.is_empty(),
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, tag)| tag.clone())
}

fn is_exact_version(constraint: &str) -> bool {
    let c = constraint.trim();
    !c.is_empty() && semver::Version::parse(c.trim_start_matches('v')).is_ok()
}

/// OCI tags cannot contain `+`; Helm stores build metadata with `_`
fn to_tag(version: &str) -> String {
    version.replace('+', "_")
}

fn from_tag(tag: &str) -> String {
    tag.replace('_', "+")
}

/// Parsed `oci://` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciReference {
    pub registry: String,
    pub repository: String,
    pub tag: Option<String>,
}

impl OciReference {
    pub fn parse(s: &str) -> Result<Self> {
        let clean = s.trim_start_matches("oci://");
        let (registry, rest) = clean
            .split_once('/')
            .filter(|(r, p)| !r.is_empty() && !p.is_empty())
            .ok_or_else(|| RepoError::InvalidOciReference {
                reference: s.to_string(),
            })?;

        // a colon after the last slash is a tag; earlier ones belong to the registry port
        let last_segment = rest.rsplit('/').next().unwrap_or(rest);
        let (repository, tag) = match last_segment.rsplit_once(':') {
            Some((_, tag)) => (
                rest[..rest.len() - tag.len() - 1].to_string(),
                Some(tag.to_string()),
            ),
            None => (rest.to_string(), None),
        };

        Ok(Self {
            registry: registry.to_string(),
            repository,
            tag,
        })
    }

    pub fn chart_name(&self) -> &str {
        self.repository.rsplit('/').next().unwrap_or(&self.repository)
    }

    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..self.clone()
        }
    }

    pub fn to_oci_string(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(tag) = &self.tag {
            s.push(':');
            s.push_str(tag);
        }
        s
    }

    fn to_reference(&self) -> Result<Reference> {
        let s = self.to_oci_string();
        Reference::try_from(s.as_str()).map_err(|e| RepoError::InvalidOciReference {
            reference: format!("{}: {}", s, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oci_reference_parse() {
        let r = OciReference::parse("oci://ghcr.io/myorg/charts/nginx:1.0.0").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "myorg/charts/nginx");
        assert_eq!(r.tag, Some("1.0.0".to_string()));
        assert_eq!(r.chart_name(), "nginx");

        let r = OciReference::parse("oci://localhost:5000/charts/app").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "charts/app");
        assert!(r.tag.is_none());

        assert!(OciReference::parse("oci://ghcr.io").is_err());
    }

    #[test]
    fn test_to_oci_string() {
        let r = OciReference::parse("oci://ghcr.io/org/app").unwrap().with_tag("1.2.3_build.1");
        assert_eq!(r.to_oci_string(), "ghcr.io/org/app:1.2.3_build.1");
    }

    #[test]
    fn test_select_tag() {
        let tags: Vec<String> = ["0.9.0", "1.0.0", "1.1.0", "2.0.0-beta.1", "latest", "1.1.1_build.5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(select_tag(&tags, "", false), Some("1.1.1_build.5".to_string()));
        assert_eq!(select_tag(&tags, "", true), Some("2.0.0-beta.1".to_string()));
        assert_eq!(select_tag(&tags, "~1.0", false), Some("1.0.0".to_string()));
        assert_eq!(select_tag(&tags, ">=3.0.0", false), None);
    }

    #[test]
    fn test_tag_build_metadata() {
        assert_eq!(to_tag("1.0.0+abc"), "1.0.0_abc");
        assert_eq!(from_tag("1.0.0_abc"), "1.0.0+abc");
        assert!(is_exact_version("v1.2.3"));
        assert!(!is_exact_version("~1.2"));
    }
}
