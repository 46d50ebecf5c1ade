//! Repository credentials and the HTTP client that carries them
//!
//! Key security features:
//! - Credentials are scoped to the repository URL prefix
//! - Credentials are only forwarded across a cross-origin redirect when the
//!   repository opts in with `pass_credentials_all`
//! - Registry logins are read from the Docker-format registry config

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

use crate::config::RepositoryEntry;
use crate::error::{RepoError, Result};

/// Credentials ready for use
#[derive(Clone)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
        }
    }
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Authorization header value
    pub fn auth_header(&self) -> String {
        match self {
            Credentials::Basic { username, password } => {
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{}:{}", username, password),
                );
                format!("Basic {}", encoded)
            }
            Credentials::Bearer { token } => format!("Bearer {}", token),
        }
    }
}

/// Registry config (`config.json`) in Docker format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub auths: HashMap<String, RegistryAuthEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryAuthEntry {
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl RegistryConfig {
    /// Load a registry config; a missing file is an empty config
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Record a login for a registry host
    pub fn login(&mut self, host: &str, username: &str, password: &str) {
        self.auths.insert(
            host.to_string(),
            RegistryAuthEntry {
                auth: None,
                username: Some(username.to_string()),
                password: Some(password.to_string()),
            },
        );
    }

    /// Basic credentials for a registry host
    pub fn credentials_for_host(&self, host: &str) -> Option<(String, String)> {
        let candidates = [
            host.to_string(),
            format!("https://{}", host),
            format!("http://{}", host),
        ];

        for candidate in &candidates {
            let Some(entry) = self.auths.get(candidate) else {
                continue;
            };
            if let (Some(u), Some(p)) = (&entry.username, &entry.password) {
                return Some((u.clone(), p.clone()));
            }
            if let Some(encoded) = &entry.auth {
                let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded).ok()?;
                let pair = String::from_utf8(decoded).ok()?;
                let (u, p) = pair.split_once(':')?;
                return Some((u.to_string(), p.to_string()));
            }
        }
        None
    }
}

/// Scoped credentials - maps URL prefixes to credentials
#[derive(Debug, Clone, Default)]
pub struct ScopedCredentials {
    scopes: HashMap<String, Credentials>,
}

impl ScopedCredentials {
    pub fn add(&mut self, url_prefix: &str, credentials: Credentials) {
        let prefix = url_prefix.trim_end_matches('/').to_string();
        self.scopes.insert(prefix, credentials);
    }

    /// Credentials for a URL, by longest matching prefix
    pub fn for_url(&self, url: &str) -> Option<&Credentials> {
        self.scopes
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, creds)| creds)
    }

    /// Credentials for any URL regardless of scope
    fn any(&self) -> Option<&Credentials> {
        self.scopes.values().next()
    }

    /// Check if two URLs are same-origin (for redirect safety)
    pub fn same_origin(url1: &str, url2: &str) -> bool {
        match (Url::parse(url1), Url::parse(url2)) {
            (Ok(u1), Ok(u2)) => {
                u1.scheme() == u2.scheme()
                    && u1.host() == u2.host()
                    && u1.port_or_known_default() == u2.port_or_known_default()
            }
            _ => false,
        }
    }
}

/// HTTP client with manual redirect handling and per-repository TLS
pub struct SecureHttpClient {
    client: reqwest::Client,
    credentials: ScopedCredentials,
    pass_credentials: bool,
}

impl SecureHttpClient {
    pub fn new(credentials: ScopedCredentials) -> Result<Self> {
        let client = base_builder().build().map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            credentials,
            pass_credentials: false,
        })
    }

    /// Client without credentials
    pub fn public() -> Result<Self> {
        Self::new(ScopedCredentials::default())
    }

    /// Client configured from a repository entry: credentials scoped to its
    /// URL plus its CA bundle, client certificate and TLS verification flag
    pub fn for_repository(entry: &RepositoryEntry) -> Result<Self> {
        let mut builder = base_builder();

        if !entry.ca_file.is_empty() {
            let pem = std::fs::read(&entry.ca_file)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| RepoError::InvalidConfig {
                message: format!("invalid CA file {}: {}", entry.ca_file, e),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if !entry.cert_file.is_empty() && !entry.key_file.is_empty() {
            let mut pem = std::fs::read(&entry.cert_file)?;
            pem.extend(std::fs::read(&entry.key_file)?);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| RepoError::InvalidConfig {
                message: format!("invalid client certificate {}: {}", entry.cert_file, e),
            })?;
            builder = builder.identity(identity);
        }

        if entry.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;

        let mut credentials = ScopedCredentials::default();
        if entry.has_credentials() {
            credentials.add(&entry.url, Credentials::basic(&entry.username, &entry.password));
        }

        Ok(Self {
            client,
            credentials,
            pass_credentials: entry.pass_credentials_all,
        })
    }

    /// Fetch a URL, following up to 10 redirects
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.get_with_redirects(url, 10).await
    }

    async fn get_with_redirects(&self, url: &str, max_redirects: u32) -> Result<reqwest::Response> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            if let Some(creds) = self.credentials_for(url, &current_url) {
                request = request.header("Authorization", creds.auth_header());
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > max_redirects {
                    return Err(RepoError::NetworkError {
                        message: format!("Too many redirects (max {})", max_redirects),
                    });
                }

                let location = response
                    .headers()
                    .get("Location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                let base = Url::parse(&current_url)?;
                current_url = base.join(location)?.to_string();
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(RepoError::AuthRequired { url: current_url });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(RepoError::AuthFailed {
                    message: format!("Access denied to {}", current_url),
                });
            }

            if !status.is_success() {
                return Err(RepoError::HttpError {
                    status: status.as_u16(),
                    message: format!("Request to {} failed", current_url),
                });
            }

            return Ok(response);
        }
    }

    /// Scoped credentials for the request, or any credentials when
    /// `pass_credentials` is set, whatever the host
    fn credentials_for(&self, original_url: &str, current_url: &str) -> Option<&Credentials> {
        let same_origin = ScopedCredentials::same_origin(original_url, current_url);
        if same_origin {
            let scoped = self
                .credentials
                .for_url(current_url)
                .or_else(|| self.credentials.for_url(original_url));
            if scoped.is_some() {
                return scoped;
            }
        }
        if self.pass_credentials {
            return self.credentials.any();
        }
        if !same_origin {
            tracing::warn!(
                "Cross-origin redirect from {} to {} - credentials not forwarded",
                original_url,
                current_url
            );
        }
        None
    }

    /// Fetch bytes from URL
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

fn base_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        // redirects are followed by hand so credentials can be withheld
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(30))
}
