//! Provenance (`.prov`) checks for packaged charts
//!
//! A provenance file is a clearsigned document whose body holds the chart
//! metadata, a `...` separator and a `files:` map of archive name to sha256
//! digest. Only the digest is checked here; signature validation against a
//! keyring is left to the `helm` toolchain.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};
use crate::http::{compute_digest, digest_matches};

const SIGNED_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub file_name: String,
    pub digest: String,
}

#[derive(Debug, Deserialize)]
struct FilesSection {
    #[serde(default)]
    files: HashMap<String, String>,
}

/// Location of the provenance file for an archive
pub fn provenance_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_owned();
    name.push(".prov");
    PathBuf::from(name)
}

/// Verify a chart archive against the `.prov` file next to it
pub fn verify(archive: &Path) -> Result<Verification> {
    let failed = |message: String| RepoError::VerificationFailed {
        path: archive.display().to_string(),
        message,
    };

    if archive.is_dir() {
        return Err(failed("unpacked charts cannot be verified".to_string()));
    }

    let prov_path = provenance_path(archive);
    if !prov_path.exists() {
        return Err(failed(format!("could not load provenance file {}", prov_path.display())));
    }

    let provenance = std::fs::read_to_string(&prov_path)?;
    let files = parse_files(&provenance).map_err(failed)?;

    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let expected = files
        .get(&file_name)
        .ok_or_else(|| failed(format!("provenance does not list {}", file_name)))?;

    let digest = compute_digest(&std::fs::read(archive)?);
    if !digest_matches(expected, &digest) {
        return Err(failed(format!("sha256 sum does not match for {}: {:?} != {:?}", file_name, expected, digest)));
    }

    tracing::debug!("verified {} against {}", file_name, prov_path.display());
    Ok(Verification { file_name, digest })
}

/// Extract the `files:` map from the signed body
fn parse_files(provenance: &str) -> std::result::Result<HashMap<String, String>, String> {
    let body = signed_body(provenance).ok_or_else(|| "provenance file is not a signed message".to_string())?;

    let (_, files_doc) = body
        .split_once("\n...\n")
        .ok_or_else(|| "provenance body has no files section".to_string())?;

    let section: FilesSection = serde_yaml::from_str(files_doc).map_err(|e| e.to_string())?;
    if section.files.is_empty() {
        return Err("provenance body has no files section".to_string());
    }
    Ok(section.files)
}

/// Text between the armor headers and the signature block
fn signed_body(provenance: &str) -> Option<&str> {
    let start = provenance.find(SIGNED_HEADER)?;
    let after_header = &provenance[start + SIGNED_HEADER.len()..];
    // armor headers end at the first blank line
    let body_start = after_header.find("\n\n")? + 2;
    let body = &after_header[body_start..];
    let end = body.find(SIGNATURE_HEADER)?;
    Some(&body[..end])
}
