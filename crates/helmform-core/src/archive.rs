//! Packaged chart archives (`.tgz`)
//!
//! A chart archive is a gzipped tarball whose entries all live under one top
//! level directory named after the chart (`redis/Chart.yaml`, ...).

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, Header};

use crate::error::{CoreError, Result};

/// Whether a path names a packaged chart rather than a directory
pub fn is_archive(path: &Path) -> bool {
    if path.is_dir() {
        return false;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name.ends_with(".tgz") || name.ends_with(".tar.gz")
}

/// Read every file of an archive on disk
pub fn read_archive_file(path: &Path) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    read_archive(&data)
}

/// Read every file of an in-memory archive in a single pass
///
/// Keys are paths relative to the chart root, i.e. with the top level
/// directory stripped.
pub fn read_archive(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut contents = BTreeMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry.path()?.into_owned();
        let Some(relative) = strip_top_dir(&path)? else {
            continue;
        };

        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        contents.insert(relative, data);
    }

    if contents.is_empty() {
        return Err(CoreError::Archive {
            message: "archive contains no files".to_string(),
        });
    }

    Ok(contents)
}

fn strip_top_dir(path: &Path) -> Result<Option<String>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => {
                return Err(CoreError::Archive {
                    message: format!("illegal path in archive: {}", path.display()),
                });
            }
        }
    }
    if parts.len() < 2 {
        return Ok(None);
    }
    Ok(Some(parts[1..].join("/")))
}

/// Package a chart directory into `output`
///
/// Entries are stored under a top level directory named `top_dir`, in
/// sorted order.
pub fn create_archive(chart_dir: &Path, top_dir: &str, output: &Path) -> Result<PathBuf> {
    let file = File::create(output)?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(chart_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();

    for path in files {
        let relative = path
            .strip_prefix(chart_dir)
            .map_err(|e| CoreError::Archive {
                message: e.to_string(),
            })?
            .to_string_lossy()
            .replace('\\', "/");
        let data = std::fs::read(&path)?;
        append_bytes(&mut builder, &format!("{}/{}", top_dir, relative), &data)?;
    }

    builder.into_inner()?.finish()?;
    Ok(output.to_path_buf())
}

fn append_bytes<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, name, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chart_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("Chart.yaml"), "apiVersion: v2\nname: demo\nversion: 0.1.0\n").unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::write(dir.path().join("templates/cm.yaml"), "kind: ConfigMap\n").unwrap();
        dir
    }

    #[test]
    fn test_create_and_read() {
        let chart = chart_dir();
        let out = TempDir::new().unwrap();
        let archive = create_archive(chart.path(), "demo", &out.path().join("demo-0.1.0.tgz")).unwrap();

        assert!(is_archive(&archive));
        let files = read_archive_file(&archive).unwrap();
        assert_eq!(
            files.keys().cloned().collect::<Vec<_>>(),
            vec!["Chart.yaml".to_string(), "templates/cm.yaml".to_string()]
        );
        assert_eq!(files["templates/cm.yaml"], b"kind: ConfigMap\n");
    }

    #[test]
    fn test_is_archive() {
        let dir = TempDir::new().unwrap();
        assert!(!is_archive(dir.path()));
        assert!(is_archive(Path::new("redis-1.0.0.tgz")));
        assert!(is_archive(Path::new("redis-1.0.0.TAR.GZ")));
        assert!(!is_archive(Path::new("redis")));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(read_archive(b"definitely not gzip").is_err());
    }
}
