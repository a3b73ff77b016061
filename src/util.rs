use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sibling path the atomic writers stage content in before renaming.
pub fn temp_sibling_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let temp_name = format!(".{file_name}.tmp-{}", std::process::id());
    match path.parent() {
        Some(parent) => parent.join(temp_name),
        None => PathBuf::from(temp_name),
    }
}

/// Writes `data` to a sibling temp file, syncs it, then renames it over `path`.
///
/// The temp file is removed on any failure, so `path` only ever holds the old
/// content or the complete new content.
pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_sibling_path(path);
    let result = stage_and_rename(&temp_path, path, data);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn stage_and_rename(temp_path: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(data)?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    write_bytes_atomic(path, &data)
        .with_context(|| format!("failed to write json file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn temp_sibling_path_stays_in_same_directory() {
        let temp = temp_sibling_path(Path::new("/data/docs.embeddings.json"));
        assert_eq!(temp.parent(), Some(Path::new("/data")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".docs.embeddings.json.tmp-"));
    }

    #[test]
    fn write_bytes_atomic_replaces_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_bytes_atomic(&path, b"{\"a\":1}").unwrap();
        write_bytes_atomic(&path, b"{\"a\":2}").unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw.trim(), "{\"a\":2}");
        assert!(!temp_sibling_path(&path).exists());
    }

    #[test]
    fn failed_rename_keeps_original_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        // A directory at the target path makes the final rename fail.
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep.txt"), "original").unwrap();

        let result = write_bytes_atomic(&path, b"new");
        assert!(result.is_err());
        assert!(!temp_sibling_path(&path).exists());
        assert_eq!(
            fs::read_to_string(path.join("keep.txt")).unwrap(),
            "original"
        );
    }
}
