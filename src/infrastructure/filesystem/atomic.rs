//! Write-temp-then-rename helper shared by every file-backed repository (§6).

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Serializes `value` as pretty JSON and writes it to `path` atomically: a
/// sibling `.tmp` file is written and fsync'd first, then renamed over the
/// target. A reader never observes a partially written document.
pub async fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp_path).await?;
    file.write_all(&body).await?;
    file.sync_all().await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> std::io::Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_through_temp_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &json!({"a": 1})).await.unwrap();
        assert!(!path.with_extension("tmp").exists());
        let read: serde_json::Value = read_json(&path).await.unwrap().unwrap();
        assert_eq!(read, json!({"a": 1}));
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let read: Option<serde_json::Value> = read_json(&path).await.unwrap();
        assert!(read.is_none());
    }
}
