use std::path::Path;

use serde::Serialize;

/// Writes `bytes` to `path` via a temp-file + rename, so readers only ever
/// observe the pre- or post-state (spec.md §3, §8 property 1). Grounded on
/// `src-tauri/src/orchestrator/store.rs`'s `atomic_write` helper, generalized
/// to async I/O and given a pid-qualified temp name so concurrent writers to
/// different paths never collide.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension(format!(
        "tmp.{}",
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// As [`atomic_write`] but also fsyncs the containing directory, for data
/// that must survive a crash immediately after the call returns (learning
/// and cost history, per spec.md §9 "Persistence atomicity").
pub async fn atomic_write_durable(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    atomic_write(path, bytes).await?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = tokio::fs::File::open(parent).await {
            let _ = dir.sync_all().await;
        }
    }
    Ok(())
}

/// Serializes `value` as pretty-printed UTF-8 JSON and atomically writes it.
pub async fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    atomic_write(path, text.as_bytes()).await?;
    Ok(())
}

/// Durable variant of [`atomic_write_json`].
pub async fn atomic_write_json_durable<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    atomic_write_durable(path, text.as_bytes()).await?;
    Ok(())
}

pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

pub async fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        Err(_) => T::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    struct Sample {
        value: u32,
    }

    fn unique_path(name: &str) -> std::path::PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("ralph-core-atomic-{name}-{ts}.json"))
    }

    #[tokio::test]
    async fn round_trips_through_json() {
        let path = unique_path("roundtrip");
        let value = Sample { value: 42 };
        atomic_write_json(&path, &value).await.unwrap();
        let loaded: Sample = read_json(&path).await.unwrap();
        assert_eq!(loaded, value);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn no_temp_file_survives_a_successful_write() {
        let path = unique_path("no-temp-leftover");
        atomic_write_json(&path, &Sample { value: 1 }).await.unwrap();
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        assert!(!tmp.exists());
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn missing_file_yields_default() {
        let path = unique_path("missing");
        let loaded: Sample = read_json_or_default(&path).await;
        assert_eq!(loaded, Sample::default());
    }
}
