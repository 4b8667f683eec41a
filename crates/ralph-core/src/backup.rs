use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::paths::ProjectPaths;

/// How many timestamped PRD backups are retained before the oldest is
/// pruned (spec.md §3 "A backup is copied to a bounded ring (retain N=20)
/// before every run").
pub const BACKUP_RETAIN: usize = 20;

#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub name: String,
}

/// Copies the PRD at `prd_bytes` into `<project>/.ralph-backups/` under a
/// timestamped name, refreshes the `prd_latest` pointer, and prunes beyond
/// [`BACKUP_RETAIN`]. Grounded on `tandem-core/src/storage_paths.rs`'s
/// guarded-copy helpers, generalized from a one-shot legacy migration to a
/// recurring backup ring.
pub async fn backup_prd(paths: &ProjectPaths, prd_bytes: &[u8]) -> anyhow::Result<PathBuf> {
    let dir = paths.backups_dir();
    tokio::fs::create_dir_all(&dir).await?;

    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let name = format!("prd_{stamp}");
    let dest = dir.join(&name);
    crate::atomic::atomic_write(&dest, prd_bytes).await?;

    let latest = dir.join("prd_latest");
    crate::atomic::atomic_write(&latest, prd_bytes).await?;

    prune_backups(&dir).await?;
    Ok(dest)
}

async fn prune_backups(dir: &Path) -> anyhow::Result<()> {
    let mut entries = list_backups(dir).await?;
    if entries.len() <= BACKUP_RETAIN {
        return Ok(());
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let overflow = entries.len() - BACKUP_RETAIN;
    for entry in entries.into_iter().take(overflow) {
        let _ = tokio::fs::remove_file(&entry.path).await;
    }
    Ok(())
}

/// Lists all timestamped backups (excluding the `prd_latest` pointer),
/// oldest first.
pub async fn list_backups(dir: &Path) -> anyhow::Result<Vec<BackupEntry>> {
    let mut out = Vec::new();
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("prd_") || name == "prd_latest" {
            continue;
        }
        out.push(BackupEntry {
            path: entry.path(),
            name,
        });
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

/// Restores the PRD from a named backup entry, returning its raw bytes for
/// the caller to parse and persist as the active PRD.
pub async fn restore_from_backup(dir: &Path, name: &str) -> anyhow::Result<Vec<u8>> {
    let path = dir.join(name);
    Ok(tokio::fs::read(&path).await?)
}

/// Copies the PRD to `<project>/.archive/<timestamp>_completed_prd` once
/// every story in it passes or is skipped (spec.md §4.8 end-of-session step
/// 5, §6 "Archive directory").
pub async fn archive_completed_prd(paths: &ProjectPaths, prd_bytes: &[u8]) -> anyhow::Result<PathBuf> {
    let dir = paths.archive_dir();
    tokio::fs::create_dir_all(&dir).await?;
    let stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let dest = dir.join(format!("{stamp}_completed_prd"));
    crate::atomic::atomic_write(&dest, prd_bytes).await?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_project() -> ProjectPaths {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        ProjectPaths::new(std::env::temp_dir().join(format!("ralph-core-backup-{ts}")))
    }

    #[tokio::test]
    async fn backup_writes_timestamped_copy_and_latest_pointer() {
        let paths = temp_project();
        let dest = backup_prd(&paths, b"{\"project\":\"demo\"}").await.unwrap();
        assert!(dest.exists());
        assert!(paths.backups_dir().join("prd_latest").exists());
        let _ = tokio::fs::remove_dir_all(&paths.root).await;
    }

    #[tokio::test]
    async fn prunes_beyond_retention() {
        let paths = temp_project();
        for i in 0..(BACKUP_RETAIN + 5) {
            let dir = paths.backups_dir();
            tokio::fs::create_dir_all(&dir).await.unwrap();
            let name = format!("prd_2024-01-01_00-00-{i:02}");
            tokio::fs::write(dir.join(name), b"{}").await.unwrap();
        }
        prune_backups(&paths.backups_dir()).await.unwrap();
        let entries = list_backups(&paths.backups_dir()).await.unwrap();
        assert_eq!(entries.len(), BACKUP_RETAIN);
        let _ = tokio::fs::remove_dir_all(&paths.root).await;
    }
}
