//! Local artifact staging: tar archive of the site root and a mysqldump of
//! its database, named with a shared timestamp.

use crate::error::{BackupError, BackupResult};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// A staged backup file ready for upload.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
}

/// Timestamp suffix shared by the archive and the dump of one run.
pub fn run_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

pub fn archive_name(site_name: &str, stamp: &str) -> String {
    format!("{site_name}_{stamp}.tar")
}

pub fn dump_name(database: &str, stamp: &str) -> String {
    format!("{database}_{stamp}.sql")
}

/// Pack the contents of `root` into `staging_dir/{site}_{stamp}.tar`.
pub async fn create_archive(
    site_name: &str,
    root: &Path,
    staging_dir: &Path,
    stamp: &str,
) -> BackupResult<Artifact> {
    let archive_path = staging_dir.join(archive_name(site_name, stamp));

    let status = Command::new("tar")
        .arg("-cf")
        .arg(&archive_path)
        .arg("-C")
        .arg(root)
        .arg(".")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;

    if !status.success() {
        return Err(BackupError::Archive(format!(
            "tar exited with {status} for {}",
            root.display()
        )));
    }

    let size = tokio::fs::metadata(&archive_path).await?.len();
    info!("archived {} -> {} ({size} bytes)", root.display(), archive_path.display());
    Ok(Artifact {
        path: archive_path,
        size,
    })
}

/// Dump `database` into `staging_dir/{database}_{stamp}.sql`. Credentials
/// come from the usual mysql client configuration (~/.my.cnf).
pub async fn create_db_dump(
    database: &str,
    staging_dir: &Path,
    stamp: &str,
) -> BackupResult<Artifact> {
    let dump_path = staging_dir.join(dump_name(database, stamp));
    let dump_file = std::fs::File::create(&dump_path)?;

    let status = Command::new("mysqldump")
        .arg(database)
        .stdout(Stdio::from(dump_file))
        .stderr(Stdio::null())
        .status()
        .await?;

    if !status.success() {
        let _ = tokio::fs::remove_file(&dump_path).await;
        return Err(BackupError::Dump(format!(
            "mysqldump exited with {status} for database {database}"
        )));
    }

    let size = tokio::fs::metadata(&dump_path).await?.len();
    info!("dumped database {database} -> {} ({size} bytes)", dump_path.display());
    Ok(Artifact {
        path: dump_path,
        size,
    })
}

/// Remove staged artifacts after a successful upload.
pub async fn remove_artifacts(artifacts: &[Artifact]) {
    for artifact in artifacts {
        if let Err(e) = tokio::fs::remove_file(&artifact.path).await {
            tracing::warn!("could not remove staged {}: {e}", artifact.path.display());
        }
    }
}
