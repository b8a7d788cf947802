//! Recursive folder upload: enumerate local files, then push them through a
//! bounded worker pool.

use crate::error::{BackupError, BackupResult};
use crate::notify::{alert_subject, NotificationSink};
use crate::storage_client::ObjectStorage;
use crate::task_pool;
use crate::uploader::{self, FileUploader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Default number of concurrent file uploads.
pub const DEFAULT_UPLOAD_WORKERS: usize = 10;

/// One file queued for upload.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub path: PathBuf,
    pub size: u64,
}

/// Walk `root` depth-first and collect every regular file with its size.
/// Symlinks are followed the way the filesystem presents them.
pub fn enumerate_files(root: &Path) -> BackupResult<Vec<UploadTask>> {
    let mut tasks = Vec::new();
    collect_files(root, &mut tasks)
        .map_err(|e| BackupError::Enumeration(format!("{}: {e}", root.display())))?;
    Ok(tasks)
}

fn collect_files(dir: &Path, tasks: &mut Vec<UploadTask>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            collect_files(&path, tasks)?;
        } else if metadata.is_file() {
            tasks.push(UploadTask {
                path,
                size: metadata.len(),
            });
        }
    }
    Ok(())
}

/// Uploads the contents of a local folder into a single remote folder with
/// bounded concurrency. Remote paths are flat: every file lands directly
/// under the destination folder regardless of local nesting.
pub struct FolderUploadCoordinator {
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn NotificationSink>,
    site_name: String,
    remote_folder: String,
    chunk_size: u64,
    max_retries: u32,
    max_workers: usize,
}

impl FolderUploadCoordinator {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn NotificationSink>,
        site_name: String,
        remote_folder: String,
    ) -> Self {
        Self {
            storage,
            notifier,
            site_name,
            remote_folder,
            chunk_size: crate::chunked_upload::DEFAULT_CHUNK_SIZE,
            max_retries: crate::uploader::DEFAULT_MAX_RETRIES,
            max_workers: DEFAULT_UPLOAD_WORKERS,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Upload every file under `local_root`. Returns true only when every
    /// file was committed. Individual failures are already notified by the
    /// per-file uploader; an enumeration failure produces its own alert.
    pub async fn upload_folder(&self, local_root: &Path) -> bool {
        let tasks = match enumerate_files(local_root) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("cannot enumerate {}: {e}", local_root.display());
                let subject = alert_subject(&self.site_name);
                let body = format!("The site {} backup failed to read local files: {e}", self.site_name);
                if let Err(e) = self.notifier.notify(&subject, &body).await {
                    warn!("failed to deliver failure notification: {e}");
                }
                return false;
            }
        };

        if tasks.is_empty() {
            info!("nothing to upload under {}", local_root.display());
            return true;
        }

        if let Err(e) = uploader::ensure_folder(self.storage.as_ref(), &self.remote_folder).await {
            error!("cannot ensure remote folder {}: {e}", self.remote_folder);
            let subject = alert_subject(&self.site_name);
            let body = format!(
                "The site {} could not prepare remote folder {}: {e}",
                self.site_name, self.remote_folder
            );
            if let Err(e) = self.notifier.notify(&subject, &body).await {
                warn!("failed to deliver failure notification: {e}");
            }
            return false;
        }

        info!(
            "uploading {} files from {} with {} workers",
            tasks.len(),
            local_root.display(),
            self.max_workers
        );

        let file_uploader = Arc::new(
            FileUploader::new(
                Arc::clone(&self.storage),
                Arc::clone(&self.notifier),
                self.site_name.clone(),
                self.remote_folder.clone(),
            )
            .with_chunk_size(self.chunk_size)
            .with_max_retries(self.max_retries)
            .with_folder_check(false),
        );

        let futures: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let file_uploader = Arc::clone(&file_uploader);
                async move { file_uploader.upload_file(&task.path, task.size).await }
            })
            .collect();

        let outcomes = task_pool::run_bounded(self.max_workers, futures).await;
        let failed = outcomes.iter().filter(|ok| !**ok).count();
        if failed > 0 {
            error!("{failed} of {} files failed to upload", outcomes.len());
        }
        failed == 0
    }
}
