//! Per-file upload with bounded retries and failure escalation.

use crate::chunked_upload::{self, DEFAULT_CHUNK_SIZE};
use crate::error::{BackupError, BackupResult};
use crate::notify::{alert_subject, NotificationSink};
use crate::storage_client::ObjectStorage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default number of attempts before a file is given up on.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// Make sure `path` exists remotely. Check-then-create; a create that loses
/// the race to a concurrent create (conflict) counts as success.
pub(crate) async fn ensure_folder(storage: &dyn ObjectStorage, path: &str) -> BackupResult<()> {
    if storage.get_metadata(path).await?.is_some() {
        return Ok(());
    }

    match storage.create_folder(path).await {
        Ok(()) => Ok(()),
        Err(BackupError::Api { status: 409, .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Uploads single files, retrying each from a freshly reopened byte source
/// and escalating to the notification sink when retries are exhausted.
pub struct FileUploader {
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn NotificationSink>,
    site_name: String,
    remote_folder: String,
    chunk_size: u64,
    max_retries: u32,
    retry_base_delay: Duration,
    ensure_remote_folder: bool,
}

impl FileUploader {
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
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            ensure_remote_folder: true,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Skip the per-file folder check. Used by the folder coordinator, which
    /// ensures the destination folder once up front.
    pub fn with_folder_check(mut self, ensure: bool) -> Self {
        self.ensure_remote_folder = ensure;
        self
    }

    /// Upload one file; returns whether it was committed remotely.
    ///
    /// Exactly one notification is sent per failed file, at final retry
    /// exhaustion. Notification delivery failures are logged, nothing more.
    pub async fn upload_file(&self, local_path: &Path, file_size: u64) -> bool {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        let dest_path = format!("{}/{}", self.remote_folder, file_name);

        if self.ensure_remote_folder {
            if let Err(e) = ensure_folder(self.storage.as_ref(), &self.remote_folder).await {
                error!("cannot ensure remote folder {}: {e}", self.remote_folder);
                self.send_alert(&format!(
                    "The site {} could not prepare remote folder {}: {e}",
                    self.site_name, self.remote_folder
                ))
                .await;
                return false;
            }
        }

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            match chunked_upload::transfer_file(
                self.storage.as_ref(),
                local_path,
                file_size,
                &dest_path,
                self.chunk_size,
            )
            .await
            {
                Ok(()) => {
                    info!("uploaded {} -> {dest_path} ({file_size} bytes)", local_path.display());
                    return true;
                }
                Err(e) => {
                    warn!(
                        "upload attempt {attempt}/{} failed for {}: {e}",
                        self.max_retries,
                        local_path.display()
                    );
                    last_error = e.to_string();
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay(attempt)).await;
                    }
                }
            }
        }

        let exhausted = BackupError::RetriesExhausted {
            path: local_path.display().to_string(),
            attempts: self.max_retries,
            last_error,
        };
        error!("{exhausted}");
        self.send_alert(&format!(
            "The site {} returned status code or error {exhausted}.",
            self.site_name
        ))
        .await;
        false
    }

    /// Exponential backoff: base, 2x, 4x ... capped.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt - 1).min(4);
        (self.retry_base_delay * factor).min(MAX_RETRY_DELAY)
    }

    async fn send_alert(&self, body: &str) {
        let subject = alert_subject(&self.site_name);
        if let Err(e) = self.notifier.notify(&subject, body).await {
            warn!("failed to deliver failure notification: {e}");
        }
    }
}
