//! Remote retention: list a folder, find files past the age cutoff, delete
//! them with bounded concurrency.

use crate::api_contracts::EntryMetadata;
use crate::error::BackupResult;
use crate::notify::{alert_subject, NotificationSink};
use crate::storage_client::ObjectStorage;
use crate::task_pool;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default number of concurrent deletions.
pub const DEFAULT_DELETE_WORKERS: usize = 7;

const DEFAULT_DELETE_DELAY: Duration = Duration::from_secs(1);

/// Deletes remote backups older than a retention window.
pub struct RetentionSweeper {
    storage: Arc<dyn ObjectStorage>,
    notifier: Arc<dyn NotificationSink>,
    site_name: String,
    max_workers: usize,
    delete_delay: Duration,
}

impl RetentionSweeper {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        notifier: Arc<dyn NotificationSink>,
        site_name: String,
    ) -> Self {
        Self {
            storage,
            notifier,
            site_name,
            max_workers: DEFAULT_DELETE_WORKERS,
            delete_delay: DEFAULT_DELETE_DELAY,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Pause inserted after each successful delete, to pace the remote API.
    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = delay;
        self
    }

    /// Delete every file under `folder` whose server timestamp is strictly
    /// older than `days` days. Per-file delete failures are notified and do
    /// not stop the sweep; a listing failure aborts it with a single alert.
    pub async fn delete_older_than(&self, folder: &str, days: i64) {
        let expired = match self.collect_expired(folder, days, Utc::now()).await {
            Ok(expired) => expired,
            Err(e) => {
                error!("cannot list {folder} for retention sweep: {e}");
                self.send_alert(&format!(
                    "The site {} retention sweep could not list {folder}: {e}",
                    self.site_name
                ))
                .await;
                return;
            }
        };

        if expired.is_empty() {
            info!("retention sweep of {folder}: nothing older than {days} days");
            return;
        }

        info!(
            "retention sweep of {folder}: deleting {} files older than {days} days",
            expired.len()
        );

        let futures: Vec<_> = expired
            .into_iter()
            .map(|entry| {
                let storage = Arc::clone(&self.storage);
                let delay = self.delete_delay;
                async move {
                    let target = match entry.delete_path() {
                        Some(path) => path.to_string(),
                        None => {
                            warn!("expired entry {} has no path, skipping", entry.name);
                            return Ok(());
                        }
                    };
                    match storage.delete_file(&target).await {
                        Ok(()) => {
                            info!("deleted expired backup {target}");
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            Ok(())
                        }
                        Err(e) => {
                            warn!("failed to delete {target}: {e}");
                            Err((target, e))
                        }
                    }
                }
            })
            .collect();

        let outcomes = task_pool::run_bounded(self.max_workers, futures).await;
        for outcome in outcomes {
            if let Err((target, e)) = outcome {
                self.send_alert(&format!(
                    "The site {} retention sweep failed to delete {target}: {e}",
                    self.site_name
                ))
                .await;
            }
        }
    }

    /// List `folder` to exhaustion and keep the file entries whose server
    /// timestamp is strictly older than the cutoff. Entries without a
    /// timestamp are left alone.
    pub async fn collect_expired(
        &self,
        folder: &str,
        days: i64,
        now: DateTime<Utc>,
    ) -> BackupResult<Vec<EntryMetadata>> {
        let cutoff = now - ChronoDuration::days(days);
        let mut expired = Vec::new();

        let mut page = self.storage.list_folder(folder).await?;
        loop {
            for entry in page.entries {
                if !entry.is_file() {
                    continue;
                }
                if let Some(modified) = entry.server_modified {
                    if modified < cutoff {
                        expired.push(entry);
                    }
                }
            }
            if !page.has_more {
                break;
            }
            page = self.storage.list_folder_continue(&page.cursor).await?;
        }

        Ok(expired)
    }

    async fn send_alert(&self, body: &str) {
        let subject = alert_subject(&self.site_name);
        if let Err(e) = self.notifier.notify(&subject, body).await {
            warn!("failed to deliver failure notification: {e}");
        }
    }
}
