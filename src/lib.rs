//! Sitevault: site backup to Dropbox-style object storage.
//!
//! Archives a site root (plus an optional mysqldump), uploads the artifacts
//! with chunked sessions and bounded retries, and enforces a remote
//! retention window. Failures escalate through a notification sink.

pub mod api_contracts;
pub mod artifacts;
pub mod auth;
pub mod chunked_upload;
pub mod config;
pub mod content_hash;
pub mod error;
pub mod folder_sync;
pub mod notify;
pub mod retention;
pub mod site_check;
pub mod storage_client;
pub mod task_pool;
pub mod uploader;

#[cfg(test)]
pub mod test_harness;

pub use config::BackupConfig;
pub use error::{BackupError, BackupResult};
pub use folder_sync::FolderUploadCoordinator;
pub use notify::NotificationSink;
pub use retention::RetentionSweeper;
pub use site_check::SiteChecker;
pub use storage_client::{ObjectStorage, StorageClient, TokenSource};
pub use uploader::FileUploader;
