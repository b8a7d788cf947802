use chrono::Utc;
use sitevault::artifacts::{self, Artifact};
use sitevault::auth::TokenProvider;
use sitevault::config::{logs_dir, BackupConfig};
use sitevault::notify::{LogNotifier, NotificationSink, WebhookNotifier};
use sitevault::retention::RetentionSweeper;
use sitevault::site_check::SiteChecker;
use sitevault::storage_client::{StorageClient, TokenSource};
use sitevault::uploader::FileUploader;
use sitevault::{FolderUploadCoordinator, ObjectStorage};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_UPLOAD_FAILED: u8 = 1;
const EXIT_SETUP_FAILED: u8 = 2;

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match logs_dir() {
        Ok(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "sitevault.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _log_guard = init_tracing();

    let config = match BackupConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            eprintln!("configuration error: {e}");
            return ExitCode::from(EXIT_SETUP_FAILED);
        }
    };

    let token_provider = Arc::new(TokenProvider::new(
        config.storage.app_key.clone(),
        config.storage.app_secret.clone(),
        config.storage.refresh_token.clone(),
    ));
    let storage: Arc<dyn ObjectStorage> =
        Arc::new(StorageClient::new(TokenSource::Refreshing(token_provider)));
    let notifier: Arc<dyn NotificationSink> = match &config.notify_webhook {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    // Availability check first; failures alert the operator but do not block
    // the backup or change the exit code
    if !config.check_sites.is_empty() {
        let checker = SiteChecker::new(Arc::clone(&notifier));
        let down = checker.check_sites(&config.check_sites).await;
        if down > 0 {
            warn!(
                "{down} of {} sites failed the availability check",
                config.check_sites.len()
            );
        }
    }

    info!("starting backup of {}", config.site_name);
    let uploads_ok = run_backup(&config, &storage, &notifier).await;

    if uploads_ok {
        let sweeper = RetentionSweeper::new(
            Arc::clone(&storage),
            Arc::clone(&notifier),
            config.site_name.clone(),
        )
        .with_max_workers(config.delete_workers);
        sweeper
            .delete_older_than(&config.remote_folder(), config.retention_days)
            .await;
        info!("backup of {} finished", config.site_name);
        ExitCode::SUCCESS
    } else {
        error!("backup of {} failed, skipping retention sweep", config.site_name);
        ExitCode::from(EXIT_UPLOAD_FAILED)
    }
}

async fn run_backup(
    config: &BackupConfig,
    storage: &Arc<dyn ObjectStorage>,
    notifier: &Arc<dyn NotificationSink>,
) -> bool {
    if config.mirror_tree {
        let coordinator = FolderUploadCoordinator::new(
            Arc::clone(storage),
            Arc::clone(notifier),
            config.site_name.clone(),
            config.remote_folder(),
        )
        .with_chunk_size(config.chunk_size)
        .with_max_retries(config.max_retries)
        .with_max_workers(config.upload_workers);
        return coordinator.upload_folder(&config.root_dir).await;
    }

    let staged = match stage_artifacts(config).await {
        Ok(staged) => staged,
        Err(e) => {
            error!("staging failed: {e}");
            let subject = sitevault::notify::alert_subject(&config.site_name);
            let body = format!("The site {} backup could not be staged: {e}", config.site_name);
            if let Err(e) = notifier.notify(&subject, &body).await {
                error!("failed to deliver failure notification: {e}");
            }
            return false;
        }
    };

    let uploader = FileUploader::new(
        Arc::clone(storage),
        Arc::clone(notifier),
        config.site_name.clone(),
        config.remote_folder(),
    )
    .with_chunk_size(config.chunk_size)
    .with_max_retries(config.max_retries);

    let mut all_ok = true;
    for artifact in &staged {
        if !uploader.upload_file(&artifact.path, artifact.size).await {
            all_ok = false;
        }
    }

    if all_ok {
        artifacts::remove_artifacts(&staged).await;
    }
    all_ok
}

async fn stage_artifacts(config: &BackupConfig) -> sitevault::BackupResult<Vec<Artifact>> {
    let staging_dir = config.staging_dir();
    let stamp = artifacts::run_stamp(Utc::now());
    let mut staged = Vec::new();

    staged.push(
        artifacts::create_archive(&config.site_name, &config.root_dir, &staging_dir, &stamp)
            .await?,
    );
    if let Some(database) = &config.database {
        staged.push(artifacts::create_db_dump(database, &staging_dir, &stamp).await?);
    }
    Ok(staged)
}
