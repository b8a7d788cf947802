//! Client for the object-storage API.
//!
//! `ObjectStorage` is the seam the uploader and sweeper are written against;
//! `StorageClient` is the production implementation speaking the
//! Dropbox-compatible wire protocol. RPC endpoints take JSON bodies; content
//! endpoints carry the chunk bytes in the body and the arguments in the
//! `Dropbox-API-Arg` header.

use crate::api_contracts::{EntryMetadata, ListFolderResponse, SessionCursor, SessionStartResponse};
use crate::auth::TokenProvider;
use crate::error::{BackupError, BackupResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.dropboxapi.com";
const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com";

/// Operations the backup workflow needs from remote storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Metadata for a path, or `None` if nothing exists there.
    async fn get_metadata(&self, path: &str) -> BackupResult<Option<EntryMetadata>>;

    async fn create_folder(&self, path: &str) -> BackupResult<()>;

    /// Single-call upload for payloads at or below the chunk size.
    async fn upload_small(&self, dest_path: &str, data: Vec<u8>) -> BackupResult<EntryMetadata>;

    /// Open an upload session seeded with the first chunk; returns the
    /// session id.
    async fn start_session(&self, first_chunk: Vec<u8>) -> BackupResult<String>;

    /// Append a chunk at `offset` (bytes already transferred).
    async fn append_session(
        &self,
        session_id: &str,
        offset: u64,
        chunk: Vec<u8>,
    ) -> BackupResult<()>;

    /// Commit the session with its final chunk. The destination file becomes
    /// visible only when this succeeds; the session is destroyed either way.
    async fn finish_session(
        &self,
        session_id: &str,
        offset: u64,
        chunk: Vec<u8>,
        dest_path: &str,
    ) -> BackupResult<EntryMetadata>;

    async fn list_folder(&self, path: &str) -> BackupResult<ListFolderResponse>;

    async fn list_folder_continue(&self, cursor: &str) -> BackupResult<ListFolderResponse>;

    async fn delete_file(&self, path: &str) -> BackupResult<()>;
}

/// Where API calls get their bearer token from.
pub enum TokenSource {
    /// A fixed token, used by tests and short scripts.
    Static(String),
    /// Refresh-token exchange with caching.
    Refreshing(Arc<TokenProvider>),
}

impl TokenSource {
    async fn token(&self) -> BackupResult<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Refreshing(provider) => provider.access_token().await,
        }
    }
}

/// Production storage client.
pub struct StorageClient {
    client: reqwest::Client,
    api_base_url: String,
    content_base_url: String,
    auth: TokenSource,
}

impl StorageClient {
    /// Create a client against the production endpoints.
    pub fn new(auth: TokenSource) -> Self {
        Self::with_base_urls(
            DEFAULT_API_BASE.to_string(),
            DEFAULT_CONTENT_BASE.to_string(),
            auth,
        )
    }

    /// Create a client with explicit base URLs (used by tests).
    pub fn with_base_urls(api_base_url: String, content_base_url: String, auth: TokenSource) -> Self {
        // 60 second timeout: large chunk uploads can take a while
        let version = env!("CARGO_PKG_VERSION");
        let user_agent = format!("Sitevault/{}", version);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .user_agent(&user_agent)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_base_url,
            content_base_url,
            auth,
        }
    }

    /// JSON-in, JSON-out RPC endpoint.
    async fn rpc<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> BackupResult<T> {
        let response = self
            .client
            .post(format!("{}/2/{}", self.api_base_url, endpoint))
            .bearer_auth(self.auth.token().await?)
            .json(&body)
            .send()
            .await?;

        Self::parse_json(response).await
    }

    /// RPC endpoint whose response body we do not care about.
    async fn rpc_unit(&self, endpoint: &str, body: serde_json::Value) -> BackupResult<()> {
        let response = self
            .client
            .post(format!("{}/2/{}", self.api_base_url, endpoint))
            .bearer_auth(self.auth.token().await?)
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await.map(|_| ())
    }

    /// Content endpoint: arguments in the API-arg header, bytes in the body.
    async fn content_request(
        &self,
        endpoint: &str,
        arg: serde_json::Value,
        data: Vec<u8>,
    ) -> BackupResult<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/2/{}", self.content_base_url, endpoint))
            .bearer_auth(self.auth.token().await?)
            .header("Dropbox-API-Arg", arg.to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Map non-success statuses onto the error taxonomy. A 409 whose body
    /// names `not_found` is the expected missing-path case.
    async fn check_status(response: reqwest::Response) -> BackupResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 409 && body.contains("not_found") {
            return Err(BackupError::NotFound(body));
        }
        Err(BackupError::Api {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> BackupResult<T> {
        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ObjectStorage for StorageClient {
    async fn get_metadata(&self, path: &str) -> BackupResult<Option<EntryMetadata>> {
        match self
            .rpc::<EntryMetadata>("files/get_metadata", json!({ "path": path }))
            .await
        {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_folder(&self, path: &str) -> BackupResult<()> {
        self.rpc_unit("files/create_folder_v2", json!({ "path": path }))
            .await?;
        debug!("created remote folder {path}");
        Ok(())
    }

    async fn upload_small(&self, dest_path: &str, data: Vec<u8>) -> BackupResult<EntryMetadata> {
        let size = data.len();
        let response = self
            .content_request(
                "files/upload",
                json!({ "path": dest_path, "mode": "overwrite" }),
                data,
            )
            .await?;

        let metadata = response.json().await?;
        debug!("uploaded {size} bytes to {dest_path}");
        Ok(metadata)
    }

    async fn start_session(&self, first_chunk: Vec<u8>) -> BackupResult<String> {
        let response = self
            .content_request("files/upload_session/start", json!({ "close": false }), first_chunk)
            .await?;

        let started: SessionStartResponse = response.json().await?;
        Ok(started.session_id)
    }

    async fn append_session(
        &self,
        session_id: &str,
        offset: u64,
        chunk: Vec<u8>,
    ) -> BackupResult<()> {
        let cursor = SessionCursor {
            session_id: session_id.to_string(),
            offset,
        };
        self.content_request("files/upload_session/append_v2", json!({ "cursor": cursor }), chunk)
            .await?;
        Ok(())
    }

    async fn finish_session(
        &self,
        session_id: &str,
        offset: u64,
        chunk: Vec<u8>,
        dest_path: &str,
    ) -> BackupResult<EntryMetadata> {
        let cursor = SessionCursor {
            session_id: session_id.to_string(),
            offset,
        };
        let response = self
            .content_request(
                "files/upload_session/finish",
                json!({
                    "cursor": cursor,
                    "commit": { "path": dest_path, "mode": "overwrite" },
                }),
                chunk,
            )
            .await?;

        let metadata = response.json().await?;
        debug!("committed upload session {session_id} to {dest_path}");
        Ok(metadata)
    }

    async fn list_folder(&self, path: &str) -> BackupResult<ListFolderResponse> {
        self.rpc("files/list_folder", json!({ "path": path })).await
    }

    async fn list_folder_continue(&self, cursor: &str) -> BackupResult<ListFolderResponse> {
        self.rpc("files/list_folder/continue", json!({ "cursor": cursor }))
            .await
    }

    async fn delete_file(&self, path: &str) -> BackupResult<()> {
        self.rpc_unit("files/delete_v2", json!({ "path": path })).await
    }
}
