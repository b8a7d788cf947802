//! Wire contract types for the object-storage API.
//!
//! These mirror the JSON bodies exchanged with the Dropbox-compatible
//! endpoints the client talks to. Principles:
//! - Use explicit `Option<T>` for fields the server may omit
//! - Use serde attributes to match the JSON format exactly

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Metadata
// =============================================================================

/// Metadata for a single remote entry (file or folder).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryMetadata {
    /// "file" or "folder". Defaults to empty for endpoints that omit it.
    #[serde(rename = ".tag", default)]
    pub tag: String,
    pub name: String,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub path_display: Option<String>,
    /// Last-write timestamp, UTC. Present for files only.
    #[serde(default)]
    pub server_modified: Option<DateTime<Utc>>,
    /// Size in bytes. Present for files only.
    #[serde(default)]
    pub size: Option<u64>,
    /// Provider content hash of the committed bytes.
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl EntryMetadata {
    pub fn is_file(&self) -> bool {
        self.tag == "file"
    }

    /// The path used for delete calls; falls back to the display path.
    pub fn delete_path(&self) -> Option<&str> {
        self.path_lower.as_deref().or(self.path_display.as_deref())
    }
}

// =============================================================================
// Upload sessions
// =============================================================================

/// Response from the session start endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStartResponse {
    pub session_id: String,
}

/// Cursor sent with append/finish calls: which session, and how many bytes
/// the server should already hold for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCursor {
    pub session_id: String,
    pub offset: u64,
}

// =============================================================================
// Listing
// =============================================================================

/// One page of a folder listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFolderResponse {
    pub entries: Vec<EntryMetadata>,
    pub cursor: String,
    pub has_more: bool,
}

// =============================================================================
// Auth
// =============================================================================

/// Response from the OAuth token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime of the access token, in seconds.
    pub expires_in: i64,
}
