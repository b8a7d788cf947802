//! In-memory fakes for exercising upload, retention, and notification logic
//! without a network.

use crate::api_contracts::{EntryMetadata, ListFolderResponse};
use crate::content_hash::content_hash;
use crate::error::{BackupError, BackupResult};
use crate::notify::NotificationSink;
use crate::storage_client::ObjectStorage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredFile {
    data: Vec<u8>,
    modified: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct OpenSession {
    buffer: Vec<u8>,
}

#[derive(Debug, Default)]
struct StorageState {
    files: BTreeMap<String, StoredFile>,
    folders: HashSet<String>,
    folder_entries: HashSet<String>,
    conflict_folders: HashSet<String>,
    sessions: HashMap<String, OpenSession>,
    next_session_id: u64,
    sessions_started: u32,
    append_calls: u32,
    finish_calls: u32,
    // Upload fault injection: let this many upload ops through, then fail
    // that many.
    ops_before_fail: u32,
    fail_remaining: u32,
    failing_upload_paths: HashSet<String>,
    failing_delete_paths: HashSet<String>,
    fail_listing: bool,
    page_size: usize,
    track_deletes: bool,
    deletes_in_flight: usize,
    max_concurrent_deletes: usize,
}

/// An in-memory `ObjectStorage` with knobs for injecting faults and
/// inspecting what the code under test did.
pub struct MemoryStorage {
    state: Mutex<StorageState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StorageState {
                page_size: usize::MAX,
                ..StorageState::default()
            }),
        }
    }

    pub fn insert_file(&self, path: &str, data: Vec<u8>, modified: Option<DateTime<Utc>>) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(path.to_string(), StoredFile { data, modified });
    }

    /// Add a folder entry that shows up in listings of its parent.
    pub fn insert_folder_entry(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.folder_entries.insert(path.to_string());
    }

    pub fn file_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().files.get(path).map(|f| f.data.clone())
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    pub fn folder_exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().folders.contains(path)
    }

    pub fn folder_count(&self) -> usize {
        self.state.lock().unwrap().folders.len()
    }

    pub fn open_session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn sessions_started(&self) -> u32 {
        self.state.lock().unwrap().sessions_started
    }

    pub fn append_calls(&self) -> u32 {
        self.state.lock().unwrap().append_calls
    }

    pub fn finish_calls(&self) -> u32 {
        self.state.lock().unwrap().finish_calls
    }

    /// Fail the next `count` upload operations (small upload, session start,
    /// append, finish).
    pub fn fail_next_uploads(&self, count: u32) {
        self.fail_after_upload_ops(0, count);
    }

    /// Let `ok` upload operations succeed, then fail the next `fail` ones.
    pub fn fail_after_upload_ops(&self, ok: u32, fail: u32) {
        let mut state = self.state.lock().unwrap();
        state.ops_before_fail = ok;
        state.fail_remaining = fail;
    }

    /// Every upload committing to `path` fails, forever.
    pub fn fail_uploads_for(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_upload_paths.insert(path.to_string());
    }

    pub fn fail_delete_for(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_delete_paths.insert(path.to_string());
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    /// Make `create_folder(path)` report a conflict while `get_metadata`
    /// still reports the folder as absent, as if a concurrent create won.
    pub fn force_create_conflict(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.conflict_folders.insert(path.to_string());
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.state.lock().unwrap().page_size = page_size.max(1);
    }

    pub fn track_delete_concurrency(&self) {
        self.state.lock().unwrap().track_deletes = true;
    }

    pub fn max_concurrent_deletes(&self) -> usize {
        self.state.lock().unwrap().max_concurrent_deletes
    }

    fn upload_fault(state: &mut StorageState, dest_path: Option<&str>) -> BackupResult<()> {
        if let Some(path) = dest_path {
            if state.failing_upload_paths.contains(path) {
                return Err(BackupError::Api {
                    status: 503,
                    message: format!("injected failure for {path}"),
                });
            }
        }
        if state.ops_before_fail > 0 {
            state.ops_before_fail -= 1;
            return Ok(());
        }
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(BackupError::Api {
                status: 503,
                message: "injected upload failure".to_string(),
            });
        }
        Ok(())
    }

    fn entry_for(path: &str, file: &StoredFile) -> EntryMetadata {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        EntryMetadata {
            tag: "file".to_string(),
            name,
            path_lower: Some(path.to_lowercase()),
            path_display: Some(path.to_string()),
            server_modified: file.modified,
            size: Some(file.data.len() as u64),
            content_hash: Some(content_hash(&file.data)),
        }
    }

    fn folder_entry_for(path: &str) -> EntryMetadata {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        EntryMetadata {
            tag: "folder".to_string(),
            name,
            path_lower: Some(path.to_lowercase()),
            path_display: Some(path.to_string()),
            server_modified: None,
            size: None,
            content_hash: None,
        }
    }

    fn list_page(&self, folder: &str, start: usize) -> BackupResult<ListFolderResponse> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(BackupError::Api {
                status: 503,
                message: "injected listing failure".to_string(),
            });
        }

        let prefix = format!("{folder}/");
        let mut entries: Vec<EntryMetadata> = state
            .files
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(path, file)| Self::entry_for(path, file))
            .collect();
        let mut folder_children: Vec<_> = state
            .folder_entries
            .iter()
            .filter(|path| path.starts_with(&prefix))
            .map(|path| Self::folder_entry_for(path))
            .collect();
        folder_children.sort_by(|a, b| a.path_display.cmp(&b.path_display));
        entries.extend(folder_children);

        let total = entries.len();
        let end = (start + state.page_size).min(total);
        let page = entries[start.min(total)..end].to_vec();
        Ok(ListFolderResponse {
            entries: page,
            cursor: format!("{folder}|{end}"),
            has_more: end < total,
        })
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn get_metadata(&self, path: &str) -> BackupResult<Option<EntryMetadata>> {
        let state = self.state.lock().unwrap();
        if let Some(file) = state.files.get(path) {
            return Ok(Some(Self::entry_for(path, file)));
        }
        if state.folders.contains(path) && !state.conflict_folders.contains(path) {
            return Ok(Some(Self::folder_entry_for(path)));
        }
        Ok(None)
    }

    async fn create_folder(&self, path: &str) -> BackupResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.folders.contains(path) || state.conflict_folders.contains(path) {
            return Err(BackupError::Api {
                status: 409,
                message: "path/conflict/folder/".to_string(),
            });
        }
        state.folders.insert(path.to_string());
        Ok(())
    }

    async fn upload_small(&self, path: &str, data: Vec<u8>) -> BackupResult<EntryMetadata> {
        let mut state = self.state.lock().unwrap();
        Self::upload_fault(&mut state, Some(path))?;
        let file = StoredFile {
            data,
            modified: Some(Utc::now()),
        };
        let entry = Self::entry_for(path, &file);
        state.files.insert(path.to_string(), file);
        Ok(entry)
    }

    async fn start_session(&self, data: Vec<u8>) -> BackupResult<String> {
        let mut state = self.state.lock().unwrap();
        Self::upload_fault(&mut state, None)?;
        state.sessions_started += 1;
        state.next_session_id += 1;
        let session_id = format!("session-{}", state.next_session_id);
        state.sessions.insert(session_id.clone(), OpenSession { buffer: data });
        Ok(session_id)
    }

    async fn append_session(&self, session_id: &str, offset: u64, data: Vec<u8>) -> BackupResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::upload_fault(&mut state, None)?;
        state.append_calls += 1;
        let session = state.sessions.get_mut(session_id).ok_or_else(|| BackupError::Api {
            status: 409,
            message: "lookup_failed/not_found".to_string(),
        })?;
        if session.buffer.len() as u64 != offset {
            return Err(BackupError::Api {
                status: 409,
                message: "lookup_failed/incorrect_offset".to_string(),
            });
        }
        session.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finish_session(
        &self,
        session_id: &str,
        offset: u64,
        data: Vec<u8>,
        dest_path: &str,
    ) -> BackupResult<EntryMetadata> {
        let mut state = self.state.lock().unwrap();
        Self::upload_fault(&mut state, Some(dest_path))?;
        state.finish_calls += 1;
        let mut session = state.sessions.remove(session_id).ok_or_else(|| BackupError::Api {
            status: 409,
            message: "lookup_failed/not_found".to_string(),
        })?;
        if session.buffer.len() as u64 != offset {
            return Err(BackupError::Api {
                status: 409,
                message: "lookup_failed/incorrect_offset".to_string(),
            });
        }
        session.buffer.extend_from_slice(&data);
        let file = StoredFile {
            data: session.buffer,
            modified: Some(Utc::now()),
        };
        let entry = Self::entry_for(dest_path, &file);
        state.files.insert(dest_path.to_string(), file);
        Ok(entry)
    }

    async fn list_folder(&self, path: &str) -> BackupResult<ListFolderResponse> {
        self.list_page(path, 0)
    }

    async fn list_folder_continue(&self, cursor: &str) -> BackupResult<ListFolderResponse> {
        let (folder, offset) = cursor.split_once('|').ok_or_else(|| BackupError::Api {
            status: 400,
            message: format!("bad cursor {cursor}"),
        })?;
        let offset: usize = offset.parse().map_err(|_| BackupError::Api {
            status: 400,
            message: format!("bad cursor {cursor}"),
        })?;
        self.list_page(folder, offset)
    }

    async fn delete_file(&self, path: &str) -> BackupResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.failing_delete_paths.contains(path) {
                return Err(BackupError::Api {
                    status: 503,
                    message: format!("injected delete failure for {path}"),
                });
            }
            if state.track_deletes {
                state.deletes_in_flight += 1;
                state.max_concurrent_deletes =
                    state.max_concurrent_deletes.max(state.deletes_in_flight);
            }
        }
        // Let concurrent deletes overlap before the entry is removed
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        if state.track_deletes {
            state.deletes_in_flight -= 1;
        }
        if state.files.remove(path).is_none() {
            return Err(BackupError::NotFound(path.to_string()));
        }
        Ok(())
    }
}

/// Records notifications instead of delivering them.
pub struct CountingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<(String, String)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl Default for CountingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for CountingNotifier {
    async fn notify(&self, subject: &str, body: &str) -> BackupResult<()> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((subject.to_string(), body.to_string()));
        Ok(())
    }
}
