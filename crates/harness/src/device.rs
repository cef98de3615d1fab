use ideaflash_core::{FlashId, Note, UserId, clock};
use ideaflash_engine::{EngineError, NotesState, ReconcileReport, RemoteNote, Session};
use ideaflash_storage::{NoteStorage, StorageError};

use crate::MockRemote;

/// One client device: an in-memory store behind a `NotesState`, plus a handle
/// to the mock server it syncs with.
pub struct TestDevice {
    pub state: NotesState,
    pub remote: MockRemote,
}

impl Default for TestDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDevice {
    pub fn new() -> Self {
        Self::with_remote(MockRemote::new())
    }

    pub fn with_remote(remote: MockRemote) -> Self {
        Self {
            state: NotesState::new(NoteStorage::in_memory()),
            remote,
        }
    }

    /// Log in as `user` against this device's mock server.
    pub fn login(&mut self, user: &str) -> Result<ReconcileReport, EngineError> {
        let session = Session::new(format!("token-{user}"), UserId::from_string(user));
        self.state.login(session, Box::new(self.remote.clone()))
    }

    /// Straight from the store, newest first.
    pub fn local_notes(&mut self) -> Result<Vec<Note>, StorageError> {
        self.state.storage_mut().get_notes(None)
    }

    pub fn local_flash_ids(&mut self) -> Result<Vec<FlashId>, StorageError> {
        Ok(self.local_notes()?.into_iter().map(|n| n.flash_id).collect())
    }
}

/// A server-side note with both timestamps taken from its flash id.
pub fn remote_note(flash_id: &str, title: &str, content: &str) -> RemoteNote {
    let flash_id = FlashId::parse(flash_id).unwrap_or_else(|e| panic!("bad fixture: {e}"));
    let ts = clock::from_millis(flash_id.timestamp_ms()).ok();
    RemoteNote {
        flash_id,
        title: title.to_string(),
        content: content.to_string(),
        tags: Vec::new(),
        url: None,
        created_at: ts,
        updated_at: ts,
    }
}
