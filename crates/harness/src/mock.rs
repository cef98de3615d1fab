use std::cell::RefCell;
use std::rc::Rc;

use ideaflash_core::{FlashId, clock};
use ideaflash_engine::{RemoteDraft, RemoteError, RemoteNote, RemoteNotes, RemoteUpdate};

#[derive(Default)]
struct MockServer {
    notes: Vec<RemoteNote>,
    list_failing: bool,
    /// Successful listings left before `list_notes` starts failing.
    lists_before_failure: Option<usize>,
    writes_failing: bool,
    deletes_failing: bool,
    failing_content: Vec<String>,
    creates: Vec<RemoteDraft>,
    list_calls: usize,
    sign_outs: usize,
}

impl MockServer {
    fn injected(what: &str) -> RemoteError {
        RemoteError::Transport(format!("injected {what} failure"))
    }

    fn find(&self, flash_id: &FlashId) -> Option<usize> {
        self.notes.iter().position(|n| &n.flash_id == flash_id)
    }
}

/// In-memory stand-in for the remote note service. Clones share one server,
/// so a test can keep a handle while the state under test owns another.
#[derive(Clone, Default)]
pub struct MockRemote {
    server: Rc<RefCell<MockServer>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notes(notes: Vec<RemoteNote>) -> Self {
        let remote = Self::new();
        remote.server.borrow_mut().notes = notes;
        remote
    }

    /// Put a note on the server directly, bypassing failure injection.
    pub fn seed(&self, note: RemoteNote) {
        self.server.borrow_mut().notes.push(note);
    }

    pub fn notes(&self) -> Vec<RemoteNote> {
        self.server.borrow().notes.clone()
    }

    pub fn flash_ids(&self) -> Vec<FlashId> {
        self.server.borrow().notes.iter().map(|n| n.flash_id.clone()).collect()
    }

    /// `false` also cancels a pending `fail_list_after`.
    pub fn set_list_failing(&self, failing: bool) {
        let mut server = self.server.borrow_mut();
        server.list_failing = failing;
        if !failing {
            server.lists_before_failure = None;
        }
    }

    /// Let `n` listings succeed, then fail every one after.
    pub fn fail_list_after(&self, n: usize) {
        self.server.borrow_mut().lists_before_failure = Some(n);
    }

    pub fn set_writes_failing(&self, failing: bool) {
        self.server.borrow_mut().writes_failing = failing;
    }

    pub fn set_deletes_failing(&self, failing: bool) {
        self.server.borrow_mut().deletes_failing = failing;
    }

    /// Reject creates whose content contains `needle`.
    pub fn fail_creates_containing(&self, needle: &str) {
        self.server.borrow_mut().failing_content.push(needle.to_string());
    }

    /// Every create attempt that reached the server, failed or not.
    pub fn create_attempts(&self) -> Vec<RemoteDraft> {
        self.server.borrow().creates.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.server.borrow().list_calls
    }

    pub fn sign_outs(&self) -> usize {
        self.server.borrow().sign_outs
    }
}

impl RemoteNotes for MockRemote {
    fn create_note(&self, draft: &RemoteDraft) -> Result<RemoteNote, RemoteError> {
        let mut server = self.server.borrow_mut();
        server.creates.push(draft.clone());
        if server.writes_failing
            || server
                .failing_content
                .iter()
                .any(|needle| draft.content.contains(needle.as_str()))
        {
            return Err(MockServer::injected("create"));
        }

        let now = clock::now().map_err(|e| RemoteError::Decode(e.to_string()))?;
        let mut note = RemoteNote {
            flash_id: draft.flash_id.clone(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            tags: draft.tags.clone(),
            url: draft.url.clone(),
            created_at: Some(now),
            updated_at: Some(now),
        };
        // the flash id is the idempotency key: creating it again overwrites
        match server.find(&draft.flash_id) {
            Some(i) => {
                note.created_at = server.notes[i].created_at.or(note.created_at);
                server.notes[i] = note.clone();
            }
            None => server.notes.push(note.clone()),
        }
        Ok(note)
    }

    fn list_notes(&self) -> Result<Vec<RemoteNote>, RemoteError> {
        let mut server = self.server.borrow_mut();
        server.list_calls += 1;
        if server.list_failing {
            return Err(MockServer::injected("list"));
        }
        if let Some(left) = server.lists_before_failure {
            if left == 0 {
                return Err(MockServer::injected("list"));
            }
            server.lists_before_failure = Some(left - 1);
        }
        Ok(server.notes.clone())
    }

    fn update_note(
        &self,
        flash_id: &FlashId,
        update: &RemoteUpdate,
    ) -> Result<RemoteNote, RemoteError> {
        let mut server = self.server.borrow_mut();
        if server.writes_failing {
            return Err(MockServer::injected("update"));
        }
        let i = server.find(flash_id).ok_or_else(|| RemoteError::Status {
            status: 404,
            body: format!("no post {flash_id}"),
        })?;
        let now = clock::now().map_err(|e| RemoteError::Decode(e.to_string()))?;
        let note = &mut server.notes[i];
        note.title = update.title.clone();
        note.content = update.content.clone();
        note.updated_at = Some(now);
        Ok(note.clone())
    }

    fn delete_note(&self, flash_id: &FlashId) -> Result<(), RemoteError> {
        let mut server = self.server.borrow_mut();
        if server.writes_failing || server.deletes_failing {
            return Err(MockServer::injected("delete"));
        }
        let i = server.find(flash_id).ok_or_else(|| RemoteError::Status {
            status: 404,
            body: format!("no post {flash_id}"),
        })?;
        server.notes.remove(i);
        Ok(())
    }

    fn sign_out(&self) -> Result<(), RemoteError> {
        let mut server = self.server.borrow_mut();
        server.sign_outs += 1;
        if server.writes_failing {
            return Err(MockServer::injected("sign out"));
        }
        Ok(())
    }
}
