//! In-memory view of the notes for the UI layer.
//!
//! The store is the source of truth; the snapshot list is a cache refreshed
//! from what each store call returns. Local writes succeed or fail on their
//! own. When a session and remote are present, each successful local write is
//! mirrored to the remote on a best-effort basis.

use std::collections::BTreeMap;

use ideaflash_core::{FlashClock, FlashId, LocalId, NewNote, Note, NotePatch, OwnerToken};
use ideaflash_storage::{NoteStorage, StorageError};

use crate::config::ClientConfig;
use crate::error::EngineError;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::remote::{RemoteDraft, RemoteNotes, RemoteUpdate};
use crate::session::{Session, SessionFile};

pub type SubscriptionId = u64;

/// What subscribers see after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesSnapshot {
    pub notes: Vec<Note>,
    pub loading: bool,
    /// Message for the last failed action; cleared when the next action starts.
    pub error: Option<String>,
    pub search_term: String,
}

type Listener = Box<dyn FnMut(&NotesSnapshot)>;

pub struct NotesState {
    storage: NoteStorage,
    remote: Option<Box<dyn RemoteNotes>>,
    session: Option<Session>,
    session_file: Option<SessionFile>,
    reconciler: Reconciler,
    clock: FlashClock,
    snapshot: NotesSnapshot,
    listeners: BTreeMap<SubscriptionId, Listener>,
    next_subscription: SubscriptionId,
}

impl NotesState {
    pub fn new(storage: NoteStorage) -> Self {
        Self {
            storage,
            remote: None,
            session: None,
            session_file: None,
            reconciler: Reconciler::new(),
            clock: FlashClock::new(),
            snapshot: NotesSnapshot::default(),
            listeners: BTreeMap::new(),
            next_subscription: 0,
        }
    }

    /// Build from configuration, restoring a saved session if there is one.
    pub fn open(config: &ClientConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let session_file = config.session_store();
        let session = session_file.load()?;
        let remote = config.remote(session.as_ref())?;

        let mut state = Self::new(config.storage()).with_session_file(session_file);
        if let Some(remote) = remote {
            state.remote = Some(Box::new(remote));
        }
        if let Some(session) = &session {
            log::info!("restored session for {}", session.user_id());
        }
        state.session = session;
        Ok(state)
    }

    pub fn with_remote(mut self, remote: Box<dyn RemoteNotes>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_session_file(mut self, file: SessionFile) -> Self {
        self.session_file = Some(file);
        self
    }

    pub fn snapshot(&self) -> &NotesSnapshot {
        &self.snapshot
    }

    pub fn notes(&self) -> &[Note] {
        &self.snapshot.notes
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some() && self.remote.is_some()
    }

    pub fn is_reconciling(&self) -> bool {
        self.reconciler.is_running()
    }

    pub fn owner(&self) -> OwnerToken {
        self.session
            .as_ref()
            .map_or(OwnerToken::Anonymous, Session::owner)
    }

    pub fn storage_mut(&mut self) -> &mut NoteStorage {
        &mut self.storage
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&NotesSnapshot) + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.insert(id, Box::new(listener));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    fn notify(&mut self) {
        for listener in self.listeners.values_mut() {
            listener(&self.snapshot);
        }
    }

    fn begin(&mut self) {
        self.snapshot.loading = true;
        self.snapshot.error = None;
        self.notify();
    }

    /// Records the outcome of an action and clears `loading`.
    fn finish<T>(&mut self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        if let Err(e) = &result {
            log::warn!("note action failed: {e}");
            self.snapshot.error = Some(user_message(e));
        }
        self.snapshot.loading = false;
        self.notify();
        result
    }

    /// Best-effort remote mirror of a local write. Failures are logged only.
    fn mirror<F>(&self, what: &str, call: F)
    where
        F: FnOnce(&dyn RemoteNotes) -> Result<(), crate::remote::RemoteError>,
    {
        let (Some(remote), Some(_)) = (self.remote.as_deref(), self.session.as_ref()) else {
            return;
        };
        if let Err(e) = call(remote) {
            log::warn!("remote {what} failed, keeping local result: {e}");
        }
    }

    /// Replace the in-memory list with the full store listing.
    pub fn load_notes(&mut self) -> Result<(), EngineError> {
        self.begin();
        let result = self.storage.get_notes(None).map_err(EngineError::from);
        let result = result.map(|notes| {
            for note in &notes {
                self.clock.observe(note.flash_id.timestamp_ms());
            }
            self.snapshot.notes = notes;
        });
        self.finish(result)
    }

    /// Save a new note, minting a flash id for the current owner unless one is given.
    pub fn create_note(&mut self, mut draft: NewNote) -> Result<Note, EngineError> {
        self.begin();
        if draft.flash_id.is_none() {
            draft.flash_id = Some(FlashId::mint(self.clock.tick(), &self.owner()));
        }
        let result = self.storage.add_note(draft).map_err(EngineError::from);
        if let Ok(note) = &result {
            self.snapshot.notes.insert(0, note.clone());
            self.mirror("create", |remote| {
                remote
                    .create_note(&RemoteDraft::from_note(note, note.flash_id.clone()))
                    .map(|_| ())
            });
        }
        self.finish(result)
    }

    pub fn update_note(
        &mut self,
        local_id: &LocalId,
        patch: &NotePatch,
    ) -> Result<Note, EngineError> {
        self.begin();
        let result = self
            .storage
            .update_note(local_id, patch)
            .map_err(EngineError::from);
        if let Ok(note) = &result {
            let slot = self
                .snapshot
                .notes
                .iter_mut()
                .find(|n| n.local_id == note.local_id);
            if let Some(slot) = slot {
                *slot = note.clone();
            }
            self.mirror("update", |remote| {
                remote
                    .update_note(&note.flash_id, &RemoteUpdate::from(note))
                    .map(|_| ())
            });
        }
        self.finish(result)
    }

    /// Deleting a note the store no longer has counts as success.
    pub fn delete_note(&mut self, local_id: &LocalId) -> Result<(), EngineError> {
        self.begin();
        let flash_id = match self.find_flash_id(local_id) {
            Ok(flash_id) => flash_id,
            Err(e) => return self.finish(Err(e)),
        };
        let result = match self.storage.delete_note(local_id) {
            Ok(()) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) => Err(EngineError::from(e)),
        };
        if result.is_ok() {
            self.snapshot.notes.retain(|n| &n.local_id != local_id);
            if let Some(flash_id) = &flash_id {
                self.mirror("delete", |remote| remote.delete_note(flash_id));
            }
        }
        self.finish(result)
    }

    fn find_flash_id(&mut self, local_id: &LocalId) -> Result<Option<FlashId>, EngineError> {
        if let Some(note) = self.snapshot.notes.iter().find(|n| &n.local_id == local_id) {
            return Ok(Some(note.flash_id.clone()));
        }
        Ok(self.storage.get_note(local_id)?.map(|n| n.flash_id))
    }

    /// Case-insensitive filter over the loaded list. The list is overwritten;
    /// an empty term goes back to the store.
    pub fn search(&mut self, term: &str) -> Result<(), EngineError> {
        let term = term.trim();
        if term.is_empty() {
            return self.clear_search();
        }
        self.snapshot.search_term = term.to_string();
        self.snapshot.notes.retain(|n| n.matches(term));
        self.notify();
        Ok(())
    }

    /// Keep only notes carrying `tag`. Like `search`, overwrites the list.
    pub fn filter_by_tag(&mut self, tag: &str) {
        self.snapshot.notes.retain(|n| n.has_tag(tag));
        self.notify();
    }

    pub fn clear_search(&mut self) -> Result<(), EngineError> {
        self.snapshot.search_term.clear();
        self.load_notes()
    }

    /// Adopt `session`, merge with the remote and reload.
    pub fn login(
        &mut self,
        session: Session,
        remote: Box<dyn RemoteNotes>,
    ) -> Result<ReconcileReport, EngineError> {
        if let Some(file) = &self.session_file {
            if let Err(e) = file.save(&session) {
                log::warn!("could not persist session: {e}");
            }
        }
        log::info!("logged in as {}", session.user_id());
        self.session = Some(session);
        self.remote = Some(remote);
        self.sync_now()
    }

    /// Run a reconciliation pass on demand and reload.
    pub fn sync_now(&mut self) -> Result<ReconcileReport, EngineError> {
        self.begin();
        let user = self.session.as_ref().map(Session::user_id);
        let result = self.reconciler.reconcile(
            &mut self.storage,
            self.remote.as_deref(),
            user,
            &mut self.clock,
        );
        let result = result.and_then(|report| {
            let notes = self.storage.get_notes(None)?;
            self.snapshot.notes = notes;
            self.snapshot.search_term.clear();
            Ok(report)
        });
        self.finish(result)
    }

    /// Forget the session and wipe the local replica.
    pub fn logout(&mut self) -> Result<(), EngineError> {
        self.begin();
        let result = self.storage.clear_all().map_err(EngineError::from);
        if result.is_ok() {
            self.mirror("sign out", |remote| remote.sign_out());
            if let Some(file) = &self.session_file {
                if let Err(e) = file.clear() {
                    log::warn!("could not remove saved session: {e}");
                }
            }
            self.session = None;
            self.remote = None;
            self.snapshot.notes.clear();
            self.snapshot.search_term.clear();
            log::info!("logged out");
        }
        self.finish(result)
    }
}

fn user_message(err: &EngineError) -> String {
    match err {
        EngineError::Storage(StorageError::Validation(_)) => {
            "A note needs a title or some content.".to_string()
        }
        EngineError::Storage(StorageError::NotFound(_)) => {
            "That note no longer exists.".to_string()
        }
        EngineError::Storage(StorageError::DuplicateKey(_)) => {
            "A note with that id already exists.".to_string()
        }
        other => format!("Something went wrong: {other}"),
    }
}
