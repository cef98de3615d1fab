use std::path::PathBuf;

use ideaflash_core::{FlashId, LocalId, NewNote, Note, NotePatch, validation::validate_note_body};

use crate::error::StorageError;
use crate::sqlite::SqliteNoteStore;
use crate::traits::NoteStore;

/// Where the facade opens its database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Flat note API over a lazily opened [`SqliteNoteStore`].
///
/// The database is opened on first use and the same handle serves every call
/// after that. Writes are validated here as well as in the store.
pub struct NoteStorage {
    location: StoreLocation,
    store: Option<SqliteNoteStore>,
}

impl NoteStorage {
    pub fn new(location: StoreLocation) -> Self {
        Self {
            location,
            store: None,
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::new(StoreLocation::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::new(StoreLocation::Memory)
    }

    /// Wrap an already opened store.
    pub fn from_store(store: SqliteNoteStore) -> Self {
        let location = match store.path() {
            Some(path) => StoreLocation::File(path.to_path_buf()),
            None => StoreLocation::Memory,
        };
        Self {
            location,
            store: Some(store),
        }
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    /// Open the database if needed. Repeated calls return the same handle.
    pub fn initialize(&mut self) -> Result<&mut SqliteNoteStore, StorageError> {
        let store = match self.store.take() {
            Some(store) => store,
            None => match &self.location {
                StoreLocation::File(path) => SqliteNoteStore::open(path)?,
                StoreLocation::Memory => SqliteNoteStore::open_in_memory()?,
            },
        };
        Ok(self.store.insert(store))
    }

    pub fn add_note(&mut self, note: NewNote) -> Result<Note, StorageError> {
        validate_note_body(&note.title, &note.content)?;
        self.initialize()?.add(note)
    }

    pub fn update_note(
        &mut self,
        local_id: &LocalId,
        patch: &NotePatch,
    ) -> Result<Note, StorageError> {
        // only decidable here when both fields are supplied; the store checks the merged note
        if let (Some(title), Some(content)) = (&patch.title, &patch.content) {
            validate_note_body(title, content)?;
        }
        self.initialize()?.update(local_id, patch)
    }

    pub fn delete_note(&mut self, local_id: &LocalId) -> Result<(), StorageError> {
        self.initialize()?.delete(local_id)
    }

    pub fn get_notes(&mut self, limit: Option<usize>) -> Result<Vec<Note>, StorageError> {
        self.initialize()?.list(limit)
    }

    pub fn get_note(&mut self, local_id: &LocalId) -> Result<Option<Note>, StorageError> {
        self.initialize()?.get(local_id)
    }

    pub fn find_by_flash_id(&mut self, flash_id: &FlashId) -> Result<Option<Note>, StorageError> {
        self.initialize()?.get_by_flash_id(flash_id)
    }

    pub fn count(&mut self) -> Result<u64, StorageError> {
        self.initialize()?.count()
    }

    pub fn clear_all(&mut self) -> Result<(), StorageError> {
        self.initialize()?.clear_all()
    }

    pub fn replace_all(&mut self, notes: Vec<NewNote>) -> Result<Vec<Note>, StorageError> {
        for note in &notes {
            validate_note_body(&note.title, &note.content)?;
        }
        self.initialize()?.replace_all(notes)
    }
}
