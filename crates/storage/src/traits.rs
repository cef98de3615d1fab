use ideaflash_core::{FlashId, LocalId, NewNote, Note, NotePatch};

use crate::error::StorageError;

/// Transactional CRUD over the single note collection.
pub trait NoteStore {
    /// Validates, fills in missing ids/timestamps and inserts.
    fn add(&mut self, note: NewNote) -> Result<Note, StorageError>;

    /// Merges `patch` over the stored note and stamps a newer `updated_at`.
    fn update(&mut self, local_id: &LocalId, patch: &NotePatch) -> Result<Note, StorageError>;

    /// `NotFound` when nothing was deleted; callers may ignore it.
    fn delete(&mut self, local_id: &LocalId) -> Result<(), StorageError>;

    fn get(&self, local_id: &LocalId) -> Result<Option<Note>, StorageError>;

    fn get_by_flash_id(&self, flash_id: &FlashId) -> Result<Option<Note>, StorageError>;

    /// Newest `created_at` first, at most `limit` notes.
    fn list(&self, limit: Option<usize>) -> Result<Vec<Note>, StorageError>;

    fn count(&self) -> Result<u64, StorageError>;

    fn clear_all(&mut self) -> Result<(), StorageError>;

    /// Clears the collection and inserts `notes`, all in one transaction.
    fn replace_all(&mut self, notes: Vec<NewNote>) -> Result<Vec<Note>, StorageError>;
}
