use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension};

use ideaflash_core::{
    FlashClock, FlashId, LocalId, NewNote, Note, NotePatch, OwnerToken,
    clock::{self, Timestamp},
    note::{decode_tags, encode_tags},
    validation::normalize_tags,
};

use crate::error::StorageError;
use crate::traits::NoteStore;

const NOTE_COLUMNS: &str =
    "local_id, flash_id, title, content, tags, url, created_at, updated_at";

pub struct SqliteNoteStore {
    conn: Connection,
    path: Option<PathBuf>,
    clock: FlashClock,
}

impl SqliteNoteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        log::debug!("opened note store at {}", path.display());
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            clock: FlashClock::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn,
            path: None,
            clock: FlashClock::new(),
        })
    }

    /// `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<i32, StorageError> {
        crate::schema::schema_version(&self.conn)
    }
}

/// Column values exactly as stored, converted outside rusqlite's row closure so
/// decoding failures keep their own error variants.
struct NoteRow {
    local_id: String,
    flash_id: String,
    title: String,
    content: String,
    tags: Option<Vec<u8>>,
    url: Option<String>,
    created_at: String,
    updated_at: String,
}

impl NoteRow {
    fn read(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            local_id: row.get(0)?,
            flash_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            tags: row.get(4)?,
            url: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_note(self) -> Result<Note, StorageError> {
        let tags = match self.tags {
            Some(bytes) if !bytes.is_empty() => decode_tags(&bytes)?,
            _ => Vec::new(),
        };
        Ok(Note {
            local_id: LocalId::from_string(self.local_id),
            flash_id: FlashId::parse(&self.flash_id)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            title: self.title,
            content: self.content,
            tags,
            url: self.url,
            created_at: clock::parse_timestamp(&self.created_at)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
            updated_at: clock::parse_timestamp(&self.updated_at)
                .map_err(|e| StorageError::Serialization(e.to_string()))?,
        })
    }
}

fn select_one(
    conn: &Connection,
    where_clause: &str,
    key: &str,
) -> Result<Option<Note>, StorageError> {
    let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE {where_clause} = ?1");
    let row = conn
        .query_row(&sql, rusqlite::params![key], NoteRow::read)
        .optional()?;
    row.map(NoteRow::into_note).transpose()
}

/// Fill in generated fields. The flash id defaults to the anonymous owner;
/// callers that know the user mint their own.
fn complete(note: NewNote, flash_clock: &mut FlashClock) -> Result<Note, StorageError> {
    note.validate()?;
    let created_at = match note.created_at {
        Some(ts) => ts,
        None => clock::now()?,
    };
    // updated_at never precedes created_at
    let updated_at: Timestamp = note.updated_at.unwrap_or(created_at).max(created_at);
    let flash_id = note
        .flash_id
        .unwrap_or_else(|| FlashId::mint(flash_clock.tick(), &OwnerToken::Anonymous));
    Ok(Note {
        local_id: note.local_id.unwrap_or_else(LocalId::generate),
        flash_id,
        title: note.title,
        content: note.content,
        tags: normalize_tags(&note.tags),
        url: note.url,
        created_at,
        updated_at,
    })
}

fn insert_note(
    tx: &rusqlite::Transaction,
    flash_clock: &mut FlashClock,
    note: NewNote,
) -> Result<Note, StorageError> {
    let note = complete(note, flash_clock)?;
    let tags = if note.tags.is_empty() {
        None
    } else {
        Some(encode_tags(&note.tags)?)
    };
    let result = tx.execute(
        "INSERT INTO notes (local_id, flash_id, title, content, tags, url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            note.local_id.as_str(),
            note.flash_id.as_str(),
            note.title,
            note.content,
            tags,
            note.url,
            clock::format_timestamp(&note.created_at),
            clock::format_timestamp(&note.updated_at),
        ],
    );
    match result {
        Ok(_) => Ok(note),
        Err(rusqlite::Error::SqliteFailure(err, msg))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let key = match msg.as_deref() {
                Some(m) if m.contains("flash_id") => format!("flash_id {}", note.flash_id),
                Some(m) if m.contains("local_id") => format!("local_id {}", note.local_id),
                _ => format!("local_id {} / flash_id {}", note.local_id, note.flash_id),
            };
            Err(StorageError::DuplicateKey(key))
        }
        Err(e) => Err(StorageError::Transaction(e)),
    }
}

impl NoteStore for SqliteNoteStore {
    fn add(&mut self, note: NewNote) -> Result<Note, StorageError> {
        let tx = self.conn.transaction()?;
        let stored = insert_note(&tx, &mut self.clock, note)?;
        tx.commit()?;
        Ok(stored)
    }

    fn update(&mut self, local_id: &LocalId, patch: &NotePatch) -> Result<Note, StorageError> {
        let tx = self.conn.transaction()?;
        let existing = select_one(&tx, "local_id", local_id.as_str())?
            .ok_or_else(|| StorageError::NotFound(local_id.to_string()))?;

        let mut merged = patch.apply_to(&existing);
        merged.validate()?;
        merged.updated_at = clock::next_after(&existing.updated_at.max(existing.created_at))?;

        let tags = if merged.tags.is_empty() {
            None
        } else {
            Some(encode_tags(&merged.tags)?)
        };
        tx.execute(
            "UPDATE notes SET title = ?1, content = ?2, tags = ?3, url = ?4, updated_at = ?5
             WHERE local_id = ?6",
            rusqlite::params![
                merged.title,
                merged.content,
                tags,
                merged.url,
                clock::format_timestamp(&merged.updated_at),
                local_id.as_str(),
            ],
        )?;
        tx.commit()?;
        Ok(merged)
    }

    fn delete(&mut self, local_id: &LocalId) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM notes WHERE local_id = ?1",
            rusqlite::params![local_id.as_str()],
        )?;
        tx.commit()?;
        if removed == 0 {
            return Err(StorageError::NotFound(local_id.to_string()));
        }
        Ok(())
    }

    fn get(&self, local_id: &LocalId) -> Result<Option<Note>, StorageError> {
        select_one(&self.conn, "local_id", local_id.as_str())
    }

    fn get_by_flash_id(&self, flash_id: &FlashId) -> Result<Option<Note>, StorageError> {
        select_one(&self.conn, "flash_id", flash_id.as_str())
    }

    fn list(&self, limit: Option<usize>) -> Result<Vec<Note>, StorageError> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes ORDER BY created_at DESC, rowid DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![limit], NoteRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(NoteRow::into_note).collect()
    }

    fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn clear_all(&mut self) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM notes", [])?;
        tx.commit()?;
        Ok(())
    }

    fn replace_all(&mut self, notes: Vec<NewNote>) -> Result<Vec<Note>, StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM notes", [])?;
        let mut stored = Vec::with_capacity(notes.len());
        for note in notes {
            stored.push(insert_note(&tx, &mut self.clock, note)?);
        }
        tx.commit()?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ideaflash_core::clock::from_millis;

    fn at(ms: i64) -> Timestamp {
        from_millis(ms).unwrap()
    }

    #[test]
    fn add_fills_generated_fields() {
        let mut store = SqliteNoteStore::open_in_memory().unwrap();
        let note = store.add(NewNote::new("", "idea")).unwrap();
        assert!(note.flash_id.is_anonymous());
        assert_eq!(note.created_at, note.updated_at);
        assert_eq!(store.get(&note.local_id).unwrap(), Some(note));
    }

    #[test]
    fn blank_note_rejected() {
        let mut store = SqliteNoteStore::open_in_memory().unwrap();
        let err = store.add(NewNote::new("  ", "\n")).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)), "got {err:?}");
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn duplicate_local_id_rejected() {
        let mut store = SqliteNoteStore::open_in_memory().unwrap();
        let first = store.add(NewNote::new("a", "")).unwrap();
        let err = store
            .add(NewNote::new("b", "").with_local_id(first.local_id.clone()))
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)), "got {err:?}");
    }

    #[test]
    fn duplicate_flash_id_rejected() {
        let mut store = SqliteNoteStore::open_in_memory().unwrap();
        let flash = FlashId::parse("1_u1").unwrap();
        store.add(NewNote::new("a", "").with_flash_id(flash.clone())).unwrap();
        let err = store
            .add(NewNote::new("b", "").with_flash_id(flash))
            .unwrap_err();
        match err {
            StorageError::DuplicateKey(key) => assert!(key.contains("flash_id"), "{key}"),
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn updated_at_clamped_to_created_at() {
        let mut store = SqliteNoteStore::open_in_memory().unwrap();
        let note = store
            .add(
                NewNote::new("t", "")
                    .with_created_at(at(2_000))
                    .with_updated_at(at(1_000)),
            )
            .unwrap();
        assert_eq!(note.updated_at, at(2_000));
    }

    #[test]
    fn list_limit_zero_is_empty() {
        let mut store = SqliteNoteStore::open_in_memory().unwrap();
        store.add(NewNote::new("t", "")).unwrap();
        assert!(store.list(Some(0)).unwrap().is_empty());
    }

    #[test]
    fn replace_all_is_atomic() {
        let mut store = SqliteNoteStore::open_in_memory().unwrap();
        store.add(NewNote::new("keep me", "")).unwrap();
        let dup = FlashId::parse("7_u1").unwrap();
        let result = store.replace_all(vec![
            NewNote::new("a", "").with_flash_id(dup.clone()),
            NewNote::new("b", "").with_flash_id(dup),
        ]);
        assert!(matches!(result, Err(StorageError::DuplicateKey(_))));
        let notes = store.list(None).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "keep me");
    }

    #[test]
    fn schema_version_recorded() {
        let store = SqliteNoteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), crate::schema::SCHEMA_VERSION);
    }
}
