//! Contract for the remote note service.
//!
//! Remote notes are keyed by their flash id, never by the local primary key.
//! Every call may fail; callers treat failures as "not synced this time".

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use ideaflash_core::{FlashId, NewNote, Note, Timestamp, clock, validation::validate_note_body};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("not authenticated")]
    Unauthenticated,
}

/// A note as the remote service returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    #[serde(rename = "idea_flash_id")]
    pub flash_id: FlashId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
}

/// Absent and `null` both decode as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl RemoteNote {
    pub fn is_blank(&self) -> bool {
        validate_note_body(&self.title, &self.content).is_err()
    }

    /// Local insert for this note. A missing `created_at` falls back to the
    /// timestamp embedded in the flash id.
    pub fn to_new_note(&self) -> NewNote {
        let created_at = self
            .created_at
            .or_else(|| clock::from_millis(self.flash_id.timestamp_ms()).ok());
        let mut note = NewNote::new(self.title.clone(), self.content.clone())
            .with_flash_id(self.flash_id.clone())
            .with_tags(&self.tags);
        note.url = self.url.clone();
        note.created_at = created_at;
        note.updated_at = self.updated_at;
        note
    }
}

/// Body of `POST /posts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDraft {
    pub title: String,
    pub content: String,
    #[serde(rename = "idea_flash_id")]
    pub flash_id: FlashId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RemoteDraft {
    /// Draft pushing `note` under `flash_id`, which may differ from the note's own.
    pub fn from_note(note: &Note, flash_id: FlashId) -> Self {
        Self {
            title: note.title.clone(),
            content: note.content.clone(),
            flash_id,
            tags: note.tags.clone(),
            url: note.url.clone(),
        }
    }
}

/// Body of `PUT /posts/:idea_flash_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUpdate {
    pub title: String,
    pub content: String,
}

impl From<&Note> for RemoteUpdate {
    fn from(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            content: note.content.clone(),
        }
    }
}

pub trait RemoteNotes {
    fn create_note(&self, draft: &RemoteDraft) -> Result<RemoteNote, RemoteError>;

    fn list_notes(&self) -> Result<Vec<RemoteNote>, RemoteError>;

    fn update_note(
        &self,
        flash_id: &FlashId,
        update: &RemoteUpdate,
    ) -> Result<RemoteNote, RemoteError>;

    fn delete_note(&self, flash_id: &FlashId) -> Result<(), RemoteError>;

    /// Ends the server-side session. Remotes without one have nothing to do.
    fn sign_out(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_uses_wire_field_names() {
        let draft = RemoteDraft {
            title: "t".into(),
            content: "c".into(),
            flash_id: FlashId::parse("1700000000000_u1").unwrap(),
            tags: Vec::new(),
            url: None,
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "title": "t",
                "content": "c",
                "idea_flash_id": "1700000000000_u1",
            })
        );
    }

    #[test]
    fn remote_note_tolerates_missing_fields() {
        let note: RemoteNote = serde_json::from_str(
            r#"{"id": 12, "idea_flash_id": "1700000000000_u1", "content": "hello"}"#,
        )
        .unwrap();
        assert_eq!(note.title, "");
        assert!(note.tags.is_empty());
        assert!(note.created_at.is_none());

        let local = note.to_new_note();
        assert_eq!(
            local.created_at.map(|ts| ts.timestamp_millis()),
            Some(1_700_000_000_000)
        );
        assert_eq!(local.flash_id, Some(note.flash_id.clone()));
    }

    #[test]
    fn listing_with_null_fields_decodes() {
        let notes: Vec<RemoteNote> = serde_json::from_str(
            r#"[
                {"idea_flash_id": "1700000000000_u1", "title": null, "content": "ok",
                 "tags": null, "url": null, "created_at": null},
                {"idea_flash_id": "1700000000001_u1", "title": "t", "content": null}
            ]"#,
        )
        .unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].title, "");
        assert_eq!(notes[0].content, "ok");
        assert!(notes[0].tags.is_empty());
        assert_eq!(notes[1].title, "t");
        assert_eq!(notes[1].content, "");
        assert!(!notes[1].is_blank());
    }

    #[test]
    fn remote_note_rejects_malformed_flash_id() {
        let parsed = serde_json::from_str::<RemoteNote>(
            r#"{"idea_flash_id": "not-a-flash-id", "content": "x"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn blank_remote_note_detected() {
        let note: RemoteNote =
            serde_json::from_str(r#"{"idea_flash_id": "1_u", "title": " ", "content": ""}"#)
                .unwrap();
        assert!(note.is_blank());
    }
}
