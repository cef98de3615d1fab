use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::ids::{FlashId, LocalId};
use crate::validation::{normalize_tags, validate_note_body};
use crate::CoreError;

/// Longest fallback title derived from content.
pub const DERIVED_TITLE_MAX_CHARS: usize = 50;

/// A persisted note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub local_id: LocalId,
    pub flash_id: FlashId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Note {
    /// The title, or the first non-blank line of content when the title is blank.
    pub fn display_title(&self) -> String {
        let title = self.title.trim();
        if !title.is_empty() {
            return title.to_string();
        }
        let first_line = self
            .content
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        first_line.chars().take(DERIVED_TITLE_MAX_CHARS).collect()
    }

    /// Case-insensitive substring match over title and content.
    pub fn matches(&self, term: &str) -> bool {
        let needle = term.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.content.to_lowercase().contains(&needle)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag.trim()))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_note_body(&self.title, &self.content)
    }
}

/// Input for inserting a note. Fields left as `None` are generated on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNote {
    pub local_id: Option<LocalId>,
    pub flash_id: Option<FlashId>,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub url: Option<String>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl NewNote {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_flash_id(mut self, flash_id: FlashId) -> Self {
        self.flash_id = Some(flash_id);
        self
    }

    pub fn with_local_id(mut self, local_id: LocalId) -> Self {
        self.local_id = Some(local_id);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_updated_at(mut self, updated_at: Timestamp) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_note_body(&self.title, &self.content)
    }
}

impl From<&Note> for NewNote {
    fn from(note: &Note) -> Self {
        Self {
            local_id: Some(note.local_id.clone()),
            flash_id: Some(note.flash_id.clone()),
            title: note.title.clone(),
            content: note.content.clone(),
            tags: note.tags.clone(),
            url: note.url.clone(),
            created_at: Some(note.created_at),
            updated_at: Some(note.updated_at),
        }
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    /// `Some(None)` clears the url.
    pub url: Option<Option<String>>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = Some(normalize_tags(tags));
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = Some(url);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.tags.is_none() && self.url.is_none()
    }

    /// Overlay this patch on `note`. Timestamps are left for the caller to stamp.
    pub fn apply_to(&self, note: &Note) -> Note {
        let mut merged = note.clone();
        if let Some(title) = &self.title {
            merged.title = title.clone();
        }
        if let Some(content) = &self.content {
            merged.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            merged.tags = normalize_tags(tags);
        }
        if let Some(url) = &self.url {
            merged.url = url.clone();
        }
        merged
    }
}

pub fn encode_tags(tags: &[String]) -> Result<Vec<u8>, CoreError> {
    rmp_serde::to_vec(tags).map_err(|e| CoreError::Serialization(e.to_string()))
}

pub fn decode_tags(bytes: &[u8]) -> Result<Vec<String>, CoreError> {
    rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::from_millis;

    fn sample() -> Note {
        let ts = from_millis(1_700_000_000_000).unwrap();
        Note {
            local_id: LocalId::from_string("local-1"),
            flash_id: FlashId::parse("1700000000000_anonymous").unwrap(),
            title: String::new(),
            content: "\n  buy milk  \nand eggs".into(),
            tags: vec!["errands".into()],
            url: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn display_title_falls_back_to_first_line() {
        let mut note = sample();
        assert_eq!(note.display_title(), "buy milk");
        note.title = "Shopping".into();
        assert_eq!(note.display_title(), "Shopping");
    }

    #[test]
    fn derived_title_is_truncated() {
        let mut note = sample();
        note.content = "x".repeat(DERIVED_TITLE_MAX_CHARS * 2);
        assert_eq!(note.display_title().chars().count(), DERIVED_TITLE_MAX_CHARS);
    }

    #[test]
    fn matches_is_case_insensitive() {
        let note = sample();
        assert!(note.matches("MILK"));
        assert!(note.matches("and e"));
        assert!(!note.matches("bread"));
    }

    #[test]
    fn patch_preserves_unspecified_fields() {
        let note = sample();
        let patched = NotePatch::content("x").apply_to(&note);
        assert_eq!(patched.content, "x");
        assert_eq!(patched.title, note.title);
        assert_eq!(patched.tags, note.tags);
        assert_eq!(patched.updated_at, note.updated_at);
    }

    #[test]
    fn patch_can_clear_url() {
        let mut note = sample();
        note.url = Some("https://example.com".into());
        let patched = NotePatch::default().with_url(None).apply_to(&note);
        assert_eq!(patched.url, None);
    }

    #[test]
    fn tags_blob_roundtrip() {
        let tags = vec!["a".to_string(), "b".to_string()];
        let bytes = encode_tags(&tags).unwrap();
        assert_eq!(decode_tags(&bytes).unwrap(), tags);
    }

    #[test]
    fn missing_optional_fields_deserialize_as_empty() {
        let json = r#"{
            "local_id": "l1",
            "flash_id": "5_anonymous",
            "title": "",
            "content": "c",
            "created_at": "2023-11-14T22:13:20.000Z",
            "updated_at": "2023-11-14T22:13:20.000Z"
        }"#;
        let note: Note = serde_json::from_str(json).unwrap();
        assert!(note.tags.is_empty());
        assert!(note.url.is_none());
    }
}
