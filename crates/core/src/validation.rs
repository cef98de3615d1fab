use crate::CoreError;

/// A note needs a title or some content; whitespace alone counts as blank.
pub fn validate_note_body(title: &str, content: &str) -> Result<(), CoreError> {
    if title.trim().is_empty() && content.trim().is_empty() {
        return Err(CoreError::Validation(
            "title and content cannot both be blank".into(),
        ));
    }
    Ok(())
}

/// Trims tags, drops blank ones and duplicates, keeps first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || out.iter().any(|t| t == tag) {
            continue;
        }
        out.push(tag.to_string());
    }
    out
}
