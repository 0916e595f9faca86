//! Payload transformations for PUT runs

use almapipo_common::types::RecordId;

use crate::xml;

/// Produces the payload to send from the fetched one.
///
/// Returning `None`, an empty payload or the unchanged input marks the PUT
/// as failed; nothing is sent in that case.
pub trait Transform: Send + Sync {
    fn apply(&self, record_id: &RecordId, payload: &str) -> Option<String>;
}

impl<F> Transform for F
where
    F: Fn(&RecordId, &str) -> Option<String> + Send + Sync,
{
    fn apply(&self, record_id: &RecordId, payload: &str) -> Option<String> {
        self(record_id, payload)
    }
}

/// One edit on the direct children of the record's root element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEdit {
    RemoveElement(String),
    ReplaceText { tag: String, value: String },
}

impl XmlEdit {
    /// Parse a `TAG=VALUE` replacement
    pub fn parse_replacement(s: &str) -> Result<Self, String> {
        match s.split_once('=') {
            Some((tag, value)) if !tag.trim().is_empty() => Ok(XmlEdit::ReplaceText {
                tag: tag.trim().to_string(),
                value: value.to_string(),
            }),
            _ => Err(format!("expected TAG=VALUE, got '{s}'")),
        }
    }

    fn apply(&self, payload: &str) -> Option<String> {
        match self {
            XmlEdit::RemoveElement(tag) => xml::remove_element(payload, tag),
            XmlEdit::ReplaceText { tag, value } => xml::replace_text(payload, tag, value),
        }
    }
}

/// Edits applied in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlEdits(Vec<XmlEdit>);

impl XmlEdits {
    pub fn new(edits: Vec<XmlEdit>) -> Self {
        Self(edits)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Transform for XmlEdits {
    fn apply(&self, _record_id: &RecordId, payload: &str) -> Option<String> {
        self.0
            .iter()
            .try_fold(payload.to_string(), |current, edit| edit.apply(&current))
    }
}
