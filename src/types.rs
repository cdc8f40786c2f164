use std::fmt;

use serde_json::Value as JsonValue;

/// Identifies a document and its last-known revision token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: String,
    pub rev: String,
    /// Whether the operation that produced this reference succeeded.
    pub ok: bool,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: rev.into(),
            ok: true,
        }
    }

    /// Generation number parsed from the `"<generation>-<hash>"` token.
    pub fn generation(&self) -> Option<u64> {
        revision_generation(&self.rev)
    }
}

/// A document body as of one specific revision.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub rev: String,
    pub body: JsonValue,
}

impl Document {
    pub fn reference(&self) -> DocumentRef {
        DocumentRef::new(self.id.clone(), self.rev.clone())
    }

    /// Names of the attachments stored on this revision.
    pub fn attachment_names(&self) -> Vec<String> {
        self.body
            .get("_attachments")
            .and_then(JsonValue::as_object)
            .map(|attachments| attachments.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Summary of a database as reported by `GET /{db}`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub doc_count: u64,
    pub deleted_doc_count: u64,
    pub data_size_bytes: u64,
    pub instance_start_time: String,
}

/// Named binary blob stored on a document revision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub body: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            body: body.into(),
        }
    }
}

/// One ancestor revision of a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionEntry {
    pub generation: u64,
    pub hash: String,
}

impl RevisionEntry {
    /// Reassembles the `"<generation>-<hash>"` revision token.
    pub fn token(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RevisionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.hash)
    }
}

/// Ordering of a decoded revision history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RevisionOrder {
    /// Oldest revision first.
    #[default]
    Ascending,
    /// Newest revision first.
    Descending,
}

/// Welcome payload returned by `GET /`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub version: String,
    pub vendor: Option<String>,
    pub uuid: Option<String>,
}

pub(crate) fn revision_generation(rev: &str) -> Option<u64> {
    rev.split_once('-')?.0.parse().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{Document, DocumentRef, RevisionEntry};

    #[test]
    fn generation_parsed_from_token() {
        assert_eq!(DocumentRef::new("a", "12-abc").generation(), Some(12));
        assert_eq!(DocumentRef::new("a", "").generation(), None);
        assert_eq!(DocumentRef::new("a", "x-abc").generation(), None);
    }

    #[test]
    fn revision_entry_token_roundtrips_format() {
        let entry = RevisionEntry {
            generation: 2,
            hash: "b85a6cbb064d3e0927b6bfe718321f5d".to_owned(),
        };
        assert_eq!(entry.token(), "2-b85a6cbb064d3e0927b6bfe718321f5d");
    }

    #[test]
    fn attachment_names_from_body() {
        let document = Document {
            id: "doc".to_owned(),
            rev: "3-x".to_owned(),
            body: json!({
                "_id": "doc",
                "_attachments": {
                    "a.txt": { "content_type": "text/plain" },
                    "b.png": { "content_type": "image/png" }
                }
            }),
        };
        assert_eq!(document.attachment_names(), vec!["a.txt", "b.png"]);
        assert_eq!(document.reference(), DocumentRef::new("doc", "3-x"));
    }

    #[test]
    fn attachment_names_empty_without_map() {
        let document = Document {
            id: "doc".to_owned(),
            rev: "1-x".to_owned(),
            body: json!({ "_id": "doc" }),
        };
        assert!(document.attachment_names().is_empty());
    }
}
