use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::{
    http::Reply, wire, CouchError, DatabaseInfo, Document, DocumentRef, Result, RevisionEntry,
    RevisionOrder, ServerInfo,
};

/// Welcome marker carried by the root endpoint of a CouchDB server.
const WELCOME_MARKER: &str = "Welcome";

/// Unwraps a structured reply, rejecting anything carrying the error marker.
pub(crate) fn into_document(reply: Reply) -> Result<JsonValue> {
    match reply {
        Reply::Document(document) => check_error_marker(document),
        Reply::Failed(failure) => Err(failure.into()),
        Reply::Text(_) | Reply::Status(_) => Err(CouchError::Decode(
            "expected a structured document reply".to_owned(),
        )),
    }
}

/// Fails when `document.result == "error"`, whatever else it contains.
pub(crate) fn check_error_marker(document: JsonValue) -> Result<JsonValue> {
    if document.get("result").and_then(JsonValue::as_str) != Some("error") {
        return Ok(document);
    }

    let description = document
        .get("desc")
        .and_then(JsonValue::as_str)
        .unwrap_or("unknown error")
        .to_owned();

    match document
        .get("status")
        .and_then(JsonValue::as_u64)
        .and_then(|status| u16::try_from(status).ok())
    {
        Some(status) => Err(CouchError::Http {
            status,
            description,
        }),
        None => Err(CouchError::Server(description)),
    }
}

fn from_value<T: DeserializeOwned>(document: JsonValue, what: &str) -> Result<T> {
    serde_json::from_value(document)
        .map_err(|err| CouchError::Decode(format!("invalid {what} response: {err}")))
}

pub(crate) fn decode_server_info(document: JsonValue) -> Result<ServerInfo> {
    let welcome: wire::Welcome = from_value(document, "welcome")?;
    if welcome.couchdb.as_deref() != Some(WELCOME_MARKER) {
        return Err(CouchError::Decode(
            "root response does not carry the CouchDB welcome marker".to_owned(),
        ));
    }

    Ok(ServerInfo {
        version: welcome.version.unwrap_or_default(),
        vendor: welcome.vendor.and_then(|vendor| vendor.name),
        uuid: welcome.uuid,
    })
}

pub(crate) fn decode_database_info(document: JsonValue) -> Result<DatabaseInfo> {
    let info: wire::DatabaseInfo = from_value(document, "database info")?;
    let data_size_bytes = info
        .data_size
        .or_else(|| info.sizes.and_then(|sizes| sizes.external))
        .unwrap_or_default();

    Ok(DatabaseInfo {
        name: info.db_name,
        doc_count: info.doc_count,
        deleted_doc_count: info.doc_del_count,
        data_size_bytes,
        instance_start_time: info.instance_start_time.unwrap_or_default(),
    })
}

pub(crate) fn decode_database_names(document: JsonValue) -> Result<Vec<String>> {
    from_value(document, "database list")
}

pub(crate) fn decode_uuids(document: JsonValue) -> Result<Vec<String>> {
    let uuids: wire::Uuids = from_value(document, "uuids")?;
    Ok(uuids.uuids)
}

pub(crate) fn decode_document(document: JsonValue) -> Result<Document> {
    let field = |name: &str| {
        document
            .get(name)
            .and_then(JsonValue::as_str)
            .map(str::to_owned)
            .ok_or_else(|| CouchError::Decode(format!("document response is missing {name}")))
    };
    let id = field("_id")?;
    let rev = field("_rev")?;

    Ok(Document {
        id,
        rev,
        body: document,
    })
}

pub(crate) fn decode_document_list(document: JsonValue) -> Result<Vec<DocumentRef>> {
    let all_docs: wire::AllDocs = from_value(document, "_all_docs")?;
    Ok(all_docs
        .rows
        .into_iter()
        .map(|row| DocumentRef::new(row.id, row.value.rev))
        .collect())
}

pub(crate) fn decode_write(document: JsonValue) -> Result<DocumentRef> {
    let write: wire::WriteResponse = from_value(document, "write")?;
    Ok(DocumentRef {
        id: write.id,
        rev: write.rev,
        ok: write.ok,
    })
}

pub(crate) fn decode_revisions(
    mut document: JsonValue,
    order: RevisionOrder,
) -> Result<Vec<RevisionEntry>> {
    let revisions = document
        .get_mut("_revisions")
        .map(JsonValue::take)
        .ok_or_else(|| CouchError::Decode("document response is missing _revisions".to_owned()))?;
    let revisions: wire::Revisions = from_value(revisions, "_revisions")?;
    Ok(revision_history(revisions, order))
}

/// Turns the newest-first hash list into absolute generation numbers.
///
/// The entry at index `i` of an `n`-long list is assigned generation
/// `|n - i|`, independent of `start`.
pub(crate) fn revision_history(
    revisions: wire::Revisions,
    order: RevisionOrder,
) -> Vec<RevisionEntry> {
    let count = revisions.ids.len();
    if revisions.start != count as u64 {
        tracing::warn!(
            "revision history starts at generation {} but lists {} ids",
            revisions.start,
            count
        );
    }

    let mut entries = VecDeque::with_capacity(count);
    for (index, hash) in revisions.ids.into_iter().enumerate() {
        let entry = RevisionEntry {
            generation: count.abs_diff(index) as u64,
            hash,
        };
        match order {
            RevisionOrder::Ascending => entries.push_front(entry),
            RevisionOrder::Descending => entries.push_back(entry),
        }
    }
    entries.into()
}
