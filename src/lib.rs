//! `couchdb-http` is a blocking HTTP client for CouchDB.
//!
//! Two layers:
//! - [`HttpAdapter`] performs one synchronous round trip per call and
//!   reports the outcome as a tagged [`Reply`].
//! - [`CouchDbClient`] speaks CouchDB's REST conventions on top of it:
//!   database lifecycle, MVCC document writes, revision history and
//!   attachments.
//!
//! ```no_run
//! use couchdb_http::{CouchDbClient, HttpAdapter, RevisionOrder};
//! use serde_json::json;
//!
//! # fn main() -> couchdb_http::Result<()> {
//! let http = HttpAdapter::new()?;
//! let db = CouchDbClient::with_url(&http, "http://localhost:5984");
//!
//! db.create_database("albums")?;
//! let doc = db.add_document("albums", &json!({ "title": "Blue Train" }))?;
//! let doc = db.update_document_ref("albums", &doc, &json!({ "title": "Blue Train", "year": 1957 }))?;
//! let history = db.revision_history("albums", &doc.id, RevisionOrder::Descending)?;
//! assert_eq!(history[0].token(), doc.rev);
//! # Ok(())
//! # }
//! ```

mod client;
mod decode;
mod error;
mod http;
mod mime;
mod options;
mod types;
mod wire;

pub use client::{CouchDbClient, DEFAULT_URL};
pub use error::CouchError;
pub use http::{Header, HttpAdapter, Reply, ResponseMode, TransportFailure, JSON_CONTENT_TYPE};
pub use mime::sniff_mime_type;
pub use options::ClientOptions;
pub use types::{
    Attachment, DatabaseInfo, Document, DocumentRef, RevisionEntry, RevisionOrder, ServerInfo,
};

pub type Result<T> = std::result::Result<T, CouchError>;
