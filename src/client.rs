use std::{fmt, fs, path::Path};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value as JsonValue;

use crate::{
    decode::{
        decode_database_info, decode_database_names, decode_document, decode_document_list,
        decode_revisions, decode_server_info, decode_uuids, decode_write, into_document,
    },
    http::{Header, HttpAdapter, ResponseMode, JSON_CONTENT_TYPE},
    mime::sniff_mime_type,
    Attachment, CouchError, DatabaseInfo, Document, DocumentRef, Result, RevisionEntry,
    RevisionOrder, ServerInfo,
};

/// Server URL used when none is given.
pub const DEFAULT_URL: &str = "http://localhost:5984";

#[derive(Clone)]
/// CouchDB connection bound to one server endpoint.
///
/// URL segments (database names, document ids, attachment names) are inserted
/// verbatim; escaping them is the caller's responsibility.
pub struct CouchDbClient<'a> {
    http: &'a HttpAdapter,
    base_url: String,
    headers: Vec<Header>,
}

impl fmt::Debug for CouchDbClient<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|header| {
                if header.is(AUTHORIZATION.as_str()) {
                    (header.key.as_str(), "<redacted>")
                } else {
                    (header.key.as_str(), header.value.as_str())
                }
            })
            .collect();

        f.debug_struct("CouchDbClient")
            .field("base_url", &self.base_url)
            .field("headers", &headers)
            .finish()
    }
}

impl<'a> CouchDbClient<'a> {
    /// Creates a client for [`DEFAULT_URL`].
    pub fn new(http: &'a HttpAdapter) -> Self {
        Self::with_url(http, DEFAULT_URL)
    }

    /// Creates a client for the server at `url`, e.g. `http://db.local:5984`.
    pub fn with_url(http: &'a HttpAdapter, url: impl AsRef<str>) -> Self {
        Self {
            http,
            base_url: url.as_ref().trim().trim_end_matches('/').to_owned(),
            headers: vec![Header::content_type(JSON_CONTENT_TYPE)],
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `COUCHDB_URL`: server URL (required)
    /// - `COUCHDB_USER` / `COUCHDB_PASSWORD`: basic auth credentials (optional,
    ///   both must be set)
    pub fn from_env(http: &'a HttpAdapter) -> std::result::Result<Self, String> {
        let url = std::env::var("COUCHDB_URL")
            .map_err(|_| "missing COUCHDB_URL environment variable".to_owned())?;
        if url.trim().is_empty() {
            return Err("COUCHDB_URL is set but empty".to_owned());
        }

        let client = Self::with_url(http, url);
        match (std::env::var("COUCHDB_USER"), std::env::var("COUCHDB_PASSWORD")) {
            (Ok(user), Ok(password)) => Ok(client.with_basic_auth(user, password)),
            (Err(_), Err(_)) => Ok(client),
            _ => Err("COUCHDB_USER and COUCHDB_PASSWORD must be set together".to_owned()),
        }
    }

    /// Returns a copy whose default headers include `key: value`, replacing
    /// any existing header with the same key.
    pub fn with_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let header = Header::new(key, value);
        let mut headers: Vec<Header> = self
            .headers
            .iter()
            .filter(|existing| !existing.is(&header.key))
            .cloned()
            .collect();
        headers.push(header);

        Self {
            http: self.http,
            base_url: self.base_url.clone(),
            headers,
        }
    }

    /// Returns a copy that authenticates with HTTP basic auth.
    pub fn with_basic_auth(&self, user: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let credentials = STANDARD.encode(format!("{}:{}", user.as_ref(), password.as_ref()));
        self.with_header(AUTHORIZATION.as_str(), format!("Basic {credentials}"))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Returns `true` when the endpoint answers with the CouchDB welcome
    /// payload. Never fails.
    pub fn is_active(&self) -> bool {
        match self.server_info() {
            Ok(info) => {
                tracing::debug!(
                    "CouchDB {} ({}) is active, server uuid {}",
                    info.version,
                    info.vendor.as_deref().unwrap_or("unknown vendor"),
                    info.uuid.as_deref().unwrap_or("-")
                );
                true
            }
            Err(err) => {
                tracing::debug!("{} is not an active CouchDB server: {err}", self.base_url);
                false
            }
        }
    }

    pub fn server_info(&self) -> Result<ServerInfo> {
        let document = self.get_json(&format!("{}/", self.base_url))?;
        decode_server_info(document)
    }

    /// Runs a GET against `path` relative to the server and returns the JSON
    /// reply untouched. `path` is not escaped.
    pub fn raw_query(&self, path: &str) -> Result<JsonValue> {
        self.get_json(&self.url(path.trim_start_matches('/')))
    }

    /// Generates one server-side UUID.
    pub fn uuid(&self) -> Result<String> {
        self.uuids(1)?
            .into_iter()
            .next()
            .ok_or_else(|| CouchError::Decode("server returned no uuids".to_owned()))
    }

    /// Generates `count` server-side UUIDs.
    pub fn uuids(&self, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Err(CouchError::InvalidArgument(
                "uuid count must be at least 1".to_owned(),
            ));
        }
        let document = self.get_json(&self.url(&format!("_uuids?count={count}")))?;
        decode_uuids(document)
    }

    pub fn create_database(&self, name: &str) -> Result<()> {
        require_non_empty(name, "database name")?;
        into_document(self.http.custom(
            &self.url(name),
            &self.headers,
            "PUT",
            ResponseMode::Document,
        ))
        .map_err(|err| {
            tracing::warn!("problem creating database '{name}': {err}");
            err
        })?;
        Ok(())
    }

    /// Deletes the database and every document in it.
    pub fn remove_database(&self, name: &str) -> Result<()> {
        require_non_empty(name, "database name")?;
        into_document(
            self.http
                .delete(&self.url(name), &self.headers, ResponseMode::Document),
        )
        .map_err(|err| {
            tracing::warn!("problem removing database '{name}': {err}");
            err
        })?;
        Ok(())
    }

    pub fn database_info(&self, name: &str) -> Result<DatabaseInfo> {
        decode_database_info(self.database_info_raw(name)?)
    }

    /// Database information as the untyped JSON object sent by the server.
    pub fn database_info_raw(&self, name: &str) -> Result<JsonValue> {
        require_non_empty(name, "database name")?;
        self.get_json(&self.url(name))
    }

    /// Names of all databases, in server order.
    pub fn all_databases(&self) -> Result<Vec<String>> {
        let document = self.get_json(&self.url("_all_dbs"))?;
        decode_database_names(document)
    }

    /// Fetches the latest revision of a document.
    pub fn get_document(&self, database: &str, id: &str) -> Result<Document> {
        let document = self.get_json(&self.document_url(database, id)?)?;
        decode_document(document)
    }

    /// Fetches a document as of revision `rev`.
    pub fn get_document_revision(&self, database: &str, id: &str, rev: &str) -> Result<Document> {
        let url = format!("{}?rev={rev}", self.document_url(database, id)?);
        decode_document(self.get_json(&url)?)
    }

    /// Lists every document with its current revision.
    pub fn list_documents(&self, database: &str) -> Result<Vec<DocumentRef>> {
        require_non_empty(database, "database name")?;
        let document = self.get_json(&self.url(&format!("{database}/_all_docs")))?;
        decode_document_list(document)
    }

    /// Lists at most `limit` documents in id order, reversed when
    /// `descending` is set.
    pub fn list_documents_paged(
        &self,
        database: &str,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<DocumentRef>> {
        require_non_empty(database, "database name")?;
        let url = self.url(&format!(
            "{database}/_all_docs?limit={limit}&descending={descending}"
        ));
        decode_document_list(self.get_json(&url)?)
    }

    /// Returns every known revision of a document.
    ///
    /// See [`RevisionOrder`] for the ordering of the returned entries.
    pub fn revision_history(
        &self,
        database: &str,
        id: &str,
        order: RevisionOrder,
    ) -> Result<Vec<RevisionEntry>> {
        let url = format!("{}?revs=true", self.document_url(database, id)?);
        decode_revisions(self.get_json(&url)?, order)
    }

    /// Stores a new document. The server assigns an id unless `body`
    /// carries `_id`.
    pub fn add_document(&self, database: &str, body: &JsonValue) -> Result<DocumentRef> {
        require_non_empty(database, "database name")?;
        let reply = self.http.post(
            &self.url(database),
            &self.headers,
            body,
            ResponseMode::Document,
        );
        decode_write(into_document(reply)?)
    }

    /// Replaces the document body, resolving its current revision first.
    ///
    /// The revision read and the write are two separate round trips; a
    /// concurrent write in between surfaces as a conflict.
    pub fn update_document(&self, database: &str, id: &str, body: &JsonValue) -> Result<DocumentRef> {
        let current = self.get_document(database, id)?;
        self.update_document_ref(database, &current.reference(), body)
    }

    /// Replaces the document body using the revision held by `doc`.
    pub fn update_document_ref(
        &self,
        database: &str,
        doc: &DocumentRef,
        body: &JsonValue,
    ) -> Result<DocumentRef> {
        let url = self.revision_url(database, &doc.id, &doc.rev)?;
        let reply = self
            .http
            .put(&url, &self.headers, body, ResponseMode::Document);
        into_document(reply)
            .and_then(decode_write)
            .map_err(|err| log_failure("updating", &doc.id, err))
    }

    /// Deletes the latest revision of a document.
    pub fn remove_document(&self, database: &str, id: &str) -> Result<()> {
        let current = self.get_document(database, id)?;
        self.remove_document_ref(database, &current.reference())
    }

    pub fn remove_document_ref(&self, database: &str, doc: &DocumentRef) -> Result<()> {
        let url = self.revision_url(database, &doc.id, &doc.rev)?;
        into_document(
            self.http
                .delete(&url, &self.headers, ResponseMode::Document),
        )
        .map_err(|err| log_failure("removing", &doc.id, err))?;
        Ok(())
    }

    /// Names of the attachments on the latest revision of a document.
    pub fn list_attachments(&self, database: &str, id: &str) -> Result<Vec<String>> {
        Ok(self.get_document(database, id)?.attachment_names())
    }

    pub fn list_attachments_ref(&self, database: &str, doc: &DocumentRef) -> Result<Vec<String>> {
        self.list_attachments(database, &doc.id)
    }

    /// Uploads a local file as an attachment named after the file.
    ///
    /// The MIME type is sniffed from the file content. The document's current
    /// revision is resolved right before the upload, so a stale `doc.rev`
    /// does not cause a conflict.
    pub fn add_attachment_from_file(
        &self,
        database: &str,
        doc: &DocumentRef,
        path: impl AsRef<Path>,
    ) -> Result<DocumentRef> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CouchError::InvalidArgument(format!("{} has no file name", path.display()))
            })?;
        let body = fs::read(path).map_err(|err| {
            tracing::debug!("file {} is not readable: {err}", path.display());
            err
        })?;
        let attachment = Attachment::new(name, sniff_mime_type(&body), body);

        let current = self.get_document(database, &doc.id)?.reference();
        self.add_attachment(database, &current, &attachment)
    }

    /// Uploads `attachment` against the revision held by `doc`.
    ///
    /// The request carries the attachment's own content type instead of the
    /// default JSON one.
    pub fn add_attachment(
        &self,
        database: &str,
        doc: &DocumentRef,
        attachment: &Attachment,
    ) -> Result<DocumentRef> {
        require_non_empty(&attachment.name, "attachment name")?;
        let url = self.attachment_url(database, doc, &attachment.name)?;

        let mut headers = self.headers_without(CONTENT_TYPE.as_str());
        headers.push(Header::content_type(attachment.mime_type.as_str()));

        let reply = self.http.custom_with_body(
            &url,
            &headers,
            "PUT",
            attachment.body.clone(),
            ResponseMode::Document,
        );
        into_document(reply)
            .and_then(decode_write)
            .map_err(|err| {
                tracing::warn!("problem uploading attachment '{}': {err}", attachment.name);
                err
            })
    }

    pub fn remove_attachment(
        &self,
        database: &str,
        doc: &DocumentRef,
        name: &str,
    ) -> Result<DocumentRef> {
        require_non_empty(name, "attachment name")?;
        let url = self.attachment_url(database, doc, name)?;
        into_document(
            self.http
                .delete(&url, &self.headers, ResponseMode::Document),
        )
        .and_then(decode_write)
        .map_err(|err| {
            tracing::warn!("problem removing attachment '{name}': {err}");
            err
        })
    }

    fn get_json(&self, url: &str) -> Result<JsonValue> {
        into_document(self.http.get(url, &self.headers, ResponseMode::Document))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn document_url(&self, database: &str, id: &str) -> Result<String> {
        require_non_empty(database, "database name")?;
        require_non_empty(id, "document id")?;
        Ok(self.url(&format!("{database}/{id}")))
    }

    fn revision_url(&self, database: &str, id: &str, rev: &str) -> Result<String> {
        require_non_empty(rev, "revision")?;
        Ok(format!("{}?rev={rev}", self.document_url(database, id)?))
    }

    fn attachment_url(&self, database: &str, doc: &DocumentRef, name: &str) -> Result<String> {
        require_non_empty(&doc.rev, "revision")?;
        Ok(format!(
            "{}/{name}?rev={}",
            self.document_url(database, &doc.id)?,
            doc.rev
        ))
    }

    fn headers_without(&self, key: &str) -> Vec<Header> {
        self.headers
            .iter()
            .filter(|header| !header.is(key))
            .cloned()
            .collect()
    }
}

fn require_non_empty(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CouchError::InvalidArgument(format!("{what} cannot be empty")));
    }
    Ok(())
}

fn log_failure(action: &str, id: &str, err: CouchError) -> CouchError {
    tracing::debug!("problem {action} document '{id}': {err}");
    err
}

#[cfg(test)]
mod tests {
    use super::{CouchDbClient, DEFAULT_URL};
    use crate::{CouchError, DocumentRef, HttpAdapter};

    fn adapter() -> HttpAdapter {
        HttpAdapter::new().expect("adapter must build")
    }

    #[test]
    fn defaults_to_local_server_with_json_header() {
        let http = adapter();
        let client = CouchDbClient::new(&http);
        assert_eq!(client.base_url(), DEFAULT_URL);
        assert_eq!(client.headers().len(), 1);
        assert!(client.headers()[0].is("Content-Type"));
        assert_eq!(client.headers()[0].value, "application/json");
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let http = adapter();
        let client = CouchDbClient::with_url(&http, " http://couch:5984/ ");
        assert_eq!(client.base_url(), "http://couch:5984");
    }

    #[test]
    fn with_header_overrides_without_touching_original() {
        let http = adapter();
        let client = CouchDbClient::new(&http);
        let overridden = client
            .with_header("content-type", "application/x-ndjson")
            .with_header("X-Trace", "1");

        assert_eq!(client.headers().len(), 1);
        assert_eq!(client.headers()[0].value, "application/json");
        assert_eq!(overridden.headers().len(), 2);
        assert_eq!(overridden.headers()[0].value, "application/x-ndjson");
        assert_eq!(overridden.headers()[1].key, "X-Trace");
    }

    #[test]
    fn basic_auth_is_encoded_and_redacted() {
        let http = adapter();
        let client = CouchDbClient::new(&http).with_basic_auth("admin", "secret");
        let auth = client
            .headers()
            .iter()
            .find(|header| header.is("authorization"))
            .expect("must carry authorization");
        assert_eq!(auth.value, "Basic YWRtaW46c2VjcmV0");

        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("YWRtaW46c2VjcmV0"));
    }

    #[test]
    fn empty_arguments_fail_before_any_request() {
        let http = adapter();
        let client = CouchDbClient::with_url(&http, "http://127.0.0.1:9");

        assert!(matches!(
            client.create_database(""),
            Err(CouchError::InvalidArgument(_))
        ));
        assert!(matches!(client.uuids(0), Err(CouchError::InvalidArgument(_))));
        assert!(matches!(
            client.get_document("db", ""),
            Err(CouchError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.remove_document_ref("db", &DocumentRef::new("doc", "")),
            Err(CouchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn unreadable_attachment_file_is_io_error() {
        let http = adapter();
        let client = CouchDbClient::with_url(&http, "http://127.0.0.1:9");
        let err = client
            .add_attachment_from_file(
                "db",
                &DocumentRef::new("doc", "1-a"),
                "/definitely/not/here.bin",
            )
            .expect_err("must fail");
        assert!(matches!(err, CouchError::Io(_)));
    }
}
