//! Blocking HTTP adapter.
//!
//! Every call performs exactly one round trip on a dedicated worker thread
//! driving its own single-threaded runtime, so the caller only ever sees a
//! finished [`Reply`].

use std::{fmt, thread, time::Duration};

use reqwest::{header::CONTENT_TYPE, Method, StatusCode};
use serde_json::{json, Value as JsonValue};

use crate::{ClientOptions, CouchError, Result};

/// Content type applied to every JSON request body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A single request header. Duplicate keys are sent as separate header lines.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn content_type(value: impl Into<String>) -> Self {
        Self::new(CONTENT_TYPE.as_str(), value)
    }

    /// Case-insensitive key comparison.
    pub fn is(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name)
    }
}

/// How a successful response body is interpreted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseMode {
    /// Parse the body as JSON. Malformed JSON yields `null`.
    Document,
    /// Decode the body as Latin-1 text.
    Text,
    /// Discard the body and report the HTTP status code.
    Status,
}

/// Failure of a single round trip.
///
/// `status` is set when the server answered with an error status; it is
/// `None` for connection, DNS, TLS and timeout failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportFailure {
    pub status: Option<u16>,
    pub message: String,
}

impl TransportFailure {
    fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    fn http(status: StatusCode, url: &str, body: &[u8]) -> Self {
        Self {
            status: Some(status.as_u16()),
            message: format!(
                "error transferring {url} - server replied {status}: {}",
                couch_error_detail(body).unwrap_or_else(|| {
                    status.canonical_reason().unwrap_or("unknown").to_owned()
                })
            ),
        }
    }

    /// Synthetic `{"result": "error", "desc": ...}` document.
    pub fn to_document(&self) -> JsonValue {
        let mut document = json!({
            "result": "error",
            "desc": self.message,
        });
        if let Some(status) = self.status {
            document["status"] = json!(status);
        }
        document
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<TransportFailure> for CouchError {
    fn from(failure: TransportFailure) -> Self {
        match failure.status {
            Some(status) => CouchError::Http {
                status,
                description: failure.message,
            },
            None => CouchError::Transport(failure.message),
        }
    }
}

/// Outcome of one adapter call.
///
/// A failed round trip on a bodyless verb is reported as
/// [`Reply::Document`] holding [`TransportFailure::to_document`]; on a
/// body-bearing verb it is reported as [`Reply::Failed`].
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Document(JsonValue),
    Text(String),
    Status(u16),
    Failed(TransportFailure),
}

struct Completed {
    status: u16,
    body: Vec<u8>,
}

#[derive(Clone)]
/// Synchronous request adapter over `reqwest`.
pub struct HttpAdapter {
    http: reqwest::Client,
    options: ClientOptions,
}

impl fmt::Debug for HttpAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAdapter")
            .field("options", &self.options)
            .finish()
    }
}

impl HttpAdapter {
    /// Creates an adapter with [`ClientOptions::default`].
    pub fn new() -> Result<Self> {
        Self::with_options(ClientOptions::default())
    }

    pub fn with_options(options: ClientOptions) -> Result<Self> {
        if options.accept_invalid_certs {
            tracing::warn!("TLS certificate validation is disabled for this adapter");
        }

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            // Each round trip runs on a short-lived runtime; pooled
            // connections must not outlive it.
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|err| CouchError::Transport(error_chain(&err)))?;

        Ok(Self { http, options })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn get(&self, url: &str, headers: &[Header], mode: ResponseMode) -> Reply {
        self.request(Method::GET, url, headers, None, mode)
    }

    /// Sends `body` serialized as compact JSON.
    pub fn post(
        &self,
        url: &str,
        headers: &[Header],
        body: &JsonValue,
        mode: ResponseMode,
    ) -> Reply {
        self.request(Method::POST, url, headers, Some(encode_json(body)), mode)
    }

    /// Sends `body` serialized as compact JSON.
    pub fn put(
        &self,
        url: &str,
        headers: &[Header],
        body: &JsonValue,
        mode: ResponseMode,
    ) -> Reply {
        self.request(Method::PUT, url, headers, Some(encode_json(body)), mode)
    }

    pub fn delete(&self, url: &str, headers: &[Header], mode: ResponseMode) -> Reply {
        self.request(Method::DELETE, url, headers, None, mode)
    }

    /// Issues a bodyless request with an arbitrary verb.
    pub fn custom(&self, url: &str, headers: &[Header], verb: &str, mode: ResponseMode) -> Reply {
        match parse_method(verb) {
            Ok(method) => self.request(method, url, headers, None, mode),
            Err(failure) => Reply::Document(failure.to_document()),
        }
    }

    /// Issues a request with an arbitrary verb and a raw body.
    pub fn custom_with_body(
        &self,
        url: &str,
        headers: &[Header],
        verb: &str,
        body: Vec<u8>,
        mode: ResponseMode,
    ) -> Reply {
        match parse_method(verb) {
            Ok(method) => self.request(method, url, headers, Some(body), mode),
            Err(failure) => Reply::Failed(failure),
        }
    }

    fn request(
        &self,
        method: Method,
        url: &str,
        headers: &[Header],
        body: Option<Vec<u8>>,
        mode: ResponseMode,
    ) -> Reply {
        let has_body = body.is_some();
        tracing::debug!("{method} {url}");

        match self.round_trip(method, url, &effective_headers(headers, has_body), body) {
            Ok(completed) => interpret(completed, mode),
            Err(failure) => {
                tracing::debug!("request to {url} failed: {failure}");
                if has_body {
                    Reply::Failed(failure)
                } else {
                    Reply::Document(failure.to_document())
                }
            }
        }
    }

    fn round_trip(
        &self,
        method: Method,
        url: &str,
        headers: &[Header],
        body: Option<Vec<u8>>,
    ) -> std::result::Result<Completed, TransportFailure> {
        let mut builder = self.http.request(method, url);
        for header in headers {
            builder = builder.header(header.key.as_str(), header.value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout_ms) = self.options.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let request = builder
            .build()
            .map_err(|err| TransportFailure::transport(error_chain(&err)))?;

        thread::scope(|scope| {
            scope
                .spawn(|| -> std::result::Result<Completed, TransportFailure> {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(|err| {
                            TransportFailure::transport(format!("runtime init failed: {err}"))
                        })?;
                    runtime.block_on(execute(&self.http, request))
                })
                .join()
                .unwrap_or_else(|_| Err(TransportFailure::transport("request worker panicked")))
        })
    }
}

async fn execute(
    http: &reqwest::Client,
    request: reqwest::Request,
) -> std::result::Result<Completed, TransportFailure> {
    let url = request.url().to_string();
    let response = http
        .execute(request)
        .await
        .map_err(|err| TransportFailure::transport(error_chain(&err)))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| TransportFailure::transport(error_chain(&err)))?;

    if status.is_client_error() || status.is_server_error() {
        return Err(TransportFailure::http(status, &url, &body));
    }

    Ok(Completed {
        status: status.as_u16(),
        body: body.to_vec(),
    })
}

fn interpret(completed: Completed, mode: ResponseMode) -> Reply {
    match mode {
        ResponseMode::Document => Reply::Document(
            serde_json::from_slice(&completed.body).unwrap_or_else(|err| {
                tracing::debug!("response body is not JSON: {err}");
                JsonValue::Null
            }),
        ),
        ResponseMode::Text => Reply::Text(decode_latin1(&completed.body)),
        ResponseMode::Status => Reply::Status(completed.status),
    }
}

/// Appends `Content-Type: application/json` when a body is sent without one.
fn effective_headers(headers: &[Header], has_body: bool) -> Vec<Header> {
    let mut effective = headers.to_vec();
    if has_body && !headers.iter().any(|header| header.is(CONTENT_TYPE.as_str())) {
        effective.push(Header::content_type(JSON_CONTENT_TYPE));
    }
    effective
}

fn parse_method(verb: &str) -> std::result::Result<Method, TransportFailure> {
    Method::from_bytes(verb.as_bytes())
        .map_err(|_| TransportFailure::transport(format!("invalid HTTP verb '{verb}'")))
}

fn encode_json(body: &JsonValue) -> Vec<u8> {
    // Serializing a `Value` cannot fail: all map keys are strings.
    serde_json::to_vec(body).unwrap_or_default()
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Extracts `"error (reason)"` from a CouchDB error body.
fn couch_error_detail(body: &[u8]) -> Option<String> {
    let value: JsonValue = serde_json::from_slice(body).ok()?;
    let error = value.get("error")?.as_str()?;
    match value.get("reason").and_then(JsonValue::as_str) {
        Some(reason) => Some(format!("{error} ({reason})")),
        None => Some(error.to_owned()),
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        couch_error_detail, decode_latin1, effective_headers, interpret, Completed, Header,
        HttpAdapter, Reply, ResponseMode, TransportFailure,
    };
    use crate::CouchError;

    fn unreachable_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("must bind");
        let address = listener.local_addr().expect("must have local addr");
        drop(listener);
        format!("http://{address}/db")
    }

    #[test]
    fn json_content_type_injected_only_with_body() {
        let headers = vec![Header::new("Accept", "application/json")];

        let with_body = effective_headers(&headers, true);
        assert_eq!(with_body.len(), 2);
        assert!(with_body[1].is("content-type"));
        assert_eq!(with_body[1].value, "application/json");

        assert_eq!(effective_headers(&headers, false), headers);
    }

    #[test]
    fn caller_content_type_is_kept() {
        let headers = vec![Header::new("content-type", "image/png")];
        let effective = effective_headers(&headers, true);
        assert_eq!(effective, headers);
    }

    #[test]
    fn latin1_maps_high_bytes_to_code_points() {
        assert_eq!(decode_latin1(b"caf\xe9"), "café");
    }

    #[test]
    fn malformed_json_yields_null_document() {
        let reply = interpret(
            Completed {
                status: 200,
                body: b"<html>".to_vec(),
            },
            ResponseMode::Document,
        );
        assert_eq!(reply, Reply::Document(serde_json::Value::Null));
    }

    #[test]
    fn status_mode_reports_code() {
        let reply = interpret(
            Completed {
                status: 201,
                body: b"{\"ok\":true}".to_vec(),
            },
            ResponseMode::Status,
        );
        assert_eq!(reply, Reply::Status(201));
    }

    #[test]
    fn synthetic_document_carries_marker_and_status() {
        let failure = TransportFailure {
            status: Some(409),
            message: "conflict".to_owned(),
        };
        assert_eq!(
            failure.to_document(),
            json!({"result": "error", "desc": "conflict", "status": 409})
        );
        assert!(CouchError::from(failure).is_conflict());
    }

    #[test]
    fn couch_error_detail_reads_error_and_reason() {
        let detail = couch_error_detail(br#"{"error":"not_found","reason":"missing"}"#);
        assert_eq!(detail.as_deref(), Some("not_found (missing)"));
        assert_eq!(couch_error_detail(b"nope"), None);
    }

    #[test]
    fn bodyless_transport_failure_yields_error_document() {
        let adapter = HttpAdapter::new().expect("adapter must build");
        let reply = adapter.get(&unreachable_url(), &[], ResponseMode::Document);

        match reply {
            Reply::Document(document) => {
                assert_eq!(document["result"], "error");
                let desc = document["desc"].as_str().expect("desc must be a string");
                assert!(!desc.is_empty());
            }
            other => panic!("expected error document, got {other:?}"),
        }
    }

    #[test]
    fn body_transport_failure_yields_raw_text() {
        let adapter = HttpAdapter::new().expect("adapter must build");
        let reply = adapter.custom_with_body(
            &unreachable_url(),
            &[],
            "PUT",
            b"{}".to_vec(),
            ResponseMode::Document,
        );

        match reply {
            Reply::Failed(failure) => {
                assert_eq!(failure.status, None);
                assert!(!failure.message.is_empty());
            }
            other => panic!("expected raw failure, got {other:?}"),
        }
    }

    #[test]
    fn invalid_verb_is_reported_without_request() {
        let adapter = HttpAdapter::new().expect("adapter must build");
        let reply = adapter.custom("http://127.0.0.1/", &[], "BAD VERB", ResponseMode::Status);
        match reply {
            Reply::Document(document) => assert_eq!(document["result"], "error"),
            other => panic!("expected error document, got {other:?}"),
        }
    }
}
