/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum CouchError {
    /// Connection, DNS, TLS or timeout failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-success HTTP status reported by the server.
    #[error("http error {status}: {description}")]
    Http { status: u16, description: String },
    /// Structured reply carrying the `"result": "error"` marker.
    #[error("server error: {0}")]
    Server(String),
    /// Response decoding or protocol-shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
    /// Caller-supplied argument rejected before any request was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Local file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CouchError {
    /// Returns the HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `true` when the server rejected a write based on a stale revision.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
