/// Configures the transport behind [`crate::HttpAdapter`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds. `None` keeps the transport default.
    pub timeout_ms: Option<u64>,
    /// Proceed when the server certificate cannot be validated.
    ///
    /// Only appropriate for trusted or internal deployments.
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            accept_invalid_certs: true,
        }
    }
}

impl ClientOptions {
    /// Strict TLS validation, no timeout.
    pub fn strict_tls() -> Self {
        Self {
            accept_invalid_certs: false,
            ..Self::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}
