// crates/context-probe-config/src/dsn.rs
// ============================================================================
// Module: Error-Tracking DSN
// Description: Parsing and redaction of the error-tracking endpoint DSN.
// Purpose: Validate the required endpoint credential before startup.
// Dependencies: thiserror, url
// ============================================================================

//! ## Overview
//! The DSN has the shape
//! `http(s)://<public_key>@<host>[:port][/<prefix>]/<project_id>`. It carries
//! a credential, so it is never printed in full: [`Dsn`]'s `Display` masks
//! the public key. When events are forwarded, the DSN yields the store
//! endpoint and the `X-Sentry-Auth` header value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Parsed error-tracking DSN.
///
/// # Invariants
/// - `public_key`, `host`, and `project_id` are non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    /// URL scheme (`http` or `https`).
    scheme: String,
    /// Public key (credential).
    public_key: String,
    /// Endpoint host, including a port when one was given.
    host: String,
    /// Path before the project id, empty or starting with `/`.
    path_prefix: String,
    /// Project identifier (last path segment).
    project_id: String,
}

/// DSN validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DsnError {
    /// Not a URL.
    #[error("dsn is not a valid url: {0}")]
    Malformed(String),
    /// Scheme other than http/https.
    #[error("dsn scheme must be http or https, got {0}")]
    UnsupportedScheme(String),
    /// No public key before `@`.
    #[error("dsn is missing the public key")]
    MissingPublicKey,
    /// No host.
    #[error("dsn is missing the host")]
    MissingHost,
    /// No project id path segment.
    #[error("dsn is missing the project id")]
    MissingProjectId,
}

impl Dsn {
    /// Parses a DSN string.
    ///
    /// # Errors
    ///
    /// Returns [`DsnError`] when any DSN component is missing or invalid.
    pub fn parse(raw: &str) -> Result<Self, DsnError> {
        let url = Url::parse(raw.trim()).map_err(|err| DsnError::Malformed(err.to_string()))?;
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(DsnError::UnsupportedScheme(scheme.to_string()));
        }
        let public_key = url.username();
        if public_key.is_empty() {
            return Err(DsnError::MissingPublicKey);
        }
        let host = url.host_str().filter(|host| !host.is_empty()).ok_or(DsnError::MissingHost)?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();
        let project_id = segments.pop().ok_or(DsnError::MissingProjectId)?;
        let path_prefix: String = segments.iter().map(|segment| format!("/{segment}")).collect();
        Ok(Self {
            scheme: scheme.to_string(),
            public_key: public_key.to_string(),
            host,
            path_prefix,
            project_id: project_id.to_string(),
        })
    }

    /// Returns the URL events are posted to.
    #[must_use]
    pub fn store_endpoint(&self) -> String {
        format!(
            "{}://{}{}/api/{}/store/",
            self.scheme, self.host, self.path_prefix, self.project_id
        )
    }

    /// Returns the `X-Sentry-Auth` header value identifying `client`.
    #[must_use]
    pub fn auth_header(&self, client: &str) -> String {
        format!("Sentry sentry_version=7, sentry_key={}, sentry_client={client}", self.public_key)
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://***@{}/{}", self.scheme, self.host, self.project_id)
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dsn").field(&self.to_string()).finish()
    }
}
