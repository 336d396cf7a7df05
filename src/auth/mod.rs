//! Caller authentication.
//!
//! The dispatch core only sees [`RequestAuthenticator`]; how a request's
//! signature is checked is left to the implementation. The bundled
//! [`HttpSignatureAuthenticator`] reads an HTTP `Signature` header and
//! hands the actual cryptographic check to a [`SignatureVerifier`].

pub mod http_sig;
pub mod parse;
pub mod secrets;

use crate::{error::Result, registry::Controller};

pub use http_sig::{HmacRequestSigner, HttpSignatureAuthenticator};
pub use secrets::SharedSecretVerifier;

/// Transport-neutral view of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Replace every header called `name` with a single value.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_owned(), value.into()));
    }

    /// All values of a header, case-insensitively.
    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).next()
    }
}

/// Derives the controller principal for a request.
pub trait RequestAuthenticator: Send + Sync + 'static {
    /// Fails with `AuthenticationFailed` when no identity can be established.
    fn authenticate(&self, request: &InboundRequest) -> Result<Controller>;
}

/// Checks a signature produced by the holder of `key_id`.
pub trait SignatureVerifier: Send + Sync + 'static {
    /// `Ok(false)` for a well-formed but wrong signature; errors for
    /// unknown keys or unsupported algorithms.
    fn verify(
        &self,
        key_id: &str,
        algorithm: Option<&str>,
        message: &[u8],
        signature: &[u8],
    ) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_case_insensitive() {
        let req = InboundRequest::new("POST", "/kms/local/k1")
            .with_header("Host", "kms.example")
            .with_header("X-Multi", "a")
            .with_header("x-multi", "b");
        assert_eq!(req.header("host"), Some("kms.example"));
        assert_eq!(req.header_values("X-MULTI").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn set_header_replaces_all_values() {
        let mut req = InboundRequest::new("POST", "/")
            .with_header("Digest", "one")
            .with_header("digest", "two");
        req.set_header("Digest", "three");
        assert_eq!(req.header_values("digest").collect::<Vec<_>>(), ["three"]);
    }
}
