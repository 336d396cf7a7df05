use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::Mac;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{
    InboundRequest, RequestAuthenticator, SignatureVerifier,
    parse::{SignatureParams, parse_signature},
    secrets::{HMAC_SHA256, hmac_sha256},
};
use crate::{
    config::Config,
    error::{KmsError, Result},
    registry::Controller,
};

pub const REQUEST_TARGET: &str = "(request-target)";
const CREATED: &str = "(created)";
const EXPIRES: &str = "(expires)";
const DIGEST: &str = "digest";

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `SHA-256=<base64>` value for a `Digest` header.
pub fn body_digest(body: &[u8]) -> String {
    format!("SHA-256={}", STANDARD.encode(Sha256::digest(body)))
}

fn check_digest(request: &InboundRequest) -> std::result::Result<(), String> {
    let expected = STANDARD.encode(Sha256::digest(&request.body));
    let matched = request
        .header_values(DIGEST)
        .flat_map(|v| v.split(','))
        .filter_map(|part| {
            let (alg, value) = part.trim().split_once('=')?;
            alg.eq_ignore_ascii_case("SHA-256").then_some(value)
        })
        .any(|value| value == expected);
    if matched {
        Ok(())
    } else {
        Err("body does not match the SHA-256 Digest header".into())
    }
}

/// Build the string a request signature covers, one `name: value` line
/// per signed header.
pub fn signing_string(
    request: &InboundRequest,
    params: &SignatureParams,
) -> std::result::Result<String, String> {
    let mut lines = Vec::with_capacity(params.headers.len());
    for name in &params.headers {
        let line = match name.as_str() {
            REQUEST_TARGET => format!(
                "{REQUEST_TARGET}: {} {}",
                request.method.to_ascii_lowercase(),
                request.path
            ),
            CREATED => {
                let created = params
                    .created
                    .ok_or("\"(created)\" is signed but no created parameter was given")?;
                format!("{CREATED}: {created}")
            }
            EXPIRES => {
                let expires = params
                    .expires
                    .ok_or("\"(expires)\" is signed but no expires parameter was given")?;
                format!("{EXPIRES}: {expires}")
            }
            header => {
                let values: Vec<&str> = request.header_values(header).map(str::trim).collect();
                if values.is_empty() {
                    return Err(format!("signed header \"{header}\" is missing"));
                }
                format!("{header}: {}", values.join(", "))
            }
        };
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

/// Authenticates requests carrying an HTTP message signature. The
/// signature's `keyId` becomes the controller.
pub struct HttpSignatureAuthenticator<V> {
    verifier: V,
    required_headers: Vec<String>,
    max_age: Option<Duration>,
    clock_skew: Duration,
}

impl<V: SignatureVerifier> HttpSignatureAuthenticator<V> {
    pub fn new(verifier: V) -> Self {
        Self::from_config(verifier, &Config::default())
    }

    pub fn from_config(verifier: V, config: &Config) -> Self {
        Self {
            verifier,
            required_headers: config
                .required_signed_headers
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            max_age: config.max_signature_age(),
            clock_skew: config.clock_skew(),
        }
    }

    pub fn require_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_headers = headers
            .into_iter()
            .map(|h| h.into().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// With a max age set, undated signatures are refused.
    fn check_timestamps(
        &self,
        params: &SignatureParams,
        now: u64,
    ) -> std::result::Result<(), String> {
        let skew = self.clock_skew.as_secs();
        match (params.created, self.max_age) {
            (Some(created), _) if created > now.saturating_add(skew) => {
                return Err("signature was created in the future".into());
            }
            (Some(created), Some(max_age)) if now.saturating_sub(created) > max_age.as_secs() => {
                return Err("signature is too old".into());
            }
            (None, Some(_)) => return Err("signature has no created timestamp".into()),
            _ => {}
        }
        if let Some(expires) = params.expires {
            if expires.saturating_add(skew) < now {
                return Err("signature has expired".into());
            }
        }
        Ok(())
    }

    fn check(&self, request: &InboundRequest) -> std::result::Result<Controller, String> {
        let raw = request
            .header("signature")
            .or_else(|| request.header("authorization"))
            .ok_or("missing signature header")?;
        let params = parse_signature(raw)?;

        for required in &self.required_headers {
            if !params.headers.contains(required) {
                return Err(format!("\"{required}\" must be signed"));
            }
        }
        if params.headers.iter().any(|h| h == DIGEST) {
            check_digest(request)?;
        }
        self.check_timestamps(&params, now_secs())?;

        let message = signing_string(request, &params)?;
        let signature = STANDARD
            .decode(&params.signature)
            .map_err(|_| "signature is not valid base64".to_owned())?;

        match self.verifier.verify(
            &params.key_id,
            params.algorithm.as_deref(),
            message.as_bytes(),
            &signature,
        ) {
            Ok(true) => Ok(Controller::new(params.key_id)),
            Ok(false) => Err(format!("signature mismatch for \"{}\"", params.key_id)),
            Err(e) => Err(format!("cannot verify signature for \"{}\": {e}", params.key_id)),
        }
    }
}

impl<V: SignatureVerifier> RequestAuthenticator for HttpSignatureAuthenticator<V> {
    fn authenticate(&self, request: &InboundRequest) -> Result<Controller> {
        self.check(request).map_err(|reason| {
            log::warn!("rejected request to {}: {reason}", request.path);
            KmsError::AuthenticationFailed(reason)
        })
    }
}

/// Client-side counterpart of [`SharedSecretVerifier`](super::SharedSecretVerifier).
pub struct HmacRequestSigner {
    key_id: String,
    secret: Zeroizing<Vec<u8>>,
    headers: Vec<String>,
}

impl HmacRequestSigner {
    pub fn new(key_id: impl Into<String>, secret: &[u8]) -> Self {
        Self {
            key_id: key_id.into(),
            secret: Zeroizing::new(secret.to_vec()),
            headers: vec![REQUEST_TARGET.into(), CREATED.into(), DIGEST.into()],
        }
    }

    pub fn headers(mut self, headers: &[&str]) -> Self {
        self.headers = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
        self
    }

    /// Sets `Signature` (and `Digest`, when signed) on `request`.
    pub fn sign(&self, request: &mut InboundRequest, created: u64) -> anyhow::Result<()> {
        if self.headers.iter().any(|h| h == DIGEST) {
            let digest = body_digest(&request.body);
            request.set_header("Digest", digest);
        }

        let params = SignatureParams {
            key_id: self.key_id.clone(),
            algorithm: Some(HMAC_SHA256.into()),
            headers: self.headers.clone(),
            signature: String::new(),
            created: Some(created),
            expires: None,
        };
        let message = signing_string(request, &params).map_err(anyhow::Error::msg)?;
        let tag = hmac_sha256(&self.secret, message.as_bytes())?.finalize().into_bytes();

        request.set_header(
            "Signature",
            format!(
                concat!(
                    "keyId=\"{}\",algorithm=\"{}\",created={},",
                    "headers=\"{}\",signature=\"{}\"",
                ),
                self.key_id,
                HMAC_SHA256,
                created,
                self.headers.join(" "),
                STANDARD.encode(tag)
            ),
        );
        Ok(())
    }

    pub fn sign_now(&self, request: &mut InboundRequest) -> anyhow::Result<()> {
        self.sign(request, now_secs())
    }
}
