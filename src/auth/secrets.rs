use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::SignatureVerifier;

type HmacSha256 = Hmac<Sha256>;

/// `algorithm` parameter value for HMAC-SHA-256 request signatures.
pub const HMAC_SHA256: &str = "hmac-sha256";
/// Algorithm-agnostic value from newer signature drafts.
const HS2019: &str = "hs2019";

pub(crate) fn hmac_sha256(secret: &[u8], message: &[u8]) -> anyhow::Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("invalid HMAC secret: {e}"))?;
    mac.update(message);
    Ok(mac)
}

/// Verifies HMAC-SHA-256 request signatures against per-key shared secrets.
#[derive(Default)]
pub struct SharedSecretVerifier {
    secrets: HashMap<String, Zeroizing<Vec<u8>>>,
}

impl SharedSecretVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, key_id: impl Into<String>, secret: &[u8]) -> Self {
        self.insert(key_id, secret);
        self
    }

    pub fn insert(&mut self, key_id: impl Into<String>, secret: &[u8]) {
        self.secrets
            .insert(key_id.into(), Zeroizing::new(secret.to_vec()));
    }
}

impl SignatureVerifier for SharedSecretVerifier {
    fn verify(
        &self,
        key_id: &str,
        algorithm: Option<&str>,
        message: &[u8],
        signature: &[u8],
    ) -> anyhow::Result<bool> {
        let secret = self
            .secrets
            .get(key_id)
            .ok_or_else(|| anyhow::anyhow!("unknown signing key \"{key_id}\""))?;
        if let Some(alg) = algorithm {
            anyhow::ensure!(
                alg.eq_ignore_ascii_case(HMAC_SHA256) || alg.eq_ignore_ascii_case(HS2019),
                "unsupported signature algorithm \"{alg}\""
            );
        }
        Ok(hmac_sha256(secret, message)?.verify_slice(signature).is_ok())
    }
}
