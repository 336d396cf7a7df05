pub mod keys;
pub mod software;

use zeroize::Zeroizing;

pub use keys::{Algorithm, HashAlgorithm, KeyHandle, KeyUsage, SecretBytes};
pub use software::SoftwareCryptoProvider;

/// Synchronous interface to the primitives that hold key material.
///
/// Handles returned here are only ever passed back to the same provider.
pub trait CryptoProvider: Send + Sync + 'static {
    fn generate_key(
        &self,
        algorithm: Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> anyhow::Result<KeyHandle>;

    /// Import raw bytes. For AES families the recorded length is taken
    /// from `raw`, not from `algorithm`.
    fn import_raw_key(
        &self,
        raw: &[u8],
        algorithm: Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> anyhow::Result<KeyHandle>;

    /// Refused unless the handle was created extractable.
    fn export_raw_key(&self, key: &KeyHandle) -> anyhow::Result<Zeroizing<Vec<u8>>>;

    /// Wrap `key` in raw format under `wrapping_key`'s own algorithm.
    fn wrap_key(&self, key: &KeyHandle, wrapping_key: &KeyHandle) -> anyhow::Result<Vec<u8>>;

    fn unwrap_key(
        &self,
        wrapped: &[u8],
        unwrapping_key: &KeyHandle,
        algorithm: Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> anyhow::Result<KeyHandle>;

    fn sign(&self, key: &KeyHandle, data: &[u8]) -> anyhow::Result<Vec<u8>>;

    /// `Ok(false)` on mismatch; errors are reserved for unusable keys.
    fn verify(&self, key: &KeyHandle, signature: &[u8], data: &[u8]) -> anyhow::Result<bool>;

    fn encrypt(&self, key: &KeyHandle, plaintext: &[u8]) -> anyhow::Result<Vec<u8>>;

    fn decrypt(&self, key: &KeyHandle, ciphertext: &[u8]) -> anyhow::Result<Vec<u8>>;
}
