use aes_gcm::{
    Aes128Gcm, Aes256Gcm, AesGcm, KeyInit, Nonce,
    aead::{Aead, consts::U12},
};
use aes_kw::{KekAes128, KekAes192, KekAes256};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{
    CryptoProvider,
    keys::{Algorithm, HashAlgorithm, KeyHandle, KeyUsage, SecretBytes},
};

type Aes192Gcm = AesGcm<aes::Aes192, U12>;
type HmacSha256 = Hmac<Sha256>;

const GCM_NONCE_LEN: usize = 12;
/// HMAC keys default to the hash block size.
const HMAC_SHA256_KEY_LEN: usize = 64;

/// In-process provider backed by the RustCrypto primitives.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareCryptoProvider;

impl SoftwareCryptoProvider {
    pub fn new() -> Self {
        Self
    }
}

fn secret(key: &KeyHandle) -> anyhow::Result<&SecretBytes> {
    key.material::<SecretBytes>()
        .ok_or_else(|| anyhow::anyhow!("key handle was not issued by this provider"))
}

fn require_usage(key: &KeyHandle, usage: KeyUsage) -> anyhow::Result<()> {
    anyhow::ensure!(
        key.permits(usage),
        "{} key does not permit \"{usage}\"",
        key.algorithm()
    );
    Ok(())
}

fn aes_key_len(bits: u16) -> anyhow::Result<usize> {
    match bits {
        128 | 192 | 256 => Ok(bits as usize / 8),
        _ => anyhow::bail!("AES key length must be 128, 192 or 256 bits, got {bits}"),
    }
}

fn kw_wrap(kek: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let wrapped = match kek.len() {
        16 => KekAes128::from(<[u8; 16]>::try_from(kek)?).wrap_vec(data),
        24 => KekAes192::from(<[u8; 24]>::try_from(kek)?).wrap_vec(data),
        32 => KekAes256::from(<[u8; 32]>::try_from(kek)?).wrap_vec(data),
        n => anyhow::bail!("invalid AES-KW key length {n}"),
    };
    wrapped.map_err(|e| anyhow::anyhow!("AES-KW wrap failed: {e}"))
}

fn kw_unwrap(kek: &[u8], wrapped: &[u8]) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let raw = match kek.len() {
        16 => KekAes128::from(<[u8; 16]>::try_from(kek)?).unwrap_vec(wrapped),
        24 => KekAes192::from(<[u8; 24]>::try_from(kek)?).unwrap_vec(wrapped),
        32 => KekAes256::from(<[u8; 32]>::try_from(kek)?).unwrap_vec(wrapped),
        n => anyhow::bail!("invalid AES-KW key length {n}"),
    };
    raw.map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("AES-KW unwrap failed: {e}"))
}

enum GcmCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl GcmCipher {
    fn new(key: &[u8]) -> anyhow::Result<Self> {
        let cipher = match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(GcmCipher::Aes128),
            24 => Aes192Gcm::new_from_slice(key).map(GcmCipher::Aes192),
            32 => Aes256Gcm::new_from_slice(key).map(GcmCipher::Aes256),
            n => anyhow::bail!("invalid AES-GCM key length {n}"),
        };
        cipher.map_err(|e| anyhow::anyhow!("invalid AES-GCM key: {e}"))
    }

    fn encrypt(&self, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            GcmCipher::Aes128(c) => c.encrypt(nonce, plaintext),
            GcmCipher::Aes192(c) => c.encrypt(nonce, plaintext),
            GcmCipher::Aes256(c) => c.encrypt(nonce, plaintext),
        }
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            GcmCipher::Aes128(c) => c.decrypt(nonce, ciphertext),
            GcmCipher::Aes192(c) => c.decrypt(nonce, ciphertext),
            GcmCipher::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
    }
}

fn hmac_for(key: &KeyHandle) -> anyhow::Result<HmacSha256> {
    match key.algorithm() {
        Algorithm::Hmac {
            hash: HashAlgorithm::Sha256,
        } => <HmacSha256 as Mac>::new_from_slice(secret(key)?.as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid HMAC key: {e}")),
        other => anyhow::bail!("{other} key cannot sign or verify"),
    }
}

fn gcm_for(key: &KeyHandle) -> anyhow::Result<GcmCipher> {
    match key.algorithm() {
        Algorithm::AesGcm { .. } => GcmCipher::new(secret(key)?.as_bytes()),
        other => anyhow::bail!("{other} key cannot encrypt or decrypt"),
    }
}

impl CryptoProvider for SoftwareCryptoProvider {
    fn generate_key(
        &self,
        algorithm: Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> anyhow::Result<KeyHandle> {
        let len = match algorithm {
            Algorithm::AesKw { length } | Algorithm::AesGcm { length } => aes_key_len(length)?,
            Algorithm::Hmac {
                hash: HashAlgorithm::Sha256,
            } => HMAC_SHA256_KEY_LEN,
        };
        let material = SecretBytes::random(len)?;
        Ok(KeyHandle::new(algorithm, extractable, usages, material))
    }

    fn import_raw_key(
        &self,
        raw: &[u8],
        algorithm: Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> anyhow::Result<KeyHandle> {
        let algorithm = match algorithm {
            Algorithm::AesKw { .. } | Algorithm::AesGcm { .. } => {
                let bits = u16::try_from(raw.len() * 8).unwrap_or(u16::MAX);
                aes_key_len(bits)?;
                match algorithm {
                    Algorithm::AesKw { .. } => Algorithm::AesKw { length: bits },
                    _ => Algorithm::AesGcm { length: bits },
                }
            }
            Algorithm::Hmac { .. } => {
                anyhow::ensure!(!raw.is_empty(), "HMAC key data must not be empty");
                algorithm
            }
        };
        Ok(KeyHandle::new(
            algorithm,
            extractable,
            usages,
            SecretBytes::from_slice(raw),
        ))
    }

    fn export_raw_key(&self, key: &KeyHandle) -> anyhow::Result<Zeroizing<Vec<u8>>> {
        anyhow::ensure!(key.extractable(), "key is not extractable");
        Ok(Zeroizing::new(secret(key)?.as_bytes().to_vec()))
    }

    fn wrap_key(&self, key: &KeyHandle, wrapping_key: &KeyHandle) -> anyhow::Result<Vec<u8>> {
        require_usage(wrapping_key, KeyUsage::WrapKey)?;
        anyhow::ensure!(key.extractable(), "key to wrap is not extractable");
        match wrapping_key.algorithm() {
            Algorithm::AesKw { .. } => {
                kw_wrap(secret(wrapping_key)?.as_bytes(), secret(key)?.as_bytes())
            }
            other => anyhow::bail!("{other} key cannot wrap keys"),
        }
    }

    fn unwrap_key(
        &self,
        wrapped: &[u8],
        unwrapping_key: &KeyHandle,
        algorithm: Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> anyhow::Result<KeyHandle> {
        require_usage(unwrapping_key, KeyUsage::UnwrapKey)?;
        let raw = match unwrapping_key.algorithm() {
            Algorithm::AesKw { .. } => kw_unwrap(secret(unwrapping_key)?.as_bytes(), wrapped)?,
            other => anyhow::bail!("{other} key cannot unwrap keys"),
        };
        self.import_raw_key(&raw, algorithm, extractable, usages)
    }

    fn sign(&self, key: &KeyHandle, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        require_usage(key, KeyUsage::Sign)?;
        let mut mac = hmac_for(key)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify(&self, key: &KeyHandle, signature: &[u8], data: &[u8]) -> anyhow::Result<bool> {
        require_usage(key, KeyUsage::Verify)?;
        let mut mac = hmac_for(key)?;
        mac.update(data);
        Ok(mac.verify_slice(signature).is_ok())
    }

    fn encrypt(&self, key: &KeyHandle, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        require_usage(key, KeyUsage::Encrypt)?;
        let cipher = gcm_for(key)?;
        let mut nonce = [0u8; GCM_NONCE_LEN];
        getrandom::getrandom(&mut nonce).map_err(|e| anyhow::anyhow!("getrandom failed: {e}"))?;
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| anyhow::anyhow!("AES-GCM encrypt failed: {e}"))?;
        let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &KeyHandle, ciphertext: &[u8]) -> anyhow::Result<Vec<u8>> {
        require_usage(key, KeyUsage::Decrypt)?;
        anyhow::ensure!(ciphertext.len() > GCM_NONCE_LEN, "ciphertext too short");
        let cipher = gcm_for(key)?;
        let (nonce, body) = ciphertext.split_at(GCM_NONCE_LEN);
        cipher
            .decrypt(nonce, body)
            .map_err(|e| anyhow::anyhow!("AES-GCM decrypt failed: {e}"))
    }
}
