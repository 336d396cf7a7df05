use std::{any::Any, fmt, sync::Arc};

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Raw key bytes held by a provider. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes {
    bytes: Vec<u8>,
}

impl SecretBytes {
    pub fn random(len: usize) -> anyhow::Result<Self> {
        let mut bytes = vec![0u8; len];
        getrandom::getrandom(&mut bytes).map_err(|e| anyhow::anyhow!("getrandom failed: {e}"))?;
        Ok(Self { bytes })
    }

    pub fn from_slice(raw: &[u8]) -> Self {
        Self {
            bytes: raw.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBytes(***)")
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum HashAlgorithm {
    Sha256,
}

/// Algorithm descriptor a key was created or imported under.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Algorithm {
    /// RFC 3394 AES key wrap. `length` in bits.
    AesKw { length: u16 },
    Hmac { hash: HashAlgorithm },
    AesGcm { length: u16 },
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::AesKw { .. } => "AES-KW",
            Algorithm::Hmac { .. } => "HMAC",
            Algorithm::AesGcm { .. } => "AES-GCM",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::AesKw { length } | Algorithm::AesGcm { length } => {
                write!(f, "{}-{length}", self.name())
            }
            Algorithm::Hmac {
                hash: HashAlgorithm::Sha256,
            } => write!(f, "HMAC/SHA-256"),
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum KeyUsage {
    WrapKey,
    UnwrapKey,
    Sign,
    Verify,
    Encrypt,
    Decrypt,
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyUsage::WrapKey => "wrapKey",
            KeyUsage::UnwrapKey => "unwrapKey",
            KeyUsage::Sign => "sign",
            KeyUsage::Verify => "verify",
            KeyUsage::Encrypt => "encrypt",
            KeyUsage::Decrypt => "decrypt",
        };
        f.write_str(s)
    }
}

/// Opaque reference to provider-held key material.
///
/// The only way to reach raw bytes is the issuing provider's export
/// operation, which honours the `extractable` flag fixed at creation.
#[derive(Clone)]
pub struct KeyHandle {
    algorithm: Algorithm,
    extractable: bool,
    usages: Arc<[KeyUsage]>,
    material: Arc<dyn Any + Send + Sync>,
}

impl KeyHandle {
    pub fn new<M: Any + Send + Sync>(
        algorithm: Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
        material: M,
    ) -> Self {
        Self {
            algorithm,
            extractable,
            usages: usages.into(),
            material: Arc::new(material),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn extractable(&self) -> bool {
        self.extractable
    }

    pub fn usages(&self) -> &[KeyUsage] {
        &self.usages
    }

    pub fn permits(&self, usage: KeyUsage) -> bool {
        self.usages.contains(&usage)
    }

    /// Provider-side access to the material, if it is of type `M`.
    pub fn material<M: Any>(&self) -> Option<&M> {
        self.material.downcast_ref::<M>()
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("algorithm", &self.algorithm)
            .field("extractable", &self.extractable)
            .field("usages", &self.usages)
            .field("material", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_prints_material() {
        let handle = KeyHandle::new(
            Algorithm::AesKw { length: 256 },
            false,
            &[KeyUsage::WrapKey],
            SecretBytes::from_slice(&[0x42; 32]),
        );
        let dbg = format!("{handle:?}");
        assert!(dbg.contains("***"));
        assert!(!dbg.contains("66"));
        assert_eq!(format!("{:?}", SecretBytes::from_slice(b"secret")), "SecretBytes(***)");
    }

    #[test]
    fn material_downcast_requires_matching_type() {
        let handle = KeyHandle::new(
            Algorithm::Hmac {
                hash: HashAlgorithm::Sha256,
            },
            false,
            &[KeyUsage::Sign],
            SecretBytes::from_slice(b"k"),
        );
        assert!(handle.material::<SecretBytes>().is_some());
        assert!(handle.material::<String>().is_none());
        assert!(handle.permits(KeyUsage::Sign));
        assert!(!handle.permits(KeyUsage::Verify));
    }

    #[test]
    fn algorithm_display() {
        assert_eq!(Algorithm::AesKw { length: 256 }.to_string(), "AES-KW-256");
        assert_eq!(
            Algorithm::Hmac {
                hash: HashAlgorithm::Sha256
            }
            .to_string(),
            "HMAC/SHA-256"
        );
    }
}
