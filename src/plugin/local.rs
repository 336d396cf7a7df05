use std::sync::Arc;

use zeroize::Zeroizing;

use super::{
    GenerateKeyResult, KmsPlugin, SignResult, UnwrapKeyResult, VerifyResult, WrapKeyResult,
};
use crate::{
    crypto::{Algorithm, CryptoProvider, KeyUsage},
    encoding,
    error::{KmsError, Result},
    registry::{Controller, KeyId, KeyRecord, KeyRegistry, KeyType},
};

pub const LOCAL_PLUGIN_ID: &str = "local";

/// Raw keys handed to wrap, and recovered by unwrap, are treated as
/// AES-GCM-256 material. The length is informational; the provider
/// records the real one.
const DATA_KEY_ALGORITHM: Algorithm = Algorithm::AesGcm { length: 256 };

/// Capability plugin backed by the shared registry and a crypto provider.
pub struct LocalKmsPlugin {
    registry: Arc<KeyRegistry>,
    provider: Arc<dyn CryptoProvider>,
}

fn require_key_id<'a>(field: &str, key_id: &'a str) -> Result<&'a str> {
    if key_id.is_empty() {
        return Err(KmsError::invalid_argument(field, "must be a non-empty string."));
    }
    Ok(key_id)
}

fn require_aes_kw(record: &KeyRecord) -> Result<()> {
    match record.handle().algorithm() {
        Algorithm::AesKw { .. } => Ok(()),
        other => Err(KmsError::UnsupportedAlgorithm(other.name().to_owned())),
    }
}

fn require_hmac(record: &KeyRecord) -> Result<()> {
    match record.handle().algorithm() {
        Algorithm::Hmac { .. } => Ok(()),
        other => Err(KmsError::UnsupportedAlgorithm(other.name().to_owned())),
    }
}

impl LocalKmsPlugin {
    pub fn new(registry: Arc<KeyRegistry>, provider: Arc<dyn CryptoProvider>) -> Self {
        Self { registry, provider }
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }
}

impl KmsPlugin for LocalKmsPlugin {
    fn id(&self) -> &str {
        LOCAL_PLUGIN_ID
    }

    fn generate_key(
        &self,
        controller: &Controller,
        key_id: &str,
        key_type: &str,
    ) -> Result<GenerateKeyResult> {
        let key_id = require_key_id("keyId", key_id)?;
        let key_type: KeyType = key_type.parse()?;

        // Skip generation for ids that are already taken; `register`
        // below still settles concurrent races.
        if self.registry.contains(key_id) {
            return Err(KmsError::AlreadyExists(key_id.to_owned()));
        }

        let handle = self
            .provider
            .generate_key(key_type.algorithm(), false, key_type.usages())?;
        self.registry.register(
            KeyId(key_id.to_owned()),
            controller.clone(),
            key_type,
            handle,
        )?;

        log::info!("generated {key_type} \"{key_id}\" for {controller}");
        Ok(GenerateKeyResult {
            id: key_id.to_owned(),
        })
    }

    fn wrap_key(
        &self,
        controller: &Controller,
        kek_id: &str,
        unwrapped_key: &str,
    ) -> Result<WrapKeyResult> {
        let kek_id = require_key_id("keyId", kek_id)?;
        let raw = Zeroizing::new(encoding::decode("operation.unwrappedKey", unwrapped_key)?);

        let kek = self.registry.authorize(kek_id, controller)?;
        require_aes_kw(&kek)?;

        // Extractable only so it can be wrapped; dropped right after.
        let key = self
            .provider
            .import_raw_key(&raw, DATA_KEY_ALGORITHM, true, &[KeyUsage::Encrypt])?;
        let wrapped = self.provider.wrap_key(&key, kek.handle())?;

        Ok(WrapKeyResult {
            wrapped_key: encoding::encode(&wrapped),
        })
    }

    fn unwrap_key(
        &self,
        controller: &Controller,
        kek_id: &str,
        wrapped_key: &str,
    ) -> Result<UnwrapKeyResult> {
        let kek_id = require_key_id("keyId", kek_id)?;
        let wrapped = encoding::decode("operation.wrappedKey", wrapped_key)?;

        let kek = self.registry.authorize(kek_id, controller)?;
        let algorithm = match kek.handle().algorithm() {
            Algorithm::AesKw { .. } => DATA_KEY_ALGORITHM,
            other => return Err(KmsError::UnsupportedAlgorithm(other.name().to_owned())),
        };

        let key = self.provider.unwrap_key(
            &wrapped,
            kek.handle(),
            algorithm,
            true,
            &[KeyUsage::Encrypt],
        )?;
        let raw = self.provider.export_raw_key(&key)?;

        Ok(UnwrapKeyResult {
            unwrapped_key: encoding::encode(&raw),
        })
    }

    fn sign(&self, controller: &Controller, key_id: &str, verify_data: &str) -> Result<SignResult> {
        let key_id = require_key_id("keyId", key_id)?;
        let data = encoding::decode("operation.verifyData", verify_data)?;

        let record = self.registry.authorize(key_id, controller)?;
        require_hmac(&record)?;

        let signature = self.provider.sign(record.handle(), &data)?;
        Ok(SignResult {
            signature_value: encoding::encode(&signature),
        })
    }

    fn verify(
        &self,
        controller: &Controller,
        key_id: &str,
        verify_data: &str,
        signature_value: &str,
    ) -> Result<VerifyResult> {
        let key_id = require_key_id("keyId", key_id)?;
        let data = encoding::decode("operation.verifyData", verify_data)?;
        let signature = encoding::decode("operation.signatureValue", signature_value)?;

        let record = self.registry.authorize(key_id, controller)?;
        require_hmac(&record)?;

        let verified = self.provider.verify(record.handle(), &signature, &data)?;
        Ok(VerifyResult { verified })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::crypto::{KeyHandle, SoftwareCryptoProvider};

    /// Delegates to the software provider and counts every call.
    #[derive(Default)]
    struct CountingProvider {
        inner: SoftwareCryptoProvider,
        calls: AtomicUsize,
    }

    impl CountingProvider {
        fn tick(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CryptoProvider for CountingProvider {
        fn generate_key(&self, a: Algorithm, e: bool, u: &[KeyUsage]) -> anyhow::Result<KeyHandle> {
            self.tick();
            self.inner.generate_key(a, e, u)
        }
        fn import_raw_key(
            &self,
            raw: &[u8],
            a: Algorithm,
            e: bool,
            u: &[KeyUsage],
        ) -> anyhow::Result<KeyHandle> {
            self.tick();
            self.inner.import_raw_key(raw, a, e, u)
        }
        fn export_raw_key(&self, k: &KeyHandle) -> anyhow::Result<Zeroizing<Vec<u8>>> {
            self.tick();
            self.inner.export_raw_key(k)
        }
        fn wrap_key(&self, k: &KeyHandle, w: &KeyHandle) -> anyhow::Result<Vec<u8>> {
            self.tick();
            self.inner.wrap_key(k, w)
        }
        fn unwrap_key(
            &self,
            c: &[u8],
            w: &KeyHandle,
            a: Algorithm,
            e: bool,
            u: &[KeyUsage],
        ) -> anyhow::Result<KeyHandle> {
            self.tick();
            self.inner.unwrap_key(c, w, a, e, u)
        }
        fn sign(&self, k: &KeyHandle, d: &[u8]) -> anyhow::Result<Vec<u8>> {
            self.tick();
            self.inner.sign(k, d)
        }
        fn verify(&self, k: &KeyHandle, s: &[u8], d: &[u8]) -> anyhow::Result<bool> {
            self.tick();
            self.inner.verify(k, s, d)
        }
        fn encrypt(&self, k: &KeyHandle, p: &[u8]) -> anyhow::Result<Vec<u8>> {
            self.tick();
            self.inner.encrypt(k, p)
        }
        fn decrypt(&self, k: &KeyHandle, c: &[u8]) -> anyhow::Result<Vec<u8>> {
            self.tick();
            self.inner.decrypt(k, c)
        }
    }

    fn setup() -> (LocalKmsPlugin, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider::default());
        let plugin = LocalKmsPlugin::new(Arc::new(KeyRegistry::new()), provider.clone());
        (plugin, provider)
    }

    fn alice() -> Controller {
        Controller::new("alice")
    }

    #[test]
    fn generate_registers_non_extractable_key() {
        let (plugin, _) = setup();
        let out = plugin.generate_key(&alice(), "k1", "hmac-signing-key").unwrap();
        assert_eq!(out.id, "k1");

        let record = plugin.registry().lookup("k1").unwrap();
        assert_eq!(record.controller(), &alice());
        assert_eq!(record.key_type(), KeyType::HmacSigningKey);
        assert!(!record.handle().extractable());
    }

    #[test]
    fn generate_rejects_unknown_type_without_provider_call() {
        let (plugin, provider) = setup();
        let err = plugin.generate_key(&alice(), "k1", "rsa-key").unwrap_err();
        assert!(matches!(err, KmsError::UnsupportedKeyType(ref t) if t == "rsa-key"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(plugin.registry().is_empty());
    }

    #[test]
    fn generate_twice_is_already_exists() {
        let (plugin, _) = setup();
        plugin.generate_key(&alice(), "k1", "hmac-signing-key").unwrap();
        let err = plugin
            .generate_key(&Controller::new("bob"), "k1", "symmetric-wrap-key")
            .unwrap_err();
        assert!(matches!(err, KmsError::AlreadyExists(_)));
        assert_eq!(plugin.registry().lookup("k1").unwrap().controller(), &alice());
    }

    #[test]
    fn malformed_payload_never_reaches_provider() {
        let (plugin, provider) = setup();
        plugin.generate_key(&alice(), "k1", "hmac-signing-key").unwrap();
        let before = provider.calls.load(Ordering::SeqCst);

        let err = plugin.sign(&alice(), "k1", "not base64!").unwrap_err();
        assert!(matches!(
            err,
            KmsError::InvalidArgument { ref field, .. } if field == "operation.verifyData"
        ));

        let err = plugin.verify(&alice(), "k1", "aGVsbG8", "%%%").unwrap_err();
        assert!(matches!(
            err,
            KmsError::InvalidArgument { ref field, .. } if field == "operation.signatureValue"
        ));

        let err = plugin.sign(&alice(), "", "aGVsbG8").unwrap_err();
        assert!(matches!(err, KmsError::InvalidArgument { ref field, .. } if field == "keyId"));

        assert_eq!(provider.calls.load(Ordering::SeqCst), before);
    }

    #[test]
    fn sign_then_verify() {
        let (plugin, _) = setup();
        plugin.generate_key(&alice(), "k1", "hmac-signing-key").unwrap();

        let sig = plugin.sign(&alice(), "k1", "aGVsbG8").unwrap().signature_value;
        assert!(plugin.verify(&alice(), "k1", "aGVsbG8", &sig).unwrap().verified);
        assert!(!plugin.verify(&alice(), "k1", "d29ybGQ", &sig).unwrap().verified);
        assert!(!plugin.verify(&alice(), "k1", "aGVsbG8", "AAAA").unwrap().verified);

        // Swap the final symbol for one that changes the last data bits and
        // sets the unused trailing bits.
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        assert_eq!(sig.len(), 43);
        let last = sig.as_bytes()[42];
        let idx = ALPHABET.iter().position(|&c| c == last).unwrap();
        let mut tampered = sig[..42].to_owned();
        tampered.push(ALPHABET[(((idx >> 2) ^ 1) << 2) | 1] as char);
        assert!(!plugin.verify(&alice(), "k1", "aGVsbG8", &tampered).unwrap().verified);
    }

    #[test]
    fn wrap_then_unwrap() {
        let (plugin, _) = setup();
        plugin.generate_key(&alice(), "kek1", "symmetric-wrap-key").unwrap();
        let raw: Vec<u8> = (0u8..32).collect();

        let wrapped = plugin
            .wrap_key(&alice(), "kek1", &encoding::encode(&raw))
            .unwrap()
            .wrapped_key;
        let unwrapped = plugin.unwrap_key(&alice(), "kek1", &wrapped).unwrap().unwrapped_key;
        assert_eq!(encoding::decode("k", &unwrapped).unwrap(), raw);

        // Transient import is not registered.
        assert_eq!(plugin.registry().len(), 1);
    }

    #[test]
    fn foreign_controller_gets_not_found() {
        let (plugin, _) = setup();
        plugin.generate_key(&alice(), "kek1", "symmetric-wrap-key").unwrap();
        let bob = Controller::new("bob");

        let err = plugin.wrap_key(&bob, "kek1", "AAAAAAAAAAAAAAAAAAAAAA").unwrap_err();
        assert!(matches!(err, KmsError::NotFound(ref id) if id == "kek1"));
    }

    #[test]
    fn algorithm_policy_is_enforced() {
        let (plugin, _) = setup();
        plugin.generate_key(&alice(), "hmac", "hmac-signing-key").unwrap();
        plugin.generate_key(&alice(), "kek", "symmetric-wrap-key").unwrap();

        let err = plugin.unwrap_key(&alice(), "hmac", "AAAA").unwrap_err();
        assert!(matches!(err, KmsError::UnsupportedAlgorithm(ref a) if a == "HMAC"));

        let err = plugin.wrap_key(&alice(), "hmac", "AAAA").unwrap_err();
        assert!(matches!(err, KmsError::UnsupportedAlgorithm(_)));

        let err = plugin.sign(&alice(), "kek", "aGVsbG8").unwrap_err();
        assert!(matches!(err, KmsError::UnsupportedAlgorithm(ref a) if a == "AES-KW"));
    }

    #[test]
    fn provider_rejection_is_provider_failure() {
        let (plugin, _) = setup();
        plugin.generate_key(&alice(), "kek1", "symmetric-wrap-key").unwrap();

        // 5 bytes is not a valid AES key.
        let err = plugin.wrap_key(&alice(), "kek1", "AQIDBAU").unwrap_err();
        assert!(matches!(err, KmsError::ProviderFailure(_)));

        // Corrupt ciphertext.
        let err = plugin
            .unwrap_key(&alice(), "kek1", &encoding::encode(&[0u8; 40]))
            .unwrap_err();
        assert!(matches!(err, KmsError::ProviderFailure(_)));
    }
}
