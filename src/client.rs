use std::sync::Arc;

use zeroize::Zeroizing;

use crate::{
    encoding,
    error::Result,
    plugin::KmsPlugin,
    registry::{Controller, KeyType},
};

/// Calls a plugin directly as a fixed controller, taking and returning raw
/// bytes instead of base64url text.
pub struct KmsClient {
    plugin: Arc<dyn KmsPlugin>,
    controller: Controller,
}

impl KmsClient {
    pub fn new(plugin: Arc<dyn KmsPlugin>, controller: Controller) -> Self {
        Self { plugin, controller }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn plugin_id(&self) -> &str {
        self.plugin.id()
    }

    pub fn generate_key(&self, key_id: &str, key_type: KeyType) -> Result<String> {
        let out = self
            .plugin
            .generate_key(&self.controller, key_id, key_type.as_str())?;
        Ok(out.id)
    }

    /// Returns the base64url wrapped key.
    pub fn wrap_key(&self, kek_id: &str, key: &[u8]) -> Result<String> {
        let unwrapped = Zeroizing::new(encoding::encode(key));
        let out = self.plugin.wrap_key(&self.controller, kek_id, &unwrapped)?;
        Ok(out.wrapped_key)
    }

    pub fn unwrap_key(&self, kek_id: &str, wrapped_key: &str) -> Result<Zeroizing<Vec<u8>>> {
        let out = self
            .plugin
            .unwrap_key(&self.controller, kek_id, wrapped_key)?;
        let encoded = Zeroizing::new(out.unwrapped_key);
        encoding::decode("unwrappedKey", &encoded).map(Zeroizing::new)
    }

    /// Returns the base64url signature.
    pub fn sign(&self, key_id: &str, data: &[u8]) -> Result<String> {
        let out = self
            .plugin
            .sign(&self.controller, key_id, &encoding::encode(data))?;
        Ok(out.signature_value)
    }

    pub fn verify(&self, key_id: &str, data: &[u8], signature: &str) -> Result<bool> {
        let out = self
            .plugin
            .verify(&self.controller, key_id, &encoding::encode(data), signature)?;
        Ok(out.verified)
    }
}
