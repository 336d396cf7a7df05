pub mod local;

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;

use crate::{error::Result, registry::Controller};

pub use local::{LOCAL_PLUGIN_ID, LocalKmsPlugin};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateKeyResult {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WrapKeyResult {
    pub wrapped_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnwrapKeyResult {
    pub unwrapped_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResult {
    pub signature_value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerifyResult {
    pub verified: bool,
}

/// The five key capabilities a plugin must provide.
///
/// Binary arguments arrive base64url-encoded, exactly as they appear in
/// the operation envelope; implementations validate them before touching
/// the registry or the crypto provider.
pub trait KmsPlugin: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn generate_key(
        &self,
        controller: &Controller,
        key_id: &str,
        key_type: &str,
    ) -> Result<GenerateKeyResult>;

    fn wrap_key(
        &self,
        controller: &Controller,
        kek_id: &str,
        unwrapped_key: &str,
    ) -> Result<WrapKeyResult>;

    fn unwrap_key(
        &self,
        controller: &Controller,
        kek_id: &str,
        wrapped_key: &str,
    ) -> Result<UnwrapKeyResult>;

    fn sign(&self, controller: &Controller, key_id: &str, verify_data: &str) -> Result<SignResult>;

    fn verify(
        &self,
        controller: &Controller,
        key_id: &str,
        verify_data: &str,
        signature_value: &str,
    ) -> Result<VerifyResult>;
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn KmsPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the plugin previously registered under the same id.
    pub fn register(&mut self, plugin: Arc<dyn KmsPlugin>) -> Option<Arc<dyn KmsPlugin>> {
        self.plugins.insert(plugin.id().to_owned(), plugin)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn KmsPlugin>> {
        self.plugins.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}
