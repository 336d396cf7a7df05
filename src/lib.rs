pub mod auth;
pub mod client;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod encoding;
pub mod error;
pub mod plugin;
pub mod registry;

use std::sync::Arc;

pub use auth::{
    HmacRequestSigner, HttpSignatureAuthenticator, InboundRequest, RequestAuthenticator,
    SharedSecretVerifier, SignatureVerifier,
};
pub use client::KmsClient;
pub use config::Config;
pub use crypto::{CryptoProvider, SoftwareCryptoProvider};
pub use dispatch::{KmsResponse, KmsService, Status, StatusClass};
pub use error::{KmsError, Result};
pub use plugin::{KmsPlugin, LOCAL_PLUGIN_ID, LocalKmsPlugin};
pub use registry::{Controller, KeyRegistry, KeyType};

use plugin::PluginRegistry;

/// Set up `env_logger` once; later calls are no-ops. Honours `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

pub struct KmsBuilder {
    config: Config,
    registry: Arc<KeyRegistry>,
    provider: Arc<dyn CryptoProvider>,
    authenticator: Option<Box<dyn RequestAuthenticator>>,
    plugins: Vec<Arc<dyn KmsPlugin>>,
}

impl KmsBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Arc::new(KeyRegistry::new()),
            provider: Arc::new(SoftwareCryptoProvider::new()),
            authenticator: None,
            plugins: Vec::new(),
        }
    }

    /// Read the configuration from `KMS_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(Config::from_env()?))
    }

    pub fn provider(mut self, provider: Arc<dyn CryptoProvider>) -> Self {
        self.provider = provider;
        self
    }

    /// Use a custom authenticator. The signature settings in `Config` do
    /// not apply to it; see [`KmsBuilder::signature_verifier`].
    pub fn authenticator(mut self, authenticator: impl RequestAuthenticator) -> Self {
        self.authenticator = Some(Box::new(authenticator));
        self
    }

    /// Authenticate with HTTP signatures checked by `verifier`, using the
    /// builder's signed-header, age and skew settings.
    pub fn signature_verifier(self, verifier: impl SignatureVerifier) -> Self {
        let authenticator = HttpSignatureAuthenticator::from_config(verifier, &self.config);
        self.authenticator(authenticator)
    }

    /// Extra plugins must write to [`KmsBuilder::registry`] for creation
    /// operations to succeed.
    pub fn plugin(mut self, plugin: Arc<dyn KmsPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn registry(&self) -> Arc<KeyRegistry> {
        self.registry.clone()
    }

    pub fn build(self) -> anyhow::Result<KmsService> {
        let authenticator = self
            .authenticator
            .ok_or_else(|| anyhow::anyhow!("no request authenticator configured"))?;

        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(LocalKmsPlugin::new(
            self.registry.clone(),
            self.provider,
        )));
        for plugin in self.plugins {
            if let Some(old) = plugins.register(plugin) {
                log::warn!("plugin \"{}\" replaced", old.id());
            }
        }
        anyhow::ensure!(
            plugins.contains(&self.config.default_plugin),
            "default plugin \"{}\" is not registered",
            self.config.default_plugin
        );

        log::info!(
            "kms service ready (plugins: {})",
            plugins.ids().collect::<Vec<_>>().join(", ")
        );
        Ok(KmsService::new(
            self.config,
            self.registry,
            plugins,
            authenticator,
        ))
    }
}
