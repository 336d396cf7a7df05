//! The dispatch core.
//!
//! [`KmsService::handle`] is the only entry point a transport needs. It
//! authenticates the caller, parses the operation, checks ownership,
//! resolves the capability through a fixed table and maps every outcome
//! to a [`KmsResponse`]. Plugins never see the transport, and this module
//! is the only place errors become status codes.

pub mod envelope;
pub mod response;
pub mod table;

use std::{fmt, sync::Arc};

use crate::{
    auth::{InboundRequest, RequestAuthenticator},
    client::KmsClient,
    config::Config,
    error::{KmsError, Result},
    plugin::{KmsPlugin, PluginRegistry},
    registry::{Controller, KeyRegistry},
};

pub use envelope::OperationEnvelope;
pub use response::{ErrorBody, KmsResponse, ResponseBody, ResponseMetadata, Status, StatusClass};
pub use table::{Invocation, OperationOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Authenticating,
    Parsing,
    Authorizing,
    Invoking,
    Responding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Authenticating => "authenticating",
            Stage::Parsing => "parsing",
            Stage::Authorizing => "authorizing",
            Stage::Invoking => "invoking",
            Stage::Responding => "responding",
        };
        f.write_str(name)
    }
}

fn enter(stage: Stage, path: &str) {
    log::debug!("{path}: {stage}");
}

pub struct KmsService {
    config: Config,
    registry: Arc<KeyRegistry>,
    plugins: PluginRegistry,
    authenticator: Box<dyn RequestAuthenticator>,
}

impl KmsService {
    pub(crate) fn new(
        config: Config,
        registry: Arc<KeyRegistry>,
        plugins: PluginRegistry,
        authenticator: Box<dyn RequestAuthenticator>,
    ) -> Self {
        Self {
            config,
            registry,
            plugins,
            authenticator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The ownership registry shared with the bundled plugin.
    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    pub fn plugin(&self, id: &str) -> Option<&Arc<dyn KmsPlugin>> {
        self.plugins.get(id)
    }

    /// In-process client acting as `controller` on the default plugin.
    pub fn client(&self, controller: Controller) -> Result<KmsClient> {
        let plugin = self
            .plugin(&self.config.default_plugin)
            .ok_or_else(|| KmsError::UnknownPlugin(self.config.default_plugin.clone()))?;
        Ok(KmsClient::new(Arc::clone(plugin), controller))
    }

    /// Run one operation addressed to `plugin_id`.
    pub fn handle(&self, plugin_id: &str, request: &InboundRequest) -> KmsResponse {
        let response = match self.dispatch(plugin_id, request) {
            Ok(output) => KmsResponse::ok(output),
            Err(err) => {
                match Status::from(&err).class() {
                    StatusClass::ServerError => log::error!("{}: {err}", request.path),
                    _ => log::warn!("{}: {err}", request.path),
                }
                KmsResponse::from_error(&err)
            }
        };
        enter(Stage::Responding, &request.path);
        response
    }

    fn dispatch(&self, plugin_id: &str, request: &InboundRequest) -> Result<OperationOutput> {
        enter(Stage::Authenticating, &request.path);
        let controller = self.authenticator.authenticate(request)?;

        enter(Stage::Parsing, &request.path);
        if request.body.len() > self.config.max_body_bytes {
            return Err(KmsError::MalformedRequest(format!(
                "body exceeds {} bytes",
                self.config.max_body_bytes
            )));
        }
        let envelope = OperationEnvelope::parse(&request.body)?;
        let creating = envelope.is_key_creation();
        let key_id = if creating {
            let key_id = envelope.new_key_id()?;
            envelope.new_key_type()?;
            key_id
        } else {
            envelope.target_key_id()?
        };

        enter(Stage::Authorizing, &request.path);
        if creating {
            if self.registry.contains(key_id) {
                return Err(KmsError::AlreadyExists(key_id.to_owned()));
            }
        } else {
            self.registry.authorize(key_id, &controller)?;
        }

        let method = envelope.capability_method_name()?;
        let plugin = self
            .plugins
            .get(plugin_id)
            .ok_or_else(|| KmsError::UnknownPlugin(plugin_id.to_owned()))?;
        let capability = table::capability(&method)
            .ok_or_else(|| KmsError::UnsupportedOperation(method.clone()))?;

        enter(Stage::Invoking, &request.path);
        let output = capability.invoke(
            plugin.as_ref(),
            &Invocation {
                controller: &controller,
                key_id,
                envelope: &envelope,
            },
        )?;

        if creating {
            self.confirm_owner(key_id, &controller)?;
        }
        Ok(output)
    }

    /// A creating plugin must have bound the new key to the caller in the
    /// shared registry.
    fn confirm_owner(&self, key_id: &str, controller: &Controller) -> Result<()> {
        self.registry.authorize(key_id, controller).map(|_| ()).map_err(|_| {
            KmsError::ProviderFailure(anyhow::anyhow!(
                "plugin did not register \"{key_id}\" for {controller}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::SoftwareCryptoProvider,
        plugin::{
            GenerateKeyResult, LocalKmsPlugin, SignResult, UnwrapKeyResult, VerifyResult,
            WrapKeyResult,
        },
    };

    /// Trusts a plain `x-controller` header.
    struct HeaderAuthenticator;

    impl RequestAuthenticator for HeaderAuthenticator {
        fn authenticate(&self, request: &InboundRequest) -> Result<Controller> {
            request
                .header("x-controller")
                .map(Controller::new)
                .ok_or_else(|| KmsError::AuthenticationFailed("no controller".into()))
        }
    }

    /// Claims success without registering anything.
    struct ForgetfulPlugin;

    impl KmsPlugin for ForgetfulPlugin {
        fn id(&self) -> &str {
            "forgetful"
        }
        fn generate_key(&self, _: &Controller, key_id: &str, _: &str) -> Result<GenerateKeyResult> {
            Ok(GenerateKeyResult { id: key_id.into() })
        }
        fn wrap_key(&self, _: &Controller, _: &str, _: &str) -> Result<WrapKeyResult> {
            unreachable!()
        }
        fn unwrap_key(&self, _: &Controller, _: &str, _: &str) -> Result<UnwrapKeyResult> {
            unreachable!()
        }
        fn sign(&self, _: &Controller, _: &str, _: &str) -> Result<SignResult> {
            unreachable!()
        }
        fn verify(&self, _: &Controller, _: &str, _: &str, _: &str) -> Result<VerifyResult> {
            unreachable!()
        }
    }

    fn service() -> KmsService {
        let registry = Arc::new(KeyRegistry::new());
        let mut plugins = PluginRegistry::new();
        plugins.register(Arc::new(LocalKmsPlugin::new(
            registry.clone(),
            Arc::new(SoftwareCryptoProvider::new()),
        )));
        plugins.register(Arc::new(ForgetfulPlugin));
        KmsService::new(
            Config::default(),
            registry,
            plugins,
            Box::new(HeaderAuthenticator),
        )
    }

    fn post(controller: &str, body: &str) -> InboundRequest {
        InboundRequest::new("POST", "/kms/local/k")
            .with_header("x-controller", controller)
            .with_body(body)
    }

    const GENERATE_K1: &str = concat!(
        r#"{"type":"GenerateKeyOperation","#,
        r#""invocationTarget":{"id":"k1","type":"hmac-signing-key"}}"#,
    );

    #[test]
    fn generate_binds_caller() {
        let svc = service();
        let resp = svc.handle("local", &post("alice", GENERATE_K1));
        assert_eq!(resp.status, Status::Ok);
        assert_eq!(
            svc.registry().lookup("k1").unwrap().controller(),
            &Controller::new("alice")
        );
    }

    #[test]
    fn unauthenticated_is_401() {
        let svc = service();
        let req = InboundRequest::new("POST", "/kms/local/k").with_body(GENERATE_K1);
        assert_eq!(svc.handle("local", &req).status.code(), 401);
        assert!(svc.registry().is_empty());
    }

    #[test]
    fn body_limit_is_enforced() {
        let svc = service();
        let big = format!(r#"{{"type":"SignOperation","pad":"{}"}}"#, "a".repeat(70 * 1024));
        let resp = svc.handle("local", &post("alice", &big));
        assert_eq!(resp.error().map(|e| e.name), Some("MalformedRequest"));
    }

    #[test]
    fn non_creation_needs_string_target() {
        let svc = service();
        let resp = svc.handle(
            "local",
            &post("alice", r#"{"type":"SignOperation","invocationTarget":{"id":"k1"}}"#),
        );
        assert_eq!(resp.status.code(), 400);
    }

    #[test]
    fn unknown_plugin_and_method() {
        let svc = service();
        let resp = svc.handle("hsm", &post("alice", GENERATE_K1));
        assert_eq!(resp.error().map(|e| e.name), Some("UnknownPlugin"));

        svc.handle("local", &post("alice", GENERATE_K1));
        let resp = svc.handle(
            "local",
            &post("alice", r#"{"type":"RegistryOperation","invocationTarget":"k1"}"#),
        );
        assert_eq!(resp.error().map(|e| e.name), Some("UnsupportedOperation"));
        assert_eq!(
            resp.error().map(|e| e.message.as_str()),
            Some("Method \"registry\" is not supported.")
        );
    }

    #[test]
    fn missing_key_needs_no_plugin() {
        let svc = service();
        let resp = svc.handle(
            "local",
            &post(
                "alice",
                r#"{"type":"SignOperation","invocationTarget":"nope","verifyData":"aGVsbG8"}"#,
            ),
        );
        assert_eq!(resp.status, Status::NotFound);
    }

    #[test]
    fn unregistered_creation_is_server_error() {
        let svc = service();
        let resp = svc.handle("forgetful", &post("alice", GENERATE_K1));
        assert_eq!(resp.status.code(), 500);
        assert_eq!(resp.status.class(), StatusClass::ServerError);
    }

    #[test]
    fn client_uses_default_plugin() {
        let svc = service();
        let client = svc.client(Controller::new("alice")).unwrap();
        client.generate_key("k1", crate::registry::KeyType::HmacSigningKey).unwrap();
        let sig = client.sign("k1", b"hello").unwrap();
        assert!(client.verify("k1", b"hello", &sig).unwrap());
    }
}
