use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

use super::envelope::OperationEnvelope;
use crate::{
    error::Result,
    plugin::{
        GenerateKeyResult, KmsPlugin, SignResult, UnwrapKeyResult, VerifyResult, WrapKeyResult,
    },
    registry::Controller,
};

/// Successful result of any capability, serialized as the bare result
/// object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OperationOutput {
    GenerateKey(GenerateKeyResult),
    WrapKey(WrapKeyResult),
    UnwrapKey(UnwrapKeyResult),
    Sign(SignResult),
    Verify(VerifyResult),
}

/// Arguments common to every handler.
pub struct Invocation<'a> {
    pub controller: &'a Controller,
    pub key_id: &'a str,
    pub envelope: &'a OperationEnvelope,
}

type Handler = fn(&dyn KmsPlugin, &Invocation<'_>) -> Result<OperationOutput>;

#[derive(Clone, Copy)]
pub struct Capability {
    pub method: &'static str,
    handler: Handler,
}

impl Capability {
    pub fn invoke(
        &self,
        plugin: &dyn KmsPlugin,
        invocation: &Invocation<'_>,
    ) -> Result<OperationOutput> {
        (self.handler)(plugin, invocation)
    }
}

fn generate_key(plugin: &dyn KmsPlugin, inv: &Invocation<'_>) -> Result<OperationOutput> {
    let key_type = inv.envelope.new_key_type()?;
    plugin
        .generate_key(inv.controller, inv.key_id, key_type)
        .map(OperationOutput::GenerateKey)
}

fn wrap_key(plugin: &dyn KmsPlugin, inv: &Invocation<'_>) -> Result<OperationOutput> {
    let unwrapped_key = inv.envelope.string_field("unwrappedKey")?;
    plugin
        .wrap_key(inv.controller, inv.key_id, unwrapped_key)
        .map(OperationOutput::WrapKey)
}

fn unwrap_key(plugin: &dyn KmsPlugin, inv: &Invocation<'_>) -> Result<OperationOutput> {
    let wrapped_key = inv.envelope.string_field("wrappedKey")?;
    plugin
        .unwrap_key(inv.controller, inv.key_id, wrapped_key)
        .map(OperationOutput::UnwrapKey)
}

fn sign(plugin: &dyn KmsPlugin, inv: &Invocation<'_>) -> Result<OperationOutput> {
    let verify_data = inv.envelope.string_field("verifyData")?;
    plugin
        .sign(inv.controller, inv.key_id, verify_data)
        .map(OperationOutput::Sign)
}

fn verify(plugin: &dyn KmsPlugin, inv: &Invocation<'_>) -> Result<OperationOutput> {
    let verify_data = inv.envelope.string_field("verifyData")?;
    let signature_value = inv.envelope.string_field("signatureValue")?;
    plugin
        .verify(inv.controller, inv.key_id, verify_data, signature_value)
        .map(OperationOutput::Verify)
}

static CAPABILITIES: Lazy<HashMap<&'static str, Capability>> = Lazy::new(|| {
    let entries: [(&'static str, Handler); 5] = [
        ("generateKey", generate_key),
        ("wrapKey", wrap_key),
        ("unwrapKey", unwrap_key),
        ("sign", sign),
        ("verify", verify),
    ];
    entries
        .into_iter()
        .map(|(method, handler)| (method, Capability { method, handler }))
        .collect()
});

pub fn capability(method: &str) -> Option<&'static Capability> {
    CAPABILITIES.get(method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_closed() {
        for method in ["generateKey", "wrapKey", "unwrapKey", "sign", "verify"] {
            assert_eq!(capability(method).map(|c| c.method), Some(method));
        }
        for method in ["id", "registry", "_internal", "GenerateKey", ""] {
            assert!(capability(method).is_none(), "{method}");
        }
    }

    #[test]
    fn outputs_serialize_as_bare_results() {
        let out = OperationOutput::Sign(SignResult {
            signature_value: "c2ln".into(),
        });
        assert_eq!(
            serde_json::to_string(&out).unwrap(),
            r#"{"signatureValue":"c2ln"}"#
        );
        let out = OperationOutput::Verify(VerifyResult { verified: false });
        assert_eq!(serde_json::to_string(&out).unwrap(), r#"{"verified":false}"#);
    }
}
