use serde_json::{Map, Value};

use crate::error::{KmsError, Result};

pub const KEY_CREATION_TYPE: &str = "GenerateKeyOperation";
const OPERATION_SUFFIX: &str = "Operation";
const MUST_BE_STRING: &str = "must be a string.";

/// A parsed operation body. Only the top-level shape is checked here;
/// individual fields are validated when a handler asks for them.
#[derive(Debug, Clone)]
pub struct OperationEnvelope {
    op_type: String,
    fields: Map<String, Value>,
}

impl OperationEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| KmsError::MalformedRequest(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(KmsError::MalformedRequest(
                "operation must be a JSON object".into(),
            ));
        };
        let op_type = match fields.get("type") {
            Some(Value::String(t)) => t.clone(),
            _ => return Err(KmsError::invalid_argument("operation.type", MUST_BE_STRING)),
        };
        Ok(Self { op_type, fields })
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn is_key_creation(&self) -> bool {
        self.op_type == KEY_CREATION_TYPE
    }

    /// `invocationTarget` of a non-creation operation.
    pub fn target_key_id(&self) -> Result<&str> {
        match self.fields.get("invocationTarget") {
            Some(Value::String(id)) => Ok(id),
            _ => Err(KmsError::invalid_argument(
                "operation.invocationTarget",
                MUST_BE_STRING,
            )),
        }
    }

    /// `invocationTarget.id` of a creation operation.
    pub fn new_key_id(&self) -> Result<&str> {
        self.target_descriptor("id")
    }

    /// `invocationTarget.type` of a creation operation.
    pub fn new_key_type(&self) -> Result<&str> {
        self.target_descriptor("type")
    }

    fn target_descriptor(&self, name: &str) -> Result<&str> {
        self.fields
            .get("invocationTarget")
            .and_then(|target| target.get(name))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                KmsError::invalid_argument(
                    format!("operation.invocationTarget.{name}"),
                    MUST_BE_STRING,
                )
            })
    }

    pub fn string_field(&self, name: &str) -> Result<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| KmsError::invalid_argument(format!("operation.{name}"), MUST_BE_STRING))
    }

    pub fn capability_method_name(&self) -> Result<String> {
        method_name(&self.op_type)
    }
}

/// `WrapKeyOperation` -> `wrapKey`. Names that would start with `_` are
/// refused.
pub fn method_name(op_type: &str) -> Result<String> {
    let stem = op_type
        .strip_suffix(OPERATION_SUFFIX)
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| {
            KmsError::invalid_argument(
                "operation.type",
                format!("must end in \"{OPERATION_SUFFIX}\"."),
            )
        })?;

    let mut chars = stem.chars();
    let mut method = String::with_capacity(stem.len());
    if let Some(first) = chars.next() {
        method.extend(first.to_lowercase());
    }
    method.extend(chars);

    if method.starts_with('_') {
        return Err(KmsError::invalid_argument("method", MUST_BE_STRING));
    }
    Ok(method)
}
