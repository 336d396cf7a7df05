use serde::Serialize;

use super::table::OperationOutput;
use crate::error::KmsError;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    InternalError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::NotFound => 404,
            Status::Conflict => 409,
            Status::InternalError => 500,
        }
    }

    pub fn class(self) -> StatusClass {
        match self {
            Status::Ok => StatusClass::Success,
            Status::InternalError => StatusClass::ServerError,
            _ => StatusClass::ClientError,
        }
    }
}

impl From<&KmsError> for Status {
    fn from(err: &KmsError) -> Self {
        match err {
            KmsError::InvalidArgument { .. }
            | KmsError::MalformedRequest(_)
            | KmsError::UnsupportedKeyType(_)
            | KmsError::UnsupportedAlgorithm(_)
            | KmsError::UnsupportedOperation(_)
            | KmsError::UnknownPlugin(_) => Status::BadRequest,
            KmsError::AuthenticationFailed(_) => Status::Unauthorized,
            KmsError::NotFound(_) => Status::NotFound,
            KmsError::AlreadyExists(_) => Status::Conflict,
            KmsError::ProviderFailure(_) => Status::InternalError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub json: bool,
    pub content_type: &'static str,
}

impl Default for ResponseMetadata {
    fn default() -> Self {
        Self {
            json: true,
            content_type: JSON_CONTENT_TYPE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub name: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Result(OperationOutput),
    Error(ErrorBody),
}

/// What the transport sends back: status, metadata and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmsResponse {
    pub status: Status,
    pub metadata: ResponseMetadata,
    pub body: ResponseBody,
}

impl KmsResponse {
    pub fn ok(output: OperationOutput) -> Self {
        Self {
            status: Status::Ok,
            metadata: ResponseMetadata::default(),
            body: ResponseBody::Result(output),
        }
    }

    pub fn from_error(err: &KmsError) -> Self {
        Self {
            status: Status::from(err),
            metadata: ResponseMetadata::default(),
            body: ResponseBody::Error(ErrorBody {
                name: err.name(),
                message: err.to_string(),
            }),
        }
    }

    pub fn output(&self) -> Option<&OperationOutput> {
        match &self.body {
            ResponseBody::Result(out) => Some(out),
            ResponseBody::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match &self.body {
            ResponseBody::Error(e) => Some(e),
            ResponseBody::Result(_) => None,
        }
    }

    pub fn body_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.body)
    }
}
