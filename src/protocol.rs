/// Request and response objects at the queue boundary
///
/// One JSON object per message. Requests are validated here so the engine
/// only ever sees a well-formed id and the payload text.
use crate::config::types::{Classification, ExecutionResult, Result, SnekboxError};
use serde::{Deserialize, Serialize};

/// Longest accepted request id
pub const MAX_ID_LEN: usize = 128;

/// Inbound execution request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SnekRequest {
    /// Addresses the reply destination
    #[serde(alias = "snekid")]
    pub id: String,
    /// Python source to execute
    #[serde(alias = "message")]
    pub code: String,
}

impl SnekRequest {
    /// Parse and validate one JSON request.
    pub fn from_json(line: &str) -> Result<Self> {
        let request: SnekRequest = serde_json::from_str(line)?;
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(SnekboxError::Protocol("request id is empty".to_string()));
        }
        if self.id.len() > MAX_ID_LEN {
            return Err(SnekboxError::Protocol(format!(
                "request id exceeds {} characters",
                MAX_ID_LEN
            )));
        }
        if let Some(c) = self
            .id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(SnekboxError::Protocol(format!(
                "request id contains invalid character {:?}",
                c
            )));
        }
        Ok(())
    }

    /// Payload with surrounding whitespace removed
    pub fn payload(&self) -> &str {
        self.code.trim()
    }
}

/// Outbound result, keyed by the request id
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SnekResponse {
    pub id: String,
    pub returncode: Option<i32>,
    pub classification: Classification,
    pub output: String,
}

impl SnekResponse {
    pub fn new(id: impl Into<String>, result: ExecutionResult) -> Self {
        Self {
            id: id.into(),
            returncode: result.returncode,
            classification: result.classification,
            output: result.output,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
