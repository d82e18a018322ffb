//! Response classification.
//!
//! A response that made it back over the wire is not automatically a success:
//! a clean `400` is a transport success but usually a funnel failure. The
//! validator decides, from the status set a step accepts and whether the step
//! needs a JSON body, and hands back the decoded payload on success.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::Failure, transport::RawResponse};

/// Result of validating (or executing) one step.
pub type Outcome = Result<Payload, Failure>;

/// A validated response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// The step did not ask for decoding.
    Raw(Vec<u8>),
}

impl Payload {
    /// The body as JSON. Raw bodies are parsed leniently, so a step that did
    /// not require JSON can still extract from one that happens to be.
    pub fn json(&self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value.clone()),
            Payload::Raw(bytes) => serde_json::from_slice(bytes).ok(),
        }
    }
}

/// Status codes a step accepts.
///
/// `tolerated` holds codes that are not the happy path but must not count as
/// failures for this particular step, e.g. a `400` from registration when the
/// email is already taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedStatus {
    pub expected: Vec<u16>,
    #[serde(default)]
    pub tolerated: Vec<u16>,
}

impl Default for AcceptedStatus {
    fn default() -> Self {
        Self {
            expected: vec![200],
            tolerated: Vec::new(),
        }
    }
}

impl AcceptedStatus {
    pub fn contains(&self, status: u16) -> bool {
        self.expected.contains(&status) || self.tolerated.contains(&status)
    }

    fn all(&self) -> Vec<u16> {
        self.expected
            .iter()
            .chain(self.tolerated.iter())
            .copied()
            .collect()
    }
}

/// Classify `response` against what the step accepts.
pub fn validate(response: &RawResponse, accepted: &AcceptedStatus, decode_json: bool) -> Outcome {
    if !accepted.contains(response.status) {
        return Err(Failure::StatusMismatch {
            expected: accepted.all(),
            actual: response.status,
        });
    }

    if !decode_json {
        return Ok(Payload::Raw(response.body.clone()));
    }

    serde_json::from_slice::<Value>(&response.body)
        .map(Payload::Json)
        .map_err(|e| Failure::MalformedPayload(e.to_string()))
}
