use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::ws::WsError;

/// Tagged frame carried on a live feed: `{ "type": "...", "payload": ... }`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new<S: Into<String>>(message_type: S, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }
}

/// Borrowing form used when sending, so callers do not have to build a [`Value`] first.
#[derive(Serialize)]
pub(crate) struct OutgoingEnvelope<'env, P: Serialize> {
    #[serde(rename = "type")]
    pub message_type: &'env str,
    pub payload: &'env P,
}

/// Parse a frame holding one envelope or an array of envelopes.
///
/// Blank frames (keepalives) yield nothing.
pub fn parse_envelopes(bytes: &[u8]) -> Result<Vec<Envelope>> {
    let trimmed = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(&[][..], |start| &bytes[start..]);

    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let parsed = if trimmed.first() == Some(&b'[') {
        serde_json::from_slice::<Vec<Envelope>>(trimmed)
    } else {
        serde_json::from_slice::<Envelope>(trimmed).map(|envelope| vec![envelope])
    };

    parsed.map_err(|e| WsError::MessageParse(e).into())
}
