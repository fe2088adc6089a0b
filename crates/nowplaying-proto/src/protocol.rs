use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::track::PlayingTrack;

/// `type` tag of the status request and of the status response.
pub const REQUEST_TYPE: &str = "get-currently-playing";
pub const RESPONSE_TYPE: &str = "currently-playing";

/// How the status request is spelled on the wire.  Deployments differ; the
/// remote service accepts whichever one it was built for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStyle {
    /// `{"type":"get-currently-playing"}`
    #[default]
    Structured,
    /// The bare text `currently-playing`.
    Plain,
}

/// Messages sent from the client to the listening service
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "get-currently-playing")]
    GetCurrentlyPlaying,
}

impl Request {
    /// Text frame payload for the given request style.
    pub fn encode(&self, style: RequestStyle) -> Result<String, serde_json::Error> {
        match (self, style) {
            (Request::GetCurrentlyPlaying, RequestStyle::Plain) => Ok(RESPONSE_TYPE.to_string()),
            (_, RequestStyle::Structured) => serde_json::to_string(self),
        }
    }
}

/// Messages received from the listening service.
///
/// Only the enveloped shape `{"type": ..., "data": ...}` is supported.  The
/// flat legacy shape (track fields at top level, `playing` flag) is rejected
/// as malformed.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    CurrentlyPlaying(PlayingTrack),
    /// Well-formed envelope of a type this client does not handle.
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no `type` envelope")]
    MissingType,

    #[error("`currently-playing` message without `data`")]
    MissingData,

    #[error("invalid track payload: {0}")]
    Track(serde_json::Error),

    #[error("unexpected binary frame ({0} bytes)")]
    Binary(usize),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Inbound {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let kind = envelope.kind.ok_or(DecodeError::MissingType)?;
        if kind != RESPONSE_TYPE {
            return Ok(Inbound::Other(kind));
        }
        let data = envelope.data.ok_or(DecodeError::MissingData)?;
        let track = serde_json::from_value(data).map_err(DecodeError::Track)?;
        Ok(Inbound::CurrentlyPlaying(track))
    }

    /// Server-side encoding, used by local test servers and tooling.
    pub fn encode_currently_playing(track: &PlayingTrack) -> Result<String, serde_json::Error> {
        serde_json::to_string(&serde_json::json!({
            "type": RESPONSE_TYPE,
            "data": track,
        }))
    }
}
