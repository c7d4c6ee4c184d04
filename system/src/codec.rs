use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire encoding chosen by a connection at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// serde_json in websocket text frames.
    #[default]
    Json,
    /// bincode in websocket binary frames.
    Bincode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("{codec:?} codec doesn't accept {kind} frames")]
    UnexpectedFrame { codec: Codec, kind: &'static str },
}

impl Codec {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Frame, CodecError> {
        match self {
            Codec::Json => Ok(Frame::Text(serde_json::to_string(value)?)),
            Codec::Bincode => Ok(Frame::Binary(bincode::serialize(value)?)),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, frame: &Frame) -> Result<T, CodecError> {
        match (self, frame) {
            (Codec::Json, Frame::Text(text)) => Ok(serde_json::from_str(text)?),
            (Codec::Bincode, Frame::Binary(bin)) => Ok(bincode::deserialize(bin)?),
            (codec, Frame::Text(_)) => Err(CodecError::UnexpectedFrame {
                codec: *codec,
                kind: "text",
            }),
            (codec, Frame::Binary(_)) => Err(CodecError::UnexpectedFrame {
                codec: *codec,
                kind: "binary",
            }),
        }
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Codec::Json),
            "bincode" => Ok(Codec::Bincode),
            other => Err(format!("unknown codec {}", other)),
        }
    }
}
