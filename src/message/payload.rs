use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Opaque message body plus the content type it was encoded with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Payload {
    pub const BITCODE: &'static str = "application/x-bitcode";
    pub const JSON: &'static str = "application/json";
    pub const TEXT: &'static str = "text/plain; charset=utf-8";

    pub fn raw(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::raw(Self::TEXT, text.into().into_bytes())
    }

    /// Encode with bitcode (fast binary) serialization.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, bitcode::Error> {
        Ok(Self::raw(Self::BITCODE, bitcode::serialize(value)?))
    }

    /// Decode a bitcode payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.bytes)
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::raw(Self::JSON, serde_json::to_vec(value)?))
    }

    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.bytes)
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
