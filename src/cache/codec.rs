//! Value codec
//!
//! Turns typed values into stored payloads: `serde_json` first, then LZ4 when
//! the policy asks for compression.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::compression::{CompressionAlgorithm, CompressionConfig, CompressionManager};
use super::policy::CachePolicy;
use crate::error::Result;

/// Serializer plus optional compression
pub struct ValueCodec {
    compression: CompressionManager,
}

impl ValueCodec {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            compression: CompressionManager::with_config(config),
        }
    }

    /// Encode a value for storage under `policy`
    pub fn encode<T: Serialize>(
        &self,
        value: &T,
        policy: &CachePolicy,
    ) -> Result<(Bytes, CompressionAlgorithm)> {
        let raw = serde_json::to_vec(value)?;
        if policy.compress {
            Ok(self.compression.compress(&raw))
        } else {
            Ok((Bytes::from(raw), CompressionAlgorithm::None))
        }
    }

    /// Decode a stored payload
    pub fn decode<T: DeserializeOwned>(
        &self,
        payload: &[u8],
        compression: CompressionAlgorithm,
    ) -> Result<T> {
        let raw = self.compression.decompress(payload, compression)?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

/// Serde adapter storing payload bytes as a standard base64 string
pub mod base64_payload {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
