//! Record codecs: metadata as JSON, the chunk map as bincode.
//!
//! Metadata stays human-inspectable in the store; the chunk map is
//! binary-heavy and takes the compact encoding.

use super::StorageError;
use crate::chunk::Chunk;
use crate::task::TaskMetadata;

pub fn encode_metadata(meta: &TaskMetadata) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(meta).map_err(|e| StorageError::Codec(e.to_string()))
}

pub fn decode_metadata(raw: &[u8]) -> Result<TaskMetadata, StorageError> {
    serde_json::from_slice(raw).map_err(|e| StorageError::Codec(e.to_string()))
}

pub fn encode_chunks(chunks: &[Chunk]) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(chunks).map_err(|e| StorageError::Codec(e.to_string()))
}

pub fn decode_chunks(raw: &[u8]) -> Result<Vec<Chunk>, StorageError> {
    bincode::deserialize(raw).map_err(|e| StorageError::Codec(e.to_string()))
}
