//! Payload encoding for queued mutations.
//!
//! Payloads are JSON. The strict functions report failures; the lenient ones
//! log them and fall back to an empty payload or a default value.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Like [`encode`], but yields an empty payload on failure.
pub fn encode_lenient<T: Serialize>(value: &T) -> Vec<u8> {
    encode(value).unwrap_or_else(|e| {
        tracing::warn!("Failed to encode payload, storing empty payload: {}", e);
        Vec::new()
    })
}

/// Like [`decode`], but yields `T::default()` on failure.
pub fn decode_lenient<T: DeserializeOwned + Default>(bytes: &[u8]) -> T {
    decode(bytes).unwrap_or_else(|e| {
        tracing::warn!("Failed to decode {} byte payload, using default: {}", bytes.len(), e);
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    #[test]
    fn test_encode_decode_user() {
        let user = User::new("ann");
        let bytes = encode(&user).unwrap();
        let decoded: User = decode(&bytes).unwrap();
        assert_eq!(decoded, user);
    }

    #[test]
    fn test_decode_garbage_is_serialization_error() {
        let err = decode::<User>(b"not json").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_lenient_decode_falls_back_to_default() {
        let user: User = decode_lenient(b"{");
        assert_eq!(user, User::default());
        assert!(decode_lenient::<Vec<String>>(b"").is_empty());
    }
}
