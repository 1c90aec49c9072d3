// Bincode helpers shared by the store, the wire codec and the wallet file.
use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};

/// Serialize with bincode's standard configuration. Encoding is
/// deterministic, which the proof-of-work preimage depends on.
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| NodeError::Serialization(format!("Serialization failed: {e}")))
}

pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| NodeError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
    struct Sample {
        id: u64,
        tag: String,
        values: Vec<i32>,
    }

    #[test]
    fn test_serialize_deserialize() {
        let original = Sample {
            id: 42,
            tag: "utxo".to_string(),
            values: vec![1, 2, 3, 4, 5],
        };

        let serialized = serialize(&original).expect("Serialization should work");
        let deserialized: Sample = deserialize(&serialized).expect("Deserialization should work");

        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_deterministic_encoding() {
        let sample = Sample {
            id: 7,
            tag: "block".to_string(),
            values: vec![-1, 0, 1],
        };
        assert_eq!(serialize(&sample).unwrap(), serialize(&sample).unwrap());
    }

    #[test]
    fn test_deserialize_invalid_data() {
        let invalid_bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        let result: Result<Sample> = deserialize(&invalid_bytes);
        assert!(result.is_err());
    }
}
