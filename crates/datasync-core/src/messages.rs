//! Protocol payloads
//!
//! Messages exchanged with the remote side of the synchronization protocol,
//! CBOR encoded.

use serde::{Deserialize, Serialize};

/// Announces a new message authentication code for this device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacUpdateMessage {
    /// The device's new CMAC
    #[serde(with = "serde_bytes")]
    pub cmac: Vec<u8>,
}

impl MacUpdateMessage {
    pub fn new(cmac: impl Into<Vec<u8>>) -> Self {
        Self { cmac: cmac.into() }
    }

    /// Encode message to CBOR bytes
    pub fn encode(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)?;
        Ok(bytes)
    }

    /// Decode message from CBOR bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmac_is_encoded_as_byte_string() {
        let msg = MacUpdateMessage::new(vec![0xde, 0xad, 0xbe, 0xef]);
        let bytes = msg.encode().unwrap();

        let value: ciborium::value::Value = ciborium::from_reader(bytes.as_slice()).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[0].0, ciborium::value::Value::Text("cmac".into()));
        assert_eq!(map[0].1, ciborium::value::Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]));

        assert_eq!(MacUpdateMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_empty_cmac() {
        let msg = MacUpdateMessage::new(Vec::new());
        let decoded = MacUpdateMessage::decode(&msg.encode().unwrap()).unwrap();
        assert!(decoded.cmac.is_empty());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(MacUpdateMessage::decode(&[0xff, 0x00]).is_err());
        assert!(MacUpdateMessage::decode(&[]).is_err());
    }
}
