//! # Pending-Write Codec
//!
//! Format: `[MAGIC:4][VERSION:1][CRC32:4][bincode(PendingWrite)]`.
//!
//! Anything that fails the magic, version, checksum or bincode check is
//! reported as `StoreError::Corrupt`, which the submitter treats as a cache
//! miss.

use crate::domain::{PendingWrite, StoreError};

/// Magic bytes for a cached pending write.
const PENDING_MAGIC: &[u8; 4] = b"PWPC";

/// Current encoding version.
const PENDING_VERSION: u8 = 1;

const HEADER_LEN: usize = 4 + 1 + 4;

/// Encode a pending write for the local store.
pub fn encode_pending(pending: &PendingWrite) -> Result<Vec<u8>, StoreError> {
    let body = bincode::serialize(pending).map_err(|e| StoreError::Encoding(e.to_string()))?;

    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(PENDING_MAGIC);
    buf.push(PENDING_VERSION);
    buf.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decode a pending write, verifying header and checksum.
pub fn decode_pending(data: &[u8]) -> Result<PendingWrite, StoreError> {
    if data.len() < HEADER_LEN {
        return Err(StoreError::Corrupt(format!(
            "entry too short: {} bytes",
            data.len()
        )));
    }
    if &data[0..4] != PENDING_MAGIC {
        return Err(StoreError::Corrupt("invalid magic".to_string()));
    }
    if data[4] != PENDING_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported version {}",
            data[4]
        )));
    }

    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&data[5..9]);
    let expected = u32::from_le_bytes(checksum);
    let body = &data[HEADER_LEN..];
    let actual = crc32fast::hash(body);
    if actual != expected {
        return Err(StoreError::Corrupt(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            expected, actual
        )));
    }

    bincode::deserialize(body).map_err(|e| StoreError::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentId, IdentityId, OperationId};

    fn sample() -> PendingWrite {
        PendingWrite {
            operation_id: OperationId::from_bytes([1; 32]),
            document_id: DocumentId::from_bytes([2; 32]),
            identity: IdentityId::from_bytes([3; 32]),
            sequence: 9,
            signed_payload: vec![0xDE, 0xAD, 0xBE, 0xEF],
            cached_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_encode_decode() {
        let encoded = encode_pending(&sample()).unwrap();
        assert_eq!(&encoded[0..4], PENDING_MAGIC);
        assert_eq!(decode_pending(&encoded).unwrap(), sample());
    }

    #[test]
    fn test_flipped_bit_is_corrupt() {
        let mut encoded = encode_pending(&sample()).unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0x01;
        assert!(matches!(
            decode_pending(&encoded),
            Err(StoreError::Corrupt(msg)) if msg.contains("checksum")
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let mut encoded = encode_pending(&sample()).unwrap();
        encoded[0] = b'X';
        assert!(decode_pending(&encoded).is_err());
    }

    #[test]
    fn test_unknown_version() {
        let mut encoded = encode_pending(&sample()).unwrap();
        encoded[4] = 99;
        assert!(matches!(
            decode_pending(&encoded),
            Err(StoreError::Corrupt(msg)) if msg.contains("version")
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(decode_pending(b"PWP").is_err());
        let encoded = encode_pending(&sample()).unwrap();
        assert!(decode_pending(&encoded[..encoded.len() - 2]).is_err());
    }
}
