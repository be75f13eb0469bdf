use sha2::{Digest, Sha256};

use crate::TransferError;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Checks a segment payload against the digest its sender reported.
pub fn verify_checksum(index: u64, data: &[u8], expected: &str) -> Result<(), TransferError> {
    if checksum_bytes(data).eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(TransferError::ChecksumMismatch { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            checksum_bytes(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn verify_accepts_match_and_rejects_mismatch() {
        let digest = checksum_bytes(b"segment");
        assert!(verify_checksum(0, b"segment", &digest).is_ok());
        assert!(verify_checksum(0, b"segment", &digest.to_uppercase()).is_ok());

        let err = verify_checksum(4, b"tampered", &digest).unwrap_err();
        assert!(matches!(err, TransferError::ChecksumMismatch { index: 4 }));
    }
}
