//! Key parsing for the [`crate::xtea`]/[`crate::btea`] ciphers.
//!
//! Both ciphers key on four 32-bit words. Callers may supply a key as a
//! 32-hex-digit string, a 128-bit integer, or the four words directly; all
//! three forms are accepted from the same big-endian 16-byte buffer.

use crate::error::CryptoError;

/// The default XTEA key used by the game client when none is configured
/// (`plEncryptedStream::kEncDefault` in the original, "droid" key).
pub const DEFAULT_XTEA_KEY: [u32; 4] = [0x6C0A_5452, 0x0382_7D0F, 0x3A17_0B92, 0x16DB_7FC2];

/// A 128-bit block-cipher key, stored as four big-endian 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherKey(pub [u32; 4]);

impl CipherKey {
    /// Build a key directly from four words.
    pub fn from_words(words: [u32; 4]) -> Self {
        Self(words)
    }

    /// Parse a key from a 32-hex-digit string.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str.trim())?;
        Self::from_be_bytes(&bytes)
    }

    /// Parse a key from a 128-bit big-endian integer.
    pub fn from_u128(value: u128) -> Self {
        let bytes = value.to_be_bytes();
        // 16 bytes by construction; cannot fail.
        Self::from_be_bytes(&bytes).unwrap_or(Self([0; 4]))
    }

    /// Parse a key from a 16-byte big-endian buffer, grouped into four words.
    pub fn from_be_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 16 {
            return Err(CryptoError::InvalidKeySize {
                actual: bytes.len(),
            });
        }
        let mut words = [0u32; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let start = i * 4;
            *word = u32::from_be_bytes([
                bytes[start],
                bytes[start + 1],
                bytes[start + 2],
                bytes[start + 3],
            ]);
        }
        Ok(Self(words))
    }

    /// Serialize this key back to a 16-byte big-endian buffer.
    pub fn to_be_bytes(self) -> [u8; 16] {
        let mut out = [0u8; 16];
        for (i, word) in self.0.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// The four little-endian 32-bit words as written by manifest DB back-end
    /// B's `encryption.key` file, in the key's natural word order.
    pub fn to_le_words(self) -> [u32; 4] {
        self.0
    }
}

impl Default for CipherKey {
    fn default() -> Self {
        Self(DEFAULT_XTEA_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let key = CipherKey::from_hex("31415926535897932384626433832795").unwrap();
        assert_eq!(
            key.0,
            [0x3141_5926, 0x5358_9793, 0x2384_6264, 0x3383_2795]
        );
    }

    #[test]
    fn wrong_size_is_fatal() {
        let err = CipherKey::from_be_bytes(&[0u8; 15]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeySize { actual: 15 }));
    }

    #[test]
    fn default_key_matches_droid_constant() {
        assert_eq!(CipherKey::default().0, DEFAULT_XTEA_KEY);
    }
}
