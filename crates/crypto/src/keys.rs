use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// Raw key length in bytes
pub const KEY_LEN: usize = 32;

/// Ephemeral keypair for one tunnel session.
///
/// A fresh keypair is generated by the client for every connect and by the
/// exit node for every negotiation it terminates. The secret never leaves the
/// node that generated it.
#[derive(Clone)]
pub struct TunnelKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl TunnelKeypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a keypair from raw secret bytes
    pub fn from_secret_bytes(bytes: [u8; KEY_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key_bytes(&self) -> [u8; KEY_LEN] {
        self.public.to_bytes()
    }

    /// Public key as base64 text
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public.as_bytes())
    }

    /// Private key as base64 text, wiped from memory when dropped
    pub fn private_key_base64(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.secret.to_bytes());
        Zeroizing::new(STANDARD.encode(bytes.as_ref()))
    }
}

impl std::fmt::Debug for TunnelKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelKeypair")
            .field("public", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}

/// Parse a base64 public key received from a peer
pub fn parse_public_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;

    let actual = bytes.len();
    bytes.try_into().map_err(|_| CryptoError::InvalidLength {
        expected: KEY_LEN,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique() {
        let a = TunnelKeypair::generate();
        let b = TunnelKeypair::generate();
        assert_ne!(a.public_key_bytes(), b.public_key_bytes());
    }

    #[test]
    fn test_public_key_text_form() {
        let kp = TunnelKeypair::generate();
        let text = kp.public_key_base64();
        // 32 bytes -> 44 base64 characters with one '=' of padding
        assert_eq!(text.len(), 44);
        assert!(text.ends_with('='));
        assert_eq!(parse_public_key(&text).unwrap(), kp.public_key_bytes());
    }

    #[test]
    fn test_from_secret_bytes_deterministic() {
        let a = TunnelKeypair::from_secret_bytes([7u8; KEY_LEN]);
        let b = TunnelKeypair::from_secret_bytes([7u8; KEY_LEN]);
        assert_eq!(a.public_key_bytes(), b.public_key_bytes());
        assert_eq!(*a.private_key_base64(), *b.private_key_base64());
    }

    #[test]
    fn test_parse_invalid_base64() {
        let err = parse_public_key("not base64!!").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEncoding(_)));
    }

    #[test]
    fn test_parse_wrong_length() {
        let short = STANDARD.encode([1u8; 16]);
        assert_eq!(
            parse_public_key(&short).unwrap_err(),
            CryptoError::InvalidLength { expected: 32, actual: 16 }
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let kp = TunnelKeypair::from_secret_bytes([9u8; KEY_LEN]);
        let dbg = format!("{:?}", kp);
        assert!(!dbg.contains(&*kp.private_key_base64()));
        assert!(dbg.contains(&kp.public_key_base64()));
    }
}
