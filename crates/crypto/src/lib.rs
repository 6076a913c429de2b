//! veilhop Crypto
//!
//! Ephemeral Curve25519 keypairs in the text form understood by WireGuard
//! tooling (standard base64 of the 32 raw key bytes).

mod keys;

pub use keys::{parse_public_key, TunnelKeypair, KEY_LEN};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid base64 key: {0}")]
    InvalidEncoding(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, CryptoError>;
