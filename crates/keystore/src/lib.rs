//! veilhop Keystore
//!
//! Keeps the node's overlay identity stable across restarts. The identity
//! is an Ed25519 libp2p keypair stored as its raw 32-byte secret.

mod keypair;
mod paths;

pub use keypair::{load_or_generate_identity, KeystoreError};
pub use paths::{default_identity_path, default_keystore_dir, expand_path};
