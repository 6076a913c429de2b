//! Overlay identity load/generate

use std::path::Path;

use libp2p::identity::Keypair;
use thiserror::Error;
use tracing::info;

use crate::paths::expand_path;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("Failed to read keyfile: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write keyfile: {0}")]
    WriteError(std::io::Error),

    #[error("Invalid keyfile format: {0}")]
    InvalidFormat(String),

    #[error("Failed to create directory: {0}")]
    CreateDirError(std::io::Error),
}

/// Load the node's overlay identity from disk, or generate and persist one
///
/// The keyfile holds the raw 32-byte Ed25519 secret. `~` is expanded.
///
/// ```no_run
/// use veilhop_keystore::load_or_generate_identity;
/// use std::path::PathBuf;
///
/// let keypair = load_or_generate_identity(&PathBuf::from("~/.veilhop/node.key"))?;
/// # Ok::<(), veilhop_keystore::KeystoreError>(())
/// ```
pub fn load_or_generate_identity(keyfile: &Path) -> Result<Keypair, KeystoreError> {
    let path = expand_path(keyfile);

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(KeystoreError::CreateDirError)?;
        }
    }

    if path.exists() {
        let bytes = std::fs::read(&path).map_err(KeystoreError::ReadError)?;
        if bytes.len() != 32 {
            return Err(KeystoreError::InvalidFormat(format!(
                "Expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let keypair = Keypair::ed25519_from_bytes(bytes)
            .map_err(|e| KeystoreError::InvalidFormat(e.to_string()))?;
        info!("Loaded overlay identity {} from {:?}", keypair.public().to_peer_id(), path);
        return Ok(keypair);
    }

    let keypair = Keypair::generate_ed25519();
    let ed25519_keypair = keypair
        .clone()
        .try_into_ed25519()
        .map_err(|_| KeystoreError::InvalidFormat("Failed to extract ed25519 key".to_string()))?;

    let secret = ed25519_keypair.secret();
    std::fs::write(&path, secret.as_ref()).map_err(KeystoreError::WriteError)?;
    restrict_permissions(&path)?;

    info!("Generated overlay identity {}, saved to {:?}", keypair.public().to_peer_id(), path);
    Ok(keypair)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), KeystoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(KeystoreError::WriteError)
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), KeystoreError> {
    Ok(())
}
