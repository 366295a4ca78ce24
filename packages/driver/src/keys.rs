// ABOUTME: Generates the SSH keypair used to reach Linux sandboxes, at most once per path pair
// ABOUTME: Generation is serialized through a lock shared by every lifecycle in the process

use crate::error::{DriverError, Result};
use ssh_key::private::{KeypairData, RsaKeypair};
use ssh_key::{LineEnding, PrivateKey};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const KEY_COMMENT: &str = "dockbox_docker_key";
const KEY_BITS: usize = 2048;

/// Process-wide guard around keypair creation. Create one and clone it into every provisioner.
pub type KeyLock = Arc<Mutex<()>>;

pub fn new_key_lock() -> KeyLock {
    Arc::new(Mutex::new(()))
}

#[derive(Clone)]
pub struct KeyProvisioner {
    lock: KeyLock,
}

impl KeyProvisioner {
    pub fn new(lock: KeyLock) -> Self {
        Self { lock }
    }

    /// Create both key files unless they already exist
    pub async fn ensure_keypair(&self, private: &Path, public: &Path) -> Result<()> {
        let _guard = self.lock.lock().await;

        if private.exists() && public.exists() {
            debug!("Reusing keypair at {}", private.display());
            return Ok(());
        }

        info!("Generating RSA keypair at {}", private.display());
        let private = private.to_path_buf();
        let public = public.to_path_buf();
        tokio::task::spawn_blocking(move || write_keypair(&private, &public))
            .await
            .map_err(|e| DriverError::Key(format!("Key generation task failed: {}", e)))?
    }
}

fn write_keypair(private: &Path, public: &Path) -> Result<()> {
    let mut rng = rand::rngs::OsRng;
    let keypair =
        RsaKeypair::random(&mut rng, KEY_BITS).map_err(|e| DriverError::Key(e.to_string()))?;
    let key = PrivateKey::new(KeypairData::from(keypair), KEY_COMMENT)
        .map_err(|e| DriverError::Key(e.to_string()))?;

    let private_pem = key
        .to_openssh(LineEnding::LF)
        .map_err(|e| DriverError::Key(e.to_string()))?;
    let public_line = key
        .public_key()
        .to_openssh()
        .map_err(|e| DriverError::Key(e.to_string()))?;

    write_owner_only(private, private_pem.as_bytes())?;
    write_owner_only(public, public_line.as_bytes())?;
    Ok(())
}

fn write_owner_only(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// The public key line, trimmed
pub fn read_public_key(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DriverError::Key(format!("Cannot read public key {}: {}", path.display(), e))
    })?;
    Ok(content.trim().to_string())
}
