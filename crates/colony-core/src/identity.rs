//! Worker identity: an sr25519 keypair and the runtime id derived from it.

use crate::{Result, WorkerError};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sp_core::{sr25519, Pair};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Well-known location of the persisted runtime id.
pub const DEFAULT_ID_FILE: &str = "/tmp/runtimeid";

const SEED_LEN: usize = 32;

/// Signing key used to authenticate requests to the colony server.
///
/// The colony key and the worker's own key are both credentials; the
/// secret half never leaves process memory.
#[derive(Clone)]
pub struct Credential {
    pair: sr25519::Pair,
}

impl Credential {
    /// Generate a fresh key from OS entropy.
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; SEED_LEN];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| WorkerError::Crypto(format!("failed to gather entropy: {}", e)))?;
        Self::from_seed(&seed)
    }

    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let pair = sr25519::Pair::from_seed_slice(seed)
            .map_err(|e| WorkerError::Crypto(format!("invalid key seed: {:?}", e)))?;
        Ok(Credential { pair })
    }

    /// Parse a hex-encoded 32 byte seed, as found in `COLONYPRVKEY`.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let seed = hex::decode(encoded.trim())
            .map_err(|e| WorkerError::Crypto(format!("key is not valid hex: {}", e)))?;
        if seed.len() != SEED_LEN {
            return Err(WorkerError::Crypto(format!(
                "key must be {} bytes, got {}",
                SEED_LEN,
                seed.len()
            )));
        }
        Self::from_seed(&seed)
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.pair.public().0)
    }

    /// Stable identifier: hex SHA-256 of the public key.
    pub fn derive_id(&self) -> String {
        hex::encode(Sha256::digest(self.pair.public().0))
    }

    /// Sign a message, returning the hex-encoded signature.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.pair.sign(message).0)
    }

    /// Check a hex signature against a hex public key.
    pub fn verify(message: &[u8], signature_hex: &str, public_key_hex: &str) -> bool {
        let (Ok(signature), Ok(public)) = (hex::decode(signature_hex), hex::decode(public_key_hex))
        else {
            return false;
        };
        let (Ok(signature), Ok(public)) = (
            sr25519::Signature::try_from(signature.as_slice()),
            sr25519::Public::try_from(public.as_slice()),
        ) else {
            return false;
        };
        sr25519::Pair::verify(&signature, message, &public)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// The one identity held by a running worker.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    credential: Credential,
    id: String,
}

impl WorkerIdentity {
    pub fn generate() -> Result<Self> {
        Ok(Self::from_credential(Credential::generate()?))
    }

    pub fn from_credential(credential: Credential) -> Self {
        let id = credential.derive_id();
        WorkerIdentity { credential, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Plain-text file holding the runtime id between the run and deregister paths.
#[derive(Debug, Clone)]
pub struct IdStore {
    path: PathBuf,
}

impl IdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IdStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the id atomically: a temp file in the target directory is
    /// renamed over the destination, so readers never see a partial id.
    pub fn persist(&self, id: &str) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir).map_err(|e| self.error(e))?;
        file.write_all(id.as_bytes()).map_err(|e| self.error(e))?;
        file.as_file().sync_all().map_err(|e| self.error(e))?;
        file.persist(&self.path).map_err(|e| self.error(e.error))?;
        Ok(())
    }

    pub fn load(&self) -> Result<String> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| self.error(e))?;
        let id = contents.trim_end();
        if id.is_empty() {
            return Err(self.error(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "identifier file is empty",
            )));
        }
        Ok(id.to_string())
    }

    fn error(&self, source: std::io::Error) -> WorkerError {
        WorkerError::Persistence {
            path: self.path.clone(),
            source,
        }
    }
}

impl Default for IdStore {
    fn default() -> Self {
        IdStore::new(DEFAULT_ID_FILE)
    }
}
