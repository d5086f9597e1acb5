//! Password generation and at-rest encryption of database credentials.

use crate::error::{Error, Result};
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use rand::Rng;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Username of the default user created with every authenticated container.
pub const DEFAULT_USERNAME: &str = "dbuser";

/// Password assumed for containers restored from an orphaned volume.
pub const RESTORE_PASSWORD: &str = "$uper$ecret";

pub const DEFAULT_PASSWORD_LENGTH: usize = 12;
pub const USER_PASSWORD_LENGTH: usize = 32;

const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Plaintext username and password handed to adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Random password drawn uniformly from `[a-zA-Z0-9]` using the OS CSPRNG.
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::rngs::OsRng;
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// AES-256-GCM cipher bound to the installation key.
///
/// Ciphertexts are `hex(nonce || ciphertext || tag)` with a fresh nonce per
/// call, so encrypting the same password twice gives different outputs.
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    pub fn from_key(key: &[u8; KEY_SIZE]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Loads the hex key at `path`, generating it with mode 0600 on first use.
    ///
    /// A key file that exists but cannot be decoded is an integrity failure;
    /// it is never replaced, since that would orphan every stored password.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let text = fs::read_to_string(path)
                .map_err(|e| Error::io(format!("lendo chave {}", path.display()), e))?;
            let bytes = hex::decode(text.trim()).map_err(|e| {
                Error::Integrity(format!("chave de criptografia corrompida: {e}"))
            })?;
            let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
                Error::Integrity(format!(
                    "chave de criptografia com {} bytes, esperado {KEY_SIZE}",
                    b.len()
                ))
            })?;
            debug!("Chave de criptografia carregada de {}", path.display());
            return Ok(Self::from_key(&key));
        }

        let key = Aes256Gcm::generate_key(&mut OsRng);
        write_key_file(path, &hex::encode(key))?;
        info!("🔑 Nova chave de criptografia gerada em {}", path.display());

        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }

    pub fn encrypt(&self, plain_text: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain_text.as_bytes())
            .map_err(|e| Error::Integrity(format!("falha ao criptografar: {e}")))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(hex::encode(result))
    }

    pub fn decrypt(&self, cipher_hex: &str) -> Result<String> {
        let data = hex::decode(cipher_hex)
            .map_err(|e| Error::Integrity(format!("texto cifrado inválido: {e}")))?;
        if data.len() < NONCE_SIZE {
            return Err(Error::Integrity(
                "texto cifrado curto demais para conter o nonce".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| Error::Integrity(format!("falha ao descriptografar: {e}")))?;

        String::from_utf8(plain)
            .map_err(|e| Error::Integrity(format!("senha não é UTF-8 válido: {e}")))
    }
}

fn write_key_file(path: &Path, contents: &str) -> Result<()> {
    let context = || format!("gravando chave {}", path.display());

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| Error::io(context(), e))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| Error::io(context(), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::io(context(), e))?;
    }

    Ok(())
}
