//! Content-addressed chunk bodies with optional AES-256-GCM sealing.
//!
//! Bodies live under `.codescope/chunks/` named by their content hash:
//! `<sha>` for plain text, `<sha>.enc` for sealed bodies. A sealed body is
//! `CSE1 || nonce (12 bytes) || ciphertext+tag`.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use codescope_core::{CodescopeError, EncryptionConfig};
use tempfile::NamedTempFile;
use tracing::debug;

const SEALED_MAGIC: &[u8; 4] = b"CSE1";
const NONCE_LEN: usize = 12;
const SEALED_EXTENSION: &str = "enc";
const KEY_LEN: usize = 32;

/// Directory name for bodies inside the data directory.
pub const CHUNKS_DIR_NAME: &str = "chunks";

/// Reads and writes chunk bodies by content hash.
///
/// # Examples
///
/// ```
/// use codescope_index::codec::ChunkBodyStore;
///
/// let dir = tempfile::tempdir().unwrap();
/// let key = [7u8; 32];
/// let store = ChunkBodyStore::new(dir.path(), Some(key), true);
/// let sealed = store.write("ab12", b"fn secret() {}").unwrap();
/// assert!(sealed);
/// assert_eq!(store.read("ab12").unwrap(), b"fn secret() {}");
/// ```
pub struct ChunkBodyStore {
    dir: PathBuf,
    cipher: Option<Aes256Gcm>,
    seal: bool,
}

impl std::fmt::Debug for ChunkBodyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkBodyStore")
            .field("dir", &self.dir)
            .field("has_key", &self.cipher.is_some())
            .field("seal", &self.seal)
            .finish()
    }
}

impl ChunkBodyStore {
    /// Create a store rooted at `dir`.
    ///
    /// With `seal` set (and a key present) new bodies are encrypted. A key
    /// without `seal` still allows reading previously sealed bodies.
    pub fn new(dir: &Path, key: Option<[u8; KEY_LEN]>, seal: bool) -> Self {
        let cipher = key.map(|k| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&k)));
        Self {
            dir: dir.to_path_buf(),
            seal: seal && cipher.is_some(),
            cipher,
        }
    }

    /// Create the store for a data directory from the encryption settings.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Config`] if encryption is enabled without a
    /// key, or the key does not decode to 32 bytes.
    pub fn from_config(data_dir: &Path, config: &EncryptionConfig) -> Result<Self, CodescopeError> {
        let key = config.key_material().map(|k| decode_key(&k)).transpose()?;
        if config.enabled && key.is_none() {
            return Err(CodescopeError::Config(
                "encryption is enabled but no key is set: provide encryption.key or CODESCOPE_ENCRYPTION_KEY".into(),
            ));
        }
        Ok(Self::new(
            &data_dir.join(CHUNKS_DIR_NAME),
            key,
            config.enabled,
        ))
    }

    /// Whether newly written bodies are sealed.
    pub fn seals(&self) -> bool {
        self.seal
    }

    /// Store `bytes` under `sha`, sealing when configured.
    ///
    /// Returns whether the stored body is sealed. Writing a body that already
    /// exists in the desired form is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] on write failure.
    pub fn write(&self, sha: &str, bytes: &[u8]) -> Result<bool, CodescopeError> {
        validate_sha(sha)?;
        std::fs::create_dir_all(&self.dir)?;
        let plain = self.plain_path(sha);
        let sealed = self.sealed_path(sha);

        match (&self.cipher, self.seal) {
            (Some(cipher), true) => {
                if !sealed.exists() {
                    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                    let ciphertext = cipher.encrypt(&nonce, bytes).map_err(|_| {
                        CodescopeError::Config(format!("failed to seal chunk {sha}"))
                    })?;
                    let mut out = Vec::with_capacity(4 + NONCE_LEN + ciphertext.len());
                    out.extend_from_slice(SEALED_MAGIC);
                    out.extend_from_slice(&nonce);
                    out.extend_from_slice(&ciphertext);
                    write_atomic(&sealed, &out)?;
                    debug!(sha, "sealed chunk body");
                }
                remove_if_exists(&plain)?;
                Ok(true)
            }
            _ => {
                if !plain.exists() {
                    write_atomic(&plain, bytes)?;
                }
                remove_if_exists(&sealed)?;
                Ok(false)
            }
        }
    }

    /// Read the body stored under `sha`.
    ///
    /// # Errors
    ///
    /// - [`CodescopeError::ChunkKeyMissing`] if the body is sealed and no key is set
    /// - [`CodescopeError::ChunkAuthFailed`] if decryption fails
    /// - [`CodescopeError::ChunkNotFound`] if no body exists
    pub fn read(&self, sha: &str) -> Result<Vec<u8>, CodescopeError> {
        validate_sha(sha)?;
        let sealed = self.sealed_path(sha);
        if sealed.exists() {
            let Some(cipher) = &self.cipher else {
                return Err(CodescopeError::ChunkKeyMissing(sha.to_string()));
            };
            let bytes = std::fs::read(&sealed)?;
            return open_sealed(cipher, sha, &bytes);
        }

        let plain = self.plain_path(sha);
        if plain.exists() {
            return Ok(std::fs::read(&plain)?);
        }
        Err(CodescopeError::ChunkNotFound(sha.to_string()))
    }

    /// Read a body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Same as [`ChunkBodyStore::read`]; invalid UTF-8 is reported as
    /// [`CodescopeError::ChunkAuthFailed`].
    pub fn read_string(&self, sha: &str) -> Result<String, CodescopeError> {
        let bytes = self.read(sha)?;
        String::from_utf8(bytes).map_err(|_| CodescopeError::ChunkAuthFailed(sha.to_string()))
    }

    pub fn exists(&self, sha: &str) -> bool {
        validate_sha(sha).is_ok() && (self.plain_path(sha).exists() || self.sealed_path(sha).exists())
    }

    /// Delete both forms of the body stored under `sha`.
    ///
    /// # Errors
    ///
    /// Returns [`CodescopeError::Io`] if a file exists but cannot be removed.
    pub fn remove(&self, sha: &str) -> Result<(), CodescopeError> {
        validate_sha(sha)?;
        remove_if_exists(&self.plain_path(sha))?;
        remove_if_exists(&self.sealed_path(sha))?;
        Ok(())
    }

    fn plain_path(&self, sha: &str) -> PathBuf {
        self.dir.join(sha)
    }

    fn sealed_path(&self, sha: &str) -> PathBuf {
        self.dir.join(format!("{sha}.{SEALED_EXTENSION}"))
    }
}

/// Decode a 32-byte key given as hex or base64.
///
/// # Errors
///
/// Returns [`CodescopeError::Config`] if the string is neither, or the
/// decoded key is not 32 bytes.
///
/// # Examples
///
/// ```
/// use codescope_index::codec::decode_key;
///
/// let hex_key = "00".repeat(32);
/// assert_eq!(decode_key(&hex_key).unwrap(), [0u8; 32]);
/// assert!(decode_key("too-short").is_err());
/// ```
pub fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN], CodescopeError> {
    let encoded = encoded.trim();
    let bytes = if encoded.len() == KEY_LEN * 2 && encoded.chars().all(|c| c.is_ascii_hexdigit()) {
        hex::decode(encoded).map_err(|e| CodescopeError::Config(format!("invalid hex key: {e}")))?
    } else {
        STANDARD
            .decode(encoded)
            .map_err(|e| CodescopeError::Config(format!("encryption key is neither hex nor base64: {e}")))?
    };
    bytes.try_into().map_err(|b: Vec<u8>| {
        CodescopeError::Config(format!(
            "encryption key must be {KEY_LEN} bytes, got {}",
            b.len()
        ))
    })
}

fn open_sealed(cipher: &Aes256Gcm, sha: &str, bytes: &[u8]) -> Result<Vec<u8>, CodescopeError> {
    let header = SEALED_MAGIC.len() + NONCE_LEN;
    if bytes.len() < header || &bytes[..SEALED_MAGIC.len()] != SEALED_MAGIC {
        return Err(CodescopeError::ChunkAuthFailed(sha.to_string()));
    }
    let nonce = Nonce::from_slice(&bytes[SEALED_MAGIC.len()..header]);
    cipher
        .decrypt(nonce, &bytes[header..])
        .map_err(|_| CodescopeError::ChunkAuthFailed(sha.to_string()))
}

/// Hashes are hex; anything else could escape the chunk directory.
fn validate_sha(sha: &str) -> Result<(), CodescopeError> {
    if sha.is_empty() || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CodescopeError::ChunkNotFound(sha.to_string()));
    }
    Ok(())
}

/// Bodies are content-addressed, so concurrent writers of one `sha` carry
/// equivalent bytes and whichever rename lands last wins.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CodescopeError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), CodescopeError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescope_core::ErrorKind;

    const SHA: &str = "0a1b2c3d4e5f";

    #[test]
    fn plain_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkBodyStore::new(dir.path(), None, false);
        assert!(!store.write(SHA, b"fn a() {}").unwrap());
        assert_eq!(store.read_string(SHA).unwrap(), "fn a() {}");
        assert!(dir.path().join(SHA).exists());
    }

    #[test]
    fn sealed_body_is_not_plaintext_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkBodyStore::new(dir.path(), Some([1u8; 32]), true);
        store.write(SHA, b"let password = 42;").unwrap();

        let raw = std::fs::read(dir.path().join(format!("{SHA}.enc"))).unwrap();
        assert_eq!(&raw[..4], b"CSE1");
        assert!(!raw.windows(8).any(|w| w == b"password"));
        assert_eq!(store.read(SHA).unwrap(), b"let password = 42;");
    }

    #[test]
    fn concurrent_writers_of_one_body_all_succeed() {
        for seal in [false, true] {
            let dir = tempfile::tempdir().unwrap();
            let store = ChunkBodyStore::new(dir.path(), Some([3u8; 32]), seal);
            for round in 0..50 {
                let sha = format!("{round:04x}");
                std::thread::scope(|scope| {
                    let writers: Vec<_> = (0..4)
                        .map(|_| scope.spawn(|| store.write(&sha, b"fn shared() {}")))
                        .collect();
                    for writer in writers {
                        assert_eq!(writer.join().unwrap().unwrap(), seal);
                    }
                });
                assert_eq!(store.read(&sha).unwrap(), b"fn shared() {}");
            }

            let leftovers: Vec<_> = std::fs::read_dir(dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|name| !name.chars().all(|c| c.is_ascii_hexdigit()) && !name.ends_with(".enc"))
                .collect();
            assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
        }
    }

    #[test]
    fn sealed_body_without_key_reports_key_missing() {
        let dir = tempfile::tempdir().unwrap();
        ChunkBodyStore::new(dir.path(), Some([1u8; 32]), true)
            .write(SHA, b"x")
            .unwrap();

        let keyless = ChunkBodyStore::new(dir.path(), None, false);
        let err = keyless.read(SHA).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChunkKeyMissing);
    }

    #[test]
    fn tampering_reports_auth_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkBodyStore::new(dir.path(), Some([1u8; 32]), true);
        store.write(SHA, b"fn body() {}").unwrap();

        let path = dir.path().join(format!("{SHA}.enc"));
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        std::fs::write(&path, raw).unwrap();

        assert_eq!(store.read(SHA).unwrap_err().kind(), ErrorKind::ChunkAuthFailed);
    }

    #[test]
    fn wrong_key_reports_auth_failure() {
        let dir = tempfile::tempdir().unwrap();
        ChunkBodyStore::new(dir.path(), Some([1u8; 32]), true)
            .write(SHA, b"x")
            .unwrap();
        let other = ChunkBodyStore::new(dir.path(), Some([2u8; 32]), false);
        assert_eq!(other.read(SHA).unwrap_err().kind(), ErrorKind::ChunkAuthFailed);
    }

    #[test]
    fn missing_and_malformed_hashes_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkBodyStore::new(dir.path(), None, false);
        assert_eq!(store.read("abcdef").unwrap_err().kind(), ErrorKind::ChunkNotFound);
        assert_eq!(
            store.read("../../etc/passwd").unwrap_err().kind(),
            ErrorKind::ChunkNotFound
        );
    }

    #[test]
    fn enabling_encryption_replaces_plain_body() {
        let dir = tempfile::tempdir().unwrap();
        ChunkBodyStore::new(dir.path(), None, false)
            .write(SHA, b"x")
            .unwrap();
        ChunkBodyStore::new(dir.path(), Some([3u8; 32]), true)
            .write(SHA, b"x")
            .unwrap();
        assert!(!dir.path().join(SHA).exists());
        assert!(dir.path().join(format!("{SHA}.enc")).exists());
    }

    #[test]
    fn remove_deletes_both_forms() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkBodyStore::new(dir.path(), None, false);
        store.write(SHA, b"x").unwrap();
        store.remove(SHA).unwrap();
        assert!(!store.exists(SHA));
        store.remove(SHA).unwrap();
    }

    #[test]
    fn keys_decode_from_hex_and_base64() {
        let key = [9u8; 32];
        assert_eq!(decode_key(&hex::encode(key)).unwrap(), key);
        assert_eq!(decode_key(&STANDARD.encode(key)).unwrap(), key);
        assert!(decode_key(&STANDARD.encode([1u8; 16])).is_err());
    }

    #[test]
    fn enabled_without_key_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = EncryptionConfig {
            enabled: true,
            key: Some("   ".into()),
        };
        let err = ChunkBodyStore::from_config(dir.path(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
