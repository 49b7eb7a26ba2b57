//! Cryptographic logics.

use std::sync::Arc;

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::config::Argon2 as ArgonConfig;

/// Random bytes behind every token plaintext.
const TOKEN_ENTROPY: usize = 16;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("entropy source failure: {0}")]
    Entropy(#[from] rand::Error),
}

/// Cryptographic manager.
pub struct Crypto {
    pub pwd: PasswordManager,
    pub hasher: Arc<Hasher>,
}

impl Crypto {
    /// Create a new [`Crypto`].
    pub fn new(
        config: Option<ArgonConfig>,
        pepper: impl AsRef<[u8]>,
    ) -> Result<Self> {
        Ok(Self {
            pwd: PasswordManager::new(config)?,
            hasher: Arc::new(Hasher::new(pepper)),
        })
    }
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
    /// Hash of a random secret, checked when no account matches.
    decoy: String,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        let mut manager = Self {
            params,
            decoy: String::new(),
        };
        manager.decoy = manager.hash_password(random_token()?)?;

        Ok(manager)
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    ///
    /// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> Result<bool> {
        let parsed = PasswordHash::new(phc_hash)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        match self.argon2().verify_password(password.as_ref(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(CryptoError::Argon2(err.to_string())),
        }
    }
}

impl PasswordManager {
    /// Spend one verification on the decoy hash, so that a missing account
    /// costs as much as a wrong password.
    pub fn verify_decoy(&self, password: impl AsRef<[u8]>) -> Result<()> {
        self.verify_password(password, &self.decoy).map(|_| ())
    }
}

pub struct Hasher(Vec<u8>);

impl Hasher {
    /// Create a new [`Hasher`].
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self(pepper.as_ref().to_vec())
    }

    /// Digest data into SHA256.
    pub fn digest(&self, data: impl AsRef<[u8]>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        hasher.update(&data);
        let hash = hasher.finalize();

        hex::encode(hash)
    }
}

/// Random token plaintext: 16 bytes from the OS, base32 without padding.
pub fn random_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_ENTROPY];
    OsRng.try_fill_bytes(&mut bytes)?;

    Ok(base32::encode(
        base32::Alphabet::Rfc4648 { padding: false },
        &bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> PasswordManager {
        PasswordManager::new(Some(ArgonConfig {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[test]
    fn test_sha2() {
        let hasher = Hasher::new(b"");

        // sha256("abc")
        assert_eq!(
            hasher.digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pepper_changes_digest() {
        let plain = Hasher::new(b"");
        let peppered = Hasher::new([0x42; 16]);

        assert_ne!(plain.digest("token"), peppered.digest("token"));
        assert_eq!(peppered.digest("token"), peppered.digest("token"));
    }

    #[test]
    fn test_password_round() {
        let pwd = light();
        let hash = pwd.hash_password("pa55word").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(pwd.verify_password("pa55word", &hash).unwrap());
        assert!(!pwd.verify_password("wrong-password", &hash).unwrap());
        assert!(pwd.verify_password("pa55word", "not a phc").is_err());
    }

    #[test]
    fn test_decoy_uses_configured_params() {
        let pwd = light();

        assert!(pwd.verify_decoy("pa55word").is_ok());
        assert!(!pwd.verify_password("pa55word", &pwd.decoy).unwrap());

        let decoy = PasswordHash::new(&pwd.decoy).unwrap();
        assert_eq!(decoy.algorithm.as_str(), "argon2id");
        assert_eq!(Params::try_from(&decoy).unwrap().m_cost(), 1024);
    }

    #[test]
    fn test_random_token() {
        let first = random_token().unwrap();
        let second = random_token().unwrap();

        assert_eq!(first.len(), 26);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c))
        );
        assert_ne!(first, second);
    }
}
