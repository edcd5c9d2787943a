//! Cryptographic primitives for tenant credential protection.
//!
//! This module provides:
//! - HKDF-SHA256 derivation of per-tenant keys
//! - AES-256-GCM encryption of upstream API keys
//! - Argon2id hashing of master secrets
//! - Secure random salts and master secrets

use crate::secret::{constant_time_eq, Secret};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use deskgate_core::config::{GatewayConfig, HashingSettings};
use deskgate_core::error::{ConfigError, GatewayError, Result};
use hkdf::Hkdf;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-256-GCM tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Per-tenant salt size in bytes.
pub const SALT_SIZE: usize = 32;

/// Minimum accepted length of the deployment root key.
pub const MIN_ROOT_KEY_SIZE: usize = 32;

const TENANT_KEY_INFO: &[u8] = b"deskgate-tenant-key-v1";
const MASTER_SECRET_BYTES: usize = 32;
const PHC_SALT_BYTES: usize = 16;

/// A 256-bit key derived for one tenant.
///
/// Zeroed on drop. Never serialized.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TenantKey([u8; KEY_SIZE]);

impl TenantKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub(crate) const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TenantKey([REDACTED])")
    }
}

impl PartialEq for TenantKey {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.0, &other.0)
    }
}

impl Eq for TenantKey {}

/// Output of credential encryption, stored as three separate components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredential {
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// GCM authentication tag.
    pub tag: [u8; TAG_SIZE],
    /// Nonce used for this encryption only.
    pub nonce: [u8; NONCE_SIZE],
}

/// A master secret hash together with the tenant's key derivation salt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedSecret {
    /// Argon2id hash in PHC string format.
    pub hash: String,
    /// Fresh salt for [`CryptoEngine::derive_tenant_key`].
    pub salt: [u8; SALT_SIZE],
}

/// Argon2id parameters for master secret hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Time cost (iterations).
    pub time_cost: u32,
    /// Parallelism factor.
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self::from(&HashingSettings::default())
    }
}

impl From<&HashingSettings> for Argon2Params {
    fn from(settings: &HashingSettings) -> Self {
        Self {
            memory_cost: settings.memory_cost_kib,
            time_cost: settings.time_cost,
            parallelism: settings.parallelism,
        }
    }
}

/// A nonce sequence that uses a single nonce.
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

/// Key derivation, authenticated encryption and secret hashing.
///
/// Holds the deployment root key, which is mixed into every tenant key
/// derivation so that a leaked database alone does not expose credentials.
pub struct CryptoEngine {
    root_key: Zeroizing<Vec<u8>>,
    params: Argon2Params,
    rng: SystemRandom,
}

impl CryptoEngine {
    /// Creates an engine from a raw root key.
    pub fn new(root_key: &[u8], params: Argon2Params) -> Result<Self> {
        if root_key.len() < MIN_ROOT_KEY_SIZE {
            return Err(GatewayError::crypto(format!(
                "root key must be at least {MIN_ROOT_KEY_SIZE} bytes, got {}",
                root_key.len()
            )));
        }
        argon2_params(&params)?;
        Ok(Self {
            root_key: Zeroizing::new(root_key.to_vec()),
            params,
            rng: SystemRandom::new(),
        })
    }

    /// Creates an engine from the KMS key and hashing settings of a config.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let root_key = Zeroizing::new(config.kms_key_bytes()?);
        Self::new(&root_key, Argon2Params::from(&config.hashing))
    }

    /// Derives the tenant key from a master secret and the tenant's salt.
    ///
    /// Deterministic for the same root key, secret and salt.
    pub fn derive_tenant_key(&self, master_secret: &Secret, salt: &[u8]) -> Result<TenantKey> {
        if salt.is_empty() {
            return Err(GatewayError::crypto("tenant salt is empty"));
        }
        let mut hkdf_salt = Zeroizing::new(Vec::with_capacity(self.root_key.len() + salt.len()));
        hkdf_salt.extend_from_slice(&self.root_key);
        hkdf_salt.extend_from_slice(salt);

        let hkdf = Hkdf::<Sha256>::new(Some(hkdf_salt.as_slice()), master_secret.expose());
        let mut okm = [0u8; KEY_SIZE];
        hkdf.expand(TENANT_KEY_INFO, &mut okm)
            .map_err(|e| GatewayError::crypto(format!("HKDF expand failed: {e}")))?;
        let key = TenantKey::from_bytes(okm);
        okm.zeroize();
        Ok(key)
    }

    /// Encrypts a credential under a tenant key with a fresh random nonce.
    pub fn encrypt_credential(&self, plaintext: &[u8], key: &TenantKey) -> Result<EncryptedCredential> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.rng
            .fill(&mut nonce)
            .map_err(|_| GatewayError::crypto("Failed to generate random nonce"))?;

        let unbound = UnboundKey::new(&aead::AES_256_GCM, key.as_bytes())
            .map_err(|_| GatewayError::crypto("Failed to create encryption key"))?;
        let mut sealing_key = SealingKey::new(unbound, SingleNonce::new(nonce));

        let mut ciphertext = plaintext.to_vec();
        let tag = sealing_key
            .seal_in_place_separate_tag(Aad::empty(), &mut ciphertext)
            .map_err(|_| GatewayError::crypto("Encryption failed"))?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(tag.as_ref());

        Ok(EncryptedCredential {
            ciphertext,
            tag: tag_bytes,
            nonce,
        })
    }

    /// Decrypts a credential, verifying its authentication tag.
    ///
    /// Any length mismatch or authentication failure is reported as
    /// [`GatewayError::TamperedData`]; no partial plaintext is returned.
    pub fn decrypt_credential(
        &self,
        ciphertext: &[u8],
        tag: &[u8],
        nonce: &[u8],
        key: &TenantKey,
    ) -> Result<Secret> {
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| {
            GatewayError::tampered(format!("nonce must be {NONCE_SIZE} bytes, got {}", nonce.len()))
        })?;
        if tag.len() != TAG_SIZE {
            return Err(GatewayError::tampered(format!(
                "tag must be {TAG_SIZE} bytes, got {}",
                tag.len()
            )));
        }

        let unbound = UnboundKey::new(&aead::AES_256_GCM, key.as_bytes())
            .map_err(|_| GatewayError::crypto("Failed to create decryption key"))?;
        let mut opening_key = OpeningKey::new(unbound, SingleNonce::new(nonce));

        let mut in_out = Zeroizing::new(Vec::with_capacity(ciphertext.len() + TAG_SIZE));
        in_out.extend_from_slice(ciphertext);
        in_out.extend_from_slice(tag);

        let plaintext = opening_key
            .open_in_place(Aad::empty(), in_out.as_mut_slice())
            .map_err(|_| GatewayError::tampered("authentication tag mismatch"))?;

        Ok(Secret::new(plaintext.to_vec()))
    }

    /// Hashes a master secret with Argon2id and generates a fresh tenant salt.
    pub fn hash_secret(&self, secret: &Secret) -> Result<HashedSecret> {
        let mut phc_salt = [0u8; PHC_SALT_BYTES];
        self.rng
            .fill(&mut phc_salt)
            .map_err(|_| GatewayError::crypto("Failed to generate random salt"))?;
        let salt_string = SaltString::encode_b64(&phc_salt)
            .map_err(|e| GatewayError::crypto(format!("Invalid salt: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params(&self.params)?);
        let hash = argon2
            .hash_password(secret.expose(), &salt_string)
            .map_err(|e| GatewayError::crypto(format!("Argon2id failed: {e}")))?
            .to_string();

        Ok(HashedSecret {
            hash,
            salt: self.generate_salt()?,
        })
    }

    /// Verifies a master secret against a stored PHC hash.
    ///
    /// Malformed hashes never verify.
    #[must_use]
    pub fn verify_secret(&self, secret: &Secret, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(secret.expose(), &parsed)
            .is_ok()
    }

    /// Generates a random salt for tenant key derivation.
    pub fn generate_salt(&self) -> Result<[u8; SALT_SIZE]> {
        let mut salt = [0u8; SALT_SIZE];
        self.rng
            .fill(&mut salt)
            .map_err(|_| GatewayError::crypto("Failed to generate random salt"))?;
        Ok(salt)
    }

    /// Generates a new URL-safe master secret for a tenant.
    pub fn generate_master_secret(&self) -> Result<Secret> {
        let mut bytes = Zeroizing::new([0u8; MASTER_SECRET_BYTES]);
        self.rng
            .fill(&mut *bytes)
            .map_err(|_| GatewayError::crypto("Failed to generate master secret"))?;
        Ok(Secret::from(URL_SAFE_NO_PAD.encode(&*bytes)))
    }
}

impl fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("root_key", &"[REDACTED]")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn argon2_params(params: &Argon2Params) -> Result<Params> {
    Params::new(params.memory_cost, params.time_cost, params.parallelism, None).map_err(|e| {
        GatewayError::Config(ConfigError::invalid_value(
            "hashing",
            format!("Invalid Argon2 params: {e}"),
        ))
    })
}
