//! Cryptographic operations: passphrase stretching, key derivation, sealing.
//!
//! Key hierarchy:
//!
//! ```text
//!   passphrase + salt
//!     └─ Argon2id(m, t, p)                        → master (32 bytes)
//!          └─ blake3(key=master, "blackmagic-object-key") → XChaCha20-Poly1305 key
//! ```
//!
//! One master key is derived per salt; every value sealed under that salt
//! gets its own random nonce and is bound to its field name as associated data.

use anyhow::{anyhow, bail, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand_core::{OsRng, RngCore};
use zeroize::Zeroize;

use crate::sealed::{KdfParams, SealedValue, NONCE_LEN, SALT_LEN};

/// Domain string for deriving the cipher key from the stretched passphrase.
const OBJECT_DOMAIN: &str = "blackmagic-object-key";

/// Length of every key in the hierarchy.
pub const KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Cipher key derived from a passphrase, tagged with the salt and KDF
/// parameters it came from.
pub struct DerivedKey {
    pub salt: [u8; SALT_LEN],
    pub params: KdfParams,
    key: [u8; KEY_LEN],
}

impl DerivedKey {
    fn cipher(&self) -> Result<XChaCha20Poly1305> {
        XChaCha20Poly1305::new_from_slice(&self.key).map_err(|e| anyhow!("bad key length: {e}"))
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Stretch `passphrase` with Argon2id and derive the cipher key.
pub fn derive_key(passphrase: &str, salt: [u8; SALT_LEN], params: KdfParams) -> Result<DerivedKey> {
    if passphrase.is_empty() {
        bail!("passphrase must not be empty");
    }

    let argon_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| anyhow!("invalid key derivation parameters: {e}"))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut master = [0u8; KEY_LEN];
    argon
        .hash_password_into(passphrase.as_bytes(), &salt, &mut master)
        .map_err(|e| anyhow!("key derivation failed: {e}"))?;

    let key = blake3::derive_key(OBJECT_DOMAIN, &master);
    master.zeroize();

    tracing::debug!(
        m_cost = params.m_cost,
        t_cost = params.t_cost,
        p_cost = params.p_cost,
        "derived object key"
    );
    Ok(DerivedKey { salt, params, key })
}

/// Generate a fresh random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

// ---------------------------------------------------------------------------
// Sealing / opening
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key`, binding it to `aad`.
pub fn seal(key: &DerivedKey, plaintext: &[u8], aad: &[u8]) -> Result<SealedValue> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let cipher = key.cipher()?;
    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| anyhow!("encryption failed: {e}"))?;

    Ok(SealedValue {
        params: key.params,
        salt: key.salt,
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a sealed value. `key` must come from the value's own salt and params.
pub fn open(key: &DerivedKey, sealed: &SealedValue, aad: &[u8]) -> Result<Vec<u8>> {
    if key.salt != sealed.salt || key.params != sealed.params {
        bail!("key was derived for a different salt or parameter set");
    }

    let nonce = XNonce::from_slice(&sealed.nonce);
    let cipher = key.cipher()?;
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: sealed.ciphertext.as_ref(),
                aad,
            },
        )
        .map_err(|_| anyhow!("decryption failed (wrong passphrase or corrupted data)"))
}
