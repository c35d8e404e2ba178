//! Sealed value format: one encrypted JSON value and its text token.
//!
//! ## Binary layout (variable, ≥76 bytes)
//!
//! | Field        | Offset | Size     | Description                        |
//! |--------------|--------|----------|------------------------------------|
//! | magic        | 0      | 8        | `BMAGIC01`                         |
//! | m_cost       | 8      | 4        | Argon2 memory (KiB), little-endian |
//! | t_cost       | 12     | 4        | Argon2 iterations, little-endian   |
//! | p_cost       | 16     | 4        | Argon2 lanes, little-endian        |
//! | salt         | 20     | 16       | Argon2 salt                        |
//! | nonce        | 36     | 24       | XChaCha20-Poly1305 nonce           |
//! | ciphertext   | 60     | ≥16      | encrypted JSON + Poly1305 tag      |
//!
//! The token carried inside JSON is the standard (padded) base64 of the
//! binary layout.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use std::fmt;

const MAGIC: &[u8; 8] = b"BMAGIC01";

/// Argon2 salt size.
pub const SALT_LEN: usize = 16;

/// Nonce size (XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag size; the smallest possible ciphertext.
const TAG_LEN: usize = 16;

/// magic(8) + m_cost(4) + t_cost(4) + p_cost(4) + salt(16) + nonce(24).
const HEADER_LEN: usize = 60;

const MIN_BIN_SIZE: usize = HEADER_LEN + TAG_LEN;

/// Upper bounds on Argon2 costs accepted from a token: 1 GiB, 64 passes, 16 lanes.
const MAX_M_COST: u32 = 1 << 20;
const MAX_T_COST: u32 = 64;
const MAX_P_COST: u32 = 16;

// ---------------------------------------------------------------------------
// KDF parameters
// ---------------------------------------------------------------------------

/// Argon2id cost parameters, stored with every sealed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl KdfParams {
    /// Parameters used for new ciphertexts (Argon2 crate defaults).
    pub const DEFAULT: Self = Self {
        m_cost: argon2::Params::DEFAULT_M_COST,
        t_cost: argon2::Params::DEFAULT_T_COST,
        p_cost: argon2::Params::DEFAULT_P_COST,
    };

    /// Minimal parameters so unit tests stay fast.
    #[cfg(test)]
    pub const TEST: Self = Self {
        m_cost: 8,
        t_cost: 1,
        p_cost: 1,
    };

    /// Reject parameters Argon2 cannot run or that would exhaust memory or time.
    pub fn validate(&self) -> Result<()> {
        let in_range = (1..=MAX_T_COST).contains(&self.t_cost)
            && (1..=MAX_P_COST).contains(&self.p_cost)
            && (self.p_cost * 8..=MAX_M_COST).contains(&self.m_cost);
        if !in_range {
            bail!("invalid key derivation parameters ({self})");
        }
        Ok(())
    }
}

impl fmt::Display for KdfParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m={} t={} p={}", self.m_cost, self.t_cost, self.p_cost)
    }
}

// ---------------------------------------------------------------------------
// Sealed value
// ---------------------------------------------------------------------------

/// In-memory representation of one encrypted value.
#[derive(Debug)]
pub struct SealedValue {
    pub params: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl SealedValue {
    /// Serialize to the binary layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.params.m_cost.to_le_bytes());
        out.extend_from_slice(&self.params.t_cost.to_le_bytes());
        out.extend_from_slice(&self.params.p_cost.to_le_bytes());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse from the binary layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_BIN_SIZE {
            bail!(
                "sealed value too small: {} bytes (need >= {MIN_BIN_SIZE})",
                bytes.len()
            );
        }
        if &bytes[0..8] != MAGIC {
            bail!("bad magic (expected 'BMAGIC01')");
        }

        let params = KdfParams {
            m_cost: read_u32(&bytes[8..12]),
            t_cost: read_u32(&bytes[12..16]),
            p_cost: read_u32(&bytes[16..20]),
        };
        params.validate()?;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[20..36]);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[36..HEADER_LEN]);

        Ok(Self {
            params,
            salt,
            nonce,
            ciphertext: bytes[HEADER_LEN..].to_vec(),
        })
    }

    /// Encode as a base64 token suitable for a JSON string.
    pub fn to_token(&self) -> String {
        B64.encode(self.to_bytes())
    }

    /// Parse a base64 token.
    pub fn from_token(token: &str) -> Result<Self> {
        let bytes = B64.decode(token).context("invalid token base64")?;
        Self::from_bytes(&bytes)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ct_len: usize) -> SealedValue {
        SealedValue {
            params: KdfParams::DEFAULT,
            salt: [0x11; SALT_LEN],
            nonce: [0x22; NONCE_LEN],
            ciphertext: vec![0xAA; ct_len],
        }
    }

    #[test]
    fn binary_layout() {
        let bytes = sample(TAG_LEN).to_bytes();
        assert_eq!(bytes.len(), MIN_BIN_SIZE);
        assert_eq!(&bytes[..8], MAGIC);
        assert_eq!(read_u32(&bytes[8..12]), KdfParams::DEFAULT.m_cost);
        assert_eq!(&bytes[20..36], &[0x11; SALT_LEN]);
        assert_eq!(&bytes[36..60], &[0x22; NONCE_LEN]);
    }

    #[test]
    fn token_roundtrip() {
        let sealed = sample(40);
        let parsed = SealedValue::from_token(&sealed.to_token()).unwrap();
        assert_eq!(parsed.params, KdfParams::DEFAULT);
        assert_eq!(parsed.salt, sealed.salt);
        assert_eq!(parsed.nonce, sealed.nonce);
        assert_eq!(parsed.ciphertext, sealed.ciphertext);
    }

    #[test]
    fn truncated_rejected() {
        let bytes = sample(TAG_LEN).to_bytes();
        let err = SealedValue::from_bytes(&bytes[..MIN_BIN_SIZE - 1])
            .unwrap_err()
            .to_string();
        assert!(err.contains("too small"), "got: {err}");
    }

    #[test]
    fn bad_magic_rejected() {
        let mut bytes = sample(TAG_LEN).to_bytes();
        bytes[0] = b'X';
        let err = SealedValue::from_bytes(&bytes).unwrap_err().to_string();
        assert!(err.contains("bad magic"), "got: {err}");
    }

    #[test]
    fn zero_cost_params_rejected() {
        let mut sealed = sample(TAG_LEN);
        sealed.params.t_cost = 0;
        assert!(SealedValue::from_bytes(&sealed.to_bytes()).is_err());
    }

    #[test]
    fn oversized_params_rejected() {
        let huge = [
            KdfParams {
                m_cost: u32::MAX,
                ..KdfParams::DEFAULT
            },
            KdfParams {
                t_cost: u32::MAX,
                ..KdfParams::DEFAULT
            },
            KdfParams {
                p_cost: MAX_P_COST + 1,
                m_cost: MAX_M_COST,
                ..KdfParams::DEFAULT
            },
        ];
        for params in huge {
            let mut sealed = sample(TAG_LEN);
            sealed.params = params;
            let err = SealedValue::from_bytes(&sealed.to_bytes()).unwrap_err();
            assert!(
                err.to_string().contains("invalid key derivation parameters"),
                "{params}: {err}"
            );
        }
    }

    #[test]
    fn ceiling_params_accepted() {
        let mut sealed = sample(TAG_LEN);
        sealed.params = KdfParams {
            m_cost: MAX_M_COST,
            t_cost: MAX_T_COST,
            p_cost: MAX_P_COST,
        };
        assert!(SealedValue::from_bytes(&sealed.to_bytes()).is_ok());
    }

    #[test]
    fn padded_token_rejected() {
        let token = sample(TAG_LEN).to_token();
        assert!(SealedValue::from_token(&token).is_ok());
        assert!(SealedValue::from_token(&format!(" {token}\n")).is_err());
    }

    #[test]
    fn non_base64_token_rejected() {
        let err = SealedValue::from_token("not a token!").unwrap_err();
        assert!(format!("{err:#}").contains("invalid token base64"));
    }

    #[test]
    fn plain_string_is_not_a_token() {
        // Valid base64, but far too short and without the magic.
        assert!(SealedValue::from_token("aGVsbG8=").is_err());
    }
}
