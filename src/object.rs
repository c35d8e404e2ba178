//! Passphrase encryption of JSON values.
//!
//! Objects are encrypted field by field: each top-level value becomes a
//! token string and the names of the encrypted fields are recorded under
//! [`MARKER`]. Any other JSON value is sealed whole into a single token.
//!
//! ```text
//! {"user":"bob","port":5439}
//!   → {"user":"<token>","port":"<token>","_encrypted":["user","port"]}
//! ```

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};

use crate::crypto::{self, DerivedKey};
use crate::sealed::{KdfParams, SealedValue};

/// Field listing which keys of an object hold tokens.
pub const MARKER: &str = "_encrypted";

/// Encrypt `value` with the default key derivation parameters.
pub fn encrypt(passphrase: &str, value: &Value) -> Result<Value> {
    encrypt_with(passphrase, value, KdfParams::DEFAULT)
}

/// Decrypt a value produced by [`encrypt`].
pub fn decrypt(passphrase: &str, value: &Value) -> Result<Value> {
    let mut keys = KeyCache::new(passphrase);
    match value {
        Value::Object(map) => decrypt_object(&mut keys, map),
        Value::String(token) => open_value(&mut keys, token, "").context("decrypt value"),
        other => bail!(
            "cannot decrypt {}: expected an encrypted object or token string",
            kind(other)
        ),
    }
}

pub(crate) fn encrypt_with(passphrase: &str, value: &Value, params: KdfParams) -> Result<Value> {
    let key = crypto::derive_key(passphrase, crypto::generate_salt(), params)?;

    let Value::Object(map) = value else {
        tracing::debug!(kind = kind(value), "sealing whole value");
        return seal_value(&key, value, "").map(Value::String);
    };

    if map.contains_key(MARKER) {
        bail!("object already contains reserved field {MARKER:?}");
    }

    let mut out = Map::with_capacity(map.len() + 1);
    let mut names = Vec::with_capacity(map.len());
    for (name, field) in map {
        let token =
            seal_value(&key, field, name).with_context(|| format!("encrypt field {name:?}"))?;
        out.insert(name.clone(), Value::String(token));
        names.push(Value::String(name.clone()));
    }
    tracing::debug!(fields = names.len(), "encrypted object");
    out.insert(MARKER.to_string(), Value::Array(names));
    Ok(Value::Object(out))
}

fn decrypt_object(keys: &mut KeyCache<'_>, map: &Map<String, Value>) -> Result<Value> {
    let names = match map.get(MARKER) {
        Some(Value::Array(names)) => names,
        Some(other) => bail!(
            "field {MARKER:?} must be an array of field names, got {}",
            kind(other)
        ),
        None => bail!("object is not encrypted (missing {MARKER:?} field)"),
    };

    let mut out = map.clone();
    out.remove(MARKER);
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        let Value::String(name) = name else {
            bail!("field {MARKER:?} must contain only strings, got {}", kind(name));
        };
        if !seen.insert(name.as_str()) {
            bail!("field {name:?} is listed more than once in {MARKER:?}");
        }
        let token = match out.get(name) {
            Some(Value::String(token)) => token,
            Some(other) => bail!("field {name:?} is {}, expected a token string", kind(other)),
            None => bail!("field {name:?} is listed in {MARKER:?} but missing"),
        };
        let plain =
            open_value(keys, token, name).with_context(|| format!("decrypt field {name:?}"))?;
        out.insert(name.clone(), plain);
    }
    tracing::debug!(fields = names.len(), "decrypted object");
    Ok(Value::Object(out))
}

fn seal_value(key: &DerivedKey, value: &Value, field: &str) -> Result<String> {
    let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(value)?);
    let sealed = crypto::seal(key, &plaintext, field.as_bytes())?;
    Ok(sealed.to_token())
}

fn open_value(keys: &mut KeyCache<'_>, token: &str, field: &str) -> Result<Value> {
    let sealed = SealedValue::from_token(token)?;
    let key = keys.get(&sealed)?;
    let plaintext = zeroize::Zeroizing::new(crypto::open(key, &sealed, field.as_bytes())?);
    serde_json::from_slice(&plaintext).context("decrypted data is not valid JSON")
}

/// The one key a decrypt call may derive.
///
/// `encrypt` seals every field of an object under a single salt, so the
/// first token fixes the salt and parameters and later tokens must match.
struct KeyCache<'a> {
    passphrase: &'a str,
    key: Option<DerivedKey>,
}

impl<'a> KeyCache<'a> {
    fn new(passphrase: &'a str) -> Self {
        Self {
            passphrase,
            key: None,
        }
    }

    fn get(&mut self, sealed: &SealedValue) -> Result<&DerivedKey> {
        let key = match self.key.take() {
            Some(key) => key,
            None => crypto::derive_key(self.passphrase, sealed.salt, sealed.params)?,
        };
        let key = self.key.insert(key);
        if key.salt != sealed.salt || key.params != sealed.params {
            bail!("all fields of one object must share the same salt and key parameters");
        }
        Ok(key)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
