//! Passphrase sealing for vault values
//!
//! Keys are derived from a passphrase with scrypt and used with NaCl
//! secretbox (XSalsa20Poly1305). A sealed value is laid out as:
//! - salt: 8 bytes
//! - nonce: 24 bytes
//! - length: 8 bytes (big-endian signed int64)
//! - sealed box: variable length (includes 16-byte Poly1305 MAC)

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use scrypt::{Params, scrypt};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, TaintboxError};

pub(crate) const SALT_LEN: usize = 8;
pub(crate) const NONCE_LEN: usize = 24;
const LENGTH_LEN: usize = 8;
const KEY_LEN: usize = 32;

/// scrypt cost parameters: N = 2^15, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

fn derive_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN).map_err(|e| {
        TaintboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::ScryptFailure,
            "invalid scrypt parameters",
            e,
        )
    })?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt(passphrase, salt, &params, &mut key[..]).map_err(|e| {
        TaintboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::ScryptFailure,
            "scrypt key derivation failed",
            e,
        )
    })?;
    Ok(key)
}

/// Seals `plaintext` under `passphrase` with a random salt and nonce.
pub fn encrypt(passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    encrypt_deterministic(passphrase, plaintext, &salt, &nonce)
}

/// Seals with a caller-chosen salt and nonce.
///
/// Only for reproducible test output. Reusing a nonce under the same key
/// breaks secretbox; production code goes through [`encrypt`].
pub fn encrypt_deterministic(
    passphrase: &[u8],
    plaintext: &[u8],
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let key = derive_key(passphrase, salt)?;
    let cipher = XSalsa20Poly1305::new((&*key).into());

    let sealed_box = cipher
        .encrypt(&Nonce::from(*nonce), plaintext)
        .map_err(|_| {
            TaintboxError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::SecretboxFailure,
                "secretbox sealing failed",
            )
        })?;

    let sealed_box_len = sealed_box.len() as i64;
    let mut output = Vec::with_capacity(SALT_LEN + NONCE_LEN + LENGTH_LEN + sealed_box.len());
    output.extend_from_slice(salt);
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed_box_len.to_be_bytes());
    output.extend_from_slice(&sealed_box);
    Ok(output)
}

/// The pieces of a sealed value, borrowed from the input.
struct Sealed<'a> {
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    sealed_box: &'a [u8],
}

fn truncated(what: &str) -> TaintboxError {
    TaintboxError::with_kind(
        ErrorCategory::User,
        ErrorKind::TruncatedInput,
        format!("input likely truncated while reading {}", what),
    )
}

fn take<'a, const N: usize>(input: &mut &'a [u8], what: &str) -> Result<[u8; N]> {
    if input.len() < N {
        return Err(truncated(what));
    }
    let whole: &'a [u8] = *input;
    let (head, rest) = whole.split_at(N);
    *input = rest;
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    Ok(out)
}

fn split(ciphertext: &[u8]) -> Result<Sealed<'_>> {
    let mut rest = ciphertext;
    let salt = take::<SALT_LEN>(&mut rest, "salt")?;
    let nonce = take::<NONCE_LEN>(&mut rest, "nonce")?;
    let length = i64::from_be_bytes(take::<LENGTH_LEN>(&mut rest, "sealed box length")?);

    if length < 0 {
        return Err(TaintboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::BinaryFormat,
            "negative sealed box length (when interpreted as a big-endian i64)",
        ));
    }
    // Valid input can fail this on platforms with a small isize.
    let length = usize::try_from(length).map_err(|e| {
        TaintboxError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::BinaryFormat,
            "sealed box length exceeds this system's address space",
            e,
        )
    })?;

    if rest.len() < length {
        return Err(TaintboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::TruncatedInput,
            "truncated or corrupt input; claimed length greater than available input",
        ));
    }
    if rest.len() > length {
        return Err(TaintboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::TrailingData,
            "invalid input: unexpected data after sealed box",
        ));
    }

    Ok(Sealed {
        salt,
        nonce,
        sealed_box: rest,
    })
}

/// Opens a sealed value with `passphrase`.
pub fn decrypt(passphrase: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let sealed = split(ciphertext)?;
    let key = derive_key(passphrase, &sealed.salt)?;
    let cipher = XSalsa20Poly1305::new((&*key).into());
    let plaintext = cipher
        .decrypt(&Nonce::from(sealed.nonce), sealed.sealed_box)
        .map_err(|_| {
            TaintboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "corrupt input, tampered-with data, or bad passphrase",
            )
        })?;
    Ok(Zeroizing::new(plaintext))
}
