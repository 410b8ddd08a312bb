//! Versioned armoring for vault ciphertext
//!
//! Sealed bytes are base64url-encoded behind a version marker, so the
//! ciphertext of an encrypted scalar is always strict ASCII text:
//! `taintbox-vault1:{base64url-no-padding}`.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::error::{ErrorCategory, ErrorKind, Result, TaintboxError};

/// Prefix shared by every armor version.
const MAGIC_PREFIX: &str = "taintbox-vault";

/// Version 1 marker.
const V1_MAGIC: &str = "taintbox-vault1:";

/// Armors sealed bytes.
pub fn wrap(body: &[u8]) -> String {
    format!("{}{}", V1_MAGIC, URL_SAFE_NO_PAD.encode(body))
}

/// True if `text` looks like armored vault data of any version.
pub fn is_armored(text: &[u8]) -> bool {
    text.starts_with(MAGIC_PREFIX.as_bytes())
}

/// Strips the armor, returning the sealed bytes.
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    if let Some(encoded) = armored.strip_prefix(V1_MAGIC) {
        URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
            TaintboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArmoringDecode,
                format!("base64 decoding failed: {}", e),
                e,
            )
        })
    } else if armored.starts_with(MAGIC_PREFIX) {
        Err(TaintboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringFromFuture,
            "ciphertext claims to be vault data, but not a version we support",
        ))
    } else {
        Err(TaintboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "ciphertext unrecognized as vault data",
        ))
    }
}
