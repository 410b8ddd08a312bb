//! Default secret resolver
//!
//! A vault holds an ordered list of passphrases. Ciphertext is armored
//! sealed data (see [`crate::varmor`]); opening tries each passphrase in
//! turn and returns the first plaintext that authenticates.

use std::sync::Arc;

use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, TaintboxError};
use crate::secrets::{EncryptedScalar, SecretResolver, Secrets};
use crate::{secretcrypt, varmor};

#[derive(Debug, Clone)]
pub struct Vault {
    secrets: Secrets,
}

impl Vault {
    pub fn new(secrets: Secrets) -> Self {
        Self { secrets }
    }

    /// Seals `plaintext` with the first configured secret.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<String> {
        let secret = self.secrets.iter().next().ok_or_else(|| {
            TaintboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::NoMatchingSecret,
                "vault has no secrets to encrypt with",
            )
        })?;
        let sealed = secretcrypt::encrypt(secret.passphrase(), plaintext)
            .map_err(|e| e.with_context("failed to seal vault value"))?;
        Ok(varmor::wrap(&sealed))
    }

    /// Seals `plaintext` into an encrypted scalar already bound to this vault.
    pub fn encrypt(self: &Arc<Self>, plaintext: &[u8]) -> Result<EncryptedScalar> {
        let armored = self.encrypt_bytes(plaintext)?;
        Ok(EncryptedScalar::new(armored.into_bytes()).with_resolver(self.clone()))
    }
}

impl SecretResolver for Vault {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let armored = std::str::from_utf8(ciphertext).map_err(|e| {
            TaintboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArmoringInvalid,
                "vault ciphertext is not valid UTF-8",
                e,
            )
        })?;
        let sealed = varmor::unwrap(armored).map_err(|e| e.with_context("failed to unarmor"))?;

        for secret in self.secrets.iter() {
            match secretcrypt::decrypt(secret.passphrase(), &sealed) {
                Ok(plaintext) => {
                    debug!(vault_id = %secret.id, "opened vault value");
                    return Ok(plaintext);
                }
                Err(e) if e.kind == Some(ErrorKind::AuthenticationFailed) => {
                    trace!(vault_id = %secret.id, "secret did not open vault value");
                }
                // Layout errors will not improve with another passphrase.
                Err(e) => return Err(e.with_context("failed to decrypt")),
            }
        }

        Err(TaintboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::NoMatchingSecret,
            format!(
                "none of the {} configured secrets could decrypt the value",
                self.secrets.len()
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let vault = Arc::new(Vault::new(Secrets::single("hunter2")));
        let scalar = vault.encrypt(b"s3cret").unwrap();

        assert!(scalar.is_bound());
        assert!(varmor::is_armored(scalar.ciphertext()));
        assert_eq!(&scalar.plaintext().unwrap()[..], b"s3cret");
    }

    #[test]
    fn test_tries_every_secret() {
        let writer = Vault::new(Secrets::single("ops-pass"));
        let armored = writer.encrypt_bytes(b"payload").unwrap();

        let reader = Vault::new(Secrets::new().with("dev", "dev-pass").with("ops", "ops-pass"));
        assert_eq!(&reader.decrypt(armored.as_bytes()).unwrap()[..], b"payload");
    }

    #[test]
    fn test_no_matching_secret() {
        let armored = Vault::new(Secrets::single("right"))
            .encrypt_bytes(b"payload")
            .unwrap();
        let err = Vault::new(Secrets::single("wrong"))
            .decrypt(armored.as_bytes())
            .expect_err("expected no match");
        assert_eq!(err.kind, Some(ErrorKind::NoMatchingSecret));
    }

    #[test]
    fn test_empty_vault_cannot_encrypt() {
        let err = Vault::new(Secrets::new())
            .encrypt_bytes(b"x")
            .expect_err("expected empty vault error");
        assert_eq!(err.kind, Some(ErrorKind::NoMatchingSecret));
    }

    #[test]
    fn test_rejects_unarmored_ciphertext() {
        let err = Vault::new(Secrets::single("x"))
            .decrypt(b"plain old text")
            .expect_err("expected armor error");
        assert_eq!(err.kind, Some(ErrorKind::ArmoringInvalid));
    }
}
