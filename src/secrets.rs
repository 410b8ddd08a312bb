//! Encrypted scalars and the stores that can open them
//!
//! An [`EncryptedScalar`] only carries ciphertext. Plaintext is reachable
//! once a [`SecretResolver`] has been bound to it, which the decoder does
//! from its [`SecretStores`] when a `default` store is registered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, Result, TaintboxError};
use crate::vault::Vault;

/// Identifier of the store bound to decoded encrypted scalars.
pub const DEFAULT_STORE: &str = "default";

/// Turns ciphertext into plaintext using previously supplied secret material.
pub trait SecretResolver: Send + Sync {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Ciphertext paired with a lazily bound resolver.
#[derive(Clone)]
pub struct EncryptedScalar {
    ciphertext: Vec<u8>,
    resolver: Option<Arc<dyn SecretResolver>>,
}

impl EncryptedScalar {
    /// An unbound scalar.
    pub fn new(ciphertext: impl Into<Vec<u8>>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SecretResolver>) -> Self {
        self.bind(resolver);
        self
    }

    /// Binds (or rebinds) the resolver used by [`EncryptedScalar::plaintext`].
    pub fn bind(&mut self, resolver: Arc<dyn SecretResolver>) {
        self.resolver = Some(resolver);
    }

    pub fn is_bound(&self) -> bool {
        self.resolver.is_some()
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Decrypts through the bound resolver.
    pub fn plaintext(&self) -> Result<Zeroizing<Vec<u8>>> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            TaintboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::ResolverUnbound,
                "encrypted value has no secret store bound; register one before decoding",
            )
        })?;
        resolver.decrypt(&self.ciphertext)
    }

    /// Decrypts and requires the plaintext to be UTF-8.
    pub fn plaintext_string(&self) -> Result<Zeroizing<String>> {
        let bytes = self.plaintext()?;
        let text = std::str::from_utf8(&bytes).map_err(|e| {
            TaintboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Encoding,
                "decrypted value is not valid UTF-8",
                e,
            )
        })?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

impl fmt::Debug for EncryptedScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedScalar")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// One passphrase, labelled with the vault id it belongs to.
#[derive(Clone)]
pub struct VaultSecret {
    pub id: String,
    passphrase: Zeroizing<Vec<u8>>,
}

impl VaultSecret {
    pub fn passphrase(&self) -> &[u8] {
        &self.passphrase
    }
}

/// Secret material handed to a store at registration time.
///
/// Order matters: resolvers try secrets first to last.
#[derive(Clone, Default)]
pub struct Secrets {
    entries: Vec<VaultSecret>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single passphrase under the `default` vault id.
    pub fn single(passphrase: impl Into<Vec<u8>>) -> Self {
        Self::new().with(DEFAULT_STORE, passphrase)
    }

    pub fn with(mut self, id: impl Into<String>, passphrase: impl Into<Vec<u8>>) -> Self {
        self.push(id, passphrase);
        self
    }

    pub fn push(&mut self, id: impl Into<String>, passphrase: impl Into<Vec<u8>>) {
        self.entries.push(VaultSecret {
            id: id.into(),
            passphrase: Zeroizing::new(passphrase.into()),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &VaultSecret> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|s| &s.id))
            .finish()
    }
}

/// Builds a resolver from secret material.
pub type ResolverFactory = Arc<dyn Fn(Secrets) -> Arc<dyn SecretResolver> + Send + Sync>;

/// Store identifier to resolver. Registration overwrites, it never merges.
#[derive(Clone)]
pub struct SecretStores {
    resolvers: HashMap<String, Arc<dyn SecretResolver>>,
    factory: ResolverFactory,
}

impl SecretStores {
    /// Empty stores whose resolvers are [`Vault`]s.
    pub fn new() -> Self {
        Self::with_factory(Arc::new(|secrets: Secrets| -> Arc<dyn SecretResolver> {
            Arc::new(Vault::new(secrets))
        }))
    }

    /// Empty stores whose resolvers come from `factory`.
    pub fn with_factory(factory: ResolverFactory) -> Self {
        Self {
            resolvers: HashMap::new(),
            factory,
        }
    }

    /// Builds a resolver from `secrets` and stores it under `identifier`.
    pub fn register(&mut self, identifier: impl Into<String>, secrets: Secrets) {
        let identifier = identifier.into();
        debug!(store = %identifier, secrets = secrets.len(), "registering secret store");
        let resolver = (self.factory)(secrets);
        self.resolvers.insert(identifier, resolver);
    }

    /// Stores a prebuilt resolver under `identifier`.
    pub fn register_resolver(
        &mut self,
        identifier: impl Into<String>,
        resolver: Arc<dyn SecretResolver>,
    ) {
        self.resolvers.insert(identifier.into(), resolver);
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn SecretResolver>> {
        self.resolvers.get(identifier).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl Default for SecretStores {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SecretStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.resolvers.keys().collect();
        ids.sort();
        f.debug_struct("SecretStores").field("stores", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reverses the ciphertext; enough to tell resolvers apart.
    struct Reverse(&'static str);

    impl SecretResolver for Reverse {
        fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
            let mut out: Vec<u8> = ciphertext.iter().rev().copied().collect();
            out.extend_from_slice(self.0.as_bytes());
            Ok(Zeroizing::new(out))
        }
    }

    #[test]
    fn test_unbound_plaintext_fails() {
        let scalar = EncryptedScalar::new(b"abc".to_vec());
        assert!(!scalar.is_bound());
        let err = scalar.plaintext().expect_err("expected unbound error");
        assert_eq!(err.kind, Some(ErrorKind::ResolverUnbound));
    }

    #[test]
    fn test_bound_plaintext() {
        let scalar = EncryptedScalar::new(b"abc".to_vec()).with_resolver(Arc::new(Reverse("")));
        assert_eq!(&scalar.plaintext().unwrap()[..], b"cba");
        assert_eq!(scalar.plaintext_string().unwrap().as_str(), "cba");
    }

    #[test]
    fn test_debug_hides_contents() {
        let scalar = EncryptedScalar::new(b"very secret ciphertext".to_vec());
        let shown = format!("{:?}", scalar);
        assert!(!shown.contains("secret"));

        let secrets = Secrets::single("hunter2");
        assert!(!format!("{:?}", secrets).contains("hunter2"));
    }

    #[test]
    fn test_register_uses_factory_and_overwrites() {
        let mut stores = SecretStores::with_factory(Arc::new(|secrets: Secrets| {
            let tag: &'static str = if secrets.len() == 1 { "one" } else { "many" };
            Arc::new(Reverse(tag)) as Arc<dyn SecretResolver>
        }));
        assert!(stores.is_empty());

        stores.register(DEFAULT_STORE, Secrets::single("a"));
        let first = stores.get(DEFAULT_STORE).unwrap();
        assert_eq!(&first.decrypt(b"x").unwrap()[..], b"xone");

        stores.register(DEFAULT_STORE, Secrets::single("a").with("ops", "b"));
        let second = stores.get(DEFAULT_STORE).unwrap();
        assert_eq!(&second.decrypt(b"x").unwrap()[..], b"xmany");

        assert!(stores.get("other").is_none());
    }
}
