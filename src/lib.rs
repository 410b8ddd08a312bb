//! Taintbox - JSON serialization that keeps tainted and vault-encrypted
//! values intact across a round trip

#![forbid(unsafe_code)]

pub mod decoder;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod secretcrypt;
pub mod secrets;
pub mod taint;
pub mod value;
pub mod varmor;
pub mod vault;

pub use decoder::{DecodeOptions, Decoder, decode};
pub use encoder::{EncodeOptions, Encoder, encode};
pub use envelope::SentinelCheck;
pub use error::{ErrorCategory, ErrorKind, Result, TaintboxError};
pub use secrets::{DEFAULT_STORE, EncryptedScalar, SecretResolver, SecretStores, Secrets};
pub use taint::{ContainerRegistry, Reduction, TaintedContainer, TaintedList, TaintedMap, wrap};
pub use value::{MappingLike, Object, TaintedText, Timestamp, Value};
pub use vault::Vault;
