//! # redline-credentials
//!
//! The secret broker. Actions carry [`SecretRef`](redline_policy::SecretRef)s,
//! never values. When an approved action is about to run, the gateway asks
//! the [`SecretBroker`] to resolve each reference for that one execution.
//! The broker checks the reference against its grants, fetches the value
//! from a [`CredentialBackend`], and hands back an [`EphemeralSecret`] that
//! zeroizes on drop.
//!
//! Values are held as [`secrecy::SecretString`]: they do not appear in
//! `Debug` output, and nothing in this crate logs them.

pub mod backend;
pub mod broker;
pub mod error;

pub use backend::{CredentialBackend, EnvBackend, StaticBackend, DEFAULT_ENV_PREFIX};
pub use broker::{
    EphemeralSecret, ResolvedSecrets, SecretBroker, SecretGrant, SecretScope, MIN_SECRET_LEN,
};
pub use error::CredentialError;
