//! Credential sources

mod env_provider;

pub use env_provider::{EnvCredentialSource, EnvMapping};
