//! Credential domain

mod credential;
mod provider;

pub use credential::Credential;
pub use provider::CredentialSource;

#[cfg(test)]
pub use provider::mock;
