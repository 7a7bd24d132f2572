//! Request signers, one per authentication scheme

mod factory;
mod hmac_sha512;
mod jwt;
mod static_key;

pub use factory::{SchemeSigner, build_signer};
pub use hmac_sha512::{API_KEY_HEADER, API_SIGN_HEADER, HmacSigner, next_nonce};
pub use jwt::{DEFAULT_ISSUER, DEFAULT_SERVICE, JWT_LIFETIME, JwtClaims, JwtSigner};
pub use static_key::{ApiKeyHeaderSigner, BearerSigner};
