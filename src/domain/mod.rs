//! Domain layer - provider identities, credentials and the contracts the
//! gateway is built from

pub mod cache;
pub mod clock;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod signer;

pub use cache::{CacheKey, CacheStats, ResponseCache, TtlClass, TtlPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{Credential, CredentialSource};
pub use error::GatewayError;
pub use identity::{ApiIdentity, AuthScheme, HttpMethod, RateTier, ResponseEnvelope};
pub use rate_limit::{BackoffConfig, LimiterSettings, LimiterSnapshot};
pub use signer::{RequestBody, RequestSigner, SignedRequest, UnsignedRequest};
