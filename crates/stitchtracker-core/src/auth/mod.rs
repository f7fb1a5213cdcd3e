//! Authentication and session lifecycle.
//!
//! This module provides:
//! - `SessionManager`: owns the access/refresh token pair, renews the access
//!   token ahead of expiry, and mediates every authenticated request
//! - `CredentialStore`: persisted mirror of the token pair over a
//!   `KeyValueStore` (file, OS keychain, or memory)
//! - `claims`: unverified decoding of the access token's expiry

pub mod claims;
pub mod credentials;
pub mod session;

pub use credentials::{
    CredentialPair, CredentialStore, FileStore, KeyValueStore, KeyringStore, MemoryStore,
};
pub use session::{SessionManager, SessionStatus, DEFAULT_RENEWAL_SKEW_SECS};
