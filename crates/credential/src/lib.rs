//! Cross-account credential store with expiry tracking and
//! single-flight refresh.
//!
//! [`CredentialStore`] is the only structure in the engine mutated by
//! multiple concurrent tasks. All mutations are mutually exclusive per
//! cache key; reads of different keys proceed independently.

mod store;

pub use store::CredentialStore;
