//! Kalshi API client library.
//!
//! Credential storage, RSA-PSS request signing and a rate-limited REST
//! client for the Kalshi trade API.

pub mod auth;
pub mod exchange;
pub mod keystore;
pub mod rate_limit;
pub mod rest;

pub use auth::KalshiAuth;
pub use exchange::ExchangeApi;
pub use keystore::{Credential, FileKeyStore, KeyStore, MemoryKeyStore};
pub use rate_limit::RateLimiter;
pub use rest::KalshiRestClient;
