//! # Utility Modules
//!
//! Cryptographic primitives, logging setup, metrics and timing helpers.
//!
//! ## Components
//! - **Crypto**: Salsa20 stream cipher, BLAKE3 hashing, recoverable secp256k1 signatures
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe observability counters
//! - **Timeout**: Timing constants and async timeout wrappers
//!
//! ## Security
//! - Cryptographically secure RNG (getrandom) for wire nonces
//! - Secret keys never appear in `Debug` output

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod timeout;
