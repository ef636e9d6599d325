//! # Core Protocol Components
//!
//! Packet layout and the encrypted, signed wire codec.
//!
//! ## Wire Format
//! ```text
//! [Magic(2)] [Nonce(4)] | [Version(1)] [Command(1)] [Sequence(4)] [Length(2)] [Payload(N)] [Padding(P)] | [Signature(65)]
//!                       |<---------------- encrypted with Salsa20 ----------------------------->|  encrypted separately
//! ```
//!
//! All integers are big-endian. `N <= 1030`, `P < 19`. The signature is a
//! recoverable secp256k1 signature over the BLAKE3 hash of everything before
//! it, so the receiver learns the sender's public key from the frame itself.
//!
//! ## Security
//! - Declared payload lengths above the maximum are rejected before any copy
//! - The stream key derives from the receiver's public key and is not secret;
//!   integrity and sender identity come from the signature

pub mod codec;
pub mod packet;
