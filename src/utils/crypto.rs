//! Cryptographic primitives used by the packet codec.
//!
//! - **Stream cipher**: Salsa20/20, keyed from the receiver's compressed public
//!   key, with a 4-byte wire nonce widened to the 8-byte Salsa20 IV.
//! - **Content hash**: BLAKE3-256.
//! - **Signatures**: secp256k1 ECDSA in the 65-byte compact recoverable form
//!   `[27 + 4 + recovery_id, r, s]`, so the signer's public key can be rebuilt
//!   from the signature and digest alone.
//!
//! The stream key is derived from a *public* key. Anyone who knows the
//! receiver's public key can strip the encryption; authenticity rests on the
//! signature only.

use crate::error::{constants, ProtocolError, Result};
use salsa20::cipher::{KeyIvInit, StreamCipher};
use salsa20::Salsa20;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

/// Size of a BLAKE3 digest
pub const DIGEST_SIZE: usize = 32;

/// Size of the Salsa20 key
pub const STREAM_KEY_SIZE: usize = 32;

/// Size of the nonce carried on the wire
pub const WIRE_NONCE_SIZE: usize = 4;

/// Size of a compact recoverable signature
pub const RECOVERABLE_SIGNATURE_SIZE: usize = 65;

/// Size of a compressed secp256k1 public key
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// Header byte base for compact signatures
const COMPACT_HEADER_BASE: u8 = 27;

/// Header flag marking a compressed public key
const COMPACT_COMPRESSED_FLAG: u8 = 4;

/// Hash arbitrary data with BLAKE3-256.
#[inline]
pub fn hash_data(data: &[u8]) -> [u8; DIGEST_SIZE] {
    *blake3::hash(data).as_bytes()
}

/// Derive the Salsa20 key for traffic addressed to `public_key`.
///
/// The parity byte of the compressed encoding is dropped and the 32-byte
/// x-coordinate is used as key material.
pub fn stream_key(public_key: &PublicKey) -> [u8; STREAM_KEY_SIZE] {
    let compressed: [u8; COMPRESSED_PUBLIC_KEY_SIZE] = public_key.serialize();
    let mut key = [0u8; STREAM_KEY_SIZE];
    key.copy_from_slice(&compressed[1..]);
    key
}

/// XOR `data` in place with the Salsa20 keystream for `key` and `nonce`.
///
/// The keystream always starts at block 0, so applying it twice restores the
/// input.
pub fn apply_keystream(
    key: &[u8; STREAM_KEY_SIZE],
    nonce: &[u8; WIRE_NONCE_SIZE],
    data: &mut [u8],
) {
    let mut iv = [0u8; 8];
    iv[8 - WIRE_NONCE_SIZE..].copy_from_slice(nonce);

    let mut cipher = Salsa20::new(key.into(), (&iv).into());
    cipher.apply_keystream(data);
}

/// Sign a digest, producing a compact recoverable signature.
pub fn sign_recoverable(
    secret_key: &SecretKey,
    digest: &[u8; DIGEST_SIZE],
) -> Result<[u8; RECOVERABLE_SIGNATURE_SIZE]> {
    let message = Message::from_digest_slice(digest)
        .map_err(|e| ProtocolError::Signing(format!("{}: {e}", constants::ERR_DIGEST_REJECTED)))?;

    let (recovery_id, compact) = SECP256K1
        .sign_ecdsa_recoverable(&message, secret_key)
        .serialize_compact();

    let mut signature = [0u8; RECOVERABLE_SIGNATURE_SIZE];
    signature[0] = COMPACT_HEADER_BASE + COMPACT_COMPRESSED_FLAG + recovery_id.to_i32() as u8;
    signature[1..].copy_from_slice(&compact);
    Ok(signature)
}

/// Rebuild the signer's public key from a compact recoverable signature.
///
/// Only the compressed-key header range is accepted; node identities are
/// derived from compressed keys.
pub fn recover_public_key(
    signature: &[u8; RECOVERABLE_SIGNATURE_SIZE],
    digest: &[u8; DIGEST_SIZE],
) -> Result<PublicKey> {
    let first = COMPACT_HEADER_BASE + COMPACT_COMPRESSED_FLAG;
    let header = signature[0];
    if !(first..first + 4).contains(&header) {
        return Err(ProtocolError::SignatureRecovery(
            constants::ERR_INVALID_RECOVERY_HEADER.into(),
        ));
    }

    let recovery_id = RecoveryId::from_i32(i32::from(header - first))
        .map_err(|e| ProtocolError::SignatureRecovery(e.to_string()))?;
    let recoverable = RecoverableSignature::from_compact(&signature[1..], recovery_id)
        .map_err(|e| ProtocolError::SignatureRecovery(e.to_string()))?;
    let message = Message::from_digest_slice(digest)
        .map_err(|e| ProtocolError::SignatureRecovery(e.to_string()))?;

    SECP256K1
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| ProtocolError::SignatureRecovery(e.to_string()))
}

/// Public key belonging to `secret_key`.
pub fn public_key_of(secret_key: &SecretKey) -> PublicKey {
    PublicKey::from_secret_key(SECP256K1, secret_key)
}

/// Parse a hex-encoded 32-byte private key.
pub fn parse_secret_key(encoded: &str) -> Result<SecretKey> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| {
        ProtocolError::InvalidKey(format!("{}: {e}", constants::ERR_PRIVATE_KEY_HEX))
    })?;
    SecretKey::from_slice(&bytes).map_err(|e| {
        ProtocolError::InvalidKey(format!("{}: {e}", constants::ERR_PRIVATE_KEY_RANGE))
    })
}

/// Parse a hex-encoded public key (compressed or uncompressed SEC1).
pub fn parse_public_key(encoded: &str) -> Result<PublicKey> {
    let bytes = hex::decode(encoded.trim()).map_err(|e| {
        ProtocolError::InvalidKey(format!("{}: {e}", constants::ERR_PUBLIC_KEY_HEX))
    })?;
    PublicKey::from_slice(&bytes).map_err(|e| {
        ProtocolError::InvalidKey(format!("{}: {e}", constants::ERR_PUBLIC_KEY_POINT))
    })
}
