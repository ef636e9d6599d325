//! # Packet Codec
//!
//! Turns a [`PacketBody`] into an obfuscated, signed frame and back.
//!
//! ## Encode
//! 1. Write magic, a fresh random nonce, the body fields, the payload and
//!    random padding.
//! 2. Encrypt everything from the protocol-version byte through the padding
//!    with Salsa20, keyed from the receiver's public key.
//! 3. Hash the whole frame so far with BLAKE3 and sign the digest with a
//!    recoverable signature.
//! 4. Encrypt the signature with the same key and nonce and append it.
//!
//! ## Decode
//! The inverse, in the order: length check, magic check, signature
//! decryption and sender recovery, body decryption, payload bounds.
//!
//! Frames do not carry their own total length (the padding length is never
//! transmitted), so a decode treats everything buffered for the connection as
//! one frame and consumes all of it on success.

use crate::core::packet::{
    DecodedPacket, PacketBody, MAGIC_NUMBER, MAX_PADDING, MAX_PAYLOAD_SIZE, NONCE_OFFSET,
    NONCE_SIZE, PACKET_LENGTH_MIN, PAYLOAD_OFFSET, PROTOCOL_VERSION_OFFSET, SIGNATURE_SIZE,
};
use crate::error::{constants, ProtocolError, Result};
use crate::node::{Identity, NodeId};
use crate::utils::crypto;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::Rng;
use secp256k1::{PublicKey, SecretKey};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// Encode `body` from `sender` to `receiver`.
///
/// # Errors
/// `OversizedPacket` if the payload exceeds [`MAX_PAYLOAD_SIZE`], `Signing` if
/// the signature cannot be produced.
pub fn encode(sender: &SecretKey, receiver: &PublicKey, body: &PacketBody) -> Result<Bytes> {
    if body.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::OversizedPacket(body.payload.len()));
    }

    let padding = random_padding();
    let mut region =
        Vec::with_capacity(PAYLOAD_OFFSET - PROTOCOL_VERSION_OFFSET + body.payload.len() + padding.len());
    region.put_u8(body.protocol);
    region.put_u8(body.command);
    region.put_u32(body.sequence);
    region.put_u16(body.payload.len() as u16);
    region.put_slice(&body.payload);
    region.put_slice(&padding);

    seal(sender, receiver, fresh_nonce(), region)
}

/// Assemble a frame around an already laid out plaintext body region.
fn seal(
    sender: &SecretKey,
    receiver: &PublicKey,
    nonce: [u8; NONCE_SIZE],
    mut region: Vec<u8>,
) -> Result<Bytes> {
    let key = crypto::stream_key(receiver);
    crypto::apply_keystream(&key, &nonce, &mut region);

    let mut frame = BytesMut::with_capacity(PROTOCOL_VERSION_OFFSET + region.len() + SIGNATURE_SIZE);
    frame.put_u16(MAGIC_NUMBER);
    frame.put_slice(&nonce);
    frame.put_slice(&region);

    let digest = crypto::hash_data(&frame);
    let mut signature = crypto::sign_recoverable(sender, &digest)?;
    crypto::apply_keystream(&key, &nonce, &mut signature);
    frame.put_slice(&signature);

    trace!(len = frame.len(), "Encoded frame");
    Ok(frame.freeze())
}

/// Decode the frame buffered in `buffer`, addressed to `receiver`.
///
/// On success the frame is removed from `buffer`. An oversized declared
/// payload discards everything buffered before failing.
///
/// # Errors
/// `IncompletePacket` when fewer than [`PACKET_LENGTH_MIN`] bytes are
/// buffered; the buffer is untouched and the caller should retry once more
/// bytes arrive. Every other error is a protocol violation.
pub fn decode(buffer: &mut BytesMut, receiver: &PublicKey) -> Result<DecodedPacket> {
    if buffer.len() < PACKET_LENGTH_MIN {
        return Err(ProtocolError::IncompletePacket);
    }

    let magic = u16::from_be_bytes([buffer[0], buffer[1]]);
    if magic != MAGIC_NUMBER {
        return Err(ProtocolError::InvalidMagic(magic));
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&buffer[NONCE_OFFSET..PROTOCOL_VERSION_OFFSET]);
    let key = crypto::stream_key(receiver);

    let frame_len = buffer.len();
    let signed_len = frame_len - SIGNATURE_SIZE;

    let mut signature = [0u8; SIGNATURE_SIZE];
    signature.copy_from_slice(&buffer[signed_len..]);
    crypto::apply_keystream(&key, &nonce, &mut signature);

    let digest = crypto::hash_data(&buffer[..signed_len]);
    let public_key = crypto::recover_public_key(&signature, &digest)?;

    let mut region = buffer[PROTOCOL_VERSION_OFFSET..signed_len].to_vec();
    crypto::apply_keystream(&key, &nonce, &mut region);

    let mut cursor = &region[..];
    let protocol = cursor.get_u8();
    let command = cursor.get_u8();
    let sequence = cursor.get_u32();
    let payload_len = cursor.get_u16() as usize;

    if payload_len > MAX_PAYLOAD_SIZE {
        warn!(
            payload_len,
            max = MAX_PAYLOAD_SIZE,
            discarded = buffer.len(),
            "Declared payload too large, discarding buffered input"
        );
        buffer.clear();
        return Err(ProtocolError::OversizedPacket(payload_len));
    }
    if payload_len > cursor.remaining() {
        buffer.clear();
        return Err(ProtocolError::MalformedPacket(
            constants::ERR_PAYLOAD_TRUNCATED.into(),
        ));
    }

    let payload = cursor[..payload_len].to_vec();
    buffer.advance(frame_len);

    Ok(DecodedPacket {
        body: PacketBody {
            protocol,
            command,
            sequence,
            payload,
        },
        node_id: NodeId::from_public_key(&public_key),
        public_key,
        frame_len,
    })
}

fn fresh_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    if getrandom::fill(&mut nonce).is_err() {
        rand::rng().fill(&mut nonce);
    }
    nonce
}

fn random_padding() -> Vec<u8> {
    let mut rng = rand::rng();
    let mut padding = vec![0u8; rng.random_range(0..MAX_PADDING)];
    rng.fill(&mut padding[..]);
    padding
}

/// Outbound message addressed to a specific receiver key.
#[derive(Debug, Clone)]
pub struct OutboundPacket {
    pub body: PacketBody,
    pub receiver: PublicKey,
}

/// Per-connection codec context.
///
/// Decodes frames addressed to the local node and encodes frames signed by
/// it. One instance is attached to each connection and reused across all
/// decode attempts as bytes arrive.
#[derive(Clone)]
pub struct PacketCodec {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl PacketCodec {
    pub fn new(identity: &Identity) -> Self {
        Self {
            secret_key: *identity.secret_key(),
            public_key: *identity.public_key(),
        }
    }
}

impl Decoder for PacketCodec {
    type Item = DecodedPacket;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match decode(src, &self.public_key) {
            Ok(packet) => Ok(Some(packet)),
            Err(ProtocolError::IncompletePacket) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Encoder<OutboundPacket> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: OutboundPacket, dst: &mut BytesMut) -> Result<()> {
        let frame = encode(&self.secret_key, &item.receiver, &item.body)?;
        dst.extend_from_slice(&frame);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::protocol::command::Command;

    const SENDER_KEY: &str = "E9873D79C6D87DC0FB6A5778633389F4453213303DA61F20BD67FC233AA33262";
    const RECEIVER_KEY: &str = "1E99423A4ED27608A15A2616A2B0E9E52CED330AC530EDCC32C8FFC6A526AEDD";

    fn identities() -> (Identity, Identity) {
        (
            Identity::from_hex(SENDER_KEY).unwrap(),
            Identity::from_hex(RECEIVER_KEY).unwrap(),
        )
    }

    #[test]
    fn test_encode_decode_recovers_sender() {
        let (sender, receiver) = identities();
        let body = PacketBody::new(Command::Announcement, 123, vec![7u8; 20]);

        let frame = encode(sender.secret_key(), receiver.public_key(), &body).unwrap();
        assert_eq!(u16::from_be_bytes([frame[0], frame[1]]), MAGIC_NUMBER);
        assert!(frame.len() >= PACKET_LENGTH_MIN + 20);
        assert!(frame.len() < PACKET_LENGTH_MIN + 20 + MAX_PADDING);

        let mut buffer = BytesMut::from(&frame[..]);
        let decoded = decode(&mut buffer, receiver.public_key()).unwrap();

        assert_eq!(decoded.body, body);
        assert_eq!(&decoded.public_key, sender.public_key());
        assert_eq!(decoded.node_id, sender.node_id());
        assert_eq!(decoded.frame_len, frame.len());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_body_is_not_plaintext() {
        let (sender, receiver) = identities();
        let payload = b"clearly visible marker".to_vec();
        let body = PacketBody::new(Command::Response, 1, payload.clone());

        let frame = encode(sender.secret_key(), receiver.public_key(), &body).unwrap();
        assert!(!frame
            .windows(payload.len())
            .any(|window| window == payload.as_slice()));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let (sender, receiver) = identities();
        let body = PacketBody::new(Command::Response, 1, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            encode(sender.secret_key(), receiver.public_key(), &body),
            Err(ProtocolError::OversizedPacket(1031))
        ));
    }

    #[test]
    fn test_short_buffer_is_incomplete_and_untouched() {
        let (sender, receiver) = identities();
        let body = PacketBody::new(Command::Ping, 1, Vec::new());
        let frame = encode(sender.secret_key(), receiver.public_key(), &body).unwrap();

        let mut buffer = BytesMut::from(&frame[..PACKET_LENGTH_MIN - 1]);
        let err = decode(&mut buffer, receiver.public_key()).unwrap_err();
        assert!(err.is_incomplete());
        assert_eq!(buffer.len(), PACKET_LENGTH_MIN - 1);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let (sender, receiver) = identities();
        let body = PacketBody::new(Command::Ping, 1, Vec::new());
        let frame = encode(sender.secret_key(), receiver.public_key(), &body).unwrap();

        let mut tampered = BytesMut::from(&frame[..]);
        tampered[1] ^= 0x01;
        assert!(matches!(
            decode(&mut tampered, receiver.public_key()),
            Err(ProtocolError::InvalidMagic(0x2425))
        ));
    }

    #[test]
    fn test_oversized_declared_payload_discards_buffer() {
        let (sender, receiver) = identities();

        // Correctly signed frame whose length field claims 2000 bytes
        let mut region = Vec::new();
        region.put_u8(0);
        region.put_u8(Command::Response.into());
        region.put_u32(9);
        region.put_u16(2000);
        region.put_slice(&[0xAB; 32]);
        let frame = seal(sender.secret_key(), receiver.public_key(), [9, 9, 9, 9], region).unwrap();

        let mut buffer = BytesMut::from(&frame[..]);
        assert!(matches!(
            decode(&mut buffer, receiver.public_key()),
            Err(ProtocolError::OversizedPacket(2000))
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_truncated_declared_payload_is_malformed() {
        let (sender, receiver) = identities();

        let mut region = Vec::new();
        region.put_u8(0);
        region.put_u8(Command::Response.into());
        region.put_u32(9);
        region.put_u16(500);
        region.put_slice(&[0xCD; 10]);
        let frame = seal(sender.secret_key(), receiver.public_key(), [1, 2, 3, 4], region).unwrap();

        let mut buffer = BytesMut::from(&frame[..]);
        let err = decode(&mut buffer, receiver.public_key()).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPacket(_)));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_wrong_receiver_does_not_authenticate_sender() {
        let (sender, receiver) = identities();
        let body = PacketBody::new(Command::Announcement, 1, vec![1u8; 20]);
        let frame = encode(sender.secret_key(), receiver.public_key(), &body).unwrap();

        // Decoding with the sender's key uses the wrong keystream for the signature
        let mut buffer = BytesMut::from(&frame[..]);
        match decode(&mut buffer, sender.public_key()) {
            Ok(decoded) => assert_ne!(&decoded.public_key, sender.public_key()),
            Err(e) => assert!(e.is_protocol_violation()),
        }
    }

    #[test]
    fn test_codec_trait_maps_incomplete_to_none() {
        let (sender, receiver) = identities();
        let mut codec = PacketCodec::new(&receiver);

        let mut partial = BytesMut::from(&[0x24u8, 0x24, 0, 0, 0][..]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), 5);

        let mut sender_codec = PacketCodec::new(&sender);
        let mut wire = BytesMut::new();
        sender_codec
            .encode(
                OutboundPacket {
                    body: PacketBody::new(Command::Pong, 4, Vec::new()),
                    receiver: *receiver.public_key(),
                },
                &mut wire,
            )
            .unwrap();

        let decoded = codec.decode(&mut wire).unwrap().unwrap();
        assert_eq!(decoded.body.command().unwrap(), Command::Pong);
        assert_eq!(decoded.body.sequence, 4);
        assert!(wire.is_empty());
    }
}
