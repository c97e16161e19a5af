//! The cleartext registration variants.
//!
//! All four travel under the `"NC"` mark: the private header and payload are
//! readable before any key agreement has completed. RegisterChallenge2 is
//! still cleartext, but its payload is the derived challenge response, so it
//! proves possession of the shared secret without exposing it.

use crate::core::{DatagramError, PRIVATE_HEADER_SIZE};
use crate::wire::{WireReader, WireWriter};

use super::header::{DatagramType, Header, PrivateHeader, PublicHeader};
use super::{expect_drained, expect_type};

/// Serialize a cleartext frame: private header and payload, with the public
/// header's size computed before it is written.
fn encode_plain(
    header: &Header,
    datagram_type: DatagramType,
    payload: impl FnOnce(&mut WireWriter),
) -> Vec<u8> {
    let mut body = WireWriter::with_capacity(PRIVATE_HEADER_SIZE + 64);
    header.private_header(datagram_type).write_to(&mut body);
    payload(&mut body);
    let body = body.finish();

    let mut frame = WireWriter::with_capacity(body.len() + 64);
    header
        .public_header(datagram_type, body.len() as u32)
        .write_to(&mut frame);
    frame.write_bytes(&body);
    frame.finish()
}

/// Agent's opening message: its ephemeral public key.
///
/// Payload: `u32 pkLen ‖ pk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRegister {
    /// Shared header fields; `session_id` is the agent's placeholder.
    pub header: Header,
    /// The agent's ephemeral public key.
    pub public_key: Vec<u8>,
}

impl RequestRegister {
    /// The frame as one contiguous byte string.
    pub fn serialize(&self) -> Vec<u8> {
        encode_plain(&self.header, DatagramType::RequestRegister, |w| {
            w.write_block(&self.public_key)
        })
    }

    /// Reconstruct from the bytes after the private header.
    pub fn deserialize(
        reader: &mut WireReader<'_>,
        public: &PublicHeader,
        private: &PrivateHeader,
    ) -> Result<Self, DatagramError> {
        expect_type(private, DatagramType::RequestRegister)?;
        let public_key = reader.read_block()?.to_vec();
        expect_drained(reader)?;
        Ok(Self {
            header: Header::from_parts(public, private),
            public_key,
        })
    }
}

/// Server's answer: its public key plus fresh challenge and salt nonces.
///
/// The `session_id` in this frame is the canonical identifier the server
/// chose; the agent echoes it from here on.
///
/// Payload: `u32 pkLen ‖ pk ‖ u32 chLen ‖ ch ‖ u32 saltLen ‖ salt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterChallenge {
    /// Shared header fields; `session_id` is now authoritative.
    pub header: Header,
    /// The server's ephemeral public key.
    pub public_key: Vec<u8>,
    /// Fresh challenge nonce.
    pub challenge: Vec<u8>,
    /// Fresh key-derivation salt.
    pub salt: Vec<u8>,
}

impl RegisterChallenge {
    /// The frame as one contiguous byte string.
    pub fn serialize(&self) -> Vec<u8> {
        encode_plain(&self.header, DatagramType::RegisterChallenge, |w| {
            w.write_block(&self.public_key);
            w.write_block(&self.challenge);
            w.write_block(&self.salt);
        })
    }

    /// Reconstruct from the bytes after the private header.
    pub fn deserialize(
        reader: &mut WireReader<'_>,
        public: &PublicHeader,
        private: &PrivateHeader,
    ) -> Result<Self, DatagramError> {
        expect_type(private, DatagramType::RegisterChallenge)?;
        let public_key = reader.read_block()?.to_vec();
        let challenge = reader.read_block()?.to_vec();
        let salt = reader.read_block()?.to_vec();
        expect_drained(reader)?;
        Ok(Self {
            header: Header::from_parts(public, private),
            public_key,
            challenge,
            salt,
        })
    }
}

/// Agent's proof of possession: the derived challenge response.
///
/// Payload: `u32 chLen ‖ ch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterChallenge2 {
    /// Shared header fields.
    pub header: Header,
    /// The challenge response both peers can derive.
    pub challenge_response: Vec<u8>,
}

impl RegisterChallenge2 {
    /// The frame as one contiguous byte string.
    pub fn serialize(&self) -> Vec<u8> {
        encode_plain(&self.header, DatagramType::RegisterChallenge2, |w| {
            w.write_block(&self.challenge_response)
        })
    }

    /// Reconstruct from the bytes after the private header.
    pub fn deserialize(
        reader: &mut WireReader<'_>,
        public: &PublicHeader,
        private: &PrivateHeader,
    ) -> Result<Self, DatagramError> {
        expect_type(private, DatagramType::RegisterChallenge2)?;
        let challenge_response = reader.read_block()?.to_vec();
        expect_drained(reader)?;
        Ok(Self {
            header: Header::from_parts(public, private),
            challenge_response,
        })
    }
}

/// Session termination. Carries only headers; acceptable in any
/// non-terminal phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRejected {
    /// Shared header fields.
    pub header: Header,
}

impl ConnectionRejected {
    /// The frame as one contiguous byte string.
    pub fn serialize(&self) -> Vec<u8> {
        encode_plain(&self.header, DatagramType::ConnectionRejected, |_| {})
    }

    /// Reconstruct from the bytes after the private header.
    pub fn deserialize(
        reader: &mut WireReader<'_>,
        public: &PublicHeader,
        private: &PrivateHeader,
    ) -> Result<Self, DatagramError> {
        expect_type(private, DatagramType::ConnectionRejected)?;
        expect_drained(reader)?;
        Ok(Self {
            header: Header::from_parts(public, private),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HASH_LEN, PUBLIC_HEADER_SIZE};
    use crate::datagram::header::SessionId;

    fn parse_frame(bytes: &[u8]) -> (WireReader<'_>, PublicHeader, PrivateHeader) {
        let mut reader = WireReader::new(bytes);
        let public = PublicHeader::read(&mut reader).unwrap();
        let private = PrivateHeader::read(&mut reader).unwrap();
        (reader, public, private)
    }

    fn header() -> Header {
        Header::new(SessionId::from_bytes([0x11; HASH_LEN]), 5, 2)
    }

    #[test]
    fn test_request_register_roundtrip() {
        let datagram = RequestRegister {
            header: header(),
            public_key: vec![0xEE; 32],
        };
        let bytes = datagram.serialize();

        // payload_size covers exactly the bytes after the public header
        let declared = u32::from_be_bytes(bytes[38..42].try_into().unwrap());
        assert_eq!(declared as usize, bytes.len() - PUBLIC_HEADER_SIZE);

        let (mut reader, public, private) = parse_frame(&bytes);
        let parsed = RequestRegister::deserialize(&mut reader, &public, &private).unwrap();
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn test_register_challenge_roundtrip() {
        let datagram = RegisterChallenge {
            header: header(),
            public_key: vec![0xAA; 32],
            challenge: vec![0xC4; 16],
            salt: vec![0x5A; 16],
        };
        let bytes = datagram.serialize();
        let (mut reader, public, private) = parse_frame(&bytes);
        let parsed = RegisterChallenge::deserialize(&mut reader, &public, &private).unwrap();
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn test_register_challenge2_roundtrip() {
        let datagram = RegisterChallenge2 {
            header: header(),
            challenge_response: vec![0x77; 32],
        };
        let bytes = datagram.serialize();
        let (mut reader, public, private) = parse_frame(&bytes);
        let parsed = RegisterChallenge2::deserialize(&mut reader, &public, &private).unwrap();
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn test_connection_rejected_roundtrip() {
        let datagram = ConnectionRejected { header: header() };
        let bytes = datagram.serialize();
        // Nothing but the two headers.
        assert_eq!(bytes.len(), PUBLIC_HEADER_SIZE + PRIVATE_HEADER_SIZE);

        let (mut reader, public, private) = parse_frame(&bytes);
        let parsed = ConnectionRejected::deserialize(&mut reader, &public, &private).unwrap();
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let bytes = RequestRegister {
            header: header(),
            public_key: vec![0xEE; 32],
        }
        .serialize();
        let (mut reader, public, private) = parse_frame(&bytes);
        assert!(matches!(
            RegisterChallenge2::deserialize(&mut reader, &public, &private),
            Err(DatagramError::WrongType {
                expected: 2,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let datagram = ConnectionRejected { header: header() };
        let mut bytes = datagram.serialize();
        bytes.extend_from_slice(&[0xFF, 0xFF]);
        // Keep payload_size consistent with the enlarged body.
        let new_size = (bytes.len() - PUBLIC_HEADER_SIZE) as u32;
        bytes[38..42].copy_from_slice(&new_size.to_be_bytes());

        let (mut reader, public, private) = parse_frame(&bytes);
        assert!(matches!(
            ConnectionRejected::deserialize(&mut reader, &public, &private),
            Err(DatagramError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = RequestRegister {
            header: header(),
            public_key: vec![0xEE; 32],
        }
        .serialize();
        // Cut into the key block.
        let cut = &bytes[..bytes.len() - 5];
        let (mut reader, public, private) = parse_frame(cut);
        assert!(matches!(
            RequestRegister::deserialize(&mut reader, &public, &private),
            Err(DatagramError::Truncated(_))
        ));
    }
}
