//! Public and private header layouts.
//!
//! Public header (always cleartext, 42 bytes):
//! ```text
//! +-----------+---------------------+------------+----------------+
//! | "NTTK"    | Session ID          | CryptoMark | Payload Size   |
//! | 4 bytes   | 32 bytes            | 2 bytes    | u32 BE         |
//! +-----------+---------------------+------------+----------------+
//! ```
//!
//! Private header (17 bytes; sealed inside the envelope for encrypted
//! datagrams, cleartext otherwise):
//! ```text
//! +----------+--------+--------+------------+--------+
//! | Version  | Seq    | Ack    | Fragmented | Type   |
//! | u32 BE   | u32 BE | u32 BE | u8         | u32 BE |
//! +----------+--------+--------+------------+--------+
//! ```

use crate::core::{
    DatagramError, CRYPTO_MARK, HASH_LEN, NOCRYPTO_MARK, PROTOCOL_VERSION, SIGNATURE,
    TYPE_CONNECTION_REJECTED, TYPE_PUSH_SCHEMAS, TYPE_REGISTER_CHALLENGE,
    TYPE_REGISTER_CHALLENGE2, TYPE_REQUEST_REGISTER, TYPE_SEND_METRICS,
};
use crate::wire::{WireReader, WireWriter};

/// Session identifier: the width of the key-agreement hash.
///
/// All-zero until the server chooses the canonical value in its registration
/// challenge; stable and echoed verbatim for the rest of the session.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; HASH_LEN]);

impl SessionId {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// The all-zero placeholder an agent uses before registration.
    pub fn zero() -> Self {
        Self([0u8; HASH_LEN])
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Whether this is the pre-registration placeholder.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionId({self})")
    }
}

/// Whether a frame's private section is AEAD-sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMark {
    /// `"CC"`: the bytes after the public header are an envelope record.
    Encrypted,
    /// `"NC"`: the private header and payload are cleartext.
    Plain,
}

impl CryptoMark {
    /// The two-byte wire form.
    pub fn as_bytes(self) -> [u8; 2] {
        match self {
            CryptoMark::Encrypted => CRYPTO_MARK,
            CryptoMark::Plain => NOCRYPTO_MARK,
        }
    }

    /// Parse the two-byte wire form.
    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        match bytes {
            CRYPTO_MARK => Some(CryptoMark::Encrypted),
            NOCRYPTO_MARK => Some(CryptoMark::Plain),
            _ => None,
        }
    }
}

/// Datagram type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DatagramType {
    /// Agent's registration request.
    RequestRegister = TYPE_REQUEST_REGISTER,
    /// Server's challenge.
    RegisterChallenge = TYPE_REGISTER_CHALLENGE,
    /// Agent's challenge response.
    RegisterChallenge2 = TYPE_REGISTER_CHALLENGE2,
    /// Session termination.
    ConnectionRejected = TYPE_CONNECTION_REJECTED,
    /// Sealed schema distribution.
    PushSchemas = TYPE_PUSH_SCHEMAS,
    /// Sealed metric report.
    SendMetrics = TYPE_SEND_METRICS,
}

impl DatagramType {
    /// Parse a wire tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            TYPE_REQUEST_REGISTER => Some(Self::RequestRegister),
            TYPE_REGISTER_CHALLENGE => Some(Self::RegisterChallenge),
            TYPE_REGISTER_CHALLENGE2 => Some(Self::RegisterChallenge2),
            TYPE_CONNECTION_REJECTED => Some(Self::ConnectionRejected),
            TYPE_PUSH_SCHEMAS => Some(Self::PushSchemas),
            TYPE_SEND_METRICS => Some(Self::SendMetrics),
            _ => None,
        }
    }

    /// The wire tag.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// The crypto mark this type must travel under: sealed for the two
    /// post-handshake classes, cleartext for the handshake.
    pub fn crypto_mark(self) -> CryptoMark {
        match self {
            DatagramType::PushSchemas | DatagramType::SendMetrics => CryptoMark::Encrypted,
            _ => CryptoMark::Plain,
        }
    }
}

/// Consume the next four bytes and report whether they are the protocol
/// signature. A short buffer is not ours either.
pub fn verify_signature(reader: &mut WireReader<'_>) -> bool {
    matches!(reader.read_array::<4>(), Ok(sig) if sig == SIGNATURE)
}

/// The cleartext header every frame starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicHeader {
    /// Session this frame belongs to.
    pub session_id: SessionId,
    /// Whether the private section is sealed.
    pub crypto_mark: CryptoMark,
    /// Byte length of everything after this header.
    pub payload_size: u32,
}

impl PublicHeader {
    /// Append the header's wire form, signature included.
    pub fn write_to(&self, writer: &mut WireWriter) {
        writer.write_bytes(&SIGNATURE);
        writer.write_bytes(self.session_id.as_bytes());
        writer.write_bytes(&self.crypto_mark.as_bytes());
        writer.write_u32(self.payload_size);
    }

    /// Parse the header, signature included.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, DatagramError> {
        if !verify_signature(reader) {
            return Err(DatagramError::InvalidSignature);
        }
        let session_id = SessionId::from_bytes(reader.read_array::<HASH_LEN>()?);
        let mark_bytes = reader.read_array::<2>()?;
        let crypto_mark =
            CryptoMark::from_bytes(mark_bytes).ok_or(DatagramError::InvalidCryptoMark(mark_bytes))?;
        let payload_size = reader.read_u32()?;
        Ok(Self {
            session_id,
            crypto_mark,
            payload_size,
        })
    }
}

/// The versioned header carried with every datagram, sealed or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateHeader {
    /// Protocol version; always 1.
    pub version: u32,
    /// Sender's sequence number (pass-through for a reliability layer).
    pub sequence: u32,
    /// Sender's acknowledgement number (pass-through).
    pub acknowledgement: u32,
    /// Fragmentation flag (pass-through).
    pub fragmented: bool,
    /// The datagram type tag.
    pub datagram_type: DatagramType,
}

impl PrivateHeader {
    /// Append the header's wire form.
    pub fn write_to(&self, writer: &mut WireWriter) {
        writer.write_u32(self.version);
        writer.write_u32(self.sequence);
        writer.write_u32(self.acknowledgement);
        writer.write_u8(u8::from(self.fragmented));
        writer.write_u32(self.datagram_type.tag());
    }

    /// Parse the header; rejects any version other than 1 and unassigned
    /// type tags.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, DatagramError> {
        let version = reader.read_u32()?;
        if version != PROTOCOL_VERSION {
            return Err(DatagramError::InvalidVersion(version));
        }
        let sequence = reader.read_u32()?;
        let acknowledgement = reader.read_u32()?;
        let fragmented = reader.read_u8()? != 0;
        let tag = reader.read_u32()?;
        let datagram_type = DatagramType::from_tag(tag).ok_or(DatagramError::UnknownType(tag))?;
        Ok(Self {
            version,
            sequence,
            acknowledgement,
            fragmented,
            datagram_type,
        })
    }
}

/// The header fields a datagram value carries.
///
/// Crypto mark, version, and type are properties of the variant, and
/// `payload_size` is computed at serialization time, so none of them live
/// here; a datagram value is free of hidden state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Session this datagram belongs to.
    pub session_id: SessionId,
    /// Sequence number.
    pub sequence: u32,
    /// Acknowledgement number.
    pub acknowledgement: u32,
    /// Fragmentation flag.
    pub fragmented: bool,
}

impl Header {
    /// Create a header for a session with the given counters.
    pub fn new(session_id: SessionId, sequence: u32, acknowledgement: u32) -> Self {
        Self {
            session_id,
            sequence,
            acknowledgement,
            fragmented: false,
        }
    }

    /// Combine parsed public and private headers.
    pub fn from_parts(public: &PublicHeader, private: &PrivateHeader) -> Self {
        Self {
            session_id: public.session_id,
            sequence: private.sequence,
            acknowledgement: private.acknowledgement,
            fragmented: private.fragmented,
        }
    }

    /// The private header this datagram serializes with.
    pub fn private_header(&self, datagram_type: DatagramType) -> PrivateHeader {
        PrivateHeader {
            version: PROTOCOL_VERSION,
            sequence: self.sequence,
            acknowledgement: self.acknowledgement,
            fragmented: self.fragmented,
            datagram_type,
        }
    }

    /// The public header, given the payload length that will follow it.
    pub fn public_header(&self, datagram_type: DatagramType, payload_size: u32) -> PublicHeader {
        PublicHeader {
            session_id: self.session_id,
            crypto_mark: datagram_type.crypto_mark(),
            payload_size,
        }
    }
}
