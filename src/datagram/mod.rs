//! The datagram core: header layouts, the six typed variants, and the
//! serialize/deserialize dispatch boundary.
//!
//! Dispatch parses the public header, enforces the declared payload size and
//! the crypto-mark/type discipline, and hands the remaining bytes to the
//! variant named by the private header. Sealed variants need the session's
//! [`EcdheSession`]; metric decoding additionally needs the receiver's
//! [`TaskConfig`].

mod encrypted;
mod handshake;
mod header;

pub use encrypted::{PushSchemas, SendMetrics};
pub use handshake::{ConnectionRejected, RegisterChallenge, RegisterChallenge2, RequestRegister};
pub use header::{
    verify_signature, CryptoMark, DatagramType, Header, PrivateHeader, PublicHeader, SessionId,
};

use crate::core::{DatagramError, SpackError};
use crate::crypto::EcdheSession;
use crate::spack::TaskConfig;
use crate::wire::WireReader;

/// Fail with [`DatagramError::WrongType`] unless the private header names
/// the expected variant.
pub(crate) fn expect_type(
    private: &PrivateHeader,
    expected: DatagramType,
) -> Result<(), DatagramError> {
    if private.datagram_type != expected {
        return Err(DatagramError::WrongType {
            expected: expected.tag(),
            actual: private.datagram_type.tag(),
        });
    }
    Ok(())
}

/// Fail with [`DatagramError::MalformedPayload`] if a parse left bytes
/// behind; length prefixes and the surrounding frame must agree exactly.
pub(crate) fn expect_drained(reader: &WireReader<'_>) -> Result<(), DatagramError> {
    if !reader.is_empty() {
        return Err(DatagramError::MalformedPayload(SpackError::TrailingData {
            remaining: reader.remaining(),
        }));
    }
    Ok(())
}

/// A parsed datagram of any type.
#[derive(Debug, Clone, PartialEq)]
pub enum Datagram {
    /// Agent's registration request.
    RequestRegister(RequestRegister),
    /// Server's challenge.
    RegisterChallenge(RegisterChallenge),
    /// Agent's challenge response.
    RegisterChallenge2(RegisterChallenge2),
    /// Session termination.
    ConnectionRejected(ConnectionRejected),
    /// Sealed schema distribution.
    PushSchemas(PushSchemas),
    /// Sealed metric report.
    SendMetrics(SendMetrics),
}

impl Datagram {
    /// The variant's type tag.
    pub fn datagram_type(&self) -> DatagramType {
        match self {
            Datagram::RequestRegister(_) => DatagramType::RequestRegister,
            Datagram::RegisterChallenge(_) => DatagramType::RegisterChallenge,
            Datagram::RegisterChallenge2(_) => DatagramType::RegisterChallenge2,
            Datagram::ConnectionRejected(_) => DatagramType::ConnectionRejected,
            Datagram::PushSchemas(_) => DatagramType::PushSchemas,
            Datagram::SendMetrics(_) => DatagramType::SendMetrics,
        }
    }

    /// The shared header fields.
    pub fn header(&self) -> &Header {
        match self {
            Datagram::RequestRegister(d) => &d.header,
            Datagram::RegisterChallenge(d) => &d.header,
            Datagram::RegisterChallenge2(d) => &d.header,
            Datagram::ConnectionRejected(d) => &d.header,
            Datagram::PushSchemas(d) => &d.header,
            Datagram::SendMetrics(d) => &d.header,
        }
    }

    /// Parse one frame, dispatching on the private header's type.
    ///
    /// `ecdhe` is required for sealed frames ([`DatagramError::NotLinked`]
    /// otherwise); `config` supplies task descriptors for metric decoding,
    /// with a missing descriptor failing [`DatagramError::UnknownTask`].
    pub fn deserialize(
        bytes: &[u8],
        ecdhe: Option<&EcdheSession>,
        config: Option<&TaskConfig>,
    ) -> Result<Self, DatagramError> {
        let mut reader = WireReader::new(bytes);
        let public = PublicHeader::read(&mut reader)?;
        let payload = reader.read_bytes(public.payload_size as usize)?;
        let mut payload_reader = WireReader::new(payload);

        match public.crypto_mark {
            CryptoMark::Plain => {
                let private = PrivateHeader::read(&mut payload_reader)?;
                if private.datagram_type.crypto_mark() != CryptoMark::Plain {
                    // A sealed-class type must not travel in cleartext.
                    return Err(DatagramError::InvalidCryptoMark(
                        public.crypto_mark.as_bytes(),
                    ));
                }
                match private.datagram_type {
                    DatagramType::RequestRegister => {
                        RequestRegister::deserialize(&mut payload_reader, &public, &private)
                            .map(Datagram::RequestRegister)
                    }
                    DatagramType::RegisterChallenge => {
                        RegisterChallenge::deserialize(&mut payload_reader, &public, &private)
                            .map(Datagram::RegisterChallenge)
                    }
                    DatagramType::RegisterChallenge2 => {
                        RegisterChallenge2::deserialize(&mut payload_reader, &public, &private)
                            .map(Datagram::RegisterChallenge2)
                    }
                    DatagramType::ConnectionRejected => {
                        ConnectionRejected::deserialize(&mut payload_reader, &public, &private)
                            .map(Datagram::ConnectionRejected)
                    }
                    DatagramType::PushSchemas | DatagramType::SendMetrics => unreachable!(),
                }
            }
            CryptoMark::Encrypted => {
                let ecdhe = ecdhe.ok_or(DatagramError::NotLinked)?;
                let opened = encrypted::open_payload(payload, ecdhe)?;
                let header = Header::from_parts(&public, &opened.private);
                match opened.private.datagram_type {
                    DatagramType::PushSchemas => {
                        PushSchemas::from_inner(&opened.inner, header).map(Datagram::PushSchemas)
                    }
                    DatagramType::SendMetrics => {
                        let empty = TaskConfig::new();
                        let config = config.unwrap_or(&empty);
                        SendMetrics::from_inner(&opened.inner, header, config)
                            .map(Datagram::SendMetrics)
                    }
                    // open_payload rejects cleartext-class types inside an
                    // envelope before we get here.
                    _ => unreachable!(),
                }
            }
        }
    }
}
