//! The sealed post-handshake variants: PushSchemas and SendMetrics.
//!
//! Both share the double-AEAD layout. The inner cleartext is sealed under
//! the payload context, then the private header and the inner record are
//! sealed together under the envelope context, so header metadata is never
//! readable from the cleartext body:
//!
//! ```text
//! inner      = variant-specific cleartext
//! inner_enc  = encrypt(inner)                      (payload context)
//! payload    = PrivateHeader ‖ u32 |inner_enc| ‖ inner_enc
//! outer      = envelope(payload)                   (envelope context)
//! frame      = PublicHeader(payload_size = |outer|) ‖ outer
//! ```

use crate::core::{CryptoError, DatagramError, SpackError, PRIVATE_HEADER_SIZE};
use crate::crypto::{EcdheSession, EncryptedRecord};
use crate::spack::{
    deserialize_spack, deserialize_task_metric, pack_task_schemas, serialize_spack,
    serialize_task_metric, unpack_task_schemas, MetricValues, TaskConfig,
};
use crate::wire::{WireReader, WireWriter};

use super::header::{CryptoMark, DatagramType, Header, PrivateHeader, PublicHeader};
use super::{expect_drained, expect_type};

/// A sealed payload after the envelope and inner record have been opened.
pub(super) struct OpenedPayload {
    /// The private header recovered from the envelope plaintext.
    pub private: PrivateHeader,
    /// The decrypted inner cleartext.
    pub inner: Vec<u8>,
}

/// Seal a frame around variant-specific inner cleartext.
fn seal_frame(
    header: &Header,
    datagram_type: DatagramType,
    inner: &[u8],
    ecdhe: &EcdheSession,
) -> Result<Vec<u8>, DatagramError> {
    if !ecdhe.is_established() {
        return Err(DatagramError::NotLinked);
    }

    let inner_enc = ecdhe.encrypt(inner)?.serialize();

    let mut payload = WireWriter::with_capacity(PRIVATE_HEADER_SIZE + 4 + inner_enc.len());
    header.private_header(datagram_type).write_to(&mut payload);
    payload.write_block(&inner_enc);

    let outer = ecdhe.envelope(&payload.finish())?.serialize();

    let mut frame = WireWriter::with_capacity(outer.len() + 64);
    header
        .public_header(datagram_type, outer.len() as u32)
        .write_to(&mut frame);
    frame.write_bytes(&outer);
    Ok(frame.finish())
}

/// Reverse [`seal_frame`] over the bytes following the public header.
pub(super) fn open_payload(
    payload: &[u8],
    ecdhe: &EcdheSession,
) -> Result<OpenedPayload, DatagramError> {
    if !ecdhe.is_established() {
        return Err(DatagramError::NotLinked);
    }

    let mut outer_reader = WireReader::new(payload);
    let outer = EncryptedRecord::read_from(&mut outer_reader).map_err(CryptoError::from)?;
    expect_drained(&outer_reader)?;

    let plain = ecdhe.open_envelope(&outer)?;
    let mut plain_reader = WireReader::new(&plain);
    let private = PrivateHeader::read(&mut plain_reader)?;
    if private.datagram_type.crypto_mark() != CryptoMark::Encrypted {
        // A handshake type has no business inside an envelope.
        return Err(DatagramError::InvalidCryptoMark(
            CryptoMark::Encrypted.as_bytes(),
        ));
    }

    let inner_enc = plain_reader.read_block()?;
    expect_drained(&plain_reader)?;

    let mut record_reader = WireReader::new(inner_enc);
    let record = EncryptedRecord::read_from(&mut record_reader).map_err(CryptoError::from)?;
    expect_drained(&record_reader)?;

    let inner = ecdhe.decrypt(&record)?;
    Ok(OpenedPayload { private, inner })
}

/// Distributes the agent's task schema collection.
///
/// Inner cleartext: `u32 spackLen ‖ SPACK(packed schema collection)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSchemas {
    /// Shared header fields.
    pub header: Header,
    /// Task name to schema.
    pub schemas: TaskConfig,
}

impl PushSchemas {
    /// Seal the frame under an established session.
    pub fn serialize(&self, ecdhe: &EcdheSession) -> Result<Vec<u8>, DatagramError> {
        let spack = serialize_spack(&pack_task_schemas(&self.schemas));
        let mut inner = WireWriter::with_capacity(4 + spack.len());
        inner.write_block(&spack);
        seal_frame(
            &self.header,
            DatagramType::PushSchemas,
            &inner.finish(),
            ecdhe,
        )
    }

    /// Open and reconstruct from the bytes after the public header.
    pub fn deserialize(
        reader: &mut WireReader<'_>,
        public: &PublicHeader,
        ecdhe: &EcdheSession,
    ) -> Result<Self, DatagramError> {
        let payload = reader.read_bytes(public.payload_size as usize)?;
        let opened = open_payload(payload, ecdhe)?;
        expect_type(&opened.private, DatagramType::PushSchemas)?;
        Self::from_inner(&opened.inner, Header::from_parts(public, &opened.private))
    }

    pub(super) fn from_inner(inner: &[u8], header: Header) -> Result<Self, DatagramError> {
        let mut reader = WireReader::new(inner);
        let spack = reader.read_block()?;
        expect_drained(&reader)?;

        let value = deserialize_spack(spack)?;
        let schemas = unpack_task_schemas(&value)?;
        Ok(Self { header, schemas })
    }
}

/// Streams one task's collected metric values.
///
/// Inner cleartext: `u32 taskIdLen ‖ taskId ‖ u32 spackLen ‖ spack`. The
/// metric bytes are descriptor-bound, so decoding requires the receiver's
/// task configuration; an unknown task id fails without touching the
/// session.
#[derive(Debug, Clone, PartialEq)]
pub struct SendMetrics {
    /// Shared header fields.
    pub header: Header,
    /// Which task these values belong to.
    pub task_id: String,
    /// The sampled values.
    pub values: MetricValues,
}

impl SendMetrics {
    /// Seal the frame under an established session, encoding the values
    /// against the task's schema from `config`.
    pub fn serialize(
        &self,
        ecdhe: &EcdheSession,
        config: &TaskConfig,
    ) -> Result<Vec<u8>, DatagramError> {
        let schema = config
            .get(&self.task_id)
            .ok_or_else(|| DatagramError::UnknownTask(self.task_id.clone()))?;
        let metric = serialize_task_metric(&self.values, schema)?;

        let mut inner = WireWriter::with_capacity(8 + self.task_id.len() + metric.len());
        inner.write_block(self.task_id.as_bytes());
        inner.write_block(&metric);
        seal_frame(
            &self.header,
            DatagramType::SendMetrics,
            &inner.finish(),
            ecdhe,
        )
    }

    /// Open and reconstruct from the bytes after the public header.
    pub fn deserialize(
        reader: &mut WireReader<'_>,
        public: &PublicHeader,
        ecdhe: &EcdheSession,
        config: &TaskConfig,
    ) -> Result<Self, DatagramError> {
        let payload = reader.read_bytes(public.payload_size as usize)?;
        let opened = open_payload(payload, ecdhe)?;
        expect_type(&opened.private, DatagramType::SendMetrics)?;
        Self::from_inner(
            &opened.inner,
            Header::from_parts(public, &opened.private),
            config,
        )
    }

    pub(super) fn from_inner(
        inner: &[u8],
        header: Header,
        config: &TaskConfig,
    ) -> Result<Self, DatagramError> {
        let mut reader = WireReader::new(inner);
        let task_id = std::str::from_utf8(reader.read_block()?)
            .map_err(|_| DatagramError::MalformedPayload(SpackError::InvalidUtf8))?
            .to_owned();
        let metric = reader.read_block()?;
        expect_drained(&reader)?;

        let schema = config
            .get(&task_id)
            .ok_or_else(|| DatagramError::UnknownTask(task_id.clone()))?;
        let values = deserialize_task_metric(metric, schema)?;
        Ok(Self {
            header,
            task_id,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HASH_LEN, PUBLIC_HEADER_SIZE};
    use crate::datagram::header::SessionId;
    use crate::spack::{FieldType, SpackValue, TaskField, TaskSchema};

    fn established_pair() -> (EcdheSession, EcdheSession) {
        let mut agent = EcdheSession::generate();
        let mut server = EcdheSession::generate();
        let agent_pk = agent.public_key();
        let server_pk = server.public_key();
        agent
            .derive_shared_secret(&server_pk, &[1; 16], &[2; 16], b"psk")
            .unwrap();
        server
            .derive_shared_secret(&agent_pk, &[1; 16], &[2; 16], b"psk")
            .unwrap();
        (agent, server)
    }

    fn header() -> Header {
        Header::new(SessionId::from_bytes([0x33; HASH_LEN]), 9, 4)
    }

    fn sample_config() -> TaskConfig {
        let mut config = TaskConfig::new();
        config.insert(
            "cpu".to_owned(),
            TaskSchema::new(vec![
                TaskField::new("usage", FieldType::Float),
                TaskField::new("ts", FieldType::Int),
            ]),
        );
        config.insert(
            "mem".to_owned(),
            TaskSchema::new(vec![TaskField::new("resident", FieldType::Int)]),
        );
        config
    }

    fn parse_public(bytes: &[u8]) -> (WireReader<'_>, PublicHeader) {
        let mut reader = WireReader::new(bytes);
        let public = PublicHeader::read(&mut reader).unwrap();
        (reader, public)
    }

    #[test]
    fn test_push_schemas_roundtrip() {
        let (agent, server) = established_pair();
        let datagram = PushSchemas {
            header: header(),
            schemas: sample_config(),
        };
        let bytes = datagram.serialize(&agent).unwrap();

        // Cleartext portions: signature, mark, and declared size only.
        assert_eq!(&bytes[..4], b"NTTK");
        assert_eq!(&bytes[36..38], b"CC");
        let declared = u32::from_be_bytes(bytes[38..42].try_into().unwrap());
        assert_eq!(declared as usize, bytes.len() - PUBLIC_HEADER_SIZE);

        let (mut reader, public) = parse_public(&bytes);
        let parsed = PushSchemas::deserialize(&mut reader, &public, &server).unwrap();
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn test_send_metrics_roundtrip() {
        let (agent, server) = established_pair();
        let config = sample_config();
        let datagram = SendMetrics {
            header: header(),
            task_id: "cpu".to_owned(),
            values: [
                ("usage".to_owned(), SpackValue::Float(0.42)),
                ("ts".to_owned(), SpackValue::Int(1_700_000_000)),
            ]
            .into_iter()
            .collect(),
        };
        let bytes = datagram.serialize(&agent, &config).unwrap();

        let (mut reader, public) = parse_public(&bytes);
        let parsed = SendMetrics::deserialize(&mut reader, &public, &server, &config).unwrap();
        assert_eq!(parsed, datagram);
    }

    #[test]
    fn test_serialize_without_derived_secret() {
        let fresh = EcdheSession::generate();
        let datagram = PushSchemas {
            header: header(),
            schemas: sample_config(),
        };
        assert!(matches!(
            datagram.serialize(&fresh),
            Err(DatagramError::NotLinked)
        ));
    }

    #[test]
    fn test_tampered_envelope_fails_crypto() {
        let (agent, server) = established_pair();
        let datagram = PushSchemas {
            header: header(),
            schemas: sample_config(),
        };
        let mut bytes = datagram.serialize(&agent).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let (mut reader, public) = parse_public(&bytes);
        assert!(matches!(
            PushSchemas::deserialize(&mut reader, &public, &server),
            Err(DatagramError::Crypto(_))
        ));
    }

    #[test]
    fn test_unknown_task_on_send() {
        let (agent, _) = established_pair();
        let datagram = SendMetrics {
            header: header(),
            task_id: "disk".to_owned(),
            values: MetricValues::new(),
        };
        assert!(matches!(
            datagram.serialize(&agent, &sample_config()),
            Err(DatagramError::UnknownTask(task)) if task == "disk"
        ));
    }

    #[test]
    fn test_unknown_task_on_receive() {
        let (agent, server) = established_pair();
        let mut sender_config = sample_config();
        sender_config.insert(
            "disk".to_owned(),
            TaskSchema::new(vec![TaskField::new("free", FieldType::Int)]),
        );
        let datagram = SendMetrics {
            header: header(),
            task_id: "disk".to_owned(),
            values: [("free".to_owned(), SpackValue::Int(1024))]
                .into_iter()
                .collect(),
        };
        let bytes = datagram.serialize(&agent, &sender_config).unwrap();

        // Receiver's config never learned about "disk".
        let (mut reader, public) = parse_public(&bytes);
        assert!(matches!(
            SendMetrics::deserialize(&mut reader, &public, &server, &sample_config()),
            Err(DatagramError::UnknownTask(task)) if task == "disk"
        ));
    }

    #[test]
    fn test_wrong_session_cannot_open() {
        let (agent, _) = established_pair();
        let (_, other_server) = established_pair();
        let datagram = PushSchemas {
            header: header(),
            schemas: sample_config(),
        };
        let bytes = datagram.serialize(&agent).unwrap();
        let (mut reader, public) = parse_public(&bytes);
        assert!(matches!(
            PushSchemas::deserialize(&mut reader, &public, &other_server),
            Err(DatagramError::Crypto(_))
        ));
    }

    #[test]
    fn test_truncated_sealed_frame() {
        let (agent, server) = established_pair();
        let datagram = PushSchemas {
            header: header(),
            schemas: sample_config(),
        };
        let bytes = datagram.serialize(&agent).unwrap();

        // Drop the tail but keep the declared size: the payload read under-runs.
        let cut = &bytes[..bytes.len() - 10];
        let (mut reader, public) = parse_public(cut);
        assert!(matches!(
            PushSchemas::deserialize(&mut reader, &public, &server),
            Err(DatagramError::Truncated(_))
        ));
    }
}
