//! Error types for the NetTask protocol.
//!
//! Each layer owns its error enum; the datagram layer folds the lower layers
//! in with `#[from]` so callers see one taxonomy at the dispatch boundary.

use thiserror::Error;

/// Errors raised by the positional byte reader.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The reader under-ran the buffer.
    #[error("truncated frame: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the current read required.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },
}

/// Errors in the key-agreement and AEAD layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Shared-secret derivation failed.
    #[error("key derivation failed")]
    DeriveFailed,

    /// AEAD seal failed.
    #[error("AEAD seal failed")]
    SealFailed,

    /// AEAD open failed (invalid tag or corrupted record).
    #[error("AEAD open failed (invalid tag or corrupted record)")]
    OpenFailed,

    /// Operation requires a derived shared secret.
    #[error("no shared secret has been derived for this session")]
    NotEstablished,

    /// An encrypted record's byte form could not be parsed.
    #[error("malformed encrypted record: {0}")]
    MalformedRecord(#[from] WireError),
}

/// Errors in the SPACK object codec.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpackError {
    /// Input ended mid-value.
    #[error("truncated value: {0}")]
    Truncated(#[from] WireError),

    /// Unassigned type tag.
    #[error("unknown value tag: 0x{0:02x}")]
    UnknownTag(u8),

    /// A string field held invalid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// Nesting exceeded the decoder's depth bound.
    #[error("value nesting too deep")]
    DepthExceeded,

    /// Input held bytes past the end of the decoded value.
    #[error("trailing data: {remaining} bytes left over")]
    TrailingData {
        /// Bytes left unconsumed.
        remaining: usize,
    },

    /// The value is not a packed task schema collection.
    #[error("value is not a packed task collection")]
    NotTaskCollection,

    /// A packed schema carried an unassigned field-type tag.
    #[error("unknown field type tag: {0}")]
    UnknownFieldType(i64),

    /// A metric omitted a field the schema requires.
    #[error("metric is missing field {0:?}")]
    MissingField(String),

    /// A metric value does not match the schema's field type.
    #[error("field {field:?} does not match schema type {expected}")]
    TypeMismatch {
        /// Name of the offending field.
        field: String,
        /// The type the schema declares.
        expected: &'static str,
    },

    /// A metric carried a field the schema does not name.
    #[error("metric carries field {0:?} not present in the schema")]
    UnknownField(String),
}

/// Errors at the datagram dispatch boundary.
///
/// All are fatal for the frame they occur on; only some reject the session.
/// An [`InvalidSignature`](DatagramError::InvalidSignature) frame is not ours
/// and is dropped without touching session state; an
/// [`UnknownTask`](DatagramError::UnknownTask) drops the frame but keeps the
/// session. Everything else should cause the caller to reject the session.
#[derive(Debug, Error)]
pub enum DatagramError {
    /// The first four bytes are not the protocol signature.
    #[error("frame does not carry the protocol signature")]
    InvalidSignature,

    /// The frame ended before its declared contents.
    #[error("{0}")]
    Truncated(#[from] WireError),

    /// The crypto mark is not one of the assigned marks, or contradicts the
    /// datagram type it travels with.
    #[error("invalid crypto mark: {:?}", String::from_utf8_lossy(.0))]
    InvalidCryptoMark([u8; 2]),

    /// The private header carries an unsupported version.
    #[error("unsupported protocol version: {0}")]
    InvalidVersion(u32),

    /// The private header carries an unassigned datagram type tag.
    #[error("unknown datagram type: {0}")]
    UnknownType(u32),

    /// A deserializer was handed a datagram of a different type.
    #[error("wrong datagram type: expected {expected}, got {actual}")]
    WrongType {
        /// The type tag the operation expected.
        expected: u32,
        /// The type tag actually present.
        actual: u32,
    },

    /// An AEAD or key-agreement operation failed.
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    /// The payload could not be decoded, or its length prefixes disagree
    /// with the bytes actually present.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] SpackError),

    /// A metric referenced a task the receiver has no descriptor for.
    #[error("unknown task: {0:?}")]
    UnknownTask(String),

    /// A sealed variant was used without an established key-agreement
    /// session. This is a programmer error, not a wire condition.
    #[error("datagram requires an established key-agreement session")]
    NotLinked,
}

impl DatagramError {
    /// Whether the receiver should discard its session state over this error.
    ///
    /// Signature mismatches belong to another protocol sharing the port and
    /// unknown tasks only invalidate the one frame.
    pub fn rejects_session(&self) -> bool {
        !matches!(
            self,
            DatagramError::InvalidSignature | DatagramError::UnknownTask(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_disposition() {
        assert!(!DatagramError::InvalidSignature.rejects_session());
        assert!(!DatagramError::UnknownTask("cpu".into()).rejects_session());
        assert!(DatagramError::InvalidVersion(7).rejects_session());
        assert!(DatagramError::Crypto(CryptoError::OpenFailed).rejects_session());
    }

    #[test]
    fn test_wire_error_propagates_up() {
        let wire = WireError::Truncated {
            needed: 4,
            available: 1,
        };
        let datagram: DatagramError = wire.clone().into();
        assert!(matches!(datagram, DatagramError::Truncated(_)));

        let crypto: CryptoError = wire.into();
        assert!(matches!(crypto, CryptoError::MalformedRecord(_)));
    }
}
