//! # NetTask Protocol
//!
//! NetTask is the datagram protocol an Agent and a Server speak to register
//! agents, distribute task schemas, and stream collected metrics. It
//! provides:
//!
//! - **Framing**: a fixed-layout cleartext public header parseable before
//!   any key agreement has completed
//! - **Security**: a mutually authenticated ephemeral X25519 handshake
//!   bootstrapped by a pre-shared secret, then double-AEAD sealing that
//!   keeps even header metadata inside the envelope
//! - **Payloads**: task schemas and metric samples carried as SPACK, a
//!   compact self-describing binary object format
//! - **Simplicity**: a fixed cryptographic suite, no negotiation
//!
//! The crate is transport-agnostic and fully synchronous: callers await
//! bytes however they like, hand complete frames to [`Session::handle`]
//! (or the lower-level [`datagram::Datagram::deserialize`]), and send
//! whatever reply comes back. Delivery, ordering, retransmission, and
//! fragment reassembly belong to the layer above; the sequence,
//! acknowledgement, and fragmented fields pass through untouched.
//!
//! ## Modules
//!
//! - [`core`]: constants and the error taxonomy
//! - [`wire`]: positional big-endian reader/writer
//! - [`crypto`]: X25519 + HKDF-SHA256 + XChaCha20-Poly1305 session sealing
//! - [`spack`]: the SPACK value, schema, and metric codecs
//! - [`datagram`]: header layouts, the six datagram variants, and dispatch
//! - [`session`]: the registration state machine
//!
//! ## Example
//!
//! ```rust
//! use nettask_protocol::prelude::*;
//!
//! let mut agent = Session::agent(b"deployment secret");
//! let mut server = Session::server(b"deployment secret");
//!
//! // Registration handshake: request, challenge, response.
//! let register = agent.request_register()?;
//! let challenge = server.handle(&register)?.reply.unwrap();
//! let response = agent.handle(&challenge)?.reply.unwrap();
//! server.handle(&response)?;
//! assert_eq!(agent.phase(), Phase::Established);
//! assert_eq!(server.phase(), Phase::Established);
//!
//! // Distribute a schema, then stream a metric against it.
//! let mut schemas = TaskConfig::new();
//! schemas.insert(
//!     "cpu".to_owned(),
//!     TaskSchema::new(vec![TaskField::new("usage", FieldType::Float)]),
//! );
//! let frame = agent.push_schemas(&schemas)?;
//! server.handle(&frame)?;
//!
//! let values: MetricValues =
//!     [("usage".to_owned(), SpackValue::Float(0.42))].into_iter().collect();
//! let frame = agent.send_metric("cpu", &values)?;
//! match server.handle(&frame)?.event {
//!     SessionEvent::MetricReceived { task_id, .. } => assert_eq!(task_id, "cpu"),
//!     other => panic!("unexpected event: {other:?}"),
//! }
//! # Ok::<(), nettask_protocol::core::DatagramError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod crypto;
pub mod datagram;
pub mod session;
pub mod spack;
pub mod wire;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{CryptoError, DatagramError, SpackError, WireError};
    pub use crate::crypto::{EcdheSession, EncryptedRecord};
    pub use crate::datagram::{
        ConnectionRejected, CryptoMark, Datagram, DatagramType, Header, PrivateHeader,
        PublicHeader, PushSchemas, RegisterChallenge, RegisterChallenge2, RequestRegister,
        SendMetrics, SessionId,
    };
    pub use crate::session::{Phase, Role, Session, SessionEvent, SessionOutput};
    pub use crate::spack::{
        FieldType, MetricValues, SpackValue, TaskConfig, TaskField, TaskSchema,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::DatagramError;
pub use crate::datagram::{Datagram, DatagramType, SessionId};
pub use crate::session::{Phase, Session, SessionEvent};
