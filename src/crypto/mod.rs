//! Key agreement and authenticated encryption.
//!
//! The datagram layer treats this module as its sealing collaborator: an
//! [`EcdheSession`] bound to a registration, producing and opening
//! [`EncryptedRecord`]s under two independent AEAD contexts.

mod ecdhe;
mod record;

pub use ecdhe::{derive_session_id, EcdheSession, SessionKey};
pub use record::EncryptedRecord;
