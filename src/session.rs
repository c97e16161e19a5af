//! Per-session handshake state machine and bookkeeping.
//!
//! A [`Session`] drives one peer's side of the registration handshake and,
//! once established, the sealed schema/metric exchange. It owns the
//! ephemeral key agreement, the pre-shared secret, the canonical session
//! identifier, and the sequence/acknowledgement counters (which are stamped
//! and surfaced, never interpreted; ordering and retransmission belong to a
//! reliability layer above).
//!
//! The machine is single-shot: `Established` is reached at most once, and a
//! rejected session stays rejected. Re-registration means a new `Session`.

use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::core::{
    DatagramError, CHALLENGE_SIZE, PUBLIC_KEY_SIZE, SALT_SIZE, TYPE_CONNECTION_REJECTED,
    TYPE_PUSH_SCHEMAS, TYPE_REGISTER_CHALLENGE, TYPE_REGISTER_CHALLENGE2, TYPE_REQUEST_REGISTER,
};
use crate::crypto::{derive_session_id, EcdheSession};
use crate::datagram::{
    ConnectionRejected, Datagram, Header, PushSchemas, RegisterChallenge, RegisterChallenge2,
    RequestRegister, SendMetrics, SessionId,
};
use crate::spack::{MetricValues, TaskConfig};

/// Which side of the registration this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The initiator: registers, pushes schemas, streams metrics.
    Agent,
    /// The responder: issues challenges, receives schemas and metrics.
    Server,
}

/// Handshake progress.
///
/// `Idle` is the agent's start state and `AwaitRegister` the server's
/// listening state; `Rejected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Agent created, registration not yet sent.
    Idle,
    /// Server listening for a registration request.
    AwaitRegister,
    /// Agent sent its request, waiting for the challenge.
    AwaitChallenge,
    /// Server issued its challenge, waiting for the response.
    AwaitChallenge2,
    /// Handshake complete; sealed traffic may flow.
    Established,
    /// Terminal: session state should be discarded.
    Rejected,
}

/// What a received frame meant to this session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Handshake traffic consumed; nothing to surface.
    None,
    /// The frame does not carry our signature; dropped silently.
    NotOurs,
    /// The handshake just completed.
    Established,
    /// The session is terminated.
    Rejected,
    /// A schema collection arrived and was merged into the bound config.
    SchemasReceived(TaskConfig),
    /// A metric sample arrived.
    MetricReceived {
        /// The task the sample belongs to.
        task_id: String,
        /// The decoded values.
        values: MetricValues,
    },
}

/// Result of handling one received frame.
#[derive(Debug)]
pub struct SessionOutput {
    /// A frame to send back, if the protocol calls for one.
    pub reply: Option<Vec<u8>>,
    /// What the received frame meant.
    pub event: SessionEvent,
}

impl SessionOutput {
    fn event(event: SessionEvent) -> Self {
        Self {
            reply: None,
            event,
        }
    }
}

/// One peer's session state.
pub struct Session {
    role: Role,
    phase: Phase,
    id: SessionId,
    ecdhe: EcdheSession,
    pre_shared: Zeroizing<Vec<u8>>,
    config: TaskConfig,
    send_seq: u32,
    recv_seq: u32,
    recv_ack: u32,
}

impl Session {
    /// Create the agent side with the shared deployment secret.
    pub fn agent(pre_shared: &[u8]) -> Self {
        Self::new(Role::Agent, Phase::Idle, pre_shared)
    }

    /// Create the server side with the shared deployment secret.
    pub fn server(pre_shared: &[u8]) -> Self {
        Self::new(Role::Server, Phase::AwaitRegister, pre_shared)
    }

    fn new(role: Role, phase: Phase, pre_shared: &[u8]) -> Self {
        Self {
            role,
            phase,
            id: SessionId::zero(),
            ecdhe: EcdheSession::generate(),
            pre_shared: Zeroizing::new(pre_shared.to_vec()),
            config: TaskConfig::new(),
            send_seq: 0,
            recv_seq: 0,
            recv_ack: 0,
        }
    }

    /// This peer's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current handshake phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The session identifier (all-zero until the server has chosen one).
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Sequence number of the last frame sent.
    pub fn last_sent_sequence(&self) -> u32 {
        self.send_seq
    }

    /// Sequence number of the last frame received.
    pub fn last_received_sequence(&self) -> u32 {
        self.recv_seq
    }

    /// Acknowledgement number carried by the last frame received.
    pub fn last_received_acknowledgement(&self) -> u32 {
        self.recv_ack
    }

    /// The task configuration bound for metric encoding and decoding.
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Merge schemas into the bound task configuration.
    pub fn bind_config(&mut self, config: TaskConfig) {
        self.config.extend(config);
    }

    /// Agent only, from `Idle`: build the registration request.
    ///
    /// The session id in this frame is the all-zero placeholder; the server's
    /// challenge carries the canonical value.
    pub fn request_register(&mut self) -> Result<Vec<u8>, DatagramError> {
        if self.phase != Phase::Idle {
            return Err(DatagramError::WrongType {
                expected: self.phase_expects(),
                actual: TYPE_REQUEST_REGISTER,
            });
        }
        let datagram = RequestRegister {
            header: self.next_header(),
            public_key: self.ecdhe.public_key().to_vec(),
        };
        self.phase = Phase::AwaitChallenge;
        debug!(session = %self.id, "registration requested");
        Ok(datagram.serialize())
    }

    /// Established only: build a sealed schema-distribution frame.
    ///
    /// The schemas are also merged into this session's own config so later
    /// metric frames can be encoded against them.
    pub fn push_schemas(&mut self, schemas: &TaskConfig) -> Result<Vec<u8>, DatagramError> {
        if self.phase != Phase::Established {
            return Err(DatagramError::NotLinked);
        }
        self.config.extend(schemas.clone());
        let datagram = PushSchemas {
            header: self.next_header(),
            schemas: schemas.clone(),
        };
        datagram.serialize(&self.ecdhe)
    }

    /// Established only: build a sealed metric frame for one task.
    pub fn send_metric(
        &mut self,
        task_id: &str,
        values: &MetricValues,
    ) -> Result<Vec<u8>, DatagramError> {
        if self.phase != Phase::Established {
            return Err(DatagramError::NotLinked);
        }
        let datagram = SendMetrics {
            header: self.next_header(),
            task_id: task_id.to_owned(),
            values: values.clone(),
        };
        datagram.serialize(&self.ecdhe, &self.config)
    }

    /// Handle one received frame: parse, drive the state machine, and
    /// produce any reply the protocol calls for.
    ///
    /// Frames without our signature surface as [`SessionEvent::NotOurs`]
    /// and leave the session untouched. A wrong-phase datagram is answered
    /// with a rejection. Frame errors that reject the session flip the phase
    /// to `Rejected` before propagating; [`DatagramError::UnknownTask`]
    /// drops only the frame.
    pub fn handle(&mut self, bytes: &[u8]) -> Result<SessionOutput, DatagramError> {
        let parsed = Datagram::deserialize(bytes, Some(&self.ecdhe), Some(&self.config));
        let datagram = match parsed {
            Ok(datagram) => datagram,
            Err(DatagramError::InvalidSignature) => {
                return Ok(SessionOutput::event(SessionEvent::NotOurs));
            }
            Err(DatagramError::NotLinked) => {
                // Sealed traffic before the handshake finished.
                return Ok(self.reject("sealed frame before establishment"));
            }
            Err(err) => {
                if err.rejects_session() && self.phase != Phase::Rejected {
                    warn!(session = %self.id, error = %err, "frame error, rejecting session");
                    self.phase = Phase::Rejected;
                }
                return Err(err);
            }
        };

        let header = *datagram.header();
        self.recv_seq = header.sequence;
        self.recv_ack = header.acknowledgement;

        match (self.phase, datagram) {
            (phase, Datagram::ConnectionRejected(_)) => {
                if phase != Phase::Rejected {
                    debug!(session = %self.id, "peer rejected the session");
                    self.phase = Phase::Rejected;
                }
                Ok(SessionOutput::event(SessionEvent::Rejected))
            }
            (Phase::AwaitRegister, Datagram::RequestRegister(request)) => {
                self.on_register(request)
            }
            (Phase::AwaitChallenge, Datagram::RegisterChallenge(challenge)) => {
                self.on_challenge(challenge)
            }
            (Phase::AwaitChallenge2, Datagram::RegisterChallenge2(response)) => {
                self.on_challenge2(response)
            }
            (Phase::Established, Datagram::PushSchemas(push)) => {
                self.config.extend(push.schemas.clone());
                Ok(SessionOutput::event(SessionEvent::SchemasReceived(
                    push.schemas,
                )))
            }
            (Phase::Established, Datagram::SendMetrics(metric)) => {
                Ok(SessionOutput::event(SessionEvent::MetricReceived {
                    task_id: metric.task_id,
                    values: metric.values,
                }))
            }
            (_, datagram) => {
                let tag = datagram.datagram_type().tag();
                Ok(self.reject_with_tag("wrong-phase datagram", tag))
            }
        }
    }

    fn on_register(&mut self, request: RequestRegister) -> Result<SessionOutput, DatagramError> {
        let agent_public: [u8; PUBLIC_KEY_SIZE] = match request.public_key.as_slice().try_into() {
            Ok(pk) => pk,
            Err(_) => return Ok(self.reject("registration carried a malformed public key")),
        };

        self.id = SessionId::from_bytes(derive_session_id(
            &request.public_key,
            &self.ecdhe.public_key(),
            &self.pre_shared,
        ));

        let mut challenge = [0u8; CHALLENGE_SIZE];
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut challenge);
        OsRng.fill_bytes(&mut salt);

        if self
            .ecdhe
            .derive_shared_secret(&agent_public, &salt, &challenge, &self.pre_shared)
            .is_err()
        {
            return Ok(self.reject("key derivation failed"));
        }

        let reply = RegisterChallenge {
            header: self.next_header(),
            public_key: self.ecdhe.public_key().to_vec(),
            challenge: challenge.to_vec(),
            salt: salt.to_vec(),
        }
        .serialize();

        self.phase = Phase::AwaitChallenge2;
        debug!(session = %self.id, "challenge issued");
        Ok(SessionOutput {
            reply: Some(reply),
            event: SessionEvent::None,
        })
    }

    fn on_challenge(&mut self, challenge: RegisterChallenge) -> Result<SessionOutput, DatagramError> {
        let server_public: [u8; PUBLIC_KEY_SIZE] = match challenge.public_key.as_slice().try_into()
        {
            Ok(pk) => pk,
            Err(_) => return Ok(self.reject("challenge carried a malformed public key")),
        };

        // The server's session id is authoritative from here on.
        self.id = challenge.header.session_id;

        if self
            .ecdhe
            .derive_shared_secret(
                &server_public,
                &challenge.salt,
                &challenge.challenge,
                &self.pre_shared,
            )
            .is_err()
        {
            return Ok(self.reject("key derivation failed"));
        }

        let response = self.ecdhe.challenge_response()?;
        let reply = RegisterChallenge2 {
            header: self.next_header(),
            challenge_response: response.to_vec(),
        }
        .serialize();

        self.phase = Phase::Established;
        debug!(session = %self.id, "agent established");
        Ok(SessionOutput {
            reply: Some(reply),
            event: SessionEvent::Established,
        })
    }

    fn on_challenge2(
        &mut self,
        response: RegisterChallenge2,
    ) -> Result<SessionOutput, DatagramError> {
        let expected = self.ecdhe.challenge_response()?;
        if response.challenge_response != expected {
            return Ok(self.reject("challenge verification failed"));
        }
        self.phase = Phase::Established;
        debug!(session = %self.id, "server established");
        Ok(SessionOutput::event(SessionEvent::Established))
    }

    fn reject(&mut self, reason: &'static str) -> SessionOutput {
        warn!(session = %self.id, reason, "rejecting session");
        let reply = ConnectionRejected {
            header: self.next_header(),
        }
        .serialize();
        self.phase = Phase::Rejected;
        SessionOutput {
            reply: Some(reply),
            event: SessionEvent::Rejected,
        }
    }

    fn reject_with_tag(&mut self, reason: &'static str, tag: u32) -> SessionOutput {
        warn!(session = %self.id, reason, datagram_type = tag, "rejecting session");
        let reply = ConnectionRejected {
            header: self.next_header(),
        }
        .serialize();
        self.phase = Phase::Rejected;
        SessionOutput {
            reply: Some(reply),
            event: SessionEvent::Rejected,
        }
    }

    fn next_header(&mut self) -> Header {
        self.send_seq = self.send_seq.wrapping_add(1);
        Header::new(self.id, self.send_seq, self.recv_seq)
    }

    fn phase_expects(&self) -> u32 {
        match self.phase {
            Phase::Idle | Phase::AwaitRegister => TYPE_REQUEST_REGISTER,
            Phase::AwaitChallenge => TYPE_REGISTER_CHALLENGE,
            Phase::AwaitChallenge2 => TYPE_REGISTER_CHALLENGE2,
            Phase::Established => TYPE_PUSH_SCHEMAS,
            Phase::Rejected => TYPE_CONNECTION_REJECTED,
        }
    }
}
