//! # Error Types
//!
//! Error types for the broker session and the connectivity supervisor. The
//! supervisor's errors carry a two-class taxonomy: network join and address
//! acquisition are expected to fluctuate and retry forever, while broker and
//! session failures after a successful join indicate misconfiguration and
//! surface to the caller instead of spinning silently.

/// Errors produced by a broker session.
///
/// Generic over the transport error type `T`, so the same session logic can
/// wrap specific errors from TCP, UART, or a test double.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// The peer violated the protocol.
    Protocol(ProtocolError),
    /// The broker refused the connection. The enclosed code gives the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The broker rejected the subscription with the enclosed return code.
    SubscribeRejected(u8),
    /// The session is not connected.
    NotConnected,
}

impl<T> From<ProtocolError> for SessionError<T> {
    fn from(err: ProtocolError) -> Self {
        SessionError::Protocol(err)
    }
}

/// Reason codes for a connection refusal (CONNACK).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// An unknown or unspecified refusal.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// Protocol-level violations observed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The broker sent a response other than the one the handshake expects.
    InvalidResponse,
    /// A packet was not correctly formed.
    MalformedPacket,
    /// A packet exceeds the session's buffer capacity.
    PayloadTooLarge,
    /// A string field was not valid UTF-8.
    InvalidUtf8String,
}

/// A supervisor step failure, tagged with the step that produced it.
///
/// `R` is the radio error type, `B` the broker session error type.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorError<R, B> {
    /// Radio join or address acquisition failed. Retried internally without
    /// bound; surfaces only through diagnostics.
    Join(R),
    /// Broker connect failed.
    Connect(B),
    /// Topic subscribe failed.
    Subscribe(B),
    /// Keep-alive ping failed.
    Heartbeat(B),
    /// Inbound servicing failed (connection lost or protocol violation).
    Receive(B),
}

/// Failure classification consumed by the controller's restart decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailureClass {
    /// Expected to resolve on its own; retry without bound.
    Transient,
    /// Requires operator visibility; retry only per the configured policy.
    Fatal,
}

impl<R, B> SupervisorError<R, B> {
    /// Classify this failure for the restart decision.
    pub fn class(&self) -> FailureClass {
        match self {
            SupervisorError::Join(_) => FailureClass::Transient,
            SupervisorError::Connect(_)
            | SupervisorError::Subscribe(_)
            | SupervisorError::Heartbeat(_)
            | SupervisorError::Receive(_) => FailureClass::Fatal,
        }
    }
}
