//! Server-side security negotiation: the mirror of [`rdp_nego_connector`].
//!
//! Parses the client's X.224 Connection Request, picks a protocol consistent
//! with the server's own policy, and emits the matching Connection Confirm
//! (`RDP_NEG_RSP`, `RDP_NEG_FAILURE`, or no `rdpNegData` at all). Everything
//! past negotiation — MCS, licensing, capability exchange — is out of scope;
//! [`ConnectionResult`] only carries what negotiation decided.

#[macro_use]
extern crate tracing;

mod connection;
mod state;

pub use self::connection::ServerAcceptor;

use std::fmt;

pub use rdp_nego_connector::Settings;
use rdp_nego_pdu::nego::FailureCode;

pub type AcceptorResult<T> = Result<T, AcceptorError>;

pub type AcceptorError = rdp_nego_error::Error<AcceptorErrorKind>;

/// Result of a successful [`ServerAcceptor::accept`] call.
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    pub settings: Settings,
}

#[non_exhaustive]
#[derive(Debug)]
pub enum AcceptorErrorKind {
    /// A read or write on the transport failed mid-negotiation.
    TransportIoFailed,
    /// The client's Connection Request did not parse.
    ProtocolDecode(rdp_nego_pdu::DecodeError),
    /// No protocol is enabled, or RDP was selected but the server has no key/certificate.
    ConfigurationInvalid,
    /// This server sent the client a well-formed `RDP_NEG_FAILURE`: the exchange
    /// completed, but no protocol could be agreed on.
    NegotiationRejected(FailureCode),
}

impl fmt::Display for AcceptorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportIoFailed => write!(f, "transport I/O failed"),
            Self::ProtocolDecode(_) => write!(f, "malformed connection request"),
            Self::ConfigurationInvalid => write!(f, "acceptor configuration is invalid"),
            Self::NegotiationRejected(code) => write!(f, "rejected client negotiation (code {})", code.value()),
        }
    }
}

impl std::error::Error for AcceptorErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProtocolDecode(e) => Some(e),
            _ => None,
        }
    }
}

impl AcceptorError {
    pub(crate) fn encode(error: rdp_nego_pdu::EncodeError) -> Self {
        Self::new("encode negotiation PDU", AcceptorErrorKind::TransportIoFailed).with_source(error)
    }
}
