//! Client-side security negotiation: drives the NLA → TLS → RDP fallback
//! ladder over a [`rdp_nego_transport::Transport`] and produces the settings
//! the rest of an RDP connection would need to continue.
//!
//! Everything past negotiation itself — MCS, licensing, capability exchange —
//! is out of scope; [`ConnectionResult`] only carries what negotiation decided.

#[macro_use]
extern crate tracing;

mod connection;
mod settings;
mod state;

pub use self::connection::ClientConnector;
pub use self::settings::{derive_settings, EncryptionLevel, EncryptionMethod, EncryptionSettings, Settings};
pub use self::state::NegotiationState;

use std::fmt;

use rdp_nego_pdu::nego::FailureCode;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

pub type ConnectorError = rdp_nego_error::Error<ConnectorErrorKind>;

/// Result of a successful [`ClientConnector::connect`] call.
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    pub settings: Settings,
}

#[non_exhaustive]
#[derive(Debug)]
pub enum ConnectorErrorKind {
    /// The TCP connection to the target could not be established.
    TransportConnectFailed,
    /// A read or write on the transport failed mid-negotiation.
    TransportIoFailed,
    /// A frame did not parse as the expected PDU.
    ProtocolDecode(rdp_nego_pdu::DecodeError),
    /// The server selected a protocol the caller never enabled.
    ProtocolSelectionMismatch,
    /// The server sent a well-formed `RDP_NEG_FAILURE`.
    NegotiationFailure(FailureCode),
    /// TLS or NLA promotion failed after a protocol was selected.
    PromotionFailed,
    /// The negotiator was asked to connect with an unusable configuration.
    ConfigurationInvalid,
}

impl fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportConnectFailed => write!(f, "TCP connect failed"),
            Self::TransportIoFailed => write!(f, "transport I/O failed"),
            Self::ProtocolDecode(_) => write!(f, "malformed negotiation frame"),
            Self::ProtocolSelectionMismatch => write!(f, "server selected a disabled protocol"),
            Self::NegotiationFailure(code) => write!(f, "server rejected negotiation (code {})", code.value()),
            Self::PromotionFailed => write!(f, "security upgrade failed after protocol selection"),
            Self::ConfigurationInvalid => write!(f, "negotiator configuration is invalid"),
        }
    }
}

impl std::error::Error for ConnectorErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProtocolDecode(e) => Some(e),
            _ => None,
        }
    }
}

impl ConnectorError {
    pub(crate) fn encode(error: rdp_nego_pdu::EncodeError) -> Self {
        Self::new("encode negotiation PDU", ConnectorErrorKind::TransportIoFailed).with_source(error)
    }
}
