use rdp_nego_connector::derive_settings;
use rdp_nego_pdu::nego::{ConnectionConfirm, ConnectionRequest, FailureCode, ResponseFlags, SecurityProtocol};
use rdp_nego_transport::Transport;

use crate::state::{strongest_common, AcceptorState, EnabledProtocols};
use crate::{AcceptorError, AcceptorErrorKind, AcceptorResult, ConnectionResult};

/// Drives the server side of one negotiation exchange: read the client's
/// Connection Request, decide a protocol consistent with this server's
/// policy, and write back the matching Connection Confirm.
///
/// Single-threaded and blocking, like [`rdp_nego_connector::ClientConnector`]:
/// [`ServerAcceptor::accept`] runs to completion on the caller's thread.
pub struct ServerAcceptor {
    transport: Transport,
    state: AcceptorState,

    enable_rdp: bool,
    enable_tls: bool,
    enable_nla: bool,
    /// Path to the server's key/certificate file. Selecting RDP Standard
    /// Security requires one; its absence is a hard configuration error
    /// rather than something negotiation can fall back from. The file itself
    /// is read by an external collaborator — this crate only checks for its
    /// presence at the point RDP is about to be confirmed.
    server_key_path: Option<String>,

    requested_protocols: SecurityProtocol,
    selected_protocol: SecurityProtocol,
    flags: ResponseFlags,

    pending_error: Option<AcceptorError>,
}

impl ServerAcceptor {
    /// Builds a negotiator around an already-accepted TCP connection,
    /// wrapped in a server-role [`Transport`].
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            state: AcceptorState::Initial,
            enable_rdp: true,
            enable_tls: false,
            enable_nla: false,
            server_key_path: None,
            requested_protocols: SecurityProtocol::RDP,
            selected_protocol: SecurityProtocol::RDP,
            flags: ResponseFlags::empty(),
            pending_error: None,
        }
    }

    pub fn enable_rdp(&mut self, enabled: bool) -> &mut Self {
        self.enable_rdp = enabled;
        self
    }

    pub fn enable_tls(&mut self, enabled: bool) -> &mut Self {
        self.enable_tls = enabled;
        self
    }

    pub fn enable_nla(&mut self, enabled: bool) -> &mut Self {
        self.enable_nla = enabled;
        self
    }

    /// Sets the path to the server's key/certificate file. Required for
    /// every path that can select Standard RDP Security.
    pub fn set_server_key_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.server_key_path = Some(path.into());
        self
    }

    /// Releases the negotiator, handing the (possibly promoted) transport
    /// back to the caller.
    pub fn free(self) -> Transport {
        self.transport
    }

    fn enabled(&self) -> EnabledProtocols {
        EnabledProtocols {
            nla: self.enable_nla,
            tls: self.enable_tls,
            rdp: self.enable_rdp,
        }
    }

    fn fail(&mut self, context: &'static str, kind: AcceptorErrorKind) {
        self.pending_error = Some(AcceptorError::new(context, kind));
        self.state = AcceptorState::Fail;
    }

    fn fail_with_source<E>(&mut self, context: &'static str, kind: AcceptorErrorKind, source: E)
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        self.pending_error = Some(AcceptorError::new(context, kind).with_source(source));
        self.state = AcceptorState::Fail;
    }

    /// Reads the Connection Request, chooses a response, writes the
    /// Connection Confirm, and promotes the transport to whatever security
    /// layer was selected.
    pub fn accept(&mut self) -> AcceptorResult<ConnectionResult> {
        self.receive_request();

        if self.state == AcceptorState::Fail {
            return Err(self.take_failure());
        }

        let result = self.send_negotiation_response()?;

        self.security_accept()?;

        Ok(result)
    }

    fn take_failure(&mut self) -> AcceptorError {
        self.pending_error.take().unwrap_or_else(|| {
            AcceptorError::new("negotiation failed for an unrecorded reason", AcceptorErrorKind::ConfigurationInvalid)
        })
    }

    /// Parses the client's Connection Request. A well-formed request (with or
    /// without `rdpNegData`) always reaches `Final`: the negotiation phase
    /// finished, even when the policy decision below is to refuse. Only a
    /// malformed/truncated request or a transport failure reaches `Fail`.
    fn receive_request(&mut self) {
        let mut buf = self.transport.prepare_send_buffer(256);

        if let Err(error) = self.transport.read_frame(&mut buf) {
            self.fail_with_source("read connection request", AcceptorErrorKind::TransportIoFailed, error);
            return;
        }

        let request = match rdp_nego_pdu::decode::<ConnectionRequest>(&buf) {
            Ok(request) => request,
            Err(error) => {
                self.fail(
                    "decode connection request",
                    AcceptorErrorKind::ProtocolDecode(error),
                );
                return;
            }
        };

        debug!(protocol = ?request.protocol, "received connection request");

        self.requested_protocols = request.protocol;
        self.state = AcceptorState::Final;
    }

    /// Chooses and emits the Connection Confirm matching `requested_protocols`,
    /// per the server's enabled-protocol policy. A `NEG_FAILURE` response is
    /// still written to the wire before this returns `Err`: the client needs
    /// to see why the server gave up.
    pub fn send_negotiation_response(&mut self) -> AcceptorResult<ConnectionResult> {
        let (confirm, rejection) = if self.requested_protocols != SecurityProtocol::RDP {
            match strongest_common(self.requested_protocols, self.enabled()) {
                Some(protocol) => {
                    self.selected_protocol = protocol;
                    self.flags = ResponseFlags::EXTENDED_CLIENT_DATA_SUPPORTED;

                    (
                        ConnectionConfirm::Response {
                            flags: self.flags,
                            protocol,
                        },
                        None,
                    )
                }
                // The client asked for TLS and/or NLA but this server's policy
                // allows neither: closest standard failure code is the one a
                // real server would send for an SSL-only policy mismatch.
                None => (
                    ConnectionConfirm::Failure {
                        code: FailureCode::SSL_NOT_ALLOWED_BY_SERVER,
                    },
                    Some(FailureCode::SSL_NOT_ALLOWED_BY_SERVER),
                ),
            }
        } else if !self.enable_rdp {
            (
                ConnectionConfirm::Failure {
                    code: FailureCode::SSL_REQUIRED_BY_SERVER,
                },
                Some(FailureCode::SSL_REQUIRED_BY_SERVER),
            )
        } else {
            if self.server_key_path.is_none() {
                return Err(AcceptorError::new(
                    "RDP Standard Security selected with no server key/certificate",
                    AcceptorErrorKind::ConfigurationInvalid,
                ));
            }

            self.selected_protocol = SecurityProtocol::RDP;
            self.flags = ResponseFlags::empty();
            (ConnectionConfirm::None, None)
        };

        let bytes = rdp_nego_pdu::encode_vec(&confirm).map_err(AcceptorError::encode)?;

        self.transport.write_frame(&bytes).map_err(|error| {
            AcceptorError::new("write connection confirm", AcceptorErrorKind::TransportIoFailed).with_source(error)
        })?;

        if let Some(code) = rejection {
            return Err(AcceptorError::new(
                "negotiation ended in NEG_FAILURE",
                AcceptorErrorKind::NegotiationRejected(code),
            ));
        }

        let settings = derive_settings(self.requested_protocols, self.selected_protocol, self.flags);

        Ok(ConnectionResult { settings })
    }

    /// Promotes the transport to the selected security layer. A `NEG_FAILURE`
    /// response never reaches here with `selected_protocol` set to the
    /// rejected tier, since [`send_negotiation_response`] only updates
    /// `selected_protocol` on the success paths.
    fn security_accept(&mut self) -> AcceptorResult<()> {
        let promoted = match self.selected_protocol {
            SecurityProtocol::NLA => self.transport.promote_nla(),
            SecurityProtocol::TLS => self.transport.promote_tls(),
            _ => true,
        };

        if !promoted {
            return Err(AcceptorError::new(
                "security promotion",
                AcceptorErrorKind::TransportIoFailed,
            ));
        }

        Ok(())
    }
}
