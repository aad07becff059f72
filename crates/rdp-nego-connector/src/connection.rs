use rdp_nego_pdu::nego::{
    ConnectionConfirm, ConnectionRequest, FailureCode, NegoRequestData, RequestFlags, ResponseFlags, SecurityProtocol,
};

use rdp_nego_pdu::pcb::{PcbVersion, PreconnectionBlob};
use rdp_nego_transport::Transport;

use crate::settings::derive_settings;
use crate::state::{fallback, initial_state, EnabledProtocols, NegotiationState};
use crate::{ConnectionResult, ConnectorError, ConnectorErrorKind, ConnectorResult, Settings};

/// Drives the NLA → TLS → RDP fallback ladder for one connection attempt.
///
/// Single-threaded and blocking: [`ClientConnector::connect`] runs to
/// completion on the caller's thread. There is no cancellation primitive;
/// closing the transport out-of-band is the only way to interrupt it, which
/// surfaces as an I/O failure on the next read or write.
pub struct ClientConnector {
    transport: Transport,
    state: NegotiationState,

    host: Option<String>,
    port: u16,

    security_layer_negotiation_enabled: bool,
    enable_rdp: bool,
    enable_tls: bool,
    enable_nla: bool,
    /// Set when negotiation is disabled: collapses `enabled()` down to this
    /// single protocol for the rest of the connection attempt.
    enabled_override: Option<SecurityProtocol>,

    cookie: Option<String>,
    cookie_max_length: usize,
    routing_token: Option<Vec<u8>>,

    send_preconnection_pdu: bool,
    preconnection_id: u32,
    preconnection_blob: Option<String>,

    /// `RESTRICTED_ADMIN_MODE_REQUIRED` / `REDIRECTED_AUTHENTICATION_MODE_REQUIRED` /
    /// `CORRELATION_INFO_PRESENT`, set on every `RDP_NEG_REQ` this negotiator sends.
    /// The fallback ladder never sets any of these on its own.
    request_flags: RequestFlags,

    requested_protocols: SecurityProtocol,
    selected_protocol: SecurityProtocol,
    flags: ResponseFlags,

    pending_error: Option<ConnectorError>,
}

impl ClientConnector {
    /// Allocates a negotiator around `transport`, starting in `Initial` with
    /// `requested_protocols = RDP` and a default `cookie_max_length` of 9 —
    /// not an MS-RDPBCGR requirement, just the length Windows' own `mstshash`
    /// cookies happen to use in practice. Callers with a different limit
    /// should call `set_cookie_max_length` explicitly.
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            state: NegotiationState::Initial,
            host: None,
            port: 3389,
            security_layer_negotiation_enabled: true,
            enable_rdp: true,
            enable_tls: false,
            enable_nla: false,
            enabled_override: None,
            cookie: None,
            cookie_max_length: 9,
            routing_token: None,
            send_preconnection_pdu: false,
            preconnection_id: 0,
            preconnection_blob: None,
            request_flags: RequestFlags::empty(),
            requested_protocols: SecurityProtocol::RDP,
            selected_protocol: SecurityProtocol::RDP,
            flags: ResponseFlags::empty(),
            pending_error: None,
        }
    }

    pub fn set_target(&mut self, host: impl Into<String>, port: u16) -> &mut Self {
        self.host = Some(host.into());
        self.port = port;
        self
    }

    pub fn set_negotiation_enabled(&mut self, enabled: bool) -> &mut Self {
        self.security_layer_negotiation_enabled = enabled;
        self
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

    pub fn set_cookie(&mut self, cookie: impl Into<String>) -> &mut Self {
        self.cookie = Some(cookie.into());
        self
    }

    pub fn set_cookie_max_length(&mut self, max_length: usize) -> &mut Self {
        self.cookie_max_length = max_length;
        self
    }

    /// A routing token takes precedence over a cookie: the two are mutually
    /// exclusive on the wire, and this negotiator never emits both.
    pub fn set_routing_token(&mut self, token: Vec<u8>) -> &mut Self {
        self.routing_token = Some(token);
        self
    }

    pub fn set_send_preconnection_pdu(&mut self, enabled: bool) -> &mut Self {
        self.send_preconnection_pdu = enabled;
        self
    }

    pub fn set_preconnection_id(&mut self, id: u32) -> &mut Self {
        self.preconnection_id = id;
        self
    }

    pub fn set_preconnection_blob(&mut self, blob: impl Into<String>) -> &mut Self {
        self.preconnection_blob = Some(blob.into());
        self
    }

    /// Sets `RESTRICTED_ADMIN_MODE_REQUIRED` on every `RDP_NEG_REQ` this
    /// negotiator sends. Acting on restricted-admin mode once selected is the
    /// post-negotiation sequence's job; this only shapes the wire request.
    pub fn set_restricted_admin_mode(&mut self, enabled: bool) -> &mut Self {
        self.request_flags.set(RequestFlags::RESTRICTED_ADMIN_MODE_REQUIRED, enabled);
        self
    }

    /// Releases the negotiator, handing the (possibly promoted) transport
    /// back to the caller.
    pub fn free(self) -> Transport {
        self.transport
    }

    fn enabled(&self) -> EnabledProtocols {
        match self.enabled_override {
            Some(only) => EnabledProtocols {
                nla: only == SecurityProtocol::NLA,
                tls: only == SecurityProtocol::TLS,
                rdp: only == SecurityProtocol::RDP,
            },
            None => EnabledProtocols {
                nla: self.enable_nla,
                tls: self.enable_tls,
                rdp: self.enable_rdp,
            },
        }
    }

    fn fail(&mut self, context: &'static str, kind: ConnectorErrorKind) {
        self.pending_error = Some(ConnectorError::new(context, kind));
        self.state = NegotiationState::Fail;
    }

    fn fail_with_source<E>(&mut self, context: &'static str, kind: ConnectorErrorKind, source: E)
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        self.pending_error = Some(ConnectorError::new(context, kind).with_source(source));
        self.state = NegotiationState::Fail;
    }

    /// Drives the negotiation to completion: opens the first TCP connection,
    /// walks the fallback ladder, and on success promotes the transport to
    /// whatever security layer was selected.
    pub fn connect(&mut self) -> ConnectorResult<ConnectionResult> {
        if self.state == NegotiationState::Initial {
            self.enter_initial();
        }

        loop {
            match self.state {
                NegotiationState::Fail => {
                    self.state = NegotiationState::Final;
                    return Err(self.take_failure());
                }
                NegotiationState::Final => break,
                _ => {
                    debug!(state = ?self.state, "negotiation step");
                    self.send();
                }
            }
        }

        let settings = derive_settings(self.requested_protocols, self.selected_protocol, self.flags);

        self.security_connect(settings)
    }

    fn take_failure(&mut self) -> ConnectorError {
        self.pending_error.take().unwrap_or_else(|| {
            ConnectorError::new(
                "negotiation failed for an unrecorded reason",
                ConnectorErrorKind::ConfigurationInvalid,
            )
        })
    }

    fn enter_initial(&mut self) {
        self.state = initial_state(self.enabled());

        if self.state == NegotiationState::Fail {
            self.fail("no security protocol enabled", ConnectorErrorKind::ConfigurationInvalid);
            return;
        }

        if !self.security_layer_negotiation_enabled {
            let chosen = match self.state {
                NegotiationState::TryNla => SecurityProtocol::NLA,
                NegotiationState::TryTls => SecurityProtocol::TLS,
                NegotiationState::TryRdp => SecurityProtocol::RDP,
                _ => unreachable!("initial_state never returns Initial/Final"),
            };
            self.enabled_override = Some(chosen);
            self.selected_protocol = chosen;
        }

        let Some(host) = self.host.clone() else {
            self.fail("no target configured", ConnectorErrorKind::ConfigurationInvalid);
            return;
        };

        if !self.transport.connect_tcp(&host, self.port) {
            // The source transitions to `Final` here and returns failure directly;
            // treated as a bug (it skips the normal fallback bookkeeping) and
            // corrected to `Fail` like every other I/O failure in this negotiator.
            self.fail("initial TCP connect failed", ConnectorErrorKind::TransportConnectFailed);
            return;
        }

        if self.send_preconnection_pdu {
            if let Err(error) = self.send_preconnection_pdu_frame() {
                self.pending_error = Some(error);
                self.state = NegotiationState::Fail;
            }
        }
    }

    fn send_preconnection_pdu_frame(&mut self) -> ConnectorResult<()> {
        let pcb = PreconnectionBlob {
            version: PcbVersion::V2,
            id: self.preconnection_id,
            v2_payload: self.preconnection_blob.clone(),
        };

        let bytes = rdp_nego_pdu::encode_vec(&pcb).map_err(ConnectorError::encode)?;

        self.transport.write_frame(&bytes).map_err(|error| {
            ConnectorError::new("write preconnection PDU", ConnectorErrorKind::TransportIoFailed).with_source(error)
        })
    }

    /// Dispatches to the attempt matching the current state. Any other state
    /// reaching here is a bug in the caller or in `connect`'s own loop.
    fn send(&mut self) {
        match self.state {
            NegotiationState::TryNla => self.attempt(NegotiationState::TryNla, SecurityProtocol::NLA | SecurityProtocol::TLS),
            NegotiationState::TryTls => self.attempt(NegotiationState::TryTls, SecurityProtocol::TLS),
            NegotiationState::TryRdp => self.attempt(NegotiationState::TryRdp, SecurityProtocol::RDP),
            other => unreachable!("send() dispatched from non-attempt state {other:?}"),
        }
    }

    fn attempt(&mut self, tier: NegotiationState, requested: SecurityProtocol) {
        self.requested_protocols = requested;

        if !self.transport.is_connected() {
            let Some(host) = self.host.clone() else {
                self.fail("no target configured", ConnectorErrorKind::ConfigurationInvalid);
                return;
            };

            if !self.transport.connect_tcp(&host, self.port) {
                self.fail("TCP reconnect failed", ConnectorErrorKind::TransportConnectFailed);
                return;
            }
        }

        if let Err(error) = self.send_connection_request() {
            self.pending_error = Some(error);
            self.state = NegotiationState::Fail;
        } else {
            self.receive();
        }

        if self.state == NegotiationState::Final {
            return;
        }

        // `state == Fail` here. RDP is the last tier: leave it as is.
        if tier == NegotiationState::TryRdp {
            return;
        }

        self.transport.disconnect();
        self.state = fallback(tier, self.enabled());
    }

    fn nego_data(&self) -> Option<NegoRequestData> {
        if let Some(token) = &self.routing_token {
            Some(NegoRequestData::RoutingToken(token.clone()))
        } else {
            self.cookie
                .as_ref()
                .map(|cookie| NegoRequestData::Cookie(cookie.chars().take(self.cookie_max_length).collect()))
        }
    }

    fn send_connection_request(&mut self) -> ConnectorResult<()> {
        let request = ConnectionRequest {
            nego_data: self.nego_data(),
            protocol: self.requested_protocols,
            flags: self.request_flags,
        };

        let bytes = rdp_nego_pdu::encode_vec(&request).map_err(ConnectorError::encode)?;

        self.transport.write_frame(&bytes).map_err(|error| {
            ConnectorError::new("write connection request", ConnectorErrorKind::TransportIoFailed).with_source(error)
        })
    }

    fn receive(&mut self) {
        let mut buf = self.transport.prepare_send_buffer(256);

        if let Err(error) = self.transport.read_frame(&mut buf) {
            self.fail_with_source("read connection confirm", ConnectorErrorKind::TransportIoFailed, error);
            return;
        }

        let confirm = match rdp_nego_pdu::decode::<ConnectionConfirm>(&buf) {
            Ok(confirm) => confirm,
            Err(error) => {
                self.fail("decode connection confirm", ConnectorErrorKind::ProtocolDecode(error));
                return;
            }
        };

        match confirm {
            ConnectionConfirm::Response { flags, protocol } => {
                self.selected_protocol = protocol;
                self.flags = flags;

                if self.protocol_enabled(protocol) {
                    self.state = NegotiationState::Final;
                } else {
                    self.fail(
                        "server selected a protocol outside enabled_protocols",
                        ConnectorErrorKind::ProtocolSelectionMismatch,
                    );
                }
            }
            ConnectionConfirm::Failure { code } => self.fail_with_code(code),
            ConnectionConfirm::None => {
                if self.enabled().rdp {
                    self.selected_protocol = SecurityProtocol::RDP;
                    self.state = NegotiationState::Final;
                } else {
                    self.fail(
                        "server implicitly selected RDP, which is disabled",
                        ConnectorErrorKind::ProtocolSelectionMismatch,
                    );
                }
            }
        }
    }

    fn protocol_enabled(&self, protocol: SecurityProtocol) -> bool {
        let enabled = self.enabled();
        match protocol {
            SecurityProtocol::NLA => enabled.nla,
            SecurityProtocol::TLS => enabled.tls,
            SecurityProtocol::RDP => enabled.rdp,
            _ => false,
        }
    }

    fn fail_with_code(&mut self, code: FailureCode) {
        self.fail("server rejected negotiation", ConnectorErrorKind::NegotiationFailure(code));
    }

    /// Promotes the transport to the selected security layer. Standard RDP
    /// security needs no promotion at this layer (`promote_rdp` is a no-op).
    fn security_connect(&mut self, settings: Settings) -> ConnectorResult<ConnectionResult> {
        let promoted = match self.selected_protocol {
            SecurityProtocol::NLA => self.transport.promote_nla(),
            SecurityProtocol::TLS => self.transport.promote_tls(),
            _ => true,
        };

        if !promoted {
            return Err(ConnectorError::new("security promotion", ConnectorErrorKind::PromotionFailed));
        }

        Ok(ConnectionResult { settings })
    }
}
