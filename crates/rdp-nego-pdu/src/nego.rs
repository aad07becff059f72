//! PDUs used during the Connection Initiation stage: the RDP_NEG_REQ / RDP_NEG_RSP /
//! RDP_NEG_FAILURE blobs carried inside the X.224 CR/CC TPDUs, plus the optional
//! cookie/routing-token line that precedes them in a Connection Request.

use bitflags::bitflags;
use rdp_nego_core::{DecodeResult, EncodeResult, ReadCursor, WriteCursor};

use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;
use crate::x224::X224Pdu;
use crate::Pdu;

bitflags! {
    /// A 32-bit, unsigned integer that contains flags indicating the supported
    /// security protocols.
    /// The client and server agree on it during the Connection Initiation phase.
    ///
    /// `HYBRID_EX` is not requested by this negotiator's fallback ladder (which
    /// only ever asks for `NLA | TLS`), but is defined so a peer value that sets
    /// it round-trips instead of being masked off by `from_bits_truncate`.
    ///
    /// # MSDN
    ///
    /// * [RDP Negotiation Request (RDP_NEG_REQ)](https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/902b090b-9cb3-4efc-92bf-ee13373371e3)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SecurityProtocol: u32 {
        const RDP = 0x0000_0000;
        const TLS = 0x0000_0001;
        const NLA = 0x0000_0002;
        const HYBRID_EX = 0x0000_0008;
    }
}

bitflags! {
    /// Holds the negotiation protocol flags of the *request* message.
    ///
    /// Not driven by the fallback ladder itself (this negotiator never sets any
    /// of these bits on its own requests); exposed so a caller that needs
    /// restricted-admin or redirected-auth mode can set it before `connect()`.
    ///
    /// # MSDN
    ///
    /// * [RDP Negotiation Request (RDP_NEG_REQ)](https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/902b090b-9cb3-4efc-92bf-ee13373371e3)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RequestFlags: u8 {
        const RESTRICTED_ADMIN_MODE_REQUIRED = 0x01;
        const REDIRECTED_AUTHENTICATION_MODE_REQUIRED = 0x02;
        const CORRELATION_INFO_PRESENT = 0x08;
    }
}

bitflags! {
    /// Holds the negotiation protocol flags of the *response* message.
    ///
    /// # MSDN
    ///
    /// * [RDP Negotiation Response (RDP_NEG_RSP)](https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-rdpbcgr/b2975bdc-6d56-49ee-9c57-f2ff3a0b6817)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ResponseFlags: u8 {
        const EXTENDED_CLIENT_DATA_SUPPORTED = 0x01;
        const DYNVC_GFX_PROTOCOL_SUPPORTED = 0x02;
        const NEGRSP_FLAG_RESERVED = 0x04;
    }
}

/// The reason a server rejected a negotiation attempt with `RDP_NEG_FAILURE`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FailureCode(u32);

impl FailureCode {
    pub const SSL_REQUIRED_BY_SERVER: Self = Self(1);
    pub const SSL_NOT_ALLOWED_BY_SERVER: Self = Self(2);
    pub const SSL_CERT_NOT_ON_SERVER: Self = Self(3);
    pub const INCONSISTENT_FLAGS: Self = Self(4);
    pub const HYBRID_REQUIRED_BY_SERVER: Self = Self(5);
    pub const SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER: Self = Self(6);

    pub fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for FailureCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FailureCode> for u32 {
    fn from(value: FailureCode) -> Self {
        value.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct NegoMsgType(u8);

impl NegoMsgType {
    const REQUEST: Self = Self(0x01);
    const RESPONSE: Self = Self(0x02);
    const FAILURE: Self = Self(0x03);
}

impl From<u8> for NegoMsgType {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<NegoMsgType> for u8 {
    fn from(value: NegoMsgType) -> Self {
        value.0
    }
}

/// The client-chosen identification data carried in a Connection Request, ahead
/// of any `RDP_NEG_REQ` block.
///
/// A routing token is written verbatim: the caller is responsible for including
/// the terminating `CR LF`. A cookie is wrapped in the standard
/// `Cookie: mstshash=<value>\r\n` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegoRequestData {
    RoutingToken(Vec<u8>),
    Cookie(String),
}

impl NegoRequestData {
    const COOKIE_PREFIX: &'static str = "Cookie: mstshash=";

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::RoutingToken(bytes) => {
                ensure_size!(ctx: "NegoRequestData", in: dst, size: bytes.len());
                dst.write_slice(bytes);
            }
            Self::Cookie(cookie) => {
                ensure_size!(ctx: "NegoRequestData", in: dst, size: self.size());
                dst.write_slice(Self::COOKIE_PREFIX.as_bytes());
                dst.write_slice(cookie.as_bytes());
                dst.write_u8(0x0D);
                dst.write_u8(0x0A);
            }
        }

        Ok(())
    }

    fn size(&self) -> usize {
        match self {
            Self::RoutingToken(bytes) => bytes.len(),
            Self::Cookie(cookie) => Self::COOKIE_PREFIX.len() + cookie.len() + 2,
        }
    }
}

/// Length, in bytes, of a routing-token/cookie line preceding `RDP_NEG_REQ`, or
/// `0` when none is present. Identified by scanning for a `CR LF` terminator;
/// the content of the line is not otherwise interpreted.
fn nego_data_line_len(bytes: &[u8]) -> usize {
    bytes
        .windows(2)
        .position(|pair| pair == [0x0D, 0x0A])
        .map_or(0, |pos| pos + 2)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Present only when building an outgoing request; decoding never reconstructs
    /// this field since the negotiator has no use for the cookie/token's content.
    pub nego_data: Option<NegoRequestData>,
    pub protocol: SecurityProtocol,
    /// `RESTRICTED_ADMIN_MODE_REQUIRED` / `REDIRECTED_AUTHENTICATION_MODE_REQUIRED` /
    /// `CORRELATION_INFO_PRESENT`. The fallback ladder never sets any of these on
    /// its own; a caller configures them explicitly before `connect()`.
    pub flags: RequestFlags,
}

impl Pdu for ConnectionRequest {
    const NAME: &'static str = "Client X.224 Connection Request";
}

impl ConnectionRequest {
    const RDP_NEG_REQ_SIZE: u16 = 8;
}

impl<'de> X224Pdu<'de> for ConnectionRequest {
    const TPDU_CODE: TpduCode = TpduCode::CONNECTION_REQUEST;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        if let Some(nego_data) = &self.nego_data {
            nego_data.write(dst)?;
        }

        if self.protocol != SecurityProtocol::RDP {
            ensure_size!(in: dst, size: usize::from(Self::RDP_NEG_REQ_SIZE));
            dst.write_u8(u8::from(NegoMsgType::REQUEST));
            dst.write_u8(self.flags.bits());
            dst.write_u16(Self::RDP_NEG_REQ_SIZE);
            dst.write_u32(self.protocol.bits());
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let variable_part_size = tpdu.variable_part_size();

        ensure_size!(in: src, size: variable_part_size);

        let window = src.peek_slice(variable_part_size);
        let nego_line_len = nego_data_line_len(window);
        src.advance(nego_line_len);

        let rest_size = variable_part_size - nego_line_len;

        let (protocol, flags) = if rest_size >= usize::from(Self::RDP_NEG_REQ_SIZE) {
            let msg_type = NegoMsgType::from(src.read_u8());

            if msg_type != NegoMsgType::REQUEST {
                return Err(unexpected_message_type_err!(u8::from(msg_type)));
            }

            let flags = RequestFlags::from_bits_truncate(src.read_u8());
            let _length = src.read_u16();

            (SecurityProtocol::from_bits_truncate(src.read_u32()), flags)
        } else {
            (SecurityProtocol::RDP, RequestFlags::empty())
        };

        Ok(Self {
            nego_data: None,
            protocol,
            flags,
        })
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        let nego_data_size = self.nego_data.as_ref().map_or(0, NegoRequestData::size);

        let rdp_neg_req_size = if self.protocol == SecurityProtocol::RDP {
            0
        } else {
            usize::from(Self::RDP_NEG_REQ_SIZE)
        };

        nego_data_size + rdp_neg_req_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfirm {
    Response {
        flags: ResponseFlags,
        protocol: SecurityProtocol,
    },
    Failure {
        code: FailureCode,
    },
    /// No `rdpNegData` at all: implicit acceptance of RDP Standard Security.
    None,
}

impl Pdu for ConnectionConfirm {
    const NAME: &'static str = "Server X.224 Connection Confirm";
}

impl ConnectionConfirm {
    const RDP_NEG_RSP_SIZE: u16 = 8;
}

impl<'de> X224Pdu<'de> for ConnectionConfirm {
    const TPDU_CODE: TpduCode = TpduCode::CONNECTION_CONFIRM;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            ConnectionConfirm::Response { flags, protocol } => {
                ensure_size!(in: dst, size: usize::from(Self::RDP_NEG_RSP_SIZE));
                dst.write_u8(u8::from(NegoMsgType::RESPONSE));
                dst.write_u8(flags.bits());
                dst.write_u16(Self::RDP_NEG_RSP_SIZE);
                dst.write_u32(protocol.bits());
            }
            ConnectionConfirm::Failure { code } => {
                ensure_size!(in: dst, size: usize::from(Self::RDP_NEG_RSP_SIZE));
                dst.write_u8(u8::from(NegoMsgType::FAILURE));
                dst.write_u8(0);
                dst.write_u16(Self::RDP_NEG_RSP_SIZE);
                dst.write_u32(u32::from(*code));
            }
            ConnectionConfirm::None => {}
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let variable_part_size = tpdu.variable_part_size();

        ensure_size!(in: src, size: variable_part_size);

        if variable_part_size > 0 {
            ensure_size!(in: src, size: 8); // message type (1) + flags (1) + length (2) + code/protocol (4)

            match NegoMsgType::from(src.read_u8()) {
                NegoMsgType::RESPONSE => {
                    let flags = ResponseFlags::from_bits_truncate(src.read_u8());
                    let _length = src.read_u16();
                    let protocol = SecurityProtocol::from_bits_truncate(src.read_u32());

                    Ok(Self::Response { flags, protocol })
                }
                NegoMsgType::FAILURE => {
                    let _flags = src.read_u8();
                    let _length = src.read_u16();
                    let code = FailureCode::from(src.read_u32());

                    Ok(Self::Failure { code })
                }
                unexpected => Err(unexpected_message_type_err!(u8::from(unexpected))),
            }
        } else {
            Ok(Self::None)
        }
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        match self {
            ConnectionConfirm::Response { .. } | ConnectionConfirm::Failure { .. } => usize::from(Self::RDP_NEG_RSP_SIZE),
            ConnectionConfirm::None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use rdp_nego_core::{decode, encode_vec};

    use super::*;

    // Client requests NLA | TLS.
    const NLA_TLS_REQUEST_WIRE: [u8; 19] = [
        0x03, 0x00, 0x00, 0x13, // TPKT: version 3, length 19
        0x0E, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x00, // TPDU: li=14, CR, dst-ref, src-ref, class
        0x01, 0x00, 0x08, 0x00, 0x03, 0x00, 0x00, 0x00, // RDP_NEG_REQ: NLA | TLS
    ];

    #[test]
    fn connection_request_with_nego_req_round_trips() {
        let request = ConnectionRequest {
            nego_data: None,
            protocol: SecurityProtocol::NLA | SecurityProtocol::TLS,
            flags: RequestFlags::empty(),
        };

        assert_eq!(encode_vec(&request).unwrap(), NLA_TLS_REQUEST_WIRE);

        let decoded = decode::<ConnectionRequest>(&NLA_TLS_REQUEST_WIRE).unwrap();
        assert_eq!(decoded.protocol, request.protocol);
        assert_eq!(decoded.flags, request.flags);
    }

    // requestedProtocols == RDP suppresses RDP_NEG_REQ entirely: li drops to 6
    // and the CR carries no rdpNegData.
    const RDP_ONLY_REQUEST_WIRE: [u8; 11] = [0x03, 0x00, 0x00, 0x0B, 0x06, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x00];

    #[test]
    fn connection_request_with_rdp_protocol_has_no_nego_req() {
        let request = ConnectionRequest {
            nego_data: None,
            protocol: SecurityProtocol::RDP,
            flags: RequestFlags::empty(),
        };

        assert_eq!(encode_vec(&request).unwrap(), RDP_ONLY_REQUEST_WIRE);

        let decoded = decode::<ConnectionRequest>(&RDP_ONLY_REQUEST_WIRE).unwrap();
        assert_eq!(decoded.protocol, SecurityProtocol::RDP);
    }

    // Server confirms NLA, EXTENDED_CLIENT_DATA_SUPPORTED set.
    const NLA_RESPONSE_WIRE: [u8; 19] = [
        0x03, 0x00, 0x00, 0x13, 0x0E, 0xD0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x01, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn connection_confirm_response_round_trips() {
        let confirm = ConnectionConfirm::Response {
            flags: ResponseFlags::EXTENDED_CLIENT_DATA_SUPPORTED,
            protocol: SecurityProtocol::NLA,
        };

        assert_eq!(encode_vec(&confirm).unwrap(), NLA_RESPONSE_WIRE);
        assert_eq!(decode::<ConnectionConfirm>(&NLA_RESPONSE_WIRE).unwrap(), confirm);
    }

    // HYBRID_REQUIRED_BY_SERVER failure.
    const FAILURE_WIRE: [u8; 19] = [
        0x03, 0x00, 0x00, 0x13, 0x0E, 0xD0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x08, 0x00, 0x05, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn connection_confirm_failure_round_trips() {
        let confirm = ConnectionConfirm::Failure {
            code: FailureCode::HYBRID_REQUIRED_BY_SERVER,
        };

        assert_eq!(encode_vec(&confirm).unwrap(), FAILURE_WIRE);
        assert_eq!(decode::<ConnectionConfirm>(&FAILURE_WIRE).unwrap(), confirm);
    }

    // No rdpNegData, li == 6, implicit RDP acceptance.
    const NO_NEGO_DATA_WIRE: [u8; 11] = [0x03, 0x00, 0x00, 0x0B, 0x06, 0xD0, 0x00, 0x00, 0x00, 0x00, 0x00];

    #[test]
    fn connection_confirm_with_no_nego_data_round_trips() {
        assert_eq!(encode_vec(&ConnectionConfirm::None).unwrap(), NO_NEGO_DATA_WIRE);
        assert_eq!(decode::<ConnectionConfirm>(&NO_NEGO_DATA_WIRE).unwrap(), ConnectionConfirm::None);
    }

    #[test]
    fn connection_confirm_rejects_unknown_message_type() {
        let mut wire = NLA_RESPONSE_WIRE;
        wire[11] = 0x7F; // message type
        assert!(decode::<ConnectionConfirm>(&wire).is_err());
    }

    // A routing token is written verbatim, terminator included by the caller.
    #[test]
    fn routing_token_is_written_verbatim() {
        let data = NegoRequestData::RoutingToken(b"Cookie: msts=route1\r\n".to_vec());
        let request = ConnectionRequest {
            nego_data: Some(data),
            protocol: SecurityProtocol::RDP,
            flags: RequestFlags::empty(),
        };

        let encoded = encode_vec(&request).unwrap();
        let tpdu_body = &encoded[11..];
        assert_eq!(tpdu_body, b"Cookie: msts=route1\r\n");
    }

    // A plain cookie is wrapped in the standard `Cookie: mstshash=` line.
    #[test]
    fn cookie_is_wrapped_in_mstshash_line() {
        let data = NegoRequestData::Cookie("alice".to_owned());
        let request = ConnectionRequest {
            nego_data: Some(data),
            protocol: SecurityProtocol::RDP,
            flags: RequestFlags::empty(),
        };

        let encoded = encode_vec(&request).unwrap();
        let tpdu_body = &encoded[11..];
        assert_eq!(tpdu_body, b"Cookie: mstshash=alice\r\n");
    }

    // The decoder skips the cookie/routing-token line by scanning for `CR LF`
    // before looking for an `RDP_NEG_REQ` block.
    #[test]
    fn decoder_skips_cookie_line_before_nego_req() {
        let mut wire = vec![0x03, 0x00, 0x00, 0x00]; // TPKT length patched below
        wire.extend_from_slice(&[0x00, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x00]); // li patched below
        wire.extend_from_slice(b"Cookie: mstshash=bob\r\n");
        wire.extend_from_slice(&[0x01, 0x00, 0x08, 0x00, 0x01, 0x00, 0x00, 0x00]); // NEG_REQ: TLS

        let tpdu_variable_len = wire.len() - 11;
        wire[4] = (7 + tpdu_variable_len - 1) as u8; // li
        let packet_length = wire.len() as u16;
        wire[2..4].copy_from_slice(&packet_length.to_be_bytes());

        let decoded = decode::<ConnectionRequest>(&wire).unwrap();
        assert_eq!(decoded.protocol, SecurityProtocol::TLS);
    }
}
