//! Server-side negotiation scenarios driven over a real loopback
//! `TcpListener`, mirroring `rdp-nego-connector`'s end-to-end tests: a
//! scripted thread plays the client side by hand so each test only exercises
//! `ServerAcceptor` under test.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use rdp_nego_acceptor::{AcceptorErrorKind, ServerAcceptor};
use rdp_nego_pdu::nego::{ConnectionConfirm, ConnectionRequest, RequestFlags, ResponseFlags, SecurityProtocol};
use rdp_nego_pdu::{decode, encode_vec};
use rdp_nego_transport::{NlaUpgrade, ReadWrite, Transport};

const CERT_PEM: &[u8] = include_bytes!("fixtures/localhost-cert.pem");
const KEY_PEM: &[u8] = include_bytes!("fixtures/localhost-key.pem");

fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind loopback listener");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

fn write_connection_request(stream: &mut TcpStream, protocol: SecurityProtocol) {
    let request = ConnectionRequest {
        nego_data: None,
        protocol,
        flags: RequestFlags::empty(),
    };
    let bytes = encode_vec(&request).expect("encode connection request");
    stream.write_all(&bytes).expect("write connection request");
}

fn read_connection_confirm(stream: &mut TcpStream) -> ConnectionConfirm {
    let mut header = [0_u8; 4];
    stream.read_exact(&mut header).expect("read TPKT header");
    let total_len = usize::from(u16::from_be_bytes([header[2], header[3]]));

    let mut frame = vec![0_u8; total_len];
    frame[..4].copy_from_slice(&header);
    stream.read_exact(&mut frame[4..]).expect("read TPDU body");

    decode::<ConnectionConfirm>(&frame).expect("decode connection confirm")
}

fn tls_acceptor() -> native_tls::TlsAcceptor {
    let identity = native_tls::Identity::from_pkcs8(CERT_PEM, KEY_PEM).expect("build server identity");
    native_tls::TlsAcceptor::new(identity).expect("build TLS acceptor")
}

fn tls_connector() -> native_tls::TlsConnector {
    native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .expect("build TLS connector")
}

/// Stands in for the out-of-scope CredSSP handshake on the server side.
struct NoopCredSsp;

impl NlaUpgrade for NoopCredSsp {
    fn upgrade(&mut self, _stream: &mut dyn ReadWrite) -> std::io::Result<()> {
        Ok(())
    }
}

// Client asks for TLS and/or NLA; this server supports both and picks NLA,
// the stronger of the two, then promotes the socket to TLS underneath it.
#[test]
fn selects_strongest_common_protocol_and_promotes() {
    let (listener, port) = listener();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("client connect");
        write_connection_request(&mut stream, SecurityProtocol::NLA | SecurityProtocol::TLS);

        let confirm = read_connection_confirm(&mut stream);
        assert_eq!(
            confirm,
            ConnectionConfirm::Response {
                flags: ResponseFlags::EXTENDED_CLIENT_DATA_SUPPORTED,
                protocol: SecurityProtocol::NLA,
            }
        );

        tls_connector().connect("127.0.0.1", stream).expect("client TLS handshake");
    });

    let (stream, _) = listener.accept().expect("accept connection");
    let mut transport = Transport::server(stream);
    transport.set_tls_acceptor(tls_acceptor());
    transport.set_nla_upgrade(Box::new(NoopCredSsp));

    let mut acceptor = ServerAcceptor::new(transport);
    acceptor.enable_nla(true);
    acceptor.enable_tls(true);
    acceptor.set_server_key_path("unused for TLS/NLA selection");

    let result = acceptor.accept().expect("negotiation succeeds");
    assert_eq!(result.settings.selected_protocol, SecurityProtocol::NLA);

    client.join().expect("client thread panicked");
}

// Client requests only RDP, and the server's policy allows it: no rdpNegData
// is exchanged, matching a legacy-compatible confirm.
#[test]
fn implicit_rdp_accepted_when_server_allows_it() {
    let (listener, port) = listener();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("client connect");
        write_connection_request(&mut stream, SecurityProtocol::RDP);

        assert_eq!(read_connection_confirm(&mut stream), ConnectionConfirm::None);
    });

    let (stream, _) = listener.accept().expect("accept connection");
    let mut acceptor = ServerAcceptor::new(Transport::server(stream));
    acceptor.set_server_key_path("/etc/rdp/server.pem");

    let result = acceptor.accept().expect("negotiation succeeds");
    assert_eq!(result.settings.selected_protocol, SecurityProtocol::RDP);

    client.join().expect("client thread panicked");
}

// Client requests only RDP, but this server's policy forbids Standard RDP
// Security: the acceptor must reject with SSL_REQUIRED_BY_SERVER.
#[test]
fn rejects_rdp_when_server_requires_stronger_security() {
    let (listener, port) = listener();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("client connect");
        write_connection_request(&mut stream, SecurityProtocol::RDP);

        match read_connection_confirm(&mut stream) {
            ConnectionConfirm::Failure { code } => {
                assert_eq!(code, rdp_nego_pdu::nego::FailureCode::SSL_REQUIRED_BY_SERVER);
            }
            other => panic!("expected NEG_FAILURE, got {other:?}"),
        }
    });

    let (stream, _) = listener.accept().expect("accept connection");
    let mut acceptor = ServerAcceptor::new(Transport::server(stream));
    acceptor.enable_rdp(false);
    acceptor.enable_tls(true);

    let error = acceptor.accept().expect_err("server must refuse Standard RDP Security");
    assert!(matches!(
        error.kind(),
        AcceptorErrorKind::NegotiationRejected(code) if *code == rdp_nego_pdu::nego::FailureCode::SSL_REQUIRED_BY_SERVER
    ));

    client.join().expect("client thread panicked");
}

// Client requests TLS, but this server's policy only allows NLA: no overlap,
// so the acceptor must reject rather than silently downgrade to implicit RDP.
#[test]
fn rejects_when_no_protocol_overlap() {
    let (listener, port) = listener();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("client connect");
        write_connection_request(&mut stream, SecurityProtocol::TLS);

        match read_connection_confirm(&mut stream) {
            ConnectionConfirm::Failure { code } => {
                assert_eq!(code, rdp_nego_pdu::nego::FailureCode::SSL_NOT_ALLOWED_BY_SERVER);
            }
            other => panic!("expected NEG_FAILURE, got {other:?}"),
        }
    });

    let (stream, _) = listener.accept().expect("accept connection");
    let mut acceptor = ServerAcceptor::new(Transport::server(stream));
    acceptor.enable_rdp(false);
    acceptor.enable_tls(false);
    acceptor.enable_nla(true);

    let error = acceptor.accept().expect_err("no protocol overlap must fail");
    assert!(matches!(error.kind(), AcceptorErrorKind::NegotiationRejected(_)));

    client.join().expect("client thread panicked");
}

// Selecting RDP with no server key/certificate configured is a hard
// configuration error, not a wire-level rejection.
#[test]
fn selecting_rdp_without_server_key_is_configuration_error() {
    let (listener, port) = listener();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("client connect");
        write_connection_request(&mut stream, SecurityProtocol::RDP);
        stream
    });

    let (stream, _) = listener.accept().expect("accept connection");
    let mut acceptor = ServerAcceptor::new(Transport::server(stream));
    // No `set_server_key_path` call.

    let error = acceptor.accept().expect_err("RDP selection with no server key must fail");
    assert!(matches!(error.kind(), AcceptorErrorKind::ConfigurationInvalid));

    client.join().expect("client thread panicked");
}
