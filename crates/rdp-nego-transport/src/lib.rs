//! Blocking transport adapter for the negotiation phase of an RDP connection.
//!
//! Owns the TCP socket (and, once promoted, the TLS stream) that carries
//! TPKT-framed X.224 traffic. The negotiator ([`rdp_nego_connector`],
//! [`rdp_nego_acceptor`]) drives this adapter but never touches the socket
//! directly: it asks for a fresh connection, hands over frames to send, and
//! reads back whatever frame arrives next.

#[macro_use]
extern crate tracing;

mod framed;
mod stream;

pub use self::stream::{NlaUpgrade, ReadWrite};

use std::io;
use std::net::TcpStream;

use self::framed::Framed;
use self::stream::Stream;

/// Which side of the connection this transport is playing.
///
/// Only [`Transport::promote_tls`] cares about the distinction: the client
/// connects out, the server accepts in, and each direction needs its own
/// half of `native-tls`.
#[derive(Clone, Copy)]
enum Role {
    Client,
    Server,
}

/// Owns the socket used during negotiation and offers the handful of
/// operations the negotiator needs: connect, disconnect, frame I/O, and the
/// one-shot promotions to TLS and NLA.
pub struct Transport {
    role: Role,
    framed: Option<Framed<Stream>>,
    target_host: Option<String>,
    tls_connector: Option<native_tls::TlsConnector>,
    tls_acceptor: Option<native_tls::TlsAcceptor>,
    nla_upgrade: Option<Box<dyn NlaUpgrade>>,
}

impl Transport {
    /// Builds a client-side transport with no connection yet. Call
    /// [`Transport::connect_tcp`] to establish one.
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            framed: None,
            target_host: None,
            tls_connector: None,
            tls_acceptor: None,
            nla_upgrade: None,
        }
    }

    /// Builds a server-side transport around an already-accepted TCP stream.
    pub fn server(stream: TcpStream) -> Self {
        Self {
            role: Role::Server,
            framed: Some(Framed::new(Stream::Tcp(stream))),
            target_host: None,
            tls_connector: None,
            tls_acceptor: None,
            nla_upgrade: None,
        }
    }

    /// Configures the `native-tls` connector used by a client's
    /// [`Transport::promote_tls`]. Self-signed RDP server certificates are
    /// the norm, so callers typically build this connector with certificate
    /// validation disabled, treating the TLS leg as opportunistic encryption
    /// rather than PKI-backed trust.
    pub fn set_tls_connector(&mut self, connector: native_tls::TlsConnector) {
        self.tls_connector = Some(connector);
    }

    /// Configures the server identity used by a server's
    /// [`Transport::promote_tls`].
    pub fn set_tls_acceptor(&mut self, acceptor: native_tls::TlsAcceptor) {
        self.tls_acceptor = Some(acceptor);
    }

    /// Registers the external collaborator that implements CredSSP for
    /// [`Transport::promote_nla`].
    pub fn set_nla_upgrade(&mut self, upgrade: Box<dyn NlaUpgrade>) {
        self.nla_upgrade = Some(upgrade);
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Opens a fresh TCP connection to `host:port`, dropping any previous
    /// one. Used by the client negotiator both for the first attempt and for
    /// every fallback retry.
    #[instrument(skip(self))]
    pub fn connect_tcp(&mut self, host: &str, port: u16) -> bool {
        match TcpStream::connect((host, port)) {
            Ok(stream) => {
                self.target_host = Some(host.to_owned());
                self.framed = Some(Framed::new(Stream::Tcp(stream)));
                true
            }
            Err(error) => {
                warn!(%error, host, port, "TCP connect failed");
                false
            }
        }
    }

    /// Closes the current connection, if any. The next `connect_tcp` starts
    /// over on a brand new socket, which is what lets a fallback attempt
    /// present a fresh X.224 Connection Request.
    pub fn disconnect(&mut self) {
        self.framed = None;
    }

    /// Reads one complete TPKT frame into `buf`, replacing its contents.
    pub fn read_frame(&mut self, buf: &mut Vec<u8>) -> io::Result<()> {
        let framed = self
            .framed
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is not connected"))?;

        let frame = framed.read_frame()?;
        buf.clear();
        buf.extend_from_slice(&frame);
        Ok(())
    }

    /// Writes a complete, already-framed message (TPKT header included).
    pub fn write_frame(&mut self, buf: &[u8]) -> io::Result<()> {
        let framed = self
            .framed
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is not connected"))?;

        framed.write_all(buf)
    }

    /// Hands out a buffer sized to `hint`, sparing the caller a guess at the
    /// eventual frame size.
    pub fn prepare_send_buffer(&self, hint: usize) -> Vec<u8> {
        Vec::with_capacity(hint)
    }

    /// Promotes the current connection to TLS. One-shot: calling it again
    /// once already promoted is a no-op success.
    #[instrument(skip(self))]
    pub fn promote_tls(&mut self) -> bool {
        let Some(framed) = self.framed.take() else {
            warn!("cannot promote to TLS: not connected");
            return false;
        };

        if framed.get_ref().is_tls() {
            self.framed = Some(framed);
            return true;
        }

        let Stream::Tcp(tcp) = framed.into_inner() else {
            unreachable!("is_tls() guards against this");
        };

        match self.role {
            Role::Client => {
                let Some(connector) = &self.tls_connector else {
                    error!("cannot promote to TLS: no TLS connector configured");
                    return false;
                };

                let domain = self.target_host.as_deref().unwrap_or("");

                match connector.connect(domain, tcp) {
                    Ok(tls) => {
                        self.framed = Some(Framed::new(Stream::Tls(Box::new(tls))));
                        true
                    }
                    Err(error) => {
                        error!(%error, "TLS handshake failed");
                        false
                    }
                }
            }
            Role::Server => {
                let Some(acceptor) = &self.tls_acceptor else {
                    error!("cannot promote to TLS: no TLS acceptor configured");
                    return false;
                };

                match acceptor.accept(tcp) {
                    Ok(tls) => {
                        self.framed = Some(Framed::new(Stream::Tls(Box::new(tls))));
                        true
                    }
                    Err(error) => {
                        error!(%error, "TLS accept failed");
                        false
                    }
                }
            }
        }
    }

    /// Promotes the current connection to Network Level Authentication: TLS
    /// first, then the registered [`NlaUpgrade`] collaborator runs CredSSP
    /// over it. The resulting stream stays TLS-framed; NLA is an
    /// authentication step layered on top, not a distinct wire framing.
    #[instrument(skip(self))]
    pub fn promote_nla(&mut self) -> bool {
        if !self.promote_tls() {
            return false;
        }

        let Some(upgrade) = &mut self.nla_upgrade else {
            error!("cannot promote to NLA: no CredSSP collaborator configured");
            return false;
        };

        let Some(framed) = &mut self.framed else {
            return false;
        };

        match upgrade.upgrade(framed.get_mut()) {
            Ok(()) => true,
            Err(error) => {
                error!(%error, "CredSSP handshake failed");
                false
            }
        }
    }
}
