use std::io::{self, Read, Write};
use std::net::TcpStream;

/// The active connection backing a [`crate::Transport`]: plain TCP before any
/// promotion, TLS afterward. RDP negotiation itself always runs over the
/// `Tcp` variant; `Tls` only appears once `promote_tls`/`promote_nla` succeed.
pub enum Stream {
    Tcp(TcpStream),
    Tls(Box<native_tls::TlsStream<TcpStream>>),
}

impl Stream {
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            Self::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            Self::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            Self::Tls(s) => s.flush(),
        }
    }
}

/// Performs the CredSSP handshake that promotes an already-TLS-secured
/// stream to Network Level Authentication.
///
/// CredSSP itself is out of scope for this crate: it is a large,
/// security-sensitive protocol in its own right. This trait is the seam an
/// external collaborator implements to plug its CredSSP implementation into
/// the negotiator's `promote_nla` step.
pub trait NlaUpgrade {
    /// Runs the handshake over `stream`, reading and writing directly on it.
    /// On success, the same stream continues to carry the RDP connection.
    fn upgrade(&mut self, stream: &mut dyn ReadWrite) -> io::Result<()>;
}

/// Object-safe alias for a stream that supports both halves of the duplex.
pub trait ReadWrite: Read + Write {}
impl<T: Read + Write> ReadWrite for T {}
