use std::io::{self, Read, Write};

use bytes::BytesMut;

/// Buffers bytes read from `S` so that [`Framed::read_frame`] can hand back
/// exactly one TPKT frame at a time, keeping any leftover for the next call.
pub struct Framed<S> {
    stream: S,
    buf: BytesMut,
}

impl<S> Framed<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    fn peek(&self) -> &[u8] {
        &self.buf
    }
}

impl<S> Framed<S>
where
    S: Read,
{
    /// Reads once into the internal buffer. Returns `0` on EOF.
    fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0_u8; 4096];
        let len = self.stream.read(&mut chunk)?;
        self.buf.extend_from_slice(&chunk[..len]);
        Ok(len)
    }

    fn read_exact(&mut self, length: usize) -> io::Result<BytesMut> {
        while self.buf.len() < length {
            if self.fill()? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed while reading a frame",
                ));
            }
        }

        Ok(self.buf.split_to(length))
    }

    /// Reads one complete TPKT frame (header + X.224 payload), blocking until
    /// it has arrived in full.
    pub fn read_frame(&mut self) -> io::Result<BytesMut> {
        loop {
            if let Some(len) = tpkt_frame_len(self.peek()) {
                return self.read_exact(len);
            }

            if self.fill()? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before a full TPKT header arrived",
                ));
            }
        }
    }
}

impl<S> Framed<S>
where
    S: Write,
{
    pub fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream.write_all(buf)
    }
}

/// Total length of the TPKT frame (header included) once its 4-byte header
/// has arrived, or `None` if more bytes are needed. The length is read
/// straight off the wire layout (`03 00 len_hi len_lo`); full header
/// validation happens later when the frame is decoded.
fn tpkt_frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < rdp_nego_pdu::tpkt::TpktHeader::SIZE {
        return None;
    }

    Some(usize::from(u16::from_be_bytes([buf[2], buf[3]])))
}
