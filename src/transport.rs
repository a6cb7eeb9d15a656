//! Packet sources
//!
//! The transport is an opaque supplier of raw packets. Sources block until
//! the next packet is available and deliver packets in arrival order; no
//! reordering or duplicate detection is attempted.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;

use log::info;

use crate::decoder::FRAME_SIZE;

/// Port OpenSeeFace sends to unless told otherwise
pub const DEFAULT_PORT: u16 = 11573;

/// Trait for anything that yields raw tracking packets
pub trait PacketSource {
    /// Block until the next packet arrives.
    ///
    /// Returns `Ok(None)` when a finite source is exhausted. Errors are
    /// transport failures and are fatal to the run.
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Drop packets that are already queued without waiting for more.
    ///
    /// Called when the operator confirms a new pose, so that frames captured
    /// while moving into it are not recorded. Returns how many were dropped.
    /// Finite sources hold no live backlog and keep the default no-op.
    fn discard_pending(&mut self) -> io::Result<usize> {
        Ok(0)
    }
}

/// Live UDP listener
pub struct UdpSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpSource {
    /// Bind the listening socket
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        info!("Listening for tracking packets on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            // Oversized datagrams must surface as a wrong length, not be
            // truncated down to a plausible frame.
            buf: vec![0u8; FRAME_SIZE * 2],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn drain(&mut self) -> io::Result<usize> {
        let mut dropped = 0;
        loop {
            match self.socket.recv_from(&mut self.buf) {
                Ok(_) => dropped += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(dropped),
                Err(e) => return Err(e),
            }
        }
    }
}

impl PacketSource for UdpSource {
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        let (len, _peer) = self.socket.recv_from(&mut self.buf)?;
        Ok(Some(self.buf[..len].to_vec()))
    }

    fn discard_pending(&mut self) -> io::Result<usize> {
        self.socket.set_nonblocking(true)?;
        let drained = self.drain();
        self.socket.set_nonblocking(false)?;
        drained
    }
}

/// Replays a capture file of back-to-back raw packets
pub struct CaptureSource<R> {
    reader: R,
}

impl CaptureSource<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> CaptureSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> PacketSource for CaptureSource<R> {
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut chunk = Vec::with_capacity(FRAME_SIZE);
        (&mut self.reader)
            .take(FRAME_SIZE as u64)
            .read_to_end(&mut chunk)?;

        if chunk.is_empty() {
            Ok(None)
        } else {
            // A short trailing chunk is handed on and rejected by the decoder
            Ok(Some(chunk))
        }
    }
}

impl PacketSource for VecDeque<Vec<u8>> {
    fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.pop_front())
    }
}
