//! UDP relay source.
//!
//! A sender streams raw PCM16 mono datagrams (16 kHz) at the controller. Each
//! call to `next_clip` concatenates every datagram received within the capture
//! window. Datagram ordering is whatever the network delivers.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use super::{AudioClip, AudioSource, DEFAULT_SAMPLE_RATE};
use crate::error::{PetCareError, Result};

const MAX_DATAGRAM: usize = 4096;

pub struct UdpPcmSource {
    socket: UdpSocket,
    window: Duration,
}

impl UdpPcmSource {
    pub fn bind(addr: &str, window: Duration) -> Result<Self> {
        if window.is_zero() {
            return Err(PetCareError::Config(
                "UDP capture window must be greater than zero".into(),
            ));
        }
        let socket = UdpSocket::bind(addr)?;
        log::info!("UdpPcmSource: listening on {}", socket.local_addr()?);
        Ok(Self { socket, window })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl AudioSource for UdpPcmSource {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn next_clip(&mut self) -> Result<AudioClip> {
        let deadline = Instant::now() + self.window;
        let mut bytes = Vec::new();
        let mut buf = [0u8; MAX_DATAGRAM];
        let mut datagrams = 0usize;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.socket.set_read_timeout(Some(remaining))?;
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    log::trace!("received {} bytes from {}", n, from);
                    bytes.extend_from_slice(&buf[..n]);
                    datagrams += 1;
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        log::debug!(
            "UdpPcmSource: {} datagrams, {} bytes in {:?}",
            datagrams,
            bytes.len(),
            self.window
        );
        Ok(AudioClip::new(bytes, DEFAULT_SAMPLE_RATE))
    }
}
