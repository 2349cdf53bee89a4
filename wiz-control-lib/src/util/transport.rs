use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Context;
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::protocol::CONTROL_PORT;

/// Local port bound for device responses.
pub const LISTEN_PORT: u16 = 38900;

/// A datagram could not be handed to the network.
///
/// Sends are best-effort; callers log this and move on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(#[from] io::Error),
}

/// Send-only seam between the core and the network.
///
/// The core never owns a socket directly; everything outbound goes through
/// this trait so embedders and tests can substitute their own plumbing.
pub trait Transport {
    /// Sends one datagram to the network-wide broadcast address on the
    /// device control port.
    fn broadcast(&self, payload: &[u8]) -> Result<usize, TransportError>;

    /// Sends one datagram to a single device.
    fn send_unicast(&self, ip: IpAddr, port: u16, payload: &[u8]) -> Result<usize, TransportError>;
}

/// Fire-and-forget UDP transport over one shared socket.
///
/// Sends are non-blocking; a full send buffer surfaces as a
/// [`TransportError`] rather than suspending the tick loop.
pub struct UdpTransport {
    socket: UdpSocket,
    broadcast_target: SocketAddr,
}

impl UdpTransport {
    /// Binds the listen socket on the conventional local port and enables
    /// broadcast on it.
    pub async fn bind() -> anyhow::Result<Self> {
        Self::bind_port(LISTEN_PORT).await
    }

    /// Binds on an arbitrary local port. Port 0 gives an ephemeral socket,
    /// useful for one-shot commands that do not listen for announcements.
    pub async fn bind_port(port: u16) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind UDP socket on port {}", port))?;
        socket
            .set_broadcast(true)
            .context("failed to enable broadcast on the socket")?;
        Ok(UdpTransport {
            socket,
            broadcast_target: (Ipv4Addr::BROADCAST, CONTROL_PORT).into(),
        })
    }

    /// Receives one datagram. The host loop wraps this in its own timeout;
    /// the transport imposes none.
    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn broadcast(&self, payload: &[u8]) -> Result<usize, TransportError> {
        Ok(self.socket.try_send_to(payload, self.broadcast_target)?)
    }

    fn send_unicast(&self, ip: IpAddr, port: u16, payload: &[u8]) -> Result<usize, TransportError> {
        Ok(self.socket.try_send_to(payload, SocketAddr::from((ip, port)))?)
    }
}
