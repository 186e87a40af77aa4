//! Concrete UDP transport: one `tokio::net::UdpSocket` shared between the
//! write side (`Sender`, used by every outstanding `Transaction`) and the
//! read side (`Receiver`, used only by the engine's receive loop).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use crate::domain::address::Address;
use crate::ports::{Receiver, Sender};

const MAX_DATAGRAM: usize = 2048;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind(addr: std::net::SocketAddr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(UdpTransport { socket: Arc::new(socket) })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl Sender for UdpTransport {
    async fn send_to(&self, addr: Address, bytes: Vec<u8>) -> std::io::Result<()> {
        self.socket.send_to(&bytes, addr.socket_addr()).await?;
        Ok(())
    }
}

#[async_trait]
impl Receiver for UdpTransport {
    async fn recv_from(&self) -> std::io::Result<(Vec<u8>, Address)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, Address::new(from)))
    }
}
