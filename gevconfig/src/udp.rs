//! Transport layer for GigE Vision Control Protocol (GVCP) over UDP.
//!
//! This operates over port 3956.
//!
//! The same channel is used both for broadcast traffic (`DISCOVERY`,
//! `FORCEIP`), where acknowledgements may come from any address, and for
//! unicast register access to a single device, where the socket is connected.
use crate::{
    protocol::{GvcpAck, GvcpCommand},
    Error, Result,
};
use binrw::{BinRead, BinWrite};
use std::{
    io::Cursor,
    net::{SocketAddr, SocketAddrV4},
};
use tokio::net::UdpSocket;

pub struct GvcpUdpChannel {
    sock: Option<UdpSocket>,
}

impl Default for GvcpUdpChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl GvcpUdpChannel {
    pub fn new() -> Self {
        Self { sock: None }
    }

    /// Binds the channel to a local address, with broadcast enabled.
    pub async fn bind(&mut self, addr: SocketAddrV4) -> Result {
        let sock = UdpSocket::bind(addr).await?;
        sock.set_broadcast(true)?;
        self.sock = Some(sock);
        Ok(())
    }

    /// Binds the channel to a local address, and connects it to a single
    /// device.
    pub async fn connect(&mut self, local: SocketAddrV4, remote: SocketAddrV4) -> Result {
        let sock = UdpSocket::bind(local).await?;
        sock.connect(remote).await?;
        self.sock = Some(sock);
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let sock = self.sock.as_ref().ok_or(Error::ChannelUnavailable)?;
        Ok(sock.local_addr()?)
    }

    /// Sends a command to the connected device.
    pub async fn send(&self, cmd: &GvcpCommand) -> Result {
        let sock = self.sock.as_ref().ok_or(Error::ChannelUnavailable)?;
        trace!("> {cmd:?}");
        sock.send(&encode(cmd)?).await?;
        Ok(())
    }

    /// Sends a command to an arbitrary (possibly broadcast) address.
    pub async fn send_to(&self, cmd: &GvcpCommand, addr: SocketAddrV4) -> Result {
        let sock = self.sock.as_ref().ok_or(Error::ChannelUnavailable)?;
        trace!("> {addr}: {cmd:?}");
        sock.send_to(&encode(cmd)?, addr).await?;
        Ok(())
    }

    /// Receives the next acknowledgement, and where it came from.
    ///
    /// Datagrams which aren't valid acknowledgements give
    /// [`Error::BinRwError`]; the channel remains usable afterwards.
    pub async fn recv_from(&self) -> Result<(GvcpAck, SocketAddr)> {
        let sock = self.sock.as_ref().ok_or(Error::ChannelUnavailable)?;
        let mut b = [0u8; GvcpCommand::MAX_PACKET_LENGTH];
        let (l, src) = sock.recv_from(&mut b).await?;
        let b = &b[..l];

        let ack = GvcpAck::read(&mut Cursor::new(b))?;
        trace!("< {src}: {ack:?}");
        Ok((ack, src))
    }

    /// Extracts the inner [std::net::UdpSocket] from this channel.
    ///
    /// This renders the [GvcpUdpChannel] unusable.
    ///
    /// This is needed for clean-up tasks, where we might not have an async
    /// runtime available anymore.
    pub fn take_std_socket(&mut self) -> Result<std::net::UdpSocket> {
        let sock = self.sock.take().ok_or(Error::ChannelUnavailable)?;
        Ok(sock.into_std()?)
    }
}

/// Serialises a command into a datagram.
pub(crate) fn encode(cmd: &GvcpCommand) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::with_capacity(GvcpCommand::MAX_PACKET_LENGTH));
    cmd.write(&mut out)?;
    Ok(out.into_inner())
}
