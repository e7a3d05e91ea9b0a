//! # Transport Abstraction
//!
//! The broker session runs over any reliable, ordered byte stream. The
//! [`Transport`] trait abstracts that stream so the session is agnostic of
//! the network stack; [`TcpTransport`] is the `embassy-net` implementation.

use core::net::SocketAddrV4;

use embassy_net::tcp::{ConnectError, Error as TcpError, TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;

/// A reliable, ordered byte-stream transport.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Error: core::fmt::Debug;

    /// Send the whole buffer.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receive into the buffer, returning the number of bytes read.
    /// Must return an error, not zero, when the peer goes away.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Errors from the TCP transport.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TcpTransportError {
    /// Opening the connection failed.
    Connect(ConnectError),
    /// A read or write failed.
    Tcp(TcpError),
    /// The peer closed the connection.
    Closed,
    /// No data arrived within the read timeout.
    Timeout,
}

/// TCP transport over an `embassy-net` socket.
///
/// Reads are raced against a timer so a hung broker cannot stall the
/// controller indefinitely.
pub struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    pub fn new(socket: TcpSocket<'a>, timeout: Duration) -> Self {
        Self { socket, timeout }
    }

    /// Open the connection to the broker.
    pub async fn connect(&mut self, addr: SocketAddrV4) -> Result<(), TcpTransportError> {
        self.socket
            .connect(addr)
            .await
            .map_err(TcpTransportError::Connect)
    }

    async fn read_with_timeout(&mut self, buf: &mut [u8]) -> Result<usize, TcpTransportError> {
        let read = core::pin::pin!(self.socket.read(buf));
        let timer = core::pin::pin!(Timer::after(self.timeout));

        match futures::future::select(read, timer).await {
            futures::future::Either::Left((Ok(0), _)) => Err(TcpTransportError::Closed),
            futures::future::Either::Left((Ok(n), _)) => Ok(n),
            futures::future::Either::Left((Err(e), _)) => Err(TcpTransportError::Tcp(e)),
            futures::future::Either::Right(((), _)) => Err(TcpTransportError::Timeout),
        }
    }
}

impl Transport for TcpTransport<'_> {
    type Error = TcpTransportError;

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.socket
            .write_all(buf)
            .await
            .map_err(TcpTransportError::Tcp)?;
        // Flush so the packet actually leaves the device.
        self.socket.flush().await.map_err(TcpTransportError::Tcp)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_with_timeout(buf).await
    }
}
