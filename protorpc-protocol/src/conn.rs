//! Stream connections and listeners.
//!
//! A [`Conn`] moves bytes, varints and length-prefixed frames over one
//! stream. Every frame on the wire is:
//!
//! ```text
//! +----------------+---------------------+
//! | uvarint length | length payload bytes |
//! +----------------+---------------------+
//! ```
//!
//! A length of zero carries no payload.

use crate::env::Env;
use crate::error::ProtocolError;
use crate::varint::{encode_uvarint, put_uvarint, uvarint_len, UvarintDecoder};
use crate::MAX_FRAME_SIZE;
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

/// A byte-stream connection.
///
/// Connected until [`Conn::close`] is called or an I/O failure is seen by the
/// owner. Not meant to be shared: one reader and one writer at most.
pub struct Conn<S = TcpStream> {
    stream: Option<S>,
    peer: Option<SocketAddr>,
    env: Env,
}

impl Conn<TcpStream> {
    /// Dials `host:port` over TCP.
    pub async fn dial(host: &str, port: u16, env: Env) -> Result<Self, ProtocolError> {
        tracing::debug!("Dialing {}:{}", host, port);
        let stream = match TcpStream::connect((host, port)).await {
            Ok(s) => s,
            Err(e) => {
                env.log(format_args!("protorpc.Conn.dial: connect {host}:{port} failed: {e}"));
                return Err(ProtocolError::Io(e));
            }
        };
        Self::from_tcp(stream, env)
    }

    /// Wraps an established TCP stream, enabling `TCP_NODELAY` so small
    /// frames are not held back.
    pub fn from_tcp(stream: TcpStream, env: Env) -> Result<Self, ProtocolError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().ok();
        Ok(Self {
            stream: Some(stream),
            peer,
            env,
        })
    }
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps any stream, e.g. an in-memory duplex.
    pub fn new(stream: S, env: Env) -> Self {
        Self {
            stream: Some(stream),
            peer: None,
            env,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Remote address, when the stream is a socket.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Shuts the stream down. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("shutdown after close: {}", e);
            }
        }
    }

    fn stream(&mut self) -> Result<&mut S, ProtocolError> {
        self.stream.as_mut().ok_or(ProtocolError::NotConnected)
    }

    /// Reads exactly `n` bytes.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; n];
        self.read_into(&mut buf).await?;
        Ok(buf)
    }

    async fn read_into(&mut self, buf: &mut [u8]) -> Result<(), ProtocolError> {
        let result = self.stream()?.read_exact(buf).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::ConnectionClosed),
            Err(e) => {
                self.env.log(format_args!("protorpc.Conn.read: {e}"));
                Err(ProtocolError::Io(e))
            }
        }
    }

    /// Writes all of `buf`.
    pub async fn write_exact(&mut self, buf: &[u8]) -> Result<(), ProtocolError> {
        let result = self.stream()?.write_all(buf).await;
        if let Err(e) = result {
            self.env.log(format_args!("protorpc.Conn.write: {e}"));
            return Err(match e.kind() {
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                    ProtocolError::ConnectionClosed
                }
                _ => ProtocolError::Io(e),
            });
        }
        Ok(())
    }

    /// Reads one unsigned varint, a byte at a time.
    pub async fn read_varint(&mut self) -> Result<u64, ProtocolError> {
        let mut decoder = UvarintDecoder::new();
        let mut byte = [0u8; 1];
        loop {
            self.read_into(&mut byte).await?;
            match decoder.push(byte[0]) {
                Ok(Some(x)) => return Ok(x),
                Ok(None) => continue,
                Err(e) => {
                    self.env
                        .log("protorpc.Conn.read_varint: varint overflows a 64-bit integer");
                    return Err(e);
                }
            }
        }
    }

    pub async fn write_varint(&mut self, x: u64) -> Result<(), ProtocolError> {
        let (buf, n) = encode_uvarint(x);
        self.write_exact(&buf[..n]).await
    }

    /// Reads one frame. Frames longer than [`MAX_FRAME_SIZE`] are rejected
    /// before anything is allocated.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.read_frame_limited(MAX_FRAME_SIZE).await
    }

    /// Reads one frame, rejecting declared lengths above `max`.
    pub async fn read_frame_limited(&mut self, max: u64) -> Result<Vec<u8>, ProtocolError> {
        let size = self.read_varint().await?;
        if size > max {
            self.env.log(format_args!(
                "protorpc.Conn.read_frame: frame of {size} bytes exceeds {max}"
            ));
            return Err(ProtocolError::FrameTooLarge { size, max });
        }
        if size == 0 {
            return Ok(Vec::new());
        }
        self.read_exact(size as usize).await
    }

    /// Writes one frame; `None` writes a zero length and nothing else.
    pub async fn write_frame(&mut self, data: Option<&[u8]>) -> Result<(), ProtocolError> {
        let Some(data) = data else {
            return self.write_varint(0).await;
        };
        let mut buf = BytesMut::with_capacity(uvarint_len(data.len() as u64) + data.len());
        put_uvarint(&mut buf, data.len() as u64);
        buf.extend_from_slice(data);
        self.write_exact(&buf).await
    }
}

/// A listening TCP socket.
pub struct Listener {
    inner: TcpListener,
    env: Env,
}

impl Listener {
    /// Listens on every IPv4 interface at `port`.
    pub fn listen(port: u16, backlog: u32, env: Env) -> Result<Self, ProtocolError> {
        Self::bind(SocketAddr::from(([0, 0, 0, 0], port)), backlog, env)
    }

    /// Binds to `addr` with an explicit accept backlog.
    pub fn bind(addr: SocketAddr, backlog: u32, env: Env) -> Result<Self, ProtocolError> {
        let bound = (|| -> io::Result<TcpListener> {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_reuseaddr(true)?;
            socket.bind(addr)?;
            socket.listen(backlog)
        })();

        match bound {
            Ok(inner) => Ok(Self { inner, env }),
            Err(e) => {
                env.log(format_args!("protorpc.Listener.bind: {addr}: {e}"));
                Err(ProtocolError::Io(e))
            }
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.inner.local_addr()?)
    }

    /// Waits for the next inbound connection.
    pub async fn accept(&self) -> Result<Conn<TcpStream>, ProtocolError> {
        match self.inner.accept().await {
            Ok((stream, _)) => Conn::from_tcp(stream, self.env.clone()),
            Err(e) => {
                self.env.log(format_args!("protorpc.Listener.accept: {e}"));
                Err(ProtocolError::Io(e))
            }
        }
    }
}
