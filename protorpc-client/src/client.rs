//! High-level client API.

use crate::error::ClientError;
use protorpc_protocol::{wire, Conn, Env, Message, MethodDescriptor, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Dial timeout; `None` waits for the operating system.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_PORT)
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

impl From<SocketAddr> for ClientConfig {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// RPC client.
///
/// Dials on first use and keeps one connection. Calls take `&mut self`, so
/// one client runs one call at a time; open more clients for concurrency.
/// After a protocol failure the connection is dropped and the next call
/// dials again.
pub struct Client {
    config: ClientConfig,
    env: Env,
    conn: Option<Conn>,
    seq: u64,
}

impl Client {
    /// Creates a client. Nothing is dialed until the first call.
    pub fn new(config: ClientConfig, env: Env) -> Self {
        Self {
            config,
            env,
            conn: None,
            seq: 0,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(|conn| conn.is_connected())
    }

    /// Id the next call will carry.
    pub fn next_call_id(&self) -> u64 {
        self.seq
    }

    /// Dials the server unless already connected.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }

        let host = self.config.host.clone();
        let port = self.config.port;
        let dial = Conn::dial(&host, port, self.env.clone());
        let result = match self.config.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, dial).await.map_err(|_| {
                self.env.log(format_args!(
                    "protorpc.Client.connect: dial {host}:{port} timed out"
                ));
                ClientError::Timeout
            })?,
            None => dial.await,
        };

        let conn = result.map_err(|source| ClientError::Dial {
            host: host.clone(),
            port,
            source,
        })?;
        tracing::debug!("Connected to {}:{}", host, port);
        self.conn = Some(conn);
        Ok(())
    }

    /// Closes the connection. The next call dials again.
    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
    }

    /// Calls `method` (e.g. `ArithService.add`) and waits for its response.
    ///
    /// A non-empty error in the response header is returned as
    /// [`ClientError::Server`] carrying the remote text.
    pub async fn call<Req, Resp>(&mut self, method: &str, request: &Req) -> Result<Resp, ClientError>
    where
        Req: Message,
        Resp: Message,
    {
        if method.is_empty() {
            return Err(ClientError::InvalidMethod(method.to_string()));
        }
        self.call_checked(method, request).await
    }

    /// Calls the method `descriptor` describes, after checking that `Req`
    /// and `Resp` are its input and output types.
    pub async fn call_method<Req, Resp>(
        &mut self,
        descriptor: &MethodDescriptor,
        request: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Message,
        Resp: Message,
    {
        if !descriptor.accepts::<Req, Resp>() {
            return Err(ClientError::TypeMismatch {
                method: descriptor.canonical_name(),
                expected: format!("{} -> {}", descriptor.input_type(), descriptor.output_type()),
                actual: format!("{} -> {}", Req::type_name(), Resp::type_name()),
            });
        }
        self.call_checked(&descriptor.canonical_name(), request).await
    }

    async fn call_checked<Req, Resp>(
        &mut self,
        method: &str,
        request: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Message,
        Resp: Message,
    {
        self.connect().await?;

        let id = self.seq;
        self.seq = self.seq.wrapping_add(1);

        let result = self.exchange(id, method, request).await;
        if let Err(ref e) = result {
            if e.is_stream_fatal() {
                self.env
                    .log(format_args!("protorpc.Client.call: {method} (id={id}): {e}"));
                self.close().await;
            }
        }
        result
    }

    async fn exchange<Req, Resp>(
        &mut self,
        id: u64,
        method: &str,
        request: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Message,
        Resp: Message,
    {
        let conn = self
            .conn
            .as_mut()
            .ok_or(ClientError::Protocol(protorpc_protocol::ProtocolError::NotConnected))?;

        tracing::debug!("Request: {} (id={})", method, id);
        wire::send_request(conn, id, method, Some(request)).await?;
        let header = wire::recv_response_header(conn).await?;
        let response: Resp = wire::recv_response_body(conn, &header).await?;

        if header.id != id {
            return Err(ClientError::UnexpectedCallId {
                sent: id,
                received: header.id,
            });
        }
        if !header.error.is_empty() {
            return Err(ClientError::Server(header.error));
        }
        Ok(response)
    }
}
