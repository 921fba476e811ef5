//! Per-connection call loop.

use crate::error::ServerError;
use crate::registry::Registry;
use crate::server::ServerStats;
use protorpc_protocol::{wire, Conn, ProtocolError, RequestHeader};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

/// Serves calls arriving on one accepted connection, strictly one after
/// another.
pub struct ServerConn<S = TcpStream> {
    conn: Conn<S>,
    registry: Arc<Registry>,
    stats: Arc<ServerStats>,
    peer: String,
}

impl<S> ServerConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(conn: Conn<S>, registry: Arc<Registry>, stats: Arc<ServerStats>) -> Self {
        let peer = conn
            .peer_addr()
            .map_or_else(|| "local".to_string(), |addr| addr.to_string());
        Self {
            conn,
            registry,
            stats,
            peer,
        }
    }

    /// Runs until the peer hangs up, a call fails at the protocol level, or
    /// `shutdown` fires. The connection is closed on every exit path.
    pub async fn serve(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        tracing::info!("Client connected: {}", self.peer);

        let result = loop {
            let header = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", self.peer);
                    break Ok(());
                }
                header = wire::recv_request_header(&mut self.conn) => header,
            };

            let header = match header {
                Ok(header) => header,
                Err(ProtocolError::ConnectionClosed) => {
                    tracing::debug!("[{}] Connection closed by client", self.peer);
                    break Ok(());
                }
                Err(e) => {
                    self.conn.env().log(format_args!(
                        "protorpc.ServerConn: [{}] RecvRequestHeader fail: {}",
                        self.peer, e
                    ));
                    break Err(e.into());
                }
            };

            if let Err(e) = self.process_call(header).await {
                break Err(e);
            }
        };

        self.conn.close().await;
        tracing::info!("Client disconnected: {}", self.peer);
        result
    }

    async fn process_call(&mut self, header: RequestHeader) -> Result<(), ServerError> {
        self.stats.requests_total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("[{}] Request: {} (id={})", self.peer, header.method, header.id);

        let registry = Arc::clone(&self.registry);
        let Some((method, service)) = registry.resolve(&header.method) else {
            // The body still has to come off the stream before the next header.
            self.conn.read_frame().await?;
            let text = ServerError::MethodNotFound(header.method.clone()).to_string();
            tracing::warn!("[{}] {}", self.peer, text);
            self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
            return self.respond(header.id, &text, None).await;
        };

        let request = match wire::recv_request_body_raw(&mut self.conn, &header).await {
            Ok(request) => request,
            Err(e) => {
                self.conn.env().log(format_args!(
                    "protorpc.ServerConn: [{}] RecvRequestBody fail: {}",
                    self.peer, e
                ));
                return Err(e.into());
            }
        };

        let reply = match service.call_method(method, &request) {
            Ok(reply) => reply,
            Err(e) if !e.is_stream_fatal() => {
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                return self.respond(header.id, &e.to_string(), None).await;
            }
            Err(e) => {
                self.conn.env().log(format_args!(
                    "protorpc.ServerConn: [{}] {} rejected request: {}",
                    self.peer, method, e
                ));
                return Err(e.into());
            }
        };

        if !reply.is_ok() {
            self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            "[{}] Response: {} (id={})",
            self.peer,
            if reply.is_ok() { "OK" } else { reply.error.as_str() },
            header.id
        );
        self.respond(header.id, &reply.error, reply.body.as_deref())
            .await
    }

    async fn respond(&mut self, id: u64, error: &str, body: Option<&[u8]>) -> Result<(), ServerError> {
        if let Err(e) = wire::send_response_raw(&mut self.conn, id, error, body).await {
            self.conn.env().log(format_args!(
                "protorpc.ServerConn: [{}] SendResponse fail: {}",
                self.peer, e
            ));
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ArithRequest, ArithResponse, ArithService};
    use protorpc_protocol::Env;
    use tokio::io::{duplex, DuplexStream};

    async fn spawn_conn() -> (
        Conn<DuplexStream>,
        Arc<ServerStats>,
        broadcast::Sender<()>,
        tokio::task::JoinHandle<Result<(), ServerError>>,
    ) {
        let env = Env::current("server-conn-test");
        let mut registry = Registry::new();
        registry.register(Arc::new(ArithService)).unwrap();
        let stats = Arc::new(ServerStats::default());
        let (shutdown, rx) = broadcast::channel(1);

        let (client, server) = duplex(64 * 1024);
        let conn = ServerConn::new(Conn::new(server, env.clone()), Arc::new(registry), stats.clone());
        let task = tokio::spawn(conn.serve(rx));
        (Conn::new(client, env), stats, shutdown, task)
    }

    async fn call(
        client: &mut Conn<DuplexStream>,
        id: u64,
        method: &str,
        req: &ArithRequest,
    ) -> (String, ArithResponse) {
        wire::send_request(client, id, method, Some(req)).await.unwrap();
        let header = wire::recv_response_header(client).await.unwrap();
        assert_eq!(header.id, id);
        let resp = wire::recv_response_body(client, &header).await.unwrap();
        (header.error, resp)
    }

    #[tokio::test]
    async fn test_calls_on_one_connection() {
        let (mut client, stats, _shutdown, task) = spawn_conn().await;

        let (err, resp) = call(&mut client, 0, "ArithService.add", &ArithRequest { a: 1, b: 2 }).await;
        assert!(err.is_empty());
        assert_eq!(resp.c, 3);

        let (err, resp) = call(&mut client, 1, "ArithService.Div", &ArithRequest { a: 1, b: 0 }).await;
        assert_eq!(err, "divide by zero");
        assert_eq!(resp, ArithResponse::default());

        let (err, _) = call(&mut client, 2, "ArithService.sqrt", &ArithRequest { a: 4, b: 0 }).await;
        assert_eq!(err, "can't find service method: ArithService.sqrt");

        let (err, resp) = call(&mut client, 3, "arith_service.mul", &ArithRequest { a: 3, b: 4 }).await;
        assert!(err.is_empty());
        assert_eq!(resp.c, 12);

        client.close().await;
        task.await.unwrap().unwrap();
        assert_eq!(stats.requests_total.load(Ordering::Relaxed), 4);
        assert_eq!(stats.errors_total.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_error_replies_carry_snappy_body() {
        let (mut client, _stats, _shutdown, task) = spawn_conn().await;

        for (id, method) in [(0, "ArithService.Sqrt"), (1, "ArithService.Error")] {
            wire::send_request(&mut client, id, method, Some(&ArithRequest::default()))
                .await
                .unwrap();
            let header = wire::recv_response_header(&mut client).await.unwrap();
            assert!(!header.error.is_empty());
            assert_eq!(header.raw_length, 0);
            assert_eq!(header.compressed_length, 1);
            assert_eq!(header.checksum, protorpc_protocol::compress::checksum(&[0]));
            assert_eq!(client.read_frame().await.unwrap(), vec![0u8]);
        }

        client.close().await;
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_body_ends_loop() {
        let (mut client, _stats, _shutdown, task) = spawn_conn().await;
        let header = RequestHeader {
            id: 0,
            method: "ArithService.Add".to_string(),
            raw_length: 2,
            compressed_length: 4,
            checksum: 0x1234,
        };
        client.write_frame(Some(&header.encode()[..])).await.unwrap();
        client.write_frame(Some(&b"junk"[..])).await.unwrap();

        let result = task.await.unwrap();
        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::CrcMismatch { .. }))
        ));
        // Server side closed: nothing more arrives.
        assert!(matches!(
            client.read_varint().await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_undecodable_request_ends_loop() {
        let (mut client, _stats, _shutdown, task) = spawn_conn().await;
        wire::send_request_raw(&mut client, 0, "ArithService.Add", Some(&b"{oops"[..]))
            .await
            .unwrap();
        assert!(matches!(
            task.await.unwrap(),
            Err(ServerError::Protocol(ProtocolError::Json(_)))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_connection() {
        let (_client, _stats, shutdown, task) = spawn_conn().await;
        tokio::task::yield_now().await;
        shutdown.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
