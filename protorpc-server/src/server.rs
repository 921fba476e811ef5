//! TCP server implementation.

use crate::config::NetworkConfig;
use crate::error::ServerError;
use crate::registry::Registry;
use crate::server_conn::ServerConn;
use protorpc_protocol::{Env, Listener, Message, MethodDescriptor, Service, DEFAULT_PORT};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Pending-connection queue length.
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            backlog: 5,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }
}

impl From<&NetworkConfig> for ServerConfig {
    fn from(network: &NetworkConfig) -> Self {
        Self::new(network.bind_addr).with_backlog(network.backlog)
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// RPC server.
///
/// Services are added through `&mut self` before the server is shared;
/// serving only needs `&self`, so the usual shape is:
///
/// ```no_run
/// # use protorpc_server::{Server, ServerConfig, services::ArithService};
/// # use protorpc_protocol::Env;
/// # use std::sync::Arc;
/// # async fn run() -> Result<(), protorpc_server::ServerError> {
/// let mut server = Server::new(ServerConfig::default(), Env::current("arith"));
/// server.add_service(ArithService)?;
/// let server = Arc::new(server);
/// server.bind_and_serve().await
/// # }
/// ```
pub struct Server {
    config: ServerConfig,
    env: Env,
    registry: Arc<Registry>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    stopping: AtomicBool,
    running: AtomicBool,
}

impl Server {
    /// Creates a server with no services.
    pub fn new(config: ServerConfig, env: Env) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            env,
            registry: Arc::new(Registry::new()),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            stopping: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Registers a service. A canonical service name can only be taken once.
    pub fn add_service<S: Service>(&mut self, service: S) -> Result<(), ServerError> {
        self.add_shared_service(Arc::new(service))
    }

    pub fn add_shared_service(&mut self, service: Arc<dyn Service>) -> Result<(), ServerError> {
        Arc::make_mut(&mut self.registry).register(service)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn find_method(&self, raw_method: &str) -> Option<&MethodDescriptor> {
        self.registry.find_method(raw_method)
    }

    pub fn find_service(&self, raw_name: &str) -> Option<&Arc<dyn Service>> {
        self.registry.find_service(raw_name)
    }

    /// Calls a registered method in-process, without touching the network.
    pub fn call_method<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, ServerError>
    where
        Req: Message,
        Resp: Message,
    {
        let (desc, service) = self
            .registry
            .resolve(method)
            .ok_or_else(|| ServerError::MethodNotFound(method.to_string()))?;
        if !desc.accepts::<Req, Resp>() {
            return Err(ServerError::TypeMismatch {
                method: desc.canonical_name(),
                expected: format!("{} -> {}", desc.input_type(), desc.output_type()),
                actual: format!("{} -> {}", Req::type_name(), Resp::type_name()),
            });
        }

        let reply = service.call_method(desc, &request.encode()?)?;
        if !reply.is_ok() {
            return Err(ServerError::Service(reply.error));
        }
        Ok(Resp::decode(reply.body.as_deref().unwrap_or(&[]))?)
    }

    /// Binds the configured address.
    pub fn bind(&self) -> Result<Listener, ServerError> {
        Ok(Listener::bind(
            self.config.bind_addr,
            self.config.backlog,
            self.env.clone(),
        )?)
    }

    /// Accepts connections on `listener` until [`Server::shutdown`] is
    /// called. Each connection is served on its own task.
    pub async fn serve(&self, listener: Listener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            "Server listening on {} ({} services)",
            listener.local_addr()?,
            self.registry.service_count()
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok(conn) => {
                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let server_conn = ServerConn::new(
                                conn,
                                Arc::clone(&self.registry),
                                Arc::clone(&self.stats),
                            );
                            let stats = Arc::clone(&self.stats);
                            let conn_shutdown = self.shutdown.subscribe();

                            self.env.spawn(async move {
                                if let Err(e) = server_conn.serve(conn_shutdown).await {
                                    tracing::debug!("Connection error: {}", e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }
                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn bind_and_serve(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Stops the accept loop and every open connection.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn env(&self) -> &Env {
        &self.env
    }
}
