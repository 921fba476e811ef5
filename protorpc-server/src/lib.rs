//! # protorpc-server
//!
//! TCP server for protorpc.
//!
//! This crate provides:
//! - A registry mapping canonical `Service.Method` names to services
//! - An accept loop serving each connection on its own task
//! - The per-connection call loop (`ServerConn`)
//! - YAML and environment configuration
//! - Demo `ArithService` and `EchoService`

pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod server_conn;
pub mod services;

pub use config::{Config, ConfigError, NetworkConfig};
pub use error::ServerError;
pub use registry::Registry;
pub use server::{Server, ServerConfig, ServerStats};
pub use server_conn::ServerConn;
