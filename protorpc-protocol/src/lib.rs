//! # protorpc-protocol
//!
//! Wire protocol for protorpc.
//!
//! This crate provides:
//! - Varint-prefixed framing over TCP (or any async stream)
//! - Request/response headers in protobuf wire format
//! - Snappy body compression with CRC32C validation
//! - The `Message` and `Service` traits and method-name normalization
//! - `Env`, the scheduling and logging handle shared by servers and clients

pub mod compress;
pub mod conn;
pub mod env;
pub mod error;
pub mod header;
pub mod message;
pub mod service;
pub mod varint;
pub mod wire;

pub use conn::{Conn, Listener};
pub use env::Env;
pub use error::ProtocolError;
pub use header::{RequestHeader, ResponseHeader, MAX_HEADER_LEN};
pub use message::Message;
pub use service::{camel_case, invoke, MethodDescriptor, Reply, Service, ServiceError};

/// Default port for protorpc servers.
pub const DEFAULT_PORT: u16 = 1234;

/// Maximum frame payload, and maximum decompressed body size (16 MiB).
pub const MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;
