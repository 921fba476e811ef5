//! # protorpc-client
//!
//! Client library for protorpc.
//!
//! This crate provides:
//! - A client that dials lazily and issues one call at a time
//! - Typed calls by method name or by `MethodDescriptor`
//! - Call-id validation of every response

pub mod client;
pub mod error;

pub use client::{Client, ClientConfig};
pub use error::ClientError;
