//! # eventvault
//!
//! `eventvault` is an append-only, per-stream event store with optimistic
//! concurrency control, served over gRPC and backed by a pluggable
//! transactional key-value store.
//!
//! ## Modules
//!
//! - `config`: Environment-driven configuration.
//! - `domain`: Streams, events, commands and the event store service.
//! - `grpc`: gRPC transport adapter.
//! - `storage`: Key-value backends implementing the domain's store port.

pub mod config;
pub mod domain;
pub mod grpc;
pub mod storage;

pub mod api {
    tonic::include_proto!("eventvault");
}
