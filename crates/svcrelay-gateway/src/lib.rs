//! svcrelay gateway library entry.
//!
//! This crate wires the transport, the dispatch relay, the service registry
//! and the built-in services into a gateway stack. It is consumed by the
//! binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod connection;
pub mod context;
pub mod crypto;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod router;
pub mod services;
pub mod transport;
