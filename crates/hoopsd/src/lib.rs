//! hoops relay daemon - Connection registry and broadcast server
//!
//! This crate provides the core infrastructure for the refresh relay:
//! - `config` - Layered relay settings
//! - `registry` - Connection registry actor tracking every live client
//! - `hub` - Single-dispatcher broadcast hub
//! - `server` - WebSocket listener and per-connection lifecycle controller
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       hoopsd daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  RelayServer    │────▶│     RegistryActor           │    │
//! │  │ (TcpListener)   │     │  (connection table owner)   │    │
//! │  └────────┬────────┘     └──────────────▲──────────────┘    │
//! │           │                             │ snapshot          │
//! │           │ connections                 │                   │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐  notify  ┌─────────┴───────────────┐   │
//! │  │ConnectionHandler│─────────▶│   Hub dispatcher        │   │
//! │  │  (per client)   │◀─────────│   (one queue, FIFO)     │   │
//! │  └─────────────────┘ outbound └─────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod hub;
pub mod registry;
pub mod server;
