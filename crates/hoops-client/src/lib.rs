//! hoops client - Relay client library
//!
//! This crate provides the two roles a front end plays against the relay:
//! - `watch` - the leaderboard's subscription, reconnecting with backoff
//! - `notify` - the "data changed" trigger sent after a player edit
//!
//! Both speak plain WebSocket text frames; see `hoops-protocol` for the
//! greeting format.

pub mod client;
pub mod error;
pub mod notify;

pub use client::{resolve_url, ClientEvent, RelayClient, RelayClientConfig, ENV_URL};
pub use error::{ClientError, Result};
pub use notify::{notify, NotifyReceipt};
