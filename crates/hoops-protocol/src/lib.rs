//! hoops protocol - Wire conventions for the refresh relay
//!
//! The relay speaks plain WebSocket text frames. This crate holds the pieces
//! both sides need to agree on:
//! - `frame` - canonicalization of inbound frames (the message framer)
//! - `message` - greeting format and well-known defaults
//! - `handshake` - parsing of the upgrade request URI

pub mod frame;
pub mod handshake;
pub mod message;

pub use frame::{canonicalize, decode_utf8, FramingError, RawFrame};
pub use handshake::screen_id_from_query;
pub use message::{
    greeting, parse_greeting, DEFAULT_NOTIFY_MESSAGE, DEFAULT_PORT, SCREEN_ID_PARAM,
};
