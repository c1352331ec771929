//! # lspbridge-core
//!
//! Shared vocabulary for the LSP WebSocket bridge:
//!
//! - **Message**: an opaque JSON object or array relayed unchanged in meaning
//! - **Codec**: [`LspCodec`], the `Content-Length` framing used on the child
//!   process's stdio, as a `tokio_util` decoder/encoder pair
//! - **IDs**: [`ConnectionId`] for WebSocket clients
//! - **Errors**: [`FramingError`] (stream-fatal) and [`MessageError`]
//!   (per-message, non-fatal)
//! - **Logging**: stderr `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod codec;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod message;

pub use codec::LspCodec;
pub use errors::{FramingError, MessageError};
pub use ids::ConnectionId;
pub use message::Message;
