//! # lspbridge-server
//!
//! Relays a single stdio language server to any number of WebSocket clients.
//!
//! - [`bridge::Bridge`] owns the child process, writes client messages to its
//!   stdin, and broadcasts everything it prints on stdout.
//! - [`websocket`] tracks connected clients and runs one session per socket.
//! - [`server::BridgeServer`] is the axum front end (`/`, `/ws`, `/health`,
//!   `/metrics`).

#![deny(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use bridge::{Bridge, BridgeConfig, BridgeState};
pub use config::{ServerConfig, SessionConfig};
pub use errors::{BridgeError, ClientSendError};
pub use server::BridgeServer;
pub use shutdown::{ShutdownCoordinator, wait_for_signal};
