//! Gateway: HTTP surface for pairing devices and bulk-sending messages.
//!
//! Lifecycle:
//! 1. Load config, pick a connector (live or dry run)
//! 2. Build shared state: session registry, task registry, auth
//! 3. Serve the router until Ctrl-C / SIGTERM
//! 4. Cancel and drain bulk-send tasks, disconnect clients

pub mod auth;
pub mod error;
pub mod pairing;
pub mod send;
pub mod server;
pub mod state;
pub mod tasks;

#[cfg(test)]
mod testing;
