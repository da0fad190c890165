//! Session registry.
//!
//! A session is one linked WhatsApp device: an id, the credential store
//! directory `<sessions_dir>/<id>/`, and the live client handle. Sessions
//! live in memory for the lifetime of the process.

pub mod key;
pub mod registry;

pub use {
    key::SessionId,
    registry::{Session, SessionLookupError, SessionRegistry, SessionSummary},
};
