//! WhatsApp client seam.
//!
//! The gateway never talks to `whatsapp-rust` directly. It links devices
//! through a [`WhatsAppConnector`] and sends through the resulting
//! [`WhatsAppClient`] handles, so the HTTP layer can run against the
//! in-memory [`dry_run`] implementation as well as the live one.

pub mod address;
pub mod client;
pub mod dry_run;
pub mod error;
pub mod live;
pub mod phone;

pub use {
    address::{ChatAddress, TargetKind},
    client::{LinkOutcome, LinkRequest, WhatsAppClient, WhatsAppConnector},
    error::WhatsAppError,
    phone::sanitize_phone,
};
