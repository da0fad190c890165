use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{address::ChatAddress, error::WhatsAppError};

/// A linked device able to send messages.
#[async_trait]
pub trait WhatsAppClient: Send + Sync {
    /// Send a plain text message. Returns the message id assigned by the library.
    async fn send_text(&self, to: &ChatAddress, text: &str) -> Result<String, WhatsAppError>;

    /// Whether the credential store holds a registered device.
    fn is_paired(&self) -> bool;

    /// Stop the background connection. Idempotent.
    async fn disconnect(&self);
}

/// Parameters for linking a device bound to one credential store.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    /// Directory holding the session's credential store.
    pub store_dir: PathBuf,
    /// Digits-only phone number the pairing code is issued for.
    pub phone: String,
    /// How long to wait for the library to report a pairing code.
    pub timeout: Duration,
}

/// What linking produced.
pub enum LinkOutcome {
    /// A fresh device: the user must enter `code` on their phone.
    PairingCode {
        code: String,
        client: Arc<dyn WhatsAppClient>,
    },
    /// The credential store was already registered; no code was issued.
    AlreadyPaired { client: Arc<dyn WhatsAppClient> },
}

impl LinkOutcome {
    pub fn client(&self) -> &Arc<dyn WhatsAppClient> {
        match self {
            Self::PairingCode { client, .. } | Self::AlreadyPaired { client } => client,
        }
    }
}

/// Creates clients bound to a credential store and drives them to a pairing outcome.
#[async_trait]
pub trait WhatsAppConnector: Send + Sync {
    async fn link(&self, request: LinkRequest) -> Result<LinkOutcome, WhatsAppError>;
}
