//! In-memory connector that never touches the network.
//!
//! Linking writes a marker file into the session workspace so a second link
//! against the same workspace reports [`LinkOutcome::AlreadyPaired`], the way
//! a registered credential store does. Sent messages are logged and kept in
//! memory.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use {
    async_trait::async_trait,
    rand::{Rng, distr::Alphanumeric},
    tracing::info,
};

use crate::{
    address::ChatAddress,
    client::{LinkOutcome, LinkRequest, WhatsAppClient, WhatsAppConnector},
    error::WhatsAppError,
};

/// Marker written into a workspace once it has been "paired".
pub const PAIRED_MARKER: &str = "dry-run.paired";

/// A message recorded by [`DryRunClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct DryRunConnector;

impl DryRunConnector {
    pub fn new() -> Self {
        Self
    }
}

/// An eight character code in the `XXXX-XXXX` shape WhatsApp shows.
fn pairing_code() -> String {
    let raw: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}-{}", &raw[..4], &raw[4..])
}

#[async_trait]
impl WhatsAppConnector for DryRunConnector {
    async fn link(&self, request: LinkRequest) -> Result<LinkOutcome, WhatsAppError> {
        tokio::fs::create_dir_all(&request.store_dir)
            .await
            .map_err(|e| WhatsAppError::Store(format!("{}: {e}", request.store_dir.display())))?;
        let marker = request.store_dir.join(PAIRED_MARKER);

        if tokio::fs::try_exists(&marker).await.unwrap_or(false) {
            info!(store = %request.store_dir.display(), "dry-run: store already paired");
            return Ok(LinkOutcome::AlreadyPaired {
                client: Arc::new(DryRunClient::new(true)),
            });
        }

        tokio::fs::write(&marker, &request.phone)
            .await
            .map_err(|e| WhatsAppError::Store(format!("{}: {e}", marker.display())))?;
        let code = pairing_code();
        info!(store = %request.store_dir.display(), code = %code, "dry-run: pairing code issued");
        Ok(LinkOutcome::PairingCode {
            code,
            client: Arc::new(DryRunClient::new(false)),
        })
    }
}

/// Client that records messages instead of sending them.
#[derive(Debug, Default)]
pub struct DryRunClient {
    paired: AtomicBool,
    connected: AtomicBool,
    sent: Mutex<Vec<SentMessage>>,
}

impl DryRunClient {
    pub fn new(paired: bool) -> Self {
        Self {
            paired: AtomicBool::new(paired),
            connected: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Messages recorded so far, in send order.
    pub fn sent(&self) -> Vec<SentMessage> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WhatsAppClient for DryRunClient {
    async fn send_text(&self, to: &ChatAddress, text: &str) -> Result<String, WhatsAppError> {
        if !self.is_connected() {
            return Err(WhatsAppError::Send("client disconnected".into()));
        }
        let mut sent = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(SentMessage {
            to: to.to_string(),
            text: text.to_string(),
        });
        let message_id = format!("DRYRUN{:04}", sent.len());
        info!(to = %to, message_id = %message_id, "dry-run: message recorded");
        Ok(message_id)
    }

    fn is_paired(&self) -> bool {
        self.paired.load(Ordering::Relaxed)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}
