//! Test doubles for the WhatsApp seam.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use {
    async_trait::async_trait,
    pairline_config::PairlineConfig,
    pairline_whatsapp::{
        ChatAddress, LinkOutcome, LinkRequest, WhatsAppClient, WhatsAppConnector, WhatsAppError,
    },
};

use crate::state::GatewayState;

/// Client whose Nth send (1-based) fails for the listed N.
pub struct FlakyClient {
    fail_on: Vec<usize>,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<String>>,
}

impl FlakyClient {
    pub fn failing_on(fail_on: &[usize]) -> Self {
        Self {
            fail_on: fail_on.to_vec(),
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl WhatsAppClient for FlakyClient {
    async fn send_text(&self, _to: &ChatAddress, text: &str) -> Result<String, WhatsAppError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&attempt) {
            return Err(WhatsAppError::Send(format!("attempt {attempt} rejected")));
        }
        self.delivered.lock().unwrap().push(text.to_string());
        Ok(format!("MSG{attempt}"))
    }

    fn is_paired(&self) -> bool {
        true
    }

    async fn disconnect(&self) {}
}

/// Connector whose every link attempt fails.
pub enum FailingConnector {
    Unreachable,
    /// No pairing code within the request's timeout.
    TimedOut,
}

#[async_trait]
impl WhatsAppConnector for FailingConnector {
    async fn link(&self, request: LinkRequest) -> Result<LinkOutcome, WhatsAppError> {
        Err(match self {
            Self::Unreachable => WhatsAppError::Connect("network unreachable".into()),
            Self::TimedOut => WhatsAppError::PairingTimeout(request.timeout.as_secs()),
        })
    }
}

/// Gateway state rooted in a temp dir, with the given connector.
pub fn test_state(
    dir: &tempfile::TempDir,
    connector: Arc<dyn WhatsAppConnector>,
) -> Arc<GatewayState> {
    let mut config = PairlineConfig::default();
    config.storage.sessions_dir = dir.path().join("temp");
    config.storage.uploads_dir = dir.path().join("uploads");
    GatewayState::new(config, connector)
}
