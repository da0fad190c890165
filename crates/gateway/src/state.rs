use std::{sync::Arc, time::Duration};

use {
    pairline_config::PairlineConfig, pairline_sessions::SessionRegistry,
    pairline_whatsapp::WhatsAppConnector,
};

use crate::{
    auth::{ResolvedAuth, resolve_auth},
    tasks::TaskRegistry,
};

/// Shared gateway runtime state, wrapped in Arc for use across handlers and tasks.
pub struct GatewayState {
    /// Server version string.
    pub version: String,
    pub config: PairlineConfig,
    pub auth: ResolvedAuth,
    /// Linked devices keyed by session id.
    pub sessions: SessionRegistry,
    /// Bulk-send tasks started by this process.
    pub tasks: TaskRegistry,
    /// Links new devices (live library or dry run).
    pub connector: Arc<dyn WhatsAppConnector>,
}

impl GatewayState {
    pub fn new(config: PairlineConfig, connector: Arc<dyn WhatsAppConnector>) -> Arc<Self> {
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            auth: resolve_auth(config.server.token.clone()),
            sessions: SessionRegistry::new(config.storage.sessions_dir.clone()),
            tasks: TaskRegistry::new(),
            connector,
            config,
        })
    }

    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.config.pairing.timeout_secs)
    }
}
