//! `whatsapp-rust` backed connector.
//!
//! Each session gets its own SQLite credential store under the session
//! workspace. Linking builds a bot with the pair-code flow enabled, runs it in
//! the background, and waits for the first decisive event: a pairing code for
//! a fresh device, or `Connected` for a store that is already registered.

use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{debug, info, warn},
    wacore::types::events::Event,
    wacore_binary::jid::Jid,
    whatsapp_rust::{bot::Bot, client::Client, pair_code::PairCodeOptions},
    whatsapp_rust_sqlite_storage::SqliteStore,
    whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory,
    whatsapp_rust_ureq_http_client::UreqHttpClient,
};

use crate::{
    address::ChatAddress,
    client::{LinkOutcome, LinkRequest, WhatsAppClient, WhatsAppConnector},
    error::WhatsAppError,
};

/// File name of the credential store inside a session workspace.
pub const STORE_FILE: &str = "whatsapp.db";

enum LinkEvent {
    Code(String),
    Connected,
    LoggedOut,
}

/// Connector that links real devices over the WhatsApp Web protocol.
pub struct LiveConnector {
    device_name: String,
}

impl LiveConnector {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }
}

async fn open_store(store_dir: &Path) -> Result<Arc<SqliteStore>, WhatsAppError> {
    tokio::fs::create_dir_all(store_dir)
        .await
        .map_err(|e| WhatsAppError::Store(format!("{}: {e}", store_dir.display())))?;
    let db_path = store_dir.join(STORE_FILE);
    let store = SqliteStore::new(&db_path.to_string_lossy())
        .await
        .map_err(|e| WhatsAppError::Store(format!("{}: {e}", db_path.display())))?;
    Ok(Arc::new(store))
}

#[async_trait]
impl WhatsAppConnector for LiveConnector {
    async fn link(&self, request: LinkRequest) -> Result<LinkOutcome, WhatsAppError> {
        let backend = open_store(&request.store_dir).await?;

        // Only the first event matters to the caller; later ones are dropped
        // once the receiver goes away.
        let (event_tx, mut event_rx) = mpsc::channel::<LinkEvent>(4);
        let paired = Arc::new(AtomicBool::new(false));
        let paired_for_events = Arc::clone(&paired);
        let store_label = request.store_dir.display().to_string();

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .with_pair_code(PairCodeOptions {
                phone_number: request.phone.clone(),
                ..Default::default()
            })
            .on_event(move |event, _client| {
                let tx = event_tx.clone();
                let paired = Arc::clone(&paired_for_events);
                let store = store_label.clone();
                async move {
                    let link_event = match event {
                        Event::PairingCode { code, .. } => {
                            info!(store = %store, "pairing code issued");
                            LinkEvent::Code(code)
                        },
                        Event::PairSuccess(_) => {
                            info!(store = %store, "device paired");
                            paired.store(true, Ordering::Relaxed);
                            return;
                        },
                        Event::Connected(_) => {
                            info!(store = %store, "connected");
                            paired.store(true, Ordering::Relaxed);
                            LinkEvent::Connected
                        },
                        Event::LoggedOut(_) => {
                            warn!(store = %store, "logged out");
                            paired.store(false, Ordering::Relaxed);
                            LinkEvent::LoggedOut
                        },
                        Event::Disconnected(_) => {
                            warn!(store = %store, "disconnected");
                            return;
                        },
                        _ => return,
                    };
                    let _ = tx.try_send(link_event);
                }
            })
            .build()
            .await
            .map_err(|e| WhatsAppError::Connect(format!("bot build failed: {e}")))?;

        let client = bot.client();
        let run_handle = bot
            .run()
            .await
            .map_err(|e| WhatsAppError::Connect(format!("bot run failed: {e}")))?;
        let live: Arc<LiveClient> = Arc::new(LiveClient {
            client,
            paired,
            run_handle: Mutex::new(Some(run_handle)),
        });

        match tokio::time::timeout(request.timeout, event_rx.recv()).await {
            Ok(Some(LinkEvent::Code(code))) => Ok(LinkOutcome::PairingCode {
                code,
                client: live,
            }),
            Ok(Some(LinkEvent::Connected)) => Ok(LinkOutcome::AlreadyPaired { client: live }),
            Ok(Some(LinkEvent::LoggedOut)) => {
                live.disconnect().await;
                Err(WhatsAppError::LoggedOut)
            },
            Ok(None) => {
                live.disconnect().await;
                Err(WhatsAppError::Connect("event stream closed".into()))
            },
            Err(_) => {
                live.disconnect().await;
                Err(WhatsAppError::PairingTimeout(request.timeout.as_secs()))
            },
        }
    }
}

/// A running `whatsapp-rust` client.
pub struct LiveClient {
    client: Arc<Client>,
    paired: Arc<AtomicBool>,
    run_handle: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl WhatsAppClient for LiveClient {
    async fn send_text(&self, to: &ChatAddress, text: &str) -> Result<String, WhatsAppError> {
        let jid: Jid = to
            .as_str()
            .parse()
            .map_err(|e| WhatsAppError::InvalidAddress(format!("'{to}': {e}")))?;
        let message = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };
        let message_id = self
            .client
            .send_message(jid, message)
            .await
            .map_err(|e| WhatsAppError::Send(e.to_string()))?;
        debug!(to = %to, message_id = %message_id, "message sent");
        Ok(message_id)
    }

    fn is_paired(&self) -> bool {
        self.paired.load(Ordering::Relaxed)
    }

    async fn disconnect(&self) {
        let handle = match self.run_handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            debug!("client run loop aborted");
        }
    }
}
