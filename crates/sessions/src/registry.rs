use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use {
    pairline_whatsapp::WhatsAppClient,
    serde::Serialize,
    tokio::sync::RwLock,
    tracing::{debug, info},
};

use crate::key::SessionId;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A linked device held by the registry.
#[derive(Clone)]
pub struct Session {
    pub id: SessionId,
    pub phone: String,
    pub created_at_ms: u64,
    pub client: Arc<dyn WhatsAppClient>,
}

impl Session {
    pub fn new(id: SessionId, phone: impl Into<String>, client: Arc<dyn WhatsAppClient>) -> Self {
        Self {
            id,
            phone: phone.into(),
            created_at_ms: now_ms(),
            client,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            phone: self.phone.clone(),
            created_at_ms: self.created_at_ms,
            paired: self.client.is_paired(),
        }
    }
}

/// Serializable view of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub phone: String,
    pub created_at_ms: u64,
    pub paired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionLookupError {
    #[error("no WhatsApp session")]
    Empty,
    #[error("unknown WhatsApp session '{0}'")]
    Unknown(SessionId),
    #[error("{0} WhatsApp sessions active, none selected")]
    Ambiguous(usize),
}

/// In-memory map of session id to linked client.
pub struct SessionRegistry {
    root: PathBuf,
    sessions: RwLock<HashMap<SessionId, Session>>,
    /// Millisecond stamp of the last minted id; ids are strictly increasing.
    last_minted_ms: AtomicU64,
}

impl SessionRegistry {
    /// `root` is the directory holding one credential-store workspace per session.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sessions: RwLock::new(HashMap::new()),
            last_minted_ms: AtomicU64::new(0),
        }
    }

    /// Credential-store workspace for a session.
    pub fn workspace_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Mint a fresh time-based id, unique within this process.
    pub fn mint_id(&self) -> SessionId {
        self.mint_id_at(now_ms())
    }

    fn mint_id_at(&self, now: u64) -> SessionId {
        let next = |last: u64| now.max(last + 1);
        let prev = match self
            .last_minted_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(next(last)))
        {
            Ok(prev) | Err(prev) => prev,
        };
        SessionId::from_millis(next(prev))
    }

    /// Register a session. Returns the session it replaced, if any.
    pub async fn insert(&self, session: Session) -> Option<Session> {
        info!(session = %session.id, phone = %session.phone, "session registered");
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session)
    }

    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Pick the session a request should use.
    ///
    /// An explicit id must exist. Without one, paired sessions are the
    /// candidates (all sessions when none is paired yet), and there must be
    /// exactly one.
    pub async fn resolve(&self, id: Option<&SessionId>) -> Result<Session, SessionLookupError> {
        let sessions = self.sessions.read().await;
        if let Some(id) = id {
            return sessions
                .get(id)
                .cloned()
                .ok_or_else(|| SessionLookupError::Unknown(id.clone()));
        }
        let paired: Vec<&Session> = sessions.values().filter(|s| s.client.is_paired()).collect();
        let candidates = if paired.is_empty() {
            sessions.values().collect()
        } else {
            paired
        };
        match candidates.as_slice() {
            [] => Err(SessionLookupError::Empty),
            [only] => Ok((*only).clone()),
            several => Err(SessionLookupError::Ambiguous(several.len())),
        }
    }

    /// Remove a session and stop its client.
    pub async fn remove(&self, id: &SessionId) -> Option<Session> {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = &removed {
            session.client.disconnect().await;
            info!(session = %id, "session removed");
        }
        removed
    }

    /// Sessions ordered by creation time.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let mut list: Vec<_> = self
            .sessions
            .read()
            .await
            .values()
            .map(Session::summary)
            .collect();
        list.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Stop every client. Sessions stay registered.
    pub async fn disconnect_all(&self) {
        let sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        for session in sessions {
            session.client.disconnect().await;
            debug!(session = %session.id, "client disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, pairline_whatsapp::dry_run::DryRunClient};

    fn session(registry: &SessionRegistry, phone: &str) -> Session {
        Session::new(registry.mint_id(), phone, Arc::new(DryRunClient::new(true)))
    }

    #[test]
    fn minted_ids_are_unique_within_one_millisecond() {
        let registry = SessionRegistry::new("temp");
        let a = registry.mint_id_at(1_000);
        let b = registry.mint_id_at(1_000);
        let c = registry.mint_id_at(999);
        assert_eq!(a.as_str(), "session_1000");
        assert_eq!(b.as_str(), "session_1001");
        assert_eq!(c.as_str(), "session_1002");
    }

    #[test]
    fn workspace_dir_is_under_root() {
        let registry = SessionRegistry::new("/var/lib/pairline");
        let id = SessionId::from_millis(5);
        assert_eq!(
            registry.workspace_dir(&id),
            PathBuf::from("/var/lib/pairline/session_5")
        );
    }

    #[tokio::test]
    async fn resolve_on_empty_registry() {
        let registry = SessionRegistry::new("temp");
        assert_eq!(
            registry.resolve(None).await.err(),
            Some(SessionLookupError::Empty)
        );
    }

    #[tokio::test]
    async fn resolve_single_session_implicitly() {
        let registry = SessionRegistry::new("temp");
        let s = session(&registry, "1555");
        let id = s.id.clone();
        registry.insert(s).await;

        assert_eq!(registry.resolve(None).await.unwrap().id, id);
        assert_eq!(registry.resolve(Some(&id)).await.unwrap().phone, "1555");
    }

    #[tokio::test]
    async fn resolve_requires_explicit_id_with_several_sessions() {
        let registry = SessionRegistry::new("temp");
        let first = session(&registry, "1555");
        let second = session(&registry, "4917");
        let second_id = second.id.clone();
        registry.insert(first).await;
        registry.insert(second).await;

        assert_eq!(
            registry.resolve(None).await.err(),
            Some(SessionLookupError::Ambiguous(2))
        );
        assert_eq!(
            registry.resolve(Some(&second_id)).await.unwrap().phone,
            "4917"
        );

        let missing = SessionId::from_millis(1);
        assert_eq!(
            registry.resolve(Some(&missing)).await.err(),
            Some(SessionLookupError::Unknown(missing))
        );
    }

    #[tokio::test]
    async fn remove_disconnects_client() {
        let registry = SessionRegistry::new("temp");
        let client = Arc::new(DryRunClient::new(true));
        let id = registry.mint_id();
        registry
            .insert(Session::new(id.clone(), "1555", client.clone()))
            .await;

        assert!(registry.remove(&id).await.is_some());
        assert!(!client.is_connected());
        assert!(registry.is_empty().await);
        assert!(registry.remove(&id).await.is_none());
    }

    #[tokio::test]
    async fn list_is_ordered_and_reports_pairing() {
        let registry = SessionRegistry::new("temp");
        let unpaired = Session::new(registry.mint_id(), "1", Arc::new(DryRunClient::new(false)));
        let paired = session(&registry, "2");
        registry.insert(paired).await;
        registry.insert(unpaired).await;

        let list = registry.list().await;
        assert_eq!(registry.len().await, 2);
        let order: Vec<_> = list.iter().map(|s| (s.phone.as_str(), s.paired)).collect();
        assert_eq!(order, [("1", false), ("2", true)]);
        assert!(list[0].id < list[1].id);
    }

    #[tokio::test]
    async fn implicit_resolve_prefers_paired_sessions() {
        let registry = SessionRegistry::new("temp");
        let stale = Session::new(registry.mint_id(), "1555", Arc::new(DryRunClient::new(false)));
        let linked = session(&registry, "1555");
        let linked_id = linked.id.clone();
        registry.insert(stale).await;
        registry.insert(linked).await;

        assert_eq!(registry.resolve(None).await.unwrap().id, linked_id);
    }

    #[tokio::test]
    async fn implicit_resolve_with_only_unpaired_sessions() {
        let registry = SessionRegistry::new("temp");
        let first = Session::new(registry.mint_id(), "1555", Arc::new(DryRunClient::new(false)));
        let first_id = first.id.clone();
        registry.insert(first).await;
        assert_eq!(registry.resolve(None).await.unwrap().id, first_id);

        let second = Session::new(registry.mint_id(), "1555", Arc::new(DryRunClient::new(false)));
        registry.insert(second).await;
        assert_eq!(
            registry.resolve(None).await.err(),
            Some(SessionLookupError::Ambiguous(2))
        );
    }
}
