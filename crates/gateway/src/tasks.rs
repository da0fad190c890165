//! Bulk-send tasks.
//!
//! Each `/send-message` request becomes a task: a background loop that sends
//! the message lines one by one with a fixed delay in between. Tasks are
//! tracked in memory so callers can poll progress and cancel a run.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    pairline_sessions::SessionId,
    pairline_whatsapp::{ChatAddress, WhatsAppClient},
    serde::Serialize,
    tokio::{sync::RwLock, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::error::GatewayError;

/// Finished tasks beyond this count are evicted, oldest first.
const MAX_TASKS: usize = 256;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Running,
    Completed,
    Cancelled,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Completed,
            2 => Self::Cancelled,
            _ => Self::Running,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Completed => 1,
            Self::Cancelled => 2,
        }
    }
}

/// Everything a bulk send needs once the request has been validated.
#[derive(Debug, Clone)]
pub struct BulkSendJob {
    pub session_id: SessionId,
    pub address: ChatAddress,
    pub messages: Vec<String>,
    pub delay: Duration,
    /// Uploaded file backing this job; removed when the task ends.
    pub upload_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct TaskProgress {
    state: AtomicU8,
    sent: AtomicUsize,
    failed: AtomicUsize,
    /// 0 while running.
    finished_at_ms: AtomicU64,
    /// Fires once the loop has exited and cleaned up.
    exited: CancellationToken,
}

impl TaskProgress {
    fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn finish(&self, state: TaskState) {
        self.finished_at_ms.store(now_ms(), Ordering::Relaxed);
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// Point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub session_id: SessionId,
    pub target: String,
    pub state: TaskState,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub delay_ms: u64,
    pub created_at_ms: u64,
    pub finished_at_ms: Option<u64>,
}

struct TaskEntry {
    id: String,
    session_id: SessionId,
    target: String,
    total: usize,
    delay_ms: u64,
    created_at_ms: u64,
    progress: Arc<TaskProgress>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TaskEntry {
    fn snapshot(&self) -> TaskSnapshot {
        let finished_at = self.progress.finished_at_ms.load(Ordering::Relaxed);
        TaskSnapshot {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            target: self.target.clone(),
            state: self.progress.state(),
            total: self.total,
            sent: self.progress.sent.load(Ordering::Relaxed),
            failed: self.progress.failed.load(Ordering::Relaxed),
            delay_ms: self.delay_ms,
            created_at_ms: self.created_at_ms,
            finished_at_ms: (finished_at != 0).then_some(finished_at),
        }
    }
}

/// Registry of bulk-send tasks started by this process.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<String, TaskEntry>>,
    /// Parent of every task's cancellation token.
    root: CancellationToken,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            root: CancellationToken::new(),
        }
    }

    /// Spawn the send loop for `job` and register it.
    pub async fn start(&self, job: BulkSendJob, client: Arc<dyn WhatsAppClient>) -> TaskSnapshot {
        let id = format!("task_{}", uuid::Uuid::new_v4().simple());
        let progress = Arc::new(TaskProgress::default());
        let cancel = self.root.child_token();

        let mut entry = TaskEntry {
            id: id.clone(),
            session_id: job.session_id.clone(),
            target: job.address.to_string(),
            total: job.messages.len(),
            delay_ms: job.delay.as_millis() as u64,
            created_at_ms: now_ms(),
            progress: Arc::clone(&progress),
            cancel: cancel.clone(),
            handle: None,
        };
        let snapshot = entry.snapshot();

        entry.handle = Some(tokio::spawn(run_bulk_send(
            id.clone(),
            job,
            client,
            progress,
            cancel,
        )));

        let mut tasks = self.tasks.write().await;
        evict_finished(&mut tasks);
        tasks.insert(id, entry);
        snapshot
    }

    pub async fn get(&self, id: &str) -> Option<TaskSnapshot> {
        self.tasks.read().await.get(id).map(TaskEntry::snapshot)
    }

    /// All tasks, newest first.
    pub async fn list(&self) -> Vec<TaskSnapshot> {
        let mut list: Vec<_> = self
            .tasks
            .read()
            .await
            .values()
            .map(TaskEntry::snapshot)
            .collect();
        list.sort_by(|a, b| {
            b.created_at_ms
                .cmp(&a.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    pub async fn running_count(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|t| t.progress.state() == TaskState::Running)
            .count()
    }

    /// Cancel a running task and wait for its loop to stop.
    ///
    /// The loop stops at its next send or sleep boundary, so the returned
    /// snapshot is final: `cancelled`, or `completed` when the last send was
    /// already in flight.
    pub async fn cancel(&self, id: &str) -> Result<TaskSnapshot, GatewayError> {
        let progress = {
            let tasks = self.tasks.read().await;
            let entry = tasks.get(id).ok_or(GatewayError::UnknownTask)?;
            if entry.progress.state() != TaskState::Running {
                return Err(GatewayError::TaskFinished);
            }
            entry.cancel.cancel();
            Arc::clone(&entry.progress)
        };
        info!(task = %id, "cancellation requested");

        progress.exited.cancelled().await;
        self.get(id).await.ok_or(GatewayError::UnknownTask)
    }

    /// Wait for a task's loop to exit. Returns `None` for unknown ids.
    pub async fn wait(&self, id: &str) -> Option<TaskSnapshot> {
        let handle = self.tasks.write().await.get_mut(id)?.handle.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(task = %id, error = %e, "task panicked");
        }
        self.get(id).await
    }

    /// Cancel every running task and wait for all loops to exit.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let handles: Vec<(String, JoinHandle<()>)> = self
            .tasks
            .write()
            .await
            .values_mut()
            .filter_map(|t| t.handle.take().map(|h| (t.id.clone(), h)))
            .collect();
        for (id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(task = %id, error = %e, "task panicked");
            }
        }
    }
}

fn evict_finished(tasks: &mut HashMap<String, TaskEntry>) {
    while tasks.len() >= MAX_TASKS {
        let Some(oldest) = tasks
            .values()
            .filter(|t| t.progress.state() != TaskState::Running)
            .min_by_key(|t| t.created_at_ms)
            .map(|t| t.id.clone())
        else {
            return;
        };
        tasks.remove(&oldest);
    }
}

/// Send every line in order, sleeping `job.delay` between sends.
///
/// Send failures are logged and counted; the loop carries on with the next
/// line.
async fn run_bulk_send(
    task_id: String,
    job: BulkSendJob,
    client: Arc<dyn WhatsAppClient>,
    progress: Arc<TaskProgress>,
    cancel: CancellationToken,
) {
    info!(
        task = %task_id,
        session = %job.session_id,
        target = %job.address,
        total = job.messages.len(),
        delay_ms = job.delay.as_millis() as u64,
        "bulk send started"
    );

    let mut cancelled = false;
    for (index, text) in job.messages.iter().enumerate() {
        if index > 0 && !job.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(job.delay) => {}
            }
        }
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        match client.send_text(&job.address, text).await {
            Ok(message_id) => {
                progress.sent.fetch_add(1, Ordering::Relaxed);
                debug!(task = %task_id, line = index + 1, message_id = %message_id, "message sent");
            },
            Err(e) => {
                progress.failed.fetch_add(1, Ordering::Relaxed);
                warn!(task = %task_id, line = index + 1, error = %e, "message send failed");
            },
        }
    }

    let state = if cancelled {
        TaskState::Cancelled
    } else {
        TaskState::Completed
    };
    progress.finish(state);

    if let Some(path) = &job.upload_path
        && let Err(e) = tokio::fs::remove_file(path).await
    {
        debug!(task = %task_id, path = %path.display(), error = %e, "could not remove upload");
    }

    info!(
        task = %task_id,
        state = ?state,
        sent = progress.sent.load(Ordering::Relaxed),
        failed = progress.failed.load(Ordering::Relaxed),
        "bulk send finished"
    );
    progress.exited.cancel();
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::FlakyClient,
        pairline_whatsapp::{TargetKind, dry_run::DryRunClient},
    };

    fn job(messages: &[&str], delay: Duration) -> BulkSendJob {
        BulkSendJob {
            session_id: SessionId::from_millis(1),
            address: ChatAddress::resolve("15550102030", TargetKind::Number),
            messages: messages.iter().map(|m| m.to_string()).collect(),
            delay,
            upload_path: None,
        }
    }

    async fn wait_until(registry: &TaskRegistry, id: &str, f: impl Fn(&TaskSnapshot) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if registry.get(id).await.is_some_and(|s| f(&s)) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn sends_every_line_in_order() {
        let registry = TaskRegistry::new();
        let client = Arc::new(DryRunClient::new(true));
        let started = registry
            .start(job(&["one", "two", "three"], Duration::ZERO), client.clone())
            .await;
        assert_eq!(started.total, 3);

        let done = registry.wait(&started.id).await.unwrap();
        assert_eq!(done.state, TaskState::Completed);
        assert_eq!(done.sent, 3);
        assert!(done.finished_at_ms.is_some());

        let texts: Vec<_> = client.sent().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn failures_are_counted_and_skipped() {
        let registry = TaskRegistry::new();
        let client = Arc::new(FlakyClient::failing_on(&[2]));
        let started = registry
            .start(job(&["a", "b", "c"], Duration::ZERO), client.clone())
            .await;

        let done = registry.wait(&started.id).await.unwrap();
        assert_eq!(done.state, TaskState::Completed);
        assert_eq!((done.sent, done.failed), (2, 1));
        assert_eq!(client.delivered(), ["a", "c"]);
    }

    #[tokio::test]
    async fn cancel_stops_during_delay() {
        let registry = TaskRegistry::new();
        let client = Arc::new(DryRunClient::new(true));
        let started = registry
            .start(job(&["a", "b", "c"], Duration::from_secs(60)), client.clone())
            .await;

        wait_until(&registry, &started.id, |s| s.sent == 1).await;
        let cancelled = registry.cancel(&started.id).await.unwrap();
        assert_eq!(cancelled.state, TaskState::Cancelled);
        assert!(cancelled.finished_at_ms.is_some());

        let done = registry.wait(&started.id).await.unwrap();
        assert_eq!(done.state, TaskState::Cancelled);
        assert_eq!(done.sent, 1);
        assert_eq!(client.sent().len(), 1);

        assert!(matches!(
            registry.cancel(&started.id).await,
            Err(GatewayError::TaskFinished)
        ));
        assert!(matches!(
            registry.cancel("task_missing").await,
            Err(GatewayError::UnknownTask)
        ));
    }

    #[tokio::test]
    async fn shutdown_cancels_running_tasks() {
        let registry = TaskRegistry::new();
        let client = Arc::new(DryRunClient::new(true));
        let started = registry
            .start(job(&["a", "b"], Duration::from_secs(60)), client)
            .await;
        wait_until(&registry, &started.id, |s| s.sent == 1).await;

        registry.shutdown().await;
        let snapshot = registry.get(&started.id).await.unwrap();
        assert_eq!(snapshot.state, TaskState::Cancelled);
        assert_eq!(registry.running_count().await, 0);
    }

    #[tokio::test]
    async fn removes_upload_when_done() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("task.txt");
        std::fs::write(&upload, "hi\n").unwrap();

        let registry = TaskRegistry::new();
        let mut job = job(&["hi"], Duration::ZERO);
        job.upload_path = Some(upload.clone());
        let started = registry
            .start(job, Arc::new(DryRunClient::new(true)))
            .await;
        registry.wait(&started.id).await.unwrap();

        assert!(!upload.exists());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let registry = TaskRegistry::new();
        let client: Arc<dyn WhatsAppClient> = Arc::new(DryRunClient::new(true));
        let first = registry.start(job(&[], Duration::ZERO), client.clone()).await;
        tokio::time::sleep(Duration::from_millis(3)).await;
        let second = registry.start(job(&[], Duration::ZERO), client).await;

        let ids: Vec<_> = registry.list().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, [second.id, first.id]);
    }
}
