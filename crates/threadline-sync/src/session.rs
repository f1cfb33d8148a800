use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use threadline_types::events::Subscription;
use threadline_types::models::{Channel, Message};

use crate::backend::Backend;
use crate::error::SyncError;
use crate::ingest::Ingestor;
use crate::tree::{Applied, MessageTree};

/// Which conversation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTarget {
    Channel(Uuid),
    /// The direct-message channel with this user, created on first use.
    Direct(Uuid),
}

/// State shared between a session, its ingestor task and detached command
/// tasks.
pub(crate) struct SessionState {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) user_id: Uuid,
    pub(crate) tree: Mutex<MessageTree>,
    generation: AtomicU64,
    revision: watch::Sender<u64>,
}

impl SessionState {
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    /// Run a tree mutation issued under `generation`. Returns `None` without
    /// touching the tree when the session has moved on since.
    pub(crate) async fn apply<F>(&self, generation: u64, mutate: F) -> Option<Applied>
    where
        F: FnOnce(&mut MessageTree) -> Applied,
    {
        let mut tree = self.tree.lock().await;
        if self.generation() != generation {
            debug!(
                "Discarding result from generation {} (now {})",
                generation,
                self.generation()
            );
            return None;
        }
        let applied = mutate(&mut tree);
        drop(tree);
        if applied.changed() {
            self.bump_revision();
        }
        Some(applied)
    }
}

/// One open conversation: the message tree, the realtime subscription that
/// keeps it current, and the commands that act on it.
///
/// Opening another channel bumps the session generation; results that were
/// issued under an older generation are dropped instead of applied.
pub struct ChannelSession {
    pub(crate) state: Arc<SessionState>,
    ingestor: Option<JoinHandle<()>>,
}

impl ChannelSession {
    pub fn new(backend: Arc<dyn Backend>, user_id: Uuid) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(SessionState {
                backend,
                user_id,
                tree: Mutex::new(MessageTree::new()),
                generation: AtomicU64::new(0),
                revision,
            }),
            ingestor: None,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.state.user_id
    }

    pub fn generation(&self) -> u64 {
        self.state.generation()
    }

    /// Switch to `target`: drop the previous subscription, resolve the
    /// channel, subscribe, load, then start applying realtime changes.
    ///
    /// The subscription is opened before the load so that nothing committed
    /// in between is missed; replaying those changes over the loaded tree is
    /// idempotent.
    pub async fn open(&mut self, target: ChannelTarget) -> Result<Channel, SyncError> {
        let generation = self.state.advance_generation();
        self.stop_ingestor();
        self.state.tree.lock().await.clear();
        self.state.bump_revision();

        let backend = self.state.backend.clone();
        let channel = match target {
            ChannelTarget::Channel(id) => backend.channel(id).await?,
            ChannelTarget::Direct(peer) => backend.direct_channel(peer).await?,
        };

        let events = backend
            .subscribe(vec![
                Subscription::messages_in(channel.id),
                Subscription::reactions(),
            ])
            .await?;
        let records = backend.load_channel(channel.id).await?;

        let channel_id = channel.id;
        let loaded = self
            .state
            .apply(generation, move |tree| {
                tree.load(channel_id, records);
                Applied::Inserted
            })
            .await;
        if loaded.is_none() {
            return Err(SyncError::Superseded);
        }

        let ingestor = Ingestor::new(self.state.clone(), generation);
        self.ingestor = Some(ingestor.spawn(events));
        info!("Opened channel {} ({})", channel.name, channel.id);
        Ok(channel)
    }

    /// Stop following the current channel and empty the tree.
    pub async fn close(&mut self) {
        self.state.advance_generation();
        self.stop_ingestor();
        self.state.tree.lock().await.clear();
        self.state.bump_revision();
    }

    pub async fn channel_id(&self) -> Option<Uuid> {
        self.state.tree.lock().await.channel_id()
    }

    /// Nested, render-ready view of the open channel.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.state.tree.lock().await.snapshot()
    }

    /// Ticks every time the tree changes.
    pub fn revisions(&self) -> watch::Receiver<u64> {
        self.state.revision.subscribe()
    }

    fn stop_ingestor(&mut self) {
        if let Some(handle) = self.ingestor.take() {
            handle.abort();
        }
    }
}

impl Drop for ChannelSession {
    fn drop(&mut self) {
        self.stop_ingestor();
    }
}
