use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use threadline_types::api::SendMessageRequest;
use threadline_types::events::{ChangeEvent, Subscription};
use threadline_types::models::{
    Attachment, Author, Channel, ChannelKind, MessageRecord, RawReaction, channel_name_for,
};

use crate::backend::{Backend, OutgoingFile};
use crate::error::{SyncError, ValidationError};
use crate::ingest::Ingestor;
use crate::session::{ChannelSession, ChannelTarget};
use crate::tree::Applied;
use crate::MAX_ATTACHMENT_BYTES;

#[derive(Default)]
struct Store {
    channels: Vec<Channel>,
    /// Flat rows, replies included.
    messages: Vec<MessageRecord>,
    reactions: Vec<RawReaction>,
    uploads: Vec<String>,
    embedding_requests: Vec<Uuid>,
    reaction_fetches: usize,
    failing_uploads: HashSet<String>,
    embeddings_down: bool,
}

/// In-memory backend. Writes do not publish events by themselves; tests
/// push the change events they want the session to see.
#[derive(Default)]
struct FakeBackend {
    user_id: Uuid,
    store: Mutex<Store>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
    clock: Mutex<i64>,
}

impl FakeBackend {
    fn new(user_id: Uuid) -> Arc<Self> {
        Arc::new(Self {
            user_id,
            ..Default::default()
        })
    }

    fn add_channel(&self, name: &str, kind: ChannelKind) -> Channel {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let channel = Channel {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            created_at: at,
            updated_at: at,
        };
        self.store.lock().unwrap().channels.push(channel.clone());
        channel
    }

    /// Store a message row as if another client had written it.
    fn add_message(
        &self,
        channel_id: Uuid,
        author: Uuid,
        parent: Option<Uuid>,
        content: &str,
    ) -> MessageRecord {
        let at = {
            let mut clock = self.clock.lock().unwrap();
            *clock += 1;
            Utc.timestamp_opt(1_700_000_000 + *clock, 0).unwrap()
        };
        let record = MessageRecord {
            id: Uuid::new_v4(),
            channel_id,
            user_id: Some(author),
            parent_message_id: parent,
            content: content.to_string(),
            attachments: vec![],
            created_at: at,
            updated_at: at,
            user: Some(Author {
                id: author,
                username: "someone".into(),
            }),
            reactions: vec![],
            replies: vec![],
        };
        self.store.lock().unwrap().messages.push(record.clone());
        record
    }

    fn edit_message(&self, id: Uuid, content: &str) -> MessageRecord {
        let mut store = self.store.lock().unwrap();
        let record = store
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .unwrap();
        record.content = content.to_string();
        record.clone()
    }

    fn remove_message(&self, id: Uuid) {
        let mut store = self.store.lock().unwrap();
        store
            .messages
            .retain(|m| m.id != id && m.parent_message_id != Some(id));
    }

    fn add_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> RawReaction {
        let row = RawReaction {
            message_id,
            user_id,
            emoji: emoji.to_string(),
        };
        self.store.lock().unwrap().reactions.push(row.clone());
        row
    }

    fn push(&self, event: ChangeEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn with_reactions(store: &Store, mut record: MessageRecord) -> MessageRecord {
        record.reactions = store
            .reactions
            .iter()
            .filter(|r| r.message_id == record.id)
            .cloned()
            .collect();
        record
    }

    fn snapshot_store<T>(&self, f: impl FnOnce(&Store) -> T) -> T {
        f(&self.store.lock().unwrap())
    }
}

impl Backend for FakeBackend {
    fn channel(&self, channel_id: Uuid) -> BoxFuture<'_, Result<Channel, SyncError>> {
        let found = self
            .snapshot_store(|s| s.channels.iter().find(|c| c.id == channel_id).cloned());
        Box::pin(async move { found.ok_or(SyncError::NotFound) })
    }

    fn direct_channel(&self, peer: Uuid) -> BoxFuture<'_, Result<Channel, SyncError>> {
        let name = channel_name_for(self.user_id, peer);
        let existing = self.snapshot_store(|s| s.channels.iter().find(|c| c.name == name).cloned());
        let channel = match existing {
            Some(channel) => channel,
            None => self.add_channel(&name, ChannelKind::Direct),
        };
        Box::pin(async move { Ok(channel) })
    }

    fn load_channel(
        &self,
        channel_id: Uuid,
    ) -> BoxFuture<'_, Result<Vec<MessageRecord>, SyncError>> {
        let records = self.snapshot_store(|s| {
            let rows: Vec<MessageRecord> = s
                .messages
                .iter()
                .filter(|m| m.channel_id == channel_id)
                .map(|m| Self::with_reactions(s, m.clone()))
                .collect();
            let mut top: Vec<MessageRecord> =
                rows.iter().filter(|m| m.is_top_level()).cloned().collect();
            for parent in &mut top {
                parent.replies = rows
                    .iter()
                    .filter(|m| m.parent_message_id == Some(parent.id))
                    .cloned()
                    .collect();
            }
            top
        });
        Box::pin(async move { Ok(records) })
    }

    fn fetch_message(&self, id: Uuid) -> BoxFuture<'_, Result<Option<MessageRecord>, SyncError>> {
        let found = self.snapshot_store(|s| {
            s.messages
                .iter()
                .find(|m| m.id == id)
                .map(|m| Self::with_reactions(s, m.clone()))
        });
        Box::pin(async move { Ok(found) })
    }

    fn fetch_reactions(
        &self,
        message_id: Uuid,
    ) -> BoxFuture<'_, Result<Vec<RawReaction>, SyncError>> {
        let rows = {
            let mut store = self.store.lock().unwrap();
            store.reaction_fetches += 1;
            store
                .reactions
                .iter()
                .filter(|r| r.message_id == message_id)
                .cloned()
                .collect::<Vec<_>>()
        };
        Box::pin(async move { Ok(rows) })
    }

    fn subscribe(
        &self,
        _subscriptions: Vec<Subscription>,
    ) -> BoxFuture<'_, Result<BoxStream<'static, ChangeEvent>, SyncError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        let stream =
            futures_util::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|e| (e, rx)) });
        Box::pin(async move { Ok(stream.boxed()) })
    }

    fn upload(&self, file: OutgoingFile) -> BoxFuture<'_, Result<Attachment, SyncError>> {
        let result = {
            let mut store = self.store.lock().unwrap();
            if store.failing_uploads.contains(&file.name) {
                Err(SyncError::Backend("disk full".into()))
            } else {
                store.uploads.push(file.name.clone());
                let path = format!("{}/{}", self.user_id, file.name);
                Ok(Attachment {
                    url: format!("http://localhost/attachments/{path}"),
                    id: path,
                    name: file.name,
                })
            }
        };
        Box::pin(async move { result })
    }

    fn insert_message(
        &self,
        channel_id: Uuid,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, Result<MessageRecord, SyncError>> {
        let mut record = self.add_message(
            channel_id,
            self.user_id,
            request.parent_message_id,
            &request.content,
        );
        record.attachments = request.attachments;
        {
            let mut store = self.store.lock().unwrap();
            if let Some(stored) = store.messages.iter_mut().find(|m| m.id == record.id) {
                stored.attachments = record.attachments.clone();
            }
        }
        Box::pin(async move { Ok(record) })
    }

    fn toggle_reaction(
        &self,
        message_id: Uuid,
        emoji: String,
    ) -> BoxFuture<'_, Result<bool, SyncError>> {
        let added = {
            let mut store = self.store.lock().unwrap();
            let before = store.reactions.len();
            store
                .reactions
                .retain(|r| !(r.message_id == message_id && r.user_id == self.user_id && r.emoji == emoji));
            if store.reactions.len() == before {
                store.reactions.push(RawReaction {
                    message_id,
                    user_id: self.user_id,
                    emoji,
                });
                true
            } else {
                false
            }
        };
        Box::pin(async move { Ok(added) })
    }

    fn delete_message(&self, id: Uuid) -> BoxFuture<'_, Result<(), SyncError>> {
        self.remove_message(id);
        Box::pin(async { Ok(()) })
    }

    fn request_embedding(&self, message_id: Uuid) -> BoxFuture<'_, Result<(), SyncError>> {
        let result = {
            let mut store = self.store.lock().unwrap();
            store.embedding_requests.push(message_id);
            if store.embeddings_down {
                Err(SyncError::Backend("embedding provider unavailable".into()))
            } else {
                Ok(())
            }
        };
        Box::pin(async move { result })
    }
}

struct Fixture {
    me: Uuid,
    backend: Arc<FakeBackend>,
    session: ChannelSession,
    channel: Channel,
}

async fn open_general() -> Fixture {
    let me = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let channel = backend.add_channel("general", ChannelKind::Public);
    let mut session = ChannelSession::new(backend.clone(), me);
    session.open(ChannelTarget::Channel(channel.id)).await.unwrap();
    Fixture {
        me,
        backend,
        session,
        channel,
    }
}

fn ingestor(fixture: &Fixture) -> Ingestor {
    Ingestor::new(fixture.session.state.clone(), fixture.session.generation())
}

fn ids(messages: &[threadline_types::models::Message]) -> Vec<(Uuid, Vec<Uuid>)> {
    messages
        .iter()
        .map(|m| (m.id, m.replies.iter().map(|r| r.id).collect()))
        .collect()
}

async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn open_loads_the_nested_tree() {
    let me = Uuid::new_v4();
    let other = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let channel = backend.add_channel("general", ChannelKind::Public);
    let first = backend.add_message(channel.id, other, None, "first");
    let reply = backend.add_message(channel.id, me, Some(first.id), "reply");
    let second = backend.add_message(channel.id, me, None, "second");
    backend.add_reaction(first.id, me, "👍");
    backend.add_reaction(first.id, other, "👍");
    backend.add_reaction(first.id, me, "🎉");

    let mut session = ChannelSession::new(backend.clone(), me);
    let opened = session.open(ChannelTarget::Channel(channel.id)).await.unwrap();
    assert_eq!(opened.id, channel.id);
    assert_eq!(session.channel_id().await, Some(channel.id));

    let snapshot = session.snapshot().await;
    assert_eq!(ids(&snapshot), vec![(first.id, vec![reply.id]), (second.id, vec![])]);

    let reactions = &snapshot[0].reactions;
    assert_eq!(reactions.len(), 2);
    assert_eq!(reactions[0].emoji, "👍");
    assert_eq!(reactions[0].count, 2);
    assert_eq!(reactions[0].users, vec![me, other]);
    assert_eq!(reactions[1].emoji, "🎉");
    assert_eq!(reactions[1].users, vec![me]);
}

#[tokio::test]
async fn direct_target_resolves_the_shared_channel() {
    let me = Uuid::new_v4();
    let peer = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let existing = backend.add_channel(&channel_name_for(peer, me), ChannelKind::Direct);

    let mut session = ChannelSession::new(backend.clone(), me);
    let opened = session.open(ChannelTarget::Direct(peer)).await.unwrap();
    assert_eq!(opened.id, existing.id);
    assert_eq!(opened.kind, ChannelKind::Direct);
}

#[tokio::test]
async fn opening_an_unknown_channel_fails() {
    let me = Uuid::new_v4();
    let backend = FakeBackend::new(me);
    let mut session = ChannelSession::new(backend, me);
    let result = session.open(ChannelTarget::Channel(Uuid::new_v4())).await;
    assert!(matches!(result, Err(SyncError::NotFound)));
    assert!(session.snapshot().await.is_empty());
}

#[tokio::test]
async fn duplicate_events_are_idempotent() {
    let fx = open_general().await;
    let ingest = ingestor(&fx);
    let other = Uuid::new_v4();

    let top = fx.backend.add_message(fx.channel.id, other, None, "hello");
    let reply = fx.backend.add_message(fx.channel.id, other, Some(top.id), "hi back");
    let edited = fx.backend.edit_message(top.id, "hello, edited");

    let events = vec![
        ChangeEvent::message_inserted(&top),
        ChangeEvent::message_inserted(&reply),
        ChangeEvent::message_updated(&edited),
    ];
    for event in events.iter().chain(events.iter()) {
        ingest.handle_event(event.clone()).await.unwrap();
    }
    let snapshot = fx.session.snapshot().await;
    assert_eq!(ids(&snapshot), vec![(top.id, vec![reply.id])]);
    assert_eq!(snapshot[0].content, "hello, edited");

    fx.backend.remove_message(reply.id);
    let delete = ChangeEvent::message_deleted(&reply);
    assert_eq!(ingest.handle_event(delete.clone()).await.unwrap(), Applied::Removed);
    assert_eq!(ingest.handle_event(delete).await.unwrap(), Applied::Missing);
    assert_eq!(ids(&fx.session.snapshot().await), vec![(top.id, vec![])]);
}

#[tokio::test]
async fn reply_arriving_before_its_parent_is_dropped() {
    let fx = open_general().await;
    let ingest = ingestor(&fx);
    let other = Uuid::new_v4();

    let parent = fx.backend.add_message(fx.channel.id, other, None, "parent");
    let reply = fx.backend.add_message(fx.channel.id, other, Some(parent.id), "reply");

    let dropped = ingest
        .handle_event(ChangeEvent::message_inserted(&reply))
        .await
        .unwrap();
    assert_eq!(dropped, Applied::Dropped);
    assert!(fx.session.snapshot().await.is_empty());

    ingest
        .handle_event(ChangeEvent::message_inserted(&parent))
        .await
        .unwrap();
    ingest
        .handle_event(ChangeEvent::message_inserted(&reply))
        .await
        .unwrap();
    assert_eq!(
        ids(&fx.session.snapshot().await),
        vec![(parent.id, vec![reply.id])]
    );
}

#[tokio::test]
async fn deleting_a_top_level_message_removes_its_replies() {
    let fx = open_general().await;
    let top = fx.backend.add_message(fx.channel.id, fx.me, None, "top");
    let r1 = fx.backend.add_message(fx.channel.id, fx.me, Some(top.id), "r1");
    let r2 = fx.backend.add_message(fx.channel.id, fx.me, Some(top.id), "r2");
    let ingest = ingestor(&fx);
    for record in [&top, &r1, &r2] {
        ingest
            .handle_event(ChangeEvent::message_inserted(record))
            .await
            .unwrap();
    }

    fx.session.delete_message(top.id).await.unwrap();
    assert!(fx.session.snapshot().await.is_empty());
    assert!(fx.backend.snapshot_store(|s| s.messages.is_empty()));
}

#[tokio::test]
async fn deleting_someone_elses_message_is_refused_locally() {
    let fx = open_general().await;
    let theirs = fx.backend.add_message(fx.channel.id, Uuid::new_v4(), None, "theirs");
    ingestor(&fx)
        .handle_event(ChangeEvent::message_inserted(&theirs))
        .await
        .unwrap();

    let result = fx.session.delete_message(theirs.id).await;
    assert!(matches!(result, Err(SyncError::NotAuthor("delete"))));
    assert_eq!(fx.backend.snapshot_store(|s| s.messages.len()), 1);
    assert_eq!(fx.session.snapshot().await.len(), 1);
}

#[tokio::test]
async fn reactions_for_unknown_messages_are_ignored() {
    let fx = open_general().await;
    let ingest = ingestor(&fx);

    let row = fx.backend.add_reaction(Uuid::new_v4(), fx.me, "👀");
    let applied = ingest
        .handle_event(ChangeEvent::reaction_added(row))
        .await
        .unwrap();
    assert_eq!(applied, Applied::Missing);
    assert_eq!(fx.backend.snapshot_store(|s| s.reaction_fetches), 0);
}

#[tokio::test]
async fn reaction_events_recompute_the_aggregate() {
    let fx = open_general().await;
    let ingest = ingestor(&fx);
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
    let top = fx.backend.add_message(fx.channel.id, u1, None, "party");
    ingest
        .handle_event(ChangeEvent::message_inserted(&top))
        .await
        .unwrap();

    let rows = vec![
        fx.backend.add_reaction(top.id, u1, "👍"),
        fx.backend.add_reaction(top.id, u2, "👍"),
        fx.backend.add_reaction(top.id, u1, "🎉"),
    ];
    for row in rows {
        ingest
            .handle_event(ChangeEvent::reaction_added(row))
            .await
            .unwrap();
    }

    let snapshot = fx.session.snapshot().await;
    let summary: Vec<(String, usize, Vec<Uuid>)> = snapshot[0]
        .reactions
        .iter()
        .map(|r| (r.emoji.clone(), r.count, r.users.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("👍".to_string(), 2, vec![u1, u2]),
            ("🎉".to_string(), 1, vec![u1]),
        ]
    );
}

#[tokio::test]
async fn toggling_twice_restores_the_original_state() {
    let fx = open_general().await;
    let outcome = fx.session.send_message("hello", vec![], None).await.unwrap();
    let id = outcome.message.id;
    let before = fx.session.snapshot().await;

    assert!(fx.session.toggle_reaction(id, "👍").await.unwrap());
    assert_eq!(fx.session.snapshot().await[0].reactions[0].count, 1);
    assert!(!fx.session.toggle_reaction(id, "👍").await.unwrap());

    assert_eq!(fx.session.snapshot().await, before);
    assert!(fx.backend.snapshot_store(|s| s.reactions.is_empty()));
}

#[tokio::test]
async fn oversized_attachment_is_rejected_but_the_send_proceeds() {
    let fx = open_general().await;
    let files = vec![
        OutgoingFile::new("video.mp4", vec![0u8; 25 * 1024 * 1024]),
        OutgoingFile::new("notes.txt", vec![1u8; 1024 * 1024]),
    ];

    let outcome = fx
        .session
        .send_message("see attached", files, None)
        .await
        .unwrap();

    assert_eq!(outcome.message.attachments.len(), 1);
    assert_eq!(outcome.message.attachments[0].name, "notes.txt");
    assert_eq!(
        outcome.rejected,
        vec![ValidationError::FileTooLarge {
            name: "video.mp4".into(),
            size: 25 * 1024 * 1024,
            limit: MAX_ATTACHMENT_BYTES,
        }]
    );
    assert!(outcome.failed_uploads.is_empty());
    assert_eq!(fx.backend.snapshot_store(|s| s.uploads.clone()), vec!["notes.txt"]);

    let snapshot = fx.session.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].attachments.len(), 1);

    let id = outcome.message.id;
    let backend = fx.backend.clone();
    wait_until(move || backend.snapshot_store(|s| s.embedding_requests.contains(&id))).await;
}

#[tokio::test]
async fn empty_message_is_rejected_before_any_network_call() {
    let fx = open_general().await;
    let result = fx.session.send_message("   ", vec![], None).await;
    assert!(matches!(
        result,
        Err(SyncError::Validation(ValidationError::EmptyMessage))
    ));

    assert!(fx.backend.snapshot_store(|s| s.messages.is_empty() && s.uploads.is_empty()));
}

#[tokio::test]
async fn oversized_files_alone_are_reported_by_name() {
    let fx = open_general().await;
    let files = vec![
        OutgoingFile::new("huge.bin", vec![0u8; MAX_ATTACHMENT_BYTES + 1]),
        OutgoingFile::new("bigger.bin", vec![0u8; MAX_ATTACHMENT_BYTES + 2]),
    ];

    let result = fx.session.send_message("", files, None).await;
    let rejected = match result {
        Err(SyncError::Validation(ValidationError::AttachmentsRejected(rejected))) => rejected,
        other => panic!("expected the size rejections, got {other:?}"),
    };
    let names: Vec<&str> = rejected
        .iter()
        .map(|e| match e {
            ValidationError::FileTooLarge { name, .. } => name.as_str(),
            other => panic!("unexpected rejection {other:?}"),
        })
        .collect();
    assert_eq!(names, vec!["huge.bin", "bigger.bin"]);
    assert!(fx.backend.snapshot_store(|s| s.messages.is_empty() && s.uploads.is_empty()));
}

#[tokio::test]
async fn message_update_replaces_stale_reactions() {
    let fx = open_general().await;
    let ingest = ingestor(&fx);
    let other = Uuid::new_v4();
    let top = fx.backend.add_message(fx.channel.id, other, None, "vote here");
    ingest
        .handle_event(ChangeEvent::message_inserted(&top))
        .await
        .unwrap();
    let row = fx.backend.add_reaction(top.id, other, "👍");
    ingest
        .handle_event(ChangeEvent::reaction_added(row))
        .await
        .unwrap();
    assert_eq!(fx.session.snapshot().await[0].reactions.len(), 1);

    // The reaction is withdrawn but its event never arrives
    fx.backend.store.lock().unwrap().reactions.clear();
    let edited = fx.backend.edit_message(top.id, "vote here (closed)");
    let applied = ingest
        .handle_event(ChangeEvent::message_updated(&edited))
        .await
        .unwrap();
    assert_eq!(applied, Applied::Updated);

    let snapshot = fx.session.snapshot().await;
    assert_eq!(snapshot[0].content, "vote here (closed)");
    assert!(snapshot[0].reactions.is_empty());
}

#[tokio::test]
async fn failed_uploads_are_dropped_from_the_message() {
    let fx = open_general().await;
    fx.backend
        .store
        .lock()
        .unwrap()
        .failing_uploads
        .insert("broken.png".into());

    let files = vec![
        OutgoingFile::new("broken.png", vec![0u8; 10]),
        OutgoingFile::new("fine.png", vec![0u8; 10]),
    ];
    let outcome = fx.session.send_message("", files, None).await.unwrap();
    assert_eq!(outcome.failed_uploads, vec!["broken.png"]);
    assert_eq!(outcome.message.attachments.len(), 1);
    assert_eq!(outcome.message.attachments[0].name, "fine.png");
}

#[tokio::test]
async fn embedding_failure_does_not_fail_the_send() {
    let fx = open_general().await;
    fx.backend.store.lock().unwrap().embeddings_down = true;

    let outcome = fx.session.send_message("hello", vec![], None).await.unwrap();
    let id = outcome.message.id;
    let backend = fx.backend.clone();
    wait_until(move || backend.snapshot_store(|s| s.embedding_requests.contains(&id))).await;
    assert_eq!(fx.session.snapshot().await.len(), 1);
}

#[tokio::test]
async fn replies_sent_locally_nest_under_their_parent() {
    let fx = open_general().await;
    let parent = fx.session.send_message("question", vec![], None).await.unwrap();
    let reply = fx
        .session
        .send_message("answer", vec![], Some(parent.message.id))
        .await
        .unwrap();

    assert_eq!(
        ids(&fx.session.snapshot().await),
        vec![(parent.message.id, vec![reply.message.id])]
    );
}

#[tokio::test]
async fn results_from_a_previous_channel_are_discarded() {
    let mut fx = open_general().await;
    let stale = ingestor(&fx);
    let old_message = fx.backend.add_message(fx.channel.id, Uuid::new_v4(), None, "old");

    let random = fx.backend.add_channel("random", ChannelKind::Public);
    fx.session
        .open(ChannelTarget::Channel(random.id))
        .await
        .unwrap();

    let result = stale
        .handle_event(ChangeEvent::message_inserted(&old_message))
        .await;
    assert!(matches!(result, Err(SyncError::Superseded)));
    assert!(fx.session.snapshot().await.is_empty());
    assert_eq!(fx.session.channel_id().await, Some(random.id));
}

#[tokio::test]
async fn realtime_changes_reach_the_snapshot() {
    let fx = open_general().await;
    let mut revisions = fx.session.revisions();
    let seen = *revisions.borrow_and_update();

    let other = Uuid::new_v4();
    let record = fx.backend.add_message(fx.channel.id, other, None, "from elsewhere");
    fx.backend.push(ChangeEvent::message_inserted(&record));

    tokio::time::timeout(Duration::from_secs(1), revisions.changed())
        .await
        .unwrap()
        .unwrap();
    assert!(*revisions.borrow() > seen);

    let snapshot = fx.session.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].content, "from elsewhere");
}
