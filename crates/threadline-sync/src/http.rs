use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use uuid::Uuid;

use threadline_types::api::{SendMessageRequest, ToggleReactionResponse};
use threadline_types::events::{ChangeEvent, RealtimeCommand, RealtimeFrame, Subscription};
use threadline_types::models::{Attachment, Channel, MessageRecord, RawReaction};

use crate::backend::{Backend, OutgoingFile};
use crate::error::{SyncError, ValidationError};

/// Time allowed for the realtime Identify and Subscribe round trips.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to a threadline server over its REST routes and the `/realtime`
/// websocket.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn realtime_url(&self) -> String {
        let ws_base = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/realtime", ws_base)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Connect to `/realtime` and return once the server confirms the
    /// subscription, so every change committed after this returns is
    /// delivered.
    async fn open_stream(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> Result<BoxStream<'static, ChangeEvent>, SyncError> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.realtime_url()).await?;

        let identify = serde_json::to_string(&RealtimeCommand::Identify {
            token: self.token.clone(),
        })?;
        ws.send(WsMessage::Text(identify.into())).await?;

        let early = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                if let RealtimeFrame::Ready { username, .. } = next_frame(&mut ws).await? {
                    debug!("Realtime feed ready for {}", username);
                    break;
                }
            }

            let subscribe = serde_json::to_string(&RealtimeCommand::Subscribe { subscriptions })?;
            ws.send(WsMessage::Text(subscribe.into())).await?;

            // Changes may already flow before the acknowledgement arrives
            let mut early = Vec::new();
            loop {
                match next_frame(&mut ws).await? {
                    RealtimeFrame::Subscribed { subscriptions } => {
                        debug!("Realtime subscription active ({} filters)", subscriptions);
                        return Ok::<_, SyncError>(early);
                    }
                    RealtimeFrame::Change(event) => early.push(event),
                    RealtimeFrame::Ready { .. } => {}
                }
            }
        })
        .await
        .map_err(|_| SyncError::Backend("realtime handshake timed out".to_string()))??;

        let events = ws.filter_map(|msg| async move {
            match msg {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<RealtimeFrame>(&text) {
                    Ok(RealtimeFrame::Change(event)) => Some(event),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Ignoring malformed realtime frame: {}", e);
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => {
                    warn!("Realtime connection error: {}", e);
                    None
                }
            }
        });
        Ok(stream::iter(early).chain(events).boxed())
    }

    async fn upload_file(&self, file: OutgoingFile) -> Result<Attachment, SyncError> {
        let resp = self
            .client
            .post(self.url("/attachments"))
            .bearer_auth(&self.token)
            .header("Content-Type", "application/octet-stream")
            .header("x-file-name", file.name.as_str())
            .body(file.bytes)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn post_message(
        &self,
        channel_id: Uuid,
        request: SendMessageRequest,
    ) -> Result<MessageRecord, SyncError> {
        let resp = self
            .client
            .post(self.url(&format!("/channels/{}/messages", channel_id)))
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn post_direct(&self, peer: Uuid) -> Result<Channel, SyncError> {
        let resp = self
            .client
            .post(self.url("/channels/direct"))
            .bearer_auth(&self.token)
            .json(&json!({ "peer_user_id": peer }))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<MessageRecord>, SyncError> {
        match self.get_json(&format!("/messages/{}", id)).await {
            Ok(record) => Ok(Some(record)),
            Err(SyncError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn post_reaction(&self, message_id: Uuid, emoji: String) -> Result<bool, SyncError> {
        let resp = self
            .client
            .post(self.url(&format!("/messages/{}/reactions", message_id)))
            .bearer_auth(&self.token)
            .json(&json!({ "emoji": emoji }))
            .send()
            .await?;
        let toggled: ToggleReactionResponse = check(resp).await?.json().await?;
        Ok(toggled.added)
    }

    async fn remove_message(&self, id: Uuid) -> Result<(), SyncError> {
        let resp = self
            .client
            .delete(self.url(&format!("/messages/{}", id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn post_embedding(&self, message_id: Uuid) -> Result<(), SyncError> {
        let resp = self
            .client
            .post(self.url("/embeddings"))
            .bearer_auth(&self.token)
            .json(&json!({ "messageId": message_id }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Next server frame during the handshake. Control frames are skipped; a
/// closed socket is an error.
async fn next_frame<S>(ws: &mut S) -> Result<RealtimeFrame, SyncError>
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    while let Some(msg) = ws.next().await {
        match msg? {
            WsMessage::Text(text) => return Ok(serde_json::from_str(&text)?),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    Err(SyncError::Backend("realtime connection closed during handshake".to_string()))
}

/// Map a non-success response onto the sync error taxonomy.
async fn check(resp: Response) -> Result<Response, SyncError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let reason = resp
        .json::<ErrorBody>()
        .await
        .map(|b| b.error)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => SyncError::Auth,
        StatusCode::NOT_FOUND => SyncError::NotFound,
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => {
            SyncError::Validation(ValidationError::Rejected(reason))
        }
        _ => SyncError::Backend(format!("{}: {}", status, reason)),
    })
}

impl Backend for HttpBackend {
    fn channel(&self, channel_id: Uuid) -> BoxFuture<'_, Result<Channel, SyncError>> {
        Box::pin(async move { self.get_json(&format!("/channels/{}", channel_id)).await })
    }

    fn direct_channel(&self, peer: Uuid) -> BoxFuture<'_, Result<Channel, SyncError>> {
        Box::pin(self.post_direct(peer))
    }

    fn load_channel(
        &self,
        channel_id: Uuid,
    ) -> BoxFuture<'_, Result<Vec<MessageRecord>, SyncError>> {
        Box::pin(async move {
            self.get_json(&format!("/channels/{}/messages", channel_id))
                .await
        })
    }

    fn fetch_message(&self, id: Uuid) -> BoxFuture<'_, Result<Option<MessageRecord>, SyncError>> {
        Box::pin(self.get_message(id))
    }

    fn fetch_reactions(
        &self,
        message_id: Uuid,
    ) -> BoxFuture<'_, Result<Vec<RawReaction>, SyncError>> {
        Box::pin(async move {
            self.get_json(&format!("/messages/{}/reactions", message_id))
                .await
        })
    }

    fn subscribe(
        &self,
        subscriptions: Vec<Subscription>,
    ) -> BoxFuture<'_, Result<BoxStream<'static, ChangeEvent>, SyncError>> {
        Box::pin(self.open_stream(subscriptions))
    }

    fn upload(&self, file: OutgoingFile) -> BoxFuture<'_, Result<Attachment, SyncError>> {
        Box::pin(self.upload_file(file))
    }

    fn insert_message(
        &self,
        channel_id: Uuid,
        request: SendMessageRequest,
    ) -> BoxFuture<'_, Result<MessageRecord, SyncError>> {
        Box::pin(self.post_message(channel_id, request))
    }

    fn toggle_reaction(
        &self,
        message_id: Uuid,
        emoji: String,
    ) -> BoxFuture<'_, Result<bool, SyncError>> {
        Box::pin(self.post_reaction(message_id, emoji))
    }

    fn delete_message(&self, id: Uuid) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(self.remove_message(id))
    }

    fn request_embedding(&self, message_id: Uuid) -> BoxFuture<'_, Result<(), SyncError>> {
        Box::pin(self.post_embedding(message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use tempfile::TempDir;
    use threadline_api::embedder::UnavailableEmbedder;
    use threadline_api::middleware::issue_token;
    use threadline_api::{AppState, AppStateInner};
    use threadline_db::Database;
    use threadline_db::migrations::GENERAL_CHANNEL_ID;
    use threadline_realtime::ChangeFeed;
    use threadline_storage::Storage;
    use threadline_types::events::ChangeKind;

    const SECRET: &str = "live-secret";

    /// A real server on an ephemeral port.
    async fn live_server() -> (String, AppState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            storage: Storage::new(dir.path().to_path_buf(), base_url.as_str())
                .await
                .unwrap(),
            feed: ChangeFeed::new(),
            embedder: Arc::new(UnavailableEmbedder),
            jwt_secret: SECRET.to_string(),
            max_upload_bytes: 1024 * 1024,
        });
        let app = threadline_api::router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (base_url, state, dir)
    }

    fn backend(base_url: &str, username: &str) -> HttpBackend {
        let token = issue_token(SECRET, Uuid::new_v4(), username).unwrap();
        HttpBackend::new(base_url, token)
    }

    #[test]
    fn realtime_url_swaps_scheme() {
        let backend = HttpBackend::new("https://chat.example.com/", "t");
        assert_eq!(backend.realtime_url(), "wss://chat.example.com/realtime");

        let backend = HttpBackend::new("http://localhost:3000", "t");
        assert_eq!(backend.realtime_url(), "ws://localhost:3000/realtime");
        assert_eq!(backend.url("/health"), "http://localhost:3000/health");
    }

    #[tokio::test]
    async fn changes_right_after_subscribe_are_delivered() {
        let (base_url, state, _dir) = live_server().await;
        let general: Uuid = GENERAL_CHANNEL_ID.parse().unwrap();
        let alice = backend(&base_url, "alice");
        let bob = backend(&base_url, "bob");

        let mut events = alice
            .subscribe(vec![Subscription::messages_in(general)])
            .await
            .unwrap();
        assert_eq!(state.feed.active_connections(), 1);

        let posted = bob
            .insert_message(
                general,
                SendMessageRequest {
                    content: "right after subscribe".to_string(),
                    attachments: vec![],
                    parent_message_id: None,
                },
            )
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("change was not delivered")
            .unwrap();
        match event {
            ChangeEvent::Messages { event, new, .. } => {
                assert_eq!(event, ChangeKind::Insert);
                assert_eq!(new.unwrap().id, posted.id);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[tokio::test]
    async fn secure_realtime_urls_attempt_tls() {
        // Accepts and hangs up, so the TLS handshake itself fails
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let backend = HttpBackend::new(format!("https://{addr}"), "t");
        let Err(SyncError::Backend(reason)) = backend.subscribe(vec![]).await else {
            panic!("handshake against a plain socket cannot succeed");
        };
        assert!(!reason.contains("TLS support not compiled in"), "{reason}");
    }

    #[tokio::test]
    async fn bad_token_fails_the_handshake() {
        let (base_url, _state, _dir) = live_server().await;
        let backend = HttpBackend::new(base_url, "not-a-token");

        let result = backend.subscribe(vec![Subscription::reactions()]).await;
        assert!(matches!(result, Err(SyncError::Backend(_))));
    }
}
