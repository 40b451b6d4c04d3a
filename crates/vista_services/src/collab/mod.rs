//! # Collaboration
//!
//! A [`CollaborationSession`] exists while a scene is bound to the server.
//! Each [`tick`](CollaborationSession::tick) sends this client's presence
//! and queued messages and gets back everyone else's.
//!
//! ## Merge
//!
//! Presence is last-writer-wins per session: an incoming [`UserState`]
//! replaces the stored one wholesale unless the stored one is newer. The
//! server's roster is authoritative, so sessions missing from a response
//! are dropped and reported as departed.
//!
//! ## Failure and cancellation
//!
//! The merge is applied only after the server answered. A failed, timed out
//! or dropped tick leaves presence and inboxes untouched and puts the
//! drained outbound messages back at the front of the queue.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use vista_core::{NodeId, SceneError, SceneResult, SessionId};

use crate::config::SyncConfig;
use crate::presence::{Avatar, CameraPosition, Message, UserState};
use crate::server::SyncRequest;
use crate::session::ServerSession;

/// Lifecycle of a collaboration session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollabState {
    /// Joined and idle
    Attached,
    /// A tick is waiting on the server
    Syncing,
    /// Left the scene; every operation fails
    Detached,
}

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum SyncResult {
    /// The exchange happened
    Synced {
        /// Other sessions now in the scene
        users: usize,
        /// Messages received by this tick
        received: usize,
        /// Sessions that left since the previous tick
        departed: Vec<SessionId>,
        /// The deferred document was stored
        document_saved: bool,
    },
    /// Skipped because the sync interval has not elapsed
    Deferred,
}

type Outbound = Arc<Mutex<VecDeque<Message>>>;

/// Handle for queueing messages while the session itself is borrowed
#[derive(Clone)]
pub struct MessageSender {
    outbound: Outbound,
    in_flight: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,
    capacity: usize,
}

impl MessageSender {
    /// Queue a message for the next tick
    pub fn send(
        &self,
        target: SessionId,
        message_type: &str,
        payload: impl Into<String>,
    ) -> SceneResult<()> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(SceneError::NotInitialized(
                "collaboration session is detached".to_string(),
            ));
        }
        let message = Message::new(target, message_type, payload)?;

        let mut queue = self.outbound.lock();
        if queue.len() >= self.capacity {
            return Err(SceneError::not_allowed(format!(
                "outbound queue is full ({} messages)",
                self.capacity
            )));
        }
        queue.push_back(message);
        Ok(())
    }

    /// Messages waiting for the next tick
    pub fn pending(&self) -> usize {
        self.outbound.lock().len()
    }

    /// Check if a tick is currently talking to the server
    pub fn tick_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Messages drained for one tick
///
/// Dropping it without `commit` returns them to the front of the queue.
/// Messages queued meanwhile are dropped from the back if the queue would
/// exceed its capacity.
struct Drained {
    outbound: Outbound,
    in_flight: Arc<AtomicBool>,
    capacity: usize,
    messages: Vec<Message>,
    committed: bool,
}

impl Drained {
    fn take(outbound: &Outbound, in_flight: &Arc<AtomicBool>, capacity: usize) -> Self {
        in_flight.store(true, Ordering::SeqCst);
        let messages = outbound.lock().drain(..).collect();
        Self {
            outbound: outbound.clone(),
            in_flight: in_flight.clone(),
            capacity,
            messages,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Drained {
    fn drop(&mut self) {
        if !self.committed && !self.messages.is_empty() {
            let count = self.messages.len();
            let mut queue = self.outbound.lock();
            for message in self.messages.drain(..).rev() {
                queue.push_front(message);
            }
            log::debug!("Requeued {} unsent message(s)", count);

            let overflow = queue.len().saturating_sub(self.capacity);
            if overflow > 0 {
                let keep = queue.len() - overflow;
                for message in queue.drain(keep..) {
                    log::warn!(
                        "Outbound queue full, dropped '{}' message for {}",
                        message.message_type,
                        message.target_session_id
                    );
                }
            }
        }
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Live multi-user state of one server-bound scene
pub struct CollaborationSession {
    server: ServerSession,
    session_id: SessionId,
    scene_id: String,
    config: SyncConfig,

    camera_positions: Vec<CameraPosition>,
    selected_nodes: BTreeSet<NodeId>,
    avatar: Option<Avatar>,

    users: BTreeMap<SessionId, UserState>,
    received: VecDeque<Message>,
    outbound: Outbound,
    in_flight: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,

    pending_document: Option<(Vec<u8>, u64)>,
    last_sync: Option<Instant>,
}

impl CollaborationSession {
    pub(crate) fn attach(
        server: ServerSession,
        scene_id: String,
        session_id: SessionId,
        config: SyncConfig,
    ) -> Self {
        log::info!("Attached to scene {} as session {}", scene_id, session_id);
        Self {
            server,
            session_id,
            scene_id,
            config,
            camera_positions: Vec::new(),
            selected_nodes: BTreeSet::new(),
            avatar: None,
            users: BTreeMap::new(),
            received: VecDeque::new(),
            outbound: Arc::new(Mutex::new(VecDeque::new())),
            in_flight: Arc::new(AtomicBool::new(false)),
            detached: Arc::new(AtomicBool::new(false)),
            pending_document: None,
            last_sync: None,
        }
    }

    pub fn state(&self) -> CollabState {
        if self.detached.load(Ordering::SeqCst) {
            CollabState::Detached
        } else if self.in_flight.load(Ordering::SeqCst) {
            CollabState::Syncing
        } else {
            CollabState::Attached
        }
    }

    /// Server-issued id of this client's session
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn server_session(&self) -> &ServerSession {
        &self.server
    }

    fn ensure_attached(&self) -> SceneResult<()> {
        if self.detached.load(Ordering::SeqCst) {
            Err(SceneError::NotInitialized(
                "collaboration session is detached".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Local state
    // ------------------------------------------------------------------

    pub fn set_camera_positions(&mut self, positions: Vec<CameraPosition>) -> SceneResult<()> {
        self.ensure_attached()?;
        for position in &positions {
            position.validate()?;
        }
        self.camera_positions = positions;
        Ok(())
    }

    pub fn camera_positions(&self) -> &[CameraPosition] {
        &self.camera_positions
    }

    pub fn set_selected_nodes(&mut self, nodes: impl IntoIterator<Item = NodeId>) -> SceneResult<()> {
        self.ensure_attached()?;
        self.selected_nodes = nodes.into_iter().collect();
        Ok(())
    }

    pub fn selected_nodes(&self) -> &BTreeSet<NodeId> {
        &self.selected_nodes
    }

    pub fn set_avatar(&mut self, avatar: Option<Avatar>) -> SceneResult<()> {
        self.ensure_attached()?;
        if let Some(avatar) = &avatar {
            avatar.validate()?;
        }
        self.avatar = avatar;
        Ok(())
    }

    pub fn avatar(&self) -> Option<&Avatar> {
        self.avatar.as_ref()
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Queue a message for delivery on the next tick
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for an empty message type
    /// - `NotAllowed` when the outbound queue is full
    pub fn queue_message(
        &self,
        target: SessionId,
        message_type: &str,
        payload: impl Into<String>,
    ) -> SceneResult<()> {
        self.message_sender().send(target, message_type, payload)
    }

    /// A cloneable handle that can queue messages while a tick runs
    pub fn message_sender(&self) -> MessageSender {
        MessageSender {
            outbound: self.outbound.clone(),
            in_flight: self.in_flight.clone(),
            detached: self.detached.clone(),
            capacity: self.config.max_pending_messages,
        }
    }

    pub fn pending_message_count(&self) -> usize {
        self.outbound.lock().len()
    }

    /// Messages received and not yet taken, oldest first
    pub fn received_messages(&self) -> impl Iterator<Item = &Message> + '_ {
        self.received.iter()
    }

    pub fn take_received_messages(&mut self) -> Vec<Message> {
        self.received.drain(..).collect()
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Other sessions in this scene, ordered by session id
    pub fn users(&self) -> impl Iterator<Item = &UserState> + '_ {
        self.users.values()
    }

    pub fn user(&self, session: &SessionId) -> Option<&UserState> {
        self.users.get(session)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    // ------------------------------------------------------------------
    // Exchange
    // ------------------------------------------------------------------

    /// Document to send with the next tick
    pub(crate) fn set_pending_document(&mut self, document: Vec<u8>, revision: u64) {
        self.pending_document = Some((document, revision));
    }

    /// Tree revision of the document waiting for a tick
    pub(crate) fn pending_revision(&self) -> Option<u64> {
        self.pending_document.as_ref().map(|(_, revision)| *revision)
    }

    pub fn has_pending_document(&self) -> bool {
        self.pending_document.is_some()
    }

    /// Exchange state with the server
    ///
    /// Without `force_sync` a tick that comes sooner than the configured
    /// interval after the last successful one is skipped and returns
    /// [`SyncResult::Deferred`].
    pub async fn tick(&mut self, force_sync: bool) -> SceneResult<SyncResult> {
        self.ensure_attached()?;

        if !force_sync {
            if let Some(last) = self.last_sync {
                if last.elapsed() < self.config.interval() {
                    return Ok(SyncResult::Deferred);
                }
            }
        }

        let drained = Drained::take(
            &self.outbound,
            &self.in_flight,
            self.config.max_pending_messages,
        );
        let request = SyncRequest {
            session_id: self.session_id.clone(),
            force_sync,
            camera_positions: self.camera_positions.clone(),
            selected_nodes: self.selected_nodes.clone(),
            avatar: self.avatar.clone(),
            messages: drained.messages.clone(),
            document: self.pending_document.as_ref().map(|(doc, _)| doc.clone()),
        };
        let sent = request.messages.len();

        let server = self.server.server().clone();
        let response = self.server.request("sync", server.sync(request)).await?;

        // Nothing below can fail, so the merge is all-or-nothing
        drained.commit();

        let mut incoming: BTreeMap<SessionId, UserState> = BTreeMap::new();
        for state in response.users {
            if state.scene_session_id == self.session_id {
                continue;
            }
            incoming.insert(state.scene_session_id.clone(), state);
        }

        let departed: Vec<SessionId> = self
            .users
            .keys()
            .filter(|id| !incoming.contains_key(*id))
            .cloned()
            .collect();
        for id in &departed {
            self.users.remove(id);
        }

        for (id, state) in incoming {
            match self.users.get(&id) {
                Some(current) if current.last_updated > state.last_updated => {
                    log::debug!("Ignoring stale presence for {}", id);
                }
                _ => {
                    self.users.insert(id, state);
                }
            }
        }

        let received = response.messages.len();
        self.received.extend(response.messages);

        if response.document_saved {
            self.pending_document = None;
        }
        self.last_sync = Some(Instant::now());

        log::debug!(
            "Tick for {}: sent {}, received {}, {} user(s), {} departed",
            self.session_id,
            sent,
            received,
            self.users.len(),
            departed.len()
        );

        Ok(SyncResult::Synced {
            users: self.users.len(),
            received,
            departed,
            document_saved: response.document_saved,
        })
    }

    /// Leave the scene and drop all collaboration state
    ///
    /// Local state is always torn down. A failure to notify the server is
    /// returned afterwards. Detaching twice is a no-op.
    pub async fn detach(&mut self) -> SceneResult<()> {
        if self.detached.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.users.clear();
        self.received.clear();
        self.outbound.lock().clear();
        self.pending_document = None;
        log::info!("Detached session {} from scene {}", self.session_id, self.scene_id);

        let server = self.server.server().clone();
        self.server
            .request("leave", server.leave(&self.session_id))
            .await
    }
}

impl std::fmt::Debug for CollaborationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaborationSession")
            .field("session_id", &self.session_id)
            .field("scene_id", &self.scene_id)
            .field("state", &self.state())
            .field("users", &self.users.len())
            .field("pending_messages", &self.pending_message_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::{LoopbackServer, SceneServer};
    use vista_core::ErrorKind;

    async fn joined(server: &LoopbackServer, name: &str, scene_id: &str) -> CollaborationSession {
        let config = ServerConfig {
            user_name: name.to_string(),
            ..ServerConfig::default()
        };
        let session = ServerSession::login(Arc::new(server.clone()), &config)
            .await
            .unwrap();
        let joined = server
            .load_scene(session.user_id(), scene_id, "g")
            .await
            .unwrap();
        CollaborationSession::attach(
            session,
            joined.scene_id,
            joined.session_id,
            SyncConfig {
                interval_ms: 0,
                max_pending_messages: 2,
            },
        )
    }

    async fn scene(server: &LoopbackServer) -> String {
        let owner = server.login("owner", None).await.unwrap();
        server
            .create_scene(&owner, "g", "Project", b"{}")
            .await
            .unwrap()
            .scene_id
    }

    #[tokio::test]
    async fn test_queue_capacity() {
        let server = LoopbackServer::new();
        let scene_id = scene(&server).await;
        let session = joined(&server, "alice", &scene_id).await;
        let target = SessionId::new("x");

        session.queue_message(target.clone(), "a", "1").unwrap();
        session.queue_message(target.clone(), "b", "2").unwrap();
        let err = session.queue_message(target, "c", "3").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAllowed);
    }

    #[tokio::test]
    async fn test_dropped_tick_requeues_in_order() {
        let server = LoopbackServer::new();
        let scene_id = scene(&server).await;
        let mut session = joined(&server, "alice", &scene_id).await;
        let target = SessionId::new("x");
        session.queue_message(target.clone(), "first", "").unwrap();
        session.queue_message(target, "second", "").unwrap();

        server.set_delay(Some(std::time::Duration::from_secs(5)));
        {
            let tick = session.tick(true);
            tokio::pin!(tick);
            let polled = tokio::time::timeout(std::time::Duration::from_millis(20), &mut tick).await;
            assert!(polled.is_err());
        }

        assert_eq!(session.state(), CollabState::Attached);
        let queued: Vec<_> = session
            .outbound
            .lock()
            .iter()
            .map(|m| m.message_type.clone())
            .collect();
        assert_eq!(queued, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_requeue_respects_capacity() {
        let server = LoopbackServer::new();
        let scene_id = scene(&server).await;
        let mut session = joined(&server, "alice", &scene_id).await;
        let sender = session.message_sender();
        let target = SessionId::new("x");
        session.queue_message(target.clone(), "first", "").unwrap();
        session.queue_message(target.clone(), "second", "").unwrap();

        server.set_delay(Some(std::time::Duration::from_secs(5)));
        {
            let tick = session.tick(true);
            tokio::pin!(tick);
            let polled = tokio::time::timeout(std::time::Duration::from_millis(20), &mut tick).await;
            assert!(polled.is_err());

            // The queue was drained, so there is room again while the tick waits
            sender.send(target.clone(), "third", "").unwrap();
            sender.send(target, "fourth", "").unwrap();
        }

        let queued: Vec<_> = session
            .outbound
            .lock()
            .iter()
            .map(|m| m.message_type.clone())
            .collect();
        assert_eq!(queued, vec!["first", "second"]);
        assert_eq!(session.pending_message_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_presence_is_ignored() {
        let server = LoopbackServer::new();
        let scene_id = scene(&server).await;
        let mut alice = joined(&server, "alice", &scene_id).await;
        let mut bob = joined(&server, "bob", &scene_id).await;

        bob.tick(true).await.unwrap();
        alice.tick(true).await.unwrap();
        let bob_id = bob.session_id().clone();

        let mut newer = alice.user(&bob_id).unwrap().clone();
        newer.last_updated = vista_core::Timestamp::from_secs_f64(f64::MAX);
        newer.avatar = Some(Avatar::new("kept.glb"));
        alice.users.insert(bob_id.clone(), newer);

        alice.tick(true).await.unwrap();
        assert_eq!(
            alice.user(&bob_id).unwrap().avatar.as_ref().map(|a| a.url.as_str()),
            Some("kept.glb")
        );
    }

    #[tokio::test]
    async fn test_detached_session_rejects_work() {
        let server = LoopbackServer::new();
        let scene_id = scene(&server).await;
        let mut session = joined(&server, "alice", &scene_id).await;
        let sender = session.message_sender();

        session.detach().await.unwrap();
        assert_eq!(session.state(), CollabState::Detached);
        assert_eq!(server.session_count(), 0);
        assert!(session.detach().await.is_ok());

        let err = session.tick(true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
        assert!(sender.send(SessionId::new("x"), "chat", "").is_err());
    }
}
