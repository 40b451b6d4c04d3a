//! # Server collaborator
//!
//! The remote scene server is reached through the [`SceneServer`] trait. The
//! engine only relies on its request/response contract: scene documents go
//! up and down as opaque bytes, and a sync exchange trades this session's
//! presence for everyone else's.
//!
//! ## Implementations
//!
//! - [`WebSocketSceneServer`] - JSON requests over a [`Transport`]
//! - [`LoopbackServer`] - in-process server holding scenes, presence and
//!   message routing, used for tests and demos

pub mod loopback;
pub mod protocol;
pub mod transport;
pub mod websocket;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vista_core::{NodeId, SceneResult, SessionId, Timestamp, UserId};

use crate::presence::{Avatar, CameraPosition, Message, UserState};

pub use loopback::LoopbackServer;
pub use transport::{MemoryTransport, Transport, TransportError, TransportStats, WebSocketTransport};
pub use websocket::WebSocketSceneServer;

/// A scene stored on the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneSummary {
    pub scene_id: String,
    pub name: String,
    pub last_modified: Timestamp,
}

/// Result of joining a scene: its document and this client's session
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedScene {
    pub scene_id: String,
    pub session_id: SessionId,
    pub document: Vec<u8>,
}

/// Local state sent to the server on each tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub session_id: SessionId,
    pub force_sync: bool,
    pub camera_positions: Vec<CameraPosition>,
    pub selected_nodes: BTreeSet<NodeId>,
    pub avatar: Option<Avatar>,
    pub messages: Vec<Message>,
    /// Scene document to store, for deferred saves
    #[serde(default, with = "protocol::opt_document")]
    pub document: Option<Vec<u8>>,
}

/// Merged view returned by the server
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Every other session currently in the scene
    pub users: Vec<UserState>,
    /// Messages addressed to this session since the last tick
    pub messages: Vec<Message>,
    /// Whether `SyncRequest::document` was stored
    pub document_saved: bool,
}

/// The remote scene server
#[async_trait::async_trait]
pub trait SceneServer: Send + Sync {
    /// Authenticate and return the caller's user id
    async fn login(&self, user_name: &str, auth_token: Option<&str>) -> SceneResult<UserId>;

    /// Scenes stored in a group
    async fn list_scenes(&self, user: &UserId, group_id: &str) -> SceneResult<Vec<SceneSummary>>;

    /// Store a new scene without joining it
    async fn create_scene(
        &self,
        user: &UserId,
        group_id: &str,
        name: &str,
        document: &[u8],
    ) -> SceneResult<SceneSummary>;

    /// Fetch a scene and join its collaboration session
    async fn load_scene(&self, user: &UserId, scene_id: &str, group_id: &str)
        -> SceneResult<JoinedScene>;

    /// Replace the document of the scene a session has joined
    async fn save_scene(&self, session: &SessionId, document: &[u8]) -> SceneResult<()>;

    /// Exchange presence and messages
    async fn sync(&self, request: SyncRequest) -> SceneResult<SyncResponse>;

    /// Leave a scene session
    async fn leave(&self, session: &SessionId) -> SceneResult<()>;
}
