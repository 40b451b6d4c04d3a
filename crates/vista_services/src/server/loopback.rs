//! In-process scene server
//!
//! Keeps scenes, the presence roster and per-session inboxes in memory.
//! Clones share the same state, so several collaborators in one process can
//! talk to "the same server".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;
use vista_core::{SceneError, SceneResult, SessionId, Timestamp, UserId};

use super::{JoinedScene, SceneServer, SceneSummary, SyncRequest, SyncResponse};
use crate::presence::{Message, UserState};

struct StoredScene {
    group_id: String,
    name: String,
    document: Vec<u8>,
    last_modified: Timestamp,
}

impl StoredScene {
    fn summary(&self, scene_id: &str) -> SceneSummary {
        SceneSummary {
            scene_id: scene_id.to_string(),
            name: self.name.clone(),
            last_modified: self.last_modified,
        }
    }
}

struct LiveSession {
    scene_id: String,
    state: UserState,
    inbox: Vec<Message>,
}

#[derive(Default)]
struct State {
    required_token: Option<String>,
    users_by_name: HashMap<String, UserId>,
    user_names: HashMap<UserId, String>,
    scenes: HashMap<String, StoredScene>,
    sessions: HashMap<SessionId, LiveSession>,
    offline: bool,
    delay: Option<Duration>,
}

impl State {
    fn user_name(&self, user: &UserId) -> SceneResult<String> {
        self.user_names
            .get(user)
            .cloned()
            .ok_or_else(|| SceneError::AuthFailure(format!("unknown user {}", user)))
    }

    fn session_mut(&mut self, session: &SessionId) -> SceneResult<&mut LiveSession> {
        self.sessions
            .get_mut(session)
            .ok_or_else(|| SceneError::OutOfSync(format!("unknown session {}", session)))
    }
}

/// In-memory [`SceneServer`]
#[derive(Clone, Default)]
pub struct LoopbackServer {
    state: Arc<Mutex<State>>,
}

impl LoopbackServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this token on login
    pub fn with_auth_token(token: impl Into<String>) -> Self {
        let server = Self::new();
        server.state.lock().required_token = Some(token.into());
        server
    }

    /// Make every request fail with `ConnectionFailure` while set
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Hold every request for `delay` before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    /// Stored document of a scene
    pub fn scene_document(&self, scene_id: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .scenes
            .get(scene_id)
            .map(|s| s.document.clone())
    }

    /// Number of joined sessions across all scenes
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    async fn gate(&self) -> SceneResult<()> {
        let delay = {
            let state = self.state.lock();
            if state.offline {
                return Err(SceneError::ConnectionFailure("server is offline".to_string()));
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SceneServer for LoopbackServer {
    async fn login(&self, user_name: &str, auth_token: Option<&str>) -> SceneResult<UserId> {
        self.gate().await?;
        if user_name.is_empty() {
            return Err(SceneError::invalid("user name must not be empty"));
        }

        let mut state = self.state.lock();
        if let Some(required) = &state.required_token {
            if auth_token != Some(required.as_str()) {
                return Err(SceneError::AuthFailure(format!(
                    "invalid credentials for {}",
                    user_name
                )));
            }
        }

        if let Some(user) = state.users_by_name.get(user_name) {
            return Ok(user.clone());
        }
        let user = UserId::new(Uuid::new_v4().to_string());
        state.users_by_name.insert(user_name.to_string(), user.clone());
        state.user_names.insert(user.clone(), user_name.to_string());
        log::debug!("Registered user {} as {}", user_name, user);
        Ok(user)
    }

    async fn list_scenes(&self, user: &UserId, group_id: &str) -> SceneResult<Vec<SceneSummary>> {
        self.gate().await?;
        let state = self.state.lock();
        state.user_name(user)?;

        let mut scenes: Vec<SceneSummary> = state
            .scenes
            .iter()
            .filter(|(_, scene)| scene.group_id == group_id)
            .map(|(id, scene)| scene.summary(id))
            .collect();
        scenes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.scene_id.cmp(&b.scene_id)));
        Ok(scenes)
    }

    async fn create_scene(
        &self,
        user: &UserId,
        group_id: &str,
        name: &str,
        document: &[u8],
    ) -> SceneResult<SceneSummary> {
        self.gate().await?;
        let mut state = self.state.lock();
        state.user_name(user)?;

        let scene_id = Uuid::new_v4().to_string();
        let scene = StoredScene {
            group_id: group_id.to_string(),
            name: name.to_string(),
            document: document.to_vec(),
            last_modified: Timestamp::now(),
        };
        let summary = scene.summary(&scene_id);
        state.scenes.insert(scene_id, scene);
        Ok(summary)
    }

    async fn load_scene(
        &self,
        user: &UserId,
        scene_id: &str,
        group_id: &str,
    ) -> SceneResult<JoinedScene> {
        self.gate().await?;
        let mut state = self.state.lock();
        let user_name = state.user_name(user)?;

        let document = match state.scenes.get(scene_id) {
            Some(scene) if scene.group_id == group_id => scene.document.clone(),
            _ => {
                return Err(SceneError::not_found(format!(
                    "scene {} in group {}",
                    scene_id, group_id
                )))
            }
        };

        let session_id = SessionId::generate();
        let session = LiveSession {
            scene_id: scene_id.to_string(),
            state: UserState {
                user_name,
                user_id: user.clone(),
                scene_session_id: session_id.clone(),
                last_updated: Timestamp::now(),
                camera_positions: Vec::new(),
                selected_nodes: Default::default(),
                avatar: None,
            },
            inbox: Vec::new(),
        };
        state.sessions.insert(session_id.clone(), session);
        log::debug!("User {} joined scene {} as {}", user, scene_id, session_id);

        Ok(JoinedScene {
            scene_id: scene_id.to_string(),
            session_id,
            document,
        })
    }

    async fn save_scene(&self, session: &SessionId, document: &[u8]) -> SceneResult<()> {
        self.gate().await?;
        let mut state = self.state.lock();
        let scene_id = state.session_mut(session)?.scene_id.clone();
        let scene = state
            .scenes
            .get_mut(&scene_id)
            .ok_or_else(|| SceneError::not_found(format!("scene {}", scene_id)))?;
        scene.document = document.to_vec();
        scene.last_modified = Timestamp::now();
        Ok(())
    }

    async fn sync(&self, request: SyncRequest) -> SceneResult<SyncResponse> {
        self.gate().await?;
        let mut state = self.state.lock();

        let session = state.session_mut(&request.session_id)?;
        session.state.camera_positions = request.camera_positions;
        session.state.selected_nodes = request.selected_nodes;
        session.state.avatar = request.avatar;
        session.state.last_updated = Timestamp::now();
        let scene_id = session.scene_id.clone();
        let received = std::mem::take(&mut session.inbox);

        for mut message in request.messages {
            message.received_from_session_id = Some(request.session_id.clone());
            match state.sessions.get_mut(&message.target_session_id) {
                Some(target) => target.inbox.push(message),
                None => log::warn!(
                    "Dropping {} message for unknown session {}",
                    message.message_type,
                    message.target_session_id
                ),
            }
        }

        let mut document_saved = false;
        if let Some(document) = request.document {
            if let Some(scene) = state.scenes.get_mut(&scene_id) {
                scene.document = document;
                scene.last_modified = Timestamp::now();
                document_saved = true;
            }
        }

        let users = state
            .sessions
            .iter()
            .filter(|(id, s)| s.scene_id == scene_id && **id != request.session_id)
            .map(|(_, s)| s.state.clone())
            .collect();

        Ok(SyncResponse {
            users,
            messages: received,
            document_saved,
        })
    }

    async fn leave(&self, session: &SessionId) -> SceneResult<()> {
        self.gate().await?;
        let mut state = self.state.lock();
        if state.sessions.remove(session).is_none() {
            return Err(SceneError::OutOfSync(format!("unknown session {}", session)));
        }
        Ok(())
    }
}
