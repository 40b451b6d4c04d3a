//! Scene service facade
//!
//! [`SceneService`] is what an application holds: one scene store, the
//! optional server login and the configuration. After a release the next
//! create or load starts from a fresh store.

use std::path::Path;
use std::sync::Arc;

use vista_core::{NodeId, SceneError, SceneResult};
use vista_scene::SceneTree;

use crate::collab::{CollaborationSession, SyncResult};
use crate::config::ServiceConfig;
use crate::server::{SceneServer, SceneSummary};
use crate::session::ServerSession;
use crate::store::{FileSystem, LoadSource, LocalFileSystem, SaveMode, SceneStore, StoreState};

pub struct SceneService {
    config: ServiceConfig,
    fs: Arc<dyn FileSystem>,
    server: Option<ServerSession>,
    store: SceneStore,
}

impl SceneService {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_file_system(config, Arc::new(LocalFileSystem::new()))
    }

    pub fn with_file_system(config: ServiceConfig, fs: Arc<dyn FileSystem>) -> Self {
        let store = SceneStore::with_file_system(config.clone(), fs.clone());
        Self {
            config,
            fs,
            server: None,
            store,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Connect to the configured server over WebSocket and log in
    pub async fn connect(&mut self) -> SceneResult<&ServerSession> {
        let session = ServerSession::connect(&self.config.server).await?;
        Ok(self.use_server_session(session))
    }

    /// Log in through a given server collaborator
    pub async fn login(&mut self, server: Arc<dyn SceneServer>) -> SceneResult<&ServerSession> {
        let session = ServerSession::login(server, &self.config.server).await?;
        Ok(self.use_server_session(session))
    }

    /// Use an existing login for all server operations
    pub fn use_server_session(&mut self, session: ServerSession) -> &ServerSession {
        self.store.set_server_session(session.clone());
        self.server.insert(session)
    }

    pub fn server_session(&self) -> Option<&ServerSession> {
        self.server.as_ref()
    }

    pub async fn list_scenes(&self, group_id: &str) -> SceneResult<Vec<SceneSummary>> {
        self.server
            .as_ref()
            .ok_or_else(|| SceneError::NotInitialized("not logged in".to_string()))?
            .list_scenes(group_id)
            .await
    }

    /// Store to bind into, replacing a released one
    fn fresh_store(&mut self) -> &mut SceneStore {
        if self.store.state() == StoreState::Released {
            let mut store = SceneStore::with_file_system(self.config.clone(), self.fs.clone());
            if let Some(session) = &self.server {
                store.set_server_session(session.clone());
            }
            self.store = store;
        }
        &mut self.store
    }

    // ------------------------------------------------------------------
    // Load / create
    // ------------------------------------------------------------------

    pub fn create_in_memory(&mut self, name: &str) -> SceneResult<NodeId> {
        self.fresh_store().create_in_memory(name)?;
        self.root()
    }

    pub fn create_in_file(&mut self, name: &str, path: impl AsRef<Path>) -> SceneResult<NodeId> {
        self.fresh_store().create_in_file(name, path)?;
        self.root()
    }

    pub async fn create_in_server(&mut self, name: &str, group_id: &str) -> SceneResult<NodeId> {
        self.fresh_store().create_in_server(name, group_id).await?;
        self.root()
    }

    pub fn load_from_memory(&mut self, buffer: &[u8]) -> SceneResult<NodeId> {
        self.fresh_store().load_from_memory(buffer)?;
        self.root()
    }

    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> SceneResult<NodeId> {
        self.fresh_store().load_from_file(path)?;
        self.root()
    }

    pub async fn load_from_server(&mut self, scene_id: &str, group_id: &str) -> SceneResult<NodeId> {
        self.fresh_store().load_from_server(scene_id, group_id).await?;
        self.root()
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    pub async fn save(&mut self) -> SceneResult<()> {
        self.store.save().await
    }

    pub async fn save_with(&mut self, mode: SaveMode) -> SceneResult<()> {
        self.store.save_with(mode).await
    }

    pub fn save_to_memory(&mut self) -> SceneResult<Vec<u8>> {
        self.store.save_to_memory().map(<[u8]>::to_vec)
    }

    pub fn save_to_file(&mut self, path: impl AsRef<Path>) -> SceneResult<()> {
        self.store.save_to_file(path)
    }

    pub async fn save_to_server(&mut self, name: &str, group_id: &str) -> SceneResult<SceneSummary> {
        self.store.save_to_server(name, group_id).await
    }

    // ------------------------------------------------------------------
    // Tree access
    // ------------------------------------------------------------------

    pub fn root(&self) -> SceneResult<NodeId> {
        Ok(self.store.tree()?.root())
    }

    pub fn tree(&self) -> SceneResult<&SceneTree> {
        self.store.tree()
    }

    pub fn tree_mut(&mut self) -> SceneResult<&mut SceneTree> {
        self.store.tree_mut()
    }

    /// Run a batch of edits against the bound tree
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut SceneTree) -> SceneResult<R>) -> SceneResult<R> {
        f(self.store.tree_mut()?)
    }

    pub fn state(&self) -> StoreState {
        self.store.state()
    }

    pub fn load_source(&self) -> Option<&LoadSource> {
        self.store.load_source()
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    // ------------------------------------------------------------------
    // Collaboration
    // ------------------------------------------------------------------

    pub fn collaboration(&self) -> Option<&CollaborationSession> {
        self.store.collaboration()
    }

    pub fn collaboration_mut(&mut self) -> Option<&mut CollaborationSession> {
        self.store.collaboration_mut()
    }

    pub async fn tick(&mut self, force_sync: bool) -> SceneResult<SyncResult> {
        self.store.tick(force_sync).await
    }

    pub async fn release(&mut self) -> SceneResult<()> {
        self.store.release().await
    }
}

impl std::fmt::Debug for SceneService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneService")
            .field("server", &self.server)
            .field("store", &self.store)
            .finish()
    }
}
