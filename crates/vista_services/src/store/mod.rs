//! # Scene store
//!
//! [`SceneStore`] binds one [`SceneTree`] to a backing store (memory buffer,
//! file or scene server) and moves it in and out of that store.
//!
//! ## States
//!
//! ```text
//! Unbound --create/load--> MemoryBound | FileBound | ServerBound --release--> Released
//! ```
//!
//! `Released` is terminal. A failed create or load leaves the store
//! `Unbound`; a failed save leaves the tree and its unsaved-changes flag as
//! they were.
//!
//! ## Creating
//!
//! Every `create_in_*` call persists the new single-root tree right away, so
//! a file-backed scene exists on disk and a server-backed scene has a scene
//! id and a collaboration session from the start.

pub mod fs;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vista_core::{SceneError, SceneResult, SessionId};
use vista_scene::{decode, encode, EncodeOptions, SceneTree};

use crate::collab::{CollaborationSession, SyncResult};
use crate::config::ServiceConfig;
use crate::server::SceneSummary;
use crate::session::ServerSession;

pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};

/// Where the bound tree was last loaded from or created in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    Memory,
    File(PathBuf),
    Server { scene_id: String, group_id: String },
}

/// Binding state of a [`SceneStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Unbound,
    MemoryBound,
    FileBound,
    ServerBound,
    Released,
}

/// How `save` reaches a server-bound scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Write now
    #[default]
    Immediate,
    /// Send the document with the next collaboration tick
    Deferred,
}

/// Persistence adapter over the three backing stores
pub struct SceneStore {
    fs: Arc<dyn FileSystem>,
    server: Option<ServerSession>,
    config: ServiceConfig,
    tree: Option<SceneTree>,
    source: Option<LoadSource>,
    collab: Option<CollaborationSession>,
    memory: Vec<u8>,
    released: bool,
}

impl SceneStore {
    /// Create an unbound store using the local filesystem
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_file_system(config, Arc::new(LocalFileSystem::new()))
    }

    pub fn with_file_system(config: ServiceConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            server: None,
            config,
            tree: None,
            source: None,
            collab: None,
            memory: Vec::new(),
            released: false,
        }
    }

    /// Attach a logged-in server session for the server operations
    pub fn set_server_session(&mut self, session: ServerSession) {
        self.server = Some(session);
    }

    pub fn state(&self) -> StoreState {
        if self.released {
            return StoreState::Released;
        }
        match self.source {
            None => StoreState::Unbound,
            Some(LoadSource::Memory) => StoreState::MemoryBound,
            Some(LoadSource::File(_)) => StoreState::FileBound,
            Some(LoadSource::Server { .. }) => StoreState::ServerBound,
        }
    }

    pub fn load_source(&self) -> Option<&LoadSource> {
        self.source.as_ref()
    }

    /// The bound tree
    pub fn tree(&self) -> SceneResult<&SceneTree> {
        self.tree.as_ref().ok_or_else(not_bound)
    }

    pub fn tree_mut(&mut self) -> SceneResult<&mut SceneTree> {
        self.tree.as_mut().ok_or_else(not_bound)
    }

    /// Collaboration state of a server-bound scene
    pub fn collaboration(&self) -> Option<&CollaborationSession> {
        self.collab.as_ref()
    }

    pub fn collaboration_mut(&mut self) -> Option<&mut CollaborationSession> {
        self.collab.as_mut()
    }

    /// Last document written to or loaded from memory
    pub fn memory_buffer(&self) -> &[u8] {
        &self.memory
    }

    fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            pretty: self.config.store.pretty_documents,
        }
    }

    fn ensure_unbound(&self) -> SceneResult<()> {
        if self.released {
            return Err(SceneError::not_allowed("store has been released"));
        }
        if self.tree.is_some() {
            return Err(SceneError::AlreadyBound);
        }
        Ok(())
    }

    fn server_session(&self) -> SceneResult<&ServerSession> {
        self.server
            .as_ref()
            .ok_or_else(|| SceneError::NotInitialized("no server session".to_string()))
    }

    fn bind(&mut self, mut tree: SceneTree, source: LoadSource) {
        tree.mark_saved();
        log::info!("Bound scene '{}' ({:?})", tree.root_node().name(), source);
        self.tree = Some(tree);
        self.source = Some(source);
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn create_in_memory(&mut self, name: &str) -> SceneResult<()> {
        self.ensure_unbound()?;
        let tree = SceneTree::new(name);
        self.memory = encode(&tree, &self.encode_options())?;
        self.bind(tree, LoadSource::Memory);
        Ok(())
    }

    pub fn create_in_file(&mut self, name: &str, path: impl AsRef<Path>) -> SceneResult<()> {
        self.ensure_unbound()?;
        let path = path.as_ref();
        let tree = SceneTree::new(name);
        self.fs.write(path, &encode(&tree, &self.encode_options())?)?;
        self.bind(tree, LoadSource::File(path.to_path_buf()));
        Ok(())
    }

    /// Create a scene on the server and join it
    pub async fn create_in_server(&mut self, name: &str, group_id: &str) -> SceneResult<()> {
        self.ensure_unbound()?;
        let session = self.server_session()?.clone();
        let tree = SceneTree::new(name);
        let document = encode(&tree, &EncodeOptions::default())?;

        let server = session.server().clone();
        let summary = session
            .request(
                "create scene",
                server.create_scene(session.user_id(), group_id, name, &document),
            )
            .await?;
        let joined = session
            .request(
                "join scene",
                server.load_scene(session.user_id(), &summary.scene_id, group_id),
            )
            .await
            .map_err(|e| {
                log::warn!("Created scene {} but could not join it: {}", summary.scene_id, e);
                e
            })?;

        self.collab = Some(CollaborationSession::attach(
            session,
            joined.scene_id.clone(),
            joined.session_id,
            self.config.sync.clone(),
        ));
        self.bind(
            tree,
            LoadSource::Server {
                scene_id: joined.scene_id,
                group_id: group_id.to_string(),
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    pub fn load_from_memory(&mut self, buffer: &[u8]) -> SceneResult<()> {
        self.ensure_unbound()?;
        let tree = decode(buffer)?;
        self.memory = buffer.to_vec();
        self.bind(tree, LoadSource::Memory);
        Ok(())
    }

    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> SceneResult<()> {
        self.ensure_unbound()?;
        let path = path.as_ref();
        let tree = decode(&self.fs.read(path)?)?;
        self.bind(tree, LoadSource::File(path.to_path_buf()));
        Ok(())
    }

    /// Fetch a scene from the server and join its collaboration session
    ///
    /// If the document cannot be decoded, or this future is dropped before
    /// the store binds, the joined session is left again.
    pub async fn load_from_server(&mut self, scene_id: &str, group_id: &str) -> SceneResult<()> {
        self.ensure_unbound()?;
        let session = self.server_session()?.clone();
        let server = session.server().clone();
        let joined = session
            .request(
                "load scene",
                server.load_scene(session.user_id(), scene_id, group_id),
            )
            .await?;
        let membership = Membership::new(session.clone(), joined.session_id.clone());

        let tree = match decode(&joined.document) {
            Ok(tree) => tree,
            Err(e) => {
                if let Err(leave) = membership.leave().await {
                    log::warn!("Could not leave session {}: {}", joined.session_id, leave);
                }
                return Err(e);
            }
        };

        membership.keep();
        self.collab = Some(CollaborationSession::attach(
            session,
            joined.scene_id.clone(),
            joined.session_id,
            self.config.sync.clone(),
        ));
        self.bind(
            tree,
            LoadSource::Server {
                scene_id: joined.scene_id,
                group_id: group_id.to_string(),
            },
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// Write the tree back to its load source, immediately
    pub async fn save(&mut self) -> SceneResult<()> {
        self.save_with(SaveMode::Immediate).await
    }

    /// Write the tree back to its load source
    ///
    /// `mode` only matters for server-bound scenes. A deferred save keeps
    /// the tree dirty until a tick confirms the server stored it.
    pub async fn save_with(&mut self, mode: SaveMode) -> SceneResult<()> {
        let source = self.source.clone().ok_or_else(not_bound)?;
        let tree = self.tree.as_ref().ok_or_else(not_bound)?;
        let revision = tree.revision();

        match source {
            LoadSource::Memory => {
                self.memory = encode(tree, &self.encode_options())?;
            }
            LoadSource::File(path) => {
                self.fs.write(&path, &encode(tree, &self.encode_options())?)?;
            }
            LoadSource::Server { .. } => {
                let document = encode(tree, &EncodeOptions::default())?;
                let collab = self.collab.as_mut().ok_or_else(|| {
                    SceneError::NotInitialized("no collaboration session".to_string())
                })?;
                match mode {
                    SaveMode::Deferred => {
                        collab.set_pending_document(document, revision);
                        log::debug!("Deferred save of revision {}", revision);
                        return Ok(());
                    }
                    SaveMode::Immediate => {
                        let session = collab.server_session().clone();
                        let server = session.server().clone();
                        let session_id = collab.session_id().clone();
                        session
                            .request("save scene", server.save_scene(&session_id, &document))
                            .await?;
                    }
                }
            }
        }

        if let Some(tree) = self.tree.as_mut() {
            tree.mark_saved_at(revision);
        }
        log::info!("Saved scene ({:?})", self.state());
        Ok(())
    }

    /// Encode into the memory buffer without changing the load source
    pub fn save_to_memory(&mut self) -> SceneResult<&[u8]> {
        let tree = self.tree.as_ref().ok_or_else(not_bound)?;
        self.memory = encode(tree, &self.encode_options())?;
        if let Some(tree) = self.tree.as_mut() {
            tree.mark_saved();
        }
        Ok(&self.memory)
    }

    /// Write to a file without changing the load source
    pub fn save_to_file(&mut self, path: impl AsRef<Path>) -> SceneResult<()> {
        let tree = self.tree.as_ref().ok_or_else(not_bound)?;
        let document = encode(tree, &self.encode_options())?;
        self.fs.write(path.as_ref(), &document)?;
        if let Some(tree) = self.tree.as_mut() {
            tree.mark_saved();
        }
        Ok(())
    }

    /// Store a copy as a new server scene without changing the load source
    pub async fn save_to_server(&mut self, name: &str, group_id: &str) -> SceneResult<SceneSummary> {
        let session = self.server_session()?.clone();
        let tree = self.tree.as_ref().ok_or_else(not_bound)?;
        let revision = tree.revision();
        let document = encode(tree, &EncodeOptions::default())?;

        let server = session.server().clone();
        let summary = session
            .request(
                "save scene",
                server.create_scene(session.user_id(), group_id, name, &document),
            )
            .await?;
        if let Some(tree) = self.tree.as_mut() {
            tree.mark_saved_at(revision);
        }
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Sync and teardown
    // ------------------------------------------------------------------

    /// Run one collaboration tick for a server-bound scene
    pub async fn tick(&mut self, force_sync: bool) -> SceneResult<SyncResult> {
        let collab = self.collab.as_mut().ok_or_else(|| {
            SceneError::NotInitialized("scene is not bound to a server".to_string())
        })?;
        let pending = collab.pending_revision();
        let result = collab.tick(force_sync).await?;

        if let (
            SyncResult::Synced {
                document_saved: true,
                ..
            },
            Some(revision),
        ) = (&result, pending)
        {
            if let Some(tree) = self.tree.as_mut() {
                tree.mark_saved_at(revision);
            }
        }
        Ok(result)
    }

    /// Drop the bound tree and leave any collaboration session
    ///
    /// Releasing twice, or releasing an unbound store, succeeds. Nodes that
    /// still carry user data are reported as `OutstandingReferences`: a hard
    /// error in strict mode (the store stays bound), otherwise a warning and
    /// the data is dropped.
    pub async fn release(&mut self) -> SceneResult<()> {
        if self.released {
            return Ok(());
        }

        if let Some(tree) = self.tree.as_mut() {
            let count = tree.user_data_count();
            if count > 0 {
                if self.config.store.strict_release {
                    return Err(SceneError::OutstandingReferences { count });
                }
                log::warn!(
                    "{}; dropping it on release",
                    SceneError::OutstandingReferences { count }
                );
                tree.clear_user_data();
            }
        }

        let leave_result = match self.collab.as_mut() {
            Some(collab) => collab.detach().await,
            None => Ok(()),
        };

        self.collab = None;
        self.tree = None;
        self.source = None;
        self.memory.clear();
        self.released = true;
        log::info!("Released scene store");

        leave_result
    }
}

fn not_bound() -> SceneError {
    SceneError::NotInitialized("no scene is bound".to_string())
}

impl fmt::Debug for SceneStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneStore")
            .field("state", &self.state())
            .field("source", &self.source)
            .field("nodes", &self.tree.as_ref().map(SceneTree::len))
            .field("collaboration", &self.collab)
            .finish()
    }
}

/// A joined server session that is not yet owned by a collaboration session
///
/// Dropping it while still armed leaves the session from a background task.
struct Membership {
    session: ServerSession,
    session_id: Option<SessionId>,
}

impl Membership {
    fn new(session: ServerSession, session_id: SessionId) -> Self {
        Self {
            session,
            session_id: Some(session_id),
        }
    }

    fn keep(mut self) {
        self.session_id = None;
    }

    async fn leave(mut self) -> SceneResult<()> {
        let Some(id) = self.session_id.clone() else {
            return Ok(());
        };
        let server = self.session.server().clone();
        let result = self.session.request("leave", server.leave(&id)).await;
        self.session_id = None;
        result
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        let Some(id) = self.session_id.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let session = self.session.clone();
                handle.spawn(async move {
                    let server = session.server().clone();
                    match session.request("leave", server.leave(&id)).await {
                        Ok(()) => log::debug!("Left abandoned session {}", id),
                        Err(e) => log::warn!("Could not leave abandoned session {}: {}", id, e),
                    }
                });
            }
            Err(_) => log::warn!("Session {} abandoned outside a runtime; not left", id),
        }
    }
}

