//! # Vista Services
//!
//! Persistence and collaboration for Vista scenes.
//!
//! Provides:
//! - Scene stores over memory buffers, files and a scene server
//! - The scene server collaborator (WebSocket client and in-process server)
//! - Multi-user presence and messaging through periodic sync ticks
//! - TOML configuration with environment overrides
//!
//! ## Usage
//!
//! ```ignore
//! let config = ServiceConfig::load(None)?;
//! let mut service = SceneService::new(config);
//! service.connect().await?;
//!
//! let root = service.load_from_server(&scene_id, "team").await?;
//! service.edit(|tree| tree.set_name(root, "Survey"))?;
//! service.save().await?;
//!
//! loop {
//!     service.tick(false).await?;
//! }
//! ```

pub mod collab;
pub mod config;
pub mod presence;
pub mod server;
pub mod service;
pub mod session;
pub mod store;

pub use collab::{CollabState, CollaborationSession, MessageSender, SyncResult};
pub use config::{ConfigError, ServerConfig, ServiceConfig, StoreConfig, SyncConfig};
pub use presence::{Avatar, CameraPosition, Message, UserState};
pub use server::{LoopbackServer, SceneServer, SceneSummary, WebSocketSceneServer};
pub use service::SceneService;
pub use session::ServerSession;
pub use store::{
    FileSystem, LoadSource, LocalFileSystem, MemoryFileSystem, SaveMode, SceneStore, StoreState,
};
