//! Server login context
//!
//! A [`ServerSession`] is created once at startup and handed to whatever
//! needs the server. There is no process-wide login state.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use vista_core::{SceneError, SceneResult, UserId};

use crate::config::ServerConfig;
use crate::server::{SceneServer, SceneSummary, WebSocketSceneServer};

/// An authenticated connection to a scene server
#[derive(Clone)]
pub struct ServerSession {
    server: Arc<dyn SceneServer>,
    user_name: String,
    user_id: UserId,
    request_timeout: Duration,
}

impl ServerSession {
    /// Log in through an existing server collaborator
    pub async fn login(server: Arc<dyn SceneServer>, config: &ServerConfig) -> SceneResult<Self> {
        let request_timeout = config.request_timeout();
        let user_id = with_timeout(
            request_timeout,
            "login",
            server.login(&config.user_name, config.auth_token.as_deref()),
        )
        .await?;
        log::info!("Logged in as {} ({})", config.user_name, user_id);

        Ok(Self {
            server,
            user_name: config.user_name.clone(),
            user_id,
            request_timeout,
        })
    }

    /// Connect to `config.url` over WebSocket and log in
    pub async fn connect(config: &ServerConfig) -> SceneResult<Self> {
        let server = WebSocketSceneServer::connect(&config.url, config.connect_timeout()).await?;
        Self::login(Arc::new(server), config).await
    }

    pub fn server(&self) -> &Arc<dyn SceneServer> {
        &self.server
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Run one server call under the request deadline
    pub async fn request<T, F>(&self, what: &str, call: F) -> SceneResult<T>
    where
        F: Future<Output = SceneResult<T>>,
    {
        with_timeout(self.request_timeout, what, call).await
    }

    /// Scenes stored in a group
    pub async fn list_scenes(&self, group_id: &str) -> SceneResult<Vec<SceneSummary>> {
        self.request("list scenes", self.server.list_scenes(&self.user_id, group_id))
            .await
    }
}

impl fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSession")
            .field("user_name", &self.user_name)
            .field("user_id", &self.user_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

async fn with_timeout<T, F>(limit: Duration, what: &str, call: F) -> SceneResult<T>
where
    F: Future<Output = SceneResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            log::debug!("{} timed out after {:?}", what, limit);
            Err(SceneError::Timeout(format!(
                "{} did not complete within {:?}",
                what, limit
            )))
        }
    }
}
