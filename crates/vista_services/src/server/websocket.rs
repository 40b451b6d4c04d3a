//! Scene server client over a frame transport

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use vista_core::{SceneError, SceneResult, SessionId, UserId};

use super::protocol::{self, Request, RequestFrame, Response, ResponseFrame, PROTOCOL_VERSION};
use super::transport::{Transport, TransportError, WebSocketTransport};
use super::{JoinedScene, SceneServer, SceneSummary, SyncRequest, SyncResponse};

/// [`SceneServer`] reached through JSON request frames
///
/// One request is in flight at a time. If a caller abandons a request (for
/// example on timeout) its reply is recognised by request id and skipped
/// when the next request reads the transport.
pub struct WebSocketSceneServer {
    transport: Mutex<Box<dyn Transport>>,
    next_request_id: AtomicU64,
}

impl WebSocketSceneServer {
    /// Open a WebSocket connection to `url`
    pub async fn connect(url: &str, connect_timeout: Duration) -> SceneResult<Self> {
        log::info!("Connecting to scene server at {}", url);
        let transport = tokio::time::timeout(connect_timeout, WebSocketTransport::connect(url))
            .await
            .map_err(|_| TransportError::Timeout)??;
        Ok(Self::with_transport(Box::new(transport)))
    }

    /// Use an already established transport
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Close the underlying transport
    pub async fn close(&self) -> SceneResult<()> {
        self.transport.lock().await.close().await?;
        Ok(())
    }

    async fn request(&self, request: Request) -> SceneResult<Response> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let op = request.op();
        let frame = RequestFrame {
            version: PROTOCOL_VERSION,
            request_id,
            request,
        };
        let bytes = serde_json::to_vec(&frame)
            .map_err(|e| SceneError::invalid(format!("cannot encode {} request: {}", op, e)))?;

        let mut transport = self.transport.lock().await;
        transport.send(&bytes).await?;
        log::debug!("Sent {} request #{} ({} bytes)", op, request_id, bytes.len());

        loop {
            let data = transport.receive().await?;
            let reply: ResponseFrame = serde_json::from_slice(&data)
                .map_err(|e| SceneError::ServerFailure(format!("malformed response: {}", e)))?;
            if reply.request_id == request_id {
                return reply.response.into_result();
            }
            log::warn!(
                "Discarding stale response #{} while waiting for #{}",
                reply.request_id,
                request_id
            );
        }
    }
}

fn unexpected(op: &str, response: Response) -> SceneError {
    SceneError::ServerFailure(format!("unexpected reply to {}: {:?}", op, response))
}

#[async_trait::async_trait]
impl SceneServer for WebSocketSceneServer {
    async fn login(&self, user_name: &str, auth_token: Option<&str>) -> SceneResult<UserId> {
        let request = Request::Login {
            user_name: user_name.to_string(),
            auth_token: auth_token.map(str::to_string),
        };
        match self.request(request).await? {
            Response::LoggedIn { user_id } => Ok(user_id),
            other => Err(unexpected("login", other)),
        }
    }

    async fn list_scenes(&self, user: &UserId, group_id: &str) -> SceneResult<Vec<SceneSummary>> {
        let request = Request::ListScenes {
            user: user.clone(),
            group_id: group_id.to_string(),
        };
        match self.request(request).await? {
            Response::Scenes { scenes } => Ok(scenes),
            other => Err(unexpected("listScenes", other)),
        }
    }

    async fn create_scene(
        &self,
        user: &UserId,
        group_id: &str,
        name: &str,
        document: &[u8],
    ) -> SceneResult<SceneSummary> {
        let request = Request::CreateScene {
            user: user.clone(),
            group_id: group_id.to_string(),
            name: name.to_string(),
            document: protocol::document_to_text(document)?,
        };
        match self.request(request).await? {
            Response::Created { scene } => Ok(scene),
            other => Err(unexpected("createScene", other)),
        }
    }

    async fn load_scene(
        &self,
        user: &UserId,
        scene_id: &str,
        group_id: &str,
    ) -> SceneResult<JoinedScene> {
        let request = Request::LoadScene {
            user: user.clone(),
            scene_id: scene_id.to_string(),
            group_id: group_id.to_string(),
        };
        match self.request(request).await? {
            Response::Loaded {
                scene_id,
                session_id,
                document,
            } => Ok(JoinedScene {
                scene_id,
                session_id,
                document: document.into_bytes(),
            }),
            other => Err(unexpected("loadScene", other)),
        }
    }

    async fn save_scene(&self, session: &SessionId, document: &[u8]) -> SceneResult<()> {
        let request = Request::SaveScene {
            session_id: session.clone(),
            document: protocol::document_to_text(document)?,
        };
        match self.request(request).await? {
            Response::Saved => Ok(()),
            other => Err(unexpected("saveScene", other)),
        }
    }

    async fn sync(&self, request: SyncRequest) -> SceneResult<SyncResponse> {
        if let Some(document) = &request.document {
            protocol::document_to_text(document)?;
        }
        match self.request(Request::Sync(request)).await? {
            Response::Synced(response) => Ok(response),
            other => Err(unexpected("sync", other)),
        }
    }

    async fn leave(&self, session: &SessionId) -> SceneResult<()> {
        let request = Request::Leave {
            session_id: session.clone(),
        };
        match self.request(request).await? {
            Response::Left => Ok(()),
            other => Err(unexpected("leave", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::MemoryTransport;
    use vista_core::ErrorKind;

    #[tokio::test]
    async fn test_stale_reply_is_skipped() {
        let (client, mut server) = MemoryTransport::pair();
        let remote = WebSocketSceneServer::with_transport(Box::new(client));

        let answer = tokio::spawn(async move {
            let data = server.receive().await.unwrap();
            let frame: RequestFrame = serde_json::from_slice(&data).unwrap();
            let stale = ResponseFrame {
                request_id: frame.request_id + 100,
                response: Response::Left,
            };
            server.send(&serde_json::to_vec(&stale).unwrap()).await.unwrap();
            let reply = ResponseFrame {
                request_id: frame.request_id,
                response: Response::LoggedIn {
                    user_id: UserId::new("u-7"),
                },
            };
            server.send(&serde_json::to_vec(&reply).unwrap()).await.unwrap();
            server
        });

        let user = remote.login("alice", None).await.unwrap();
        assert_eq!(user, UserId::new("u-7"));
        answer.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_reply_maps_to_kind() {
        let (client, mut server) = MemoryTransport::pair();
        let remote = WebSocketSceneServer::with_transport(Box::new(client));

        tokio::spawn(async move {
            let data = server.receive().await.unwrap();
            let frame: RequestFrame = serde_json::from_slice(&data).unwrap();
            let reply = ResponseFrame {
                request_id: frame.request_id,
                response: Response::error(&SceneError::AuthFailure("bad token".into())),
            };
            server.send(&serde_json::to_vec(&reply).unwrap()).await.unwrap();
        });

        let err = remote.login("alice", Some("nope")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailure);
    }

    #[tokio::test]
    async fn test_closed_transport_is_connection_failure() {
        let (client, server) = MemoryTransport::pair();
        drop(server);
        let remote = WebSocketSceneServer::with_transport(Box::new(client));
        let err = remote.leave(&SessionId::new("s")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
        assert!(err.is_retryable());
    }
}
