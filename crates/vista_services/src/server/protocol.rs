//! Scene server wire protocol
//!
//! Every request frame carries a client-chosen `requestId` that the server
//! echoes in its response, so late replies to abandoned requests can be told
//! apart from the one being waited for. Frames are JSON.

use serde::{Deserialize, Serialize};
use vista_core::{SceneError, SceneResult, SessionId, UserId};

use super::{JoinedScene, SceneServer, SceneSummary, SyncRequest, SyncResponse};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Client to server frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame {
    pub version: u32,
    pub request_id: u64,
    pub request: Request,
}

/// Server to client frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFrame {
    pub request_id: u64,
    pub response: Response,
}

/// Requests understood by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Login {
        user_name: String,
        auth_token: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ListScenes { user: UserId, group_id: String },
    #[serde(rename_all = "camelCase")]
    CreateScene {
        user: UserId,
        group_id: String,
        name: String,
        document: String,
    },
    #[serde(rename_all = "camelCase")]
    LoadScene {
        user: UserId,
        scene_id: String,
        group_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SaveScene {
        session_id: SessionId,
        document: String,
    },
    Sync(SyncRequest),
    #[serde(rename_all = "camelCase")]
    Leave { session_id: SessionId },
}

impl Request {
    /// Short name for logs
    pub fn op(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::ListScenes { .. } => "listScenes",
            Self::CreateScene { .. } => "createScene",
            Self::LoadScene { .. } => "loadScene",
            Self::SaveScene { .. } => "saveScene",
            Self::Sync(_) => "sync",
            Self::Leave { .. } => "leave",
        }
    }
}

/// Server replies, one per request kind plus an error
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Response {
    #[serde(rename_all = "camelCase")]
    LoggedIn { user_id: UserId },
    Scenes { scenes: Vec<SceneSummary> },
    Created { scene: SceneSummary },
    #[serde(rename_all = "camelCase")]
    Loaded {
        scene_id: String,
        session_id: SessionId,
        document: String,
    },
    Saved,
    Synced(SyncResponse),
    Left,
    Error { code: String, message: String },
}

impl Response {
    pub fn error(e: &SceneError) -> Self {
        Self::Error {
            code: error_code(e).to_string(),
            message: e.to_string(),
        }
    }

    /// Turn an error reply back into a [`SceneError`]
    pub fn into_result(self) -> SceneResult<Self> {
        match self {
            Self::Error { code, message } => Err(error_from_code(&code, message)),
            other => Ok(other),
        }
    }
}

fn error_code(e: &SceneError) -> &'static str {
    match e {
        SceneError::InvalidParameter(_) => "invalidParameter",
        SceneError::NotFound(_) => "notFound",
        SceneError::NotAllowed(_) => "notAllowed",
        SceneError::Parse(_) => "parseError",
        SceneError::AuthFailure(_) => "authFailure",
        SceneError::OutOfSync(_) => "outOfSync",
        SceneError::ConnectionFailure(_) => "connectionFailure",
        SceneError::Timeout(_) => "timeout",
        _ => "serverFailure",
    }
}

fn error_from_code(code: &str, message: String) -> SceneError {
    match code {
        "invalidParameter" => SceneError::InvalidParameter(message),
        "notFound" => SceneError::NotFound(message),
        "notAllowed" => SceneError::NotAllowed(message),
        "parseError" => SceneError::Parse(message),
        "authFailure" => SceneError::AuthFailure(message),
        "outOfSync" => SceneError::OutOfSync(message),
        "connectionFailure" => SceneError::ConnectionFailure(message),
        "timeout" => SceneError::Timeout(message),
        _ => SceneError::ServerFailure(message),
    }
}

/// Documents travel as JSON text inside JSON frames
pub fn document_to_text(document: &[u8]) -> SceneResult<String> {
    String::from_utf8(document.to_vec())
        .map_err(|_| SceneError::invalid("scene document is not valid UTF-8"))
}

/// Serde helper writing optional document bytes as a string
pub(crate) mod opt_document {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(serde::ser::Error::custom)?;
                Some(text).serialize(serializer)
            }
            None => None::<&str>.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?.map(String::into_bytes))
    }
}

/// Run one request against a server implementation
pub async fn dispatch(server: &dyn SceneServer, request: Request) -> Response {
    let result = match request {
        Request::Login {
            user_name,
            auth_token,
        } => server
            .login(&user_name, auth_token.as_deref())
            .await
            .map(|user_id| Response::LoggedIn { user_id }),
        Request::ListScenes { user, group_id } => server
            .list_scenes(&user, &group_id)
            .await
            .map(|scenes| Response::Scenes { scenes }),
        Request::CreateScene {
            user,
            group_id,
            name,
            document,
        } => server
            .create_scene(&user, &group_id, &name, document.as_bytes())
            .await
            .map(|scene| Response::Created { scene }),
        Request::LoadScene {
            user,
            scene_id,
            group_id,
        } => match server.load_scene(&user, &scene_id, &group_id).await {
            Ok(JoinedScene {
                scene_id,
                session_id,
                document,
            }) => document_to_text(&document).map(|document| Response::Loaded {
                scene_id,
                session_id,
                document,
            }),
            Err(e) => Err(e),
        },
        Request::SaveScene {
            session_id,
            document,
        } => server
            .save_scene(&session_id, document.as_bytes())
            .await
            .map(|_| Response::Saved),
        Request::Sync(request) => server.sync(request).await.map(Response::Synced),
        Request::Leave { session_id } => server.leave(&session_id).await.map(|_| Response::Left),
    };
    result.unwrap_or_else(|e| Response::error(&e))
}

/// Answer requests arriving on `transport` until it closes
pub async fn serve(
    mut transport: Box<dyn super::Transport>,
    server: std::sync::Arc<dyn SceneServer>,
) {
    loop {
        let frame = match transport.receive().await {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Protocol server stopping: {}", e);
                break;
            }
        };
        let request: RequestFrame = match serde_json::from_slice(&frame) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Dropping malformed request frame: {}", e);
                continue;
            }
        };

        let response = if request.version != PROTOCOL_VERSION {
            Response::error(&SceneError::OutOfSync(format!(
                "protocol version {} is not supported",
                request.version
            )))
        } else {
            dispatch(server.as_ref(), request.request).await
        };
        let reply = ResponseFrame {
            request_id: request.request_id,
            response,
        };
        let bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Cannot encode response: {}", e);
                continue;
            }
        };
        if transport.send(&bytes).await.is_err() {
            break;
        }
    }
}
