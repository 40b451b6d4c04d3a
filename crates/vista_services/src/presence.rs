//! Ephemeral multi-user state exchanged on every sync tick

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vista_core::{NodeId, SceneError, SceneResult, SessionId, Timestamp, UserId};

/// One camera of a collaborator
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Radians
    pub heading: f64,
    /// Radians
    pub pitch: f64,
}

impl CameraPosition {
    pub fn new(position: [f64; 3], heading: f64, pitch: f64) -> Self {
        Self {
            x: position[0],
            y: position[1],
            z: position[2],
            heading,
            pitch,
        }
    }

    pub fn validate(&self) -> SceneResult<()> {
        let values = [self.x, self.y, self.z, self.heading, self.pitch];
        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(SceneError::invalid("camera position values must be finite"))
        }
    }
}

/// Visual representation of a collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Avatar {
    /// Model to draw
    pub url: String,
    pub offset: [f64; 3],
    pub scale: [f64; 3],
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl Avatar {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            offset: [0.0; 3],
            scale: [1.0; 3],
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
        }
    }

    pub fn validate(&self) -> SceneResult<()> {
        if self.url.is_empty() {
            return Err(SceneError::invalid("avatar url must not be empty"));
        }
        let finite = self
            .offset
            .iter()
            .chain(self.scale.iter())
            .chain([self.yaw, self.pitch, self.roll].iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(SceneError::invalid("avatar values must be finite"));
        }
        Ok(())
    }
}

/// Latest snapshot of one collaborator, replaced wholesale on each update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub user_name: String,
    pub user_id: UserId,
    pub scene_session_id: SessionId,
    pub last_updated: Timestamp,
    #[serde(default)]
    pub camera_positions: Vec<CameraPosition>,
    #[serde(default)]
    pub selected_nodes: BTreeSet<NodeId>,
    #[serde(default)]
    pub avatar: Option<Avatar>,
}

/// A point-to-point message between two sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_type: String,
    pub payload: String,
    pub target_session_id: SessionId,
    /// Filled in by the server on delivery
    #[serde(default)]
    pub received_from_session_id: Option<SessionId>,
}

impl Message {
    pub fn new(
        target: SessionId,
        message_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> SceneResult<Self> {
        let message_type = message_type.into();
        if message_type.is_empty() {
            return Err(SceneError::invalid("message type must not be empty"));
        }
        Ok(Self {
            message_type,
            payload: payload.into(),
            target_session_id: target,
            received_from_session_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_validation() {
        assert!(CameraPosition::new([1.0, 2.0, 3.0], 0.5, -0.2).validate().is_ok());
        assert!(CameraPosition::new([f64::NAN, 2.0, 3.0], 0.5, -0.2)
            .validate()
            .is_err());
    }

    #[test]
    fn test_avatar_validation() {
        assert!(Avatar::new("https://x/avatar.glb").validate().is_ok());
        assert!(Avatar::new("").validate().is_err());
        let mut a = Avatar::new("a.glb");
        a.roll = f64::INFINITY;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_message_requires_type() {
        assert!(Message::new(SessionId::new("s"), "", "{}").is_err());
        let m = Message::new(SessionId::new("s"), "chat", "hi").unwrap();
        assert_eq!(m.received_from_session_id, None);
    }

    #[test]
    fn test_user_state_wire_names() {
        let state = UserState {
            user_name: "alice".into(),
            user_id: UserId::new("u1"),
            scene_session_id: SessionId::new("s1"),
            last_updated: Timestamp::from_secs_f64(10.0),
            camera_positions: vec![],
            selected_nodes: BTreeSet::new(),
            avatar: None,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["userName"], "alice");
        assert_eq!(json["sceneSessionId"], "s1");
        assert_eq!(json["lastUpdated"], 10.0);
    }
}
