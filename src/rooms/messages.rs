use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages a client sends over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinRoom {
        room_id: String,
        /// Advisory only; the server acts on the identity resolved at handshake.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },

    CodeUpdate {
        room_id: String,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },

    WebrtcOffer {
        to: String,
        offer: Value,
    },

    WebrtcAnswer {
        to: String,
        answer: Value,
    },

    WebrtcIceCandidate {
        to: String,
        candidate: Value,
    },
}

/// Messages the server sends over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Shared buffer state, both as the join snapshot and as peer updates.
    CodeUpdate {
        code: String,
        language: String,
    },

    UserJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        socket_id: String,
    },

    UserLeft {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        socket_id: String,
    },

    WebrtcOffer {
        from: String,
        offer: Value,
    },

    WebrtcAnswer {
        from: String,
        answer: Value,
    },

    WebrtcIceCandidate {
        from: String,
        candidate: Value,
    },

    Error {
        message: String,
    },

    Heartbeat {
        timestamp: DateTime<Utc>,
        client_count: usize,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_room() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","roomId":"room-1","userId":"u1"}"#)
                .unwrap();
        match msg {
            ClientMessage::JoinRoom { room_id, user_id } => {
                assert_eq!(room_id, "room-1");
                assert_eq!(user_id.as_deref(), Some("u1"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_code_update_without_language() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"code_update","roomId":"room-1","code":"print(1)","userId":"u1"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::CodeUpdate { code, language, .. } => {
                assert_eq!(code, "print(1)");
                assert!(language.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_signaling_payload_is_opaque() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"webrtc_offer","to":"socket-2","offer":{"sdp":"v=0...","type":"offer"}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::WebrtcOffer { to, offer } => {
                assert_eq!(to, "socket-2");
                assert_eq!(offer["type"], "offer");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_serialize_heartbeat_shape() {
        let msg = ServerMessage::Heartbeat {
            timestamp: Utc::now(),
            client_count: 3,
        };
        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "heartbeat");
        assert_eq!(value["clientCount"], 3);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_serialize_user_joined_shape() {
        let msg = ServerMessage::UserJoined {
            user_id: Some("u2".to_string()),
            socket_id: "socket-2".to_string(),
        };
        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type":"user_joined","userId":"u2","socketId":"socket-2"})
        );
    }

    #[test]
    fn test_relay_rewrites_to_as_from() {
        let inbound: ClientMessage = serde_json::from_str(
            r#"{"type":"webrtc_ice_candidate","to":"socket-2","candidate":{"candidate":"..."}}"#,
        )
        .unwrap();
        let candidate = match inbound {
            ClientMessage::WebrtcIceCandidate { candidate, .. } => candidate,
            other => panic!("unexpected message: {:?}", other),
        };

        let outbound = ServerMessage::WebrtcIceCandidate {
            from: "socket-1".to_string(),
            candidate,
        };
        let value: Value = serde_json::to_value(&outbound).unwrap();
        assert_eq!(value["type"], "webrtc_ice_candidate");
        assert_eq!(value["from"], "socket-1");
        assert!(value.get("to").is_none());
    }
}
