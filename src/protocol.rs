//! Wire message shapes: one `ClientFrame`/`ServerFrame` enum per direction,
//! each a single JSON object tagged by `type`. One message per text frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::algebra::Operation;

/// Cursor position as reported/broadcast over the wire. `line` is advisory
/// (client-computed); only `position` is used by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorPosition {
    pub position: usize,
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

/// One frame received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Operation { operation: Operation },
    CursorPosition {
        cursor: CursorPosition,
        #[serde(default)]
        selection: Option<Selection>,
    },
    Ping {},
}

/// A connected user as reported in a `document_state` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveUser {
    pub id: String,
    pub username: String,
    pub cursor: Option<CursorPosition>,
    pub selection: Option<Selection>,
}

/// One frame sent to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    DocumentState {
        content: String,
        version: u64,
        active_users: Vec<ActiveUser>,
    },
    Operation {
        operation: Operation,
        version: u64,
        user_id: String,
        username: String,
    },
    OperationAck {
        version: u64,
        server_time: DateTime<Utc>,
    },
    CursorUpdate {
        user_id: String,
        username: String,
        cursor: CursorPosition,
        selection: Option<Selection>,
    },
    UserJoined {
        user_id: String,
        username: String,
    },
    UserLeft {
        user_id: String,
        username: String,
    },
    Pong {},
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<&'static str>,
    },
}

impl ServerFrame {
    pub fn error(err: &crate::error::Error) -> Self {
        ServerFrame::Error {
            message: err.to_string(),
            code: err.wire_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_roundtrips_through_json() {
        let raw = r#"{"type":"operation","operation":{"type":"insert","content":"hi","position":0,"client_version":3}}"#;
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        match frame {
            ClientFrame::Operation { operation } => {
                assert_eq!(operation.position, 0);
                assert_eq!(operation.base_version, Some(3));
            }
            _ => panic!("expected operation frame"),
        }
    }

    #[test]
    fn operation_frame_omits_client_version_and_delete_content() {
        let raw = r#"{"type":"operation","operation":{"type":"delete","position":2,"length":3}}"#;
        let frame: ClientFrame = serde_json::from_str(raw).unwrap();
        match frame {
            ClientFrame::Operation { operation } => {
                assert_eq!(operation.base_version, None);
                match operation.kind {
                    crate::algebra::OperationKind::Delete { length, content } => {
                        assert_eq!(length, 3);
                        assert!(content.is_empty());
                    }
                    other => panic!("expected delete, got {other:?}"),
                }
            }
            _ => panic!("expected operation frame"),
        }
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let raw = r#"{"type":"not_a_real_type"}"#;
        let result: Result<ClientFrame, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn server_frame_serializes_tagged() {
        let frame = ServerFrame::Pong {};
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
