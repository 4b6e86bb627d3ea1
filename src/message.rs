//! Chat data model: messages, participants, connection status.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Peer identifiers are opaque strings (UUIDs in practice).
pub type PeerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    /// Typed by the local user.
    User,
    /// Anyone else: a remote peer or the bot persona.
    Stranger,
    System,
}

/// One line in the in-memory transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: SenderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_encrypted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_streaming: bool,
}

impl Message {
    pub fn new(text: impl Into<String>, sender: SenderType, username: Option<String>) -> Self {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            username,
            timestamp: now_ms(),
            is_encrypted: sender == SenderType::Stranger,
            is_streaming: false,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Message::new(text, SenderType::System, None)
    }

    /// An empty message that will be filled by streamed chunks.
    pub fn streaming(username: impl Into<String>) -> Self {
        let mut m = Message::new(String::new(), SenderType::Stranger, Some(username.into()));
        m.is_streaming = true;
        m
    }

    /// Append a streamed chunk. Finalized messages are immutable, so this is a
    /// no-op once [`finish`](Self::finish) has been called.
    pub fn append(&mut self, chunk: &str) {
        if self.is_streaming {
            self.text.push_str(chunk);
        }
    }

    /// Mark a streaming message complete, replacing its text with the
    /// authoritative final version.
    pub fn finish(&mut self, final_text: &str) {
        if self.is_streaming {
            self.text = final_text.to_string();
            self.is_streaming = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub peer_id: PeerId,
    pub username: String,
    pub is_host: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Searching,
    WaitingForPeer,
    Connected,
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Searching => "searching",
            ConnectionStatus::WaitingForPeer => "waiting for peer",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Current Unix epoch in milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_plausible_epoch() {
        assert!(now_ms() > 1_704_067_200_000, "now_ms() appears to predate 2024");
    }

    #[test]
    fn test_message_ids_unique() {
        let a = Message::system("a");
        let b = Message::system("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_stranger_messages_marked_encrypted() {
        let m = Message::new("hey", SenderType::Stranger, Some("bob".into()));
        assert!(m.is_encrypted);
        let u = Message::new("hey", SenderType::User, None);
        assert!(!u.is_encrypted);
    }

    #[test]
    fn test_streaming_append_then_finish() {
        let mut m = Message::streaming("Lala");
        m.append("Oye ");
        m.append("yaara");
        assert_eq!(m.text, "Oye yaara");
        assert!(m.is_streaming);
        m.finish("Oye yaara!");
        assert_eq!(m.text, "Oye yaara!");
        assert!(!m.is_streaming);
    }

    #[test]
    fn test_finalized_message_is_immutable() {
        let mut m = Message::new("done", SenderType::Stranger, None);
        m.append(" more");
        m.finish("changed");
        assert_eq!(m.text, "done");
    }

    #[test]
    fn test_message_serializes_camel_case() {
        let mut m = Message::streaming("Lala");
        m.append("x");
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"isStreaming\":true"));
        assert!(json.contains("\"sender\":\"STRANGER\""));
        assert!(json.contains("\"username\":\"Lala\""));
    }

    #[test]
    fn test_system_message_omits_optional_fields() {
        let json = serde_json::to_string(&Message::system("hi")).unwrap();
        assert!(!json.contains("username"));
        assert!(!json.contains("isStreaming"));
        assert!(!json.contains("isEncrypted"));
    }

    #[test]
    fn test_participant_roundtrip_camel_case() {
        let p = Participant {
            peer_id: "abc".into(),
            username: "Ali".into(),
            is_host: true,
        };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"peerId\":\"abc\""));
        assert!(json.contains("\"isHost\":true"));
        let back: Participant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::WaitingForPeer.to_string(), "waiting for peer");
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Idle);
    }
}
