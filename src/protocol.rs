//! Peer payloads exchanged over the data channel.
//!
//! Every frame is a JSON text frame carrying one [`Payload`], discriminated by
//! its `type` field.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Participant;
use crate::persona::{Language, Mood};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// First frame a guest sends after the channel opens.
    Handshake { user: Participant },
    /// Host → everyone: the full participant list, replacing the old one.
    SyncParticipants { participants: Vec<Participant> },
    Message {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    Typing {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    /// Host → guests: the persona mood changed (sent on join and on toggle).
    MoodUpdate {
        mood: Mood,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<Language>,
    },
    /// Host → guests: language or combined settings changed.
    SysUpdate {
        mood: Mood,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<Language>,
    },
    /// Host → guest just before closing a rejected connection.
    Error { message: String },
}

impl Payload {
    pub fn message(text: impl Into<String>, username: impl Into<String>) -> Payload {
        Payload::Message {
            text: text.into(),
            username: Some(username.into()),
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Payload> {
        Ok(serde_json::from_str(text)?)
    }

    /// Payloads the host forwards to every other guest.
    pub fn is_relayable(&self) -> bool {
        matches!(self, Payload::Message { .. } | Payload::Typing { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Payload::Handshake { .. } => "handshake",
            Payload::SyncParticipants { .. } => "sync_participants",
            Payload::Message { .. } => "message",
            Payload::Typing { .. } => "typing",
            Payload::MoodUpdate { .. } => "mood_update",
            Payload::SysUpdate { .. } => "sys_update",
            Payload::Error { .. } => "error",
        }
    }
}
