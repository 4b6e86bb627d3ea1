//! Crate-level error type.
//!
//! Errors fall into three coarse buckets (see [`ErrorKind`]): anything that
//! went wrong talking to a peer, anything that went wrong generating a bot
//! reply, and local problems (config, preferences, bad input).

use thiserror::Error;

/// Coarse classification used by callers to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Peer unreachable, socket dropped, handshake failed.
    Transport,
    /// The LLM backend failed or returned garbage.
    Generation,
    /// Configuration, filesystem, or user input.
    Local,
}

#[derive(Debug, Error)]
pub enum ChatError {
    /// The invite pointed at a room that does not exist or whose host is gone.
    #[error("room not found or host is offline: {0}")]
    PeerUnavailable(String),

    #[error("connection error: {0}")]
    Transport(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} not set. Export it or pass via environment.")]
    MissingApiKey(&'static str),

    #[error("invalid invite '{0}'")]
    InvalidInvite(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::PeerUnavailable(_) | ChatError::Transport(_) | ChatError::WebSocket(_) => {
                ErrorKind::Transport
            }
            ChatError::Generation(_) | ChatError::Http(_) => ErrorKind::Generation,
            ChatError::MissingApiKey(_)
            | ChatError::InvalidInvite(_)
            | ChatError::Config(_)
            | ChatError::Io(_)
            | ChatError::Json(_) => ErrorKind::Local,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

impl From<toml::de::Error> for ChatError {
    fn from(e: toml::de::Error) -> Self {
        ChatError::Config(e.to_string())
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_unavailable_is_transport() {
        let e = ChatError::PeerUnavailable("abc".into());
        assert_eq!(e.kind(), ErrorKind::Transport);
        assert!(e.is_transport());
    }

    #[test]
    fn test_generation_is_not_transport() {
        let e = ChatError::Generation("empty candidates".into());
        assert_eq!(e.kind(), ErrorKind::Generation);
        assert!(!e.is_transport());
    }

    #[test]
    fn test_missing_api_key_message_names_variable() {
        let e = ChatError::MissingApiKey("GEMINI_API_KEY");
        assert!(e.to_string().contains("GEMINI_API_KEY"));
        assert_eq!(e.kind(), ErrorKind::Local);
    }

    #[test]
    fn test_io_error_converts_and_is_local() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: ChatError = io.into();
        assert_eq!(e.kind(), ErrorKind::Local);
    }

    #[test]
    fn test_toml_error_converts_to_config() {
        let err = toml::from_str::<toml::Value>("not = = toml").unwrap_err();
        let e: ChatError = err.into();
        assert!(matches!(e, ChatError::Config(_)));
    }

    #[test]
    fn test_peer_unavailable_display_mentions_offline() {
        let e = ChatError::PeerUnavailable("XYZ".into());
        let s = e.to_string();
        assert!(s.contains("offline"));
        assert!(s.contains("XYZ"));
    }
}
