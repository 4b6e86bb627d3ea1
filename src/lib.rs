//! WhisperLink: an anonymous group chat with a scripted LLM persona.
//!
//! One node hosts a room and relays every payload to the other guests (a
//! star topology over WebSockets). The host also runs the persona: a turn
//! scheduler decides when the bot speaks and a [`llm::PersonaClient`] writes
//! what it says.
//!
//! The [`node`] module wires everything together; the rest are the parts it
//! owns.

pub mod cli;
pub mod config;
pub mod error;
pub mod invite;
pub mod llm;
pub mod message;
pub mod node;
pub mod persona;
pub mod prefs;
pub mod protocol;
pub mod providers;
pub mod room;
pub mod scheduler;
pub mod transport;
pub mod view;

pub use error::{ChatError, ErrorKind, Result};
pub use message::{ConnectionStatus, Message, Participant, PeerId, SenderType};
pub use node::{Command, Mode, NodeConfig, NodeEvent, NodeHandle};
pub use persona::{Language, Mood};
pub use protocol::Payload;
