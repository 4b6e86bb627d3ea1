//! Terminal rendering of node events.
//!
//! [`View`] keeps the little state the terminal needs (participants, invite,
//! persona) and turns each [`NodeEvent`] into zero or more printable lines.

use colored::*;

use crate::message::{ConnectionStatus, Message, Participant, SenderType};
use crate::node::NodeEvent;
use crate::persona::{Language, Mood, COMMANDS};
use crate::prefs::Preferences;

const BELL: &str = "\x07";

#[derive(Debug, Clone)]
pub struct View {
    username: String,
    mood: Mood,
    language: Language,
    sfx_enabled: bool,
    status: ConnectionStatus,
    participants: Vec<Participant>,
    invite: Option<String>,
    typing: Option<String>,
}

impl View {
    pub fn new(prefs: &Preferences) -> Self {
        View {
            username: prefs.username.clone(),
            mood: prefs.mood,
            language: prefs.language,
            sfx_enabled: prefs.sfx_enabled,
            status: ConnectionStatus::Idle,
            participants: Vec::new(),
            invite: None,
            typing: None,
        }
    }

    pub fn set_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    pub fn toggle_sfx(&mut self) -> bool {
        self.sfx_enabled = !self.sfx_enabled;
        self.sfx_enabled
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn invite(&self) -> Option<&str> {
        self.invite.as_deref()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn header(&self) -> Vec<String> {
        vec![
            "WHISPERLINK".bright_cyan().bold().to_string(),
            format!("{}: {}", "User".bright_yellow(), self.username.bright_white()),
            format!(
                "{}: {} {}",
                "Persona".bright_yellow(),
                self.mood.persona_name().bright_magenta(),
                self.language
            ),
            "=".repeat(50).bright_blue().to_string(),
        ]
    }

    pub fn help(&self) -> Vec<String> {
        let mut lines = vec!["Local commands:".bright_green().to_string()];
        for (cmd, desc) in [
            ("/nick <name>", "change your username"),
            ("/mood [funny|sad]", "switch or toggle the persona mood"),
            ("/lang <language>", "set the persona language"),
            ("/invite", "show the room invite"),
            ("/who", "list participants"),
            ("/sfx", "toggle the message bell"),
            ("/disconnect", "leave the session"),
            ("/reconnect", "connect again in the last mode"),
            ("/quit", "exit"),
        ] {
            lines.push(format!("  {:<20} {}", cmd.bright_white(), desc));
        }
        lines.push("Persona commands (sent to the room):".bright_green().to_string());
        for (cmd, desc) in COMMANDS {
            lines.push(format!("  {:<20} {}", cmd.bright_white(), desc));
        }
        lines
    }

    pub fn who(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} {}",
            "Participants:".bright_yellow(),
            self.participants.len()
        )];
        for p in &self.participants {
            let tag = if p.is_host { " (host)" } else { "" };
            lines.push(format!("  • {}{}", p.username, tag.bright_black()));
        }
        lines
    }

    /// Lines to print for `event`.
    pub fn apply(&mut self, event: &NodeEvent) -> Vec<String> {
        match event {
            NodeEvent::Message(msg) => {
                if msg.is_streaming {
                    return Vec::new();
                }
                self.render_with_bell(msg)
            }
            NodeEvent::MessageUpdated(msg) => {
                if msg.is_streaming {
                    return Vec::new();
                }
                self.typing = None;
                self.render_with_bell(msg)
            }
            NodeEvent::Status(status) => {
                self.status = *status;
                vec![format!("── {} ──", status).bright_blue().to_string()]
            }
            NodeEvent::Typing { username, active } => {
                if !*active {
                    self.typing = None;
                    return Vec::new();
                }
                let who = username.clone().unwrap_or_else(|| "Someone".to_string());
                if self.typing.as_deref() == Some(who.as_str()) {
                    return Vec::new();
                }
                self.typing = Some(who.clone());
                vec![format!("{} is typing...", who).bright_black().italic().to_string()]
            }
            NodeEvent::Participants(list) => {
                let changed = list.len() != self.participants.len();
                self.participants = list.clone();
                if changed && list.len() > 1 {
                    vec![format!("👥 {} in room", list.len()).bright_black().to_string()]
                } else {
                    Vec::new()
                }
            }
            NodeEvent::Invite(url) => {
                self.invite = Some(url.clone());
                vec![format!("{} {}", "Share this invite:".bright_green(), url.bright_white().bold())]
            }
            NodeEvent::Persona { mood, language } => {
                self.mood = *mood;
                self.language = *language;
                vec![format!(
                    "{} {} {}",
                    "Persona:".bright_yellow(),
                    mood.persona_name().bright_magenta(),
                    language
                )]
            }
        }
    }

    fn render_with_bell(&self, msg: &Message) -> Vec<String> {
        let mut line = self.format_message(msg);
        if self.sfx_enabled && msg.sender == SenderType::Stranger {
            line.push_str(BELL);
        }
        vec![line]
    }

    pub fn format_message(&self, msg: &Message) -> String {
        let time = clock(msg.timestamp).bright_black();
        match msg.sender {
            SenderType::System => format!("{} {}", time, msg.text.yellow()),
            SenderType::User => {
                let name = msg.username.as_deref().unwrap_or(&self.username);
                format!("{} {}: {}", time, name.bright_green().bold(), msg.text)
            }
            SenderType::Stranger => {
                let name = msg.username.as_deref().unwrap_or("Stranger");
                let is_bot = name == Mood::Funny.persona_name() || name == Mood::Sad.persona_name();
                let name = if is_bot {
                    name.bright_magenta().bold()
                } else {
                    name.bright_cyan().bold()
                };
                format!("{} {}: {}", time, name, msg.text)
            }
        }
    }
}

/// `HH:MM` (UTC) for an epoch-millisecond timestamp.
fn clock(ts_ms: u64) -> String {
    let secs = (ts_ms / 1000) % 86_400;
    format!("[{:02}:{:02}]", secs / 3600, (secs % 3600) / 60)
}
