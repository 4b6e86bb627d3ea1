use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::Config;
use crate::node::Mode;
use crate::persona::{Language, Mood};
use crate::prefs::Preferences;
use crate::providers::Provider;

#[derive(Parser, Debug)]
#[command(name = "whisperlink")]
#[command(version)]
#[command(about = "Anonymous group chat with a scripted LLM persona, relayed peer to peer")]
pub struct Args {
    /// Path to a TOML config file (defaults to ./whisperlink.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Username shown to other participants
    #[arg(long, short, global = true)]
    pub username: Option<String>,

    /// Persona mood
    #[arg(long, value_enum, global = true)]
    pub mood: Option<Mood>,

    /// Persona reply language
    #[arg(long, value_enum, global = true)]
    pub lang: Option<Language>,

    /// LLM provider: gemini, openai or anthropic
    #[arg(long, value_enum, global = true)]
    pub provider: Option<Provider>,

    /// Model name (provider default when omitted)
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Chat one-on-one with the persona (default)
    Solo,
    /// Create a room and print an invite
    Host {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
        /// Base URL put in the invite
        #[arg(long)]
        public_url: Option<String>,
    },
    /// Join a room from an invite URL
    Join {
        /// Invite URL (`http://host:port/?join=<id>`) or `ws://host:port/ws/<id>`
        invite: String,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Args {
    /// Fold flag overrides into the loaded config and preferences.
    pub fn apply(&self, config: &mut Config, prefs: &mut Preferences) {
        if let Some(name) = &self.username {
            prefs.username = name.trim().to_string();
        }
        if let Some(mood) = self.mood {
            prefs.mood = mood;
        }
        if let Some(lang) = self.lang {
            prefs.language = lang;
        }
        if let Some(provider) = self.provider {
            config.llm.provider = provider;
        }
        if let Some(model) = &self.model {
            config.llm.model = Some(model.clone());
        }
        if let Some(Commands::Host { bind, public_url }) = &self.command {
            if let Some(bind) = bind {
                config.server.bind = bind.clone();
            }
            if let Some(url) = public_url {
                config.server.public_url = Some(url.clone());
            }
        }
    }

    /// Session mode for the chosen subcommand.
    pub fn mode(&self) -> Option<Mode> {
        match &self.command {
            None | Some(Commands::Solo) => Some(Mode::Solo),
            Some(Commands::Host { .. }) => Some(Mode::Host),
            Some(Commands::Join { invite }) => Some(Mode::Guest {
                invite: invite.clone(),
            }),
            Some(Commands::Completions { .. }) => None,
        }
    }

    /// Whether this session's mood and language are ours to keep. A guest
    /// follows the host's persona, so its changes are not saved.
    pub fn owns_persona(&self) -> bool {
        !matches!(self.command, Some(Commands::Join { .. }))
    }
}

/// Commands handled by the terminal itself, never sent to the room.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalCommand {
    Nick(String),
    /// `None` toggles.
    Mood(Option<Mood>),
    Lang(Language),
    Invite,
    Who,
    Sfx,
    Disconnect,
    Reconnect,
    Quit,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Empty,
    Chat(String),
    Local(LocalCommand),
    /// A recognised local command with bad arguments; carries a usage hint.
    Invalid(String),
}

/// Classify one line typed by the user. Anything that isn't a local command,
/// including persona commands like `/roast`, is chat.
pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or("").to_ascii_lowercase();
    let arg = parts.next().unwrap_or("").trim();

    let cmd = match head.as_str() {
        "/nick" => {
            if arg.is_empty() {
                return Input::Invalid("usage: /nick <name>".into());
            }
            LocalCommand::Nick(arg.to_string())
        }
        "/mood" => match arg.to_ascii_lowercase().as_str() {
            "" => LocalCommand::Mood(None),
            "funny" => LocalCommand::Mood(Some(Mood::Funny)),
            "sad" => LocalCommand::Mood(Some(Mood::Sad)),
            _ => return Input::Invalid("usage: /mood [funny|sad]".into()),
        },
        "/lang" => match Language::from_str_loose(arg) {
            Some(lang) => LocalCommand::Lang(lang),
            None => {
                return Input::Invalid(
                    "usage: /lang <english|roman-urdu|spanish|french|german|japanese|arabic|hindi>"
                        .into(),
                )
            }
        },
        "/invite" => LocalCommand::Invite,
        "/who" => LocalCommand::Who,
        "/sfx" => LocalCommand::Sfx,
        "/disconnect" => LocalCommand::Disconnect,
        "/reconnect" => LocalCommand::Reconnect,
        "/quit" | "/exit" => LocalCommand::Quit,
        "/help" => LocalCommand::Help,
        _ => return Input::Chat(line.to_string()),
    };
    Input::Local(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_minimal() {
        let args = Args::parse_from(["whisperlink"]);
        assert!(args.command.is_none());
        assert_eq!(args.mode(), Some(Mode::Solo));
        assert!(args.provider.is_none());
    }

    #[test]
    fn test_args_parse_host_with_flags() {
        let args = Args::parse_from([
            "whisperlink",
            "host",
            "--bind",
            "127.0.0.1:9000",
            "--public-url",
            "http://chat.example/",
            "--mood",
            "sad",
            "--provider",
            "anthropic",
        ]);
        assert_eq!(args.mode(), Some(Mode::Host));
        assert_eq!(args.mood, Some(Mood::Sad));
        let mut cfg = Config::default();
        let mut prefs = Preferences::default();
        args.apply(&mut cfg, &mut prefs);
        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.server.public_url.as_deref(), Some("http://chat.example/"));
        assert_eq!(cfg.llm.provider, Provider::Anthropic);
        assert_eq!(prefs.mood, Mood::Sad);
    }

    #[test]
    fn test_args_parse_join() {
        let args = Args::parse_from(["whisperlink", "join", "http://h:7878/?join=abc", "-u", "Sara"]);
        assert_eq!(
            args.mode(),
            Some(Mode::Guest {
                invite: "http://h:7878/?join=abc".into()
            })
        );
        assert_eq!(args.username.as_deref(), Some("Sara"));
    }

    #[test]
    fn test_only_guests_leave_persona_alone() {
        assert!(Args::parse_from(["whisperlink"]).owns_persona());
        assert!(Args::parse_from(["whisperlink", "host"]).owns_persona());
        let guest = Args::parse_from(["whisperlink", "join", "http://h:7878/?join=abc"]);
        assert!(!guest.owns_persona());
    }

    #[test]
    fn test_args_parse_lang_kebab_case() {
        let args = Args::parse_from(["whisperlink", "--lang", "roman-urdu"]);
        assert_eq!(args.lang, Some(Language::RomanUrdu));
    }

    #[test]
    fn test_args_completions_has_no_mode() {
        let args = Args::parse_from(["whisperlink", "completions", "bash"]);
        assert_eq!(args.mode(), None);
    }

    #[test]
    fn test_args_reject_unknown_provider() {
        assert!(Args::try_parse_from(["whisperlink", "--provider", "skynet"]).is_err());
    }

    #[test]
    fn test_parse_input_chat_and_persona_commands() {
        assert_eq!(parse_input("hello"), Input::Chat("hello".into()));
        assert_eq!(parse_input("  /roast Ali "), Input::Chat("/roast Ali".into()));
        assert_eq!(parse_input("/topic"), Input::Chat("/topic".into()));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn test_parse_input_local_commands() {
        assert_eq!(
            parse_input("/nick Khan Sahab"),
            Input::Local(LocalCommand::Nick("Khan Sahab".into()))
        );
        assert_eq!(parse_input("/mood"), Input::Local(LocalCommand::Mood(None)));
        assert_eq!(
            parse_input("/MOOD sad"),
            Input::Local(LocalCommand::Mood(Some(Mood::Sad)))
        );
        assert_eq!(
            parse_input("/lang roman urdu"),
            Input::Local(LocalCommand::Lang(Language::RomanUrdu))
        );
        assert_eq!(parse_input("/who"), Input::Local(LocalCommand::Who));
        assert_eq!(parse_input("/quit"), Input::Local(LocalCommand::Quit));
    }

    #[test]
    fn test_parse_input_invalid_args() {
        assert!(matches!(parse_input("/nick"), Input::Invalid(_)));
        assert!(matches!(parse_input("/mood angry"), Input::Invalid(_)));
        assert!(matches!(parse_input("/lang klingon"), Input::Invalid(_)));
    }
}
