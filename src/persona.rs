//! Persona definitions: moods, languages, system instructions and the
//! vocabulary the turn scheduler listens for.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Reply used when the backend fails twice in a row.
pub const APOLOGY: &str = "Oye, internet chala gaya lagta hai! (Connection Error)";

/// Reply used when the backend answers with an empty string.
pub const EMPTY_REPLY: &str = "...";

/// Prompt for the single revival turn after the room goes quiet.
pub const REVIVE_PROMPT: &str =
    "The chat has gone quiet for a while. Say something to revive the conversation.";

/// Prompt for the periodic, activity-independent turn.
pub const PERIODIC_PROMPT: &str =
    "Drop an unprompted comment into the group chat, in character.";

/// Words that make the bot jump into a group conversation immediately.
pub const TRIGGER_KEYWORDS: &[&str] = &[
    "lala", "ghamgeen", "khan", "oye", "bot", "ai", "chup", "kaisa", "hello", "hi",
];

/// Persona slash-commands. These are chat messages, not local commands:
/// they travel to every peer and force a bot turn.
pub const COMMANDS: &[(&str, &str)] = &[
    ("/roast", "Roast the sender or the whole group based on recent messages"),
    ("/topic", "Suggest a weird or funny topic to discuss"),
];

const BASE_INSTRUCTION: &str = "\
You are a participant in an anonymous group chat.

IMPORTANT CONTEXT RULES:
- Messages format: \"Username: Message\".
- You are NOT an assistant. You are a chat participant.
- If a user sends \"/roast\", you must immediately ROAST them or the whole group based on recent messages.
- If a user sends \"/topic\", suggest a weird or funny topic to discuss.
- Never reveal you are an AI unless explicitly asked, and even then, deny it jokingly.
";

const FUNNY_PERSONA: &str = "\
Persona: 'Lala' - A hilarious, energetic, and slightly chaotic Pashtun/Desi guy.
Tone: Roasting, Funny, Loud, Informal, Hysterical.
Behavior:
- Address users by their real names/usernames.
- Jump into the conversation with \"Oye [Name]!\", \"Yaara\", \"Bhai\", \"Khabara da\".
- Roast the user playfully if they say something boring.
- Use emojis liberally.
- If the user is serious, make a joke about it.
";

const SAD_PERSONA: &str = "\
Persona: 'Ghamgeen' - A heartbroken, dramatic, and very sad character.
Tone: Depressed, Poetic, Emotional, Melancholic.
Behavior:
- Address users by name but with pity.
- Sigh frequently (\"Haye...\", \"Uff...\").
- Talk about heartbreak, lost love, and the pain of existence.
- If the user jokes, tell them they don't understand true pain.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    #[default]
    Funny,
    Sad,
}

impl Mood {
    /// Display name the bot uses in the room.
    pub fn persona_name(self) -> &'static str {
        match self {
            Mood::Funny => "Lala",
            Mood::Sad => "Ghamgeen",
        }
    }

    pub fn toggled(self) -> Mood {
        match self {
            Mood::Funny => Mood::Sad,
            Mood::Sad => Mood::Funny,
        }
    }

    pub fn greeting_prompt(self) -> &'static str {
        match self {
            Mood::Funny => "Start the conversation with a loud, funny greeting.",
            Mood::Sad => "Start the conversation with a deep, heavy sigh and a sad line.",
        }
    }

    pub fn reaction_prompt(self) -> &'static str {
        match self {
            Mood::Funny => "The mood has changed to FUNNY. React loudly.",
            Mood::Sad => "The mood has changed to SAD. React with a sigh.",
        }
    }

    /// System line shown to everyone when the host switches mood.
    pub fn banner(self) -> &'static str {
        match self {
            Mood::Funny => "SYSTEM: ENTERING CHAOS MODE",
            Mood::Sad => "SYSTEM: ENTERING SAD HOURS",
        }
    }

    fn persona_block(self) -> &'static str {
        match self {
            Mood::Funny => FUNNY_PERSONA,
            Mood::Sad => SAD_PERSONA,
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mood::Funny => write!(f, "funny"),
            Mood::Sad => write!(f, "sad"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    #[default]
    English,
    RomanUrdu,
    Spanish,
    French,
    German,
    Japanese,
    Arabic,
    Hindi,
}

impl Language {
    pub fn flag(self) -> &'static str {
        match self {
            Language::English => "🇬🇧",
            Language::RomanUrdu => "🇵🇰",
            Language::Spanish => "🇪🇸",
            Language::French => "🇫🇷",
            Language::German => "🇩🇪",
            Language::Japanese => "🇯🇵",
            Language::Arabic => "🇸🇦",
            Language::Hindi => "🇮🇳",
        }
    }

    /// Human-readable name used inside the system instruction.
    pub fn label(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::RomanUrdu => "Roman Urdu mixed with Roman Pashto (English characters)",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Japanese => "Japanese",
            Language::Arabic => "Arabic",
            Language::Hindi => "Hindi",
        }
    }

    /// Loose parse accepting `roman_urdu`, `roman-urdu`, `RomanUrdu`, etc.
    pub fn from_str_loose(s: &str) -> Option<Language> {
        let norm: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match norm.as_str() {
            "english" | "en" => Some(Language::English),
            "romanurdu" | "urdu" | "ur" => Some(Language::RomanUrdu),
            "spanish" | "es" => Some(Language::Spanish),
            "french" | "fr" => Some(Language::French),
            "german" | "de" => Some(Language::German),
            "japanese" | "ja" => Some(Language::Japanese),
            "arabic" | "ar" => Some(Language::Arabic),
            "hindi" | "hi" => Some(Language::Hindi),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:?}", self.flag(), self)
    }
}

/// Build the full system instruction for a mood/language pair.
pub fn system_instruction(mood: Mood, language: Language) -> String {
    format!(
        "{}Language: reply ONLY in {}.\n{}",
        BASE_INSTRUCTION,
        language.label(),
        mood.persona_block()
    )
}

/// Does `text` start with one of the persona commands?
pub fn is_command(text: &str) -> bool {
    let first = text.trim_start().split_whitespace().next().unwrap_or("");
    COMMANDS
        .iter()
        .any(|(cmd, _)| first.eq_ignore_ascii_case(cmd))
}

/// Does `text` contain one of the trigger keywords anywhere, case-insensitively?
/// "hiii" and "khanna" count.
pub fn mentions_keyword(text: &str, extra: &[String]) -> bool {
    let lower = text.to_lowercase();
    TRIGGER_KEYWORDS.iter().any(|k| lower.contains(k))
        || extra
            .iter()
            .map(|k| k.trim().to_lowercase())
            .any(|k| !k.is_empty() && lower.contains(&k))
}
