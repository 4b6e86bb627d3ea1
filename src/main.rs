use clap::{CommandFactory, Parser};
use colored::*;
use std::io;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use whisperlink::cli::{parse_input, Args, Commands, Input, LocalCommand};
use whisperlink::config::Config;
use whisperlink::llm::HttpBackend;
use whisperlink::node::{self, Command, NodeConfig, NodeHandle};
use whisperlink::prefs::{Preferences, PrefsStore};
use whisperlink::view::View;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("whisperlink=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

fn persist(store: &PrefsStore, f: impl FnOnce(&mut Preferences)) {
    if let Err(e) = store.update(f) {
        warn!(path = %store.path().display(), error = %e, "cannot save preferences");
    }
}

/// Handle one typed line. Returns `false` when the user asked to quit.
fn handle_line(line: &str, handle: &NodeHandle, view: &mut View, store: &PrefsStore, owns_persona: bool) -> bool {
    match parse_input(line) {
        Input::Empty => {}
        Input::Chat(text) => {
            handle.send(Command::Send(text));
        }
        Input::Invalid(usage) => println!("{}", usage.bright_red()),
        Input::Local(cmd) => match cmd {
            LocalCommand::Nick(name) => {
                view.set_username(name.clone());
                persist(store, |p| p.username = name.clone());
                handle.send(Command::SetUsername(name));
            }
            LocalCommand::Mood(mood) => {
                let mood = mood.unwrap_or_else(|| view.mood().toggled());
                if owns_persona {
                    persist(store, |p| p.mood = mood);
                }
                handle.send(Command::SetMood(mood));
            }
            LocalCommand::Lang(language) => {
                if owns_persona {
                    persist(store, |p| p.language = language);
                }
                handle.send(Command::SetLanguage(language));
            }
            LocalCommand::Invite => match view.invite() {
                Some(url) => println!("{} {}", "Invite:".bright_green(), url.bright_white().bold()),
                None => println!("{}", "No room is open. Start one with `whisperlink host`.".bright_red()),
            },
            LocalCommand::Who => print_lines(view.who()),
            LocalCommand::Sfx => {
                let enabled = view.toggle_sfx();
                persist(store, |p| p.sfx_enabled = enabled);
                println!("Sound effects {}", if enabled { "on" } else { "off" });
            }
            LocalCommand::Disconnect => {
                handle.send(Command::Disconnect);
            }
            LocalCommand::Reconnect => {
                handle.send(Command::Reconnect);
            }
            LocalCommand::Help => print_lines(view.help()),
            LocalCommand::Quit => return false,
        },
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(Commands::Completions { shell }) = &args.command {
        clap_complete::generate(*shell, &mut Args::command(), "whisperlink", &mut io::stdout());
        return Ok(());
    }

    init_tracing();

    let mut config = Config::load(args.config.as_deref())?;
    let store = PrefsStore::default_location();
    let mut prefs = store.load();
    args.apply(&mut config, &mut prefs);
    prefs.username = prefs.username_or_generate();
    if let Err(e) = store.save(&prefs) {
        warn!(path = %store.path().display(), error = %e, "cannot save preferences");
    }

    let backend = match HttpBackend::from_config(&config.llm) {
        Ok(b) => Some(b),
        Err(e) => {
            warn!(error = %e, "bot disabled");
            None
        }
    };

    let mut view = View::new(&prefs);
    print_lines(view.header());
    println!("{}", "Type /help for commands.".bright_black());

    let mut handle = node::spawn(NodeConfig::new(&config, &prefs), backend);
    if let Some(mode) = args.mode() {
        handle.send(Command::Connect(mode));
    }

    let owns_persona = args.owns_persona();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_line(&line, &handle, &mut view, &store, owns_persona) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin closed");
                    break;
                }
            },
            event = handle.events.recv() => match event {
                Some(event) => print_lines(view.apply(&event)),
                None => break,
            },
        }
    }

    handle.send(Command::Quit);
    let _ = handle.join.await;
    Ok(())
}
