//! End-to-end tests: real host and guest nodes talking over loopback sockets,
//! with a scripted backend standing in for the LLM.

use std::time::Duration;
use whisperlink::llm::ScriptedBackend;
use whisperlink::node::{self, Command, Mode, NodeConfig, NodeEvent, NodeHandle};
use whisperlink::persona::{Language, Mood};
use whisperlink::scheduler::SchedulerConfig;
use whisperlink::{ConnectionStatus, Message, SenderType};

fn config(username: &str) -> NodeConfig {
    NodeConfig {
        username: username.into(),
        mood: Mood::Funny,
        language: Language::English,
        bind: "127.0.0.1:0".into(),
        public_url: None,
        scheduler: SchedulerConfig {
            cooldown: Duration::from_secs(20),
            random_chance: 0.0,
            inactivity: None,
            periodic: None,
            typing_delay_min: Duration::ZERO,
            typing_delay_jitter: Duration::ZERO,
            extra_keywords: vec![],
        },
        typing_indicator: Duration::from_millis(100),
        temperature: 1.0,
        max_history: 10,
    }
}

async fn wait_for<T>(handle: &mut NodeHandle, mut pick: impl FnMut(&NodeEvent) -> Option<T>) -> T {
    loop {
        let ev = tokio::time::timeout(Duration::from_secs(5), handle.events.recv())
            .await
            .expect("timed out waiting for node event")
            .expect("node stopped");
        if let Some(found) = pick(&ev) {
            return found;
        }
    }
}

/// Everything the node emits until it has been quiet for `quiet`.
async fn drain(handle: &mut NodeHandle, quiet: Duration) -> Vec<NodeEvent> {
    let mut out = Vec::new();
    while let Ok(Some(ev)) = tokio::time::timeout(quiet, handle.events.recv()).await {
        out.push(ev);
    }
    out
}

async fn open_room(handle: &mut NodeHandle) -> String {
    handle.send(Command::Connect(Mode::Host));
    wait_for(handle, |ev| match ev {
        NodeEvent::Invite(url) => Some(url.clone()),
        _ => None,
    })
    .await
}

async fn wait_participants(handle: &mut NodeHandle, n: usize) {
    wait_for(handle, |ev| match ev {
        NodeEvent::Participants(p) if p.len() == n => Some(()),
        _ => None,
    })
    .await
}

fn bot_message(ev: &NodeEvent) -> Option<Message> {
    match ev {
        NodeEvent::Message(m)
            if m.sender == SenderType::Stranger && m.username.as_deref() == Some("Lala") =>
        {
            Some(m.clone())
        }
        _ => None,
    }
}

fn final_reply(ev: &NodeEvent) -> Option<Message> {
    match ev {
        NodeEvent::MessageUpdated(m) if !m.is_streaming => Some(m.clone()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Bot turns across the room
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_guest_mention_gets_exactly_one_bot_reply() {
    let backend = ScriptedBackend::new("fallback");
    backend.push_reply("Oye Sara!");
    let mut host = node::spawn(config("Ali"), Some(backend.clone()));
    let invite = open_room(&mut host).await;

    let mut guest = node::spawn::<ScriptedBackend>(config("Sara"), None);
    guest.send(Command::Connect(Mode::Guest { invite }));
    wait_participants(&mut host, 2).await;
    wait_participants(&mut guest, 2).await;

    guest.send(Command::Send("hello bot".into()));

    let on_guest = wait_for(&mut guest, bot_message).await;
    assert_eq!(on_guest.text, "Oye Sara!");
    let on_host = wait_for(&mut host, final_reply).await;
    assert_eq!(on_host.text, "Oye Sara!");
    assert_eq!(on_host.username.as_deref(), Some("Lala"));

    let quiet = Duration::from_millis(300);
    assert!(drain(&mut guest, quiet).await.iter().all(|ev| bot_message(ev).is_none()));
    assert!(drain(&mut host, quiet).await.iter().all(|ev| final_reply(ev).is_none()));
    assert_eq!(backend.prompts(), vec!["Sara: hello bot".to_string()]);
}

#[tokio::test]
async fn test_host_message_reaches_guest_and_triggers_bot() {
    let backend = ScriptedBackend::new("kya hua");
    let mut host = node::spawn(config("Ali"), Some(backend.clone()));
    let invite = open_room(&mut host).await;
    let mut guest = node::spawn::<ScriptedBackend>(config("Sara"), None);
    guest.send(Command::Connect(Mode::Guest { invite }));
    wait_participants(&mut host, 2).await;
    wait_participants(&mut guest, 2).await;

    host.send(Command::Send("/topic".into()));
    let relayed = wait_for(&mut guest, |ev| match ev {
        NodeEvent::Message(m) if m.username.as_deref() == Some("Ali") => Some(m.clone()),
        _ => None,
    })
    .await;
    assert_eq!(relayed.text, "/topic");
    assert_eq!(relayed.sender, SenderType::Stranger);

    let reply = wait_for(&mut guest, bot_message).await;
    assert_eq!(reply.text, "kya hua");
    assert_eq!(backend.prompts(), vec!["Ali: /topic".to_string()]);
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_guest_message_relayed_to_other_guests_only() {
    let mut host = node::spawn::<ScriptedBackend>(config("Ali"), None);
    let invite = open_room(&mut host).await;

    let mut sara = node::spawn::<ScriptedBackend>(config("Sara"), None);
    sara.send(Command::Connect(Mode::Guest {
        invite: invite.clone(),
    }));
    wait_participants(&mut host, 2).await;
    let mut omar = node::spawn::<ScriptedBackend>(config("Omar"), None);
    omar.send(Command::Connect(Mode::Guest { invite }));
    wait_participants(&mut host, 3).await;
    wait_participants(&mut sara, 3).await;
    wait_participants(&mut omar, 3).await;

    sara.send(Command::Send("the weather is nice".into()));

    let seen = wait_for(&mut omar, |ev| match ev {
        NodeEvent::Message(m) if m.sender == SenderType::Stranger => Some(m.clone()),
        _ => None,
    })
    .await;
    assert_eq!(seen.text, "the weather is nice");
    assert_eq!(seen.username.as_deref(), Some("Sara"));

    let at_host = wait_for(&mut host, |ev| match ev {
        NodeEvent::Message(m) if m.sender == SenderType::Stranger => Some(m.clone()),
        _ => None,
    })
    .await;
    assert_eq!(at_host.text, "the weather is nice");

    let echoed = drain(&mut sara, Duration::from_millis(300)).await;
    assert!(echoed.iter().all(|ev| !matches!(
        ev,
        NodeEvent::Message(m) if m.sender == SenderType::Stranger
    )));
}

#[tokio::test]
async fn test_guest_follows_host_mood() {
    let mut host = node::spawn::<ScriptedBackend>(config("Ali"), None);
    let invite = open_room(&mut host).await;
    let mut guest = node::spawn::<ScriptedBackend>(config("Sara"), None);
    guest.send(Command::Connect(Mode::Guest { invite }));
    wait_participants(&mut guest, 2).await;

    host.send(Command::SetMood(Mood::Sad));
    let mood = wait_for(&mut guest, |ev| match ev {
        NodeEvent::Persona { mood: Mood::Sad, .. } => Some(Mood::Sad),
        _ => None,
    })
    .await;
    assert_eq!(mood, Mood::Sad);

    guest.send(Command::SetMood(Mood::Funny));
    let refusal = wait_for(&mut guest, |ev| match ev {
        NodeEvent::Message(m) if m.sender == SenderType::System => Some(m.text.clone()),
        _ => None,
    })
    .await;
    assert!(refusal.contains("Only the host"));
}

// ---------------------------------------------------------------------------
// Disconnects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_host_leaving_disconnects_guest() {
    let mut host = node::spawn::<ScriptedBackend>(config("Ali"), None);
    let invite = open_room(&mut host).await;
    let mut guest = node::spawn::<ScriptedBackend>(config("Sara"), None);
    guest.send(Command::Connect(Mode::Guest { invite }));
    wait_participants(&mut guest, 2).await;

    host.send(Command::Disconnect);
    wait_for(&mut guest, |ev| match ev {
        NodeEvent::Status(ConnectionStatus::Disconnected) => Some(()),
        _ => None,
    })
    .await;

    // the room is gone, so reconnecting fails and the list holds only us
    guest.send(Command::Reconnect);
    let seeded = wait_for(&mut guest, |ev| match ev {
        NodeEvent::Participants(p) => Some(p.clone()),
        _ => None,
    })
    .await;
    assert_eq!(seeded.len(), 1);
    assert_eq!(seeded[0].username, "Sara");
    wait_for(&mut guest, |ev| match ev {
        NodeEvent::Status(ConnectionStatus::Disconnected) => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_guest_leaving_returns_host_to_waiting() {
    let mut host = node::spawn::<ScriptedBackend>(config("Ali"), None);
    let invite = open_room(&mut host).await;
    let mut guest = node::spawn::<ScriptedBackend>(config("Sara"), None);
    guest.send(Command::Connect(Mode::Guest { invite }));
    wait_participants(&mut host, 2).await;

    guest.send(Command::Quit);
    guest.join.await.unwrap();

    wait_participants(&mut host, 1).await;
    wait_for(&mut host, |ev| match ev {
        NodeEvent::Status(ConnectionStatus::WaitingForPeer) => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_unknown_room_is_rejected() {
    let mut host = node::spawn::<ScriptedBackend>(config("Ali"), None);
    let invite = open_room(&mut host).await;
    let base = invite.split("?join=").next().unwrap().to_string();

    let mut guest = node::spawn::<ScriptedBackend>(config("Sara"), None);
    guest.send(Command::Connect(Mode::Guest {
        invite: format!("{}?join=no-such-room", base),
    }));
    let error = wait_for(&mut guest, |ev| match ev {
        NodeEvent::Message(m) if m.sender == SenderType::System && m.text.starts_with("ERROR") => {
            Some(m.text.clone())
        }
        _ => None,
    })
    .await;
    assert!(!error.is_empty());
    wait_for(&mut guest, |ev| match ev {
        NodeEvent::Status(ConnectionStatus::Disconnected) => Some(()),
        _ => None,
    })
    .await;
}
