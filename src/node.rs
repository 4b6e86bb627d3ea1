//! The chat node: one task that owns everything.
//!
//! A node is solo, host or guest. Its task `select!`s over local commands,
//! transport events, bot-turn updates and the next timer deadline, so every
//! state change (registry, participants, scheduler, transcript) happens in
//! one place. The persona client is moved into the task composing a turn and
//! handed back with the reply; while it is away no second turn can start.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::invite::{invite_url, parse_invite};
use crate::llm::{ChatBackend, PersonaClient};
use crate::message::{ConnectionStatus, Message, Participant, PeerId, SenderType};
use crate::persona::{Language, Mood};
use crate::prefs::Preferences;
use crate::protocol::Payload;
use crate::room::Room;
use crate::scheduler::{Decision, SchedulerConfig, TriggerReason, TurnRequest, TurnScheduler};
use crate::transport::{self, Listener, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Just the local user and the bot.
    Solo,
    /// Open a room and relay for guests.
    Host,
    /// Join a room from an invite URL.
    Guest { invite: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect(Mode),
    /// Connect again in the last mode used.
    Reconnect,
    Send(String),
    Typing,
    SetMood(Mood),
    SetLanguage(Language),
    SetUsername(String),
    Disconnect,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Message(Message),
    /// A streaming message grew or was finalized.
    MessageUpdated(Message),
    Status(ConnectionStatus),
    Typing { username: Option<String>, active: bool },
    Participants(Vec<Participant>),
    Invite(String),
    Persona { mood: Mood, language: Language },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeConfig {
    pub username: String,
    pub mood: Mood,
    pub language: Language,
    pub bind: String,
    /// Invite base URL; derived from the bound address when unset.
    pub public_url: Option<String>,
    pub scheduler: SchedulerConfig,
    pub typing_indicator: Duration,
    pub temperature: f32,
    pub max_history: usize,
}

impl NodeConfig {
    pub fn new(cfg: &Config, prefs: &Preferences) -> Self {
        NodeConfig {
            username: prefs.username_or_generate(),
            mood: prefs.mood,
            language: prefs.language,
            bind: cfg.server.bind.clone(),
            public_url: cfg.server.public_url.clone(),
            scheduler: cfg.turns.scheduler_config(),
            typing_indicator: cfg.turns.typing_indicator(),
            temperature: cfg.llm.temperature,
            max_history: cfg.llm.max_history,
        }
    }
}

enum TurnUpdate<B> {
    Chunk { epoch: u64, text: String },
    Done { epoch: u64, client: PersonaClient<B>, text: String },
}

pub struct NodeHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub events: mpsc::UnboundedReceiver<NodeEvent>,
    pub join: JoinHandle<()>,
}

impl NodeHandle {
    /// Queue a command. `false` once the node has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Start a node on the current runtime. Without a backend the node runs
/// with the bot disabled.
pub fn spawn<B: ChatBackend>(cfg: NodeConfig, backend: Option<B>) -> NodeHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let node = Node::new(cfg, backend, event_tx);
    let join = tokio::spawn(node.run(cmd_rx));
    NodeHandle {
        commands: cmd_tx,
        events: event_rx,
        join,
    }
}

pub struct Node<B> {
    cfg: NodeConfig,
    mode: Option<Mode>,
    last_mode: Option<Mode>,
    status: ConnectionStatus,
    mood: Mood,
    language: Language,
    room: Room,
    scheduler: TurnScheduler,
    client: Option<PersonaClient<B>>,
    has_bot: bool,
    /// Persona changed while the client was out composing.
    reconfigure: bool,
    /// Bumped on every teardown so late turn updates can be discarded.
    epoch: u64,
    composing: Option<String>,
    /// Direct prompts that arrived while a turn was pending or in flight.
    pending_direct: VecDeque<String>,
    transcript: Vec<Message>,
    listener: Option<Listener>,
    typing_until: Option<Instant>,
    rng: StdRng,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    turn_tx: mpsc::UnboundedSender<TurnUpdate<B>>,
    turn_rx: mpsc::UnboundedReceiver<TurnUpdate<B>>,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl<B: ChatBackend> Node<B> {
    pub fn new(cfg: NodeConfig, backend: Option<B>, events: mpsc::UnboundedSender<NodeEvent>) -> Self {
        let has_bot = backend.is_some();
        let client = backend.map(|b| {
            PersonaClient::new(b, cfg.mood, cfg.language).with_limits(cfg.temperature, cfg.max_history)
        });
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (turn_tx, turn_rx) = mpsc::unbounded_channel();
        let local = Participant {
            peer_id: new_peer_id(),
            username: cfg.username.clone(),
            is_host: false,
        };
        Node {
            scheduler: TurnScheduler::new(cfg.scheduler.clone(), Instant::now()),
            mood: cfg.mood,
            language: cfg.language,
            cfg,
            mode: None,
            last_mode: None,
            status: ConnectionStatus::Idle,
            room: Room::new(local),
            client,
            has_bot,
            reconfigure: false,
            epoch: 0,
            composing: None,
            pending_direct: VecDeque::new(),
            transcript: Vec::new(),
            listener: None,
            typing_until: None,
            rng: StdRng::from_entropy(),
            transport_tx,
            transport_rx,
            turn_tx,
            turn_rx,
            events,
        }
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Quit) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                Some(event) = self.transport_rx.recv() => self.handle_transport(event),
                Some(update) = self.turn_rx.recv() => self.handle_turn(update),
                _ = sleep_until(deadline) => self.on_tick(Instant::now()),
            }
        }
        self.teardown();
        debug!("node stopped");
    }

    // -- commands -------------------------------------------------------------

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(mode) => self.connect(mode).await,
            Command::Reconnect => match self.last_mode.clone() {
                Some(mode) => self.connect(mode).await,
                None => self.system("Nothing to reconnect to."),
            },
            Command::Send(text) => self.send_local(text),
            Command::Typing => {
                let payload = Payload::Typing {
                    username: Some(self.room.local().username.clone()),
                };
                self.room.broadcast(&payload, None);
            }
            Command::SetMood(mood) => self.set_mood(mood),
            Command::SetLanguage(language) => self.set_language(language),
            Command::SetUsername(name) => self.set_username(name),
            Command::Disconnect => {
                if self.mode.is_none() {
                    self.system("Not connected.");
                    return;
                }
                self.teardown();
                self.set_status(ConnectionStatus::Disconnected);
                self.system("Disconnected.");
            }
            Command::Quit => {}
        }
    }

    async fn connect(&mut self, mode: Mode) {
        if self.mode.is_some() {
            self.teardown();
        }
        let local = Participant {
            peer_id: new_peer_id(),
            username: self.cfg.username.clone(),
            is_host: mode == Mode::Host,
        };
        self.room = Room::new(local);
        self.scheduler.reset(Instant::now());
        self.last_mode = Some(mode.clone());
        self.emit(NodeEvent::Participants(self.room.participants().to_vec()));

        match mode {
            Mode::Solo => {
                self.mode = Some(Mode::Solo);
                self.set_status(ConnectionStatus::Connected);
                self.system("CONNECTED TO VOID NETWORK");
                if !self.has_bot {
                    self.warn_no_bot();
                    return;
                }
                self.system(format!("{} entered the chat.", self.mood.persona_name()));
                let prompt = self.mood.greeting_prompt();
                self.request_turn(TriggerReason::Direct, prompt.to_string());
            }
            Mode::Host => {
                self.set_status(ConnectionStatus::Searching);
                let host_id = self.room.local().peer_id.clone();
                match transport::listen(&self.cfg.bind, host_id.clone(), self.transport_tx.clone()).await {
                    Ok(listener) => {
                        let base = match &self.cfg.public_url {
                            Some(url) => url.clone(),
                            None => format!("http://{}/", reachable(listener.local_addr())),
                        };
                        let url = invite_url(&base, &host_id);
                        self.listener = Some(listener);
                        self.mode = Some(Mode::Host);
                        self.set_status(ConnectionStatus::WaitingForPeer);
                        self.system(format!("SECURE ROOM CREATED. ID: {}", host_id));
                        self.system(format!("Invite: {}", url));
                        self.system("Waiting for participants...");
                        self.emit(NodeEvent::Invite(url));
                        if !self.has_bot {
                            self.warn_no_bot();
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot open room");
                        self.system(format!("CONNECTION ERROR: {}", e));
                        self.set_status(ConnectionStatus::Disconnected);
                    }
                }
            }
            Mode::Guest { invite } => {
                self.set_status(ConnectionStatus::Searching);
                let parsed = match parse_invite(&invite) {
                    Ok(p) => p,
                    Err(e) => {
                        self.system(format!("ERROR: {}", e));
                        self.set_status(ConnectionStatus::Disconnected);
                        return;
                    }
                };
                self.system("CONNECTING TO SECURE ROOM...");
                let guest_id = self.room.local().peer_id.clone();
                match transport::dial(&parsed, &guest_id, self.transport_tx.clone()).await {
                    Ok(_) => {
                        self.mode = Some(Mode::Guest { invite });
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot join room");
                        self.system(format!("ERROR: {}", e));
                        self.set_status(ConnectionStatus::Disconnected);
                    }
                }
            }
        }
    }

    fn send_local(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        if self.status != ConnectionStatus::Connected && self.mode != Some(Mode::Host) {
            self.system("Not connected. Use /reconnect or start a new session.");
            return;
        }
        let username = self.room.local().username.clone();
        self.push_message(Message::new(text.clone(), SenderType::User, Some(username.clone())));

        match self.mode {
            Some(Mode::Solo) => {
                if self.has_bot {
                    self.request_turn(TriggerReason::Direct, text);
                }
            }
            Some(Mode::Host) => {
                self.room.broadcast(&Payload::message(text.clone(), username.clone()), None);
                self.observe(&username, &text);
            }
            Some(Mode::Guest { .. }) => {
                self.room.broadcast(&Payload::message(text, username), None);
            }
            None => {}
        }
    }

    fn set_mood(&mut self, mood: Mood) {
        if matches!(self.mode, Some(Mode::Guest { .. })) {
            self.system("Only the host can change the mood.");
            return;
        }
        if mood == self.mood {
            return;
        }
        self.mood = mood;
        self.reconfigure_client();
        self.emit(NodeEvent::Persona {
            mood,
            language: self.language,
        });
        if self.mode == Some(Mode::Host) {
            self.room.broadcast(
                &Payload::MoodUpdate {
                    mood,
                    lang: Some(self.language),
                },
                None,
            );
        }
        if self.status == ConnectionStatus::Connected {
            self.system(format!("⚠️ {}", mood.banner()));
            if self.runs_bot() {
                self.request_turn(TriggerReason::Direct, mood.reaction_prompt().to_string());
            }
        }
    }

    fn set_language(&mut self, language: Language) {
        if matches!(self.mode, Some(Mode::Guest { .. })) {
            self.system("Only the host can change the language.");
            return;
        }
        if language == self.language {
            return;
        }
        self.language = language;
        self.reconfigure_client();
        self.emit(NodeEvent::Persona {
            mood: self.mood,
            language,
        });
        if self.mode == Some(Mode::Host) {
            self.room.broadcast(
                &Payload::SysUpdate {
                    mood: self.mood,
                    lang: Some(language),
                },
                None,
            );
        }
        if self.mode.is_some() {
            self.system(format!("Language set to {}", language));
        }
    }

    fn set_username(&mut self, name: String) {
        let name = name.trim().to_string();
        if name.is_empty() {
            return;
        }
        self.cfg.username = name.clone();
        self.room.set_local_username(name.clone());
        match self.mode {
            Some(Mode::Host) => self.broadcast_participants(),
            Some(Mode::Guest { .. }) => {
                let user = self.room.local().clone();
                self.room.broadcast(&Payload::Handshake { user }, None);
                self.emit(NodeEvent::Participants(self.room.participants().to_vec()));
            }
            _ => self.emit(NodeEvent::Participants(self.room.participants().to_vec())),
        }
        self.system(format!("You are now {}.", name));
    }

    // -- transport ------------------------------------------------------------

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened { link } => self.on_opened(link),
            TransportEvent::Data { peer_id, payload } => {
                if self.room.is_linked(&peer_id) {
                    self.on_payload(peer_id, payload);
                } else {
                    debug!(peer_id = %peer_id, kind = payload.type_name(), "dropping payload from stale link");
                }
            }
            TransportEvent::Closed { peer_id } => self.on_closed(peer_id),
        }
    }

    fn on_opened(&mut self, link: transport::PeerLink) {
        let peer_id = link.peer_id().to_string();
        match self.mode {
            Some(Mode::Host) => {
                self.room.register(link);
                self.room.send_to(
                    &peer_id,
                    Payload::MoodUpdate {
                        mood: self.mood,
                        lang: Some(self.language),
                    },
                );
                self.system("NEW ENCRYPTED CONNECTION RECEIVED.");
                self.set_status(ConnectionStatus::Connected);
            }
            Some(Mode::Guest { .. }) => {
                self.room.register(link);
                self.set_status(ConnectionStatus::Connected);
                let user = self.room.local().clone();
                self.room.send_to(&peer_id, Payload::Handshake { user });
            }
            // a late connection after a disconnect; dropping the link closes it
            _ => debug!(peer_id = %peer_id, "ignoring connection while offline"),
        }
    }

    fn on_payload(&mut self, from: PeerId, payload: Payload) {
        let is_host = self.mode == Some(Mode::Host);
        if is_host && payload.is_relayable() {
            let relayed = self.room.broadcast(&payload, Some(&from));
            debug!(peer_id = %from, kind = payload.type_name(), relayed, "relayed payload");
        }

        match payload {
            Payload::Handshake { mut user } => {
                if !is_host {
                    return;
                }
                user.peer_id = from;
                user.is_host = false;
                let joined = self.room.participant(&user.peer_id).is_none();
                let name = user.username.clone();
                self.room.upsert_participant(user);
                if joined {
                    self.system(format!("{} joined the room.", name));
                }
                self.broadcast_participants();
            }
            Payload::SyncParticipants { participants } => {
                if is_host {
                    return;
                }
                self.room.sync_participants(participants);
                self.emit(NodeEvent::Participants(self.room.participants().to_vec()));
            }
            Payload::Message { text, username } => {
                self.clear_typing();
                let speaker = username
                    .clone()
                    .or_else(|| self.room.participant(&from).map(|p| p.username.clone()))
                    .unwrap_or_else(|| "Stranger".to_string());
                self.push_message(Message::new(text.clone(), SenderType::Stranger, Some(speaker.clone())));
                if is_host {
                    self.observe(&speaker, &text);
                }
            }
            Payload::Typing { username } => {
                self.typing_until = Some(Instant::now() + self.cfg.typing_indicator);
                self.emit(NodeEvent::Typing {
                    username,
                    active: true,
                });
            }
            Payload::MoodUpdate { mood, lang } => {
                if is_host {
                    return;
                }
                self.apply_remote_persona(mood, lang);
                let line = match mood {
                    Mood::Funny => "⚠️ SYSTEM: HOST ENABLED CHAOS MODE",
                    Mood::Sad => "⚠️ SYSTEM: HOST ENABLED SAD HOURS",
                };
                self.system(line);
            }
            Payload::SysUpdate { mood, lang } => {
                if is_host {
                    return;
                }
                self.apply_remote_persona(mood, lang);
                self.system(format!("Host set language to {}", self.language));
            }
            Payload::Error { message } => {
                self.system(format!("ERROR: {}", message));
            }
        }
    }

    fn on_closed(&mut self, peer_id: PeerId) {
        // a newer connection from the same peer may have replaced this one
        let stale = self
            .room
            .link(&peer_id)
            .map_or(true, |link| !link.is_closed());
        if stale {
            return;
        }
        self.room.unlink(&peer_id);
        let who = self.room.remove_participant(&peer_id);
        info!(peer_id = %peer_id, "peer disconnected");
        match self.mode {
            Some(Mode::Host) => {
                let name = who.map(|p| p.username).unwrap_or_else(|| "A peer".to_string());
                self.system(format!("{} disconnected.", name));
                self.broadcast_participants();
                if self.room.connection_count() == 0 {
                    self.set_status(ConnectionStatus::WaitingForPeer);
                }
            }
            Some(Mode::Guest { .. }) => {
                self.system("A PEER DISCONNECTED.");
                if self.room.connection_count() == 0 {
                    self.mode = None;
                    self.room.reset();
                    self.clear_typing();
                    self.emit(NodeEvent::Participants(self.room.participants().to_vec()));
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
            _ => {}
        }
    }

    // -- bot turns ------------------------------------------------------------

    fn runs_bot(&self) -> bool {
        self.has_bot && matches!(self.mode, Some(Mode::Solo) | Some(Mode::Host))
    }

    fn observe(&mut self, speaker: &str, text: &str) {
        if !self.runs_bot() {
            return;
        }
        let decision = self
            .scheduler
            .observe(speaker, text, Instant::now(), &mut self.rng);
        log_decision(&decision);
    }

    fn request_turn(&mut self, reason: TriggerReason, prompt: String) {
        let decision = self
            .scheduler
            .request(reason, prompt.clone(), Instant::now(), &mut self.rng);
        log_decision(&decision);
        if matches!(decision, Decision::Dropped { reason: TriggerReason::Direct }) {
            debug!(queued = self.pending_direct.len() + 1, "direct prompt queued");
            self.pending_direct.push_back(prompt);
        }
    }

    fn request_next_direct(&mut self) {
        if let Some(prompt) = self.pending_direct.pop_front() {
            self.request_turn(TriggerReason::Direct, prompt);
        }
    }

    fn start_turn(&mut self, turn: TurnRequest, now: Instant) {
        let Some(mut client) = self.client.take() else {
            debug!(reason = ?turn.reason, "persona client still out with a previous session, skipping turn");
            self.scheduler.finish(now);
            return;
        };
        if self.reconfigure {
            client.configure(self.mood, self.language);
            self.reconfigure = false;
        }
        info!(reason = ?turn.reason, "bot turn started");

        let name = self.mood.persona_name().to_string();
        let placeholder = Message::streaming(name.clone());
        self.composing = Some(placeholder.id.clone());
        self.push_message(placeholder);
        self.emit(NodeEvent::Typing {
            username: Some(name.clone()),
            active: true,
        });
        if self.mode == Some(Mode::Host) {
            self.room.broadcast(&Payload::Typing { username: Some(name) }, None);
        }

        let epoch = self.epoch;
        let tx = self.turn_tx.clone();
        tokio::spawn(async move {
            let chunk_tx = tx.clone();
            let mut on_chunk = move |chunk: &str| {
                let _ = chunk_tx.send(TurnUpdate::Chunk {
                    epoch,
                    text: chunk.to_string(),
                });
            };
            let text = client.send_streaming(&turn.prompt, &mut on_chunk).await;
            let _ = tx.send(TurnUpdate::Done { epoch, client, text });
        });
    }

    fn handle_turn(&mut self, update: TurnUpdate<B>) {
        match update {
            TurnUpdate::Chunk { epoch, text } => {
                if epoch != self.epoch {
                    return;
                }
                if let Some(updated) = self.update_composing(|m| m.append(&text)) {
                    self.emit(NodeEvent::MessageUpdated(updated));
                }
            }
            TurnUpdate::Done {
                epoch,
                mut client,
                text,
            } => {
                if self.reconfigure {
                    client.configure(self.mood, self.language);
                    self.reconfigure = false;
                }
                self.client = Some(client);
                if epoch != self.epoch {
                    debug!("discarding reply from a previous session");
                    return;
                }
                let finished = self.update_composing(|m| m.finish(&text));
                self.composing = None;
                self.emit(NodeEvent::Typing {
                    username: None,
                    active: false,
                });
                if let Some(msg) = finished {
                    if self.mode == Some(Mode::Host) {
                        let username = msg
                            .username
                            .clone()
                            .unwrap_or_else(|| self.mood.persona_name().to_string());
                        self.room.broadcast(&Payload::message(text, username), None);
                    }
                    self.emit(NodeEvent::MessageUpdated(msg));
                }
                self.scheduler.finish(Instant::now());
                self.request_next_direct();
            }
        }
    }

    fn update_composing(&mut self, f: impl FnOnce(&mut Message)) -> Option<Message> {
        let id = self.composing.as_deref()?;
        let msg = self.transcript.iter_mut().rev().find(|m| m.id == id)?;
        f(msg);
        Some(msg.clone())
    }

    // -- timers ---------------------------------------------------------------

    fn scheduler_active(&self) -> bool {
        self.runs_bot() && self.status == ConnectionStatus::Connected
    }

    fn next_deadline(&self) -> Option<Instant> {
        let sched = if self.scheduler_active() || !self.scheduler.is_idle() {
            self.scheduler.next_deadline()
        } else {
            None
        };
        match (sched, self.typing_until) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if self.typing_until.is_some_and(|t| t <= now) {
            self.clear_typing();
        }
        if !self.scheduler_active() && self.scheduler.is_idle() {
            return;
        }
        if let Some(turn) = self.scheduler.poll(now) {
            self.start_turn(turn, now);
        }
    }

    // -- helpers --------------------------------------------------------------

    fn teardown(&mut self) {
        self.listener = None;
        self.room.reset();
        self.mode = None;
        self.epoch += 1;
        self.composing = None;
        self.pending_direct.clear();
        self.scheduler.reset(Instant::now());
        self.clear_typing();
        self.emit(NodeEvent::Participants(self.room.participants().to_vec()));
    }

    fn reconfigure_client(&mut self) {
        match self.client.as_mut() {
            Some(client) => client.configure(self.mood, self.language),
            None => self.reconfigure = true,
        }
    }

    fn apply_remote_persona(&mut self, mood: Mood, lang: Option<Language>) {
        self.mood = mood;
        if let Some(lang) = lang {
            self.language = lang;
        }
        self.emit(NodeEvent::Persona {
            mood: self.mood,
            language: self.language,
        });
    }

    fn broadcast_participants(&mut self) {
        let participants = self.room.participants().to_vec();
        self.room.broadcast(
            &Payload::SyncParticipants {
                participants: participants.clone(),
            },
            None,
        );
        self.emit(NodeEvent::Participants(participants));
    }

    fn warn_no_bot(&mut self) {
        self.system("No API key configured: the bot is offline. Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.");
    }

    fn clear_typing(&mut self) {
        if self.typing_until.take().is_some() {
            self.emit(NodeEvent::Typing {
                username: None,
                active: false,
            });
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            info!(from = %self.status, to = %status, "status changed");
            self.status = status;
            self.emit(NodeEvent::Status(status));
        }
    }

    fn push_message(&mut self, msg: Message) {
        self.transcript.push(msg.clone());
        self.emit(NodeEvent::Message(msg));
    }

    fn system(&mut self, text: impl Into<String>) {
        self.push_message(Message::system(text));
    }

    fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }
}

fn log_decision(decision: &Decision) {
    match decision {
        Decision::Armed { reason, .. } => debug!(?reason, "turn armed"),
        Decision::Dropped { reason } => debug!(?reason, "turn dropped"),
        Decision::Ignored => {}
    }
}

fn new_peer_id() -> PeerId {
    uuid::Uuid::new_v4().to_string()
}

/// `0.0.0.0` is not dialable; swap in loopback for the derived invite.
fn reachable(addr: std::net::SocketAddr) -> String {
    if addr.ip().is_unspecified() {
        format!("127.0.0.1:{}", addr.port())
    } else {
        addr.to_string()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
