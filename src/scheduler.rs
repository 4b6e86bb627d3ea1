//! Turn scheduling: deciding when the bot speaks.
//!
//! The scheduler is a single state machine:
//!
//! ```text
//!            offer()                 poll() at fire_at
//!   Idle ───────────────▶ Armed ─────────────────────▶ Composing
//!    ▲                     │ higher-priority offer          │
//!    │                     └─ replaces pending request      │ finish()
//!    └──────────────────────────────────────────────────────┘
//! ```
//!
//! Silence and periodic timers only fire from `Idle`. Anything offered while
//! `Composing` is dropped, never queued. The scheduler never reads the clock or
//! owns randomness; callers pass `now` and an [`Rng`] so behavior is testable.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::persona::{self, PERIODIC_PROMPT, REVIVE_PROMPT};

/// Why a turn was requested. Ordered by priority, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TriggerReason {
    Periodic,
    Inactivity,
    Random,
    Mention,
    Command,
    /// Solo replies, greetings and mood reactions.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub reason: TriggerReason,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Armed { fire_at: Instant, request: TurnRequest },
    Composing { reason: TriggerReason },
}

/// Result of offering a trigger to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing in the message warranted a turn.
    Ignored,
    /// A turn is now pending and will start at `fire_at`.
    Armed { reason: TriggerReason, fire_at: Instant },
    /// A turn was warranted but one is already pending or in flight.
    Dropped { reason: TriggerReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Minimum gap since the last turn before a random roll is allowed.
    pub cooldown: Duration,
    pub random_chance: f64,
    pub inactivity: Option<Duration>,
    pub periodic: Option<Duration>,
    pub typing_delay_min: Duration,
    pub typing_delay_jitter: Duration,
    pub extra_keywords: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            cooldown: Duration::from_secs(20),
            random_chance: 0.05,
            inactivity: Some(Duration::from_secs(45)),
            periodic: Some(Duration::from_secs(180)),
            typing_delay_min: Duration::from_millis(1500),
            typing_delay_jitter: Duration::from_millis(2000),
            extra_keywords: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct TurnScheduler {
    cfg: SchedulerConfig,
    state: TurnState,
    last_turn: Option<Instant>,
    inactivity_at: Option<Instant>,
    periodic_at: Option<Instant>,
}

impl TurnScheduler {
    pub fn new(cfg: SchedulerConfig, now: Instant) -> Self {
        let periodic_at = cfg.periodic.map(|p| now + p);
        TurnScheduler {
            cfg,
            state: TurnState::Idle,
            last_turn: None,
            inactivity_at: None,
            periodic_at,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn is_composing(&self) -> bool {
        matches!(self.state, TurnState::Composing { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, TurnState::Idle)
    }

    /// Classify a human message without changing any state.
    pub fn classify(&self, text: &str) -> Option<TriggerReason> {
        if persona::is_command(text) {
            Some(TriggerReason::Command)
        } else if persona::mentions_keyword(text, &self.cfg.extra_keywords) {
            Some(TriggerReason::Mention)
        } else {
            None
        }
    }

    /// Feed a human message seen in the room.
    ///
    /// Every human message re-arms the silence timer. Commands and keyword
    /// mentions always warrant a turn; anything else may win a random roll
    /// once the cooldown has elapsed.
    pub fn observe<R: Rng + ?Sized>(
        &mut self,
        speaker: &str,
        text: &str,
        now: Instant,
        rng: &mut R,
    ) -> Decision {
        self.inactivity_at = self.cfg.inactivity.map(|d| now + d);

        let reason = match self.classify(text) {
            Some(r) => r,
            None => {
                if self.cooldown_elapsed(now) && rng.gen_bool(self.random_probability()) {
                    TriggerReason::Random
                } else {
                    return Decision::Ignored;
                }
            }
        };

        let prompt = attribute(speaker, text);
        self.offer(TurnRequest { reason, prompt }, now, rng)
    }

    /// Request a turn directly (solo reply, greeting, mood reaction).
    pub fn request<R: Rng + ?Sized>(
        &mut self,
        reason: TriggerReason,
        prompt: impl Into<String>,
        now: Instant,
        rng: &mut R,
    ) -> Decision {
        self.offer(
            TurnRequest {
                reason,
                prompt: prompt.into(),
            },
            now,
            rng,
        )
    }

    fn offer<R: Rng + ?Sized>(&mut self, request: TurnRequest, now: Instant, rng: &mut R) -> Decision {
        let reason = request.reason;
        match &mut self.state {
            TurnState::Composing { .. } => {
                debug!(?reason, "turn in flight, dropping trigger");
                Decision::Dropped { reason }
            }
            TurnState::Armed { fire_at, request: pending } => {
                if pending.reason >= reason {
                    debug!(?reason, pending = ?pending.reason, "turn already armed, dropping trigger");
                    return Decision::Dropped { reason };
                }
                debug!(?reason, superseded = ?pending.reason, "superseding armed turn");
                *pending = request;
                let fire_at = *fire_at;
                self.last_turn = Some(now);
                Decision::Armed { reason, fire_at }
            }
            TurnState::Idle => {
                let fire_at = now + self.typing_delay(rng);
                self.state = TurnState::Armed { fire_at, request };
                // Stamp the cooldown now so a burst of messages can't double-trigger.
                self.last_turn = Some(now);
                Decision::Armed { reason, fire_at }
            }
        }
    }

    /// The next instant at which [`poll`](Self::poll) may have work.
    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.state {
            TurnState::Armed { fire_at, .. } => Some(*fire_at),
            TurnState::Composing { .. } => None,
            TurnState::Idle => match (self.inactivity_at, self.periodic_at) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }

    /// Advance timers. Returns the turn to compose, if one is due; the
    /// scheduler is then `Composing` until [`finish`](Self::finish).
    pub fn poll(&mut self, now: Instant) -> Option<TurnRequest> {
        match &self.state {
            TurnState::Composing { .. } => None,
            TurnState::Armed { fire_at, request } => {
                if *fire_at > now {
                    return None;
                }
                let request = request.clone();
                self.begin(request.reason, now);
                Some(request)
            }
            TurnState::Idle => {
                let request = if self.inactivity_at.is_some_and(|t| t <= now) {
                    TurnRequest {
                        reason: TriggerReason::Inactivity,
                        prompt: REVIVE_PROMPT.to_string(),
                    }
                } else if self.periodic_at.is_some_and(|t| t <= now) {
                    TurnRequest {
                        reason: TriggerReason::Periodic,
                        prompt: PERIODIC_PROMPT.to_string(),
                    }
                } else {
                    return None;
                };
                self.begin(request.reason, now);
                Some(request)
            }
        }
    }

    /// The in-flight turn completed (successfully or not).
    pub fn finish(&mut self, now: Instant) -> bool {
        if !self.is_composing() {
            return false;
        }
        self.state = TurnState::Idle;
        self.last_turn = Some(now);
        self.absorb_due_timers(now);
        true
    }

    /// Forget everything: used when the room is torn down or recreated.
    pub fn reset(&mut self, now: Instant) {
        self.state = TurnState::Idle;
        self.last_turn = None;
        self.inactivity_at = None;
        self.periodic_at = self.cfg.periodic.map(|p| now + p);
    }

    fn begin(&mut self, reason: TriggerReason, now: Instant) {
        self.state = TurnState::Composing { reason };
        self.last_turn = Some(now);
        self.absorb_due_timers(now);
    }

    /// A turn that starts or ends on/after a timer's deadline satisfies it.
    /// The silence timer stays disarmed until the next human message; the
    /// periodic timer is re-armed from `now`.
    fn absorb_due_timers(&mut self, now: Instant) {
        if self.inactivity_at.is_some_and(|t| t <= now) {
            self.inactivity_at = None;
        }
        if self.periodic_at.is_some_and(|t| t <= now) {
            self.periodic_at = self.cfg.periodic.map(|p| now + p);
        }
    }

    /// `random_chance` as a valid probability; NaN counts as never.
    fn random_probability(&self) -> f64 {
        let p = self.cfg.random_chance;
        if p.is_nan() {
            0.0
        } else {
            p.clamp(0.0, 1.0)
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_turn {
            None => true,
            Some(t) => now.saturating_duration_since(t) > self.cfg.cooldown,
        }
    }

    fn typing_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_ms = self.cfg.typing_delay_jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rng.gen_range(0..=jitter_ms)
        };
        self.cfg.typing_delay_min + Duration::from_millis(extra)
    }
}

/// `"speaker: text"`, the attribution format the persona instructions expect.
pub fn attribute(speaker: &str, text: &str) -> String {
    format!("{}: {}", speaker, text)
}
