//! LLM client: chat sessions, HTTP backends and the persona wrapper.
//!
//! [`ChatBackend`] is the seam between the node and an actual model.
//! [`HttpBackend`] speaks OpenAI, Anthropic and Gemini; [`ScriptedBackend`]
//! replays canned replies for tests and offline runs.

use reqwest::Client;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{ChatError, Result};
use crate::persona::{self, Language, Mood, APOLOGY, EMPTY_REPLY};
use crate::providers::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// One conversation with the model: a fixed instruction plus bounded history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub instruction: String,
    pub temperature: f32,
    history: Vec<Turn>,
    max_history: usize,
}

impl ChatSession {
    pub fn new(instruction: impl Into<String>, temperature: f32, max_history: usize) -> Self {
        ChatSession {
            instruction: instruction.into(),
            temperature,
            history: Vec::new(),
            max_history,
        }
    }

    pub fn for_persona(mood: Mood, language: Language, temperature: f32, max_history: usize) -> Self {
        ChatSession::new(
            persona::system_instruction(mood, language),
            temperature,
            max_history,
        )
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Record a completed exchange, dropping the oldest turns beyond the cap.
    pub fn record(&mut self, prompt: &str, reply: &str) {
        self.history.push(Turn {
            role: Role::User,
            text: prompt.to_string(),
        });
        self.history.push(Turn {
            role: Role::Model,
            text: reply.to_string(),
        });
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            // keep user/model pairs aligned
            let excess = excess + excess % 2;
            self.history.drain(..excess.min(self.history.len()));
        }
    }
}

/// Something that can turn a session plus a prompt into a reply.
pub trait ChatBackend: Send + Sync + 'static {
    fn complete(
        &self,
        session: &ChatSession,
        prompt: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Stream the reply through `on_chunk`, returning the full text.
    /// Backends without streaming deliver the whole reply as one chunk.
    fn complete_stream(
        &self,
        session: &ChatSession,
        prompt: &str,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> impl Future<Output = Result<String>> + Send {
        async move {
            let text = self.complete(session, prompt).await?;
            on_chunk(&text);
            Ok(text)
        }
    }
}

// -- HTTP backend -------------------------------------------------------------

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    provider: Provider,
    model: String,
    api_key: String,
}

impl HttpBackend {
    pub fn new(provider: Provider, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        HttpBackend {
            client: Client::new(),
            provider,
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Build from config, reading the API key from the provider's env vars.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let vars = cfg.provider.api_key_vars();
        let api_key = vars
            .iter()
            .find_map(|v| std::env::var(v).ok().filter(|k| !k.trim().is_empty()))
            .ok_or(ChatError::MissingApiKey(vars[0]))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(HttpBackend {
            client,
            provider: cfg.provider,
            model: cfg.resolved_model(),
            api_key,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn openai_request(&self, session: &ChatSession, prompt: &str, stream: bool) -> OpenAIChatRequest {
        let mut messages = vec![OpenAIChatMessage {
            role: "system".to_string(),
            content: session.instruction.clone(),
        }];
        for turn in session.history() {
            messages.push(OpenAIChatMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Model => "assistant",
                }
                .to_string(),
                content: turn.text.clone(),
            });
        }
        messages.push(OpenAIChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        OpenAIChatRequest {
            model: self.model.clone(),
            messages,
            stream,
            temperature: session.temperature,
        }
    }

    fn anthropic_request(&self, session: &ChatSession, prompt: &str, stream: bool) -> AnthropicRequest {
        let mut messages: Vec<AnthropicMessage> = session
            .history()
            .iter()
            .map(|turn| AnthropicMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Model => "assistant",
                }
                .to_string(),
                content: turn.text.clone(),
            })
            .collect();
        messages.push(AnthropicMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        AnthropicRequest {
            model: self.model.clone(),
            messages,
            max_tokens: 1024,
            stream,
            // Anthropic caps temperature at 1.0
            temperature: session.temperature.min(1.0),
            system: Some(session.instruction.clone()),
        }
    }

    fn gemini_request(&self, session: &ChatSession, prompt: &str) -> GeminiRequest {
        let text_content = |role: &str, text: &str| GeminiContent {
            role: Some(role.to_string()),
            parts: vec![GeminiPart {
                text: Some(text.to_string()),
            }],
        };
        let mut contents: Vec<GeminiContent> = session
            .history()
            .iter()
            .map(|turn| match turn.role {
                Role::User => text_content("user", &turn.text),
                Role::Model => text_content("model", &turn.text),
            })
            .collect();
        contents.push(text_content("user", prompt));
        GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(session.instruction.clone()),
                }],
            },
            contents,
            generation_config: GeminiGenerationConfig {
                temperature: session.temperature,
                top_p: 0.95,
                top_k: 64,
            },
        }
    }

    fn gemini_url(&self, method: &str) -> String {
        let query = if method == "streamGenerateContent" {
            "alt=sse&"
        } else {
            ""
        };
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:{}?{}key={}",
            self.model, method, query, self.api_key
        )
    }

    async fn post<T: serde::Serialize>(&self, url: &str, body: &T) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        req = match self.provider {
            Provider::Openai => req.header("Authorization", format!("Bearer {}", self.api_key)),
            Provider::Anthropic => req
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01"),
            Provider::Gemini => req,
        };
        let response = req.json(body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatError::Generation(format!(
                "{} API error ({}): {}",
                self.provider, status, error_text
            )));
        }
        Ok(response)
    }
}

impl ChatBackend for HttpBackend {
    async fn complete(&self, session: &ChatSession, prompt: &str) -> Result<String> {
        debug!(provider = %self.provider, model = %self.model, "completion request");
        match self.provider {
            Provider::Openai => {
                let body = self.openai_request(session, prompt, false);
                let resp: OpenAICompletion = self
                    .post("https://api.openai.com/v1/chat/completions", &body)
                    .await?
                    .json()
                    .await?;
                Ok(resp
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .unwrap_or_default())
            }
            Provider::Anthropic => {
                let body = self.anthropic_request(session, prompt, false);
                let resp: AnthropicResponse = self
                    .post("https://api.anthropic.com/v1/messages", &body)
                    .await?
                    .json()
                    .await?;
                Ok(resp.content.into_iter().filter_map(|b| b.text).collect())
            }
            Provider::Gemini => {
                let body = self.gemini_request(session, prompt);
                let resp: GeminiResponse = self
                    .post(&self.gemini_url("generateContent"), &body)
                    .await?
                    .json()
                    .await?;
                Ok(resp.text().unwrap_or_default())
            }
        }
    }

    async fn complete_stream(
        &self,
        session: &ChatSession,
        prompt: &str,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String> {
        debug!(provider = %self.provider, model = %self.model, "streaming request");
        let response = match self.provider {
            Provider::Openai => {
                let body = self.openai_request(session, prompt, true);
                self.post("https://api.openai.com/v1/chat/completions", &body)
                    .await?
            }
            Provider::Anthropic => {
                let body = self.anthropic_request(session, prompt, true);
                self.post("https://api.anthropic.com/v1/messages", &body)
                    .await?
            }
            Provider::Gemini => {
                let body = self.gemini_request(session, prompt);
                self.post(&self.gemini_url("streamGenerateContent"), &body)
                    .await?
            }
        };

        let provider = self.provider;
        let mut full = String::new();
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            for data in drain_sse_data(&mut buffer) {
                if let Some(text) = sse_text(provider, &data) {
                    if !text.is_empty() {
                        on_chunk(&text);
                        full.push_str(&text);
                    }
                }
            }
        }
        Ok(full)
    }
}

/// Pull every complete `data: ` line out of `buffer`, leaving any partial
/// trailing line in place. Lines are decoded only once complete, so a
/// character split across network chunks survives.
pub fn drain_sse_data(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=line_end).collect();
        let line = String::from_utf8_lossy(&raw);
        if let Some(data) = line.trim().strip_prefix("data: ") {
            if data != "[DONE]" {
                out.push(data.to_string());
            }
        }
    }
    out
}

/// Extract the text delta from one SSE data payload.
fn sse_text(provider: Provider, data: &str) -> Option<String> {
    match provider {
        Provider::Openai => serde_json::from_str::<OpenAIChunk>(data)
            .ok()?
            .choices
            .into_iter()
            .next()?
            .delta
            .content,
        Provider::Anthropic => {
            let event: AnthropicStreamEvent = serde_json::from_str(data).ok()?;
            if event.event_type != "content_block_delta" {
                return None;
            }
            event.delta?.text
        }
        Provider::Gemini => serde_json::from_str::<GeminiResponse>(data).ok()?.text(),
    }
}

// -- Scripted backend ---------------------------------------------------------

#[derive(Debug, Default)]
struct Script {
    /// `None` entries fail.
    queue: VecDeque<Option<String>>,
    prompts: Vec<String>,
}

/// Replays queued replies, then a fixed default. Clones share the script,
/// so a test can keep a handle after moving one into a [`PersonaClient`].
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    default_reply: String,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn new(default_reply: impl Into<String>) -> Self {
        ScriptedBackend {
            script: Arc::new(Mutex::new(Script::default())),
            default_reply: default_reply.into(),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut s) = self.script.lock() {
            s.queue.push_back(Some(reply.into()));
        }
    }

    pub fn push_failure(&self) {
        if let Ok(mut s) = self.script.lock() {
            s.queue.push_back(None);
        }
    }

    /// Every prompt received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.script
            .lock()
            .map(|s| s.prompts.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.script.lock().map(|s| s.prompts.len()).unwrap_or(0)
    }
}

impl ChatBackend for ScriptedBackend {
    async fn complete(&self, _session: &ChatSession, prompt: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = {
            let mut s = self
                .script
                .lock()
                .map_err(|_| ChatError::Generation("script poisoned".into()))?;
            s.prompts.push(prompt.to_string());
            s.queue.pop_front()
        };
        match next {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(ChatError::Generation("scripted failure".into())),
            None => Ok(self.default_reply.clone()),
        }
    }
}

// -- Persona client -----------------------------------------------------------

/// Wraps a backend with the persona's session lifecycle and failure policy.
#[derive(Debug)]
pub struct PersonaClient<B> {
    backend: B,
    session: Option<ChatSession>,
    mood: Mood,
    language: Language,
    temperature: f32,
    max_history: usize,
}

impl<B: ChatBackend> PersonaClient<B> {
    pub fn new(backend: B, mood: Mood, language: Language) -> Self {
        PersonaClient {
            backend,
            session: None,
            mood,
            language,
            temperature: 1.1,
            max_history: 40,
        }
    }

    pub fn with_limits(mut self, temperature: f32, max_history: usize) -> Self {
        self.temperature = temperature;
        self.max_history = max_history;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    /// Switch persona. The current session is discarded; the next call
    /// starts a fresh one with the new instruction.
    pub fn configure(&mut self, mood: Mood, language: Language) {
        self.mood = mood;
        self.language = language;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.session = None;
    }

    /// Send a prompt. Never fails: one retry on a fresh session, then the
    /// fixed apology line.
    pub async fn send(&mut self, prompt: &str) -> String {
        match self.attempt(prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "generation failed, retrying with a fresh session");
                self.reset();
                match self.attempt(prompt).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!(error = %e, "generation retry failed");
                        self.reset();
                        APOLOGY.to_string()
                    }
                }
            }
        }
    }

    /// Streaming variant of [`send`](Self::send). On a streaming failure the
    /// non-streaming path is used; the returned text is always authoritative.
    pub async fn send_streaming(
        &mut self,
        prompt: &str,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> String {
        let (mood, language, temperature, max_history) =
            (self.mood, self.language, self.temperature, self.max_history);
        let session = self
            .session
            .get_or_insert_with(|| ChatSession::for_persona(mood, language, temperature, max_history));
        match self.backend.complete_stream(session, prompt, on_chunk).await {
            Ok(reply) => {
                let reply = normalize_reply(reply);
                session.record(prompt, &reply);
                reply
            }
            Err(e) => {
                warn!(error = %e, "streaming failed, falling back");
                self.reset();
                self.send(prompt).await
            }
        }
    }

    async fn attempt(&mut self, prompt: &str) -> Result<String> {
        let (mood, language, temperature, max_history) =
            (self.mood, self.language, self.temperature, self.max_history);
        let session = self
            .session
            .get_or_insert_with(|| ChatSession::for_persona(mood, language, temperature, max_history));
        let reply = normalize_reply(self.backend.complete(session, prompt).await?);
        session.record(prompt, &reply);
        Ok(reply)
    }
}

fn normalize_reply(reply: String) -> String {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        trimmed.to_string()
    }
}
