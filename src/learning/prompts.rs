//! Learning Prompt Orchestrator
//!
//! Shows "did you mean" prompts one at a time. The orchestrator runs as a
//! tokio task that owns the queue; handles talk to it over a channel, so
//! responses are applied to the dictionary strictly in the order prompts
//! were shown.
//!
//! Lifecycle per prompt: `Queued -> Showing -> Accepted | Rejected | Ignored`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::dictionary::{PersonalDictionary, PersonalDictionaryEntry, UserResponse};
use super::similarity::SimilarCommand;
use crate::config::Config;
use crate::error::{MixError, MixResult};

/// Active response times kept for the rolling average
const RESPONSE_WINDOW: usize = 50;
/// Resolved outcomes kept for state queries
const OUTCOME_WINDOW: usize = 50;
const MAILBOX_SIZE: usize = 32;
const EVENT_BUFFER: usize = 64;

/// A surfaced correction candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPromptData {
    pub id: Uuid,
    pub original: String,
    pub corrected: String,
    pub similarity: f64,
    pub confidence: f64,
    pub edit_distance: usize,
    pub matching_words: Vec<String>,
    pub was_console_connected: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&SimilarCommand> for LearningPromptData {
    fn from(similar: &SimilarCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            original: similar.original.text.clone(),
            corrected: similar.corrected.text.clone(),
            similarity: similar.similarity,
            confidence: similar.confidence,
            edit_distance: similar.distance,
            matching_words: similar.matching_words.clone(),
            was_console_connected: similar.corrected.console_connected,
            created_at: Utc::now(),
        }
    }
}

/// A user answer; `Ignore` dismisses without learning, like a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptResponse {
    Accept,
    Reject,
    Ignore,
}

impl From<PromptResponse> for UserResponse {
    fn from(response: PromptResponse) -> Self {
        match response {
            PromptResponse::Accept => UserResponse::Accepted,
            PromptResponse::Reject => UserResponse::Rejected,
            PromptResponse::Ignore => UserResponse::Ignored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptState {
    Queued,
    Showing,
    Accepted,
    Rejected,
    Ignored,
}

impl From<UserResponse> for PromptState {
    fn from(response: UserResponse) -> Self {
        match response {
            UserResponse::Accepted => PromptState::Accepted,
            UserResponse::Rejected => PromptState::Rejected,
            UserResponse::Ignored => PromptState::Ignored,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptAnalytics {
    pub accepted: u64,
    pub rejected: u64,
    pub ignored: u64,
    pub shown: u64,
    /// Rolling average over recent accept/reject responses
    pub average_response_ms: f64,
    pub console_connected_prompts: u64,
    #[serde(skip)]
    recent_response_ms: VecDeque<u64>,
}

impl PromptAnalytics {
    pub fn resolved(&self) -> u64 {
        self.accepted + self.rejected + self.ignored
    }

    pub fn acceptance_rate(&self) -> f64 {
        match self.resolved() {
            0 => 0.0,
            n => self.accepted as f64 / n as f64,
        }
    }

    /// Share of prompts answered rather than left to time out
    pub fn engagement_rate(&self) -> f64 {
        match self.resolved() {
            0 => 0.0,
            n => (self.accepted + self.rejected) as f64 / n as f64,
        }
    }

    fn record(&mut self, outcome: UserResponse, response_ms: u64) {
        match outcome {
            UserResponse::Accepted => self.accepted += 1,
            UserResponse::Rejected => self.rejected += 1,
            UserResponse::Ignored => {
                self.ignored += 1;
                return;
            }
        }

        if self.recent_response_ms.len() >= RESPONSE_WINDOW {
            self.recent_response_ms.pop_front();
        }
        self.recent_response_ms.push_back(response_ms);
        self.average_response_ms = self.recent_response_ms.iter().sum::<u64>() as f64
            / self.recent_response_ms.len() as f64;
    }
}

/// Notifications for whatever renders prompts
#[derive(Debug, Clone)]
pub enum LearningEvent {
    PromptShown(LearningPromptData),
    PromptResolved {
        prompt: LearningPromptData,
        outcome: UserResponse,
        response_ms: u64,
    },
    EntryLearned(PersonalDictionaryEntry),
    LearningFailed {
        prompt_id: Uuid,
        error: String,
    },
}

/// Point-in-time view of the orchestrator
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorState {
    pub showing: Option<LearningPromptData>,
    pub queued: Vec<LearningPromptData>,
    pub recent_outcomes: Vec<(Uuid, UserResponse)>,
    pub analytics: PromptAnalytics,
}

impl OrchestratorState {
    pub fn state_of(&self, id: Uuid) -> Option<PromptState> {
        if self.showing.as_ref().map(|p| p.id) == Some(id) {
            return Some(PromptState::Showing);
        }
        if self.queued.iter().any(|p| p.id == id) {
            return Some(PromptState::Queued);
        }
        self.recent_outcomes
            .iter()
            .rev()
            .find(|(prompt_id, _)| *prompt_id == id)
            .map(|(_, outcome)| PromptState::from(*outcome))
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Auto-dismiss delay for a showing prompt
    pub timeout: Duration,
    /// Pause between one prompt resolving and the next showing
    pub debounce: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            debounce: Duration::from_millis(300),
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            timeout: Duration::from_millis(config.prompt_timeout_ms),
            debounce: Duration::from_millis(config.prompt_debounce_ms),
        }
    }
}

/// Messages handled by the orchestrator task
enum PromptMessage {
    Enqueue(Vec<LearningPromptData>, oneshot::Sender<usize>),
    Respond {
        id: Uuid,
        response: PromptResponse,
        reply: oneshot::Sender<MixResult<UserResponse>>,
    },
    State(oneshot::Sender<OrchestratorState>),
    Shutdown,
}

/// Cloneable handle to the orchestrator task
#[derive(Clone)]
pub struct LearningPromptOrchestrator {
    sender: mpsc::Sender<PromptMessage>,
    events: broadcast::Sender<LearningEvent>,
}

impl std::fmt::Debug for LearningPromptOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningPromptOrchestrator").finish()
    }
}

impl LearningPromptOrchestrator {
    /// Start the orchestrator task; must be called inside a tokio runtime
    pub fn spawn(dictionary: Arc<PersonalDictionary>, settings: OrchestratorSettings) -> Self {
        let (sender, receiver) = mpsc::channel(MAILBOX_SIZE);
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let actor = PromptActor {
            dictionary,
            settings,
            events: events.clone(),
            queue: VecDeque::new(),
            showing: None,
            next_show_at: None,
            outcomes: VecDeque::with_capacity(OUTCOME_WINDOW),
            analytics: PromptAnalytics::default(),
        };
        tokio::spawn(actor.run(receiver));

        Self { sender, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LearningEvent> {
        self.events.subscribe()
    }

    /// Queue prompts; returns how many were new
    pub async fn enqueue(&self, prompts: Vec<LearningPromptData>) -> MixResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(PromptMessage::Enqueue(prompts, reply)).await?;
        rx.await.map_err(|_| MixError::OrchestratorClosed)
    }

    /// Answer the prompt that is currently showing
    pub async fn respond(&self, id: Uuid, response: PromptResponse) -> MixResult<UserResponse> {
        let (reply, rx) = oneshot::channel();
        self.send(PromptMessage::Respond { id, response, reply })
            .await?;
        rx.await.map_err(|_| MixError::OrchestratorClosed)?
    }

    pub async fn state(&self) -> MixResult<OrchestratorState> {
        let (reply, rx) = oneshot::channel();
        self.send(PromptMessage::State(reply)).await?;
        rx.await.map_err(|_| MixError::OrchestratorClosed)
    }

    pub async fn shutdown(&self) -> MixResult<()> {
        self.send(PromptMessage::Shutdown).await
    }

    async fn send(&self, message: PromptMessage) -> MixResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| MixError::OrchestratorClosed)
    }
}

struct Showing {
    prompt: LearningPromptData,
    shown_at: Instant,
    deadline: Instant,
}

struct PromptActor {
    dictionary: Arc<PersonalDictionary>,
    settings: OrchestratorSettings,
    events: broadcast::Sender<LearningEvent>,
    queue: VecDeque<LearningPromptData>,
    showing: Option<Showing>,
    /// Set while the debounce between prompts is running
    next_show_at: Option<Instant>,
    outcomes: VecDeque<(Uuid, UserResponse)>,
    analytics: PromptAnalytics,
}

impl PromptActor {
    async fn run(mut self, mut receiver: mpsc::Receiver<PromptMessage>) {
        debug!("💬 Learning prompt orchestrator started");

        loop {
            let deadline = self.showing.as_ref().map(|s| s.deadline);
            let next_show_at = self.next_show_at;

            tokio::select! {
                message = receiver.recv() => match message {
                    Some(PromptMessage::Shutdown) | None => break,
                    Some(message) => self.handle(message).await,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.resolve(UserResponse::Ignored).await;
                }
                _ = sleep_until(next_show_at.unwrap_or_else(Instant::now)),
                    if next_show_at.is_some() && self.showing.is_none() => {
                    self.next_show_at = None;
                    self.show_next();
                }
            }
        }

        debug!("💬 Learning prompt orchestrator stopped");
    }

    async fn handle(&mut self, message: PromptMessage) {
        match message {
            PromptMessage::Enqueue(prompts, reply) => {
                let added = self.enqueue(prompts);
                let _ = reply.send(added);
            }
            PromptMessage::Respond {
                id,
                response,
                reply,
            } => {
                let is_showing = self.showing.as_ref().map(|s| s.prompt.id) == Some(id);
                let result = if is_showing {
                    let outcome = UserResponse::from(response);
                    self.resolve(outcome).await;
                    Ok(outcome)
                } else {
                    Err(MixError::PromptNotShowing(id))
                };
                let _ = reply.send(result);
            }
            PromptMessage::State(reply) => {
                let _ = reply.send(self.snapshot());
            }
            PromptMessage::Shutdown => {}
        }
    }

    fn enqueue(&mut self, prompts: Vec<LearningPromptData>) -> usize {
        let mut added = 0;
        for prompt in prompts {
            let duplicate = self
                .showing
                .iter()
                .map(|s| &s.prompt)
                .chain(self.queue.iter())
                .any(|p| p.original == prompt.original && p.corrected == prompt.corrected);
            if duplicate {
                debug!("Skipping duplicate prompt '{}' -> '{}'", prompt.original, prompt.corrected);
                continue;
            }
            self.queue.push_back(prompt);
            added += 1;
        }

        if self.showing.is_none() && self.next_show_at.is_none() {
            self.show_next();
        }
        added
    }

    fn show_next(&mut self) {
        let Some(prompt) = self.queue.pop_front() else {
            return;
        };

        let now = Instant::now();
        self.analytics.shown += 1;
        if prompt.was_console_connected {
            self.analytics.console_connected_prompts += 1;
        }
        info!(
            "💡 Did you mean '{}' for '{}'? ({:.0}% similar)",
            prompt.corrected,
            prompt.original,
            prompt.similarity * 100.0
        );
        let _ = self.events.send(LearningEvent::PromptShown(prompt.clone()));

        self.showing = Some(Showing {
            prompt,
            shown_at: now,
            deadline: now + self.settings.timeout,
        });
    }

    async fn resolve(&mut self, outcome: UserResponse) {
        let Some(showing) = self.showing.take() else {
            return;
        };
        let prompt = showing.prompt;
        let response_ms = showing.shown_at.elapsed().as_millis() as u64;

        self.analytics.record(outcome, response_ms);
        if self.outcomes.len() >= OUTCOME_WINDOW {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back((prompt.id, outcome));

        match outcome {
            UserResponse::Accepted => {
                let entry = PersonalDictionaryEntry::new(
                    &prompt.original,
                    &prompt.corrected,
                    prompt.confidence,
                    prompt.was_console_connected,
                )
                .with_response(UserResponse::Accepted);

                match self.dictionary.add_entry(entry).await {
                    Ok(stored) => {
                        let _ = self.events.send(LearningEvent::EntryLearned(stored));
                    }
                    Err(e) => {
                        error!("❌ Failed to save learned correction: {}", e);
                        let _ = self.events.send(LearningEvent::LearningFailed {
                            prompt_id: prompt.id,
                            error: e.to_string(),
                        });
                    }
                }
            }
            UserResponse::Rejected => {
                info!("🙅 Rejected '{}' -> '{}'", prompt.original, prompt.corrected);
            }
            UserResponse::Ignored => {
                debug!("⌛ Prompt for '{}' timed out", prompt.original);
            }
        }

        let _ = self.events.send(LearningEvent::PromptResolved {
            prompt,
            outcome,
            response_ms,
        });

        if !self.queue.is_empty() {
            self.next_show_at = Some(Instant::now() + self.settings.debounce);
        }
    }

    fn snapshot(&self) -> OrchestratorState {
        OrchestratorState {
            showing: self.showing.as_ref().map(|s| s.prompt.clone()),
            queued: self.queue.iter().cloned().collect(),
            recent_outcomes: self.outcomes.iter().copied().collect(),
            analytics: self.analytics.clone(),
        }
    }
}
