//! The orchestration loop: ask the model, run the tool it picks, feed the
//! result back, until it answers in text or the round budget runs out.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::{
    decode_reply, encode_followup_prompt, encode_initial_prompt, ModelReply, ModelRequest,
    ToolInvocation,
};
use crate::config::Config;
use crate::connection::SseConnector;
use crate::history::{History, OrchestrationMessage};
use crate::message::ChatMessage;
use crate::providers::ModelCaller;
use crate::registry::{ServerDescriptor, ToolRegistry};

pub const PROTOCOL_FAILURE_MESSAGE: &str =
    "Sorry, The model does not support MCP requests please start a new chat !";
pub const RETRIES_EXHAUSTED_MESSAGE: &str = "Could not process request, please try again !";
pub const CANCELLED_MESSAGE: &str = "Request cancelled.";

pub const DEFAULT_MAX_ROUNDS: usize = 15;
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Model round-trips per session, the first one included.
    pub max_rounds: usize,
    pub model_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Text(String),
    /// The model reply was not a protocol message, or the model call failed.
    ProtocolFailure,
    RetriesExhausted,
    Cancelled,
}

impl SessionOutcome {
    /// The text shown to the user for this outcome.
    pub fn into_message(self) -> String {
        match self {
            SessionOutcome::Text(text) => text,
            SessionOutcome::ProtocolFailure => PROTOCOL_FAILURE_MESSAGE.to_string(),
            SessionOutcome::RetriesExhausted => RETRIES_EXHAUSTED_MESSAGE.to_string(),
            SessionOutcome::Cancelled => CANCELLED_MESSAGE.to_string(),
        }
    }
}

/// A tool call made during a session and what it returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub invocation: ToolInvocation,
    /// Tool text on success, the error message otherwise.
    pub output: String,
    pub is_error: bool,
}

#[derive(Debug)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub history: History,
    pub tool_calls: Vec<ToolCall>,
}

/// Drives orchestration sessions against one registry.
pub struct ToolSession {
    registry: ToolRegistry,
    servers: Vec<ServerDescriptor>,
    limits: SessionLimits,
    cancel: CancellationToken,
}

impl ToolSession {
    pub fn new(registry: ToolRegistry, servers: Vec<ServerDescriptor>, limits: SessionLimits) -> Self {
        Self {
            registry,
            servers,
            limits,
            cancel: CancellationToken::new(),
        }
    }

    /// A session talking SSE to the configured servers.
    pub fn from_config(config: &Config) -> Self {
        let registry = ToolRegistry::new(Box::new(SseConnector::new(config.tool_timeout())))
            .with_timeouts(config.connect_timeout(), config.tool_timeout());
        Self::new(registry, config.servers.clone(), config.session_limits())
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn servers(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Use `token` to abort subsequent sessions. A cancelled token stays
    /// cancelled, so install a fresh one per request.
    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// Connect to the configured servers unless some are already usable, and
    /// make sure the catalogue is loaded.
    pub async fn ensure_connected(&mut self) {
        if !self.registry.is_connected() {
            self.registry.init_all(&self.servers).await;
            self.registry.list_all_tools().await;
        } else if self.registry.catalogue().is_empty() {
            self.registry.list_all_tools().await;
        }
    }

    /// Answer the last transcript message. Intermediate model narration is
    /// pushed onto `transcript`, followed by a call to `on_update`.
    pub async fn process_query(
        &mut self,
        transcript: &mut Vec<ChatMessage>,
        model: &dyn ModelCaller,
        on_update: impl FnMut(&[ChatMessage]),
    ) -> String {
        self.run(transcript, model, on_update)
            .await
            .outcome
            .into_message()
    }

    /// Same loop as [`ToolSession::process_query`], returning the full report.
    #[instrument(skip_all, fields(max_rounds = self.limits.max_rounds, rounds))]
    pub async fn run(
        &mut self,
        transcript: &mut Vec<ChatMessage>,
        model: &dyn ModelCaller,
        mut on_update: impl FnMut(&[ChatMessage]),
    ) -> SessionReport {
        let user_request = transcript
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();

        let mut history = History::new();
        let mut tool_calls = Vec::new();

        let cancel = self.cancel.clone();
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = self.ensure_connected() => true,
        };
        if !connected {
            info!("session cancelled while connecting");
            return SessionReport {
                outcome: SessionOutcome::Cancelled,
                history,
                tool_calls,
            };
        }

        let mut tool_response = String::new();
        let mut outcome = SessionOutcome::RetriesExhausted;

        for round in 0..self.limits.max_rounds {
            let prompt = if round == 0 {
                encode_initial_prompt(
                    self.registry.catalogue(),
                    &ModelRequest::new(user_request.as_str(), ""),
                )
                .map(OrchestrationMessage::user)
            } else {
                encode_followup_prompt(&ModelRequest::new("", tool_response.as_str()))
                    .map(OrchestrationMessage::system)
            };
            let prompt = match prompt {
                Ok(prompt) => prompt,
                Err(e) => {
                    error!(error = %e, "failed to encode prompt");
                    outcome = SessionOutcome::ProtocolFailure;
                    break;
                }
            };
            history.push(prompt);

            let raw = match self.call_model(model, &history).await {
                Ok(raw) => raw,
                Err(end) => {
                    outcome = end;
                    break;
                }
            };
            history.push(OrchestrationMessage::assistant(raw.as_str()));

            let Some(reply) = decode_reply(&raw) else {
                warn!(round, "model reply does not follow the tool protocol");
                outcome = SessionOutcome::ProtocolFailure;
                break;
            };

            match reply {
                ModelReply::Text { user_response } => {
                    outcome = SessionOutcome::Text(user_response);
                    break;
                }
                ModelReply::ToolUse {
                    user_response,
                    tool,
                } => {
                    if let Some(text) = user_response.filter(|text| !text.is_empty()) {
                        transcript.push(ChatMessage::assistant(text));
                        on_update(transcript.as_slice());
                    }

                    if round + 1 == self.limits.max_rounds {
                        debug!(tool = %tool.name, "round budget spent, tool not run");
                        break;
                    }

                    let call = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        result = self.registry.invoke(&tool) => Some(result),
                    };
                    let Some(result) = call else {
                        outcome = SessionOutcome::Cancelled;
                        break;
                    };

                    let (output, is_error) = match result {
                        Ok(text) => (text, false),
                        Err(e) => {
                            warn!(tool = %tool.name, server = %tool.server_name, error = %e, "tool call failed");
                            (e.to_string(), true)
                        }
                    };
                    tool_response = output.clone();
                    tool_calls.push(ToolCall {
                        invocation: tool,
                        output,
                        is_error,
                    });
                }
            }
        }

        tracing::Span::current().record("rounds", history.rounds());
        if outcome == SessionOutcome::RetriesExhausted {
            warn!(
                rounds = history.rounds(),
                "no final answer within the round budget"
            );
        }
        info!(
            rounds = history.rounds(),
            tool_calls = tool_calls.len(),
            "session finished"
        );

        SessionReport {
            outcome,
            history,
            tool_calls,
        }
    }

    async fn call_model(
        &self,
        model: &dyn ModelCaller,
        history: &History,
    ) -> Result<String, SessionOutcome> {
        let timeout = self.limits.model_timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SessionOutcome::Cancelled),
            result = tokio::time::timeout(timeout, model.complete(history.messages())) => match result {
                Ok(Ok(raw)) => Ok(raw),
                Ok(Err(e)) => {
                    error!(error = %e, "model call failed");
                    Err(SessionOutcome::ProtocolFailure)
                }
                Err(_) => {
                    error!(?timeout, "model call timed out");
                    Err(SessionOutcome::ProtocolFailure)
                }
            },
        }
    }

    /// Close every server connection.
    pub async fn shutdown(&mut self) {
        self.registry.disconnect_all().await;
    }
}
