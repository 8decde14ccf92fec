//! The turn engine: one user message in, one final answer out.
//!
//! A turn walks a fixed sequence of phases. Retrieval runs once, then
//! the engine loops model call, decision, tool execution until the
//! model answers in plain text or the cycle cap is hit:
//!
//! ```text
//! retrieve -> model call -> decide -+-> tool exec -> model call ...
//!                                   `-> done
//! ```
//!
//! Error policy: invalid input is rejected before anything runs;
//! everything after that point is absorbed. Retrieval failures degrade
//! to an empty context, provider failures become a synthesized final
//! answer, tool failures become tool-result messages the model gets to
//! read. A started turn always produces a well-formed
//! `(response, updated history)` pair.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use nebula_core::error::{ProviderError, ToolError};
use nebula_core::event::{DomainEvent, EventBus};
use nebula_core::message::{Conversation, Message};
use nebula_core::provider::ProviderRequest;
use nebula_core::tool::ToolRegistry;
use nebula_core::{Provider, Retriever};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::prompt::build_system_prompt;

const NOT_CONFIGURED_REPLY: &str = "I cannot process your request right now as my connection to the language model is not configured (API key missing). Please contact support.";

const NO_VALID_RESPONSE_REPLY: &str = "Error: Could not get a valid AI response.";

const MAX_CYCLES_REPLY: &str = "I wasn't able to finish processing this request within the allowed number of tool steps. Please try rephrasing your question.";

/// Rejected input. The only error `run` can return; everything else is
/// absorbed into the turn itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("Conversation id must not be empty")]
    MissingConversationId,
}

/// A completed turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The final answer text for the user.
    pub response: String,

    /// The full updated history, ready to be stored.
    pub conversation: Conversation,

    /// Model calls made during this turn.
    pub cycles: u32,
}

/// Drives one conversation turn against the injected collaborators.
///
/// Holds no per-turn state; `run` takes the history in and hands the
/// updated history back, so one engine serves every conversation.
pub struct TurnEngine {
    provider: Arc<dyn Provider>,
    retriever: Arc<dyn Retriever>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    top_k: usize,
    max_tool_cycles: u32,
}

impl TurnEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn Retriever>,
        tools: Arc<ToolRegistry>,
        model: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            retriever,
            tools,
            event_bus,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            top_k: 3,
            max_tool_cycles: 5,
        }
    }

    /// Build an engine with every knob taken from config.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn Retriever>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        config: &nebula_config::AppConfig,
    ) -> Self {
        Self::new(provider, retriever, tools, config.chat_model.clone(), event_bus)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_top_k(config.retrieval.top_k)
            .with_max_tool_cycles(config.engine.max_tool_cycles)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set how many passages retrieval contributes per turn.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Set the upper bound on model calls per turn.
    pub fn with_max_tool_cycles(mut self, max: u32) -> Self {
        self.max_tool_cycles = max;
        self
    }

    /// Run one turn: append the user message, retrieve context, loop
    /// model calls and tool executions until a final answer.
    ///
    /// The conversation is taken by value and returned in the outcome;
    /// the caller owns getting it back into the store.
    pub async fn run(
        &self,
        mut conversation: Conversation,
        user_message: &str,
    ) -> Result<TurnOutcome, TurnError> {
        if conversation.id.is_empty() {
            return Err(TurnError::MissingConversationId);
        }
        if user_message.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let started = Instant::now();
        info!(
            conversation_id = %conversation.id,
            history = conversation.len(),
            "Processing turn"
        );

        conversation.push(Message::user(user_message));

        // ── Retrieve ──
        // Best-effort: a failing index degrades to an empty context.
        let retrieved_context = match self.retriever.search(user_message, self.top_k).await {
            Ok(passages) => {
                debug!(passages = passages.len(), "Retrieved context");
                passages
            }
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                Vec::new()
            }
        };
        self.event_bus.publish(DomainEvent::RetrievalCompleted {
            conversation_id: conversation.id.to_string(),
            passages: retrieved_context.len(),
            timestamp: Utc::now(),
        });

        let tool_definitions = self.tools.definitions();
        let mut tool_outputs: Vec<String> = Vec::new();
        let mut cycles = 0u32;

        loop {
            if cycles >= self.max_tool_cycles {
                warn!(
                    conversation_id = %conversation.id,
                    cycles,
                    "Max tool cycles reached, ending turn"
                );
                conversation.push(Message::assistant(MAX_CYCLES_REPLY));
                break;
            }
            cycles += 1;

            // ── Model call ──
            // The system prompt is rebuilt every cycle and never stored.
            let system_prompt = build_system_prompt(&retrieved_context, &tool_outputs);
            let mut messages = Vec::with_capacity(conversation.len() + 1);
            messages.push(Message::system(system_prompt));
            messages.extend(conversation.messages.iter().cloned());

            let request = ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = match self.provider.complete(request).await {
                Ok(r) => r,
                Err(e) => {
                    // The raw provider error never crosses this boundary;
                    // the turn ends with a synthesized answer instead.
                    warn!(error = %e, "Model call failed");
                    conversation.push(Message::assistant(Self::provider_failure_reply(&e)));
                    break;
                }
            };

            if let Some(usage) = &response.usage {
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    conversation_id: conversation.id.to_string(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            // ── Decide ──
            let tool_calls = response.message.tool_calls().to_vec();
            conversation.push(response.message);

            if tool_calls.is_empty() {
                break;
            }

            // ── Tool exec ──
            debug!(count = tool_calls.len(), "Executing tool calls");
            for call in &tool_calls {
                let start = Instant::now();
                let result = self.tools.execute(call).await;
                let duration_ms = start.elapsed().as_millis() as u64;

                let (success, content) = match result {
                    Ok(r) => (r.success, r.output),
                    Err(ToolError::NotFound(_)) => {
                        (false, format!("Error: Unknown tool '{}' called.", call.name))
                    }
                    // Tools phrase their own argument errors.
                    Err(ToolError::InvalidArguments(msg)) => (false, msg),
                    Err(e) => (false, format!("Error: {e}")),
                };

                if !success {
                    warn!(tool = %call.name, "Tool call failed");
                }
                self.event_bus.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success,
                    duration_ms,
                    timestamp: Utc::now(),
                });

                tool_outputs.push(content.clone());
                conversation.push(Message::tool_result(&call.id, &call.name, content));
            }
            // Loop back so the model sees the tool output.
        }

        // The turn always ends on an assistant message; anything else
        // gets the fixed fallback rather than a panic.
        let response = match conversation.last() {
            Some(Message::Assistant { content, .. }) => content.clone(),
            _ => NO_VALID_RESPONSE_REPLY.to_string(),
        };

        self.event_bus.publish(DomainEvent::TurnCompleted {
            conversation_id: conversation.id.to_string(),
            cycles,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        info!(
            conversation_id = %conversation.id,
            cycles,
            messages = conversation.len(),
            "Turn complete"
        );

        Ok(TurnOutcome {
            response,
            conversation,
            cycles,
        })
    }

    fn provider_failure_reply(e: &ProviderError) -> String {
        match e {
            ProviderError::NotConfigured(_) => NOT_CONFIGURED_REPLY.to_string(),
            _ => format!(
                "Sorry, I encountered an error trying to process your request with the language model: {e}"
            ),
        }
    }
}
