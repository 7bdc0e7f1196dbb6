use crate::agent::{AgentLoop, Exchange, ReasoningStep};
use crate::error::AgentResult;
use crate::traits::ChatMessage;
use std::sync::Arc;

/// One conversation: the history it owns and the loop that extends it.
pub struct Session {
    agent: Arc<AgentLoop>,
    history: Vec<ChatMessage>,
    last_traces: Vec<ReasoningStep>,
}

impl Session {
    pub fn new(agent: Arc<AgentLoop>) -> Self {
        Self {
            agent,
            history: Vec::new(),
            last_traces: Vec::new(),
        }
    }

    /// Runs one exchange. On success the history becomes the exchange's
    /// message sequence; on failure it is left as it was.
    pub async fn ask(&mut self, prompt: &str) -> AgentResult<Exchange> {
        let exchange = self
            .agent
            .process_with_history(prompt, self.history.clone())
            .await?;

        self.history = exchange.messages.clone();
        self.last_traces = exchange.traces();
        Ok(exchange)
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn last_traces(&self) -> &[ReasoningStep] {
        &self.last_traces
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.last_traces.clear();
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }
}
