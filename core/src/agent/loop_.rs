use crate::agent::{ReasoningStep, ToolCallResult, ToolRegistry};
use crate::error::{AgentError, AgentResult, ProviderError};
use crate::traits::{ChatMessage, ChatRequest, ChatResponse, Provider, ToolCall, ToolSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ITERATIONS: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Appended as a user turn once the iteration budget is spent.
pub const FINALIZE_INSTRUCTION: &str = "You have reached the tool call limit. Summarize what you \
know so far and answer the original question directly. Do not request further tools.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The model answered on its own.
    Completed,
    /// The iteration budget ran out and the model was asked to summarize.
    Summarized,
    /// The model rejected tool schemas; the request was replayed without them.
    ToolsUnsupported,
}

/// Result of one orchestrated exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub answer: String,
    /// History, the new user message, and everything appended after it.
    pub messages: Vec<ChatMessage>,
    pub tool_results: Vec<ToolCallResult>,
    /// Completion calls made with tools enabled.
    pub iterations: usize,
    pub finish: FinishReason,
}

impl Exchange {
    pub fn traces(&self) -> Vec<ReasoningStep> {
        self.tool_results.iter().map(ToolCallResult::trace).collect()
    }
}

enum State {
    AwaitingCompletion,
    ExecutingTools(Vec<ToolCall>),
    Done(String),
    Aborted,
}

pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tool_registry: Arc<ToolRegistry>,
    max_iterations: usize,
    request_timeout: Duration,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, tool_registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tool_registry,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub async fn process(&self, message: &str) -> AgentResult<Exchange> {
        self.process_with_history(message, vec![]).await
    }

    pub async fn process_with_history(
        &self,
        message: &str,
        history: Vec<ChatMessage>,
    ) -> AgentResult<Exchange> {
        let mut messages = history;
        messages.push(ChatMessage::user(message));
        let prefix_len = messages.len();

        let specs = self.tool_registry.get_specs();
        let tools = if specs.is_empty() {
            None
        } else {
            Some(specs.as_slice())
        };

        let mut tool_results = Vec::new();
        let mut iterations = 0;
        let mut state = State::AwaitingCompletion;

        loop {
            state = match state {
                State::AwaitingCompletion if iterations >= self.max_iterations => State::Aborted,
                State::AwaitingCompletion => {
                    iterations += 1;
                    debug!(
                        iteration = iterations,
                        messages = messages.len(),
                        "requesting completion"
                    );

                    let response = match self.complete(&messages, tools).await {
                        Ok(response) => response,
                        Err(e) if e.is_unsupported() => {
                            return self
                                .fallback_without_tools(
                                    messages,
                                    prefix_len,
                                    tool_results,
                                    iterations,
                                    e,
                                )
                                .await;
                        }
                        Err(e) => return Err(e.into()),
                    };

                    match response {
                        ChatResponse::ToolCalls { text, calls } => {
                            info!(
                                iteration = iterations,
                                count = calls.len(),
                                "model requested tool calls"
                            );
                            messages.push(ChatMessage::assistant_with_tool_calls(
                                text,
                                calls.clone(),
                            ));
                            State::ExecutingTools(calls)
                        }
                        ChatResponse::Text(Some(text)) if !text.trim().is_empty() => {
                            State::Done(text.trim().to_string())
                        }
                        ChatResponse::Text(_) => {
                            warn!(
                                iteration = iterations,
                                "model returned neither text nor tool calls"
                            );
                            State::Aborted
                        }
                    }
                }
                State::ExecutingTools(calls) => {
                    for call in calls {
                        let result = self.tool_registry.invoke(&call.name, &call.arguments).await;
                        messages.push(ChatMessage::tool_result(call.id, result.content()));
                        tool_results.push(result);
                    }
                    State::AwaitingCompletion
                }
                State::Done(answer) => {
                    messages.push(ChatMessage::assistant(answer.clone()));
                    return Ok(Exchange {
                        answer,
                        messages,
                        tool_results,
                        iterations,
                        finish: FinishReason::Completed,
                    });
                }
                State::Aborted => {
                    return self
                        .finalize(messages, prefix_len, tool_results, iterations)
                        .await;
                }
            };
        }
    }

    /// One last completion with tools disabled, asking the model to answer
    /// from what it has gathered.
    async fn finalize(
        &self,
        mut messages: Vec<ChatMessage>,
        prefix_len: usize,
        tool_results: Vec<ToolCallResult>,
        iterations: usize,
    ) -> AgentResult<Exchange> {
        warn!(
            iterations,
            max = self.max_iterations,
            "iteration budget exhausted, requesting summary without tools"
        );
        messages.push(ChatMessage::user(FINALIZE_INSTRUCTION));

        let response = match self.complete(&messages, None).await {
            Ok(response) => response,
            Err(e) if e.is_unsupported() => {
                return self
                    .fallback_without_tools(messages, prefix_len, tool_results, iterations, e)
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        let answer = response
            .non_empty_text()
            .ok_or(AgentError::NoAnswerProduced)?
            .to_string();
        messages.push(ChatMessage::assistant(answer.clone()));

        Ok(Exchange {
            answer,
            messages,
            tool_results,
            iterations,
            finish: FinishReason::Summarized,
        })
    }

    /// Replays the original request (history plus the new user message)
    /// without tool schemas. Taken at most once per exchange; any failure
    /// here propagates.
    async fn fallback_without_tools(
        &self,
        mut messages: Vec<ChatMessage>,
        prefix_len: usize,
        tool_results: Vec<ToolCallResult>,
        iterations: usize,
        cause: ProviderError,
    ) -> AgentResult<Exchange> {
        warn!(error = %cause, "model rejected tools, retrying without them");
        messages.truncate(prefix_len);

        let response = self.complete(&messages, None).await?;
        let answer = response
            .non_empty_text()
            .ok_or(AgentError::NoAnswerProduced)?
            .to_string();
        messages.push(ChatMessage::assistant(answer.clone()));

        Ok(Exchange {
            answer,
            messages,
            tool_results,
            iterations,
            finish: FinishReason::ToolsUnsupported,
        })
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSpec]>,
    ) -> Result<ChatResponse, ProviderError> {
        let request = ChatRequest {
            messages,
            tools,
            timeout: self.request_timeout,
        };

        tokio::time::timeout(self.request_timeout, self.provider.chat(request))
            .await
            .map_err(|_| ProviderError::Timeout(self.request_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct SeenRequest {
        messages: Vec<ChatMessage>,
        had_tools: bool,
    }

    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ChatResponse, ProviderError>>>,
        seen: Mutex<Vec<SeenRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ChatResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
                delay: None,
            })
        }

        fn seen(&self) -> Vec<SeenRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse, ProviderError> {
            self.seen.lock().unwrap().push(SeenRequest {
                messages: request.messages.to_vec(),
                had_tools: request.tools.is_some(),
            });
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
        }
    }

    fn text(content: &str) -> Result<ChatResponse, ProviderError> {
        Ok(ChatResponse::Text(Some(content.to_string())))
    }

    fn calls(calls: &[(&str, &str, &str)]) -> Result<ChatResponse, ProviderError> {
        Ok(ChatResponse::ToolCalls {
            text: None,
            calls: calls
                .iter()
                .map(|(id, name, args)| ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: args.to_string(),
                })
                .collect(),
        })
    }

    fn agent(provider: Arc<ScriptedProvider>) -> AgentLoop {
        AgentLoop::new(provider, Arc::new(ToolRegistry::with_default_tools(None)))
    }

    #[tokio::test]
    async fn answers_after_one_calculator_round() {
        let provider = ScriptedProvider::new(vec![
            calls(&[("call_1", "calculator", r#"{"expression": "12*7"}"#)]),
            text("12 * 7 is 84."),
        ]);
        let exchange = agent(provider.clone()).process("What is 12 * 7?").await.unwrap();

        assert_eq!(exchange.answer, "12 * 7 is 84.");
        assert_eq!(exchange.finish, FinishReason::Completed);
        assert_eq!(exchange.iterations, 2);
        assert_eq!(exchange.tool_results.len(), 1);
        assert_eq!(exchange.tool_results[0].content(), "84");

        let roles: Vec<Role> = exchange.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(exchange.messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(exchange.messages[2].content_or_empty(), "84");

        let seen = provider.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|r| r.had_tools));
        assert_eq!(seen[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn tool_results_follow_request_order() {
        let provider = ScriptedProvider::new(vec![
            calls(&[
                ("a", "calculator", r#"{"expression": "1+1"}"#),
                ("b", "weather", r#"{}"#),
                ("c", "calculator", r#"{"expression": "2*3"}"#),
            ]),
            text("done"),
        ]);
        let exchange = agent(provider).process("go").await.unwrap();

        let tool_messages: Vec<&ChatMessage> = exchange
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        let ids: Vec<&str> = tool_messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(tool_messages[0].content_or_empty(), "2");
        assert_eq!(tool_messages[2].content_or_empty(), "6");
    }

    #[tokio::test]
    async fn unknown_tool_is_fed_back_and_loop_continues() {
        let provider = ScriptedProvider::new(vec![
            calls(&[("w1", "weather", r#"{"city": "Oslo"}"#)]),
            text("I cannot check the weather."),
        ]);
        let exchange = agent(provider).process("Weather in Oslo?").await.unwrap();

        assert_eq!(exchange.answer, "I cannot check the weather.");
        assert_eq!(
            exchange.messages[2].content_or_empty(),
            "Error: Tool weather not found"
        );
        assert_eq!(
            exchange.traces()[0].error.as_deref(),
            Some("Tool weather not found")
        );
    }

    #[tokio::test]
    async fn malformed_arguments_do_not_abort() {
        let provider = ScriptedProvider::new(vec![
            calls(&[("x", "calculator", "{expression: 12*7")]),
            text("Sorry, retrying failed."),
        ]);
        let exchange = agent(provider).process("12*7?").await.unwrap();
        assert!(
            exchange.messages[2]
                .content_or_empty()
                .starts_with("Error: Invalid arguments for calculator")
        );
    }

    #[tokio::test]
    async fn retries_without_tools_when_unsupported() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::from_message(
                "registry.ollama.ai/library/gemma:2b does not support tools",
            )),
            text("Hello there."),
        ]);
        let history = vec![ChatMessage::user("hi"), ChatMessage::assistant("hey")];
        let exchange = agent(provider.clone())
            .process_with_history("how are you?", history)
            .await
            .unwrap();

        assert_eq!(exchange.answer, "Hello there.");
        assert_eq!(exchange.finish, FinishReason::ToolsUnsupported);
        assert_eq!(exchange.messages.len(), 4);

        let seen = provider.seen();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].had_tools);
        assert!(!seen[1].had_tools);
        assert_eq!(seen[1].messages, seen[0].messages);
    }

    #[tokio::test]
    async fn answers_are_trimmed_on_every_exit_path() {
        let completed = ScriptedProvider::new(vec![text("\n  84  \n")]);
        let exchange = agent(completed).process("12*7?").await.unwrap();
        assert_eq!(exchange.finish, FinishReason::Completed);
        assert_eq!(exchange.answer, "84");
        assert_eq!(exchange.messages[1].content_or_empty(), "84");

        let summarized = ScriptedProvider::new(vec![text("  84 ")]);
        let exchange = agent(summarized)
            .with_max_iterations(0)
            .process("12*7?")
            .await
            .unwrap();
        assert_eq!(exchange.finish, FinishReason::Summarized);
        assert_eq!(exchange.answer, "84");

        let fallback = ScriptedProvider::new(vec![
            Err(ProviderError::from_message("does not support tools")),
            text(" 84\n"),
        ]);
        let exchange = agent(fallback).process("12*7?").await.unwrap();
        assert_eq!(exchange.finish, FinishReason::ToolsUnsupported);
        assert_eq!(exchange.answer, "84");
    }

    #[tokio::test]
    async fn fallback_is_attempted_only_once() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::from_message("does not support tools")),
            Err(ProviderError::from_message("does not support tools")),
        ]);
        let err = agent(provider.clone()).process("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::Unsupported(_))));
        assert_eq!(provider.seen().len(), 2);
    }

    #[tokio::test]
    async fn other_provider_errors_propagate() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::from_message(
            "500 Internal Server Error",
        ))]);
        let err = agent(provider.clone()).process("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::Other(_))));
        assert_eq!(provider.seen().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_without_answer_reports_no_answer() {
        let mut script: Vec<_> = (0..5)
            .map(|_| calls(&[("t", "current_time", "{}")]))
            .collect();
        script.push(text("   "));
        let provider = ScriptedProvider::new(script);

        let err = agent(provider.clone()).process("loop forever").await.unwrap_err();
        assert!(matches!(err, AgentError::NoAnswerProduced));

        let seen = provider.seen();
        assert_eq!(seen.len(), 6);
        assert!(seen[..5].iter().all(|r| r.had_tools));
        let last = &seen[5];
        assert!(!last.had_tools);
        assert_eq!(
            last.messages.last().map(|m| m.content_or_empty()),
            Some(FINALIZE_INSTRUCTION)
        );
        let tool_messages = last.messages.iter().filter(|m| m.role == Role::Tool).count();
        assert_eq!(tool_messages, 5);
    }

    #[tokio::test]
    async fn exhausted_budget_uses_summary() {
        let provider = ScriptedProvider::new(vec![
            calls(&[("t1", "current_time", "{}")]),
            calls(&[("t2", "current_time", "{}")]),
            text("It is about noon."),
        ]);
        let exchange = agent(provider)
            .with_max_iterations(2)
            .process("time?")
            .await
            .unwrap();

        assert_eq!(exchange.answer, "It is about noon.");
        assert_eq!(exchange.finish, FinishReason::Summarized);
        assert_eq!(exchange.iterations, 2);
        assert_eq!(exchange.tool_results.len(), 2);
    }

    #[tokio::test]
    async fn zero_iterations_still_finalizes() {
        let provider = ScriptedProvider::new(vec![text("Direct answer.")]);
        let exchange = agent(provider.clone())
            .with_max_iterations(0)
            .process("hi")
            .await
            .unwrap();
        assert_eq!(exchange.answer, "Direct answer.");
        assert_eq!(exchange.iterations, 0);

        let seen = provider.seen();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].had_tools);

        let provider = ScriptedProvider::new(vec![Ok(ChatResponse::Text(None))]);
        let err = agent(provider.clone())
            .with_max_iterations(0)
            .process("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoAnswerProduced));
        assert_eq!(provider.seen().len(), 1);
    }

    #[tokio::test]
    async fn empty_reply_goes_straight_to_summary() {
        let provider = ScriptedProvider::new(vec![
            Ok(ChatResponse::Text(None)),
            text("Here is my answer."),
        ]);
        let exchange = agent(provider.clone()).process("hi").await.unwrap();
        assert_eq!(exchange.finish, FinishReason::Summarized);
        assert_eq!(provider.seen().len(), 2);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let provider = Arc::new(ScriptedProvider {
            script: Mutex::new(vec![text("late")].into()),
            seen: Mutex::new(Vec::new()),
            delay: Some(Duration::from_secs(5)),
        });
        let err = agent(provider)
            .with_request_timeout(Duration::from_millis(20))
            .process("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn empty_registry_sends_no_tool_schema() {
        let provider = ScriptedProvider::new(vec![text("ok")]);
        let agent = AgentLoop::new(provider.clone(), Arc::new(ToolRegistry::new()));
        agent.process("hi").await.unwrap();
        assert!(!provider.seen()[0].had_tools);
    }
}
