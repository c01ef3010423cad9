use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{AgentError, ConfigError, ToolError};
use crate::llm::{
    ChatModel, ModelRequest, ModelStreamChunk, ModelToolChoice, ModelToolDefinition, ModelUsage,
    ResponseFormat,
};
use crate::message::{ContentItem, Conversation, Message, Role, ToolCall};
use crate::schema::parse_structured;
use crate::tools::{ApprovalMode, ToolSpec};

pub const DEFAULT_MAX_ROUNDS: u32 = 10;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: Option<String>,
    pub system_prompt: Option<String>,
    /// Upper bound on model requests per run, guarding against tool-call cycles.
    pub max_rounds: u32,
    /// Per-call limit for tool handlers; `None` waits indefinitely.
    pub tool_timeout: Option<Duration>,
    /// Schema attached to every run unless a structured run overrides it.
    pub response_format: Option<ResponseFormat>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: None,
            system_prompt: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            tool_timeout: None,
            response_format: None,
        }
    }
}

/// A gated tool call waiting for the caller's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    pub approval_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub tool_call_id: String,
    pub approved: bool,
}

impl ApprovalDecision {
    pub fn approve(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            approved: true,
        }
    }

    pub fn deny(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            approved: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    TextDelta {
        content: String,
    },
    ToolCall {
        tool: String,
        args_json: Value,
        tool_call_id: String,
    },
    ToolResult {
        tool: String,
        result_text: String,
        tool_call_id: String,
        is_error: bool,
    },
    /// The run is suspended until [`Agent::resume`] receives a decision for
    /// every request listed here.
    ApprovalRequired {
        requests: Vec<PendingApproval>,
    },
    Final {
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T = String> {
    Final(T),
    ApprovalRequired(Vec<PendingApproval>),
}

impl<T> RunOutcome<T> {
    pub fn into_final(self) -> Option<T> {
        match self {
            RunOutcome::Final(value) => Some(value),
            RunOutcome::ApprovalRequired(_) => None,
        }
    }

    fn try_map<U>(
        self,
        f: impl FnOnce(T) -> Result<U, AgentError>,
    ) -> Result<RunOutcome<U>, AgentError> {
        Ok(match self {
            RunOutcome::Final(value) => RunOutcome::Final(f(value)?),
            RunOutcome::ApprovalRequired(pending) => RunOutcome::ApprovalRequired(pending),
        })
    }
}

pub struct AgentBuilder {
    model: Option<Arc<dyn ChatModel>>,
    tools: Vec<ToolSpec>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self {
            model: None,
            tools: Vec::new(),
            config: AgentConfig::default(),
        }
    }
}

impl AgentBuilder {
    pub fn model<M>(mut self, model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        self.model = Some(Arc::new(model));
        self
    }

    /// Uses a model that is shared with other agents.
    pub fn shared_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn max_rounds(mut self, max_rounds: u32) -> Self {
        self.config.max_rounds = max_rounds;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = Some(timeout);
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.config.response_format = Some(format);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let Some(model) = self.model else {
            return Err(ConfigError::MissingModel.into());
        };

        if self.config.max_rounds == 0 {
            return Err(ConfigError::ZeroRounds.into());
        }

        let mut tool_map = HashMap::new();
        for tool in &self.tools {
            if tool_map
                .insert(tool.name().to_string(), tool.clone())
                .is_some()
            {
                return Err(ConfigError::DuplicateTool(tool.name().to_string()).into());
            }
        }

        Ok(Agent {
            model,
            tools: self.tools,
            tool_map,
            config: self.config,
            conversation: Conversation::new(),
            suspended: None,
        })
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolSpec>,
    tool_map: HashMap<String, ToolSpec>,
    config: AgentConfig,
    conversation: Conversation,
    suspended: Option<SuspendedRound>,
}

/// Everything needed to finish a round once approvals arrive.
struct SuspendedRound {
    rounds: u32,
    call_order: Vec<String>,
    pending: Vec<PendingApproval>,
    resolved: Vec<ToolExecution>,
    response_format: Option<ResponseFormat>,
    transcript: String,
}

enum TurnStart {
    Fresh {
        input: String,
        response_format: Option<ResponseFormat>,
    },
    Resume {
        decisions: Vec<ApprovalDecision>,
    },
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn name(&self) -> Option<&str> {
        self.config.name.as_deref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages_len(&self) -> usize {
        self.conversation.len()
    }

    /// Drops the history and any suspended approval round.
    pub fn clear_history(&mut self) {
        self.conversation.clear();
        self.suspended = None;
    }

    pub fn pending_approvals(&self) -> &[PendingApproval] {
        self.suspended
            .as_ref()
            .map(|suspended| suspended.pending.as_slice())
            .unwrap_or_default()
    }

    pub async fn run(&mut self, input: impl Into<String>) -> Result<RunOutcome, AgentError> {
        collect_outcome(self.run_stream(input)).await
    }

    pub async fn resume(
        &mut self,
        decisions: Vec<ApprovalDecision>,
    ) -> Result<RunOutcome, AgentError> {
        collect_outcome(self.resume_stream(decisions)).await
    }

    /// Runs one turn with `T`'s schema attached and parses the final answer.
    pub async fn run_structured<T>(
        &mut self,
        input: impl Into<String>,
    ) -> Result<RunOutcome<T>, AgentError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let format = ResponseFormat::for_type::<T>();
        let outcome = collect_outcome(self.drive(TurnStart::Fresh {
            input: input.into(),
            response_format: Some(format.clone()),
        }))
        .await?;
        outcome.try_map(|text| parse_structured(&format.schema, &text))
    }

    pub async fn resume_structured<T>(
        &mut self,
        decisions: Vec<ApprovalDecision>,
    ) -> Result<RunOutcome<T>, AgentError>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let format = ResponseFormat::for_type::<T>();
        let outcome = self.resume(decisions).await?;
        outcome.try_map(|text| parse_structured(&format.schema, &text))
    }

    /// Streams one turn. The stream is lazy and single-pass; dropping it
    /// abandons the in-flight model request and any running tool calls.
    pub fn run_stream(
        &mut self,
        input: impl Into<String>,
    ) -> impl Stream<Item = Result<RunEvent, AgentError>> + '_ {
        let response_format = self.config.response_format.clone();
        self.drive(TurnStart::Fresh {
            input: input.into(),
            response_format,
        })
    }

    pub fn resume_stream(
        &mut self,
        decisions: Vec<ApprovalDecision>,
    ) -> impl Stream<Item = Result<RunEvent, AgentError>> + '_ {
        self.drive(TurnStart::Resume { decisions })
    }

    fn drive(
        &mut self,
        start: TurnStart,
    ) -> impl Stream<Item = Result<RunEvent, AgentError>> + '_ {
        try_stream! {
            let (mut rounds, response_format, mut transcript) = match start {
                TurnStart::Fresh { input, response_format } => {
                    if self.suspended.is_some() {
                        Err::<(), AgentError>(AgentError::AwaitingApproval)?;
                    }
                    self.seed_turn(input);
                    (0, response_format, String::new())
                }
                TurnStart::Resume { decisions } => {
                    self.check_decisions(&decisions)?;
                    let approvals = decisions
                        .iter()
                        .map(|decision| (decision.tool_call_id.as_str(), decision.approved))
                        .collect::<HashMap<_, _>>();
                    let is_approved = |pending: &PendingApproval| {
                        approvals
                            .get(pending.tool_call_id.as_str())
                            .copied()
                            .unwrap_or(false)
                    };

                    let (approved, denied): (Vec<_>, Vec<_>) = self
                        .pending_approvals()
                        .iter()
                        .cloned()
                        .partition(|pending| is_approved(pending));

                    tracing::info!(
                        approved = approved.len(),
                        denied = denied.len(),
                        "resuming after approval decisions"
                    );

                    let approved_calls = approved
                        .iter()
                        .map(|pending| {
                            ToolCall::new(
                                pending.tool_call_id.clone(),
                                pending.tool_name.clone(),
                                pending.arguments.clone(),
                            )
                        })
                        .collect::<Vec<_>>();

                    // the suspension stays in place until the results are recorded,
                    // so a dropped stream can be resumed again
                    let mut resolved = self.execute_all(&approved_calls).await;
                    resolved.extend(denied.iter().map(ToolExecution::denied));

                    let SuspendedRound {
                        rounds,
                        call_order,
                        pending,
                        resolved: earlier,
                        response_format,
                        transcript,
                    } = self.suspended.take().ok_or(AgentError::NotAwaitingApproval)?;

                    self.conversation.push(Message::new(
                        Role::User,
                        pending
                            .iter()
                            .map(|request| ContentItem::ApprovalResponse {
                                id: request.approval_id.clone(),
                                approved: is_approved(request),
                            })
                            .collect(),
                    ));
                    let events = resolved.iter().map(ToolExecution::event).collect::<Vec<_>>();
                    resolved.extend(earlier);
                    self.append_tool_results(&call_order, resolved);

                    for event in events {
                        yield event;
                    }
                    (rounds, response_format, transcript)
                }
            };

            let tool_definitions = self
                .tools
                .iter()
                .map(ToolSpec::definition)
                .collect::<Vec<ModelToolDefinition>>();

            let tool_choice = if tool_definitions.is_empty() {
                ModelToolChoice::None
            } else {
                ModelToolChoice::Auto
            };

            loop {
                if rounds >= self.config.max_rounds {
                    tracing::warn!(max_rounds = self.config.max_rounds, "round limit reached");
                    Err::<(), AgentError>(AgentError::RoundLimitExceeded {
                        max_rounds: self.config.max_rounds,
                        partial_text: transcript.clone(),
                    })?;
                }
                rounds += 1;

                tracing::debug!(
                    agent = self.config.name.as_deref().unwrap_or("agent"),
                    round = rounds,
                    messages = self.conversation.len(),
                    "requesting model response"
                );

                let mut text = String::new();
                let mut tool_calls: Vec<ToolCall> = Vec::new();
                let mut usage = ModelUsage::default();

                let request = ModelRequest {
                    messages: self.conversation.messages(),
                    tools: &tool_definitions,
                    tool_choice: tool_choice.clone(),
                    response_format: response_format.as_ref(),
                };
                let mut chunks = self.model.invoke_stream(&request);
                while let Some(chunk) = chunks.next().await {
                    match chunk? {
                        ModelStreamChunk::TextDelta(delta) => {
                            if delta.is_empty() {
                                continue;
                            }
                            text.push_str(&delta);
                            transcript.push_str(&delta);
                            yield RunEvent::TextDelta { content: delta };
                        }
                        ModelStreamChunk::ToolCall(call) => {
                            yield RunEvent::ToolCall {
                                tool: call.name.clone(),
                                args_json: call.arguments.clone(),
                                tool_call_id: call.id.clone(),
                            };
                            tool_calls.push(call);
                        }
                        ModelStreamChunk::Usage(chunk_usage) => usage.absorb(chunk_usage),
                    }
                }
                drop(chunks);

                tracing::debug!(
                    round = rounds,
                    tool_calls = tool_calls.len(),
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "model response complete"
                );

                let assistant = assistant_message(&text, &tool_calls);

                if tool_calls.is_empty() {
                    self.conversation.push(assistant);
                    yield RunEvent::Final { content: text };
                    return;
                }

                let (gated, auto): (Vec<ToolCall>, Vec<ToolCall>) = tool_calls
                    .iter()
                    .cloned()
                    .partition(|call| self.requires_approval(&call.name));

                // nothing from this round is recorded until its results exist,
                // so dropping the stream mid-execution leaves history paired
                let resolved = self.execute_all(&auto).await;
                let events = resolved.iter().map(ToolExecution::event).collect::<Vec<_>>();
                let call_order = tool_calls.into_iter().map(|call| call.id).collect::<Vec<_>>();
                self.conversation.push(assistant);

                if gated.is_empty() {
                    self.append_tool_results(&call_order, resolved);
                    for event in events {
                        yield event;
                    }
                    continue;
                }

                let pending = gated
                    .into_iter()
                    .map(|call| PendingApproval {
                        approval_id: format!("approval_{}", call.id),
                        tool_call_id: call.id,
                        tool_name: call.name,
                        arguments: call.arguments,
                    })
                    .collect::<Vec<_>>();

                self.conversation.push(Message::new(
                    Role::Assistant,
                    pending
                        .iter()
                        .map(|request| ContentItem::ApprovalRequest {
                            id: request.approval_id.clone(),
                            tool_call_id: request.tool_call_id.clone(),
                        })
                        .collect(),
                ));

                tracing::info!(
                    round = rounds,
                    pending = pending.len(),
                    "suspending run until approvals are decided"
                );

                self.suspended = Some(SuspendedRound {
                    rounds,
                    call_order,
                    pending: pending.clone(),
                    resolved,
                    response_format: response_format.clone(),
                    transcript: transcript.clone(),
                });

                for event in events {
                    yield event;
                }
                yield RunEvent::ApprovalRequired { requests: pending };
                return;
            }
        }
    }

    fn seed_turn(&mut self, input: String) {
        if self.conversation.is_empty() {
            if let Some(system_prompt) = &self.config.system_prompt {
                self.conversation.push(Message::system(system_prompt.clone()));
            }
        }
        self.conversation.push(Message::user(input));
    }

    /// Every pending call needs a decision and every decision must name a
    /// pending call.
    fn check_decisions(&self, decisions: &[ApprovalDecision]) -> Result<(), AgentError> {
        let Some(suspended) = self.suspended.as_ref() else {
            return Err(AgentError::NotAwaitingApproval);
        };

        if let Some(unknown) = decisions.iter().find(|decision| {
            !suspended
                .pending
                .iter()
                .any(|pending| pending.tool_call_id == decision.tool_call_id)
        }) {
            return Err(AgentError::UnknownApproval(unknown.tool_call_id.clone()));
        }

        let missing = suspended
            .pending
            .iter()
            .filter(|pending| {
                !decisions
                    .iter()
                    .any(|decision| decision.tool_call_id == pending.tool_call_id)
            })
            .map(|pending| pending.tool_call_id.clone())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(AgentError::IncompleteApprovalSet { missing });
        }

        Ok(())
    }

    fn requires_approval(&self, tool_name: &str) -> bool {
        self.tool_map
            .get(tool_name)
            .is_some_and(|tool| tool.approval_mode() == ApprovalMode::AlwaysRequire)
    }

    async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolExecution> {
        futures_util::future::join_all(calls.iter().map(|call| self.execute_tool_call(call))).await
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> ToolExecution {
        let Some(tool) = self.tool_map.get(&call.name) else {
            return ToolExecution::failed(call, ToolError::NotFound(call.name.clone()));
        };

        let execution = tool.execute(call.arguments.clone());
        let outcome = match self.config.tool_timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ToolError::Timeout {
                    tool: call.name.clone(),
                    timeout: limit,
                }),
            },
            None => execution.await,
        };

        match outcome {
            Ok(output) => ToolExecution {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result_text: output.into_text(),
                is_error: false,
            },
            Err(err) => ToolExecution::failed(call, err),
        }
    }

    /// Appends one tool message holding every result, in request order.
    fn append_tool_results(&mut self, call_order: &[String], mut results: Vec<ToolExecution>) {
        results.sort_by_key(|execution| {
            call_order
                .iter()
                .position(|id| *id == execution.tool_call_id)
                .unwrap_or(usize::MAX)
        });

        self.conversation.push(Message::new(
            Role::Tool,
            results
                .into_iter()
                .map(|execution| ContentItem::ToolCallResult {
                    id: execution.tool_call_id,
                    value: execution.result_text,
                    is_error: execution.is_error,
                })
                .collect(),
        ));
    }
}

fn assistant_message(text: &str, tool_calls: &[ToolCall]) -> Message {
    let mut content = Vec::new();
    if !text.is_empty() {
        content.push(ContentItem::text(text));
    }
    content.extend(tool_calls.iter().cloned().map(ContentItem::from));
    Message::new(Role::Assistant, content)
}

async fn collect_outcome<S>(stream: S) -> Result<RunOutcome, AgentError>
where
    S: Stream<Item = Result<RunEvent, AgentError>>,
{
    futures_util::pin_mut!(stream);

    let mut outcome = None;
    while let Some(event) = stream.next().await {
        match event? {
            RunEvent::Final { content } => outcome = Some(RunOutcome::Final(content)),
            RunEvent::ApprovalRequired { requests } => {
                outcome = Some(RunOutcome::ApprovalRequired(requests))
            }
            RunEvent::TextDelta { .. }
            | RunEvent::ToolCall { .. }
            | RunEvent::ToolResult { .. } => {}
        }
    }

    outcome.ok_or(AgentError::MissingFinalResponse)
}

struct ToolExecution {
    tool_call_id: String,
    tool_name: String,
    result_text: String,
    is_error: bool,
}

impl ToolExecution {
    fn failed(call: &ToolCall, err: ToolError) -> Self {
        tracing::warn!(tool = %call.name, tool_call_id = %call.id, error = %err, "tool call failed");
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result_text: err.to_string(),
            is_error: true,
        }
    }

    fn denied(pending: &PendingApproval) -> Self {
        Self {
            tool_call_id: pending.tool_call_id.clone(),
            tool_name: pending.tool_name.clone(),
            result_text: format!("Tool call '{}' was denied by the user.", pending.tool_name),
            is_error: true,
        }
    }

    fn event(&self) -> RunEvent {
        RunEvent::ToolResult {
            tool: self.tool_name.clone(),
            result_text: self.result_text.clone(),
            tool_call_id: self.tool_call_id.clone(),
            is_error: self.is_error,
        }
    }
}

pub async fn run(agent: &mut Agent, input: impl Into<String>) -> Result<RunOutcome, AgentError> {
    agent.run(input).await
}

pub fn run_stream(
    agent: &mut Agent,
    input: impl Into<String>,
) -> impl Stream<Item = Result<RunEvent, AgentError>> + '_ {
    agent.run_stream(input)
}
