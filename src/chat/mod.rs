//! Human-in-the-loop conversational workflow.
//!
//! Three steps: `agent` invokes the model with the search tool and the
//! `ask_human` pseudo-tool bound; `tool_call` dispatches requested tool
//! invocations; `ask_human` suspends the run until the caller resumes the
//! session with an answer. Routing after `agent` inspects the latest
//! assistant message: no tool call ends the run, an `ask_human` request goes
//! to the interrupt step, anything else goes to dispatch.

use crate::error::EngineError;
use crate::graph::{
    CheckpointStore, Graph, GraphBuilder, StateUpdate, Step, StepResult, Transition,
    WorkflowState, END,
};
use crate::llm::{ChatModel, GenerationConfig, Message, ToolSpec};
use crate::tools::{search::WebSearchTool, ToolSet};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const AGENT: &str = "agent";
pub const TOOL_CALL: &str = "tool_call";
pub const ASK_HUMAN: &str = "ask_human";

/// Binding spec for the ask-human pseudo-tool. There is no handler behind
/// it; requesting it routes the run into the interrupt step.
pub fn ask_human_spec() -> ToolSpec {
    ToolSpec {
        name: ASK_HUMAN.to_string(),
        description: "Ask the human a question and wait for their answer.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the human"
                }
            },
            "required": ["question"]
        }),
    }
}

/// Invokes the generation service with the conversation so far and the bound
/// tool definitions, appending the response.
pub struct CallModel {
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolSpec>,
    config: GenerationConfig,
}

impl CallModel {
    pub fn new(model: Arc<dyn ChatModel>, tools: Vec<ToolSpec>, config: GenerationConfig) -> Self {
        Self {
            model,
            tools,
            config,
        }
    }
}

#[async_trait]
impl Step for CallModel {
    async fn run(&self, state: &WorkflowState) -> Result<StepResult, EngineError> {
        let response = self
            .model
            .invoke(&state.messages, &self.config, &self.tools)
            .await?;
        Ok(StepResult::Update(StateUpdate::new().append(response)))
    }
}

/// Executes every tool invocation pending on the latest assistant message
/// and appends a tool-result message per invocation. An invocation naming an
/// unregistered tool is a fatal configuration error.
pub struct DispatchTools {
    tools: ToolSet,
}

impl DispatchTools {
    pub fn new(tools: ToolSet) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Step for DispatchTools {
    async fn run(&self, state: &WorkflowState) -> Result<StepResult, EngineError> {
        let calls = state.pending_tool_calls();
        if calls.is_empty() {
            return Err(EngineError::validation(
                "tool dispatch reached without a pending invocation",
            ));
        }

        let mut update = StateUpdate::new();
        for call in calls {
            let tool = self
                .tools
                .get(&call.name)
                .ok_or_else(|| EngineError::UnregisteredTool(call.name.clone()))?;
            log::info!("Tool call: {} {}", call.name, call.arguments);
            let result = tool.execute(call.arguments.clone()).await?;
            update = update.append(Message::tool(call.id.clone(), result));
        }
        Ok(StepResult::Update(update))
    }
}

/// Extracts the question from the pending `ask_human` invocation and
/// suspends the run. The executor records this step in the checkpoint so a
/// later resume continues along its outgoing edge.
pub struct AskHuman;

#[async_trait]
impl Step for AskHuman {
    async fn run(&self, state: &WorkflowState) -> Result<StepResult, EngineError> {
        let call = state
            .pending_tool_calls()
            .iter()
            .find(|c| c.name == ASK_HUMAN)
            .ok_or_else(|| {
                EngineError::validation("ask-human step reached without a pending question")
            })?;

        let question = call
            .arguments
            .get("question")
            .and_then(|q| q.as_str())
            .ok_or_else(|| {
                EngineError::validation("ask_human invocation is missing a question argument")
            })?
            .to_string();

        log::info!("Asking human for input: {}", question);
        Ok(StepResult::Suspend { question })
    }
}

/// Tool-or-stop routing over the latest assistant message.
pub fn should_continue(state: &WorkflowState) -> Transition {
    match state.pending_tool_calls().first() {
        None => Transition::End,
        Some(call) if call.name == ASK_HUMAN => Transition::to(ASK_HUMAN),
        Some(_) => Transition::to(TOOL_CALL),
    }
}

/// Build the conversational graph against the given model and checkpoint
/// store.
pub fn build_chat_graph(
    model: Arc<dyn ChatModel>,
    checkpoints: Arc<dyn CheckpointStore>,
) -> Result<Graph, EngineError> {
    let tools = ToolSet::new(vec![Arc::new(WebSearchTool)]);
    let mut tool_specs = tools.specs();
    tool_specs.push(ask_human_spec());

    let config = GenerationConfig {
        temperature: Some(0.7),
        max_tokens: Some(1000),
    };

    GraphBuilder::new("chat")
        .add_step(AGENT, Arc::new(CallModel::new(model, tool_specs, config)))
        .add_step(TOOL_CALL, Arc::new(DispatchTools::new(tools)))
        .add_step(ASK_HUMAN, Arc::new(AskHuman))
        .set_entry(AGENT)
        .add_conditional(AGENT, should_continue, &[ASK_HUMAN, TOOL_CALL, END])
        .add_edge(TOOL_CALL, AGENT)
        .add_edge(ASK_HUMAN, AGENT)
        .compile(checkpoints)
}
