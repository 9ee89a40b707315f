//! End-to-end workflow tests using mock collaborators.
//!
//! These exercise the two built-in workflows against scripted model
//! responses: suspension and resumption of the conversational graph, and
//! the iteration-bounded critique loop of the research graph.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use trellis_rs::chat::{build_chat_graph, ASK_HUMAN};
use trellis_rs::error::{EngineError, ModelError, RetrievalError};
use trellis_rs::graph::{
    CheckpointStore, MemoryCheckpointStore, RunOutcome, RunReport, WorkflowState,
};
use trellis_rs::llm::{ChatModel, GenerationConfig, Message, Role, ToolCall, ToolSpec};
use trellis_rs::research::{build_research_graph, initial_state, prompts::PromptLibrary};
use trellis_rs::retrieval::{Retriever, Snippet};

// ============================================================================
// Mock Components
// ============================================================================

/// Mock model that returns predefined responses in order.
struct MockModel {
    responses: Vec<Message>,
    response_index: AtomicUsize,
}

impl MockModel {
    fn new(responses: Vec<Message>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            response_index: AtomicUsize::new(0),
        })
    }

    fn tool_call_response(id: &str, name: &str, arguments: serde_json::Value) -> Message {
        Message::assistant_with_calls(
            "",
            vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            }],
        )
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn invoke(
        &self,
        _messages: &[Message],
        _config: &GenerationConfig,
        _tools: &[ToolSpec],
    ) -> Result<Message, ModelError> {
        let idx = self.response_index.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(idx) {
            Some(response) => Ok(response.clone()),
            None => Err(ModelError::InvalidResponse(
                "mock model ran out of scripted responses".to_string(),
            )),
        }
    }
}

/// Retriever with no corpus behind it.
struct EmptyRetriever;

#[async_trait]
impl Retriever for EmptyRetriever {
    async fn search(
        &self,
        _query: &str,
        _company_code: Option<&str>,
        _top_k: usize,
    ) -> Result<Vec<Snippet>, RetrievalError> {
        Ok(vec![])
    }
}

fn weather_scripts() -> Vec<Message> {
    vec![
        MockModel::tool_call_response(
            "call_ask_1",
            ASK_HUMAN,
            json!({"question": "Where are you located?"}),
        ),
        MockModel::tool_call_response(
            "call_search_1",
            "search",
            json!({"query": "weather in san francisco"}),
        ),
        Message::assistant("The weather in San Francisco is sunny."),
    ]
}

fn research_graph_with_scripts(
    scripts: Vec<Message>,
) -> (trellis_rs::graph::Graph, Arc<MemoryCheckpointStore>) {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let graph = build_research_graph(
        MockModel::new(scripts),
        Arc::new(EmptyRetriever),
        Arc::new(PromptLibrary::empty()),
        checkpoints.clone(),
    )
    .expect("failed to build research graph");
    (graph, checkpoints)
}

fn completed_state(report: RunReport) -> WorkflowState {
    match report.outcome {
        RunOutcome::Completed(state) => state,
        RunOutcome::Suspended { question } => {
            panic!("expected completion, suspended on: {}", question)
        }
    }
}

// ============================================================================
// Human-in-the-loop Scenario
// ============================================================================

#[tokio::test]
async fn test_chat_suspends_with_extracted_question() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let graph = build_chat_graph(MockModel::new(weather_scripts()), checkpoints.clone()).unwrap();

    let initial = WorkflowState::from_user_message(
        "Ask the user where they are, then look up the weather there",
    );
    let report = graph.run(initial, "session-1").await.unwrap();

    match report.outcome {
        RunOutcome::Suspended { question } => {
            assert_eq!(question, "Where are you located?");
        }
        _ => panic!("expected suspension at the ask-human step"),
    }

    let cp = checkpoints.load("session-1").await.unwrap().unwrap();
    assert_eq!(cp.step, "ask_human");
    assert_eq!(cp.state.pending_tool_calls()[0].id, "call_ask_1");
}

#[tokio::test]
async fn test_resume_links_answer_to_pending_invocation() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let graph = build_chat_graph(MockModel::new(weather_scripts()), checkpoints.clone()).unwrap();

    let initial = WorkflowState::from_user_message(
        "Ask the user where they are, then look up the weather there",
    );
    graph.run(initial, "session-1").await.unwrap();

    // invocation id recorded before suspension
    let pending_id = checkpoints
        .load("session-1")
        .await
        .unwrap()
        .unwrap()
        .state
        .pending_tool_calls()[0]
        .id
        .clone();

    let report = graph.resume("session-1", "san francisco").await.unwrap();
    let state = completed_state(report);

    // the synthetic tool result pairs the answer with the recorded id
    let answer = state
        .messages
        .iter()
        .find(|m| m.role == Role::Tool && m.content == "san francisco")
        .expect("synthetic tool result missing");
    assert_eq!(answer.tool_call_id.as_deref(), Some(pending_id.as_str()));

    // the run continued: the search tool ran with the answered location
    let search_result = state
        .messages
        .iter()
        .find(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("call_search_1"))
        .expect("search tool result missing");
    assert!(search_result.content.contains("san francisco"));

    assert_eq!(
        state.last_assistant_text(),
        Some("The weather in San Francisco is sunny.")
    );
}

#[tokio::test]
async fn test_chat_conversation_is_concatenation_of_step_events() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let graph = build_chat_graph(MockModel::new(weather_scripts()), checkpoints).unwrap();

    let initial = WorkflowState::from_user_message(
        "Ask the user where they are, then look up the weather there",
    );
    let mut expected = initial.messages.clone();

    let first = graph.run(initial, "session-1").await.unwrap();
    for event in &first.events {
        expected.extend(event.messages.clone());
    }

    let second = graph.resume("session-1", "san francisco").await.unwrap();
    for event in &second.events {
        expected.extend(event.messages.clone());
    }

    let state = completed_state(second);
    assert_eq!(state.messages, expected);
}

#[tokio::test]
async fn test_chat_unknown_tool_is_fatal() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let scripts = vec![MockModel::tool_call_response(
        "call_1",
        "jira_lookup",
        json!({"ticket": "ENG-1"}),
    )];
    let graph = build_chat_graph(MockModel::new(scripts), checkpoints).unwrap();

    let err = graph
        .run(WorkflowState::from_user_message("look up ENG-1"), "s1")
        .await
        .unwrap_err();

    match err {
        EngineError::UnregisteredTool(name) => assert_eq!(name, "jira_lookup"),
        other => panic!("expected UnregisteredTool, got {:?}", other),
    }
}

#[tokio::test]
async fn test_chat_plain_answer_completes_without_tools() {
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let scripts = vec![Message::assistant("Just an answer.")];
    let graph = build_chat_graph(MockModel::new(scripts), checkpoints).unwrap();

    let report = graph
        .run(WorkflowState::from_user_message("hello"), "s1")
        .await
        .unwrap();
    let state = completed_state(report);
    assert_eq!(state.last_assistant_text(), Some("Just an answer."));
    assert_eq!(state.messages.len(), 2);
}

// ============================================================================
// Research Critique Loop
// ============================================================================

#[tokio::test]
async fn test_research_critique_loop_runs_draft_review_revise() {
    let (graph, _) = research_graph_with_scripts(vec![
        Message::assistant("DRAFT ONE"),
        Message::assistant("NEEDS A RISKS SECTION"),
        Message::assistant("DRAFT TWO"),
    ]);

    let state = initial_state("AAPL", "IT", "FirstCutReport", 1).unwrap();
    let report = graph.run(state, "research-1").await.unwrap();

    let steps: Vec<&str> = report.events.iter().map(|e| e.step.as_str()).collect();
    assert_eq!(
        steps,
        vec![
            "initialize",
            "junior_analyst",
            "senior_analyst",
            "junior_analyst",
            "finalize"
        ]
    );

    let state = completed_state(report);
    assert_eq!(state.final_report.as_deref(), Some("DRAFT TWO"));
    assert_eq!(state.draft_report.as_deref(), Some("DRAFT TWO"));
    assert_eq!(state.feedback.as_deref(), Some("NEEDS A RISKS SECTION"));
    assert_eq!(state.iterations, 2);
}

#[tokio::test]
async fn test_research_without_review_pass_skips_senior() {
    let (graph, _) = research_graph_with_scripts(vec![Message::assistant("ONLY DRAFT")]);

    let state = initial_state("AAPL", "IT", "FirstCutReport", 0).unwrap();
    let report = graph.run(state, "research-2").await.unwrap();

    let steps: Vec<&str> = report.events.iter().map(|e| e.step.as_str()).collect();
    assert_eq!(steps, vec!["initialize", "junior_analyst", "finalize"]);

    let state = completed_state(report);
    assert_eq!(state.final_report.as_deref(), Some("ONLY DRAFT"));
    assert!(state.feedback.is_none());
}

#[tokio::test]
async fn test_research_drafts_are_bounded_per_run() {
    // whatever the counter starts at, the draft step runs at most twice and
    // the review step at most once
    for start in [0u32, 1, 2, 7] {
        let (graph, _) = research_graph_with_scripts(vec![
            Message::assistant("DRAFT ONE"),
            Message::assistant("FEEDBACK"),
            Message::assistant("DRAFT TWO"),
        ]);

        let state = initial_state("AAPL", "IT", "FirstCutReport", start).unwrap();
        let report = graph.run(state, "research-bound").await.unwrap();

        let drafts = report
            .events
            .iter()
            .filter(|e| e.step == "junior_analyst")
            .count();
        let reviews = report
            .events
            .iter()
            .filter(|e| e.step == "senior_analyst")
            .count();
        assert!(drafts <= 2, "iterations={} drafted {} times", start, drafts);
        assert!(reviews <= 1, "iterations={} reviewed {} times", start, reviews);
    }
}

#[tokio::test]
async fn test_research_is_deterministic_given_identical_responses() {
    let scripts = || {
        vec![
            Message::assistant("DRAFT ONE"),
            Message::assistant("FEEDBACK"),
            Message::assistant("DRAFT TWO"),
        ]
    };

    let (graph_a, _) = research_graph_with_scripts(scripts());
    let (graph_b, _) = research_graph_with_scripts(scripts());

    let state_a = completed_state(
        graph_a
            .run(initial_state("AAPL", "IT", "FirstCutReport", 1).unwrap(), "a")
            .await
            .unwrap(),
    );
    let state_b = completed_state(
        graph_b
            .run(initial_state("AAPL", "IT", "FirstCutReport", 1).unwrap(), "b")
            .await
            .unwrap(),
    );

    assert_eq!(state_a.draft_report, state_b.draft_report);
    assert_eq!(state_a.feedback, state_b.feedback);
    assert_eq!(state_a.final_report, state_b.final_report);
    assert_eq!(state_a.iterations, state_b.iterations);
}

#[tokio::test]
async fn test_research_conversation_is_concatenation_of_step_events() {
    let (graph, _) = research_graph_with_scripts(vec![
        Message::assistant("DRAFT ONE"),
        Message::assistant("FEEDBACK"),
        Message::assistant("DRAFT TWO"),
    ]);

    let state = initial_state("MSFT", "IT", "FirstCutReport", 1).unwrap();
    let mut expected = state.messages.clone();

    let report = graph.run(state, "research-3").await.unwrap();
    for event in &report.events {
        expected.extend(event.messages.clone());
    }

    let state = completed_state(report);
    assert_eq!(state.messages, expected);
}

#[tokio::test]
async fn test_research_model_failure_propagates() {
    // empty script: the first junior draft call fails
    let (graph, checkpoints) = research_graph_with_scripts(vec![]);

    let state = initial_state("AAPL", "IT", "FirstCutReport", 1).unwrap();
    let err = graph.run(state, "research-4").await.unwrap_err();
    assert!(matches!(err, EngineError::Model(_)));

    // the checkpoint from the last completed step is still there
    let cp = checkpoints.load("research-4").await.unwrap().unwrap();
    assert_eq!(cp.step, "initialize");
}
