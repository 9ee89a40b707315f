// SPDX-License-Identifier: MIT

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::chat::build_chat_graph;
use crate::error::EngineError;
use crate::graph::{Graph, RunOutcome, RunReport, SqliteCheckpointStore, StepEvent, WorkflowState};
use crate::llm::{openai::OpenAiModel, Role};
use crate::research::{build_research_graph, initial_state, prompts::PromptLibrary};
use crate::retrieval::{DocIndex, Retriever};

const PREVIEW_LEN: usize = 200;

pub struct ServerConfig {
    pub port: u16,
    pub model_name: String,
    pub db_path: PathBuf,
    pub docs_dir: PathBuf,
    pub prompts_path: PathBuf,
}

struct AppState {
    chat: Graph,
    research: Graph,
    retriever: Arc<DocIndex>,
}

pub async fn serve(config: ServerConfig) -> Result<(), EngineError> {
    let model = Arc::new(OpenAiModel::new(config.model_name.clone())?);
    let checkpoints = Arc::new(SqliteCheckpointStore::open(&config.db_path)?);
    let retriever = Arc::new(DocIndex::open(&config.docs_dir).map_err(|e| {
        EngineError::config(format!("failed to build document index: {}", e))
    })?);
    let prompts = Arc::new(match PromptLibrary::from_file(&config.prompts_path) {
        Ok(prompts) => prompts,
        Err(e) => {
            log::warn!(
                "Failed to load prompts from {:?}, using generic prompts only: {}",
                config.prompts_path,
                e
            );
            PromptLibrary::empty()
        }
    });

    let app_state = Arc::new(AppState {
        chat: build_chat_graph(model.clone(), checkpoints.clone())?,
        research: build_research_graph(model, retriever.clone(), prompts, checkpoints)?,
        retriever,
    });

    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/chat", post(chat))
        .route("/api/chat/resume", post(chat_resume))
        .route("/api/research", post(research))
        .route("/api/research/debug", post(research_debug))
        .route("/api/retrieval/status", get(retrieval_status))
        .route("/api/retrieval/search", post(retrieval_search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn default_session() -> String {
    "default".to_string()
}

fn default_iterations() -> u32 {
    1
}

fn error_response(err: &EngineError) -> Json<Value> {
    Json(json!({ "status": "error", "error": err.to_string() }))
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default = "default_session")]
    session_id: String,
}

#[derive(Deserialize)]
struct ResumeRequest {
    session_id: String,
    answer: String,
}

fn chat_response(report: RunReport, session_id: &str) -> Json<Value> {
    match report.outcome {
        RunOutcome::Completed(state) => Json(json!({
            "status": "completed",
            "result": state.last_assistant_text().unwrap_or("No result generated"),
            "session_id": session_id,
        })),
        RunOutcome::Suspended { question } => Json(json!({
            "status": "awaiting_input",
            "question": question,
            "session_id": session_id,
        })),
    }
}

async fn chat(State(app): State<Arc<AppState>>, Json(payload): Json<ChatRequest>) -> Json<Value> {
    if payload.message.trim().is_empty() {
        return error_response(&EngineError::validation("message must not be empty"));
    }

    let initial = WorkflowState::from_user_message(payload.message.as_str());
    match app.chat.run(initial, &payload.session_id).await {
        Ok(report) => chat_response(report, &payload.session_id),
        Err(e) => {
            log::error!("Chat run failed: {}", e);
            error_response(&e)
        }
    }
}

async fn chat_resume(
    State(app): State<Arc<AppState>>,
    Json(payload): Json<ResumeRequest>,
) -> Json<Value> {
    match app.chat.resume(&payload.session_id, &payload.answer).await {
        Ok(report) => chat_response(report, &payload.session_id),
        Err(e) => {
            log::error!("Chat resume failed: {}", e);
            error_response(&e)
        }
    }
}

#[derive(Deserialize)]
struct ResearchRequest {
    company_code: String,
    sector_code: String,
    report_type: String,
    #[serde(default = "default_session")]
    session_id: String,
    #[serde(default = "default_iterations")]
    iterations: u32,
}

async fn run_research(app: &AppState, payload: &ResearchRequest) -> Result<RunReport, EngineError> {
    let initial = initial_state(
        &payload.company_code,
        &payload.sector_code,
        &payload.report_type,
        payload.iterations,
    )?;
    app.research.run(initial, &payload.session_id).await
}

async fn research(
    State(app): State<Arc<AppState>>,
    Json(payload): Json<ResearchRequest>,
) -> Json<Value> {
    match run_research(&app, &payload).await {
        Ok(report) => match report.outcome {
            RunOutcome::Completed(state) => {
                let result = state
                    .final_report
                    .as_deref()
                    .or_else(|| state.last_assistant_text())
                    .unwrap_or("No result generated")
                    .to_string();
                Json(json!({
                    "result": result,
                    "company_code": payload.company_code,
                    "sector_code": payload.sector_code,
                    "report_type": payload.report_type,
                    "session_id": payload.session_id,
                    "status": "success",
                }))
            }
            RunOutcome::Suspended { .. } => error_response(&EngineError::config(
                "research graph has no interrupt step",
            )),
        },
        Err(e) => {
            log::error!("Research run failed: {}", e);
            error_response(&e)
        }
    }
}

async fn research_debug(
    State(app): State<Arc<AppState>>,
    Json(payload): Json<ResearchRequest>,
) -> Json<Value> {
    match run_research(&app, &payload).await {
        Ok(report) => Json(json!({
            "events": report.events.iter().map(event_info).collect::<Vec<_>>(),
        })),
        Err(e) => {
            log::error!("Research debug run failed: {}", e);
            error_response(&e)
        }
    }
}

/// Serializable view of one step event, with message contents truncated.
fn event_info(event: &StepEvent) -> Value {
    let messages: Vec<Value> = event
        .messages
        .iter()
        .map(|msg| {
            let content = if msg.content.len() > PREVIEW_LEN {
                let cut = msg
                    .content
                    .char_indices()
                    .take_while(|(i, _)| *i < PREVIEW_LEN)
                    .last()
                    .map(|(i, c)| i + c.len_utf8())
                    .unwrap_or(0);
                format!("{}...", &msg.content[..cut])
            } else {
                msg.content.clone()
            };
            json!({
                "role": role_name(msg.role),
                "content": content,
                "has_tool_calls": msg.has_tool_calls(),
            })
        })
        .collect();

    let mut info = json!({
        "step": event.step,
        "messages_count": event.messages.len(),
        "messages": messages,
    });
    if let Some(question) = &event.question {
        info["question"] = json!(question);
    }
    info
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

async fn retrieval_status(State(app): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "active",
        "stats": app.retriever.stats(),
    }))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    company_code: Option<String>,
    #[serde(default = "default_k")]
    k: usize,
}

fn default_k() -> usize {
    5
}

async fn retrieval_search(
    State(app): State<Arc<AppState>>,
    Json(payload): Json<SearchRequest>,
) -> Json<Value> {
    if payload.query.trim().is_empty() {
        return error_response(&EngineError::validation("query is required"));
    }

    match app
        .retriever
        .search(&payload.query, payload.company_code.as_deref(), payload.k)
        .await
    {
        Ok(results) => Json(json!({
            "query": payload.query,
            "company_code": payload.company_code,
            "results_count": results.len(),
            "results": results,
        })),
        Err(e) => Json(json!({ "status": "error", "error": e.to_string() })),
    }
}
