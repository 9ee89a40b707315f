//! Steps and routing for the equity research pipeline.
//!
//! `initialize` resolves the request to a prompt and seeds the conversation.
//! `junior_analyst` drafts the report, enriched with retrieved context and,
//! on a revision pass, with the senior analyst's feedback. `senior_analyst`
//! critiques the draft. `finalize` promotes the last draft to the final
//! report.
//!
//! Routing after the draft step is driven solely by the `iterations`
//! counter: exactly 1 goes to review, anything else goes to finalize. The
//! review step bumps the counter so the loop cannot re-enter. Note the
//! drafting step itself decides between fresh-draft and revision with a
//! different predicate (`iterations > 0` and feedback present); the two can
//! disagree, see DESIGN.md.

use crate::error::EngineError;
use crate::graph::{StateUpdate, Step, StepResult, Transition, WorkflowState};
use crate::llm::{ChatModel, GenerationConfig, Message};
use crate::research::companies::detect_company;
use crate::research::prompts::PromptLibrary;
use crate::retrieval::Retriever;
use async_trait::async_trait;
use std::sync::Arc;

pub const INITIALIZE: &str = "initialize";
pub const JUNIOR_ANALYST: &str = "junior_analyst";
pub const SENIOR_ANALYST: &str = "senior_analyst";
pub const FINALIZE: &str = "finalize";

const CONTEXT_SNIPPETS: usize = 5;

const JUNIOR_SYSTEM_PROMPT: &str = "You are a junior equity research analyst. \
    Generate a comprehensive, well-structured research report based on the \
    instructions provided. Use professional formatting with clear sections, \
    bullet points, and actionable insights.";

const SENIOR_SYSTEM_PROMPT: &str = "You are a senior equity research analyst \
    reviewing a junior colleague's draft. Point out missing analysis, weak \
    arguments, and formatting problems. Be specific and constructive.";

/// Resolve the request fields to a drafting prompt and seed the
/// conversation with it.
pub struct Initialize {
    prompts: Arc<PromptLibrary>,
}

impl Initialize {
    pub fn new(prompts: Arc<PromptLibrary>) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl Step for Initialize {
    async fn run(&self, state: &WorkflowState) -> Result<StepResult, EngineError> {
        let company = state
            .company_code
            .as_deref()
            .ok_or_else(|| EngineError::validation("company_code is required"))?;
        let sector = state
            .sector_code
            .as_deref()
            .ok_or_else(|| EngineError::validation("sector_code is required"))?;
        let report_type = state
            .report_type
            .as_deref()
            .ok_or_else(|| EngineError::validation("report_type is required"))?;

        let prompt = self.prompts.prompt_for(company, sector, report_type);
        Ok(StepResult::Update(
            StateUpdate::new().append(Message::user(prompt)),
        ))
    }
}

/// Draft (or revise) the report, splicing retrieved context into the
/// instruction. Retrieval failure degrades to an empty-context draft.
pub struct JuniorAnalyst {
    model: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    config: GenerationConfig,
}

impl JuniorAnalyst {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            model,
            retriever,
            config,
        }
    }

    async fn gather_context(&self, brief: &str, state: &WorkflowState) -> String {
        let company = state
            .company_code
            .as_deref()
            .or_else(|| detect_company(brief));
        let Some(company) = company else {
            log::warn!("No company detected in brief, drafting without context");
            return String::new();
        };

        match self
            .retriever
            .search(brief, Some(company), CONTEXT_SNIPPETS)
            .await
        {
            Ok(snippets) if snippets.is_empty() => {
                log::warn!("No research context found for {}", company);
                String::new()
            }
            Ok(snippets) => snippets
                .iter()
                .enumerate()
                .map(|(i, s)| format!("Context {}:\n{}", i + 1, s.text))
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(e) => {
                log::warn!("Retrieval failed for {}, drafting without context: {}", company, e);
                String::new()
            }
        }
    }
}

#[async_trait]
impl Step for JuniorAnalyst {
    async fn run(&self, state: &WorkflowState) -> Result<StepResult, EngineError> {
        let brief = state
            .last_user_text()
            .ok_or_else(|| EngineError::validation("no drafting brief in conversation"))?
            .to_string();

        let context = self.gather_context(&brief, state).await;
        let system = if context.is_empty() {
            JUNIOR_SYSTEM_PROMPT.to_string()
        } else {
            format!(
                "{}\n\nUse the following research context where relevant:\n\n{}",
                JUNIOR_SYSTEM_PROMPT, context
            )
        };

        let revising = state.iterations > 0 && state.feedback.is_some();
        let instruction = if revising {
            format!(
                "{}\n\nYour previous draft:\n{}\n\nReviewer feedback:\n{}\n\n\
                 Revise the draft to address every point of feedback.",
                brief,
                state.draft_report.as_deref().unwrap_or_default(),
                state.feedback.as_deref().unwrap_or_default(),
            )
        } else {
            brief
        };

        let request = vec![Message::system(system), Message::user(instruction)];
        let response = self.model.invoke(&request, &self.config, &[]).await?;
        let draft = response.content.clone();

        Ok(StepResult::Update(
            StateUpdate::new().append(response).draft_report(draft),
        ))
    }
}

/// Critique the current draft and record the feedback. Bumps the iteration
/// counter so routing cannot re-enter the review.
pub struct SeniorAnalyst {
    model: Arc<dyn ChatModel>,
    config: GenerationConfig,
}

impl SeniorAnalyst {
    pub fn new(model: Arc<dyn ChatModel>, config: GenerationConfig) -> Self {
        Self { model, config }
    }
}

#[async_trait]
impl Step for SeniorAnalyst {
    async fn run(&self, state: &WorkflowState) -> Result<StepResult, EngineError> {
        let draft = state
            .draft_report
            .as_deref()
            .ok_or_else(|| EngineError::validation("no draft to review"))?;

        let request = vec![
            Message::system(SENIOR_SYSTEM_PROMPT),
            Message::user(format!("Review the following draft report:\n\n{}", draft)),
        ];
        let response = self.model.invoke(&request, &self.config, &[]).await?;
        let feedback = response.content.clone();

        Ok(StepResult::Update(
            StateUpdate::new()
                .append(response)
                .feedback(feedback)
                .iterations(state.iterations + 1),
        ))
    }
}

/// Promote the last draft to the final report. Pure bookkeeping, no model
/// call.
pub struct Finalize;

#[async_trait]
impl Step for Finalize {
    async fn run(&self, state: &WorkflowState) -> Result<StepResult, EngineError> {
        let draft = state
            .draft_report
            .clone()
            .ok_or_else(|| EngineError::validation("no draft to finalize"))?;
        Ok(StepResult::Update(StateUpdate::new().final_report(draft)))
    }
}

/// Iteration-bounded critique routing after the draft step.
pub fn route_after_draft(state: &WorkflowState) -> Transition {
    if state.iterations == 1 {
        Transition::to(SENIOR_ANALYST)
    } else {
        Transition::to(FINALIZE)
    }
}
