//! Equity research pipeline: initialize → draft → (review → revise) →
//! finalize, with the review pass gated by the `iterations` counter.

pub mod companies;
pub mod prompts;
pub mod steps;

use crate::error::EngineError;
use crate::graph::{CheckpointStore, Graph, GraphBuilder, WorkflowState};
use crate::llm::{ChatModel, GenerationConfig};
use crate::research::prompts::PromptLibrary;
use crate::research::steps::{
    route_after_draft, Finalize, Initialize, JuniorAnalyst, SeniorAnalyst, FINALIZE, INITIALIZE,
    JUNIOR_ANALYST, SENIOR_ANALYST,
};
use crate::retrieval::Retriever;
use std::sync::Arc;

/// Build the initial state for a research run, validating the request
/// fields before any step executes. `iterations` selects the review mode:
/// 1 runs the draft → critique → revise loop, 0 drafts once and finalizes.
pub fn initial_state(
    company_code: &str,
    sector_code: &str,
    report_type: &str,
    iterations: u32,
) -> Result<WorkflowState, EngineError> {
    if company_code.trim().is_empty() {
        return Err(EngineError::validation("company_code must not be empty"));
    }
    if sector_code.trim().is_empty() {
        return Err(EngineError::validation("sector_code must not be empty"));
    }
    if report_type.trim().is_empty() {
        return Err(EngineError::validation("report_type must not be empty"));
    }

    Ok(WorkflowState {
        company_code: Some(company_code.to_string()),
        sector_code: Some(sector_code.to_string()),
        report_type: Some(report_type.to_string()),
        iterations,
        ..Default::default()
    })
}

/// Build the research graph against the given collaborators.
pub fn build_research_graph(
    model: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    prompts: Arc<PromptLibrary>,
    checkpoints: Arc<dyn CheckpointStore>,
) -> Result<Graph, EngineError> {
    let config = GenerationConfig::with_temperature(0.7);

    GraphBuilder::new("research")
        .add_step(INITIALIZE, Arc::new(Initialize::new(prompts)))
        .add_step(
            JUNIOR_ANALYST,
            Arc::new(JuniorAnalyst::new(model.clone(), retriever, config.clone())),
        )
        .add_step(SENIOR_ANALYST, Arc::new(SeniorAnalyst::new(model, config)))
        .add_step(FINALIZE, Arc::new(Finalize))
        .set_entry(INITIALIZE)
        .add_edge(INITIALIZE, JUNIOR_ANALYST)
        .add_conditional(
            JUNIOR_ANALYST,
            route_after_draft,
            &[SENIOR_ANALYST, FINALIZE],
        )
        .add_edge(SENIOR_ANALYST, JUNIOR_ANALYST)
        .add_edge_to_end(FINALIZE)
        .compile(checkpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_requires_all_fields() {
        assert!(initial_state("", "IT", "BuyReport", 1).is_err());
        assert!(initial_state("AAPL", " ", "BuyReport", 1).is_err());
        assert!(initial_state("AAPL", "IT", "", 1).is_err());
    }

    #[test]
    fn test_initial_state_carries_request_fields() {
        let state = initial_state("AAPL", "IT", "BuyReport", 1).unwrap();
        assert_eq!(state.company_code.as_deref(), Some("AAPL"));
        assert_eq!(state.sector_code.as_deref(), Some("IT"));
        assert_eq!(state.report_type.as_deref(), Some("BuyReport"));
        assert_eq!(state.iterations, 1);
        assert!(state.messages.is_empty());
    }
}
