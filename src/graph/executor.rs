//! Graph workflow executor.
//!
//! A graph is a fixed set of named steps wired by directed edges. Execution
//! is single-threaded and synchronous within one run: the current step fully
//! completes, its partial update is merged into the state, a checkpoint is
//! persisted, and only then is the outgoing edge evaluated. A run ends when
//! it reaches the terminal marker or when a step suspends awaiting external
//! input; resuming a suspended session is a brand-new invocation that
//! reloads the persisted state.

use crate::error::EngineError;
use crate::graph::checkpoint::CheckpointStore;
use crate::graph::state::{StateUpdate, WorkflowState};
use crate::llm::Message;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Terminal marker for routing functions.
pub const END: &str = "__end__";

/// Upper bound on step transitions in a single run, as a guard against
/// miswired graphs.
const MAX_TRANSITIONS: usize = 50;

/// A named unit of work in the workflow graph.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, state: &WorkflowState) -> Result<StepResult, EngineError>;
}

/// What a step execution produced.
#[derive(Debug)]
pub enum StepResult {
    /// Partial update to merge into the workflow state.
    Update(StateUpdate),
    /// Suspend the run, surfacing a question for an external answer.
    Suspend { question: String },
}

/// Destination chosen by a routing function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    To(String),
    End,
}

impl Transition {
    pub fn to(step: impl Into<String>) -> Self {
        Self::To(step.into())
    }
}

type Router = Box<dyn Fn(&WorkflowState) -> Transition + Send + Sync>;

enum Edge {
    To(String),
    End,
    Conditional { route: Router, allowed: Vec<String> },
}

/// One step execution as seen from the outside: the step name, the messages
/// it appended, and the question it suspended on (if any).
#[derive(Debug, Clone, Serialize)]
pub struct StepEvent {
    pub step: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(WorkflowState),
    Suspended { question: String },
}

/// Outcome of a run plus the per-step event trace.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub events: Vec<StepEvent>,
}

/// Declarative builder for a workflow graph.
pub struct GraphBuilder {
    name: String,
    entry: Option<String>,
    steps: HashMap<String, Arc<dyn Step>>,
    edges: HashMap<String, Edge>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            steps: HashMap::new(),
            edges: HashMap::new(),
        }
    }

    pub fn add_step(mut self, name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.steps.insert(name.into(), step);
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Unconditional edge between two steps.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::To(to.into()));
        self
    }

    /// Unconditional edge to the terminal marker.
    pub fn add_edge_to_end(mut self, from: impl Into<String>) -> Self {
        self.edges.insert(from.into(), Edge::End);
        self
    }

    /// Conditional edge: `route` picks the successor from `allowed`, which
    /// may include [`END`]. Returning anything outside `allowed` is a fatal
    /// configuration error at run time.
    pub fn add_conditional<F>(
        mut self,
        from: impl Into<String>,
        route: F,
        allowed: &[&str],
    ) -> Self
    where
        F: Fn(&WorkflowState) -> Transition + Send + Sync + 'static,
    {
        self.edges.insert(
            from.into(),
            Edge::Conditional {
                route: Box::new(route),
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// Validate the wiring and produce an executable graph bound to a
    /// checkpoint store.
    pub fn compile(self, checkpoints: Arc<dyn CheckpointStore>) -> Result<Graph, EngineError> {
        let entry = self
            .entry
            .ok_or_else(|| EngineError::config(format!("graph '{}' has no entry step", self.name)))?;
        if !self.steps.contains_key(&entry) {
            return Err(EngineError::config(format!(
                "graph '{}' entry step '{}' is not declared",
                self.name, entry
            )));
        }

        for (from, edge) in &self.edges {
            if !self.steps.contains_key(from) {
                return Err(EngineError::config(format!(
                    "edge declared from unknown step '{}'",
                    from
                )));
            }
            let targets: Vec<&String> = match edge {
                Edge::To(to) => vec![to],
                Edge::End => vec![],
                Edge::Conditional { allowed, .. } => {
                    allowed.iter().filter(|t| t.as_str() != END).collect()
                }
            };
            for target in targets {
                if !self.steps.contains_key(target) {
                    return Err(EngineError::config(format!(
                        "edge from '{}' targets unknown step '{}'",
                        from, target
                    )));
                }
            }
        }

        for name in self.steps.keys() {
            if !self.edges.contains_key(name) {
                return Err(EngineError::config(format!(
                    "step '{}' has no outgoing edge",
                    name
                )));
            }
        }

        Ok(Graph {
            name: self.name,
            entry,
            steps: self.steps,
            edges: self.edges,
            checkpoints,
        })
    }
}

/// Compiled workflow graph ready for execution.
pub struct Graph {
    name: String,
    entry: String,
    steps: HashMap<String, Arc<dyn Step>>,
    edges: HashMap<String, Edge>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute from the entry step until the terminal marker is reached or a
    /// step suspends. The checkpoint for `session_id` is overwritten after
    /// every step execution.
    pub async fn run(
        &self,
        initial: WorkflowState,
        session_id: &str,
    ) -> Result<RunReport, EngineError> {
        self.drive(initial, self.entry.clone(), session_id, Vec::new())
            .await
    }

    /// Resume a suspended session with an externally supplied answer.
    ///
    /// Builds a synthetic tool-result message pairing the pending invocation
    /// identifier (recorded before suspension) with `answer`, then continues
    /// from the suspended step's outgoing edge.
    pub async fn resume(
        &self,
        session_id: &str,
        answer: &str,
    ) -> Result<RunReport, EngineError> {
        if answer.trim().is_empty() {
            return Err(EngineError::validation("resume answer must not be empty"));
        }

        let checkpoint = self
            .checkpoints
            .load(session_id)
            .await?
            .ok_or_else(|| EngineError::UnknownSession(session_id.to_string()))?;

        let mut state = checkpoint.state;
        let call = state
            .pending_tool_calls()
            .first()
            .cloned()
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "session '{}' has no pending tool invocation to answer",
                    session_id
                ))
            })?;

        log::info!(
            "[{}] resuming session '{}' at step '{}' (invocation {})",
            self.name,
            session_id,
            checkpoint.step,
            call.id
        );

        let reply = Message::tool(call.id.clone(), answer);
        let events = vec![StepEvent {
            step: checkpoint.step.clone(),
            messages: vec![reply.clone()],
            question: None,
        }];
        state.apply(StateUpdate::new().append(reply));
        self.checkpoints
            .save(session_id, &state, &checkpoint.step)
            .await?;

        match self.follow(&checkpoint.step, &state)? {
            None => Ok(RunReport {
                outcome: RunOutcome::Completed(state),
                events,
            }),
            Some(next) => self.drive(state, next, session_id, events).await,
        }
    }

    async fn drive(
        &self,
        mut state: WorkflowState,
        mut current: String,
        session_id: &str,
        mut events: Vec<StepEvent>,
    ) -> Result<RunReport, EngineError> {
        for _ in 0..MAX_TRANSITIONS {
            let step = self
                .steps
                .get(&current)
                .ok_or_else(|| EngineError::UnknownStep(current.clone()))?;

            log::info!("[{}] executing step '{}'", self.name, current);

            match step.run(&state).await? {
                StepResult::Suspend { question } => {
                    self.checkpoints.save(session_id, &state, &current).await?;
                    log::info!(
                        "[{}] suspended at '{}' awaiting input: {}",
                        self.name,
                        current,
                        question
                    );
                    events.push(StepEvent {
                        step: current,
                        messages: vec![],
                        question: Some(question.clone()),
                    });
                    return Ok(RunReport {
                        outcome: RunOutcome::Suspended { question },
                        events,
                    });
                }
                StepResult::Update(update) => {
                    events.push(StepEvent {
                        step: current.clone(),
                        messages: update.messages.clone(),
                        question: None,
                    });
                    state.apply(update);
                    self.checkpoints.save(session_id, &state, &current).await?;
                }
            }

            match self.follow(&current, &state)? {
                None => {
                    log::info!("[{}] run completed", self.name);
                    return Ok(RunReport {
                        outcome: RunOutcome::Completed(state),
                        events,
                    });
                }
                Some(next) => current = next,
            }
        }

        Err(EngineError::config(format!(
            "graph '{}' exceeded {} step transitions",
            self.name, MAX_TRANSITIONS
        )))
    }

    /// Evaluate the outgoing edge of `from`. `None` means terminal.
    fn follow(&self, from: &str, state: &WorkflowState) -> Result<Option<String>, EngineError> {
        let edge = self.edges.get(from).ok_or_else(|| {
            EngineError::config(format!("step '{}' has no outgoing edge", from))
        })?;

        match edge {
            Edge::To(next) => Ok(Some(next.clone())),
            Edge::End => Ok(None),
            Edge::Conditional { route, allowed } => match route(state) {
                Transition::End => {
                    if !allowed.iter().any(|a| a == END) {
                        return Err(EngineError::RouteNotAllowed {
                            step: from.to_string(),
                            dest: END.to_string(),
                        });
                    }
                    Ok(None)
                }
                Transition::To(dest) => {
                    if !allowed.iter().any(|a| *a == dest) {
                        return Err(EngineError::RouteNotAllowed {
                            step: from.to_string(),
                            dest,
                        });
                    }
                    log::debug!("[{}] '{}' routed to '{}'", self.name, from, dest);
                    Ok(Some(dest))
                }
            },
        }
    }
}
