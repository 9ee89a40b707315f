// SPDX-License-Identifier: MIT

//! Workflow state threaded through every step of a run.

use crate::llm::{Message, Role, ToolCall};
use serde::{Deserialize, Serialize};

/// The single record a workflow run owns: an append-only conversation log
/// plus the scratch fields the step functions read and write. Scratch fields
/// are enumerated explicitly per workflow variant; a variant simply leaves
/// the fields it does not use as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub messages: Vec<Message>,

    // equity-research scratch fields
    pub company_code: Option<String>,
    pub sector_code: Option<String>,
    pub report_type: Option<String>,
    pub draft_report: Option<String>,
    pub feedback: Option<String>,
    pub final_report: Option<String>,
    pub iterations: u32,
}

impl WorkflowState {
    /// Fresh state seeded with a single user message.
    pub fn from_user_message(text: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(text)],
            ..Default::default()
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Tool invocations pending on the latest message, if it is an assistant
    /// message. Anything else means no invocation is pending.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match self.messages.last() {
            Some(msg) if msg.role == Role::Assistant => &msg.tool_calls,
            _ => &[],
        }
    }

    /// Content of the most recent assistant message with non-empty text.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }

    /// Content of the most recent user message.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Merge a partial update: new messages are appended in order, scratch
    /// fields are overwritten by key where the update carries a value.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);
        if let Some(v) = update.company_code {
            self.company_code = Some(v);
        }
        if let Some(v) = update.sector_code {
            self.sector_code = Some(v);
        }
        if let Some(v) = update.report_type {
            self.report_type = Some(v);
        }
        if let Some(v) = update.draft_report {
            self.draft_report = Some(v);
        }
        if let Some(v) = update.feedback {
            self.feedback = Some(v);
        }
        if let Some(v) = update.final_report {
            self.final_report = Some(v);
        }
        if let Some(v) = update.iterations {
            self.iterations = v;
        }
    }
}

/// Partial-state update produced by one step execution.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub messages: Vec<Message>,
    pub company_code: Option<String>,
    pub sector_code: Option<String>,
    pub report_type: Option<String>,
    pub draft_report: Option<String>,
    pub feedback: Option<String>,
    pub final_report: Option<String>,
    pub iterations: Option<u32>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn draft_report(mut self, draft: impl Into<String>) -> Self {
        self.draft_report = Some(draft.into());
        self
    }

    pub fn feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn final_report(mut self, report: impl Into<String>) -> Self {
        self.final_report = Some(report.into());
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = Some(iterations);
        self
    }
}
