//! Tools callable from a workflow's tool-dispatch step.

pub mod search;

use crate::error::EngineError;
use crate::llm::ToolSpec;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named external capability the model can request.
///
/// `name()`, `description()` and `parameters()` return references so the
/// values can live in struct fields instead of being rebuilt per call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, unique within a workflow's tool set
    fn name(&self) -> &str;

    /// Human-readable description surfaced to the model
    fn description(&self) -> &str;

    /// JSON schema of the tool's arguments
    fn parameters(&self) -> &Value;

    /// Execute the tool and return its textual result
    async fn execute(&self, arguments: Value) -> Result<String, EngineError>;
}

/// Produce the binding spec for a tool, for handing to the model.
pub fn spec_for(tool: &dyn Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters().clone(),
    }
}

/// The fixed set of tool handlers available to one workflow, built once at
/// graph construction. Lookups by unknown name are a configuration error at
/// the dispatch site, not here.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|t| (t.name().to_string(), t))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Binding specs for every registered tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| spec_for(t.as_ref())).collect()
    }
}
