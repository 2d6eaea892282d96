//! Tool traits — callable capabilities and the orchestrator that picks them.
//!
//! A `Tool` can recognise whether a user message is asking for it and, if so,
//! execute. A `ToolOrchestrator` evaluates a message against whatever tools
//! it knows and returns at most one textual result per turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ToolError;

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// What the tool branch of a turn produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Which tool produced this
    pub tool_name: String,

    /// Text to hand to the generation step
    pub response: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolOutcome {
    /// A result only counts when it carries text.
    pub fn has_response(&self) -> bool {
        !self.response.trim().is_empty()
    }
}

/// A single callable capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// Extract arguments from a user message, or `None` if the tool does not apply.
    fn detect(&self, message: &str) -> Option<serde_json::Value>;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;
}

/// Decides whether any tool applies to a message and runs it.
#[async_trait]
pub trait ToolOrchestrator: Send + Sync {
    /// `Ok(None)` when no tool applies.
    async fn evaluate(&self, user_text: &str) -> std::result::Result<Option<ToolOutcome>, ToolError>;
}

/// An ordered registry of tools. Earlier registrations win when several match.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// The first tool that recognises the message, with its arguments.
    pub fn detect(&self, message: &str) -> Option<(&dyn Tool, serde_json::Value)> {
        self.tools
            .iter()
            .find_map(|t| t.detect(message).map(|args| (t.as_ref(), args)))
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
