//! Rule-based tool orchestrator.
//!
//! Asks each registered tool, in registration order, whether it recognises
//! the message. The first match is executed and its output becomes the
//! turn's tool result.

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{ToolOrchestrator, ToolOutcome, ToolRegistry};
use tracing::{debug, info};

pub struct RuleBasedOrchestrator {
    registry: ToolRegistry,
}

impl RuleBasedOrchestrator {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.registry.names()
    }
}

impl Default for RuleBasedOrchestrator {
    fn default() -> Self {
        Self::new(crate::default_registry())
    }
}

#[async_trait]
impl ToolOrchestrator for RuleBasedOrchestrator {
    async fn evaluate(&self, user_text: &str) -> Result<Option<ToolOutcome>, ToolError> {
        let Some((tool, arguments)) = self.registry.detect(user_text) else {
            debug!("No tool applies to message");
            return Ok(None);
        };

        info!(tool = tool.name(), "Executing tool");
        let result = tool.execute(arguments).await?;
        if !result.success {
            return Err(ToolError::ExecutionFailed {
                tool_name: tool.name().to_string(),
                reason: result.output,
            });
        }

        Ok(Some(ToolOutcome {
            tool_name: tool.name().to_string(),
            response: result.output,
            data: result.data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn calculator_outcome() {
        let orchestrator = RuleBasedOrchestrator::default();
        let outcome = orchestrator.evaluate("what is 6 * 7?").await.unwrap().unwrap();
        assert_eq!(outcome.tool_name, "calculator");
        assert_eq!(outcome.response, "6 * 7 = 42");
        assert!(outcome.has_response());
    }

    #[tokio::test]
    async fn clock_outcome() {
        let orchestrator = RuleBasedOrchestrator::default();
        let outcome = orchestrator.evaluate("what time is it?").await.unwrap().unwrap();
        assert_eq!(outcome.tool_name, "clock");
    }

    #[tokio::test]
    async fn chit_chat_uses_no_tool() {
        let orchestrator = RuleBasedOrchestrator::default();
        assert!(orchestrator.evaluate("I love rainy days").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_registry_never_matches() {
        let orchestrator = RuleBasedOrchestrator::new(ToolRegistry::new());
        assert!(orchestrator.evaluate("what is 1 + 1").await.unwrap().is_none());
        assert!(orchestrator.tool_names().is_empty());
    }
}
