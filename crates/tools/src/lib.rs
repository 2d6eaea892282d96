//! Built-in tools and the rule-based tool orchestrator for Parley.
//!
//! Tools recognise requests in plain chat text (there is no function-calling
//! round trip): the orchestrator asks each tool to `detect` its arguments and
//! runs the first one that matches.

pub mod calculator;
pub mod clock;
pub mod orchestrator;

pub use orchestrator::RuleBasedOrchestrator;

use parley_core::tool::ToolRegistry;

/// Create a registry with all built-in tools.
///
/// Order matters: the calculator is consulted before the clock.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(calculator::CalculatorTool));
    registry.register(Box::new(clock::ClockTool));
    registry
}
