//! Clock tool — answers "what time is it" style questions in UTC.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::error::ToolError;
use parley_core::tool::{Tool, ToolResult};

const CUES: &[&str] = &[
    "what time",
    "the time now",
    "current time",
    "what day is",
    "what's the date",
    "what is the date",
    "today's date",
];

pub struct ClockTool;

/// Render a timestamp the way the tool reports it.
pub fn describe(now: DateTime<Utc>) -> String {
    now.format("It is %H:%M UTC on %A, %-d %B %Y.").to_string()
}

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "clock"
    }

    fn description(&self) -> &str {
        "Report the current UTC date and time"
    }

    fn detect(&self, message: &str) -> Option<serde_json::Value> {
        let lower = message.to_lowercase();
        CUES.iter()
            .any(|cue| lower.contains(cue))
            .then(|| serde_json::json!({}))
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let now = Utc::now();
        Ok(ToolResult {
            success: true,
            output: describe(now),
            data: Some(serde_json::json!({ "utc": now.to_rfc3339() })),
        })
    }
}
