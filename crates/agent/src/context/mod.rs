//! Context lifecycle: token-budgeted history and threshold-triggered
//! summarization.
//!
//! A session's **combined context** is its latest summary (as a `System`
//! pseudo-message) followed by its active messages, oldest first. When the
//! rendered combined context grows past the token threshold, all but the
//! most recent K active messages are folded into a new summary.

pub mod manager;
pub mod token;

pub use manager::{ContextManager, ContextPolicy, SUMMARY_MESSAGE_ID};
pub use token::{estimate_tokens, render, render_window};
