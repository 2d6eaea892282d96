//! Token estimation and transcript rendering.
//!
//! Uses a character-based heuristic: ~4 characters per token. It is an
//! approximation, close enough for BPE tokenizers on English text, and
//! cheap enough to run on every turn. Swap in a real tokenizer here if a
//! model's budget must be hit exactly.

use parley_core::message::{Message, Role};

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds down.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// The tag a message carries in a rendered transcript.
///
/// `System` only ever appears as the summary pseudo-message.
pub fn role_tag(role: Role) -> &'static str {
    match role {
        Role::User => "[user]",
        Role::Assistant => "[assistant]",
        Role::System => "[summary]",
    }
}

/// Render one message as a transcript line.
pub fn render_message(message: &Message) -> String {
    format!("{} {}", role_tag(message.role), message.content)
}

/// Render a combined context, one line per message, oldest first.
pub fn render(context: &[Message]) -> String {
    context.iter().map(render_message).collect::<Vec<_>>().join("\n")
}

/// Render the prompt transcript: the summary (if any) pinned first, then the
/// most recent `window` conversation messages.
pub fn render_window(context: &[Message], window: usize) -> String {
    let (summaries, conversation): (Vec<&Message>, Vec<&Message>) =
        context.iter().partition(|m| m.role == Role::System);
    let skip = conversation.len().saturating_sub(window);

    summaries
        .into_iter()
        .chain(conversation.into_iter().skip(skip))
        .map(render_message)
        .collect::<Vec<_>>()
        .join("\n")
}
