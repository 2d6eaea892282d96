//! Prompt assembly and output clean-up.
//!
//! The payload always carries the same layers in the same order, whether
//! or not a branch produced data; empty layers get a placeholder so the
//! model can tell "nothing found" from "not asked".

use parley_core::persona::Persona;

pub const NO_GUIDANCE: &str = "No additional context available";
pub const NO_TOOL_RESULTS: &str = "No tool results available";

/// Instruction delimiters that must never reach the user.
const DELIMITERS: &[&str] = &[
    "[INST]", "[/INST]", "<<SYS>>", "<</SYS>>", "<<CONTEXT>>", "<</CONTEXT>>", "<<RAG>>", "<</RAG>>",
];

/// Everything the model sees for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptPayload {
    pub system: String,
    pub guidance: Option<String>,
    pub transcript: String,
    pub tool_results: Option<String>,
    pub guidelines: Option<String>,
    pub user_text: String,
}

impl PromptPayload {
    pub fn new(persona: &Persona, user_text: impl Into<String>) -> Self {
        Self {
            system: persona.system_prompt.clone(),
            guidance: None,
            transcript: String::new(),
            tool_results: None,
            guidelines: persona.guidelines_block(),
            user_text: user_text.into(),
        }
    }

    /// Blank guidance counts as none.
    pub fn with_guidance(mut self, guidance: Option<String>) -> Self {
        self.guidance = guidance.filter(|g| !g.trim().is_empty());
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = transcript.into();
        self
    }

    /// Blank tool output counts as none.
    pub fn with_tool_results(mut self, tool_results: Option<String>) -> Self {
        self.tool_results = tool_results.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!("[INST] <<SYS>>\n{}\n\nCONTEXT LAYERS:\n", self.system);
        out.push_str(&format!(
            "- MEMORY GUIDANCE\n{}\n\n",
            self.guidance.as_deref().unwrap_or(NO_GUIDANCE)
        ));
        out.push_str(&format!("- RECENT CONVERSATION\n{}\n\n", self.transcript));
        out.push_str(&format!(
            "- TOOL RESULTS\n{}\n",
            self.tool_results.as_deref().unwrap_or(NO_TOOL_RESULTS)
        ));
        if let Some(guidelines) = &self.guidelines {
            out.push_str(&format!("\n{guidelines}\n"));
        }
        out.push_str(&format!("<</SYS>>\n\n{} [/INST]", self.user_text));
        out
    }
}

/// Strip leftover instruction delimiters and surrounding whitespace.
pub fn clean_output(raw: &str) -> String {
    DELIMITERS
        .iter()
        .fold(raw.to_string(), |text, delimiter| text.replace(delimiter, ""))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona() -> Persona {
        Persona {
            system_prompt: "You are Rin.".into(),
            guidelines: vec!["Be kind".into()],
            ..Persona::default()
        }
    }

    #[test]
    fn layers_render_in_fixed_order() {
        let text = PromptPayload::new(&persona(), "How are you?")
            .with_guidance(Some("RAG Guidance:\n- likes tea".into()))
            .with_transcript("[user] hi\n[assistant] hello")
            .with_tool_results(Some("2 + 2 = 4".into()))
            .render();

        let positions: Vec<usize> = [
            "You are Rin.",
            "RAG Guidance:",
            "[user] hi",
            "2 + 2 = 4",
            "RESPONSE GUIDELINES:",
            "How are you?",
        ]
        .iter()
        .map(|needle| text.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
        assert!(text.starts_with("[INST] <<SYS>>"));
        assert!(text.ends_with("How are you? [/INST]"));
    }

    #[test]
    fn empty_layers_get_placeholders() {
        let text = PromptPayload::new(&persona(), "hi")
            .with_guidance(Some("   ".into()))
            .with_tool_results(None)
            .render();
        assert!(text.contains(NO_GUIDANCE));
        assert!(text.contains(NO_TOOL_RESULTS));
    }

    #[test]
    fn clean_output_strips_delimiters() {
        let raw = "  [INST] <<SYS>>Hehe~ <<RAG>>I remember!<</RAG>> [/INST]<</SYS>>\n";
        assert_eq!(clean_output(raw), "Hehe~ I remember!");
    }

    #[test]
    fn clean_output_keeps_plain_text() {
        assert_eq!(clean_output("Just text (＾▽＾)"), "Just text (＾▽＾)");
    }
}
