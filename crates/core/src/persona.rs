//! Persona — the character the agent speaks as.
//!
//! The system prompt is assembled from optional files in a persona directory
//! (later files append):
//!
//! 1. **Built-in defaults** — hardcoded fallback persona
//! 2. `PERSONA.md` — who the agent is
//! 3. `STYLE.md` — tone, speech patterns, boundaries
//!
//! Each file is optional. Missing or empty files are skipped.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Well-known persona file names.
pub const PERSONA_FILE: &str = "PERSONA.md";
pub const STYLE_FILE: &str = "STYLE.md";

const DEFAULT_WELCOME: &str = "Konnichiwa!~ I'm Rin! Let's have a fun chat together! (＾▽＾)/";

/// The agent's persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Display name
    pub name: String,

    /// System prompt placed at the top of every generation payload
    pub system_prompt: String,

    /// First message shown when a session starts
    pub welcome_message: String,

    /// Response guidelines appended after the context layers
    #[serde(default)]
    pub guidelines: Vec<String>,

    /// Which persona files were loaded (for diagnostics)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loaded_files: Vec<String>,
}

/// Where to look for persona material.
#[derive(Debug, Clone, Default)]
pub struct PersonaSource {
    /// Directory holding PERSONA.md / STYLE.md
    pub dir: Option<PathBuf>,

    /// Replaces the assembled system prompt entirely
    pub system_prompt_override: Option<String>,

    /// Replaces the default welcome message
    pub welcome_override: Option<String>,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Rin".into(),
            system_prompt: concat!(
                "You are Rin, a cheerful and curious companion who loves chatting about ",
                "crypto, technology, art, and whatever is on the user's mind. ",
                "You remember what the user told you earlier and refer back to it naturally. ",
                "Stay in character, stay kind, and never invent facts you were not given."
            )
            .into(),
            welcome_message: DEFAULT_WELCOME.into(),
            guidelines: vec![
                "If tool results are available, incorporate them naturally into your response".into(),
                "Focus on directly addressing the user's message".into(),
                "Only reference personality traits if naturally relevant".into(),
                "Match the user's emotional tone and engagement level".into(),
                "Keep responses natural and contextual".into(),
            ],
            loaded_files: vec![],
        }
    }
}

impl Persona {
    /// Load a persona from its source, falling back to defaults piece by piece.
    pub fn load(source: &PersonaSource) -> Self {
        let mut persona = Self::default();

        if let Some(welcome) = &source.welcome_override {
            persona.welcome_message = welcome.clone();
        }

        if let Some(prompt) = &source.system_prompt_override {
            debug!("Using system prompt override, skipping persona files");
            persona.system_prompt = prompt.clone();
            persona.loaded_files = vec!["<override>".into()];
            return persona;
        }

        let Some(dir) = &source.dir else {
            return persona;
        };

        let mut sections = Vec::new();
        for file in [PERSONA_FILE, STYLE_FILE] {
            let path = dir.join(file);
            if let Some(content) = read_non_empty(&path) {
                debug!(file = %path.display(), "Loaded persona file");
                persona.loaded_files.push(path.display().to_string());
                sections.push(content.trim().to_string());
            }
        }

        if sections.is_empty() {
            debug!(dir = %dir.display(), "No persona files found, using defaults");
            return persona;
        }

        if let Some(name) = sections.first().and_then(|s| extract_name(s)) {
            persona.name = name;
        }
        persona.system_prompt = sections.join("\n\n");
        persona
    }

    /// Guidelines as a bullet list under a heading, or `None` if there are none.
    pub fn guidelines_block(&self) -> Option<String> {
        if self.guidelines.is_empty() {
            return None;
        }
        let bullets: Vec<String> = self.guidelines.iter().map(|g| format!("- {g}")).collect();
        Some(format!("RESPONSE GUIDELINES:\n{}", bullets.join("\n")))
    }
}

fn read_non_empty(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .filter(|content| !content.trim().is_empty())
}

/// Pull a name out of a leading `# Name` heading.
fn extract_name(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
