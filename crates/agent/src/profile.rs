//! Generation profiles and the model routes behind them.

use parley_config::{GenerationConfig, ProfileConfig};
use parley_core::message::Message;
use parley_core::provider::ProviderRequest;
use serde::{Deserialize, Serialize};

/// Which strategy produces the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationProfile {
    /// In-character chat; no tool output to weave in
    PersonaChat,
    /// A tool produced a result the reply must incorporate
    ToolAware,
}

impl GenerationProfile {
    /// Tool output wins over everything else, including enrichment.
    pub fn select(tool_result_present: bool) -> Self {
        if tool_result_present {
            Self::ToolAware
        } else {
            Self::PersonaChat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonaChat => "persona_chat",
            Self::ToolAware => "tool_aware",
        }
    }
}

/// A concrete model plus sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRoute {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelRoute {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// A single-prompt request on this route.
    pub fn request(&self, prompt: impl Into<String>) -> ProviderRequest {
        ProviderRequest::single(self.model.clone(), Message::user(prompt))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

impl From<&ProfileConfig> for ModelRoute {
    fn from(config: &ProfileConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// Model routes for both reply profiles.
#[derive(Debug, Clone)]
pub struct ModelRoutes {
    pub persona_chat: ModelRoute,
    pub tool_aware: ModelRoute,
}

impl ModelRoutes {
    pub fn route(&self, profile: GenerationProfile) -> &ModelRoute {
        match profile {
            GenerationProfile::PersonaChat => &self.persona_chat,
            GenerationProfile::ToolAware => &self.tool_aware,
        }
    }
}

impl From<&GenerationConfig> for ModelRoutes {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            persona_chat: ModelRoute::from(&config.persona_chat),
            tool_aware: ModelRoute::from(&config.tool_aware),
        }
    }
}

impl Default for ModelRoutes {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}
