//! Response orchestration, the heart of Parley.
//!
//! Every user message goes through the same turn:
//!
//! 1. **Activate** the session in the registry
//! 2. **Gather** context, knowledge guidance and tool results concurrently
//! 3. **Budget** the context, summarizing old messages when it grows too large,
//!    and seed a newly activated session's mirror from it
//! 4. **Generate** a reply with the profile the tool results call for
//! 5. **Persist** the exchange and return the reply
//!
//! A turn never fails outward; see [`ResponseOrchestrator::generate_reply`].

pub mod context;
pub mod fanout;
pub mod orchestrator;
pub mod profile;
pub mod prompt;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use context::{ContextManager, ContextPolicy, SUMMARY_MESSAGE_ID};
pub use fanout::{Branch, BranchOutcome};
pub use orchestrator::{
    DEFAULT_APOLOGY, HealthReport, OrchestrationResult, OrchestratorSettings, ResponseOrchestrator,
};
pub use profile::{GenerationProfile, ModelRoute, ModelRoutes};
pub use prompt::{PromptPayload, clean_output};
pub use session::{Session, SessionRegistry};
