//! # Parley Core
//!
//! Domain types, collaborator traits, and error definitions for the Parley
//! conversational agent backend. This crate has **no framework dependencies**;
//! it defines the model every other crate implements against.
//!
//! The orchestrator only ever talks to its collaborators through the traits
//! defined here (`Provider`, `ConversationStore`, `KnowledgeEnricher`,
//! `ToolOrchestrator`), so each can be swapped by configuration or stubbed
//! in tests.

pub mod error;
pub mod event;
pub mod knowledge;
pub mod message;
pub mod persona;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use knowledge::KnowledgeEnricher;
pub use message::{Message, Role, SessionId};
pub use persona::{Persona, PersonaSource};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use store::{ContextConfiguration, ConversationStore, Summary};
pub use tool::{Tool, ToolOrchestrator, ToolOutcome, ToolRegistry, ToolResult};
