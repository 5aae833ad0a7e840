//! LLM provider router.

pub mod router;
pub mod settings;

pub use router::{ChatMessage, ConnectionTest, LlmRouter};
pub use settings::{LlmProvider, LlmSettings, ResolvedLlm};
