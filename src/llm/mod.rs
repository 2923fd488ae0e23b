//! LLM provider abstraction layer
//!
//! Provider-agnostic chat-completion interface with tool calling, and the
//! OpenAI / Azure OpenAI implementation.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
