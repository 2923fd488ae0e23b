//! Conversational agent
//!
//! The agent prompts the LLM with the routing rules, lets it call tools in
//! sequence and returns its final reply. History is kept per session.

pub mod chat;
pub mod memory;
pub mod prompt;

pub use chat::{ChatAgent, ChatReply, DEFAULT_SESSION};
pub use memory::ConversationMemory;
pub use prompt::{system_prompt_with_date, DEFAULT_SYSTEM_PROMPT};
