//! Friday - personal automation assistant
//!
//! A chat agent that answers free-text requests by letting an LLM call
//! tools: web search, profile and contact lookup, two-step email sending
//! over SMTP, and two-step meeting scheduling on Google Calendar. Google
//! OAuth login flows provide the calendar token.
//!
//! # Overview
//!
//! - [`agent`]: system prompt, per-session memory and the tool-calling loop
//! - [`tools`]: the [`Tool`] trait, [`ToolSystem`] and the builtin tools
//! - [`drafts`]: pending email and meeting shared between tool calls
//! - [`llm`]: provider trait and the OpenAI / Azure OpenAI implementation
//! - [`mail`], [`calendar`], [`oauth`]: the external services
//! - [`server`]: the warp HTTP API
//!
//! # Quick Start
//!
//! ```rust
//! use friday_assistant::drafts::DraftStore;
//! use friday_assistant::tools::builtin::email::draft_from_text;
//!
//! # tokio_test_block(async {
//! let drafts = DraftStore::new();
//! let draft = draft_from_text(
//!     "mail bob@example.com saying 'lunch at noon'",
//!     "New Message",
//! )
//! .unwrap();
//! assert_eq!(draft.body, "lunch at noon");
//! drafts.save_email(draft).await;
//! assert!(drafts.email().await.is_some());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

pub mod agent;
pub mod app;
pub mod calendar;
pub mod config;
pub mod drafts;
pub mod error;
pub mod llm;
pub mod mail;
pub mod oauth;
pub mod observability;
pub mod server;
pub mod testing;
pub mod tools;

pub use agent::{ChatAgent, ChatReply};
pub use config::*;
pub use error::{AssistantError, AssistantResult};
pub use tools::{Tool, ToolDescription, ToolError, ToolSystem};
