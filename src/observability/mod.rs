//! Observability for the Friday assistant
//!
//! Structured logging with tracing, plus span macros for chat, tool and
//! OAuth operations.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{chat_span, oauth_span, tool_span};
