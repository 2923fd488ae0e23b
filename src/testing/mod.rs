//! Testing utilities and mock implementations
//!
//! Doubles for the LLM provider, mailer and calendar so the agent, tools and
//! HTTP routes can be exercised without network access.

pub mod mocks;

pub use mocks::*;
