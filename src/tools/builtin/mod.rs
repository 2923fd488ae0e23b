//! Builtin tools
//!
//! Each tool type has its own module with pure functions separated from I/O.

pub mod contacts;
pub mod email;
pub mod meeting;
pub mod profile;
pub mod web_search;

pub use contacts::ContactLookupTool;
pub use email::{SaveEmailDetailsTool, SendEmailTool};
pub use meeting::{ScheduleMeetingTool, SaveMeetingDetailsTool};
pub use profile::ProfileTool;
pub use web_search::WebSearchTool;
