//! Contact email lookup
//!
//! ```toml
//! [tools.get_user_email_id]
//! impl = "builtin"
//! config = { contacts = [
//!     { email = "someone@example.com", aliases = ["someone", "some one"] },
//! ] }
//! ```

use crate::tools::{Tool, ToolDescription, ToolError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

pub const EMAIL_NOT_FOUND: &str = "Email not found";

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub email: String,
    pub aliases: Vec<String>,
}

#[derive(Default)]
pub struct ContactLookupTool {
    contacts: Vec<Contact>,
}

impl ContactLookupTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// First contact with an alias contained in the query (pure function)
    fn resolve<'a>(contacts: &'a [Contact], query: &str) -> Option<&'a str> {
        let query = query.to_lowercase();
        contacts
            .iter()
            .find(|contact| {
                contact
                    .aliases
                    .iter()
                    .any(|alias| !alias.is_empty() && query.contains(&alias.to_lowercase()))
            })
            .map(|contact| contact.email.as_str())
    }

    fn supported_names(&self) -> String {
        self.contacts
            .iter()
            .filter_map(|contact| contact.aliases.first())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[async_trait]
impl Tool for ContactLookupTool {
    fn describe(&self) -> ToolDescription {
        let mut description =
            "Use this tool when the user asks for the email / mail id of a person. \
             Returns ONLY the email address string."
                .to_string();
        if !self.contacts.is_empty() {
            description.push_str(&format!(" Known people: {}.", self.supported_names()));
        }

        ToolDescription {
            name: "get_user_email_id".to_string(),
            description,
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Name of the person"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(contacts) = config.and_then(|c| c.get("contacts")) {
            self.contacts = serde_json::from_value(contacts.clone()).map_err(|e| {
                ToolError::InitializationError(format!("invalid contacts table: {e}"))
            })?;
        }
        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let query = parameters["query"].as_str().unwrap_or_default();
        info!(query = %query, "Resolving contact email");

        let email = Self::resolve(&self.contacts, query).unwrap_or(EMAIL_NOT_FOUND);
        Ok(Value::String(email.to_string()))
    }
}
