//! Owner profile lookup
//!
//! Returns the verified profile text of the assistant's owner from a local
//! file so the model answers from it instead of searching the web.

use crate::tools::{Tool, ToolDescription, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info};

pub struct ProfileTool {
    path: PathBuf,
}

impl Default for ProfileTool {
    fn default() -> Self {
        Self {
            path: PathBuf::from("malay.txt"),
        }
    }
}

impl ProfileTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for ProfileTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "get_malay_info".to_string(),
            description: "USE THIS TOOL FIRST when the user asks about Malay or Malay Jain. \
                          Returns the official verified profile. Any input is ignored."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Ignored"
                    }
                }
            }),
        }
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(path) = config.and_then(|c| c.get("path")).and_then(|p| p.as_str()) {
            self.path = PathBuf::from(path);
        }
        Ok(())
    }

    async fn execute(&self, _parameters: &Value) -> Result<Value, ToolError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                info!(path = %self.path.display(), length = content.len(), "Read profile");
                Ok(Value::String(content))
            }
            Err(e) => {
                error!(path = %self.path.display(), "Failed to read profile: {}", e);
                Err(ToolError::ExecutionError(format!(
                    "Malay info not available: {e}"
                )))
            }
        }
    }
}
