use serde::{Deserialize, Serialize};

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded argument object, as on the wire.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

/// An OpenAI-style chat message reduced to the fields the pipeline touches.
/// Messages that fail to deserialize into this shape (e.g. multimodal array
/// content) pass through the pipeline untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl NormalizedMessage {
    pub fn system(content: &str) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn tool(content: &str, tool_call_id: &str) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.to_string()),
            tool_call_id: Some(tool_call_id.to_string()),
            name: None,
            tool_calls: None,
        }
    }

    pub fn assistant_tool_call(id: &str, function_name: &str, arguments: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            name: None,
            tool_calls: Some(vec![ToolCall {
                id: id.to_string(),
                kind: "function".to_string(),
                function: ToolCallFunction {
                    name: function_name.to_string(),
                    arguments: arguments.to_string(),
                },
            }]),
        }
    }

    fn plain(role: Role, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_call_id: None,
            name: None,
            tool_calls: None,
        }
    }

    pub fn content_len(&self) -> usize {
        self.content.as_deref().map(str::len).unwrap_or(0)
    }
}

/// Total content bytes across messages, including tool-call arguments.
pub fn total_content_bytes(messages: &[NormalizedMessage]) -> usize {
    messages
        .iter()
        .map(|m| {
            m.content_len()
                + m.tool_calls
                    .as_deref()
                    .map(|calls| {
                        calls
                            .iter()
                            .map(|c| c.function.arguments.len())
                            .sum::<usize>()
                    })
                    .unwrap_or(0)
        })
        .sum()
}
