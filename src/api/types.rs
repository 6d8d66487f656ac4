//! API request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::Content;
use crate::tools::ToolInfo;

/// Body of `POST /run` and `POST /run_sse`.
///
/// Unknown fields such as the frontend's `streaming` flag are ignored;
/// `/run_sse` always streams.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: Content,
}

/// Body of session create and update requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionStateRequest {
    #[serde(default)]
    pub state: Map<String, Value>,
}

/// A flattened chat message, as shown by chat frontends.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub role: ChatRole,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Server and agent summary for `GET /info`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub app: String,
    pub agent: String,
    pub model: String,
    pub description: String,
    pub web: bool,
    pub tools: Vec<ToolInfo>,
}
