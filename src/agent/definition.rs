//! The counselor agent's declaration.

use crate::tools::ToolRegistry;

use super::prompt;

/// Name of the agent, used as the author of its events.
pub const AGENT_NAME: &str = "mental_health_counselor";

/// Model identifier the agent runs on.
pub const MODEL: &str = "gemini-2.0-flash";

/// App name clients address in session and run requests.
pub const APP_NAME: &str = "root_agent";

pub const DESCRIPTION: &str = "You are a mental health counselor whose main job is 3 things,
provide support and counseling to individuals with mental health disorders,
provide additional information about mental health for curious researchers or individuals close to distress,
and to provide coordinate the user to doctors, support groups, and organizations where they can learn more about themselves.
";

/// Static configuration of one agent. Built once at startup.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub description: String,
    pub instruction: String,
    pub tools: ToolRegistry,
}

impl AgentDefinition {
    /// The mental health counselor: no tools, instruction from [`prompt::instruction`].
    pub fn mental_health_counselor() -> Self {
        Self {
            name: AGENT_NAME.to_string(),
            model: MODEL.to_string(),
            description: DESCRIPTION.to_string(),
            instruction: prompt::instruction(),
            tools: ToolRegistry::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }
}
