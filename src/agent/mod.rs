//! Agent module - the counselor's declaration and the loop that runs it.
//!
//! A run follows the "tools in a loop" pattern:
//! 1. Append the user's message to the session
//! 2. Call the model with the agent's instruction, tools and the session history
//! 3. If the model requests tool calls, execute them and feed results back
//! 4. Repeat until the model produces a final response or max iterations reached

mod definition;
pub mod prompt;
mod runner;

pub use definition::{AgentDefinition, AGENT_NAME, APP_NAME, DESCRIPTION, MODEL};
pub use runner::{RunError, Runner};
