//! Conversation sessions.
//!
//! A session is the per-user record of one conversation with the agent: a
//! free-form state map plus the ordered list of events exchanged so far.

mod memory;

pub use memory::InMemorySessionStore;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::llm::Content;

/// Author name used for user-submitted events.
pub const USER_AUTHOR: &str = "user";

/// One content turn within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub invocation_id: String,
    /// `"user"` or the name of the agent that produced the content.
    pub author: String,
    pub content: Content,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl Event {
    pub fn new(invocation_id: &str, author: &str, content: Content) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invocation_id: invocation_id.to_string(),
            author: author.to_string(),
            content,
            timestamp: now_seconds(),
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.author == USER_AUTHOR
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    pub state: Map<String, Value>,
    pub events: Vec<Event>,
    pub last_update_time: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already exists: {0}")]
    AlreadyExists(String),
}

/// Storage for sessions, keyed by app, user and session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Whether sessions survive a restart.
    fn is_persistent(&self) -> bool;

    /// Create a session. A `None` id generates a fresh one.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
        state: Map<String, Value>,
    ) -> Result<Session, SessionError>;

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>, SessionError>;

    /// List a user's sessions, most recently updated first, without events.
    async fn list_sessions(&self, app_name: &str, user_id: &str)
        -> Result<Vec<Session>, SessionError>;

    /// Merge `state` into the session's state map.
    async fn update_state(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        state: Map<String, Value>,
    ) -> Result<Session, SessionError>;

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError>;

    async fn append_event(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        event: Event,
    ) -> Result<(), SessionError>;
}

/// Current time as fractional seconds since the Unix epoch.
pub fn now_seconds() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
