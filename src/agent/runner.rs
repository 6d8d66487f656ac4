//! Core run loop: one user message in, the agent's events out.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::llm::{
    Content, FunctionCall, FunctionResponse, LlmClient, LlmError, LlmRequest, Part, USER_ROLE,
};
use crate::session::{Event, SessionError, SessionStore, USER_AUTHOR};

use super::AgentDefinition;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Message must contain non-empty text")]
    EmptyMessage,

    #[error("Model returned an empty response (finish reason: {0})")]
    EmptyResponse(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Max iterations ({0}) reached without completion")]
    MaxIterations(usize),
}

impl RunError {
    fn is_retryable(&self) -> bool {
        matches!(self, RunError::Llm(e) if e.is_retryable())
    }
}

type SessionKey = (String, String, String);

/// Runs an agent against sessions held in a [`SessionStore`].
///
/// Runs against the same session are serialized: a second message waits
/// until the first run has recorded all of its events.
#[derive(Clone)]
pub struct Runner {
    agent: Arc<AgentDefinition>,
    llm: Arc<dyn LlmClient>,
    sessions: Arc<dyn SessionStore>,
    max_iterations: usize,
    locks: Arc<Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>>,
}

impl Runner {
    pub fn new(
        agent: Arc<AgentDefinition>,
        llm: Arc<dyn LlmClient>,
        sessions: Arc<dyn SessionStore>,
        max_iterations: usize,
    ) -> Self {
        Self {
            agent,
            llm,
            sessions,
            max_iterations,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn agent(&self) -> &AgentDefinition {
        &self.agent
    }

    /// Run to completion and return every event the agent produced.
    pub async fn run(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> Result<Vec<Event>, RunError> {
        let mut rx = self.run_stream(app_name, user_id, session_id, new_message);
        let mut events = Vec::new();
        while let Some(item) = rx.recv().await {
            events.push(item?);
        }
        Ok(events)
    }

    /// Run in a background task, yielding events as they are produced.
    ///
    /// The channel closes after the final event, or after a single `Err`.
    /// Dropping the receiver stops the run after the current model call.
    pub fn run_stream(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        new_message: Content,
    ) -> mpsc::Receiver<Result<Event, RunError>> {
        let (tx, rx) = mpsc::channel(16);
        let runner = self.clone();
        let app_name = app_name.to_string();
        let user_id = user_id.to_string();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let key = (app_name, user_id, session_id);
            let lock = runner.session_lock(&key).await;
            let guard = lock.lock().await;
            let (app_name, user_id, session_id) = &key;

            let result = runner
                .invoke(app_name, user_id, session_id, new_message, &tx)
                .await;
            drop(guard);
            runner.release_session_lock(&key, lock).await;

            if let Err(e) = result {
                tracing::warn!(
                    session_id = %session_id,
                    retryable = e.is_retryable(),
                    "run failed: {}",
                    e
                );
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn session_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Forget a session's lock once no other run holds or awaits it.
    async fn release_session_lock(&self, key: &SessionKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    async fn invoke(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        mut new_message: Content,
        tx: &mpsc::Sender<Result<Event, RunError>>,
    ) -> Result<(), RunError> {
        if !new_message.has_text() {
            return Err(RunError::EmptyMessage);
        }
        new_message.role = USER_ROLE.to_string();

        let session = self
            .sessions
            .get_session(app_name, user_id, session_id)
            .await?
            .ok_or_else(|| RunError::SessionNotFound(session_id.to_string()))?;

        let invocation_id = format!("e-{}", Uuid::new_v4());
        let mut contents: Vec<Content> = session.events.into_iter().map(|e| e.content).collect();

        let user_event = Event::new(&invocation_id, USER_AUTHOR, new_message);
        contents.push(user_event.content.clone());
        self.sessions
            .append_event(app_name, user_id, session_id, user_event)
            .await?;

        let tools = self.agent.tools.declarations();

        for iteration in 0..self.max_iterations {
            tracing::debug!(
                invocation_id = %invocation_id,
                "Agent iteration {}",
                iteration + 1
            );

            let request = LlmRequest {
                model: self.agent.model.clone(),
                system_instruction: Some(self.agent.instruction.clone()),
                contents: contents.clone(),
                tools: tools.clone(),
            };
            let response = self.llm.generate(&request).await?;
            if let Some(usage) = &response.usage {
                tracing::debug!(
                    invocation_id = %invocation_id,
                    prompt_tokens = usage.prompt_token_count,
                    response_tokens = usage.candidates_token_count,
                    total_tokens = usage.total_token_count,
                    "Model usage"
                );
            }

            let content = match response.content {
                Some(content) if !content.parts.is_empty() => content,
                _ => {
                    return Err(RunError::EmptyResponse(
                        response.finish_reason.unwrap_or_else(|| "unknown".to_string()),
                    ))
                }
            };
            let calls: Vec<FunctionCall> = content.function_calls().into_iter().cloned().collect();

            let delivered = self
                .emit(
                    app_name,
                    user_id,
                    session_id,
                    &invocation_id,
                    content,
                    &mut contents,
                    tx,
                )
                .await?;
            if !delivered {
                return Ok(());
            }

            // No tool calls - this is the final response
            if calls.is_empty() {
                return Ok(());
            }

            let mut parts = Vec::with_capacity(calls.len());
            for call in calls {
                tracing::info!(tool = %call.name, "Calling tool with args: {}", call.args);
                let response = match self.agent.tools.execute(&call.name, call.args).await {
                    Ok(output) => json!({ "result": output }),
                    Err(e) => json!({ "error": e.to_string() }),
                };
                parts.push(Part::function_response(FunctionResponse {
                    id: call.id,
                    name: call.name,
                    response,
                }));
            }
            let tool_results = Content {
                role: USER_ROLE.to_string(),
                parts,
            };

            let delivered = self
                .emit(
                    app_name,
                    user_id,
                    session_id,
                    &invocation_id,
                    tool_results,
                    &mut contents,
                    tx,
                )
                .await?;
            if !delivered {
                return Ok(());
            }
        }

        Err(RunError::MaxIterations(self.max_iterations))
    }

    /// Record an agent-authored event and forward it. Returns `false` once the
    /// receiver is gone.
    #[allow(clippy::too_many_arguments)]
    async fn emit(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        invocation_id: &str,
        content: Content,
        contents: &mut Vec<Content>,
        tx: &mpsc::Sender<Result<Event, RunError>>,
    ) -> Result<bool, RunError> {
        let event = Event::new(invocation_id, &self.agent.name, content);
        contents.push(event.content.clone());
        self.sessions
            .append_event(app_name, user_id, session_id, event.clone())
            .await?;
        Ok(tx.send(Ok(event)).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmResponse, MODEL_ROLE};
    use crate::session::InMemorySessionStore;
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request.
    struct ScriptedLlm {
        responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<LlmResponse, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<LlmRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(reply("(script exhausted)")))
        }
    }

    fn reply(text: &str) -> LlmResponse {
        LlmResponse {
            content: Some(Content::model_text(text)),
            finish_reason: Some("STOP".to_string()),
            usage: None,
        }
    }

    fn call(name: &str, args: Value) -> LlmResponse {
        LlmResponse {
            content: Some(Content {
                role: MODEL_ROLE.to_string(),
                parts: vec![Part {
                    function_call: Some(FunctionCall {
                        id: Some("call-1".to_string()),
                        name: name.to_string(),
                        args,
                    }),
                    ..Default::default()
                }],
            }),
            finish_reason: None,
            usage: None,
        }
    }

    struct FindGroups;

    #[async_trait]
    impl Tool for FindGroups {
        fn name(&self) -> &str {
            "find_support_groups"
        }

        fn description(&self) -> &str {
            "Find support groups near a city"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"city": {"type": "string"}}})
        }

        async fn execute(&self, args: Value) -> anyhow::Result<String> {
            Ok(format!("groups in {}", args["city"].as_str().unwrap_or("?")))
        }
    }

    /// Answers slowly, echoing the latest user text.
    struct SlowEcho {
        requests: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait]
    impl LlmClient for SlowEcho {
        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            let last = request
                .contents
                .last()
                .and_then(|c| c.text())
                .unwrap_or_default();
            Ok(reply(&format!("re: {last}")))
        }
    }

    async fn setup(
        agent: AgentDefinition,
        llm: Arc<dyn LlmClient>,
        max_iterations: usize,
    ) -> (Runner, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .create_session("root_agent", "u1", Some("s1"), Map::new())
            .await
            .expect("create session");
        let runner = Runner::new(Arc::new(agent), llm, store.clone(), max_iterations);
        (runner, store)
    }

    #[tokio::test]
    async fn plain_reply_produces_one_event() {
        let llm = ScriptedLlm::new(vec![Ok(reply("I'm listening."))]);
        let (runner, store) =
            setup(AgentDefinition::mental_health_counselor(), llm.clone(), 5).await;

        let events = runner
            .run("root_agent", "u1", "s1", Content::user_text("hi"))
            .await
            .expect("run");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].author, "mental_health_counselor");
        assert_eq!(events[0].content.text().as_deref(), Some("I'm listening."));

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gemini-2.0-flash");
        assert!(requests[0].tools.is_empty());
        assert_eq!(
            requests[0].system_instruction.as_deref(),
            Some(runner.agent().instruction.as_str())
        );

        let session = store
            .get_session("root_agent", "u1", "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.events.len(), 2);
        assert!(session.events[0].is_from_user());
        assert_eq!(session.events[0].invocation_id, session.events[1].invocation_id);
    }

    #[tokio::test]
    async fn history_is_sent_on_the_next_run() {
        let llm = ScriptedLlm::new(vec![Ok(reply("first")), Ok(reply("second"))]);
        let (runner, _store) =
            setup(AgentDefinition::mental_health_counselor(), llm.clone(), 5).await;

        runner
            .run("root_agent", "u1", "s1", Content::user_text("one"))
            .await
            .expect("first run");
        runner
            .run("root_agent", "u1", "s1", Content::user_text("two"))
            .await
            .expect("second run");

        let requests = llm.requests();
        let texts: Vec<String> = requests[1]
            .contents
            .iter()
            .filter_map(|c| c.text())
            .collect();
        assert_eq!(texts, vec!["one", "first", "two"]);
        assert_eq!(requests[1].contents[1].role, MODEL_ROLE);
    }

    #[tokio::test]
    async fn tool_calls_are_dispatched_and_fed_back() {
        let llm = ScriptedLlm::new(vec![
            Ok(call("find_support_groups", json!({"city": "Cebu"}))),
            Ok(reply("Here are some groups.")),
        ]);
        let agent = AgentDefinition::mental_health_counselor()
            .with_tools(ToolRegistry::new().with_tool(Arc::new(FindGroups)));
        let (runner, _store) = setup(agent, llm.clone(), 5).await;

        let events = runner
            .run("root_agent", "u1", "s1", Content::user_text("support groups?"))
            .await
            .expect("run");
        assert_eq!(events.len(), 3);

        let response = events[1].content.parts[0]
            .function_response
            .as_ref()
            .expect("function response");
        assert_eq!(response.name, "find_support_groups");
        assert_eq!(response.id.as_deref(), Some("call-1"));
        assert_eq!(response.response, json!({"result": "groups in Cebu"}));
        assert_eq!(events[2].content.text().as_deref(), Some("Here are some groups."));

        let requests = llm.requests();
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[1].contents.len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_reports_error_to_model() {
        let llm = ScriptedLlm::new(vec![Ok(call("nope", Value::Null)), Ok(reply("ok"))]);
        let (runner, _store) =
            setup(AgentDefinition::mental_health_counselor(), llm, 5).await;

        let events = runner
            .run("root_agent", "u1", "s1", Content::user_text("hi"))
            .await
            .expect("run");
        let response = events[1].content.parts[0]
            .function_response
            .as_ref()
            .expect("function response");
        assert_eq!(response.response, json!({"error": "Unknown tool: nope"}));
    }

    #[tokio::test]
    async fn endless_tool_calls_hit_the_iteration_cap() {
        let llm = ScriptedLlm::new(vec![
            Ok(call("nope", Value::Null)),
            Ok(call("nope", Value::Null)),
            Ok(call("nope", Value::Null)),
        ]);
        let (runner, _store) =
            setup(AgentDefinition::mental_health_counselor(), llm, 2).await;

        let err = runner
            .run("root_agent", "u1", "s1", Content::user_text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::MaxIterations(2)));
    }

    #[tokio::test]
    async fn concurrent_runs_on_one_session_do_not_interleave() {
        let llm = Arc::new(SlowEcho {
            requests: Mutex::new(Vec::new()),
        });
        let (runner, store) =
            setup(AgentDefinition::mental_health_counselor(), llm.clone(), 5).await;

        let (first, second) = tokio::join!(
            runner.run("root_agent", "u1", "s1", Content::user_text("one")),
            runner.run("root_agent", "u1", "s1", Content::user_text("two")),
        );
        first.expect("first run");
        second.expect("second run");

        let session = store
            .get_session("root_agent", "u1", "s1")
            .await
            .unwrap()
            .unwrap();
        let texts: Vec<String> = session
            .events
            .iter()
            .filter_map(|e| e.content.text())
            .collect();
        assert_eq!(texts.len(), 4);
        assert!(session.events[0].is_from_user());
        assert!(!session.events[1].is_from_user());
        assert!(session.events[2].is_from_user());
        assert!(!session.events[3].is_from_user());
        assert_eq!(texts[1], format!("re: {}", texts[0]));
        assert_eq!(texts[3], format!("re: {}", texts[2]));
        assert_eq!(session.events[0].invocation_id, session.events[1].invocation_id);

        let requests = llm.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].contents.len(), 1);
        assert_eq!(requests[1].contents.len(), 3);
        assert!(runner.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn runs_on_different_sessions_are_independent() {
        let llm = Arc::new(SlowEcho {
            requests: Mutex::new(Vec::new()),
        });
        let (runner, store) =
            setup(AgentDefinition::mental_health_counselor(), llm, 5).await;
        store
            .create_session("root_agent", "u1", Some("s2"), Map::new())
            .await
            .expect("create second session");

        let (first, second) = tokio::join!(
            runner.run("root_agent", "u1", "s1", Content::user_text("one")),
            runner.run("root_agent", "u1", "s2", Content::user_text("two")),
        );
        assert_eq!(first.expect("s1")[0].content.text().as_deref(), Some("re: one"));
        assert_eq!(second.expect("s2")[0].content.text().as_deref(), Some("re: two"));
    }

    #[tokio::test]
    async fn missing_session_and_empty_message_are_rejected() {
        let llm = ScriptedLlm::new(vec![]);
        let (runner, _store) =
            setup(AgentDefinition::mental_health_counselor(), llm.clone(), 5).await;

        let err = runner
            .run("root_agent", "u1", "missing", Content::user_text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::SessionNotFound(_)));

        let err = runner
            .run("root_agent", "u1", "s1", Content::user_text("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::EmptyMessage));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn model_errors_surface_after_user_event_is_recorded() {
        let llm = ScriptedLlm::new(vec![Err(LlmError::NotConfigured)]);
        let (runner, store) =
            setup(AgentDefinition::mental_health_counselor(), llm, 5).await;

        let err = runner
            .run("root_agent", "u1", "s1", Content::user_text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Llm(LlmError::NotConfigured)));

        let session = store
            .get_session("root_agent", "u1", "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.events.len(), 1);
    }

    #[tokio::test]
    async fn empty_model_content_is_an_error() {
        let llm = ScriptedLlm::new(vec![Ok(LlmResponse {
            content: None,
            finish_reason: Some("SAFETY".to_string()),
            usage: None,
        })]);
        let (runner, _store) =
            setup(AgentDefinition::mental_health_counselor(), llm, 5).await;

        match runner
            .run("root_agent", "u1", "s1", Content::user_text("hi"))
            .await
        {
            Err(RunError::EmptyResponse(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
