//! Scripted in-memory provider and tools shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use switchboard::core::{Part, ToolCall, ToolDeclaration, ToolOutcome};
use switchboard::llm::{ChatSession, LLMProvider, SessionConfig, StreamChunk, StreamResponse};
use switchboard::tools::{calculator, Tool};
use switchboard::{Config, ConversationStore, Result, SwitchboardError, ToolRegistry, TurnEngine};

/// What one `send_streaming` call does
pub enum Step {
    /// Stream these chunks, then end
    Chunks(Vec<StreamChunk>),
    /// Stream these chunks, then fail
    FailAfter(Vec<StreamChunk>, String),
    /// Refuse the request outright
    SendError(String),
    /// Stream these chunks, then never finish
    Hang(Vec<StreamChunk>),
}

#[derive(Default)]
struct Script {
    rounds: Mutex<VecDeque<Step>>,
    classifications: Mutex<VecDeque<std::result::Result<serde_json::Value, String>>>,
    classify_calls: AtomicUsize,
    sent: Mutex<Vec<Vec<Part>>>,
    sessions: Mutex<Vec<SessionConfig>>,
}

/// Provider that replays a fixed script
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    script: Arc<Script>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behaviour of the next round
    pub fn round(self, step: Step) -> Self {
        self.script.rounds.lock().unwrap().push_back(step);
        self
    }

    /// Queue a classification answer naming `agent`
    pub fn routes_to(self, agent: &str) -> Self {
        self.script
            .classifications
            .lock()
            .unwrap()
            .push_back(Ok(serde_json::json!({ "agentId": agent })));
        self
    }

    /// Queue a failing classification
    pub fn routing_fails(self, message: &str) -> Self {
        self.script
            .classifications
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn classify_calls(&self) -> usize {
        self.script.classify_calls.load(Ordering::SeqCst)
    }

    /// Input parts of every round, in order
    pub fn sent(&self) -> Vec<Vec<Part>> {
        self.script.sent.lock().unwrap().clone()
    }

    /// Configs of every session opened
    pub fn sessions(&self) -> Vec<SessionConfig> {
        self.script.sessions.lock().unwrap().clone()
    }
}

struct ScriptedSession {
    script: Arc<Script>,
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn send_streaming(&mut self, parts: Vec<Part>) -> Result<StreamResponse> {
        self.script.sent.lock().unwrap().push(parts);
        let step = self.script.rounds.lock().unwrap().pop_front();

        let stream: StreamResponse = match step {
            None => return Err(SwitchboardError::provider("script exhausted")),
            Some(Step::SendError(message)) => return Err(SwitchboardError::provider(message)),
            Some(Step::Chunks(chunks)) => Box::pin(stream::iter(chunks.into_iter().map(Ok))),
            Some(Step::FailAfter(chunks, message)) => Box::pin(futures::StreamExt::chain(
                stream::iter(chunks.into_iter().map(Ok)),
                stream::once(async move { Err(SwitchboardError::stream(message)) }),
            )),
            Some(Step::Hang(chunks)) => Box::pin(futures::StreamExt::chain(
                stream::iter(chunks.into_iter().map(Ok)),
                stream::pending(),
            )),
        };
        Ok(stream)
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn create_session(&self, config: SessionConfig) -> Box<dyn ChatSession> {
        self.script.sessions.lock().unwrap().push(config);
        Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
        })
    }

    async fn classify(&self, _prompt: &str, _schema: &serde_json::Value) -> Result<serde_json::Value> {
        self.script.classify_calls.fetch_add(1, Ordering::SeqCst);
        match self.script.classifications.lock().unwrap().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(SwitchboardError::provider(message)),
            None => Ok(serde_json::json!({ "agentId": "generalist" })),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Calculator stand-in that fails every call
pub struct FailingCalculator;

#[async_trait]
impl Tool for FailingCalculator {
    fn declaration(&self) -> ToolDeclaration {
        calculator::declaration()
    }

    async fn execute(&self, _arguments: &serde_json::Value) -> ToolOutcome {
        Err("calculator exploded".to_string())
    }
}

/// Calculator stand-in that panics
pub struct PanickingCalculator;

#[async_trait]
impl Tool for PanickingCalculator {
    fn declaration(&self) -> ToolDeclaration {
        calculator::declaration()
    }

    async fn execute(&self, _arguments: &serde_json::Value) -> ToolOutcome {
        panic!("calculator panicked")
    }
}

/// Calculator stand-in that counts invocations and echoes its arguments
#[derive(Default)]
pub struct CountingCalculator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Tool for CountingCalculator {
    fn declaration(&self) -> ToolDeclaration {
        calculator::declaration()
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(arguments.clone())
    }
}

/// Calculator stand-in that stalls on `{"expression": "slow"}` and logs
/// the order in which calls complete
#[derive(Default)]
pub struct DelayedCalculator {
    pub completed: Mutex<Vec<String>>,
}

#[async_trait]
impl Tool for DelayedCalculator {
    fn declaration(&self) -> ToolDeclaration {
        calculator::declaration()
    }

    async fn execute(&self, arguments: &serde_json::Value) -> ToolOutcome {
        let expression = arguments["expression"].as_str().unwrap_or_default().to_string();
        if expression == "slow" {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        self.completed.lock().unwrap().push(expression.clone());
        Ok(serde_json::json!(expression))
    }
}

/// Deterministic config, independent of the environment
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.gemini.model = "test-model".to_string();
    config.agent.manual_agent = None;
    config.agent.max_rounds = 8;
    config.agent.round_timeout_secs = None;
    config
}

/// Registry holding the real calculator only
pub fn calculator_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(calculator::CalculatorTool::new()));
    registry
}

/// Registry holding one tool
pub fn registry_with(tool: Arc<dyn Tool>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(tool);
    registry
}

pub fn engine(provider: &ScriptedProvider, tools: ToolRegistry, config: &Config) -> TurnEngine {
    let store = ConversationStore::new(config.agent.default_agent);
    TurnEngine::new(Arc::new(provider.clone()), Arc::new(tools), store, config)
}

pub fn text(fragment: &str) -> StreamChunk {
    StreamChunk::text(fragment)
}

pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> StreamChunk {
    StreamChunk::calls(vec![ToolCall::new(id, name, arguments)])
}
