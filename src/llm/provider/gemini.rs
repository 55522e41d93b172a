//! Google Gemini Provider
//!
//! Talks to the Gemini REST API directly: `streamGenerateContent` (SSE) for
//! agent sessions and `generateContent` with a response schema for routing.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

use crate::core::{
    merge_arguments, AgentTool, Config, Content, Part, Result, Role, SwitchboardError, ToolCall,
};
use crate::llm::traits::{ChatSession, LLMProvider, SessionConfig, StreamChunk, StreamResponse};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini API provider
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    router_model: String,
    timeout: Duration,
}

impl GeminiProvider {
    /// Create a provider from configuration; fails without an API key
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.gemini.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.gemini.base_url.trim_end_matches('/').to_string(),
            api_key,
            router_model: config.gemini.router_model.clone(),
            timeout: Duration::from_secs(config.gemini.timeout_secs),
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/models/{}:{}",
            self.base_url, model, method
        ))?)
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn create_session(&self, config: SessionConfig) -> Box<dyn ChatSession> {
        let tools = wire_tools(&config.tools);
        let system_instruction = (!config.system_instruction.is_empty()).then(|| WireContent {
            role: None,
            parts: vec![WirePart::text(config.system_instruction.clone())],
        });
        let contents = config
            .history
            .iter()
            .map(|content| to_wire_content(content, &HashSet::new()))
            .collect();

        Box::new(GeminiSession {
            provider: self.clone(),
            model: config.model,
            system_instruction,
            tools,
            contents,
            transcript: Arc::new(Mutex::new(Transcript::default())),
        })
    }

    async fn classify(&self, prompt: &str, schema: &serde_json::Value) -> Result<serde_json::Value> {
        let request = GenerateContentRequest {
            contents: vec![WireContent {
                role: Some("user".to_string()),
                parts: vec![WirePart::text(prompt)],
            }],
            system_instruction: None,
            tools: Vec::new(),
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: schema.clone(),
            }),
        };

        let response = self
            .client
            .post(self.endpoint(&self.router_model, "generateContent")?)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| connect_error(&self.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|part| part.thought != Some(true))
            .find_map(|part| part.text)
            .ok_or_else(|| SwitchboardError::provider("Classification returned no text"))?;

        Ok(serde_json::from_str(&text)?)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Model reply recorded while its stream is consumed
#[derive(Debug, Default)]
struct Transcript {
    /// Parts of the reply currently streaming
    reply: Vec<WirePart>,
    /// Call ids invented locally because the API sent none
    synthesized_ids: HashSet<String>,
    /// Calls seen in this session, for unique synthesized ids
    calls_seen: usize,
}

fn lock(transcript: &Mutex<Transcript>) -> MutexGuard<'_, Transcript> {
    transcript.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One turn's chat with Gemini
pub struct GeminiSession {
    provider: GeminiProvider,
    model: String,
    system_instruction: Option<WireContent>,
    tools: Vec<WireTool>,
    contents: Vec<WireContent>,
    transcript: Arc<Mutex<Transcript>>,
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send_streaming(&mut self, parts: Vec<Part>) -> Result<StreamResponse> {
        let synthesized = {
            let mut transcript = lock(&self.transcript);
            let reply = std::mem::take(&mut transcript.reply);
            if !reply.is_empty() {
                self.contents.push(WireContent {
                    role: Some("model".to_string()),
                    parts: reply,
                });
            }
            transcript.synthesized_ids.clone()
        };

        self.contents.push(to_wire_content(
            &Content {
                role: Role::User,
                parts,
            },
            &synthesized,
        ));

        let request = GenerateContentRequest {
            contents: self.contents.clone(),
            system_instruction: self.system_instruction.clone(),
            tools: self.tools.clone(),
            generation_config: None,
        };

        let mut url = self.provider.endpoint(&self.model, "streamGenerateContent")?;
        url.query_pairs_mut().append_pair("alt", "sse");

        tracing::debug!(model = %self.model, contents = self.contents.len(), "opening Gemini stream");

        let response = self
            .provider
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.provider.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| connect_error(&self.provider.base_url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        Ok(parse_sse_stream(response.bytes_stream(), Arc::clone(&self.transcript)))
    }
}

// ─── SSE parsing ────────────────────────────────────────────────────────────

/// Split the HTTP body into SSE events and turn each into a `StreamChunk`,
/// recording the model's parts into the session transcript as they pass.
///
/// Events are cut at the byte level and decoded only once complete, so a
/// character split across two reads survives intact.
fn parse_sse_stream<S, B, E>(byte_stream: S, transcript: Arc<Mutex<Transcript>>) -> StreamResponse
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let byte_stream = Box::pin(byte_stream);
    let state = SseState { transcript };

    Box::pin(stream::unfold(
        (byte_stream, state, Vec::<u8>::new()),
        |(mut byte_stream, mut state, mut buffer)| async move {
            loop {
                if let Some(event) = next_event(&mut buffer) {
                    let result = event.and_then(|event| state.process_event(&event));
                    match result {
                        Ok(Some(chunk)) => return Some((Ok(chunk), (byte_stream, state, buffer))),
                        Ok(None) => continue,
                        Err(e) => return Some((Err(e), (byte_stream, state, buffer))),
                    }
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(bytes.as_ref().iter().copied().filter(|b| *b != b'\r'));
                    }
                    Some(Err(e)) => {
                        return Some((
                            Err(SwitchboardError::stream(format!("stream read error: {}", e))),
                            (byte_stream, state, buffer),
                        ));
                    }
                    None => {
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let rest = std::mem::take(&mut buffer);
                        let result = decode_event(rest).and_then(|event| state.process_event(event.trim()));
                        return match result {
                            Ok(Some(chunk)) => Some((Ok(chunk), (byte_stream, state, buffer))),
                            Ok(None) => None,
                            Err(e) => Some((Err(e), (byte_stream, state, buffer))),
                        };
                    }
                }
            }
        },
    ))
}

/// Take the next complete event off the front of the buffer
fn next_event(buffer: &mut Vec<u8>) -> Option<Result<String>> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let mut event: Vec<u8> = buffer.drain(..end + 2).collect();
    event.truncate(end);
    Some(decode_event(event))
}

fn decode_event(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| SwitchboardError::stream(format!("SSE event is not valid UTF-8: {}", e)))
}

struct SseState {
    transcript: Arc<Mutex<Transcript>>,
}

impl SseState {
    fn process_event(&mut self, event: &str) -> Result<Option<StreamChunk>> {
        let data: String = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .collect();

        if data.is_empty() || data == "[DONE]" {
            return Ok(None);
        }

        let value: serde_json::Value = serde_json::from_str(&data)
            .map_err(|e| SwitchboardError::stream(format!("failed to parse SSE chunk: {}", e)))?;

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(SwitchboardError::stream(message.to_string()));
        }

        let response: GenerateContentResponse = serde_json::from_value(value)?;
        self.process_response(response)
    }

    fn process_response(&mut self, response: GenerateContentResponse) -> Result<Option<StreamChunk>> {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(SwitchboardError::provider(format!("Prompt blocked: {}", reason)));
        }

        let Some(candidate) = response.candidates.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                tracing::warn!(finish_reason = reason, "Gemini stopped early");
            }
        }

        let parts = candidate.content.and_then(|c| c.parts).unwrap_or_default();
        let mut chunk = StreamChunk::default();
        let mut transcript = lock(&self.transcript);

        for part in parts {
            if part.thought == Some(true) {
                continue;
            }

            if let Some(text) = part.text.as_deref() {
                chunk.text.get_or_insert_with(String::new).push_str(text);
            }

            if let Some(call) = part.function_call.as_ref() {
                transcript.calls_seen += 1;
                let id = match call.id.clone() {
                    Some(id) => id,
                    None => {
                        let id = format!("{}-{}", call.name, transcript.calls_seen);
                        transcript.synthesized_ids.insert(id.clone());
                        id
                    }
                };
                chunk
                    .function_calls
                    .push(ToolCall::new(id, call.name.clone(), call.args.clone()));
            }

            transcript.record(part);
        }

        if chunk.is_empty() {
            return Ok(None);
        }
        Ok(Some(chunk))
    }
}

impl Transcript {
    /// Append a reply part, merging consecutive text.
    ///
    /// A call whose id was already recorded folds into the earlier part, so
    /// the reply holds one call part per response sent back.
    fn record(&mut self, mut part: WirePart) {
        if let Some(incoming) = part.function_call.take() {
            let existing = match incoming.id.as_deref() {
                Some(id) => self
                    .reply
                    .iter_mut()
                    .find(|p| p.function_call.as_ref().and_then(|c| c.id.as_deref()) == Some(id)),
                None => None,
            };
            match existing {
                Some(recorded) => {
                    if let Some(call) = recorded.function_call.as_mut() {
                        merge_arguments(&mut call.args, incoming.args);
                    }
                    if recorded.thought_signature.is_none() {
                        recorded.thought_signature = part.thought_signature;
                    }
                    return;
                }
                None => part.function_call = Some(incoming),
            }
        }

        if let (Some(text), true) = (&part.text, part.is_plain_text()) {
            if let Some(last) = self.reply.last_mut().filter(|p| p.is_plain_text()) {
                if let Some(existing) = last.text.as_mut() {
                    existing.push_str(text);
                    return;
                }
            }
        }
        self.reply.push(part);
    }
}

// ─── Wire format ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<WirePart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl WirePart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    fn is_plain_text(&self) -> bool {
        self.text.is_some()
            && self.function_call.is_none()
            && self.thought_signature.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    #[serde(skip_serializing_if = "Option::is_none")]
    function_declarations: Option<Vec<WireFunctionDeclaration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<WirePart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn to_wire_content(content: &Content, synthesized_ids: &HashSet<String>) -> WireContent {
    let role = match content.role {
        Role::User => "user",
        Role::Model => "model",
    };

    let parts = content
        .parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart::text(text.clone()),
            Part::InlineData { mime_type, data } => WirePart {
                inline_data: Some(InlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                }),
                ..Default::default()
            },
            Part::FunctionCall(call) => WirePart {
                function_call: Some(WireFunctionCall {
                    id: (!synthesized_ids.contains(&call.id)).then(|| call.id.clone()),
                    name: call.name.clone(),
                    args: call.arguments.clone(),
                }),
                ..Default::default()
            },
            Part::FunctionResponse { id, name, response } => WirePart {
                function_response: Some(WireFunctionResponse {
                    id: (!synthesized_ids.contains(id)).then(|| id.clone()),
                    name: name.clone(),
                    response: response.clone(),
                }),
                ..Default::default()
            },
        })
        .collect();

    WireContent {
        role: Some(role.to_string()),
        parts,
    }
}

fn wire_tools(tools: &[AgentTool]) -> Vec<WireTool> {
    let declarations: Vec<WireFunctionDeclaration> = tools
        .iter()
        .filter_map(|tool| match tool {
            AgentTool::Function(decl) => Some(WireFunctionDeclaration {
                name: decl.name.clone(),
                description: decl.description.clone(),
                parameters: decl.parameters.clone(),
            }),
            AgentTool::WebSearch => None,
        })
        .collect();

    let mut wire = Vec::new();
    if !declarations.is_empty() {
        wire.push(WireTool {
            function_declarations: Some(declarations),
            google_search: None,
        });
    }
    if tools.iter().any(|tool| matches!(tool, AgentTool::WebSearch)) {
        wire.push(WireTool {
            function_declarations: None,
            google_search: Some(serde_json::json!({})),
        });
    }
    wire
}

fn connect_error(base_url: &str, e: reqwest::Error) -> SwitchboardError {
    if e.is_connect() {
        SwitchboardError::provider(format!("Cannot connect to Gemini at {}", base_url))
    } else {
        SwitchboardError::from(e)
    }
}

fn map_http_error(status: StatusCode, body: &str) -> SwitchboardError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{}: {}", status_text, msg)
            }
        })
        .unwrap_or_else(|_| body.to_string());

    SwitchboardError::provider(format!("Gemini API error ({}): {}", status, message))
}
