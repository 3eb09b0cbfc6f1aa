//! [`CompletionBackend`] over a single Langbase pipe.
//!
//! Sampling parameters live on the pipe itself and are set when the pipe is
//! created.

use async_trait::async_trait;
use tracing::warn;

use super::client::LangbaseClient;
use super::types::{
    FunctionCall, FunctionDefinition, Message as WireMessage, MessageRole as WireRole,
    PipeRequest, PipeResponse, ToolCallPayload, ToolDefinition,
};
use crate::backend::{
    Completion, CompletionBackend, CompletionRequest, Message, MessageRole, ToolCall,
    ToolDeclaration, Usage,
};
use crate::error::EngineResult;

/// Completion backend that runs every request through one Langbase pipe.
#[derive(Clone)]
pub struct LangbaseBackend {
    client: LangbaseClient,
    pipe_name: String,
}

impl LangbaseBackend {
    /// Create a backend bound to `pipe_name`
    pub fn new(client: LangbaseClient, pipe_name: impl Into<String>) -> Self {
        Self {
            client,
            pipe_name: pipe_name.into(),
        }
    }

    /// Name of the pipe requests are sent to
    pub fn pipe_name(&self) -> &str {
        &self.pipe_name
    }

    fn build_request(&self, request: &CompletionRequest) -> PipeRequest {
        let messages = request.messages.iter().map(to_wire_message).collect();
        let tools = request.tools.iter().map(to_wire_tool).collect();
        PipeRequest::new(self.pipe_name.clone(), messages).with_tools(tools)
    }
}

#[async_trait]
impl CompletionBackend for LangbaseBackend {
    async fn complete(&self, request: &CompletionRequest) -> EngineResult<Completion> {
        let response = self.client.call_pipe(self.build_request(request)).await?;
        Ok(to_completion(response))
    }
}

fn to_wire_message(message: &Message) -> WireMessage {
    let role = match message.role {
        MessageRole::System => WireRole::System,
        MessageRole::User => WireRole::User,
        MessageRole::Assistant => WireRole::Assistant,
        MessageRole::Tool => WireRole::Tool,
    };
    WireMessage {
        role,
        content: message.content.clone(),
        tool_calls: message
            .tool_calls
            .as_ref()
            .map(|calls| calls.iter().map(to_wire_call).collect()),
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn to_wire_call(call: &ToolCall) -> ToolCallPayload {
    ToolCallPayload {
        id: call.id.clone(),
        call_type: "function".to_string(),
        function: FunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.to_string(),
        },
    }
}

fn to_wire_tool(tool: &ToolDeclaration) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

/// Decode string-encoded tool arguments.
///
/// Empty arguments become `{}`; undecodable ones are passed on as a JSON
/// string so the tool can report the problem.
fn decode_arguments(call: &ToolCallPayload) -> serde_json::Value {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return serde_json::Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(tool = %call.function.name, error = %e, "Tool arguments are not valid JSON");
        serde_json::Value::String(raw.to_string())
    })
}

fn to_completion(response: PipeResponse) -> Completion {
    let tool_calls = response
        .tool_calls()
        .iter()
        .map(|call| ToolCall::new(call.id.clone(), call.function.name.clone(), decode_arguments(call)))
        .collect();

    let usage = response
        .raw
        .as_ref()
        .and_then(|raw| raw.usage.as_ref())
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens.unwrap_or(0),
            completion_tokens: u.completion_tokens.unwrap_or(0),
            total_tokens: u.total_tokens.unwrap_or(0),
        })
        .unwrap_or_default();

    Completion {
        text: response.completion,
        tool_calls,
        usage,
    }
}
