//! The text protocol spoken with the model.
//!
//! Requests are a `{user_request, tool_response}` JSON envelope; the first one of
//! a session is wrapped in the instruction template together with the tool
//! catalogue. Replies must be a single JSON object tagged by `content`.

use minijinja::{context, Environment};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::CodecError;
use crate::registry::ServerTools;

const INSTRUCTIONS_TEMPLATE: &str = include_str!("prompts/mcp_client.md");
const INSTRUCTIONS_NAME: &str = "mcp_client.md";

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub user_request: String,
    pub tool_response: String,
}

impl ModelRequest {
    pub fn new<U: Into<String>, T: Into<String>>(user_request: U, tool_response: T) -> Self {
        Self {
            user_request: user_request.into(),
            tool_response: tool_response.into(),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
    pub server_name: String,
}

fn empty_arguments() -> Value {
    Value::Object(Default::default())
}

impl ToolInvocation {
    pub fn new<N: Into<String>, S: Into<String>>(name: N, arguments: Value, server_name: S) -> Self {
        Self {
            name: name.into(),
            arguments,
            server_name: server_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "content", rename_all = "snake_case")]
pub enum ModelReply {
    /// Final answer; ends the session.
    Text { user_response: String },
    /// Request to run a tool, optionally with a note for the user.
    ToolUse {
        #[serde(default)]
        user_response: Option<String>,
        tool: ToolInvocation,
    },
}

/// Prompt for the first turn: instructions, tool catalogue and the request.
pub fn encode_initial_prompt(
    tools: &[ServerTools],
    request: &ModelRequest,
) -> Result<String, CodecError> {
    let mut env = Environment::new();
    env.add_template(INSTRUCTIONS_NAME, INSTRUCTIONS_TEMPLATE)?;
    let template = env.get_template(INSTRUCTIONS_NAME)?;

    let rendered = template.render(context! {
        tools => serde_json::to_string(tools)?,
        request => serde_json::to_string(request)?,
    })?;
    Ok(rendered)
}

/// Prompt for later turns: just the request envelope.
pub fn encode_followup_prompt(request: &ModelRequest) -> Result<String, CodecError> {
    Ok(serde_json::to_string(request)?)
}

/// Decode a raw model reply, tolerating one markdown code fence wrapping it.
///
/// Returns `None` when the reply is not a single valid reply object.
pub fn decode_reply(raw: &str) -> Option<ModelReply> {
    let body = CODE_FENCE
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map_or(raw, |inner| inner.as_str());
    match serde_json::from_str::<ModelReply>(body.trim()) {
        Ok(reply) => Some(reply),
        Err(e) => {
            debug!(error = %e, reply = raw, "model reply is not a valid protocol message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolDescriptor;
    use serde_json::json;

    fn weather_catalogue() -> Vec<ServerTools> {
        vec![ServerTools {
            server_name: "weather".to_string(),
            tools: vec![ToolDescriptor {
                name: "get_weather".to_string(),
                description: Some("Current weather for a city".to_string()),
                input_schema: json!({"type": "object", "properties": {"city": {"type": "string"}}}),
                server_name: "weather".to_string(),
            }],
        }]
    }

    #[test]
    fn test_initial_prompt_embeds_catalogue_and_request() {
        let request = ModelRequest::new("What's the weather in Paris?", "");
        let prompt = encode_initial_prompt(&weather_catalogue(), &request).unwrap();

        assert!(prompt.contains(r#""name":"get_weather""#));
        assert!(prompt.contains(r#""server_name":"weather""#));
        assert!(prompt.contains(
            r#"{"user_request":"What's the weather in Paris?","tool_response":""}"#
        ));
        assert!(prompt.contains("Never invent a tool"));
        assert!(prompt.contains("do not\nwrap it in markdown"));
    }

    #[test]
    fn test_followup_prompt_is_bare_envelope() {
        let prompt = encode_followup_prompt(&ModelRequest::new("", "15°C, cloudy")).unwrap();
        assert_eq!(prompt, r#"{"user_request":"","tool_response":"15°C, cloudy"}"#);
    }

    #[test]
    fn test_decode_text_reply_ignores_tool() {
        let reply = decode_reply(
            r#"{"content":"text","user_response":"Hi!","tool":{"name":"","arguments":{},"server_name":""}}"#,
        );
        assert_eq!(
            reply,
            Some(ModelReply::Text {
                user_response: "Hi!".to_string()
            })
        );
    }

    #[test]
    fn test_decode_fenced_tool_use() {
        let raw = "```json\n{\"content\":\"tool_use\",\"tool\":{\"name\":\"get_weather\",\"arguments\":{\"city\":\"Paris\"},\"server_name\":\"weather\"}}\n```";
        let reply = decode_reply(raw).unwrap();
        assert_eq!(
            reply,
            ModelReply::ToolUse {
                user_response: None,
                tool: ToolInvocation::new("get_weather", json!({"city": "Paris"}), "weather"),
            }
        );
    }

    #[test]
    fn test_decode_keeps_code_blocks_inside_answer() {
        let answer = "Use this:\n```rust\nfn main() {}\n```";
        let json = serde_json::to_string(&json!({"content": "text", "user_response": answer})).unwrap();
        let expected = Some(ModelReply::Text {
            user_response: answer.to_string(),
        });

        assert_eq!(decode_reply(&json), expected);
        assert_eq!(decode_reply(&format!("```json\n{}\n```", json)), expected);
        assert_eq!(decode_reply(&format!("```{}```", json)), expected);
    }

    #[test]
    fn test_decode_defaults_missing_arguments() {
        let reply = decode_reply(
            r#"{"content":"tool_use","user_response":"Checking","tool":{"name":"list_cities","server_name":"weather"}}"#,
        )
        .unwrap();
        let ModelReply::ToolUse { user_response, tool } = reply else {
            panic!("expected tool_use");
        };
        assert_eq!(user_response.as_deref(), Some("Checking"));
        assert_eq!(tool.arguments, json!({}));
    }

    #[test]
    fn test_decode_rejects_invalid_replies() {
        assert_eq!(decode_reply("Sure! The weather is nice."), None);
        assert_eq!(decode_reply("```json\n{not json}\n```"), None);
        // missing required fields per branch
        assert_eq!(decode_reply(r#"{"content":"text"}"#), None);
        assert_eq!(decode_reply(r#"{"content":"tool_use","user_response":"x"}"#), None);
        assert_eq!(
            decode_reply(r#"{"content":"tool_use","tool":{"name":"get_weather"}}"#),
            None
        );
        // unknown tag
        assert_eq!(decode_reply(r#"{"content":"image","user_response":"x"}"#), None);
        // two objects
        assert_eq!(
            decode_reply(r#"{"content":"text","user_response":"a"}{"content":"text","user_response":"b"}"#),
            None
        );
    }
}
