//! Conversation data model shared by the model session, the agent loop, and
//! the HTTP relay.
//!
//! Turns and parts serialize in the Gemini `Content` wire shape so a history
//! snapshot handed to the browser can be replayed to the API verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User text and tool results. Older clients label tool results `function`.
    #[serde(alias = "function")]
    User,
    Model,
}

/// One turn of the conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    /// Append a streamed fragment, merging it into the previous part when both
    /// are thought text or both are answer text.
    pub fn push_part(&mut self, part: Part) {
        if let Some(last) = self.parts.last_mut() {
            match (&mut last.kind, &part.kind) {
                (PartKind::Thought(acc), PartKind::Thought(next))
                | (PartKind::Text(acc), PartKind::Text(next)) => {
                    acc.push_str(next);
                    if part.thought_signature.is_some() {
                        last.thought_signature = part.thought_signature;
                    }
                    return;
                }
                _ => {}
            }
        }
        self.parts.push(part);
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// A single fragment of turn content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePart", into = "WirePart")]
pub struct Part {
    pub kind: PartKind,
    /// Opaque reasoning signature the API attaches to some parts; it must be
    /// sent back unchanged when the history is replayed.
    pub thought_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartKind {
    Thought(String),
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResult(FunctionResult),
}

impl Part {
    pub fn new(kind: PartKind) -> Self {
        Self {
            kind,
            thought_signature: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(PartKind::Text(text.into()))
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self::new(PartKind::Thought(text.into()))
    }

    pub fn function_call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::new(PartKind::FunctionCall(FunctionCall {
            id: None,
            name: name.into(),
            args,
        }))
    }

    pub fn function_result(result: FunctionResult) -> Self {
        Self::new(PartKind::FunctionResult(result))
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.thought_signature = Some(signature.into());
        self
    }
}

/// A function-call request emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

/// The result of a local tool, fed back to the model as a `functionResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

impl FunctionResult {
    /// Wrap a tool value as `{"result": <value>}`.
    pub fn new(name: impl Into<String>, result: &ToolValue) -> Self {
        Self {
            id: None,
            name: name.into(),
            response: json!({ "result": result }),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        self.response.get("result")
    }
}

// --- Wire representation ---

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    thought: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TryFrom<WirePart> for Part {
    type Error = String;

    fn try_from(wire: WirePart) -> Result<Self, Self::Error> {
        let kind = match (wire.text, wire.function_call, wire.function_response) {
            (Some(text), None, None) if wire.thought => PartKind::Thought(text),
            (Some(text), None, None) => PartKind::Text(text),
            (None, Some(call), None) => PartKind::FunctionCall(call),
            (None, None, Some(result)) => PartKind::FunctionResult(result),
            // A bare signature arrives as its own fragment at the end of some turns.
            (None, None, None) if wire.thought_signature.is_some() => {
                PartKind::Text(String::new())
            }
            (None, None, None) => {
                return Err("part has none of text, functionCall, functionResponse".into());
            }
            _ => {
                return Err(
                    "part has more than one of text, functionCall, functionResponse".into(),
                );
            }
        };
        Ok(Self {
            kind,
            thought_signature: wire.thought_signature,
        })
    }
}

impl From<Part> for WirePart {
    fn from(part: Part) -> Self {
        let mut wire = WirePart {
            thought_signature: part.thought_signature,
            ..WirePart::default()
        };
        match part.kind {
            PartKind::Thought(text) => {
                wire.text = Some(text);
                wire.thought = true;
            }
            PartKind::Text(text) => wire.text = Some(text),
            PartKind::FunctionCall(call) => wire.function_call = Some(call),
            PartKind::FunctionResult(result) => wire.function_response = Some(result),
        }
        wire
    }
}

/// Content handed to the model for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnContent {
    Text(String),
    FunctionResult(FunctionResult),
}

impl TurnContent {
    /// The user-side transcript turn this content becomes.
    pub fn to_turn(&self) -> ConversationTurn {
        let part = match self {
            TurnContent::Text(text) => Part::text(text.clone()),
            TurnContent::FunctionResult(result) => Part::function_result(result.clone()),
        };
        ConversationTurn {
            role: Role::User,
            parts: vec![part],
        }
    }
}

/// Value returned by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolValue {
    Integer(u64),
    Text(String),
    Object(Map<String, Value>),
}

impl From<u64> for ToolValue {
    fn from(n: u64) -> Self {
        ToolValue::Integer(n)
    }
}

impl From<String> for ToolValue {
    fn from(s: String) -> Self {
        ToolValue::Text(s)
    }
}

impl From<&str> for ToolValue {
    fn from(s: &str) -> Self {
        ToolValue::Text(s.to_string())
    }
}

impl fmt::Display for ToolValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolValue::Integer(n) => write!(f, "{n}"),
            ToolValue::Text(s) => f.write_str(s),
            ToolValue::Object(map) => {
                write!(f, "{}", Value::Object(map.clone()))
            }
        }
    }
}

/// A resolved and executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub args: Map<String, Value>,
    pub result: ToolValue,
}

/// One envelope on the client response stream: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    Thought(String),
    Text(String),
    Tool(ToolInvocation),
    History(Vec<ConversationTurn>),
    Error(String),
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Thought(_) => "thought",
            StreamEvent::Text(_) => "text",
            StreamEvent::Tool(_) => "tool",
            StreamEvent::History(_) => "history",
            StreamEvent::Error(_) => "error",
        }
    }
}
