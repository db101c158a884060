//! Chat-completion request payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{InferenceError, InferenceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling options sent alongside the messages. Unset fields are left out
/// of the request so the server default applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Number of completions. Only the first one is read back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default)]
    pub stream: bool,

    /// Anything else the endpoint understands, copied verbatim into the body.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// Body keys owned by the typed fields; `extra` may not set them.
const RESERVED_KEYS: &[&str] = &[
    "model",
    "messages",
    "stream",
    "stream_options",
    "temperature",
    "max_tokens",
    "top_p",
    "n",
    "seed",
];

/// A model id, the messages and the generation options for one call.
///
/// Holds at most one system message, always first.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPayload {
    pub model: String,
    pub messages: Vec<Message>,
    pub options: GenerationOptions,
}

impl RequestPayload {
    pub fn new(model: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(user)],
            options: GenerationOptions::default(),
        }
    }

    /// Builds the usual `system?, user` pair. An empty system prompt is dropped.
    pub fn chat(model: impl Into<String>, system: Option<&str>, user: impl Into<String>) -> Self {
        let payload = Self::new(model, user);
        match system {
            Some(s) if !s.trim().is_empty() => payload.with_system(s),
            _ => payload,
        }
    }

    /// Sets the system message, replacing any existing one.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.retain(|m| m.role != Role::System);
        self.messages.insert(0, Message::system(system));
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn system(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Rejects payloads assembled by hand that break the message invariant.
    pub fn validate(&self) -> InferenceResult<()> {
        if self.model.trim().is_empty() {
            return Err(InferenceError::InvalidRequest("model id is empty".into()));
        }
        if !self.messages.iter().any(|m| m.role == Role::User) {
            return Err(InferenceError::InvalidRequest("no user message".into()));
        }
        let systems = self.messages.iter().filter(|m| m.role == Role::System).count();
        if systems > 1 {
            return Err(InferenceError::InvalidRequest(format!(
                "{systems} system messages, at most one allowed"
            )));
        }
        if systems == 1 && self.messages[0].role != Role::System {
            return Err(InferenceError::InvalidRequest(
                "system message must come first".into(),
            ));
        }
        if let Some(key) = self.options.extra.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
            return Err(InferenceError::InvalidRequest(format!(
                "extra option '{key}' collides with a built-in request field"
            )));
        }
        Ok(())
    }

    /// The JSON body sent to the endpoint.
    pub(crate) fn wire_body(&self, stream: bool) -> WireRequest<'_> {
        WireRequest {
            model: &self.model,
            messages: &self.messages,
            options: WireOptions {
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens,
                top_p: self.options.top_p,
                n: self.options.n,
                seed: self.options.seed,
                extra: &self.options.extra,
            },
            stream,
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(flatten)]
    options: WireOptions<'a>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct WireOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_puts_system_first_and_drops_empty() {
        let payload = RequestPayload::chat("glm-4-flash", Some("be brief"), "hi");
        assert_eq!(payload.system(), Some("be brief"));
        assert_eq!(payload.messages.len(), 2);
        assert!(payload.validate().is_ok());

        let payload = RequestPayload::chat("glm-4-flash", Some("  "), "hi");
        assert_eq!(payload.system(), None);
        assert_eq!(payload.messages.len(), 1);
    }

    #[test]
    fn with_system_replaces_existing() {
        let payload = RequestPayload::new("m", "hi").with_system("a").with_system("b");
        assert_eq!(payload.messages.len(), 2);
        assert_eq!(payload.system(), Some("b"));
    }

    #[test]
    fn validate_rejects_misplaced_system() {
        let mut payload = RequestPayload::new("m", "hi");
        payload.messages.push(Message::system("late"));
        assert!(matches!(payload.validate(), Err(InferenceError::InvalidRequest(_))));

        let mut payload = RequestPayload::new("m", "hi").with_system("a");
        payload.messages.insert(0, Message::system("b"));
        assert!(matches!(payload.validate(), Err(InferenceError::InvalidRequest(_))));
    }

    #[test]
    fn wire_body_shape() {
        let options = GenerationOptions {
            temperature: Some(0.5),
            max_tokens: Some(4096),
            top_p: Some(0.5),
            n: Some(1),
            ..GenerationOptions::default()
        };
        let payload = RequestPayload::chat("glm-4-flash", Some("sys"), "question")
            .with_options(options);

        let body = serde_json::to_value(payload.wire_body(false)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "glm-4-flash",
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "question"}
                ],
                "temperature": 0.5,
                "max_tokens": 4096,
                "top_p": 0.5,
                "n": 1,
                "stream": false
            })
        );

        let body = serde_json::to_value(payload.wire_body(true)).unwrap();
        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["stream_options"], json!({"include_usage": true}));
    }

    #[test]
    fn extra_options_are_flattened() {
        let mut options = GenerationOptions::default();
        options.extra.insert("repetition_penalty".into(), json!(1.05));
        let payload = RequestPayload::new("m", "q").with_options(options);
        let body = serde_json::to_value(payload.wire_body(false)).unwrap();
        assert_eq!(body["repetition_penalty"], json!(1.05));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn validate_rejects_reserved_extra_keys() {
        for key in ["model", "messages", "stream", "stream_options", "max_tokens"] {
            let mut options = GenerationOptions::default();
            options.extra.insert(key.into(), json!(true));
            let payload = RequestPayload::new("m", "q").with_options(options);
            assert!(
                matches!(payload.validate(), Err(InferenceError::InvalidRequest(ref msg)) if msg.contains(key)),
                "{key}"
            );
        }

        let mut options = GenerationOptions::default();
        options.extra.insert("repetition_penalty".into(), json!(1.05));
        assert!(RequestPayload::new("m", "q").with_options(options).validate().is_ok());
    }
}
