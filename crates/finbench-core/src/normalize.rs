//! Turns raw endpoint bodies into a [`CanonicalResponse`].
//!
//! Buffered bodies are a single chat-completion document. Streamed bodies
//! are `data: {...}` lines terminated by `data: [DONE]`; they are folded
//! through a [`StreamAccumulator`], which the client also drives directly
//! while bytes arrive.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{InferenceError, InferenceResult};
use finbench_types::CanonicalResponse;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// Normalizes a complete response body.
pub fn normalize(raw_body: &str, is_stream: bool) -> InferenceResult<CanonicalResponse> {
    if !is_stream {
        return parse_full_response(raw_body);
    }

    let mut acc = StreamAccumulator::new();
    for line in raw_body.lines() {
        if acc.push_line(line) == LineOutcome::Done {
            break;
        }
    }

    if !acc.saw_data() && !acc.is_done() {
        // Some servers ignore `stream: true` and answer with one (possibly
        // pretty-printed) JSON document.
        debug!("stream body carried no fragments, parsing it as a single response");
        return parse_full_response(raw_body);
    }
    Ok(acc.finish())
}

#[derive(Debug, Deserialize)]
struct FullResponse {
    choices: Vec<FullChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FullChoice {
    message: FullMessage,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    content: Option<String>,
    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,
}

fn parse_full_response(body: &str) -> InferenceResult<CanonicalResponse> {
    let parsed: FullResponse = serde_json::from_str(body.trim())
        .map_err(|e| InferenceError::MalformedResponse(format!("{e}: {}", preview(body))))?;
    full_into_canonical(parsed)
}

fn full_into_canonical(parsed: FullResponse) -> InferenceResult<CanonicalResponse> {
    let FullResponse { choices, usage } = parsed;
    let message = choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| InferenceError::MalformedResponse("response has no choices".into()))?;
    let content = message.content.ok_or_else(|| {
        InferenceError::MalformedResponse("first choice has no message content".into())
    })?;

    Ok(CanonicalResponse {
        content,
        reasoning: message.reasoning_content.filter(|r| !r.is_empty()),
        usage: usage.filter(|u| !u.is_null()),
    })
}

#[derive(Debug, Deserialize)]
struct StreamFragment {
    #[serde(default)]
    choices: Vec<FragmentChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct FragmentChoice {
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,
}

impl StreamFragment {
    /// `{"foo": 1}` deserializes into an empty fragment; don't count it.
    fn is_meaningful(&self) -> bool {
        !self.choices.is_empty() || self.usage.as_ref().is_some_and(|u| !u.is_null())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank line, comment or `event:` field.
    Ignored,
    Fragment,
    /// The line was a whole response document rather than a delta.
    Standalone,
    /// Neither a fragment nor a response; logged and dropped.
    Skipped,
    /// Terminal marker seen. Later lines are ignored.
    Done,
}

/// Incremental fold of streamed fragments, in arrival order.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    reasoning: String,
    has_reasoning: bool,
    usage: Option<Value>,
    pending: Vec<u8>,
    fragments: usize,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// True once any fragment or standalone response was folded in.
    pub fn saw_data(&self) -> bool {
        self.fragments > 0
    }

    /// Feeds raw bytes as they come off the wire; lines may straddle chunks.
    pub fn push_chunk(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if self.push_line(&line) == LineOutcome::Done {
                self.pending.clear();
                return;
            }
        }
    }

    pub fn push_line(&mut self, line: &str) -> LineOutcome {
        if self.done {
            return LineOutcome::Done;
        }

        let line = line.trim();
        if line.is_empty() || line.starts_with(':') || line.starts_with("event:") || line.starts_with("id:") {
            return LineOutcome::Ignored;
        }

        let data = line.strip_prefix(DATA_PREFIX).map(str::trim_start).unwrap_or(line);
        if data == DONE_MARKER {
            self.done = true;
            return LineOutcome::Done;
        }

        match serde_json::from_str::<StreamFragment>(data) {
            Ok(fragment) if fragment.is_meaningful() => {
                self.apply_fragment(fragment);
                return LineOutcome::Fragment;
            }
            _ => {}
        }

        match serde_json::from_str::<FullResponse>(data).map(full_into_canonical) {
            Ok(Ok(response)) => {
                self.apply_standalone(response);
                LineOutcome::Standalone
            }
            _ => {
                warn!(line = %preview(data), "skipping unrecognised stream line");
                LineOutcome::Skipped
            }
        }
    }

    fn apply_fragment(&mut self, fragment: StreamFragment) {
        self.fragments += 1;
        if let Some(choice) = fragment.choices.into_iter().next() {
            if let Some(content) = choice.delta.content {
                self.content.push_str(&content);
            }
            // Empty reasoning deltas count as absent, as in buffered bodies.
            if let Some(reasoning) = choice.delta.reasoning_content.filter(|r| !r.is_empty()) {
                self.reasoning.push_str(&reasoning);
                self.has_reasoning = true;
            }
        }
        if let Some(usage) = fragment.usage.filter(|u| !u.is_null()) {
            self.usage = Some(usage);
        }
    }

    fn apply_standalone(&mut self, response: CanonicalResponse) {
        self.fragments += 1;
        self.content.push_str(&response.content);
        if let Some(reasoning) = response.reasoning {
            self.reasoning.push_str(&reasoning);
            self.has_reasoning = true;
        }
        if response.usage.is_some() {
            self.usage = response.usage;
        }
    }

    pub fn finish(mut self) -> CanonicalResponse {
        if !self.done && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.push_line(&String::from_utf8_lossy(&rest));
        }
        if !self.done {
            debug!(fragments = self.fragments, "stream ended without terminal marker");
        }
        CanonicalResponse {
            content: self.content,
            reasoning: self.has_reasoning.then_some(self.reasoning),
            usage: self.usage,
        }
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 200;
    let s = s.trim();
    if s.chars().count() <= MAX {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const BUFFERED: &str = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"The answer is 42."},"finish_reason":"stop"}],"usage":{"prompt_tokens":9,"completion_tokens":5,"total_tokens":14}}"#;

    fn sse(lines: &[&str]) -> String {
        lines
            .iter()
            .map(|l| format!("data: {l}\n\n"))
            .collect::<String>()
    }

    #[test]
    fn buffered_body() {
        let resp = normalize(BUFFERED, false).unwrap();
        assert_eq!(resp.content, "The answer is 42.");
        assert_eq!(resp.reasoning, None);
        assert_eq!(resp.usage.unwrap()["total_tokens"], json!(14));
    }

    #[test]
    fn buffered_is_deterministic() {
        assert_eq!(normalize(BUFFERED, false).unwrap(), normalize(BUFFERED, false).unwrap());
    }

    #[test]
    fn buffered_missing_structure_is_malformed() {
        for body in [r#"{"choices":[]}"#, r#"{"error":"x"}"#, "not json", r#"{"choices":[{"message":{"content":null}}]}"#] {
            assert!(
                matches!(normalize(body, false), Err(InferenceError::MalformedResponse(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn stream_concatenates_in_order_and_matches_buffered() {
        let body = sse(&[
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{"content":"The answer"}}]}"#,
            r#"{"choices":[{"delta":{"content":" is "}}]}"#,
            r#"{"choices":[{"delta":{"content":"42."}}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":5,"total_tokens":14}}"#,
            "[DONE]",
        ]);
        let streamed = normalize(&body, true).unwrap();
        let buffered = normalize(BUFFERED, false).unwrap();
        assert_eq!(streamed, buffered);
    }

    #[test]
    fn stream_collects_reasoning_separately() {
        let body = sse(&[
            r#"{"choices":[{"delta":{"reasoning_content":"think "}}]}"#,
            r#"{"choices":[{"delta":{"reasoning_content":"hard"}}]}"#,
            r#"{"choices":[{"delta":{"content":"B"}}]}"#,
            "[DONE]",
        ]);
        let resp = normalize(&body, true).unwrap();
        assert_eq!(resp.content, "B");
        assert_eq!(resp.reasoning.as_deref(), Some("think hard"));
        assert_eq!(resp.usage, None);
    }

    #[test]
    fn stream_stops_at_done_marker() {
        let body = sse(&[
            r#"{"choices":[{"delta":{"content":"kept"}}]}"#,
            "[DONE]",
            r#"{"choices":[{"delta":{"content":" dropped"}}]}"#,
        ]);
        assert_eq!(normalize(&body, true).unwrap().content, "kept");
    }

    #[test]
    fn stream_skips_garbage_and_accepts_standalone_lines() {
        let body = format!(
            "{}data: {{not json\n: keep-alive\nevent: message\n{}{}",
            sse(&[r#"{"choices":[{"delta":{"content":"a"}}]}"#]),
            sse(&[r#"{"choices":[{"message":{"content":"b"}}]}"#]),
            sse(&["[DONE]"]),
        );
        assert_eq!(normalize(&body, true).unwrap().content, "ab");
    }

    #[test]
    fn stream_flag_with_plain_json_body() {
        let pretty = serde_json::to_string_pretty(&serde_json::from_str::<Value>(BUFFERED).unwrap()).unwrap();
        let resp = normalize(&pretty, true).unwrap();
        assert_eq!(resp.content, "The answer is 42.");
    }

    #[test]
    fn stream_with_nothing_usable_is_malformed() {
        assert!(matches!(
            normalize("data: nope\n\n", true),
            Err(InferenceError::MalformedResponse(_))
        ));
    }

    #[test]
    fn marker_only_stream_is_empty_content() {
        let resp = normalize(&sse(&["[DONE]"]), true).unwrap();
        assert_eq!(resp.content, "");
        assert_eq!(resp.reasoning, None);
        assert_eq!(resp.usage, None);
    }

    #[test]
    fn empty_reasoning_is_absent_in_both_paths() {
        let streamed = normalize(
            &sse(&[r#"{"choices":[{"delta":{"content":"B","reasoning_content":""}}]}"#, "[DONE]"]),
            true,
        )
        .unwrap();
        let buffered = normalize(r#"{"choices":[{"message":{"content":"B","reasoning_content":""}}]}"#, false).unwrap();
        assert_eq!(streamed, buffered);
        assert_eq!(streamed.reasoning, None);
    }

    #[test]
    fn chunks_split_mid_line() {
        let body = sse(&[
            r#"{"choices":[{"delta":{"content":"你好"}}]}"#,
            r#"{"choices":[{"delta":{"content":", world"}}]}"#,
            "[DONE]",
        ]);
        let mut acc = StreamAccumulator::new();
        for chunk in body.as_bytes().chunks(7) {
            acc.push_chunk(chunk);
        }
        assert!(acc.is_done());
        assert_eq!(acc.finish().content, "你好, world");
    }

    #[test]
    fn unterminated_stream_keeps_what_arrived() {
        let mut acc = StreamAccumulator::new();
        acc.push_chunk(br#"data: {"choices":[{"delta":{"content":"partial"}}]}"#);
        assert!(!acc.is_done());
        assert_eq!(acc.finish().content, "partial");
    }
}
