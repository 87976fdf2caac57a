//! Frame payload interpretation
//!
//! Upstreams disagree on where the text fragment lives. Each known shape is a
//! matcher tried in priority order; when none yields a string the frame text
//! itself is the delta. Interpretation never fails.

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::StreamEvent;

/// OpenAI-style end-of-stream sentinel
const DONE_MARKER: &str = "[DONE]";

/// Keys that make an object a control frame even without any text
const CONTROL_KEYS: [&str; 4] = ["conversationId", "conversation_id", "done", "debug"];

type DeltaMatcher = fn(&Value) -> Option<&str>;

/// Known delta shapes, highest priority first
const DELTA_MATCHERS: [(&str, DeltaMatcher); 5] = [
    ("delta", direct_delta),
    ("content", direct_content),
    ("message", direct_message),
    ("delta.text|content", nested_delta),
    ("choices[0].delta.content", openai_choice),
];

fn direct_delta(json: &Value) -> Option<&str> {
    json.get("delta")?.as_str()
}

fn direct_content(json: &Value) -> Option<&str> {
    json.get("content")?.as_str()
}

fn direct_message(json: &Value) -> Option<&str> {
    json.get("message")?.as_str()
}

fn nested_delta(json: &Value) -> Option<&str> {
    let delta = json.get("delta")?;
    delta
        .get("text")
        .and_then(Value::as_str)
        .or_else(|| delta.get("content").and_then(Value::as_str))
}

fn openai_choice(json: &Value) -> Option<&str> {
    json.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
}

/// Interpret one decoded frame
pub fn interpret(frame: &str) -> StreamEvent {
    if frame.trim() == DONE_MARKER {
        return StreamEvent {
            done: true,
            ..StreamEvent::default()
        };
    }

    let json = match serde_json::from_str::<Value>(frame) {
        Ok(json) => json,
        Err(_) => {
            if !frame.trim().is_empty() {
                debug!("Frame is not JSON, delivering as text: {} chars", frame.len());
            }
            return raw(frame);
        }
    };

    if let Some(text) = json.as_str() {
        return StreamEvent {
            delta: text.to_string(),
            ..StreamEvent::default()
        };
    }

    let matched = DELTA_MATCHERS
        .iter()
        .find_map(|(shape, matcher)| matcher(&json).map(|delta| (*shape, delta)));

    let delta = match matched {
        Some((shape, delta)) => {
            debug!("  -> {} delta: {} chars", shape, delta.len());
            delta.to_string()
        }
        None if is_control_frame(&json) => String::new(),
        None => {
            warn!("Frame matched no known shape, delivering as text: {}", frame);
            return raw(frame);
        }
    };

    StreamEvent {
        delta,
        conversation_id: conversation_id(&json),
        done: json.get("done").and_then(Value::as_bool).unwrap_or(false),
        debug: json.get("debug").and_then(|d| d.get("endpoints")).cloned(),
    }
}

fn raw(frame: &str) -> StreamEvent {
    StreamEvent {
        delta: frame.to_string(),
        ..StreamEvent::default()
    }
}

fn is_control_frame(json: &Value) -> bool {
    json.as_object()
        .is_some_and(|obj| CONTROL_KEYS.iter().any(|key| obj.contains_key(*key)))
}

fn conversation_id(json: &Value) -> Option<String> {
    json.get("conversationId")
        .or_else(|| json.get("conversation_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
