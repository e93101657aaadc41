//! Log-friendly classification of relayed negotiation messages
//!
//! The relay forwards payloads without looking at them. This module only
//! exists to put something readable in the log: [`summarize`] returns `None`
//! for anything it does not understand, and callers forward regardless.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

/// Outer shape of a message exchanged by the streamer and viewer pages
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    data: Option<Value>,
}

/// Payload of a `signal` message
#[derive(Debug, Default, Deserialize)]
struct SignalData {
    #[serde(rename = "type", default)]
    kind: Option<String>,

    #[serde(default)]
    sdp: Option<Value>,

    #[serde(default)]
    candidate: Option<Value>,
}

/// What a message appears to be, for logging
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageSummary {
    /// Viewer asking the streamer for a fresh offer
    RequestOffer,

    /// Session description offer
    Offer { has_sdp: bool },

    /// Session description answer
    Answer { has_sdp: bool },

    /// Network path candidate, with the address/type detail that could be extracted
    Candidate { detail: String },

    /// A `signal` message with nothing recognizable inside
    Signal,

    /// Any other message type, by name
    Other(String),
}

impl fmt::Display for MessageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageSummary::RequestOffer => {
                write!(f, "request_offer (viewer requesting offer from streamers)")
            }
            MessageSummary::Offer { has_sdp } => {
                write!(f, "signal (offer - {})", sdp_label(*has_sdp))
            }
            MessageSummary::Answer { has_sdp } => {
                write!(f, "signal (answer - {})", sdp_label(*has_sdp))
            }
            MessageSummary::Candidate { detail } => write!(f, "signal (ICE candidate: {})", detail),
            MessageSummary::Signal => write!(f, "signal"),
            MessageSummary::Other(kind) => write!(f, "{}", kind),
        }
    }
}

fn sdp_label(has_sdp: bool) -> &'static str {
    if has_sdp {
        "with SDP"
    } else {
        "no SDP"
    }
}

/// Best-effort classification of a raw payload
pub fn summarize(payload: &[u8]) -> Option<MessageSummary> {
    let envelope: Envelope = serde_json::from_slice(payload).ok()?;

    let summary = match envelope.kind.as_str() {
        "request_offer" => MessageSummary::RequestOffer,
        // Only an object is inspected; serde would also fill the struct from an array.
        "signal" => match envelope.data {
            Some(data @ Value::Object(_)) => serde_json::from_value::<SignalData>(data)
                .map(summarize_signal)
                .unwrap_or(MessageSummary::Signal),
            _ => MessageSummary::Signal,
        },
        _ => MessageSummary::Other(envelope.kind),
    };

    Some(summary)
}

fn summarize_signal(data: SignalData) -> MessageSummary {
    let has_sdp = data.sdp.as_ref().is_some_and(is_truthy);

    match data.kind.as_deref() {
        Some("offer") => return MessageSummary::Offer { has_sdp },
        Some("answer") => return MessageSummary::Answer { has_sdp },
        _ => {}
    }

    match data.candidate {
        Some(Value::String(line)) if !line.is_empty() => MessageSummary::Candidate {
            detail: candidate_line_detail(&line),
        },
        Some(Value::Object(fields)) => {
            let detail = match fields.get("candidate") {
                Some(Value::String(line)) if !line.is_empty() => line.clone(),
                _ => "object".to_string(),
            };
            MessageSummary::Candidate { detail }
        }
        Some(other) if is_truthy(&other) => MessageSummary::Candidate {
            detail: "object".to_string(),
        },
        _ => MessageSummary::Signal,
    }
}

/// Pull the address (field 5) and candidate type (field 8) out of an
/// `a=candidate` style line
fn candidate_line_detail(line: &str) -> String {
    let fields: Vec<&str> = line.split(' ').collect();

    let address = fields
        .get(4)
        .copied()
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown");
    let kind = fields.get(7).copied().unwrap_or_default();

    format!("{} {}", address, kind).trim_end().to_string()
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
