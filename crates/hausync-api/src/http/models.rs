// Wire models for the controller's `LL` response envelope.
//
// Every `/jdev/...` call (HTTP or realtime text frame) answers with
// `{"LL": {"control": "...", "value": ..., "Code": "200"}}`. Firmware
// versions disagree on casing (`Code` vs `code`) and on whether the code
// and value are strings or numbers, so both are normalized here.

use serde::{Deserialize, Deserializer, Serialize};

/// Outer `{"LL": {...}}` wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct LlEnvelope {
    #[serde(rename = "LL")]
    pub ll: LlResponse,
}

/// The body of an `LL` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlResponse {
    /// Echo of the command path the controller executed.
    #[serde(default)]
    pub control: String,

    /// Result value: a number, a numeric string, or free text.
    #[serde(default)]
    pub value: serde_json::Value,

    /// Status code, normalized to its string form (`"200"`, `"401"`, ...).
    #[serde(rename = "Code", alias = "code", deserialize_with = "deserialize_code")]
    pub code: String,
}

impl LlResponse {
    pub fn is_success(&self) -> bool {
        self.code == "200"
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == "401"
    }

    /// The value as a number, if it is one or parses as one.
    pub fn value_f64(&self) -> Option<f64> {
        match &self.value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// The value as text (numbers are rendered).
    pub fn value_str(&self) -> Option<String> {
        match &self.value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Parse an `LL` envelope from raw text.
pub fn parse_envelope(body: &str) -> Result<LlResponse, crate::Error> {
    serde_json::from_str::<LlEnvelope>(body)
        .map(|env| env.ll)
        .map_err(|e| {
            let preview = body.chars().take(200).collect::<String>();
            crate::Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.to_owned(),
            }
        })
}

fn deserialize_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number code, got {other}"
        ))),
    }
}
