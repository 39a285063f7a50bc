//! Record classification and final-response extraction

use serde::Serialize;
use serde_json::Value;

/// One classified unit of subprocess output.
///
/// The raw line is always retained; `parsed` is present only when the line
/// was valid JSON. Classification never fails: a malformed line simply
/// stays raw and has no effect on neighboring lines.
#[derive(Debug, Clone, Serialize)]
pub struct StreamRecord {
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<Value>,
}

impl StreamRecord {
    pub fn classify(line: &str) -> Self {
        Self {
            raw: line.to_string(),
            parsed: serde_json::from_str(line.trim()).ok(),
        }
    }

    /// The `type` field of the parsed form, when there is one.
    pub fn parsed_type(&self) -> Option<&str> {
        self.parsed.as_ref()?.get("type")?.as_str()
    }
}

/// Derive the single best-effort response text from a completed stream.
///
/// Precedence, kept compatible with what the editor frontend expects:
/// 1. the first record typed `response` or `message`;
/// 2. otherwise the newest record carrying a non-empty `text`, `content`,
///    or `response` string;
/// 3. otherwise the last record, raw if it never parsed;
/// 4. `None` when the stream produced no records at all.
///
/// Within the chosen record the text is `text`, then `content`, then
/// `response`, then the JSON serialization of the whole record.
pub fn extract_final_text(records: &[StreamRecord]) -> Option<String> {
    if let Some(record) = records
        .iter()
        .find(|r| matches!(r.parsed_type(), Some("response") | Some("message")))
    {
        return record.parsed.as_ref().map(record_text);
    }

    for record in records.iter().rev() {
        if let Some(value) = &record.parsed {
            if content_field(value).is_some() {
                return Some(record_text(value));
            }
        }
    }

    records.last().map(|record| match &record.parsed {
        Some(value) => record_text(value),
        None => record.raw.clone(),
    })
}

fn string_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn content_field<'a>(value: &'a Value) -> Option<&'a str> {
    string_field(value, "text")
        .or_else(|| string_field(value, "content"))
        .or_else(|| string_field(value, "response"))
}

fn record_text(value: &Value) -> String {
    content_field(value)
        .map(str::to_owned)
        .unwrap_or_else(|| value.to_string())
}
