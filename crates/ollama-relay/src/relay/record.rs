use serde::{Deserialize, Deserializer};

/// One JSON line of an Ollama generate response
///
/// Ollama lines look like:
/// ```json
/// {"model":"llama3","created_at":"...","response":"Hello","done":false}
/// ```
/// Unrecognized fields are ignored.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct UpstreamRecord {
    /// Incremental text for this record
    #[serde(default)]
    pub response: Option<String>,
    /// Only the literal `true` marks the end of the generation
    #[serde(default, deserialize_with = "literal_true")]
    pub done: bool,
    /// Application-level error reported by the upstream
    #[serde(default)]
    pub error: Option<String>,
}

impl UpstreamRecord {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// The text to forward, if this record carries any
    pub fn fragment(&self) -> Option<&str> {
        self.response.as_deref().filter(|s| !s.is_empty())
    }
}

fn literal_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value == serde_json::Value::Bool(true))
}
