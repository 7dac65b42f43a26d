use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Inbound chat-completion body. Only the fields routing depends on are
/// typed; everything else is carried through untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    /// Model name from the body, trimmed, falling back to `default_model`.
    pub fn model_or(&self, default_model: &str) -> String {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| default_model.trim())
            .to_string()
    }

    /// True when any of `tools`, `functions` or `tool_choice` is present and
    /// non-empty.
    pub fn needs_function_calling(&self) -> bool {
        [&self.tools, &self.functions, &self.tool_choice]
            .into_iter()
            .any(|field| field.as_ref().is_some_and(is_non_empty))
    }
}

fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}
