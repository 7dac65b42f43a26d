use serde_json::Value;

/// Point a completion document back at the model name the client asked for.
///
/// Only documents that look like completions (carry `choices`) are touched;
/// error payloads and anything that is not an object pass through unchanged.
pub fn rewrite_completion_model(mut json: Value, client_model: &str) -> Value {
    if let Some(obj) = json.as_object_mut() {
        if obj.contains_key("choices") {
            obj.insert("model".to_string(), Value::String(client_model.to_string()));
        }
    }
    json
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rewrite_completion_model() {
        let input = json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-2024-08-06",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Hello"}}
            ]
        });

        let output = rewrite_completion_model(input, "gpt-4o");

        assert_eq!(output["model"], "gpt-4o");
        assert_eq!(output["choices"][0]["message"]["content"], "Hello");
    }

    #[test]
    fn test_rewrite_adds_model_to_completion_without_one() {
        let output = rewrite_completion_model(json!({"choices": []}), "gpt-4o");
        assert_eq!(output["model"], "gpt-4o");
    }

    #[test]
    fn test_rewrite_skips_non_completion_objects() {
        let input = json!({
            "model": "upstream-name",
            "error": {"message": "quota exceeded"}
        });

        let output = rewrite_completion_model(input.clone(), "gpt-4o");
        assert_eq!(output, input);
    }

    #[test]
    fn test_rewrite_non_object() {
        let input = json!([1, 2, 3]);
        let output = rewrite_completion_model(input.clone(), "gpt-4o");
        assert_eq!(output, input);
    }
}
