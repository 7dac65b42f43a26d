use std::fmt;

const FUNCTION_CALL_SUFFIX: &str = "#function";

/// Selector lookup key: model name plus whether the request needs
/// function/tool calling. The two variants of a model resolve to different
/// selectors because not every backend supports tools.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingKey {
    model: String,
    function_call: bool,
}

impl RoutingKey {
    pub fn new(model: impl AsRef<str>, function_call: bool) -> Self {
        Self {
            model: model.as_ref().trim().to_string(),
            function_call,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn function_call(&self) -> bool {
        self.function_call
    }

    /// Both keys a model can occupy in the cache.
    pub fn both(model: &str) -> [RoutingKey; 2] {
        [RoutingKey::new(model, false), RoutingKey::new(model, true)]
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.function_call {
            write!(f, "{}{}", self.model, FUNCTION_CALL_SUFFIX)
        } else {
            f.write_str(&self.model)
        }
    }
}
