//! Output extraction — what a step hands to the next one.
//!
//! The default rule looks for a `results` key in the provider response, then
//! `data`, then `output`, and otherwise passes the whole response on. A key
//! holding `null` counts as absent.

use std::sync::Arc;

use serde_json::Value;

/// Derives the next `current_data` from a raw provider response.
pub type OutputExtractor = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Keys consulted by [`extract_output`], in precedence order.
pub const OUTPUT_KEYS: [&str; 3] = ["results", "data", "output"];

pub fn extract_output(response: &Value) -> Value {
    OUTPUT_KEYS
        .iter()
        .find_map(|key| response.get(*key).filter(|v| !v.is_null()))
        .unwrap_or(response)
        .clone()
}

/// The default extractor as a shareable function object.
pub fn default_extractor() -> OutputExtractor {
    Arc::new(extract_output)
}
