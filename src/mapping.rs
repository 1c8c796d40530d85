use indexmap::IndexMap;
use serde_json::Value;

use crate::{context::FlowContext, resolve::get_by_path};

/// Build a context patch from an API response.
///
/// Every `(context_key, dotted_path)` pair produces an entry. A path that does not resolve
/// yields `null`, so merging the patch still overwrites an earlier value for that key.
pub fn extract_and_map(response: &Value, mapping: &IndexMap<String, String>) -> FlowContext {
    mapping
        .iter()
        .map(|(context_key, path)| {
            let value = match get_by_path(response, path) {
                Some(found) => found.clone(),
                None => {
                    tracing::debug!(
                        context_key = %context_key,
                        path = %path,
                        "response mapping miss, writing null"
                    );
                    Value::Null
                }
            };
            (context_key.clone(), value)
        })
        .collect()
}
