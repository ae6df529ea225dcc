//! Dotted-path lookup into JSON documents.

use serde_json::Value;

/// Resolve `dotted_path` (e.g. `"ui.default_locale"`) inside `document`.
///
/// Returns `None` as soon as a segment is missing or the current node is
/// not an object. A missing key is an expected outcome for optional
/// settings, not an error.
pub fn get_by_path<'a>(document: &'a Value, dotted_path: &str) -> Option<&'a Value> {
    dotted_path
        .split('.')
        .try_fold(document, |current, key| current.as_object()?.get(key))
}
