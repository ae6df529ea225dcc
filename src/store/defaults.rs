//! Built-in configuration used when no stored document exists.

use serde_json::{json, Value};

/// The stock configuration document, version 0.
pub fn default_config() -> Value {
    json!({
        "version": 0,
        "ui": {
            "default_locale": "",
            "prompt_suggestions": [
                {
                    "title": ["Help me study", "vocabulary for a college entrance exam"],
                    "content": "Help me study vocabulary: write a sentence for me to fill in the blank, and I'll try to pick the correct option."
                },
                {
                    "title": ["Tell me a fun fact", "about the Roman Empire"],
                    "content": "Tell me a random fun fact about the Roman Empire"
                }
            ]
        }
    })
}
