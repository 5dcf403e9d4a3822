//! Atlassian Document Format (ADF) helpers.
//!
//! Jira Cloud v3 only accepts rich text (descriptions, comments) as an ADF tree. Callers may
//! pass plain text, which is wrapped into a one-paragraph document, or a ready-made document,
//! which is forwarded untouched.

use rmcp::schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

/// ADF schema version accepted by Jira Cloud.
pub const ADF_VERSION: u64 = 1;

/// Plain text or a pre-built ADF document.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(untagged)]
pub enum DocumentInput {
    Text(String),
    Document(Value),
}

impl From<&str> for DocumentInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Turn a [`DocumentInput`] into the ADF tree sent to Jira.
#[must_use]
pub fn build_document(input: DocumentInput) -> Value {
    match input {
        DocumentInput::Text(text) => text_document(&text),
        DocumentInput::Document(doc) => doc,
    }
}

#[must_use]
pub fn text_document(text: &str) -> Value {
    json!({
        "type": "doc",
        "version": ADF_VERSION,
        "content": [{
            "type": "paragraph",
            "content": [{ "type": "text", "text": text }]
        }]
    })
}
