//! The uniform `{success, data|error, message?}` result every tool returns.

use crate::error::AdapterError;
use rmcp::model::{CallToolResult, Content};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Render as an MCP tool result: one pretty-printed JSON text block, `isError` on failure.
    #[must_use]
    pub fn into_call_result(self) -> CallToolResult {
        let text = serde_json::to_string_pretty(&self).unwrap_or_else(|e| {
            format!(r#"{{"success": false, "error": "failed to serialize result: {e}"}}"#)
        });
        if self.success {
            CallToolResult::success(vec![Content::text(text)])
        } else {
            CallToolResult::error(vec![Content::text(text)])
        }
    }
}

impl From<AdapterError> for Envelope {
    fn from(e: AdapterError) -> Self {
        Self::failure(e.to_string())
    }
}

impl From<crate::error::Result<Value>> for Envelope {
    fn from(r: crate::error::Result<Value>) -> Self {
        match r {
            Ok(v) => Self::ok(v),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_omits_error_key() {
        let v = serde_json::to_value(Envelope::ok(json!({"id": 1}))).expect("serialize");
        assert_eq!(v, json!({"success": true, "data": {"id": 1}}));
    }

    #[test]
    fn failure_omits_data_key_and_keeps_message() {
        let env = Envelope::failure("boom").with_message("while creating issue");
        let v = serde_json::to_value(env).expect("serialize");
        assert_eq!(
            v,
            json!({"success": false, "error": "boom", "message": "while creating issue"})
        );
    }

    #[test]
    fn call_result_flags_errors() {
        let ok = Envelope::ok(json!(null)).into_call_result();
        assert_eq!(ok.is_error, Some(false));

        let err = Envelope::from(AdapterError::Authentication("no token".into())).into_call_result();
        assert_eq!(err.is_error, Some(true));
        let v = serde_json::to_value(&err).expect("serialize");
        let text = v["content"][0]["text"].as_str().expect("text block");
        let parsed: Envelope = serde_json::from_str(text).expect("envelope json");
        assert!(!parsed.success);
        assert_eq!(
            parsed.error.as_deref(),
            Some("Authentication failed: no token")
        );
    }
}
