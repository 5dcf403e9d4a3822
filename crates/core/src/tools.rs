//! Tool catalog and the typed-dispatch contract every adapter implements.
//!
//! Each adapter declares:
//! - a static catalog of [`ToolSpec`]s (name, description, effect, JSON Schema of its arguments)
//! - a `Call` enum with one variant per tool, deserialized from `{"tool", "arguments"}`

use crate::envelope::Envelope;
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use rmcp::model::{JsonObject, Tool, ToolAnnotations};
use rmcp::schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

/// What a tool does to upstream state. Drives the MCP tool annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Reads only (GET-like).
    Read,
    /// Creates something new on every call (POST-like).
    Create,
    /// Overwrites state; repeating the call is harmless (PUT-like).
    Replace,
    /// Partial update; repeatability unknown (PATCH-like).
    Update,
    /// Removes state (DELETE-like).
    Delete,
}

/// Generate MCP tool annotations from a tool's effect.
///
/// `openWorldHint` is set when the tool talks to a third-party service.
#[must_use]
pub fn annotations_for_effect(effect: Effect, open_world: bool) -> ToolAnnotations {
    let (read_only, destructive, idempotent) = match effect {
        Effect::Read => (true, false, Some(true)),
        Effect::Create => (false, false, Some(false)),
        Effect::Replace | Effect::Delete => (false, true, Some(true)),
        // Partial updates may or may not be idempotent; do not guess.
        Effect::Update => (false, true, None),
    };
    ToolAnnotations {
        title: None,
        read_only_hint: Some(read_only),
        destructive_hint: Some(destructive),
        idempotent_hint: idempotent,
        open_world_hint: Some(open_world),
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub effect: Effect,
    pub open_world: bool,
    pub input_schema: Arc<JsonObject>,
}

impl ToolSpec {
    /// Declare a tool whose arguments are described by `A`.
    #[must_use]
    pub fn new<A: JsonSchema>(name: &'static str, effect: Effect, description: &'static str) -> Self {
        Self {
            name,
            description,
            effect,
            open_world: true,
            input_schema: schema_for::<A>(),
        }
    }

    /// Mark the tool as operating on a closed system (e.g. a database the operator owns).
    #[must_use]
    pub fn closed_world(mut self) -> Self {
        self.open_world = false;
        self
    }

    #[must_use]
    pub fn to_tool(&self) -> Tool {
        let mut tool = Tool::new(self.name, self.description, self.input_schema.clone());
        tool.annotations = Some(annotations_for_effect(self.effect, self.open_world));
        tool
    }
}

/// JSON Schema for a tool's argument struct, as an MCP input schema object.
#[must_use]
pub fn schema_for<A: JsonSchema>() -> Arc<JsonObject> {
    let schema = rmcp::schemars::schema_for!(A);
    let mut obj = serde_json::to_value(schema)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    obj.remove("$schema");
    obj.remove("title");
    obj.entry("type").or_insert_with(|| json!("object"));
    if !obj.contains_key("properties") {
        obj.insert("properties".to_string(), json!({}));
    }
    Arc::new(obj)
}

/// Arguments of tools that take none.
#[derive(Debug, Clone, Default, serde::Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct NoArgs {}

/// Deserialize a tool call into the adapter's tagged `Call` enum.
///
/// `C` must be `#[serde(tag = "tool", content = "arguments")]`.
///
/// # Errors
///
/// Returns [`AdapterError::InvalidParams`] if required arguments are missing or have the wrong
/// type.
pub fn parse_call<C: DeserializeOwned>(name: &str, arguments: Option<JsonObject>) -> Result<C> {
    let arguments = Value::Object(arguments.unwrap_or_default());
    serde_json::from_value(json!({ "tool": name, "arguments": arguments }))
        .map_err(|e| AdapterError::InvalidParams(format!("invalid arguments for '{name}': {e}")))
}

/// One adapter: its catalog, its typed calls, and their execution.
#[async_trait]
pub trait ToolSet: Send + Sync + 'static {
    type Call: DeserializeOwned + Send;

    /// Server name reported during MCP initialization.
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn instructions(&self) -> Option<String> {
        None
    }

    fn tools(&self) -> Vec<ToolSpec>;

    /// Execute a parsed call.
    ///
    /// Upstream failures may be returned as `Err`; the server converts them into a failure
    /// [`Envelope`]. [`AdapterError::InvalidParams`] is reported as a protocol error instead.
    async fn invoke(&self, call: Self::Call) -> Result<Envelope>;

    /// Release held resources (connection pools) before the process exits.
    async fn shutdown(&self) {}
}

/// Assert that every catalog entry names a variant of `C`.
///
/// Used by each adapter's tests: a name that serde reports as an unknown variant means the
/// catalog and the `Call` enum drifted apart.
#[must_use]
pub fn unknown_catalog_entries<C: DeserializeOwned>(tools: &[ToolSpec]) -> Vec<&'static str> {
    tools
        .iter()
        .filter(|t| match parse_call::<C>(t.name, None) {
            Ok(_) => false,
            Err(e) => e.to_string().contains("unknown variant"),
        })
        .map(|t| t.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[schemars(crate = "rmcp::schemars")]
    struct GetThingArgs {
        /// Thing identifier.
        id: String,
        #[serde(default)]
        verbose: Option<bool>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
    enum Call {
        GetThing(GetThingArgs),
        ListThings(NoArgs),
    }

    #[test]
    fn parse_call_resolves_variant_and_arguments() {
        let mut args = JsonObject::new();
        args.insert("id".into(), json!("t-1"));
        let call: Call = parse_call("get_thing", Some(args)).expect("parse");
        match call {
            Call::GetThing(a) => {
                assert_eq!(a.id, "t-1");
                assert_eq!(a.verbose, None);
            }
            Call::ListThings(_) => panic!("wrong variant"),
        }

        let call: Call = parse_call("list_things", None).expect("parse");
        assert!(matches!(call, Call::ListThings(_)));
    }

    #[test]
    fn parse_call_reports_missing_fields_as_invalid_params() {
        let err = parse_call::<Call>("get_thing", None).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams(_)));
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn catalog_consistency_check_finds_unknown_names() {
        let tools = vec![
            ToolSpec::new::<GetThingArgs>("get_thing", Effect::Read, "Get a thing"),
            ToolSpec::new::<NoArgs>("delete_thing", Effect::Delete, "Delete a thing"),
        ];
        assert_eq!(unknown_catalog_entries::<Call>(&tools), vec!["delete_thing"]);
    }

    #[test]
    fn schema_lists_properties_and_required() {
        let schema = schema_for::<GetThingArgs>();
        assert_eq!(schema.get("type"), Some(&json!("object")));
        assert!(schema["properties"].get("id").is_some());
        assert_eq!(schema.get("required"), Some(&json!(["id"])));
        assert!(!schema.contains_key("$schema"));

        let empty = schema_for::<NoArgs>();
        assert_eq!(empty.get("properties"), Some(&json!({})));
    }

    #[test]
    fn annotations_follow_effect() {
        let read = annotations_for_effect(Effect::Read, true);
        assert_eq!(read.read_only_hint, Some(true));
        assert_eq!(read.idempotent_hint, Some(true));
        assert_eq!(read.open_world_hint, Some(true));

        let update = annotations_for_effect(Effect::Update, false);
        assert_eq!(update.destructive_hint, Some(true));
        assert_eq!(update.idempotent_hint, None);
        assert_eq!(update.open_world_hint, Some(false));
    }
}
