//! Rippling adapter (bearer API token).
//!
//! `list_employees` is the only multi-request tool in the suite: it follows `next_cursor` for a
//! bounded number of calls, then de-duplicates by worker id because overlapping pages have been
//! observed while the directory is being edited.

use async_trait::async_trait;
use clap::Args;
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use toolbridge_core::error::classify_status_message;
use toolbridge_core::http::{Auth, RestClient, path_segment};
use toolbridge_core::paginate::{DEFAULT_MAX_PAGE_CALLS, Page, collect_pages, dedup_by_key};
use toolbridge_core::tools::{Effect, NoArgs, ToolSet, ToolSpec};
use toolbridge_core::{AdapterError, Envelope, Result};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://rest.ripplingapis.com";

#[derive(Debug, Clone, Args)]
pub struct RipplingConfig {
    #[arg(long = "rippling-api-token", env = "RIPPLING_API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    #[arg(long = "rippling-base-url", env = "RIPPLING_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Upper bound on page requests made by one `list_employees` call.
    #[arg(
        long = "max-page-calls",
        env = "RIPPLING_MAX_PAGE_CALLS",
        default_value_t = DEFAULT_MAX_PAGE_CALLS
    )]
    pub max_page_calls: usize,
}

pub struct Rippling {
    client: RestClient,
    max_page_calls: usize,
}

/// One row of `list_employees` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeSummary {
    pub id: String,
    pub full_name: String,
}

impl Rippling {
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the base URL is invalid or the page bound is zero.
    pub fn new(config: &RipplingConfig, timeout: Option<Duration>) -> Result<Self> {
        if config.max_page_calls == 0 {
            return Err(AdapterError::Config(
                "max page calls must be at least 1".to_string(),
            ));
        }
        let client = RestClient::builder(config.base_url.clone())
            .auth(Auth::Bearer(config.api_token.clone()))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            max_page_calls: config.max_page_calls,
        })
    }

    async fn list_employees(&self, a: ListEmployeesArgs) -> Result<Envelope> {
        let page = a.page.unwrap_or(1);
        let search = a.search;

        let collected = collect_pages(self.max_page_calls, |cursor| {
            let search = search.clone();
            async move {
                let body = self
                    .client
                    .get("/workers")
                    .query("page", page)
                    .query_opt("search", search)
                    .query_opt("cursor", cursor)
                    .send()
                    .await?;
                Ok(worker_page(body))
            }
        })
        .await?;

        let fetched = collected.items.len();
        let employees: Vec<EmployeeSummary> = dedup_by_key(
            collected.items.iter().filter_map(summarize).collect(),
            |e| e.id.clone(),
        );
        debug!(
            fetched,
            unique = employees.len(),
            calls = collected.calls,
            "listed employees"
        );

        let count = employees.len();
        let message = if collected.truncated {
            format!(
                "Found {count} employees; stopped after {} page requests, more may exist",
                collected.calls
            )
        } else {
            format!("Found {count} employees")
        };
        Ok(Envelope::ok(json!({
            "employees": employees,
            "count": count,
            "truncated": collected.truncated,
        }))
        .with_message(message))
    }

    async fn get_employee(&self, a: EmployeeIdArgs) -> Result<Value> {
        self.client
            .get(format!("/workers/{}", path_segment(&a.employee_id)))
            .send()
            .await
    }

    async fn list_departments(&self, a: CursorArgs) -> Result<Value> {
        self.client
            .get("/departments")
            .query_opt("cursor", a.cursor)
            .send()
            .await
    }

    async fn get_company(&self) -> Result<Value> {
        self.client.get("/companies").send().await
    }
}

/// Records live under `results`; a bare array is accepted as a single final page.
fn worker_page(body: Value) -> Page<Value> {
    match body {
        Value::Array(items) => Page {
            items,
            next_cursor: None,
        },
        Value::Object(mut obj) => {
            let items = match obj.remove("results") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let next_cursor = obj
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            Page { items, next_cursor }
        }
        _ => Page {
            items: Vec::new(),
            next_cursor: None,
        },
    }
}

/// `{id, fullName}` for one worker record, or `None` if it has no id.
fn summarize(record: &Value) -> Option<EmployeeSummary> {
    // Numeric and string ids share one key space: `3` and `"3"` are the same worker.
    let id = match record.get("id")? {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let text = |key: &str| {
        record
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let full_name = text("full_name")
        .map(str::to_string)
        .or_else(|| {
            let joined = [text("first_name"), text("last_name")]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        })
        .or_else(|| text("name").map(str::to_string))
        .unwrap_or_default();
    Some(EmployeeSummary { id, full_name })
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct ListEmployeesArgs {
    /// Starting page number (default 1).
    pub page: Option<u32>,
    /// Free-text filter on name or email.
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct EmployeeIdArgs {
    pub employee_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CursorArgs {
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum RipplingCall {
    ListEmployees(ListEmployeesArgs),
    GetEmployee(EmployeeIdArgs),
    ListDepartments(CursorArgs),
    GetCompany(NoArgs),
}

#[async_trait]
impl ToolSet for Rippling {
    type Call = RipplingCall;

    fn name(&self) -> &'static str {
        "toolbridge-rippling"
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new::<ListEmployeesArgs>(
                "list_employees",
                Effect::Read,
                "List employees as {id, fullName}, following pagination cursors",
            ),
            ToolSpec::new::<EmployeeIdArgs>("get_employee", Effect::Read, "Get one employee record"),
            ToolSpec::new::<CursorArgs>("list_departments", Effect::Read, "List departments"),
            ToolSpec::new::<NoArgs>("get_company", Effect::Read, "Get company information"),
        ]
    }

    async fn invoke(&self, call: RipplingCall) -> Result<Envelope> {
        let result = match call {
            RipplingCall::ListEmployees(a) => self.list_employees(a).await,
            RipplingCall::GetEmployee(a) => self.get_employee(a).await.map(Envelope::ok),
            RipplingCall::ListDepartments(a) => self.list_departments(a).await.map(Envelope::ok),
            RipplingCall::GetCompany(_) => self.get_company().await.map(Envelope::ok),
        };
        match result {
            Err(e @ AdapterError::InvalidParams(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "Rippling request failed");
                Ok(Envelope::failure(classify_status_message(&e.to_string())))
            }
            ok => ok,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolbridge_core::tools::unknown_catalog_entries;

    #[test]
    fn catalog_matches_call_enum() {
        let r = Rippling::new(
            &RipplingConfig {
                api_token: "t".into(),
                base_url: DEFAULT_BASE_URL.into(),
                max_page_calls: DEFAULT_MAX_PAGE_CALLS,
            },
            None,
        )
        .expect("rippling");
        assert!(unknown_catalog_entries::<RipplingCall>(&r.tools()).is_empty());
    }

    #[test]
    fn zero_page_bound_is_a_config_error() {
        let err = Rippling::new(
            &RipplingConfig {
                api_token: "t".into(),
                base_url: DEFAULT_BASE_URL.into(),
                max_page_calls: 0,
            },
            None,
        )
        .err()
        .expect("config error");
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    fn full_name_fallbacks() {
        let s = summarize(&json!({"id": "1", "full_name": "Ada Lovelace", "first_name": "x"}))
            .expect("summary");
        assert_eq!(s.full_name, "Ada Lovelace");

        let s = summarize(&json!({"id": "2", "first_name": "Alan", "last_name": "Turing"}))
            .expect("summary");
        assert_eq!(s.full_name, "Alan Turing");

        let s = summarize(&json!({"id": 3, "first_name": "Grace"})).expect("summary");
        assert_eq!(s.id, "3");
        assert_eq!(s.full_name, "Grace");

        let s = summarize(&json!({"id": "4", "name": "Edsger"})).expect("summary");
        assert_eq!(s.full_name, "Edsger");

        assert!(summarize(&json!({"full_name": "No Id"})).is_none());
    }

    #[test]
    fn numeric_and_string_ids_dedup_together() {
        let records = [json!({"id": 3, "name": "first"}), json!({"id": "3", "name": "second"})];
        let unique = dedup_by_key(records.iter().filter_map(summarize).collect(), |e| {
            e.id.clone()
        });
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].full_name, "first");
    }

    #[test]
    fn worker_page_shapes() {
        let p = worker_page(json!({"results": [{"id": "a"}], "next_cursor": "c2"}));
        assert_eq!(p.items.len(), 1);
        assert_eq!(p.next_cursor.as_deref(), Some("c2"));

        let p = worker_page(json!({"results": [], "next_cursor": null}));
        assert!(p.items.is_empty());
        assert_eq!(p.next_cursor, None);

        let p = worker_page(json!([{"id": "a"}, {"id": "b"}]));
        assert_eq!(p.items.len(), 2);
        assert_eq!(p.next_cursor, None);
    }
}
