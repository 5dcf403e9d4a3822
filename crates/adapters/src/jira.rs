//! Jira Cloud adapter (REST API v3, HTTP Basic with email + API token).

pub mod adf;

use self::adf::{DocumentInput, build_document};
use async_trait::async_trait;
use clap::Args;
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use toolbridge_core::http::{Auth, RestClient, path_segment};
use toolbridge_core::tools::{Effect, NoArgs, ToolSet, ToolSpec};
use toolbridge_core::{AdapterError, Envelope, Result};

#[derive(Debug, Clone, Args)]
pub struct JiraConfig {
    /// Site URL, e.g. `https://your-domain.atlassian.net`.
    #[arg(long = "jira-base-url", env = "JIRA_BASE_URL")]
    pub base_url: String,

    /// Atlassian account email used for Basic auth.
    #[arg(long = "jira-email", env = "JIRA_EMAIL")]
    pub email: String,

    #[arg(long = "jira-api-token", env = "JIRA_API_TOKEN", hide_env_values = true)]
    pub api_token: String,
}

pub struct Jira {
    client: RestClient,
}

impl Jira {
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the base URL is invalid.
    pub fn new(config: &JiraConfig, timeout: Option<Duration>) -> Result<Self> {
        let base = format!("{}/rest/api/3", config.base_url.trim_end_matches('/'));
        let client = RestClient::builder(base)
            .auth(Auth::Basic {
                username: config.email.clone(),
                password: config.api_token.clone(),
            })
            .header("Accept", "application/json")
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn search_issues(&self, a: SearchIssuesArgs) -> Result<Value> {
        self.client
            .get("/search")
            .query("jql", &a.jql)
            .query_opt("startAt", a.start_at)
            .query_opt("maxResults", a.max_results)
            .query_opt("fields", a.fields.map(|f| f.join(",")))
            .send()
            .await
    }

    async fn get_issue(&self, a: GetIssueArgs) -> Result<Value> {
        self.client
            .get(format!("/issue/{}", path_segment(&a.issue_key)))
            .query_opt("fields", a.fields.map(|f| f.join(",")))
            .query_opt("expand", a.expand)
            .send()
            .await
    }

    async fn create_issue(&self, a: CreateIssueArgs) -> Result<Envelope> {
        let fields = IssueFields {
            project: Some(KeyRef { key: a.project_key }),
            summary: Some(a.summary),
            issuetype: Some(NameRef {
                name: a.issue_type.unwrap_or_else(|| "Task".to_string()),
            }),
            description: a.description.map(build_document),
            priority: a.priority.map(|name| NameRef { name }),
            assignee: a.assignee_account_id.map(|account_id| AccountRef { account_id }),
            labels: a.labels,
        };
        let created = self
            .client
            .post("/issue")
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        let key = created
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or("issue")
            .to_string();
        Ok(Envelope::ok(created).with_message(format!("Created {key}")))
    }

    async fn update_issue(&self, a: UpdateIssueArgs) -> Result<Envelope> {
        let fields = IssueFields {
            summary: a.summary,
            description: a.description.map(build_document),
            priority: a.priority.map(|name| NameRef { name }),
            assignee: a.assignee_account_id.map(|account_id| AccountRef { account_id }),
            labels: a.labels,
            ..IssueFields::default()
        };
        if fields.is_empty() {
            return Err(AdapterError::InvalidParams(
                "update_issue requires at least one field to change".to_string(),
            ));
        }
        self.client
            .put(format!("/issue/{}", path_segment(&a.issue_key)))
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        Ok(
            Envelope::ok(json!({ "issueKey": a.issue_key, "updated": true }))
                .with_message(format!("Updated {}", a.issue_key)),
        )
    }

    async fn add_comment(&self, a: AddCommentArgs) -> Result<Value> {
        self.client
            .post(format!("/issue/{}/comment", path_segment(&a.issue_key)))
            .json(&json!({ "body": build_document(a.body) }))
            .send()
            .await
    }

    async fn get_transitions(&self, a: IssueKeyArgs) -> Result<Value> {
        self.client
            .get(format!("/issue/{}/transitions", path_segment(&a.issue_key)))
            .send()
            .await
    }

    async fn transition_issue(&self, a: TransitionIssueArgs) -> Result<Envelope> {
        let mut body = json!({ "transition": { "id": a.transition_id } });
        if let Some(comment) = a.comment {
            body["update"] = json!({
                "comment": [{ "add": { "body": build_document(comment) } }]
            });
        }
        self.client
            .post(format!("/issue/{}/transitions", path_segment(&a.issue_key)))
            .json(&body)
            .send()
            .await?;
        Ok(Envelope::ok(json!({
            "issueKey": a.issue_key,
            "transitionId": a.transition_id,
        }))
        .with_message(format!("Transitioned {}", a.issue_key)))
    }

    async fn list_projects(&self, a: ListProjectsArgs) -> Result<Value> {
        self.client
            .get("/project/search")
            .query_opt("query", a.query)
            .query_opt("startAt", a.start_at)
            .query_opt("maxResults", a.max_results)
            .send()
            .await
    }

    async fn get_myself(&self) -> Result<Value> {
        self.client.get("/myself").send().await
    }
}

#[derive(Debug, Default, Serialize)]
struct IssueFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<KeyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    issuetype: Option<NameRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<NameRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignee: Option<AccountRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<String>>,
}

impl IssueFields {
    fn is_empty(&self) -> bool {
        self.project.is_none()
            && self.summary.is_none()
            && self.issuetype.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.assignee.is_none()
            && self.labels.is_none()
    }
}

#[derive(Debug, Serialize)]
struct KeyRef {
    key: String,
}

#[derive(Debug, Serialize)]
struct NameRef {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountRef {
    account_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct SearchIssuesArgs {
    /// JQL query, e.g. `project = PROJ AND status = "In Progress"`.
    pub jql: String,
    pub max_results: Option<u32>,
    pub start_at: Option<u32>,
    /// Fields to return (default: Jira's navigable fields).
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetIssueArgs {
    /// Issue key or id, e.g. `PROJ-123`.
    pub issue_key: String,
    pub fields: Option<Vec<String>>,
    /// Comma-separated expansions, e.g. `renderedFields,changelog`.
    pub expand: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct IssueKeyArgs {
    pub issue_key: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CreateIssueArgs {
    pub project_key: String,
    pub summary: String,
    /// Issue type name (default `Task`).
    pub issue_type: Option<String>,
    /// Plain text or an ADF document.
    pub description: Option<DocumentInput>,
    /// Priority name, e.g. `High`.
    pub priority: Option<String>,
    pub assignee_account_id: Option<String>,
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct UpdateIssueArgs {
    pub issue_key: String,
    pub summary: Option<String>,
    pub description: Option<DocumentInput>,
    pub priority: Option<String>,
    pub assignee_account_id: Option<String>,
    pub labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct AddCommentArgs {
    pub issue_key: String,
    /// Plain text or an ADF document.
    pub body: DocumentInput,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct TransitionIssueArgs {
    pub issue_key: String,
    /// Id from `get_transitions`.
    pub transition_id: String,
    pub comment: Option<DocumentInput>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct ListProjectsArgs {
    /// Filter by project key or name.
    pub query: Option<String>,
    pub start_at: Option<u32>,
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum JiraCall {
    SearchIssues(SearchIssuesArgs),
    GetIssue(GetIssueArgs),
    CreateIssue(CreateIssueArgs),
    UpdateIssue(UpdateIssueArgs),
    AddComment(AddCommentArgs),
    GetTransitions(IssueKeyArgs),
    TransitionIssue(TransitionIssueArgs),
    ListProjects(ListProjectsArgs),
    GetMyself(NoArgs),
}

#[async_trait]
impl ToolSet for Jira {
    type Call = JiraCall;

    fn name(&self) -> &'static str {
        "toolbridge-jira"
    }

    fn instructions(&self) -> Option<String> {
        Some(
            "Jira Cloud tools. Descriptions and comments accept plain text or an Atlassian \
             Document Format object."
                .to_string(),
        )
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new::<SearchIssuesArgs>("search_issues", Effect::Read, "Search issues with JQL"),
            ToolSpec::new::<GetIssueArgs>("get_issue", Effect::Read, "Get an issue by key"),
            ToolSpec::new::<CreateIssueArgs>("create_issue", Effect::Create, "Create an issue"),
            ToolSpec::new::<UpdateIssueArgs>("update_issue", Effect::Update, "Update fields of an issue"),
            ToolSpec::new::<AddCommentArgs>("add_comment", Effect::Create, "Add a comment to an issue"),
            ToolSpec::new::<IssueKeyArgs>(
                "get_transitions",
                Effect::Read,
                "List the workflow transitions available for an issue",
            ),
            ToolSpec::new::<TransitionIssueArgs>(
                "transition_issue",
                Effect::Update,
                "Move an issue through its workflow",
            ),
            ToolSpec::new::<ListProjectsArgs>("list_projects", Effect::Read, "List projects"),
            ToolSpec::new::<NoArgs>("get_myself", Effect::Read, "Get the authenticated user"),
        ]
    }

    async fn invoke(&self, call: JiraCall) -> Result<Envelope> {
        match call {
            JiraCall::SearchIssues(a) => self.search_issues(a).await.map(Envelope::ok),
            JiraCall::GetIssue(a) => self.get_issue(a).await.map(Envelope::ok),
            JiraCall::CreateIssue(a) => self.create_issue(a).await,
            JiraCall::UpdateIssue(a) => self.update_issue(a).await,
            JiraCall::AddComment(a) => self.add_comment(a).await.map(Envelope::ok),
            JiraCall::GetTransitions(a) => self.get_transitions(a).await.map(Envelope::ok),
            JiraCall::TransitionIssue(a) => self.transition_issue(a).await,
            JiraCall::ListProjects(a) => self.list_projects(a).await.map(Envelope::ok),
            JiraCall::GetMyself(_) => self.get_myself().await.map(Envelope::ok),
        }
    }
}
