//! ClickUp adapter (API v2, personal token in the `Authorization` header).

use async_trait::async_trait;
use clap::Args;
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use toolbridge_core::http::{Auth, RestClient, path_segment};
use toolbridge_core::tools::{Effect, NoArgs, ToolSet, ToolSpec};
use toolbridge_core::{AdapterError, Envelope, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.clickup.com/api/v2";

#[derive(Debug, Clone, Args)]
pub struct ClickUpConfig {
    #[arg(long = "clickup-api-token", env = "CLICKUP_API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    #[arg(long = "clickup-base-url", env = "CLICKUP_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

pub struct ClickUp {
    client: RestClient,
}

/// 1 = urgent, 2 = high, 3 = normal, 4 = low.
fn check_priority(priority: Option<u8>) -> Result<()> {
    match priority {
        Some(p) if !(1..=4).contains(&p) => Err(AdapterError::InvalidParams(format!(
            "priority must be between 1 (urgent) and 4 (low), got {p}"
        ))),
        _ => Ok(()),
    }
}

impl ClickUp {
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the base URL is invalid.
    pub fn new(config: &ClickUpConfig, timeout: Option<Duration>) -> Result<Self> {
        let client = RestClient::builder(config.base_url.clone())
            .auth(Auth::Header {
                name: "Authorization".to_string(),
                value: config.api_token.clone(),
            })
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn get_workspaces(&self) -> Result<Value> {
        self.client.get("/team").send().await
    }

    async fn get_spaces(&self, a: GetSpacesArgs) -> Result<Value> {
        self.client
            .get(format!("/team/{}/space", path_segment(&a.team_id)))
            .query_opt("archived", a.archived)
            .send()
            .await
    }

    async fn get_folders(&self, a: GetFoldersArgs) -> Result<Value> {
        self.client
            .get(format!("/space/{}/folder", path_segment(&a.space_id)))
            .query_opt("archived", a.archived)
            .send()
            .await
    }

    async fn get_lists(&self, a: GetListsArgs) -> Result<Value> {
        let path = match (a.folder_id, a.space_id) {
            (Some(folder), None) => format!("/folder/{}/list", path_segment(&folder)),
            (None, Some(space)) => format!("/space/{}/list", path_segment(&space)),
            _ => {
                return Err(AdapterError::InvalidParams(
                    "get_lists requires exactly one of folder_id or space_id".to_string(),
                ));
            }
        };
        self.client
            .get(path)
            .query_opt("archived", a.archived)
            .send()
            .await
    }

    async fn get_tasks(&self, a: GetTasksArgs) -> Result<Value> {
        let mut req = self
            .client
            .get(format!("/list/{}/task", path_segment(&a.list_id)))
            .query_opt("page", a.page)
            .query_opt("archived", a.archived)
            .query_opt("include_closed", a.include_closed)
            .query_opt("subtasks", a.subtasks);
        for status in a.statuses.unwrap_or_default() {
            req = req.query("statuses[]", status);
        }
        for assignee in a.assignees.unwrap_or_default() {
            req = req.query("assignees[]", assignee);
        }
        req.send().await
    }

    async fn get_task(&self, a: TaskIdArgs) -> Result<Value> {
        self.client
            .get(format!("/task/{}", path_segment(&a.task_id)))
            .send()
            .await
    }

    async fn create_task(&self, a: CreateTaskArgs) -> Result<Envelope> {
        check_priority(a.priority)?;
        let body = TaskBody {
            name: Some(a.name),
            description: a.description,
            markdown_description: a.markdown_description,
            assignees: a.assignees,
            tags: a.tags,
            status: a.status,
            priority: a.priority,
            due_date: a.due_date,
            start_date: a.start_date,
            parent: a.parent,
        };
        let task = self
            .client
            .post(format!("/list/{}/task", path_segment(&a.list_id)))
            .json(&body)
            .send()
            .await?;
        let id = task.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok(Envelope::ok(task).with_message(format!("Created task {id}")))
    }

    async fn update_task(&self, a: UpdateTaskArgs) -> Result<Value> {
        check_priority(a.priority)?;
        let body = TaskBody {
            name: a.name,
            description: a.description,
            markdown_description: a.markdown_description,
            status: a.status,
            priority: a.priority,
            due_date: a.due_date,
            start_date: a.start_date,
            ..TaskBody::default()
        };
        self.client
            .put(format!("/task/{}", path_segment(&a.task_id)))
            .json(&body)
            .send()
            .await
    }

    async fn delete_task(&self, a: TaskIdArgs) -> Result<Envelope> {
        self.client
            .delete(format!("/task/{}", path_segment(&a.task_id)))
            .send()
            .await?;
        Ok(Envelope::ok(json!({ "taskId": a.task_id, "deleted": true }))
            .with_message(format!("Deleted task {}", a.task_id)))
    }

    async fn add_comment(&self, a: AddCommentArgs) -> Result<Value> {
        self.client
            .post(format!("/task/{}/comment", path_segment(&a.task_id)))
            .json(&json!({
                "comment_text": a.comment_text,
                "notify_all": a.notify_all.unwrap_or(false),
            }))
            .send()
            .await
    }

    async fn get_comments(&self, a: TaskIdArgs) -> Result<Value> {
        self.client
            .get(format!("/task/{}/comment", path_segment(&a.task_id)))
            .send()
            .await
    }
}

/// Task create/update payload. Dates are Unix milliseconds, forwarded as given.
#[derive(Debug, Default, Serialize)]
struct TaskBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    markdown_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignees: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetSpacesArgs {
    /// Workspace (team) id.
    pub team_id: String,
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetFoldersArgs {
    pub space_id: String,
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetListsArgs {
    /// Lists inside a folder.
    pub folder_id: Option<String>,
    /// Folderless lists of a space.
    pub space_id: Option<String>,
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetTasksArgs {
    pub list_id: String,
    /// Zero-based page number.
    pub page: Option<u32>,
    pub archived: Option<bool>,
    pub include_closed: Option<bool>,
    pub subtasks: Option<bool>,
    pub statuses: Option<Vec<String>>,
    /// User ids.
    pub assignees: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct TaskIdArgs {
    pub task_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CreateTaskArgs {
    pub list_id: String,
    pub name: String,
    pub description: Option<String>,
    pub markdown_description: Option<String>,
    /// User ids.
    pub assignees: Option<Vec<i64>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
    /// 1 = urgent, 2 = high, 3 = normal, 4 = low.
    pub priority: Option<u8>,
    /// Unix time in milliseconds.
    pub due_date: Option<i64>,
    /// Unix time in milliseconds.
    pub start_date: Option<i64>,
    /// Parent task id, to create a subtask.
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct UpdateTaskArgs {
    pub task_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub markdown_description: Option<String>,
    pub status: Option<String>,
    /// 1 = urgent, 2 = high, 3 = normal, 4 = low.
    pub priority: Option<u8>,
    /// Unix time in milliseconds.
    pub due_date: Option<i64>,
    /// Unix time in milliseconds.
    pub start_date: Option<i64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct AddCommentArgs {
    pub task_id: String,
    pub comment_text: String,
    pub notify_all: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum ClickUpCall {
    GetWorkspaces(NoArgs),
    GetSpaces(GetSpacesArgs),
    GetFolders(GetFoldersArgs),
    GetLists(GetListsArgs),
    GetTasks(GetTasksArgs),
    GetTask(TaskIdArgs),
    CreateTask(CreateTaskArgs),
    UpdateTask(UpdateTaskArgs),
    DeleteTask(TaskIdArgs),
    AddComment(AddCommentArgs),
    GetComments(TaskIdArgs),
}

#[async_trait]
impl ToolSet for ClickUp {
    type Call = ClickUpCall;

    fn name(&self) -> &'static str {
        "toolbridge-clickup"
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new::<NoArgs>("get_workspaces", Effect::Read, "List workspaces (teams)"),
            ToolSpec::new::<GetSpacesArgs>("get_spaces", Effect::Read, "List spaces in a workspace"),
            ToolSpec::new::<GetFoldersArgs>("get_folders", Effect::Read, "List folders in a space"),
            ToolSpec::new::<GetListsArgs>(
                "get_lists",
                Effect::Read,
                "List lists in a folder, or the folderless lists of a space",
            ),
            ToolSpec::new::<GetTasksArgs>("get_tasks", Effect::Read, "List tasks in a list"),
            ToolSpec::new::<TaskIdArgs>("get_task", Effect::Read, "Get a task"),
            ToolSpec::new::<CreateTaskArgs>("create_task", Effect::Create, "Create a task in a list"),
            ToolSpec::new::<UpdateTaskArgs>("update_task", Effect::Update, "Update a task"),
            ToolSpec::new::<TaskIdArgs>("delete_task", Effect::Delete, "Delete a task"),
            ToolSpec::new::<AddCommentArgs>("add_comment", Effect::Create, "Comment on a task"),
            ToolSpec::new::<TaskIdArgs>("get_comments", Effect::Read, "List comments on a task"),
        ]
    }

    async fn invoke(&self, call: ClickUpCall) -> Result<Envelope> {
        match call {
            ClickUpCall::GetWorkspaces(_) => self.get_workspaces().await.map(Envelope::ok),
            ClickUpCall::GetSpaces(a) => self.get_spaces(a).await.map(Envelope::ok),
            ClickUpCall::GetFolders(a) => self.get_folders(a).await.map(Envelope::ok),
            ClickUpCall::GetLists(a) => self.get_lists(a).await.map(Envelope::ok),
            ClickUpCall::GetTasks(a) => self.get_tasks(a).await.map(Envelope::ok),
            ClickUpCall::GetTask(a) => self.get_task(a).await.map(Envelope::ok),
            ClickUpCall::CreateTask(a) => self.create_task(a).await,
            ClickUpCall::UpdateTask(a) => self.update_task(a).await.map(Envelope::ok),
            ClickUpCall::DeleteTask(a) => self.delete_task(a).await,
            ClickUpCall::AddComment(a) => self.add_comment(a).await.map(Envelope::ok),
            ClickUpCall::GetComments(a) => self.get_comments(a).await.map(Envelope::ok),
        }
    }
}
