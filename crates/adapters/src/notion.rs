//! Notion adapter (integration token as bearer, pinned `Notion-Version`).

use async_trait::async_trait;
use clap::Args;
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use toolbridge_core::http::{Auth, RestClient, path_segment};
use toolbridge_core::tools::{Effect, ToolSet, ToolSpec};
use toolbridge_core::{AdapterError, Envelope, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, Clone, Args)]
pub struct NotionConfig {
    #[arg(long = "notion-api-key", env = "NOTION_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long = "notion-version", env = "NOTION_VERSION", default_value = DEFAULT_NOTION_VERSION)]
    pub notion_version: String,

    #[arg(long = "notion-base-url", env = "NOTION_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

pub struct Notion {
    client: RestClient,
}

impl Notion {
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the base URL is invalid.
    pub fn new(config: &NotionConfig, timeout: Option<Duration>) -> Result<Self> {
        let client = RestClient::builder(config.base_url.clone())
            .auth(Auth::Bearer(config.api_key.clone()))
            .header("Notion-Version", config.notion_version.clone())
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn search(&self, a: SearchArgs) -> Result<Value> {
        let body = SearchBody {
            query: a.query,
            filter: a.filter_object_type.map(|value| SearchFilter {
                property: "object",
                value,
            }),
            start_cursor: a.start_cursor,
            page_size: a.page_size,
        };
        self.client.post("/search").json(&body).send().await
    }

    async fn get_page(&self, a: PageIdArgs) -> Result<Value> {
        self.client
            .get(format!("/pages/{}", path_segment(&a.page_id)))
            .send()
            .await
    }

    async fn create_page(&self, a: CreatePageArgs) -> Result<Envelope> {
        let parent = match (a.parent_page_id, a.parent_database_id) {
            (Some(page_id), None) => json!({ "page_id": page_id }),
            (None, Some(database_id)) => json!({ "database_id": database_id }),
            _ => {
                return Err(AdapterError::InvalidParams(
                    "create_page requires exactly one of parent_page_id or parent_database_id"
                        .to_string(),
                ));
            }
        };

        let mut properties = match a.properties {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(AdapterError::InvalidParams(
                    "properties must be an object".to_string(),
                ));
            }
            None => Map::new(),
        };
        if let Some(title) = a.title {
            properties.insert(
                "title".to_string(),
                json!({ "title": [{ "text": { "content": title } }] }),
            );
        }
        if properties.is_empty() {
            return Err(AdapterError::InvalidParams(
                "create_page requires a title or properties".to_string(),
            ));
        }

        let mut body = json!({ "parent": parent, "properties": properties });
        if let Some(children) = a.children {
            body["children"] = Value::Array(children);
        }
        let page = self.client.post("/pages").json(&body).send().await?;
        let url = page.get("url").and_then(Value::as_str).map(str::to_string);
        let env = Envelope::ok(page);
        Ok(match url {
            Some(url) => env.with_message(format!("Created page {url}")),
            None => env,
        })
    }

    async fn update_page(&self, a: UpdatePageArgs) -> Result<Value> {
        if a.properties.is_none() && a.archived.is_none() {
            return Err(AdapterError::InvalidParams(
                "update_page requires properties or archived".to_string(),
            ));
        }
        let body = UpdatePageBody {
            properties: a.properties,
            archived: a.archived,
        };
        self.client
            .patch(format!("/pages/{}", path_segment(&a.page_id)))
            .json(&body)
            .send()
            .await
    }

    async fn get_block_children(&self, a: BlockChildrenArgs) -> Result<Value> {
        self.client
            .get(format!("/blocks/{}/children", path_segment(&a.block_id)))
            .query_opt("start_cursor", a.start_cursor)
            .query_opt("page_size", a.page_size)
            .send()
            .await
    }

    async fn append_block_children(&self, a: AppendBlockChildrenArgs) -> Result<Value> {
        if a.children.is_empty() {
            return Err(AdapterError::InvalidParams(
                "children must contain at least one block".to_string(),
            ));
        }
        self.client
            .patch(format!("/blocks/{}/children", path_segment(&a.block_id)))
            .json(&json!({ "children": a.children }))
            .send()
            .await
    }

    async fn query_database(&self, a: QueryDatabaseArgs) -> Result<Value> {
        let body = QueryDatabaseBody {
            filter: a.filter,
            sorts: a.sorts,
            start_cursor: a.start_cursor,
            page_size: a.page_size,
        };
        self.client
            .post(format!("/databases/{}/query", path_segment(&a.database_id)))
            .json(&body)
            .send()
            .await
    }

    async fn get_database(&self, a: DatabaseIdArgs) -> Result<Value> {
        self.client
            .get(format!("/databases/{}", path_segment(&a.database_id)))
            .send()
            .await
    }

    async fn list_users(&self, a: CursorArgs) -> Result<Value> {
        self.client
            .get("/users")
            .query_opt("start_cursor", a.start_cursor)
            .query_opt("page_size", a.page_size)
            .send()
            .await
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Page,
    Database,
}

#[derive(Debug, Serialize)]
struct SearchFilter {
    property: &'static str,
    value: ObjectType,
}

#[derive(Debug, Serialize)]
struct SearchBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<SearchFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
struct UpdatePageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    properties: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archived: Option<bool>,
}

#[derive(Debug, Serialize)]
struct QueryDatabaseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sorts: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct SearchArgs {
    pub query: Option<String>,
    /// Restrict results to pages or databases.
    pub filter_object_type: Option<ObjectType>,
    pub start_cursor: Option<String>,
    /// 1-100.
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct PageIdArgs {
    pub page_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CreatePageArgs {
    pub parent_page_id: Option<String>,
    pub parent_database_id: Option<String>,
    /// Shorthand for the `title` property.
    pub title: Option<String>,
    /// Page properties in Notion's property-value format.
    pub properties: Option<Value>,
    /// Block objects for the page body.
    pub children: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct UpdatePageArgs {
    pub page_id: String,
    pub properties: Option<Value>,
    /// `true` moves the page to the trash.
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct BlockChildrenArgs {
    /// Block or page id.
    pub block_id: String,
    pub start_cursor: Option<String>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct AppendBlockChildrenArgs {
    pub block_id: String,
    pub children: Vec<Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct QueryDatabaseArgs {
    pub database_id: String,
    pub filter: Option<Value>,
    pub sorts: Option<Vec<Value>>,
    pub start_cursor: Option<String>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct DatabaseIdArgs {
    pub database_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CursorArgs {
    pub start_cursor: Option<String>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum NotionCall {
    Search(SearchArgs),
    GetPage(PageIdArgs),
    CreatePage(CreatePageArgs),
    UpdatePage(UpdatePageArgs),
    GetBlockChildren(BlockChildrenArgs),
    AppendBlockChildren(AppendBlockChildrenArgs),
    QueryDatabase(QueryDatabaseArgs),
    GetDatabase(DatabaseIdArgs),
    ListUsers(CursorArgs),
}

#[async_trait]
impl ToolSet for Notion {
    type Call = NotionCall;

    fn name(&self) -> &'static str {
        "toolbridge-notion"
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new::<SearchArgs>(
                "search",
                Effect::Read,
                "Search pages and databases shared with the integration",
            ),
            ToolSpec::new::<PageIdArgs>("get_page", Effect::Read, "Get a page's properties"),
            ToolSpec::new::<CreatePageArgs>(
                "create_page",
                Effect::Create,
                "Create a page under a page or in a database",
            ),
            ToolSpec::new::<UpdatePageArgs>(
                "update_page",
                Effect::Update,
                "Update page properties or archive a page",
            ),
            ToolSpec::new::<BlockChildrenArgs>(
                "get_block_children",
                Effect::Read,
                "List the child blocks of a block or page",
            ),
            ToolSpec::new::<AppendBlockChildrenArgs>(
                "append_block_children",
                Effect::Create,
                "Append blocks to a block or page",
            ),
            ToolSpec::new::<QueryDatabaseArgs>(
                "query_database",
                Effect::Read,
                "Query a database with optional filter and sorts",
            ),
            ToolSpec::new::<DatabaseIdArgs>("get_database", Effect::Read, "Get a database schema"),
            ToolSpec::new::<CursorArgs>("list_users", Effect::Read, "List workspace users"),
        ]
    }

    async fn invoke(&self, call: NotionCall) -> Result<Envelope> {
        match call {
            NotionCall::Search(a) => self.search(a).await.map(Envelope::ok),
            NotionCall::GetPage(a) => self.get_page(a).await.map(Envelope::ok),
            NotionCall::CreatePage(a) => self.create_page(a).await,
            NotionCall::UpdatePage(a) => self.update_page(a).await.map(Envelope::ok),
            NotionCall::GetBlockChildren(a) => self.get_block_children(a).await.map(Envelope::ok),
            NotionCall::AppendBlockChildren(a) => {
                self.append_block_children(a).await.map(Envelope::ok)
            }
            NotionCall::QueryDatabase(a) => self.query_database(a).await.map(Envelope::ok),
            NotionCall::GetDatabase(a) => self.get_database(a).await.map(Envelope::ok),
            NotionCall::ListUsers(a) => self.list_users(a).await.map(Envelope::ok),
        }
    }
}
