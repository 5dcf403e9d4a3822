//! Figma adapter (personal access token in `X-Figma-Token`).
//!
//! File renders can be slow, so this adapter defaults to a 30 second request timeout.

use async_trait::async_trait;
use clap::Args;
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use toolbridge_core::http::{Auth, RestClient, path_segment};
use toolbridge_core::tools::{Effect, NoArgs, ToolSet, ToolSpec};
use toolbridge_core::{AdapterError, Envelope, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.figma.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Args)]
pub struct FigmaConfig {
    #[arg(long = "figma-access-token", env = "FIGMA_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: String,

    #[arg(long = "figma-base-url", env = "FIGMA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

pub struct Figma {
    client: RestClient,
}

fn require_nodes(node_ids: &[String]) -> Result<String> {
    if node_ids.is_empty() {
        return Err(AdapterError::InvalidParams(
            "node_ids must contain at least one node id".to_string(),
        ));
    }
    Ok(node_ids.join(","))
}

impl Figma {
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the base URL is invalid.
    pub fn new(config: &FigmaConfig, timeout: Option<Duration>) -> Result<Self> {
        let client = RestClient::builder(config.base_url.clone())
            .auth(Auth::Header {
                name: "X-Figma-Token".to_string(),
                value: config.access_token.clone(),
            })
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn get_me(&self) -> Result<Value> {
        self.client.get("/me").send().await
    }

    async fn get_file(&self, a: GetFileArgs) -> Result<Value> {
        self.client
            .get(format!("/files/{}", path_segment(&a.file_key)))
            .query_opt("ids", a.node_ids.map(|ids| ids.join(",")))
            .query_opt("depth", a.depth)
            .query_opt("version", a.version)
            .send()
            .await
    }

    async fn get_file_nodes(&self, a: GetFileNodesArgs) -> Result<Value> {
        let ids = require_nodes(&a.node_ids)?;
        self.client
            .get(format!("/files/{}/nodes", path_segment(&a.file_key)))
            .query("ids", ids)
            .query_opt("depth", a.depth)
            .send()
            .await
    }

    async fn get_images(&self, a: GetImagesArgs) -> Result<Value> {
        let ids = require_nodes(&a.node_ids)?;
        if let Some(scale) = a.scale
            && !(0.01..=4.0).contains(&scale)
        {
            return Err(AdapterError::InvalidParams(format!(
                "scale must be between 0.01 and 4, got {scale}"
            )));
        }
        self.client
            .get(format!("/images/{}", path_segment(&a.file_key)))
            .query("ids", ids)
            .query_opt("format", a.format.map(ImageFormat::as_str))
            .query_opt("scale", a.scale)
            .send()
            .await
    }

    async fn get_comments(&self, a: FileKeyArgs) -> Result<Value> {
        self.client
            .get(format!("/files/{}/comments", path_segment(&a.file_key)))
            .send()
            .await
    }

    async fn post_comment(&self, a: PostCommentArgs) -> Result<Envelope> {
        let client_meta = match (a.node_id, a.x, a.y) {
            (Some(node_id), x, y) => Some(json!({
                "node_id": node_id,
                "node_offset": { "x": x.unwrap_or(0.0), "y": y.unwrap_or(0.0) },
            })),
            (None, Some(x), Some(y)) => Some(json!({ "x": x, "y": y })),
            (None, None, None) => None,
            _ => {
                return Err(AdapterError::InvalidParams(
                    "x and y must be given together when node_id is absent".to_string(),
                ));
            }
        };
        let body = CommentBody {
            message: a.message,
            client_meta,
        };
        let comment = self
            .client
            .post(format!("/files/{}/comments", path_segment(&a.file_key)))
            .json(&body)
            .send()
            .await?;
        Ok(Envelope::ok(comment).with_message("Comment posted"))
    }

    async fn get_file_versions(&self, a: FileKeyArgs) -> Result<Value> {
        self.client
            .get(format!("/files/{}/versions", path_segment(&a.file_key)))
            .send()
            .await
    }

    async fn get_team_projects(&self, a: TeamIdArgs) -> Result<Value> {
        self.client
            .get(format!("/teams/{}/projects", path_segment(&a.team_id)))
            .send()
            .await
    }

    async fn get_project_files(&self, a: ProjectIdArgs) -> Result<Value> {
        self.client
            .get(format!("/projects/{}/files", path_segment(&a.project_id)))
            .send()
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpg,
    Svg,
    Pdf,
}

impl ImageFormat {
    fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Serialize)]
struct CommentBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_meta: Option<Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct FileKeyArgs {
    /// Key from the file URL (`figma.com/file/<key>/...`).
    pub file_key: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetFileArgs {
    pub file_key: String,
    /// Only return these nodes and their ancestors.
    pub node_ids: Option<Vec<String>>,
    /// How deep into the document tree to traverse.
    pub depth: Option<u32>,
    /// Specific version id.
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetFileNodesArgs {
    pub file_key: String,
    pub node_ids: Vec<String>,
    pub depth: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetImagesArgs {
    pub file_key: String,
    pub node_ids: Vec<String>,
    /// `png` (default), `jpg`, `svg` or `pdf`.
    pub format: Option<ImageFormat>,
    /// 0.01 to 4.
    pub scale: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct PostCommentArgs {
    pub file_key: String,
    pub message: String,
    /// Pin the comment to a node.
    pub node_id: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct TeamIdArgs {
    pub team_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct ProjectIdArgs {
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum FigmaCall {
    GetMe(NoArgs),
    GetFile(GetFileArgs),
    GetFileNodes(GetFileNodesArgs),
    GetImages(GetImagesArgs),
    GetComments(FileKeyArgs),
    PostComment(PostCommentArgs),
    GetFileVersions(FileKeyArgs),
    GetTeamProjects(TeamIdArgs),
    GetProjectFiles(ProjectIdArgs),
}

#[async_trait]
impl ToolSet for Figma {
    type Call = FigmaCall;

    fn name(&self) -> &'static str {
        "toolbridge-figma"
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new::<NoArgs>("get_me", Effect::Read, "Get the authenticated user"),
            ToolSpec::new::<GetFileArgs>("get_file", Effect::Read, "Get a file's document tree"),
            ToolSpec::new::<GetFileNodesArgs>("get_file_nodes", Effect::Read, "Get specific nodes of a file"),
            ToolSpec::new::<GetImagesArgs>("get_images", Effect::Read, "Render nodes to image URLs"),
            ToolSpec::new::<FileKeyArgs>("get_comments", Effect::Read, "List comments on a file"),
            ToolSpec::new::<PostCommentArgs>("post_comment", Effect::Create, "Comment on a file"),
            ToolSpec::new::<FileKeyArgs>("get_file_versions", Effect::Read, "List a file's version history"),
            ToolSpec::new::<TeamIdArgs>("get_team_projects", Effect::Read, "List a team's projects"),
            ToolSpec::new::<ProjectIdArgs>("get_project_files", Effect::Read, "List files in a project"),
        ]
    }

    async fn invoke(&self, call: FigmaCall) -> Result<Envelope> {
        match call {
            FigmaCall::GetMe(_) => self.get_me().await.map(Envelope::ok),
            FigmaCall::GetFile(a) => self.get_file(a).await.map(Envelope::ok),
            FigmaCall::GetFileNodes(a) => self.get_file_nodes(a).await.map(Envelope::ok),
            FigmaCall::GetImages(a) => self.get_images(a).await.map(Envelope::ok),
            FigmaCall::GetComments(a) => self.get_comments(a).await.map(Envelope::ok),
            FigmaCall::PostComment(a) => self.post_comment(a).await,
            FigmaCall::GetFileVersions(a) => self.get_file_versions(a).await.map(Envelope::ok),
            FigmaCall::GetTeamProjects(a) => self.get_team_projects(a).await.map(Envelope::ok),
            FigmaCall::GetProjectFiles(a) => self.get_project_files(a).await.map(Envelope::ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::{Path, RawQuery};
    use axum::http::HeaderMap;
    use axum::routing::get;
    use rmcp::model::JsonObject;
    use toolbridge_core::tools::{parse_call, unknown_catalog_entries};
    use toolbridge_test_support::MockUpstream;

    fn figma(base_url: &str) -> Figma {
        Figma::new(
            &FigmaConfig {
                access_token: "figd_x".into(),
                base_url: base_url.into(),
            },
            Some(DEFAULT_TIMEOUT),
        )
        .expect("figma")
    }

    #[test]
    fn catalog_matches_call_enum() {
        assert!(unknown_catalog_entries::<FigmaCall>(&figma(DEFAULT_BASE_URL).tools()).is_empty());
    }

    #[test]
    fn unknown_image_format_is_invalid_params() {
        let args: JsonObject = serde_json::from_value(json!({
            "file_key": "k",
            "node_ids": ["1:2"],
            "format": "gif"
        }))
        .expect("object");
        let err = parse_call::<FigmaCall>("get_images", Some(args)).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn out_of_range_scale_and_empty_nodes_are_rejected() {
        let f = figma("http://127.0.0.1:9");
        let err = f
            .invoke(FigmaCall::GetImages(GetImagesArgs {
                file_key: "k".into(),
                node_ids: vec!["1:2".into()],
                format: None,
                scale: Some(8.0),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams(_)));

        let err = f
            .invoke(FigmaCall::GetFileNodes(GetFileNodesArgs {
                file_key: "k".into(),
                node_ids: vec![],
                depth: None,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn get_images_sends_token_header_and_joined_ids() {
        let app = Router::new().route(
            "/images/{key}",
            get(
                |Path(key): Path<String>, RawQuery(q): RawQuery, headers: HeaderMap| async move {
                    axum::Json(json!({
                        "key": key,
                        "query": q,
                        "token": headers.get("x-figma-token").and_then(|v| v.to_str().ok()),
                    }))
                },
            ),
        );
        let upstream = MockUpstream::start(app).await.expect("mock upstream");
        let env = figma(&upstream.base_url())
            .invoke(FigmaCall::GetImages(GetImagesArgs {
                file_key: "abc".into(),
                node_ids: vec!["1:2".into(), "3:4".into()],
                format: Some(ImageFormat::Svg),
                scale: None,
            }))
            .await
            .expect("images");
        let data = env.data.expect("data");
        assert_eq!(data["key"], "abc");
        assert_eq!(data["token"], "figd_x");
        assert_eq!(data["query"], "ids=1%3A2%2C3%3A4&format=svg");
    }
}
