use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use toolbridge_adapters::jira::adf::DocumentInput;
use toolbridge_adapters::jira::{AddCommentArgs, CreateIssueArgs, GetIssueArgs, Jira, JiraCall, JiraConfig};
use toolbridge_core::tools::ToolSet;
use toolbridge_test_support::MockUpstream;

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn record(&self, headers: &HeaderMap, body: Value) {
        self.bodies.lock().expect("lock").push(body);
        self.auth.lock().expect("lock").push(
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        );
    }
}

async fn start() -> anyhow::Result<(MockUpstream, Jira, Recorded)> {
    let recorded = Recorded::default();
    let app = Router::new()
        .route(
            "/rest/api/3/issue",
            post(
                |State(r): State<Recorded>, headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
                    r.record(&headers, body);
                    (
                        StatusCode::CREATED,
                        axum::Json(json!({"id": "10001", "key": "PROJ-7", "self": "https://x/rest/api/3/issue/10001"})),
                    )
                },
            ),
        )
        .route(
            "/rest/api/3/issue/{key}/comment",
            post(
                |State(r): State<Recorded>,
                 Path(key): Path<String>,
                 headers: HeaderMap,
                 axum::Json(body): axum::Json<Value>| async move {
                    r.record(&headers, body);
                    axum::Json(json!({"id": "c1", "issue": key}))
                },
            ),
        )
        .route(
            "/rest/api/3/issue/{key}",
            get(|Path(key): Path<String>| async move {
                (
                    StatusCode::NOT_FOUND,
                    axum::Json(json!({
                        "errorMessages": [format!("Issue {key} does not exist or you do not have permission to see it.")],
                        "errors": {}
                    })),
                )
            }),
        )
        .with_state(recorded.clone());
    let upstream = MockUpstream::start(app).await?;
    let jira = Jira::new(
        &JiraConfig {
            base_url: upstream.base_url(),
            email: "me@example.com".into(),
            api_token: "tok".into(),
        },
        None,
    )?;
    Ok((upstream, jira, recorded))
}

#[tokio::test]
async fn create_issue_wraps_plain_description_in_adf() -> anyhow::Result<()> {
    let (_upstream, jira, recorded) = start().await?;

    let env = jira
        .invoke(JiraCall::CreateIssue(CreateIssueArgs {
            project_key: "PROJ".into(),
            summary: "Login button misaligned".into(),
            issue_type: None,
            description: Some(DocumentInput::Text("hello".into())),
            priority: Some("High".into()),
            assignee_account_id: None,
            labels: None,
        }))
        .await?;

    assert!(env.success);
    assert_eq!(env.message.as_deref(), Some("Created PROJ-7"));
    assert_eq!(
        recorded.auth.lock().expect("lock")[0],
        "Basic bWVAZXhhbXBsZS5jb206dG9r"
    );
    let body = recorded.bodies.lock().expect("lock")[0].clone();
    assert_eq!(
        body,
        json!({
            "fields": {
                "project": {"key": "PROJ"},
                "summary": "Login button misaligned",
                "issuetype": {"name": "Task"},
                "description": {
                    "type": "doc",
                    "version": 1,
                    "content": [{"type": "paragraph", "content": [{"type": "text", "text": "hello"}]}]
                },
                "priority": {"name": "High"}
            }
        })
    );
    Ok(())
}

#[tokio::test]
async fn prebuilt_comment_document_is_sent_unchanged() -> anyhow::Result<()> {
    let (_upstream, jira, recorded) = start().await?;
    let doc = json!({
        "type": "doc",
        "version": 1,
        "content": [{"type": "codeBlock", "attrs": {"language": "rust"}, "content": [{"type": "text", "text": "fn main() {}"}]}]
    });

    let env = jira
        .invoke(JiraCall::AddComment(AddCommentArgs {
            issue_key: "PROJ-7".into(),
            body: DocumentInput::Document(doc.clone()),
        }))
        .await?;

    assert_eq!(env.data.as_ref().map(|d| d["issue"].clone()), Some(json!("PROJ-7")));
    assert_eq!(recorded.bodies.lock().expect("lock")[0], json!({ "body": doc }));
    Ok(())
}

#[tokio::test]
async fn jira_error_messages_are_surfaced() -> anyhow::Result<()> {
    let (_upstream, jira, _recorded) = start().await?;

    let err = jira
        .invoke(JiraCall::GetIssue(GetIssueArgs {
            issue_key: "PROJ-404".into(),
            fields: None,
            expand: None,
        }))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(
        err.to_string(),
        "API returned 404 Not Found: Issue PROJ-404 does not exist or you do not have permission to see it."
    );
    Ok(())
}
