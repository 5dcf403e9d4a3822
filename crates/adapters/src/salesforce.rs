//! Salesforce adapter.
//!
//! Authentication is explicit: the session starts authenticated only if an access token and
//! instance URL are configured; otherwise the `login` tool performs an OAuth password grant.
//! Every other tool needs an authenticated session and talks to
//! `<instance_url>/services/data/<api_version>`.

use async_trait::async_trait;
use clap::Args;
use parking_lot::RwLock;
use reqwest::Method;
use rmcp::schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use toolbridge_core::config::non_empty;
use toolbridge_core::http::{ApiRequest, RestClient, path_segment};
use toolbridge_core::tools::{Effect, NoArgs, ToolSet, ToolSpec};
use toolbridge_core::{AdapterError, Envelope, Result};
use tracing::{info, warn};

pub const DEFAULT_LOGIN_URL: &str = "https://login.salesforce.com";
pub const DEFAULT_API_VERSION: &str = "v59.0";

#[derive(Debug, Clone, Args)]
pub struct SalesforceConfig {
    /// Use `https://test.salesforce.com` for sandboxes.
    #[arg(long = "salesforce-login-url", env = "SALESFORCE_LOGIN_URL", default_value = DEFAULT_LOGIN_URL)]
    pub login_url: String,

    #[arg(long = "salesforce-api-version", env = "SALESFORCE_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Connected app consumer key.
    #[arg(long = "salesforce-client-id", env = "SALESFORCE_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long = "salesforce-client-secret", env = "SALESFORCE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[arg(long = "salesforce-username", env = "SALESFORCE_USERNAME")]
    pub username: Option<String>,

    #[arg(long = "salesforce-password", env = "SALESFORCE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long = "salesforce-security-token", env = "SALESFORCE_SECURITY_TOKEN", hide_env_values = true)]
    pub security_token: Option<String>,

    /// Pre-issued session token; together with the instance URL skips `login`.
    #[arg(long = "salesforce-access-token", env = "SALESFORCE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long = "salesforce-instance-url", env = "SALESFORCE_INSTANCE_URL")]
    pub instance_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalesforceSession {
    pub is_authenticated: bool,
    pub instance_url: String,
    pub access_token: String,
}

impl SalesforceSession {
    fn from_config(config: &SalesforceConfig) -> Self {
        match (
            non_empty(config.instance_url.clone()),
            non_empty(config.access_token.clone()),
        ) {
            (Some(instance_url), Some(access_token)) => Self {
                is_authenticated: true,
                instance_url: instance_url.trim_end_matches('/').to_string(),
                access_token,
            },
            _ => Self::default(),
        }
    }
}

pub struct Salesforce {
    client: RestClient,
    config: SalesforceConfig,
    session: RwLock<SalesforceSession>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

impl Salesforce {
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the login URL is invalid.
    pub fn new(config: SalesforceConfig, timeout: Option<Duration>) -> Result<Self> {
        let client = RestClient::builder(config.login_url.clone())
            .header("Accept", "application/json")
            .timeout(timeout)
            .build()?;
        let session = SalesforceSession::from_config(&config);
        info!(
            authenticated = session.is_authenticated,
            "Salesforce adapter configured"
        );
        Ok(Self {
            client,
            config,
            session: RwLock::new(session),
        })
    }

    #[must_use]
    pub fn session(&self) -> SalesforceSession {
        self.session.read().clone()
    }

    async fn login(&self, a: LoginArgs) -> Result<Envelope> {
        let (Some(client_id), Some(client_secret)) = (
            non_empty(self.config.client_id.clone()),
            non_empty(self.config.client_secret.clone()),
        ) else {
            return Err(AdapterError::Authentication(
                "SALESFORCE_CLIENT_ID and SALESFORCE_CLIENT_SECRET must be configured to log in"
                    .to_string(),
            ));
        };
        let (Some(username), Some(password)) = (
            non_empty(a.username).or_else(|| non_empty(self.config.username.clone())),
            non_empty(a.password).or_else(|| non_empty(self.config.password.clone())),
        ) else {
            return Err(AdapterError::InvalidParams(
                "username and password are required (as arguments or SALESFORCE_USERNAME / \
                 SALESFORCE_PASSWORD)"
                    .to_string(),
            ));
        };
        let security_token = non_empty(a.security_token)
            .or_else(|| non_empty(self.config.security_token.clone()))
            .unwrap_or_default();

        let response = self
            .client
            .post("/services/oauth2/token")
            .form(vec![
                ("grant_type".to_string(), "password".to_string()),
                ("client_id".to_string(), client_id),
                ("client_secret".to_string(), client_secret),
                ("username".to_string(), username.clone()),
                ("password".to_string(), format!("{password}{security_token}")),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Authentication(e.to_string()))?;
        let token: TokenResponse = serde_json::from_value(response).map_err(|e| {
            AdapterError::Authentication(format!("unexpected token response: {e}"))
        })?;

        let instance_url = token.instance_url.trim_end_matches('/').to_string();
        *self.session.write() = SalesforceSession {
            is_authenticated: true,
            instance_url: instance_url.clone(),
            access_token: token.access_token,
        };
        info!(%instance_url, "logged in to Salesforce");
        Ok(
            Envelope::ok(json!({ "authenticated": true, "instanceUrl": instance_url }))
                .with_message(format!("Logged in as {username}")),
        )
    }

    /// Send one request to the REST data API of the current session.
    ///
    /// The session lock is released before the request is sent. A 401 only ends the session if
    /// it still holds the token that was rejected.
    async fn data(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(ApiRequest<'_>) -> ApiRequest<'_>,
    ) -> Result<Value> {
        let (instance_url, token) = {
            let session = self.session.read();
            if !session.is_authenticated {
                return Err(AdapterError::Authentication(
                    "not logged in to Salesforce; call the login tool first".to_string(),
                ));
            }
            (session.instance_url.clone(), session.access_token.clone())
        };
        let request = self
            .client
            .request_at(
                instance_url,
                method,
                format!("/services/data/{}{path}", self.config.api_version),
            )
            .bearer(token.clone());
        let result = build(request).send().await;
        if let Err(AdapterError::Upstream { status: 401, .. }) = &result {
            self.expire_session(&token);
        }
        result
    }

    fn expire_session(&self, stale: &str) {
        let mut session = self.session.write();
        if session.is_authenticated && session.access_token == stale {
            warn!("Salesforce rejected the session token; login required");
            session.is_authenticated = false;
        }
    }

    async fn query(&self, a: QueryArgs) -> Result<Value> {
        self.data(Method::GET, "/query", |r| r.query("q", &a.soql)).await
    }

    async fn search(&self, a: SearchArgs) -> Result<Value> {
        self.data(Method::GET, "/search", |r| r.query("q", &a.sosl)).await
    }

    async fn list_objects(&self) -> Result<Value> {
        self.data(Method::GET, "/sobjects", |r| r).await
    }

    async fn describe_object(&self, a: ObjectTypeArgs) -> Result<Value> {
        let path = format!("/sobjects/{}/describe", path_segment(&a.object_type));
        self.data(Method::GET, &path, |r| r).await
    }

    async fn get_record(&self, a: GetRecordArgs) -> Result<Value> {
        let path = format!(
            "/sobjects/{}/{}",
            path_segment(&a.object_type),
            path_segment(&a.record_id)
        );
        let fields = a.fields.map(|f| f.join(","));
        self.data(Method::GET, &path, |r| r.query_opt("fields", fields))
            .await
    }

    async fn create_record(&self, a: CreateRecordArgs) -> Result<Envelope> {
        let path = format!("/sobjects/{}", path_segment(&a.object_type));
        let created = self.data(Method::POST, &path, |r| r.json(&a.fields)).await?;
        let id = created.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok(Envelope::ok(created).with_message(format!("Created {} {id}", a.object_type)))
    }

    async fn update_record(&self, a: UpdateRecordArgs) -> Result<Envelope> {
        let path = format!(
            "/sobjects/{}/{}",
            path_segment(&a.object_type),
            path_segment(&a.record_id)
        );
        self.data(Method::PATCH, &path, |r| r.json(&a.fields)).await?;
        Ok(Envelope::ok(json!({ "id": a.record_id, "updated": true }))
            .with_message(format!("Updated {} {}", a.object_type, a.record_id)))
    }

    async fn delete_record(&self, a: RecordArgs) -> Result<Envelope> {
        let path = format!(
            "/sobjects/{}/{}",
            path_segment(&a.object_type),
            path_segment(&a.record_id)
        );
        self.data(Method::DELETE, &path, |r| r).await?;
        Ok(Envelope::ok(json!({ "id": a.record_id, "deleted": true }))
            .with_message(format!("Deleted {} {}", a.object_type, a.record_id)))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct LoginArgs {
    /// Defaults to `SALESFORCE_USERNAME`.
    pub username: Option<String>,
    /// Defaults to `SALESFORCE_PASSWORD`.
    pub password: Option<String>,
    /// Appended to the password. Defaults to `SALESFORCE_SECURITY_TOKEN`.
    pub security_token: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct QueryArgs {
    /// SOQL, e.g. `SELECT Id, Name FROM Account LIMIT 10`.
    pub soql: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct SearchArgs {
    /// SOSL, e.g. `FIND {Acme} IN NAME FIELDS RETURNING Account(Id, Name)`.
    pub sosl: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct ObjectTypeArgs {
    /// sObject API name, e.g. `Account` or `Invoice__c`.
    pub object_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct GetRecordArgs {
    pub object_type: String,
    pub record_id: String,
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct RecordArgs {
    pub object_type: String,
    pub record_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CreateRecordArgs {
    pub object_type: String,
    /// Field values keyed by API name.
    pub fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct UpdateRecordArgs {
    pub object_type: String,
    pub record_id: String,
    pub fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum SalesforceCall {
    Login(LoginArgs),
    Query(QueryArgs),
    Search(SearchArgs),
    ListObjects(NoArgs),
    DescribeObject(ObjectTypeArgs),
    GetRecord(GetRecordArgs),
    CreateRecord(CreateRecordArgs),
    UpdateRecord(UpdateRecordArgs),
    DeleteRecord(RecordArgs),
}

#[async_trait]
impl ToolSet for Salesforce {
    type Call = SalesforceCall;

    fn name(&self) -> &'static str {
        "toolbridge-salesforce"
    }

    fn instructions(&self) -> Option<String> {
        Some(
            "Salesforce tools. Call `login` first unless the server was started with an access \
             token and instance URL."
                .to_string(),
        )
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new::<LoginArgs>(
                "login",
                Effect::Replace,
                "Log in with username/password (OAuth password grant)",
            ),
            ToolSpec::new::<QueryArgs>("query", Effect::Read, "Run a SOQL query"),
            ToolSpec::new::<SearchArgs>("search", Effect::Read, "Run a SOSL search"),
            ToolSpec::new::<NoArgs>("list_objects", Effect::Read, "List available sObject types"),
            ToolSpec::new::<ObjectTypeArgs>("describe_object", Effect::Read, "Describe an sObject's fields"),
            ToolSpec::new::<GetRecordArgs>("get_record", Effect::Read, "Get a record by id"),
            ToolSpec::new::<CreateRecordArgs>("create_record", Effect::Create, "Create a record"),
            ToolSpec::new::<UpdateRecordArgs>("update_record", Effect::Update, "Update fields of a record"),
            ToolSpec::new::<RecordArgs>("delete_record", Effect::Delete, "Delete a record"),
        ]
    }

    async fn invoke(&self, call: SalesforceCall) -> Result<Envelope> {
        match call {
            SalesforceCall::Login(a) => self.login(a).await,
            SalesforceCall::Query(a) => self.query(a).await.map(Envelope::ok),
            SalesforceCall::Search(a) => self.search(a).await.map(Envelope::ok),
            SalesforceCall::ListObjects(_) => self.list_objects().await.map(Envelope::ok),
            SalesforceCall::DescribeObject(a) => self.describe_object(a).await.map(Envelope::ok),
            SalesforceCall::GetRecord(a) => self.get_record(a).await.map(Envelope::ok),
            SalesforceCall::CreateRecord(a) => self.create_record(a).await,
            SalesforceCall::UpdateRecord(a) => self.update_record(a).await,
            SalesforceCall::DeleteRecord(a) => self.delete_record(a).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolbridge_core::tools::unknown_catalog_entries;

    fn config() -> SalesforceConfig {
        SalesforceConfig {
            login_url: DEFAULT_LOGIN_URL.into(),
            api_version: DEFAULT_API_VERSION.into(),
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            security_token: None,
            access_token: None,
            instance_url: None,
        }
    }

    #[test]
    fn catalog_matches_call_enum() {
        let sf = Salesforce::new(config(), None).expect("salesforce");
        assert!(unknown_catalog_entries::<SalesforceCall>(&sf.tools()).is_empty());
    }

    #[test]
    fn initial_session_comes_from_config() {
        assert!(!Salesforce::new(config(), None).expect("sf").session().is_authenticated);

        let mut cfg = config();
        cfg.access_token = Some("00Dxx!token".into());
        cfg.instance_url = Some("https://acme.my.salesforce.com/".into());
        let session = Salesforce::new(cfg.clone(), None).expect("sf").session();
        assert!(session.is_authenticated);
        assert_eq!(session.instance_url, "https://acme.my.salesforce.com");

        // One without the other is not enough.
        cfg.access_token = Some("  ".into());
        assert!(!Salesforce::new(cfg, None).expect("sf").session().is_authenticated);
    }

    #[tokio::test]
    async fn tools_require_login() {
        let sf = Salesforce::new(config(), None).expect("salesforce");
        let err = sf
            .invoke(SalesforceCall::Query(QueryArgs {
                soql: "SELECT Id FROM Account".into(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Authentication(_)));
        assert!(err.to_string().contains("login"));
    }

    #[tokio::test]
    async fn login_without_client_credentials_fails_fast() {
        let sf = Salesforce::new(config(), None).expect("salesforce");
        let err = sf
            .invoke(SalesforceCall::Login(LoginArgs {
                username: Some("u".into()),
                password: Some("p".into()),
                security_token: None,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Authentication(_)));
    }
}
