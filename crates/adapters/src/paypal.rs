//! PayPal REST adapter. Authenticates with the client-credentials grant through a
//! [`TokenGuard`], so the bearer token is fetched once and reused until it nears expiry.

use async_trait::async_trait;
use clap::{Args, ValueEnum};
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use toolbridge_core::http::{Auth, RestClient, default_http_client, path_segment};
use toolbridge_core::token::{ClientCredentialsFetcher, TokenGuard};
use toolbridge_core::tools::{Effect, ToolSet, ToolSpec};
use toolbridge_core::{AdapterError, Envelope, Result};
use tracing::info;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PayPalEnvironment {
    Sandbox,
    Live,
}

impl PayPalEnvironment {
    #[must_use]
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-m.sandbox.paypal.com",
            Self::Live => "https://api-m.paypal.com",
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct PayPalConfig {
    #[arg(long = "paypal-client-id", env = "PAYPAL_CLIENT_ID")]
    pub client_id: String,

    #[arg(long = "paypal-client-secret", env = "PAYPAL_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    #[arg(
        long = "paypal-environment",
        env = "PAYPAL_ENVIRONMENT",
        value_enum,
        default_value_t = PayPalEnvironment::Sandbox
    )]
    pub environment: PayPalEnvironment,

    /// Override the API host (mainly for testing against a local mock).
    #[arg(long = "paypal-base-url", env = "PAYPAL_BASE_URL")]
    pub base_url: Option<String>,
}

pub struct PayPal {
    client: RestClient,
}

impl PayPal {
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] if the API URL is invalid.
    pub fn new(config: &PayPalConfig, timeout: Option<Duration>) -> Result<Self> {
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.environment.base_url().to_string());
        let token_url = Url::parse(&format!("{}/v1/oauth2/token", base.trim_end_matches('/')))
            .map_err(|e| AdapterError::Config(format!("Invalid PayPal base URL '{base}': {e}")))?;

        let http = default_http_client()?;
        let guard = TokenGuard::new(ClientCredentialsFetcher::new(
            http.clone(),
            token_url,
            config.client_id.clone(),
            config.client_secret.clone(),
        ));
        let client = RestClient::builder(base)
            .client(http)
            .auth(Auth::OAuth(Arc::new(guard)))
            .timeout(timeout)
            .build()?;
        info!(environment = ?config.environment, "PayPal adapter configured");
        Ok(Self { client })
    }

    async fn create_order(&self, a: CreateOrderArgs) -> Result<Envelope> {
        let application_context = match (a.return_url, a.cancel_url) {
            (None, None) => None,
            (return_url, cancel_url) => Some(ApplicationContext {
                return_url,
                cancel_url,
            }),
        };
        let body = OrderBody {
            intent: a.intent,
            purchase_units: vec![PurchaseUnit {
                amount: Money {
                    currency_code: a.currency_code,
                    value: a.amount,
                },
                description: a.description,
                reference_id: a.reference_id,
            }],
            application_context,
        };
        let order = self.client.post("/v2/checkout/orders").json(&body).send().await?;
        let id = order.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok(Envelope::ok(order).with_message(format!("Created order {id}")))
    }

    async fn get_order(&self, a: OrderIdArgs) -> Result<Value> {
        self.client
            .get(format!("/v2/checkout/orders/{}", path_segment(&a.order_id)))
            .send()
            .await
    }

    async fn capture_order(&self, a: OrderIdArgs) -> Result<Envelope> {
        let captured = self
            .client
            .post(format!("/v2/checkout/orders/{}/capture", path_segment(&a.order_id)))
            .json(&json!({}))
            .send()
            .await?;
        Ok(Envelope::ok(captured).with_message(format!("Captured order {}", a.order_id)))
    }

    async fn refund_capture(&self, a: RefundCaptureArgs) -> Result<Value> {
        let amount = match (a.amount, a.currency_code) {
            (Some(value), Some(currency_code)) => Some(Money {
                currency_code,
                value,
            }),
            (None, None) => None,
            _ => {
                return Err(AdapterError::InvalidParams(
                    "amount and currency_code must be given together (omit both for a full refund)"
                        .to_string(),
                ));
            }
        };
        let body = RefundBody {
            amount,
            note_to_payer: a.note_to_payer,
        };
        self.client
            .post(format!("/v2/payments/captures/{}/refund", path_segment(&a.capture_id)))
            .json(&body)
            .send()
            .await
    }

    async fn list_invoices(&self, a: PageArgs) -> Result<Value> {
        self.client
            .get("/v2/invoicing/invoices")
            .query_opt("page", a.page)
            .query_opt("page_size", a.page_size)
            .query_opt("total_required", a.total_required)
            .send()
            .await
    }

    async fn get_invoice(&self, a: InvoiceIdArgs) -> Result<Value> {
        self.client
            .get(format!("/v2/invoicing/invoices/{}", path_segment(&a.invoice_id)))
            .send()
            .await
    }

    async fn send_invoice(&self, a: SendInvoiceArgs) -> Result<Envelope> {
        let body = SendInvoiceBody {
            subject: a.subject,
            note: a.note,
            send_to_recipient: a.send_to_recipient,
        };
        let sent = self
            .client
            .post(format!("/v2/invoicing/invoices/{}/send", path_segment(&a.invoice_id)))
            .json(&body)
            .send()
            .await?;
        Ok(Envelope::ok(sent).with_message(format!("Sent invoice {}", a.invoice_id)))
    }

    async fn list_transactions(&self, a: ListTransactionsArgs) -> Result<Value> {
        self.client
            .get("/v1/reporting/transactions")
            .query("start_date", &a.start_date)
            .query("end_date", &a.end_date)
            .query_opt("transaction_status", a.transaction_status)
            .query_opt("fields", a.fields)
            .query_opt("page", a.page)
            .query_opt("page_size", a.page_size)
            .send()
            .await
    }

    async fn create_product(&self, a: CreateProductArgs) -> Result<Value> {
        let body = ProductBody {
            name: a.name,
            product_type: a.product_type,
            description: a.description,
            category: a.category,
        };
        self.client.post("/v1/catalogs/products").json(&body).send().await
    }

    async fn list_products(&self, a: PageArgs) -> Result<Value> {
        self.client
            .get("/v1/catalogs/products")
            .query_opt("page", a.page)
            .query_opt("page_size", a.page_size)
            .query_opt("total_required", a.total_required)
            .send()
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderIntent {
    Capture,
    Authorize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Physical,
    Digital,
    Service,
}

/// Amounts stay strings (`"10.00"`); PayPal parses them per currency.
#[derive(Debug, Serialize)]
struct Money {
    currency_code: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct PurchaseUnit {
    amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApplicationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    return_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct OrderBody {
    intent: OrderIntent,
    purchase_units: Vec<PurchaseUnit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application_context: Option<ApplicationContext>,
}

#[derive(Debug, Serialize)]
struct RefundBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note_to_payer: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendInvoiceBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_to_recipient: Option<bool>,
}

#[derive(Debug, Serialize)]
struct ProductBody {
    name: String,
    #[serde(rename = "type")]
    product_type: ProductType,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CreateOrderArgs {
    /// `CAPTURE` or `AUTHORIZE`.
    pub intent: OrderIntent,
    /// ISO-4217 code, e.g. `USD`.
    pub currency_code: String,
    /// Decimal string, e.g. `"10.00"`.
    pub amount: String,
    pub description: Option<String>,
    pub reference_id: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct OrderIdArgs {
    pub order_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct RefundCaptureArgs {
    pub capture_id: String,
    /// Partial refund amount; omit for a full refund.
    pub amount: Option<String>,
    pub currency_code: Option<String>,
    pub note_to_payer: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct PageArgs {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub total_required: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct InvoiceIdArgs {
    pub invoice_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct SendInvoiceArgs {
    pub invoice_id: String,
    pub subject: Option<String>,
    pub note: Option<String>,
    pub send_to_recipient: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct ListTransactionsArgs {
    /// ISO-8601 timestamp, e.g. `2024-01-01T00:00:00-0000`.
    pub start_date: String,
    /// ISO-8601 timestamp; at most 31 days after `start_date`.
    pub end_date: String,
    pub transaction_status: Option<String>,
    /// e.g. `all` or `transaction_info,payer_info`.
    pub fields: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct CreateProductArgs {
    pub name: String,
    /// `PHYSICAL`, `DIGITAL` or `SERVICE`.
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub description: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "arguments", rename_all = "snake_case")]
pub enum PayPalCall {
    CreateOrder(CreateOrderArgs),
    GetOrder(OrderIdArgs),
    CaptureOrder(OrderIdArgs),
    RefundCapture(RefundCaptureArgs),
    ListInvoices(PageArgs),
    GetInvoice(InvoiceIdArgs),
    SendInvoice(SendInvoiceArgs),
    ListTransactions(ListTransactionsArgs),
    CreateProduct(CreateProductArgs),
    ListProducts(PageArgs),
}

#[async_trait]
impl ToolSet for PayPal {
    type Call = PayPalCall;

    fn name(&self) -> &'static str {
        "toolbridge-paypal"
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new::<CreateOrderArgs>("create_order", Effect::Create, "Create a checkout order"),
            ToolSpec::new::<OrderIdArgs>("get_order", Effect::Read, "Get order details"),
            ToolSpec::new::<OrderIdArgs>(
                "capture_order",
                Effect::Create,
                "Capture payment for an approved order",
            ),
            ToolSpec::new::<RefundCaptureArgs>(
                "refund_capture",
                Effect::Create,
                "Refund a captured payment, fully or partially",
            ),
            ToolSpec::new::<PageArgs>("list_invoices", Effect::Read, "List invoices"),
            ToolSpec::new::<InvoiceIdArgs>("get_invoice", Effect::Read, "Get an invoice"),
            ToolSpec::new::<SendInvoiceArgs>("send_invoice", Effect::Create, "Send an invoice to its recipient"),
            ToolSpec::new::<ListTransactionsArgs>(
                "list_transactions",
                Effect::Read,
                "Search transactions in a date range",
            ),
            ToolSpec::new::<CreateProductArgs>("create_product", Effect::Create, "Create a catalog product"),
            ToolSpec::new::<PageArgs>("list_products", Effect::Read, "List catalog products"),
        ]
    }

    async fn invoke(&self, call: PayPalCall) -> Result<Envelope> {
        match call {
            PayPalCall::CreateOrder(a) => self.create_order(a).await,
            PayPalCall::GetOrder(a) => self.get_order(a).await.map(Envelope::ok),
            PayPalCall::CaptureOrder(a) => self.capture_order(a).await,
            PayPalCall::RefundCapture(a) => self.refund_capture(a).await.map(Envelope::ok),
            PayPalCall::ListInvoices(a) => self.list_invoices(a).await.map(Envelope::ok),
            PayPalCall::GetInvoice(a) => self.get_invoice(a).await.map(Envelope::ok),
            PayPalCall::SendInvoice(a) => self.send_invoice(a).await,
            PayPalCall::ListTransactions(a) => self.list_transactions(a).await.map(Envelope::ok),
            PayPalCall::CreateProduct(a) => self.create_product(a).await.map(Envelope::ok),
            PayPalCall::ListProducts(a) => self.list_products(a).await.map(Envelope::ok),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::JsonObject;
    use toolbridge_core::tools::{parse_call, unknown_catalog_entries};

    fn config() -> PayPalConfig {
        PayPalConfig {
            client_id: "id".into(),
            client_secret: "secret".into(),
            environment: PayPalEnvironment::Sandbox,
            base_url: None,
        }
    }

    #[test]
    fn catalog_matches_call_enum() {
        let paypal = PayPal::new(&config(), None).expect("paypal");
        assert!(unknown_catalog_entries::<PayPalCall>(&paypal.tools()).is_empty());
    }

    #[test]
    fn environment_selects_host() {
        let paypal = PayPal::new(&config(), None).expect("paypal");
        assert_eq!(
            paypal.client.base_url().as_str(),
            "https://api-m.sandbox.paypal.com/"
        );
        assert_eq!(PayPalEnvironment::Live.base_url(), "https://api-m.paypal.com");
    }

    #[test]
    fn unsupported_intent_is_invalid_params() {
        let args: JsonObject = serde_json::from_value(json!({
            "intent": "SALE",
            "currency_code": "USD",
            "amount": "1.00"
        }))
        .expect("object");
        let err = parse_call::<PayPalCall>("create_order", Some(args)).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams(_)));
    }

    #[test]
    fn order_body_keeps_amount_verbatim_and_skips_absent_fields() {
        let body = OrderBody {
            intent: OrderIntent::Capture,
            purchase_units: vec![PurchaseUnit {
                amount: Money {
                    currency_code: "JPY".into(),
                    value: "1000".into(),
                },
                description: None,
                reference_id: None,
            }],
            application_context: None,
        };
        assert_eq!(
            serde_json::to_value(&body).expect("json"),
            json!({
                "intent": "CAPTURE",
                "purchase_units": [{"amount": {"currency_code": "JPY", "value": "1000"}}]
            })
        );
    }

    #[tokio::test]
    async fn partial_refund_needs_currency() {
        let paypal = PayPal::new(&config(), None).expect("paypal");
        let err = paypal
            .invoke(PayPalCall::RefundCapture(RefundCaptureArgs {
                capture_id: "c1".into(),
                amount: Some("5.00".into()),
                currency_code: None,
                note_to_payer: None,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidParams(_)));
    }
}
